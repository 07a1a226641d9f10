/*!
 * Error handling for the provider network analytics engine
 *
 * Provides detailed error types with context and suggestions, plus the mapping
 * from engine errors onto the status codes of the wire boundary.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Library result type
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum NetworkError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// CSV parsing errors with location information
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<usize>,
        column: Option<String>,
        context: ErrorContext,
    },

    /// JSON parsing or serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: ErrorContext,
    },

    /// Malformed or referentially inconsistent source rows. Fatal to one load.
    #[error("Data integrity error: {message}")]
    DataIntegrity {
        message: String,
        field: Option<String>,
        value: Option<String>,
        context: ErrorContext,
    },

    /// A query parameter was rejected before any computation ran
    #[error("Invalid argument '{parameter}': {message}")]
    InvalidArgument {
        parameter: String,
        message: String,
        suggestion: Option<String>,
    },

    /// A valid identifier that is absent from the current snapshot
    #[error("{entity} not found: {key}")]
    NotFound {
        entity: String,
        key: String,
    },

    /// CSV header does not match the expected layout
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        message: String,
        expected_columns: Option<usize>,
        found_columns: Option<usize>,
        mismatched_column: Option<(usize, String, String)>,
    },

    /// Date parsing errors with format hints
    #[error("Date parsing error: {message}")]
    DateParse {
        message: String,
        value: String,
        expected_format: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// A query observed its cancellation token; no partial result is returned
    #[error("Query cancelled: {operation}")]
    Cancelled {
        operation: String,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Coarse classification used at the wire boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DataIntegrity,
    InvalidArgument,
    NotFound,
    Cancelled,
    Internal,
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line_number: Option<usize>,
    pub column_name: Option<String>,
    pub provider_id: Option<String>,
}

/// Export format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::Csv => write!(f, "CSV"),
        }
    }
}

impl NetworkError {
    /// Create a data integrity error for a specific field
    pub fn data_integrity(message: impl Into<String>, field: &str, value: Option<&str>) -> Self {
        Self::DataIntegrity {
            message: message.into(),
            field: Some(field.to_string()),
            value: value.map(str::to_string),
            context: ErrorContext::default(),
        }
    }

    /// Create an invalid argument error naming the offending parameter
    pub fn invalid_argument(parameter: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create an unknown network error listing the accepted ids
    pub fn unknown_network(value: &str) -> Self {
        Self::InvalidArgument {
            parameter: "network_id".to_string(),
            message: format!("unknown network '{}'", value),
            suggestion: Some(format!(
                "Valid options: {}",
                crate::data_types::NetworkId::ALL
                    .iter()
                    .map(|n| n.as_code())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Create a date parsing error with format information
    pub fn date_parse_with_format(value: &str, expected_format: &str) -> Self {
        Self::DateParse {
            message: format!("Cannot parse '{}' as timestamp", value),
            value: value.to_string(),
            expected_format: expected_format.to_string(),
        }
    }

    /// Create a schema mismatch error with detailed information
    pub fn schema_mismatch_detailed(
        expected_columns: usize,
        found_columns: usize,
        mismatched_column: Option<(usize, String, String)>,
    ) -> Self {
        let message = if let Some((index, expected, found)) = &mismatched_column {
            format!(
                "Column {} mismatch: expected '{}', found '{}'",
                index, expected, found
            )
        } else {
            format!(
                "Expected {} columns, found {}",
                expected_columns, found_columns
            )
        };

        Self::SchemaMismatch {
            message,
            expected_columns: Some(expected_columns),
            found_columns: Some(found_columns),
            mismatched_column,
        }
    }

    /// Create a file not found error with a hint about the expected fixture names
    pub fn file_not_found(path: PathBuf) -> Self {
        Self::Custom {
            message: format!("File not found: {}", path.display()),
            suggestion: Some(
                "Expected providers.json, provider_networks.json and claims.json \
                (or their .csv equivalents) in the data directory"
                    .to_string(),
            ),
        }
    }

    /// Attach a file path to errors raised while reading that file
    pub fn with_file(mut self, path: PathBuf) -> Self {
        match &mut self {
            Self::Io { context, .. }
            | Self::CsvParse { context, .. }
            | Self::Json { context, .. }
            | Self::DataIntegrity { context, .. } => context.file_path = Some(path),
            _ => {}
        }
        self
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataIntegrity { .. }
            | Self::CsvParse { .. }
            | Self::SchemaMismatch { .. }
            | Self::DateParse { .. } => ErrorKind::DataIntegrity,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }

    /// HTTP status code for the wire boundary
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Cancelled => 499,
            ErrorKind::DataIntegrity | ErrorKind::Internal => 500,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidArgument { suggestion: Some(sug), .. } => {
                format!("{}\n\n{}", self, sug)
            }
            Self::DateParse { expected_format, .. } => {
                format!("{}\n\nExpected format: {}", self, expected_format)
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            Self::DataIntegrity { context, .. } | Self::Json { context, .. } => {
                match &context.file_path {
                    Some(path) => format!("{}\n\nIn file: {}", self, path.display()),
                    None => self.to_string(),
                }
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for NetworkError {
    fn from(err: csv::Error) -> Self {
        let (line, message) = match err.position() {
            Some(pos) => (Some(pos.line() as usize), err.to_string()),
            None => (None, err.to_string()),
        };

        Self::CsvParse {
            message,
            line,
            column: None,
            context: ErrorContext::default(),
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            context: ErrorContext {
                line_number: Some(err.line()),
                ..Default::default()
            },
        }
    }
}

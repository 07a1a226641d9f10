use anyhow::{Context, Result};
use carenet::api::FilterRequest;
use carenet::cookbook::missing_data_counties;
use carenet::export::{exporter_for, write_source_files};
use carenet::fixtures::FixtureGenerator;
use carenet::prelude::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cncli")]
#[command(version, about = "Provider network analytics - county metrics, network stability and coverage search", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "CARENET_CONFIG")]
    config: Option<PathBuf>,

    /// Reference date for "active" and "terminated" (defaults to now)
    #[arg(long, global = true)]
    as_of: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show summary statistics for a dataset
    Stats(DataArgs),
    /// Show county metrics, all counties or one
    County(CountyArgs),
    /// List active providers by specialty, network or county
    Providers(ProvidersArgs),
    /// Termination statistics for a network
    Terminated(TerminatedArgs),
    /// Specialty breakdown of active providers in a county
    Specialty(SpecialtyArgs),
    /// Active network providers within a radius of a county centroid
    Radius(RadiusArgs),
    /// Coverage recommendations for a county
    Recommend(RecommendArgs),
    /// Export county metrics to JSON or CSV
    Export(ExportArgs),
    /// Write a seeded synthetic dataset
    Generate(GenerateArgs),
}

#[derive(Args)]
struct DataArgs {
    /// Directory containing providers, provider_networks and claims files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[derive(Args)]
struct CountyArgs {
    #[command(flatten)]
    data: DataArgs,
    /// County name; omit for every county
    county: Option<String>,
    /// Only list counties missing claims data or active providers
    #[arg(long)]
    missing: bool,
}

#[derive(Args)]
struct ProvidersArgs {
    #[command(flatten)]
    data: DataArgs,
    /// Specialty ("All" for any)
    #[arg(long)]
    specialty: Option<String>,
    /// Network id the provider must be active in
    #[arg(long)]
    network: Option<String>,
    #[arg(long)]
    county: Option<String>,
    /// Limit number of results
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args)]
struct TerminatedArgs {
    #[command(flatten)]
    data: DataArgs,
    /// Network id (Commercial, Medicare, Tricare)
    #[arg(short, long)]
    network: String,
    /// Restrict to one county
    #[arg(long)]
    county: Option<String>,
}

#[derive(Args)]
struct SpecialtyArgs {
    #[command(flatten)]
    data: DataArgs,
    county: String,
    /// Rank specialties by shortfall against the density standards
    #[arg(long)]
    gaps: bool,
}

#[derive(Args)]
struct RadiusArgs {
    #[command(flatten)]
    data: DataArgs,
    county: String,
    /// Network id (Commercial, Medicare, Tricare)
    #[arg(short, long)]
    network: String,
    /// Search radius in miles
    #[arg(short, long)]
    radius: Option<f64>,
    /// Limit number of results
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args)]
struct RecommendArgs {
    #[command(flatten)]
    data: DataArgs,
    county: String,
    /// Include network stability for this network
    #[arg(short, long)]
    network: Option<String>,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    data: DataArgs,
    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
    /// Export format
    #[arg(long, value_enum)]
    format: Option<ExportFormatOpt>,
    /// Write provider network rows instead of county metrics
    #[arg(long)]
    enrollments: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// Output directory
    #[arg(short, long)]
    out_dir: PathBuf,
    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Number of providers
    #[arg(long, default_value_t = 500)]
    providers: usize,
    /// File format
    #[arg(long, value_enum, default_value_t = ExportFormatOpt::Json)]
    format: ExportFormatOpt,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ExportFormatOpt {
    Json,
    Csv,
}

impl From<ExportFormatOpt> for ExportFormat {
    fn from(opt: ExportFormatOpt) -> Self {
        match opt {
            ExportFormatOpt::Json => ExportFormat::Json,
            ExportFormatOpt::Csv => ExportFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(as_of) = cli.as_of.as_deref() {
        config.reference_date = Some(parse_timestamp(as_of)?);
    }
    init_tracing(&config);
    #[cfg(feature = "parallel")]
    config.install_thread_pool();

    match cli.command {
        Commands::Stats(args) => cmd_stats(&config, args),
        Commands::County(args) => cmd_county(&config, args),
        Commands::Providers(args) => cmd_providers(&config, args),
        Commands::Terminated(args) => cmd_terminated(&config, args),
        Commands::Specialty(args) => cmd_specialty(&config, args),
        Commands::Radius(args) => cmd_radius(&config, args),
        Commands::Recommend(args) => cmd_recommend(&config, args),
        Commands::Export(args) => cmd_export(&config, args),
        Commands::Generate(args) => cmd_generate(args),
    }
}

fn init_tracing(config: &EngineConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_service(config: &EngineConfig, args: &DataArgs) -> Result<ApiService> {
    let dir = args.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
    let store = Arc::new(SnapshotStore::new());
    store
        .load_from_dir(&dir, config)
        .with_context(|| format!("loading dataset from {}", dir.display()))?;
    Ok(ApiService::with_config(store, config.clone()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_stats(config: &EngineConfig, args: DataArgs) -> Result<()> {
    let api = load_service(config, &args)?;
    let snapshot = api.store().current();
    snapshot.analytics().as_of(config.reference_time()).dataset_stats().print_summary();
    Ok(())
}

fn cmd_county(config: &EngineConfig, args: CountyArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    if let Some(county) = args.county.as_deref() {
        return print_json(&api.county_data_for(county)?);
    }

    let metrics = api.county_data()?;
    if args.missing {
        let by_name: BTreeMap<_, _> = metrics.into_iter().map(|m| (m.county.clone(), m)).collect();
        for county in missing_data_counties(&by_name) {
            println!("{}", county);
        }
        return Ok(());
    }
    for m in &metrics {
        println!(
            "{:<16} {:>6} providers  {:>8} claims  {:<8} {:<22} {}",
            m.county,
            m.provider_count,
            m.claims_count,
            m.density,
            m.claims_per_provider
                .map(|c| format!("{} claims/provider", c))
                .unwrap_or_else(|| "n/a".to_string()),
            m.provider_spacing_miles
                .map(|miles| format!("~{:.1} mi apart", miles))
                .unwrap_or_default()
        );
    }
    println!("Total counties: {}", metrics.len());
    Ok(())
}

fn cmd_providers(config: &EngineConfig, args: ProvidersArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    let request = FilterRequest {
        specialty: args.specialty,
        network: args.network,
        county: args.county,
    };
    let providers = api.filters(&request)?;
    for provider in providers.iter().take(args.limit) {
        println!(
            "{} | {} | {} | {}",
            provider.provider_id,
            provider.display_name(),
            provider.provider_type,
            provider.county
        );
    }
    println!("Total matches: {}", providers.len());
    Ok(())
}

fn cmd_terminated(config: &EngineConfig, args: TerminatedArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    print_json(&api.terminated_analysis(&args.network, args.county.as_deref())?)
}

fn cmd_specialty(config: &EngineConfig, args: SpecialtyArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    if args.gaps {
        let report = api.specialty_gaps(&args.county)?;
        match report.area_sq_miles {
            Some(area) => println!("{} ({} sq mi)", report.county, area),
            None => println!("{}: no county area row, gaps unavailable", report.county),
        }
        for gap in &report.gaps {
            println!(
                "{:<24} {:>5} {:>9.4}/sq mi  target {:>8.4}  gap {:>8.4}",
                gap.specialty, gap.count, gap.actual_density, gap.recommended_density, gap.gap
            );
        }
        return Ok(());
    }
    for (specialty, share) in api.specialty_density(&args.county)? {
        println!("{:<24} {:>5} {:>6.1}%", specialty, share.count, share.ratio * 100.0);
    }
    Ok(())
}

fn cmd_radius(config: &EngineConfig, args: RadiusArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    let hits = api.radius_analysis(&args.county, args.radius, &args.network)?;
    for hit in hits.iter().take(args.limit) {
        println!(
            "{:>8.2} mi | {} | {} | {}",
            hit.distance,
            hit.provider.provider_id,
            hit.provider.display_name(),
            hit.provider.provider_type
        );
    }
    println!("Total matches: {}", hits.len());
    Ok(())
}

fn cmd_recommend(config: &EngineConfig, args: RecommendArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    let recommendations = api.recommendations(&args.county, args.network.as_deref())?;
    if recommendations.is_empty() {
        println!("No recommendations for {}", args.county);
    }
    for rec in recommendations {
        println!("[{}] {}: {}", rec.priority, rec.kind, rec.description);
    }
    Ok(())
}

fn cmd_export(config: &EngineConfig, args: ExportArgs) -> Result<()> {
    let api = load_service(config, &args.data)?;
    let format = args.format.map(ExportFormat::from).unwrap_or(config.default_export_format);
    let exporter = exporter_for(format);
    let file = std::fs::File::create(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    if args.enrollments {
        exporter.export_provider_networks(&api.provider_networks()?, &mut writer)?;
    } else {
        let metrics: BTreeMap<_, _> = api.county_data()?.into_iter().map(|m| (m.county.clone(), m)).collect();
        exporter.export_metrics(&metrics, &mut writer)?;
    }
    writer.flush()?;
    println!("Exported {} to {}", format, args.output.display());
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let source = FixtureGenerator::new(args.seed)
        .with_provider_count(args.providers)
        .generate();
    std::fs::create_dir_all(&args.out_dir)?;
    write_source_files(&args.out_dir, &source, args.format.into())?;

    // Loading back catches anything the loader would reject
    SnapshotStore::with_source(source)?;
    println!("Generated {} providers in {}", args.providers, args.out_dir.display());
    Ok(())
}

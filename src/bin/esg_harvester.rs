use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use esg_harvester::aggregate::EntityAggregator;
use esg_harvester::config::{ConfigLoader, HarvestConfig};
use esg_harvester::domain::RunMode;
use esg_harvester::error::HarvestError;
use esg_harvester::flatten::{ProjectionFormat, write_projections};
use esg_harvester::input::load_entities;
use esg_harvester::output::{FlattenSummary, JsonOutput, LogProgress, RunSummary, SectorSummary};
use esg_harvester::pipeline::{DatasetBuilder, estimated_duration};
use esg_harvester::sector::SectorExtractor;
use esg_harvester::store::Store;
use esg_harvester::transport::HttpTransport;

const DEFAULT_ENTITY_CSV: &str = "Euronext_Equities_with_MIC.csv";
const DEFAULT_DATASET: &str = "output/json_data/euronext_esg_data.json";
const DEFAULT_SECTOR_CSV: &str = "Euronext_Equities_with_MIC_and_Sector.csv";

#[derive(Parser)]
#[command(name = "esg-harvester")]
#[command(about = "Euronext ESG indicator scraper and CSV flattener")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Scrape ESG blocks for every company in the input CSV")]
    Scrape(ScrapeArgs),
    #[command(about = "Flatten a scraped dataset into CSV tables")]
    Flatten(FlattenArgs),
    #[command(about = "Add an ICB industry column to the input CSV")]
    Sector(SectorArgs),
}

#[derive(Args)]
struct ScrapeArgs {
    /// Only scrape the first few companies.
    #[arg(long)]
    test: bool,

    /// Number of companies in test mode.
    #[arg(long)]
    companies: Option<usize>,

    #[arg(long, default_value = DEFAULT_ENTITY_CSV)]
    csv: PathBuf,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct FlattenArgs {
    #[arg(long, default_value = DEFAULT_DATASET)]
    input: Utf8PathBuf,

    #[arg(long, value_enum, default_value_t = ProjectionFormat::All)]
    format: ProjectionFormat,

    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SectorArgs {
    #[arg(long, default_value = DEFAULT_ENTITY_CSV)]
    csv: PathBuf,

    #[arg(long, default_value = DEFAULT_SECTOR_CSV)]
    output: PathBuf,

    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InputMissing(_)
        | HarvestError::InputColumn(_)
        | HarvestError::MissingConfig(_)
        | HarvestError::DatasetNotFound(_) => 2,
        HarvestError::ClientSetup(_)
        | HarvestError::Transport { .. }
        | HarvestError::TransportStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scrape(args) => run_scrape(args),
        Commands::Flatten(args) => run_flatten(args),
        Commands::Sector(args) => run_sector(args),
    }
}

fn run_scrape(args: ScrapeArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let mut entities = load_entities(&args.csv)?;

    let mode = if args.test {
        RunMode::Test
    } else {
        RunMode::Full
    };
    if mode.is_test() {
        let limit = args.companies.unwrap_or(config.test_companies);
        entities.truncate(limit);
        info!(companies = entities.len(), "test mode");
        for (index, entity) in entities.iter().enumerate() {
            info!("  {}. {} ({})", index + 1, entity.name, entity.composite_key());
        }
    } else {
        let estimate = estimated_duration(entities.len(), config.policy.request_delay);
        info!(
            companies = entities.len(),
            estimated_minutes = estimate.as_secs() / 60,
            "full scrape"
        );
    }

    let store = Store::new(&config.output_dir)?;
    store.ensure_layout()?;

    let transport = HttpTransport::new(config.policy)?;
    let aggregator = EntityAggregator::new(transport, store.clone(), config.urls.clone());
    let builder = DatasetBuilder::new(aggregator, config.progress_every);
    let output = builder.run(&entities, mode, &LogProgress);

    let persisted = store.persist_run(&output)?;
    info!(dataset = %persisted.dataset, failures = %persisted.failures, "run saved");

    let summary = RunSummary::new(&output, vec![persisted.dataset, persisted.failures]);
    JsonOutput::print_run(&summary).into_diagnostic()?;
    Ok(())
}

fn run_flatten(args: FlattenArgs) -> miette::Result<()> {
    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => csv_output_dir(&ConfigLoader::resolve(None)?)?,
    };

    let dataset = Store::load_dataset(&args.input)?;
    info!(companies = dataset.companies.len(), input = %args.input, "dataset loaded");
    let files = write_projections(&dataset, args.format, &output_dir)?;

    JsonOutput::print_flatten(&FlattenSummary {
        input: args.input,
        companies: dataset.companies.len(),
        files_created: files,
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_sector(args: SectorArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let transport = HttpTransport::new(config.policy)?;
    let extractor = SectorExtractor::new(transport, config.urls);
    let report = extractor.annotate(&args.csv, &args.output)?;

    JsonOutput::print_sector(&SectorSummary::new(
        args.output.display().to_string(),
        &report,
    ))
    .into_diagnostic()?;
    Ok(())
}

fn csv_output_dir(config: &HarvestConfig) -> Result<Utf8PathBuf, HarvestError> {
    Utf8PathBuf::from_path_buf(config.csv_output_dir.clone())
        .map_err(|_| HarvestError::Filesystem("invalid csv output path".to_string()))
}

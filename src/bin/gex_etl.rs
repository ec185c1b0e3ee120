use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gex_etl::app::{App, ProgressSink};
use gex_etl::config::{
    ConfigLoader, DatasetRequest, ExpressionRequest, ImportPlan, ReferencePaths, SCHEMA_VERSION,
};
use gex_etl::domain::{DatasetName, Genome, HeaderLayout};
use gex_etl::error::GexError;
use gex_etl::output::{ConsoleProgress, HumanOutput, JsonOutput, LogProgress, OutputMode};
use gex_etl::store::Store;

#[derive(Parser)]
#[command(name = "gex-etl")]
#[command(about = "Build the gene expression index database and binary matrices")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import datasets from a manifest or from flags")]
    Import(ImportArgs),
    #[command(about = "Read expression values for genes back from an output directory")]
    Lookup(LookupArgs),
    #[command(about = "Show the header and size checks of a binary expression file")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    dataset: Option<String>,

    #[arg(long, value_enum)]
    genome: Option<Genome>,

    #[arg(long)]
    technology: Option<String>,

    #[arg(long, default_value = "")]
    platform: String,

    #[arg(long, default_value = "")]
    institution: String,

    #[arg(long, default_value = "")]
    description: String,

    #[arg(long)]
    phenotypes: Option<String>,

    #[arg(long = "data", value_name = "TYPE=PATH")]
    data: Vec<String>,

    #[arg(long)]
    id_cols: Option<usize>,

    #[arg(long)]
    hugo: Option<String>,

    #[arg(long)]
    mgi: Option<String>,

    #[arg(long)]
    output: Option<String>,

    #[arg(long, value_enum)]
    layout: Option<HeaderLayout>,
}

#[derive(Args)]
struct LookupArgs {
    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    dataset: String,

    #[arg(long = "type")]
    expression_type: String,

    #[arg(required = true)]
    genes: Vec<String>,
}

#[derive(Args)]
struct InspectArgs {
    file: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(gex) = report.downcast_ref::<GexError>() {
            return ExitCode::from(map_exit_code(gex));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GexError) -> u8 {
    match error {
        GexError::MissingConfig
        | GexError::ConfigRead(_)
        | GexError::ConfigParse(_)
        | GexError::InvalidGenome(_)
        | GexError::InvalidLayout(_)
        | GexError::InvalidDataEntry(_)
        | GexError::InvalidDatasetName(_)
        | GexError::Reference { .. }
        | GexError::Phenotype { .. }
        | GexError::Matrix { .. }
        | GexError::MissingSampleColumn { .. }
        | GexError::FileUrlCollision { .. }
        | GexError::DatasetNotFound(_)
        | GexError::ExpressionTypeNotFound { .. } => 2,
        GexError::BadMagic(_)
        | GexError::UnsupportedVersion(_)
        | GexError::Corrupt(_)
        | GexError::OutOfBounds { .. }
        | GexError::MisalignedLength(_)
        | GexError::DuplicateIndexEntry { .. }
        | GexError::RowShape { .. }
        | GexError::Overflow { .. } => 3,
        GexError::Filesystem(_) | GexError::Database(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Human => &ConsoleProgress,
        OutputMode::Json => &LogProgress,
    };

    match cli.command {
        Commands::Import(args) => run_import(args, output_mode, sink),
        Commands::Lookup(args) => run_lookup(args, output_mode, sink),
        Commands::Inspect(args) => run_inspect(args, output_mode, sink),
    }
}

fn run_import(
    args: ImportArgs,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let mut plan = if args.dataset.is_some() {
        plan_from_flags(&args)?
    } else {
        ConfigLoader::resolve(args.config.as_deref())?
    };
    if let Some(output) = &args.output {
        plan.output = Some(Utf8PathBuf::from(output));
    }
    if let Some(layout) = args.layout {
        plan.layout = layout;
    }
    if let Some(hugo) = &args.hugo {
        plan.references.hugo = Some(Utf8PathBuf::from(hugo));
    }
    if let Some(mgi) = &args.mgi {
        plan.references.mgi = Some(Utf8PathBuf::from(mgi));
    }

    let root = match &plan.output {
        Some(output) => output.clone(),
        None => Store::default_root()?,
    };
    let aliases = App::load_aliases(&plan.references, sink)?;
    let app = App::new(Store::new(root));
    let result = app.import(&plan, &aliases, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_import(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_import(&result),
    }
    Ok(())
}

fn plan_from_flags(args: &ImportArgs) -> miette::Result<ImportPlan> {
    let name: DatasetName = args.dataset.as_deref().unwrap_or_default().parse()?;
    let genome = args
        .genome
        .ok_or_else(|| miette::miette!("--genome is required with --dataset"))?;
    let technology = args
        .technology
        .clone()
        .ok_or_else(|| miette::miette!("--technology is required with --dataset"))?;
    let phenotypes = args
        .phenotypes
        .as_deref()
        .ok_or_else(|| miette::miette!("--phenotypes is required with --dataset"))?;
    if args.data.is_empty() {
        return Err(miette::miette!("at least one --data TYPE=PATH is required"));
    }
    let data = args
        .data
        .iter()
        .map(|value| ExpressionRequest::parse(value, args.id_cols))
        .collect::<Result<Vec<_>, GexError>>()?;

    Ok(ImportPlan {
        schema_version: SCHEMA_VERSION,
        output: None,
        layout: HeaderLayout::default(),
        references: ReferencePaths::default(),
        datasets: vec![DatasetRequest {
            name,
            genome,
            technology,
            platform: args.platform.clone(),
            institution: args.institution.clone(),
            description: args.description.clone(),
            phenotypes: Utf8PathBuf::from(phenotypes),
            data,
        }],
    })
}

fn run_lookup(
    args: LookupArgs,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let root = match args.output {
        Some(output) => Utf8PathBuf::from(output),
        None => Store::default_root()?,
    };
    let app = App::new(Store::new(root));
    let result = app.lookup(&args.dataset, &args.expression_type, &args.genes, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_lookup(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_lookup(&result),
    }
    Ok(())
}

fn run_inspect(
    args: InspectArgs,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let summary = App::inspect(&args.file, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_inspect(&summary).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_inspect(&summary),
    }
    Ok(())
}

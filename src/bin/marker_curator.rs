use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use marker_curator::app::{App, CollectOptions, CollectResult, ExtractResult, ProgressSink};
use marker_curator::catalog::ResolutionPolicy;
use marker_curator::config::{ConfigLoader, ResolvedConfig};
use marker_curator::domain::{GenomeAccession, NameScheme, Outgroup, SequenceType, TaxonId};
use marker_curator::error::CurateError;
use marker_curator::ncbi::NcbiHttpClient;
use marker_curator::output::{JsonOutput, OutputMode, RunResult, TracingSink};
use marker_curator::scorer::{self, ClassificationHit, HmmsearchScorer, MarkerPanel, MarkerScorer};
use marker_curator::store::Layout;

#[derive(Parser)]
#[command(name = "marker-curator")]
#[command(about = "Collect genomes and curate single-copy marker genes for tree building")]
#[command(version, author)]
struct Cli {
    /// Print a JSON report on stdout instead of the summary.
    #[arg(long, global = true)]
    json: bool,

    /// Run configuration (defaults to ./curate.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve and download or copy genomes")]
    Collect(CurateArgs),
    #[command(about = "Classify, extract and merge marker sequences, then write config.yml")]
    Extract(CurateArgs),
    #[command(about = "Collect, then extract")]
    Run(CurateArgs),
}

#[derive(Args, Clone)]
struct CurateArgs {
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Species taxon id; repeatable.
    #[arg(long = "species")]
    species: Vec<TaxonId>,

    /// Assembly accession; repeatable.
    #[arg(long = "accession")]
    accessions: Vec<GenomeAccession>,

    /// Directory of local `.faa`/`.fna` pairs.
    #[arg(long)]
    local: Option<Utf8PathBuf>,

    /// One representative assembly for every species in the summary.
    #[arg(long)]
    all_species: bool,

    /// Species taxon id, local genome name, or `none`.
    #[arg(long)]
    outgroup: Option<Outgroup>,

    #[arg(long = "seq-type")]
    sequence_type: Option<SequenceType>,

    #[arg(long = "name-type")]
    name_type: Option<NameScheme>,

    #[arg(long)]
    resolution: Option<ResolutionPolicy>,

    /// Directory with cutoffs.txt and one .hmm per marker.
    #[arg(long)]
    panel: Option<Utf8PathBuf>,

    #[arg(long)]
    min_genomes: Option<usize>,

    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CurateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CurateError) -> u8 {
    match error {
        CurateError::MissingConfig
        | CurateError::ConfigRead(_)
        | CurateError::ConfigParse(_)
        | CurateError::MissingCatalog(_)
        | CurateError::MalformedCatalog(_)
        | CurateError::MalformedPanel(_)
        | CurateError::InvalidGenomeAccession(_)
        | CurateError::InvalidTaxonId(_)
        | CurateError::InvalidGenomeId(_)
        | CurateError::InvalidMarkerId(_)
        | CurateError::InvalidNameScheme(_)
        | CurateError::InvalidSequenceType(_) => 2,
        CurateError::NcbiHttp(_)
        | CurateError::NcbiStatus { .. }
        | CurateError::MissingTool(_)
        | CurateError::Scorer(_)
        | CurateError::ScorerOutput(_) => 3,
        _ => 1,
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

    let (args, collect, extract) = match cli.command {
        Commands::Collect(args) => (args, true, false),
        Commands::Extract(args) => (args, false, true),
        Commands::Run(args) => (args, true, true),
    };
    let config = resolve_config(cli.config.as_deref(), &args, collect)?;
    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .into_diagnostic()?;
    }

    let layout = Layout::new(absolute(&config.output)?);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &TracingSink,
    };

    let collected = if collect {
        let app = App::new(layout.clone(), NcbiHttpClient::new()?, NopScorer);
        let options = CollectOptions {
            dry_run: args.dry_run,
        };
        Some(app.collect(&config, options, sink)?)
    } else {
        None
    };

    let extracted = if extract && !args.dry_run {
        let fetcher = NcbiHttpClient::new()?;
        let panel = marker_curator::app::resolve_panel(&fetcher, config.panel.as_deref())?;
        let pool = rayon::current_num_threads();
        let cpus = scorer::cpus_per_process(config.threads.unwrap_or(pool), pool);
        let scorer = HmmsearchScorer::new(&panel, cpus)?;
        let app = App::new(layout, fetcher, scorer);
        Some(app.extract(&config, &panel, sink)?)
    } else {
        None
    };

    match (output_mode, collected, extracted) {
        (OutputMode::Json, Some(collect), extract) => {
            JsonOutput::print_run(&RunResult { collect, extract }).into_diagnostic()?
        }
        (OutputMode::Json, None, Some(extract)) => JsonOutput::print_extract(&extract).into_diagnostic()?,
        (OutputMode::Human, collect, extract) => {
            if let Some(collect) = &collect {
                print_collect_summary(collect);
            }
            if let Some(extract) = &extract {
                print_extract_summary(extract);
            }
        }
        (OutputMode::Json, None, None) => {}
    }
    Ok(())
}

fn resolve_config(
    path: Option<&str>,
    args: &CurateArgs,
    collect: bool,
) -> Result<ResolvedConfig, CurateError> {
    let mut config = ConfigLoader::resolve_optional(path)?;
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    config.species.extend(args.species.iter().cloned());
    config.accessions.extend(args.accessions.iter().cloned());
    if let Some(local) = &args.local {
        config.local = Some(local.clone());
    }
    config.all_species |= args.all_species;
    if let Some(outgroup) = &args.outgroup {
        config.outgroup = outgroup.clone();
    }
    if let Some(sequence_type) = args.sequence_type {
        config.sequence_type = sequence_type;
    }
    if let Some(name_type) = args.name_type {
        config.name_type = name_type;
    }
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(panel) = &args.panel {
        config.panel = Some(panel.clone());
    }
    if let Some(min_genomes) = args.min_genomes {
        config.min_genomes = min_genomes.max(1);
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads).filter(|threads| *threads > 0);
    }
    if collect && !config.has_requests() {
        return Err(CurateError::MissingConfig);
    }
    Ok(config)
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, CurateError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd.join(path.as_std_path()))
        .map_err(|_| CurateError::Filesystem("invalid output path".to_string()))
}

fn print_collect_summary(result: &CollectResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    if result.dry_run {
        println!("{cyan}marker-curator dry run: {} genomes would be collected{reset}", result.planned.len());
    } else {
        println!("{cyan}marker-curator collect summary{reset}");
        println!("{green}genomes ready: {}{reset}", result.materialized.len());
        println!("{green}files downloaded: {}, genomes already present: {}{reset}", result.fetched, result.skipped);
        for genome in &result.failed {
            println!("{yellow}failed: {genome}{reset}");
        }
    }
    for missing in &result.unresolved {
        println!("{yellow}unresolved: {missing}{reset}");
    }
}

fn print_extract_summary(result: &ExtractResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}marker-curator extract summary{reset}");
    println!("{green}genomes processed: {}{reset}", result.genomes.len());
    println!("{green}markers merged: {}{reset}", result.markers.len());
    println!(
        "{yellow}failed genomes: {}, ambiguous queries dropped: {}{reset}",
        result.failed(),
        result.ambiguous()
    );
    if !result.below_threshold.is_empty() {
        println!(
            "{yellow}markers below minimum genome count: {}{reset}",
            result.below_threshold.join(", ")
        );
    }
    println!("{cyan}outgroup: {}{reset}", result.manifest.outgroup);
}

/// Stands in for the scorer when only collecting.
struct NopScorer;

impl MarkerScorer for NopScorer {
    fn score(
        &self,
        _protein_file: &Utf8Path,
        _panel: &MarkerPanel,
    ) -> Result<Vec<ClassificationHit>, CurateError> {
        Err(CurateError::MissingTool("hmmsearch".to_string()))
    }
}

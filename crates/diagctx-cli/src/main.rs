#![deny(unsafe_code)]

//! diagctx CLI, the batch front end for the extraction engine.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use diagctx_config::AppConfig;
use diagctx_core::{CompilerFamily, Engine, SourceLocator, prompt};
use diagctx_regress::{Harness, Mode};

/// diagctx: turn compiler diagnostics into bounded explanation context.
#[derive(Parser)]
#[command(name = "diagctx", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "diagctx.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an explanation context from captured compiler output.
    Explain {
        #[command(flatten)]
        input: InputArgs,

        /// Compiler family: auto, clang, gcc, or msvc.
        #[arg(long)]
        compiler: Option<CompilerFamily>,

        /// Maximum context size in characters.
        #[arg(long)]
        max_budget: Option<usize>,

        /// Source lines shown either side of each diagnostic.
        #[arg(long)]
        context_radius: Option<u32>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// List the source files the diagnostics reference and whether each resolves.
    ExtractSources {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Run recorded fixtures against their golden output.
    Regress {
        /// Fixture directory (defaults to the configured one).
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Fixtures run in parallel.
        #[arg(long)]
        workers: Option<usize>,

        /// Rewrite golden files from current output.
        #[arg(long)]
        bless: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// File holding compiler output; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Source search root; repeatable. Replaces the configured roots.
    #[arg(short, long = "root")]
    roots: Vec<PathBuf>,

    /// Resolve foreign absolute paths by their trailing components.
    #[arg(long)]
    match_suffix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Prompt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose, &config.logging.level))),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Explain {
            input,
            compiler,
            max_budget,
            context_radius,
            format,
        } => {
            let mut config = config;
            if let Some(compiler) = compiler {
                config.engine.compiler = compiler.to_string();
            }
            if let Some(budget) = max_budget {
                config.engine.max_budget = budget;
            }
            if let Some(radius) = context_radius {
                config.engine.context_radius = radius;
            }
            cmd_explain(config, &input, format)?
        }
        Commands::ExtractSources { input } => cmd_extract_sources(config, &input)?,
        Commands::Regress {
            fixtures,
            workers,
            bless,
        } => cmd_regress(config, fixtures, workers, bless).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

fn cmd_explain(mut config: AppConfig, input: &InputArgs, format: Format) -> Result<()> {
    apply_input_args(&mut config, input);
    config.validate()?;
    let raw = read_input(input.input.as_deref())?;

    let mut locator = SourceLocator::from_config(&config.sources);
    let context = Engine::new(&config.engine).explain(&raw, &mut locator);
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&context)?),
        Format::Prompt => print!("{}", prompt::render(&context)),
    }
    Ok(())
}

fn cmd_extract_sources(mut config: AppConfig, input: &InputArgs) -> Result<()> {
    apply_input_args(&mut config, input);
    config.validate()?;
    let raw = read_input(input.input.as_deref())?;

    let mut locator = SourceLocator::from_config(&config.sources);
    for status in Engine::new(&config.engine).sources(&raw, &mut locator) {
        match (&status.resolved, &status.error) {
            (Some(resolved), _) => {
                println!("{}\t{}", status.referenced.display(), resolved.display())
            }
            (None, Some(error)) => println!("{}\t! {error}", status.referenced.display()),
            (None, None) => println!("{}\t!", status.referenced.display()),
        }
    }
    Ok(())
}

async fn cmd_regress(
    mut config: AppConfig,
    fixtures: Option<PathBuf>,
    workers: Option<usize>,
    bless: bool,
) -> Result<()> {
    if let Some(dir) = fixtures {
        config.regression.fixtures_dir = dir;
    }
    if let Some(workers) = workers {
        config.regression.workers = workers;
    }
    config.validate()?;

    let mode = if bless { Mode::Bless } else { Mode::Check };
    let harness = Harness::from_config(&config).mode(mode);
    info!(root = %harness.root().display(), ?mode, "Running regression fixtures");
    let fixtures = harness.discover()?;
    let report = harness.run(fixtures).await?;

    for (fixture, outcome) in &report.results {
        println!("{} ... {outcome}", fixture.id());
    }
    println!(
        "\n{} passed, {} failed",
        report.passed(),
        report.failed()
    );
    if !report.is_success() {
        bail!("{} fixture(s) failed", report.failed());
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    config.validate()?;
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        Ok(AppConfig::load(path).await?)
    } else {
        Ok(AppConfig::default())
    }
}

fn apply_input_args(config: &mut AppConfig, input: &InputArgs) {
    if !input.roots.is_empty() {
        config.sources.search_roots = input.roots.clone();
    }
    if input.match_suffix {
        config.sources.match_path_suffix = true;
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    let bytes = match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Filter directive: `-v` flags raise the configured level.
fn log_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

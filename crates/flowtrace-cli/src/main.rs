use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use flowtrace_agent::{load_pairs, BatchRunner, FlowTracer};
use flowtrace_ai::LLMProviderFactory;
use flowtrace_core::{
    ConfigManager, FlowResult, FlowTraceConfig, LoggingConfig, TerminationReason, TraceConfig,
};
use flowtrace_parser::{FunctionLocator, TreeSitterLocator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "flowtrace")]
#[command(about = "FlowTrace - LLM-guided data-flow tracing over application sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./.flowtrace.toml, then ~/.flowtrace/config.toml)
    #[arg(short, long, global = true, env = "FLOWTRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    /// 20 rounds, exact end match, no stop action
    Classic,
    /// 30 rounds, 50-char prefix end match, explicit stop action
    Privacy,
}

impl From<ProfileArg> for TraceConfig {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Classic => TraceConfig::classic(),
            ProfileArg::Privacy => TraceConfig::privacy(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Trace every flow pair in a selector output file
    Trace {
        /// JSON array of flow pairs
        #[arg(short, long)]
        pairs: PathBuf,

        /// Root of the code base searched for function implementations
        #[arg(long)]
        code_base: Option<PathBuf>,

        /// Maximum number of flows to trace
        #[arg(long)]
        max_flows: Option<usize>,

        /// Model name, e.g. qwen3-coder-plus
        #[arg(short, long)]
        model: Option<String>,

        /// Loop preset; replaces the [trace] section of the config file
        /// (FLOWTRACE_MAX_ROUNDS still applies)
        #[arg(long, value_enum)]
        profile: Option<ProfileArg>,

        /// Directory for results and per-flow memory files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the rendered implementations of a function
    Locate {
        /// Function name, or `build` for UI-building callbacks
        name: String,

        /// Directory to search (defaults to the configured code base)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Write a default config file
    Init {
        #[arg(default_value = ".flowtrace.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Init { path } => init_config(path),
        command => {
            let config = load_config(&cli)?;
            init_logging(&config.logging, cli.verbose);
            execute_command(command, config).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<FlowTraceConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    Ok(manager.into_config())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn execute_command(command: &Commands, mut config: FlowTraceConfig) -> Result<()> {
    match command {
        Commands::Trace {
            pairs,
            code_base,
            max_flows,
            model,
            profile,
            output,
        } => {
            if let Some(profile) = profile {
                config = ConfigManager::apply_trace_profile(config, (*profile).into(), |key| {
                    std::env::var(key).ok()
                });
            }
            if let Some(code_base) = code_base {
                config.locator.code_base = Some(code_base.clone());
            }
            if let Some(max_flows) = max_flows {
                config.output.max_flows = *max_flows;
            }
            if let Some(model) = model {
                config.llm.model = model.clone();
            }
            if let Some(output) = output {
                config.output.result_dir = output.clone();
            }
            ConfigManager::validate_config(&config)?;
            execute_trace(pairs, config).await
        }
        Commands::Locate { name, root } => {
            let locator = TreeSitterLocator::from_config(&config.locator);
            let rendered = locator.locate(name, root.as_deref());
            if rendered.is_empty() {
                eprintln!(
                    "{} no declaration of '{}' under {}",
                    "Not found:".yellow().bold(),
                    name,
                    root.as_deref()
                        .unwrap_or_else(|| locator.code_base())
                        .display()
                );
            } else {
                print!("{}", rendered);
            }
            Ok(())
        }
        Commands::Init { path } => init_config(path),
    }
}

async fn execute_trace(pairs_path: &Path, config: FlowTraceConfig) -> Result<()> {
    let code_base = config
        .locator
        .code_base
        .clone()
        .ok_or_else(|| {
            anyhow!("No code base configured. Pass --code-base or set FLOWTRACE_CODE_BASE")
        })?;
    if !code_base.is_dir() {
        return Err(anyhow!("Code base {} is not a directory", code_base.display()));
    }

    let pairs = load_pairs(pairs_path)
        .with_context(|| format!("Failed to read flow pairs from {}", pairs_path.display()))?;
    if pairs.is_empty() {
        return Err(anyhow!("{} contains no flow pairs", pairs_path.display()));
    }

    let llm = LLMProviderFactory::create_from_config(&config.llm)?;
    let locator = Arc::new(TreeSitterLocator::from_config(&config.locator));
    let tracer = FlowTracer::new(llm, locator, config.trace.clone());
    let runner = BatchRunner::new(tracer, &config.output.result_dir, config.output.max_flows);

    info!("Code base: {}", code_base.display());
    let results = runner.run(&pairs).await?;
    let path = runner.write_results(&results)?;

    print_summary(&results);
    println!("\n{} {}", "Results:".cyan().bold(), path.display());
    Ok(())
}

fn print_summary(results: &[FlowResult]) {
    println!("\n{}", "Flow summary".bold());
    for result in results {
        let status = match result.termination {
            TerminationReason::EndReached => result.termination.as_str().green(),
            TerminationReason::StopRequested => result.termination.as_str().cyan(),
            TerminationReason::BudgetExhausted => result.termination.as_str().yellow(),
            TerminationReason::ServiceFailed => result.termination.as_str().red(),
        };
        println!(
            "  {} {:<12} {:>3} steps  {}  ({}:{} -> {}:{})",
            format!("#{}", result.flow_id).bold(),
            result.category,
            result.steps.len(),
            status,
            result.start.file,
            result.start.line,
            result.end.file,
            result.end.line
        );
    }
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    ConfigManager::create_default_config(path)?;
    println!("{} {}", "Created:".green().bold(), path.display());
    Ok(())
}

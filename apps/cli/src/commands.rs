//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use autoblog_core::{
    PipelineSettings, ProgressReporter, RunOutcome, RunRequest, Services, Stage,
};
use autoblog_shared::{
    AppConfig, RunId, SourceType, config_file_path, init_config, load_config, load_config_from,
};
use autoblog_storage::Registry;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Autoblog: turn Slack threads and Google Docs into blog drafts.
#[derive(Parser)]
#[command(
    name = "autoblog",
    version,
    about = "Generate an illustrated blog draft (.docx) from a Slack thread or a Google Doc.",
    long_about = None,
    subcommand_negates_reqs = true,
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub generate: GenerateArgs,

    /// Config file (defaults to ~/.autoblog/autoblog.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Arguments of the default (generate) action.
#[derive(Args)]
pub(crate) struct GenerateArgs {
    /// Where the material comes from.
    #[arg(long, value_enum, required = true)]
    pub source: Option<SourceArg>,

    /// Slack thread permalink or Google Doc URL.
    #[arg(long, required = true)]
    pub input: Option<String>,

    /// Output .docx path (defaults to output_dir/blog_post_<timestamp>.docx).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Source kind accepted by `--source`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum SourceArg {
    Slack,
    Gdoc,
}

impl From<SourceArg> for SourceType {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Slack => SourceType::Slack,
            SourceArg::Gdoc => SourceType::Gdoc,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Inspect the registry of generated documents.
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Registry subcommands.
#[derive(Subcommand)]
pub(crate) enum RunsAction {
    /// List generated documents, newest first.
    List {
        /// Maximum number of entries.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Show one generated document.
    Show {
        /// Run ID printed after generation.
        id: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "autoblog=info",
        1 => "autoblog=debug",
        _ => "autoblog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        None => cmd_generate(config_path, cli.generate).await,
        Some(Command::Runs { action }) => match action {
            RunsAction::List { limit } => cmd_runs_list(config_path, limit).await,
            RunsAction::Show { id } => cmd_runs_show(config_path, &id).await,
        },
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load the config file (explicit path or default) with env overrides applied.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => {
            let mut config = load_config_from(p)?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Ok(load_config()?),
    }
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

async fn cmd_generate(config_path: Option<&Path>, args: GenerateArgs) -> Result<()> {
    let (Some(source), Some(input)) = (args.source, args.input) else {
        return Err(eyre!("--source and --input are required"));
    };
    let source = SourceType::from(source);

    // Fail fast on missing credentials before any network call.
    let config = resolve_config(config_path)?;
    let credentials = config.credentials(source)?;

    let services = Services::connect(&config, &credentials)
        .await
        .wrap_err("failed to set up API clients")?;
    let settings = PipelineSettings::from_config(&config);
    let request = RunRequest {
        source,
        input,
        output: args.output,
    };

    info!(%source, input = %request.input, "generating blog post");

    let reporter = CliProgress::new();
    let result = autoblog_core::run(&request, &settings, &services, &reporter).await;
    reporter.clear();

    let Some(outcome) = result? else {
        return Err(eyre!(
            "blog generation failed for {}; see the log above",
            request.input
        ));
    };

    println!();
    println!("  Blog post generated successfully!");
    println!("  ID:      {}", outcome.run_id);
    println!("  Source:  {source}");
    println!("  Output:  {}", outcome.output_path.display());
    println!(
        "  Images:  {} generated, {} failed",
        outcome.images, outcome.image_failures
    );
    println!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, stage: Stage) {
        self.spinner.set_message(stage.label());
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

async fn open_registry(config_path: Option<&Path>) -> Result<Registry> {
    let config = resolve_config(config_path)?;
    let path = config.output.registry_path.ok_or_else(|| {
        eyre!("no registry configured; set output.registry_path in the config file")
    })?;
    Ok(Registry::open_readonly(Path::new(&path)).await?)
}

async fn cmd_runs_list(config_path: Option<&Path>, limit: u32) -> Result<()> {
    let registry = open_registry(config_path).await?;
    let files = registry.list(limit).await?;

    if files.is_empty() {
        println!("No generated documents recorded.");
        return Ok(());
    }

    for file in files {
        println!(
            "{}  {}  {:<5}  {}",
            file.id,
            file.created_at.format("%Y-%m-%d %H:%M:%S"),
            file.source,
            file.output_path
        );
    }
    Ok(())
}

async fn cmd_runs_show(config_path: Option<&Path>, id: &str) -> Result<()> {
    let run_id: RunId = id
        .parse()
        .map_err(|e| eyre!("invalid run ID '{id}': {e}"))?;
    let registry = open_registry(config_path).await?;

    let file = registry
        .get(&run_id)
        .await?
        .ok_or_else(|| eyre!("no generated document with ID {id}"))?;

    println!("ID:       {}", file.id);
    println!("Source:   {}", file.source);
    println!("Input:    {}", file.input);
    println!("Output:   {}", file.output_path);
    println!("Created:  {}", file.created_at.to_rfc3339());
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "autoblog",
            "--source",
            "gdoc",
            "--input",
            "https://docs.google.com/document/d/abc/edit",
            "-o",
            "post.docx",
        ])
        .expect("parse");

        assert!(cli.command.is_none());
        assert!(matches!(cli.generate.source, Some(SourceArg::Gdoc)));
        assert_eq!(cli.generate.output, Some(PathBuf::from("post.docx")));
    }

    #[test]
    fn generate_requires_source_and_input() {
        assert!(Cli::try_parse_from(["autoblog", "--input", "https://x"]).is_err());
        assert!(Cli::try_parse_from(["autoblog", "--source", "slack"]).is_err());
        assert!(Cli::try_parse_from(["autoblog", "--source", "teams", "--input", "x"]).is_err());
    }

    #[test]
    fn subcommands_do_not_need_generate_flags() {
        let cli = Cli::try_parse_from(["autoblog", "runs", "list", "--limit", "5"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Runs {
                action: RunsAction::List { limit: 5 }
            })
        ));

        let cli = Cli::try_parse_from(["autoblog", "-v", "config", "show"]).expect("parse");
        assert_eq!(cli.verbose, 1);
    }
}

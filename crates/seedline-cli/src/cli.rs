//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use seedline_config::{ConfigLoader, LogOutput, SyncConfig};
use seedline_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, init_logging};

use crate::client::{AppContext, CliResult};
use crate::commands::{torrents, watch};

/// Parses CLI arguments and executes the requested command. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);

    let result = execute(cli, command_name).await;
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli, command_name: &'static str) -> CliResult<()> {
    let config = load_config(&cli)?;
    install_logging(&config);
    let _context = GlobalContextGuard::new(command_name);
    seedline_telemetry::record_api_url(&config.api.base_url);

    let ctx = AppContext::from_config(&config, cli.output)?;
    let result = dispatch(&ctx, cli.command).await;
    ctx.engine.shutdown().await;
    result
}

pub(crate) async fn dispatch(ctx: &AppContext, command: Command) -> CliResult<()> {
    match command {
        Command::Ls => torrents::handle_list(ctx).await,
        Command::Add(args) => torrents::handle_add(ctx, args).await,
        Command::Pause(args) => torrents::handle_pause(ctx, args).await,
        Command::Resume(args) => torrents::handle_resume(ctx, args).await,
        Command::Rm(args) => torrents::handle_remove(ctx, args).await,
        Command::OpenDownloads => torrents::handle_open_downloads(ctx).await,
        Command::Path => torrents::handle_downloads_path(ctx).await,
        Command::Watch => {
            watch::handle_watch(ctx, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
    }
}

fn load_config(cli: &Cli) -> CliResult<SyncConfig> {
    let mut loader = ConfigLoader::from_env();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(url) = &cli.api_url {
        loader = loader.with_var("SEEDLINE_API_URL", url.clone());
    }
    if let Some(timeout) = cli.timeout {
        loader = loader.with_var("SEEDLINE_HTTP_TIMEOUT_SECS", timeout.to_string());
    }
    Ok(loader.load()?)
}

fn install_logging(config: &SyncConfig) {
    let format = match config.logging.format {
        LogOutput::Auto => LogFormat::infer(),
        LogOutput::Json => LogFormat::Json,
        LogOutput::Pretty => LogFormat::Pretty,
    };
    let logging = LoggingConfig {
        level: &config.logging.level,
        format,
        build_sha: option_env!("SEEDLINE_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging disabled: {err}");
    }
}

pub(crate) const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Ls => "ls",
        Command::Add(_) => "add",
        Command::Pause(_) => "pause",
        Command::Resume(_) => "resume",
        Command::Rm(_) => "rm",
        Command::OpenDownloads => "open-downloads",
        Command::Path => "path",
        Command::Watch => "watch",
    }
}

#[derive(Parser)]
#[command(
    name = "seedline",
    version,
    about = "Control a remote torrent backend from the terminal"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Backend API base URL (default http://127.0.0.1:8000/api, env SEEDLINE_API_URL)"
    )]
    pub(crate) api_url: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        help = "Timeout for list and control requests (env SEEDLINE_HTTP_TIMEOUT_SECS)"
    )]
    pub(crate) timeout: Option<u64>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "JSON config file (env SEEDLINE_CONFIG)"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List torrents known to the backend.
    Ls,
    /// Add a magnet link or a .torrent file.
    Add(AddArgs),
    /// Pause a torrent.
    Pause(TargetArgs),
    /// Resume a paused torrent.
    Resume(TargetArgs),
    /// Remove a torrent, optionally deleting its payload.
    #[command(alias = "remove")]
    Rm(RemoveArgs),
    /// Ask the backend to reveal its download folder.
    OpenDownloads,
    /// Print the backend's download folder.
    Path,
    /// Follow torrent state until interrupted.
    Watch,
}

#[derive(Args, Debug)]
pub(crate) struct AddArgs {
    /// Magnet URI or path to a .torrent file.
    pub(crate) source: String,
}

#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    /// Torrent identifier as shown by `ls`.
    pub(crate) id: String,
}

#[derive(Args, Debug)]
pub(crate) struct RemoveArgs {
    /// Torrent identifier as shown by `ls`.
    pub(crate) id: String,
    /// Delete downloaded data as well.
    #[arg(long)]
    pub(crate) delete_files: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "seedline",
            "rm",
            "t1",
            "--delete-files",
            "--output",
            "json",
            "--api-url",
            "http://seedbox:8000/api",
        ])?;
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.api_url.as_deref(), Some("http://seedbox:8000/api"));
        match cli.command {
            Command::Rm(args) => {
                assert_eq!(args.id, "t1");
                assert!(args.delete_files);
            }
            _ => panic!("expected rm"),
        }
        Ok(())
    }

    #[test]
    fn command_labels_match_subcommand_names() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["seedline", "open-downloads"])?;
        assert_eq!(command_label(&cli.command), "open-downloads");
        let cli = Cli::try_parse_from(["seedline", "remove", "abc"])?;
        assert_eq!(command_label(&cli.command), "rm");
        Ok(())
    }

    #[test]
    fn flags_override_configured_values() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["seedline", "--timeout", "3", "--api-url", "https://x.test/api", "ls"])?;
        let config = load_config(&cli).map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(config.api.base_url, "https://x.test/api");
        assert_eq!(config.api.request_timeout_secs, 3);
        Ok(())
    }
}

mod commands;
mod utils;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use inspector_config::{Config, logger::LoggerConfig};
use tracing::error;

use crate::commands::{init::InitCmd, serve::ServeCmd};

#[derive(Parser)]
#[command(name = "inspector-bridge")]
#[command(version)]
#[command(about = "Remote-debugging bridge for embedded script engines")]
#[command(
    long_about = "Serves the debugger discovery endpoint and WebSocket protocol for an embedded \
script engine. This binary wraps the built-in loopback engine, which is useful for checking that \
a debugger front-end can discover, attach to, pause and resume a target."
)]
#[command(after_help = "EXAMPLES:\n  \
    # Write a default inspector.json\n  \
    inspector-bridge init\n\n  \
    # Serve on the default port and wait for a debugger\n  \
    inspector-bridge serve --wait\n\n  \
    # Serve on a free port with debug logging\n  \
    inspector-bridge -v serve --port 0\n\
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path, defaults to ./inspector.json
    #[arg(long, short = 'c', global = true, default_value_t = Config::default_path())]
    config: Utf8PathBuf,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Cli {
    async fn handle(&self, cfg: Config) -> Result<()> {
        match &self.command {
            Commands::Serve(cmd) => {
                cmd.handle(cfg).await?;
            }
            Commands::Init(cmd) => {
                cmd.handle(&self.config)?;
            }
            Commands::Version => {
                println!(
                    "inspector-bridge {} (protocol {})",
                    env!("CARGO_PKG_VERSION"),
                    cfg.target.protocol_version
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the bridge and tick it until interrupted
    #[command(
        long_about = "Starts the inspector around the loopback engine. Debugger front-ends can find \
it through /json/list and attach over WebSocket. Runs until Ctrl-C."
    )]
    Serve(ServeCmd),

    /// Write a default configuration file
    Init(InitCmd),

    /// Print version information
    Version,
}

// The inspector is tied to the thread that created it
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            utils::logger::init_logger(&LoggerConfig::default(), cli.quiet, cli.verbose);
            error!("{e:#}");
            std::process::exit(1);
        }
    };
    utils::logger::init_logger(&cfg.logger, cli.quiet, cli.verbose);

    if let Err(e) = cli.handle(cfg).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

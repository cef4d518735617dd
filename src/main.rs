//! diag-tool - run system diagnostic tools from the command line
//!
//! Tools are discovered through the management service (or directly from
//! descriptor files with `--local`) and their tests are run one by one.

use clap::Parser;
use commands::Commands;
use diagtool::{cli, commands, common, manager};

#[derive(Parser)]
#[command(name = "diag-tool", about = "Run system diagnostic tools and collect their reports")]
#[command(version, long_about = None)]
struct Cli {
    /// Read tool descriptors from disk instead of asking the management service
    #[arg(long, global = true)]
    local: bool,

    /// Locale used for display names (default: from the environment)
    #[arg(long, global = true)]
    locale: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => {
            if let Some(log_file) = common::logging::init_manager() {
                tracing::info!(log_file = %log_file.display(), "Logging to file");
            }
            match common::config::Config::load() {
                Ok(config) => manager::run(&config).await,
                Err(e) => Err(e),
            }
        }
        command => {
            common::logging::init_cli();
            let options = cli::GlobalOptions {
                local: cli.local,
                locale: cli.locale,
            };
            cli::dispatch(command, options).await
        }
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(e.exit_code());
    }
}

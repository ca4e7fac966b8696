use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use giveaway_agent::app::App;
use giveaway_agent::cli::Cli;
use giveaway_agent::config::AppConfig;
use giveaway_agent::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Install rustls crypto provider before any TLS usage. An earlier
    // install is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let _log_guard = logging::init(cli.log_level.directive());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?cli.mode,
        "giveaway-agent starting"
    );

    match run(cli).await {
        Ok(()) => {
            info!("giveaway-agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> giveaway_agent::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let app = App::initialize(config).await;

    let result = app.run(cli.mode, cli.interval).await;
    app.shutdown().await;
    result
}

use clap::Parser;
use proxmox_provider::cli::Cli;
use proxmox_provider::telemetry;
use std::process::ExitCode;

/// The main entry point of the provisioner.
///
/// The resulting document goes to stdout, logs and diagnostics to stderr.
///
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging.
    let subscriber = telemetry::get_subscriber(cli.log_level(), cli.log_format, std::io::stderr);
    if let Err(error) = telemetry::init_subscriber(subscriber) {
        eprintln!("{}: {}", error.summary(), error);
        return ExitCode::FAILURE;
    }
    tracing::info!(?cli, "Cli arguments parsed.");

    let output = cli
        .run()
        .await
        .and_then(|output| Ok(serde_json::to_string_pretty(&output)?));

    match output {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(%error, "Command failed.");
            eprintln!("{}: {}", error.summary(), error);
            ExitCode::FAILURE
        }
    }
}

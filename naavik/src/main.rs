use std::process::ExitCode;

use clap::Parser;
use mesh_common::options::CliArgs;

/// Process entry point (spec.md §6): seeds env defaults from `--config_path`
/// before parsing so the precedence order is flag > env > file > built-in
/// default, installs the global logger, publishes the options snapshot, and
/// hands off to [`naavik::bootstrap::run`]. Exit codes follow spec.md §6:
/// `0` on graceful stop, `1` on unrecoverable startup error.
#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "--config_path")
        .map(|w| w[1].clone())
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| "/etc/mesh/config.yaml".to_string());
    naavik::bootstrap::apply_config_file_defaults(&config_path);

    let args = CliArgs::parse();
    mesh_common::logging::init(&args.log_level);
    mesh_common::options::init(args.clone());

    if let Err(err) = naavik::bootstrap::run(args).await {
        tracing::error!(error = %err, "fatal startup error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

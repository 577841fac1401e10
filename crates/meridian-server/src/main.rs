//! `meridian-server`: run one backend service from config.
//!
//! Run with: `cargo run -p meridian-server -- --service game`

use std::process::ExitCode;

use clap::Parser;
use meridian_config::{CONFIG_FILE_NAME, CliArgs, Config, ServiceKind, default_config_dir};
use meridian_server::{
    AuthService, GameService, GatewayService, RunContext, RunError, ZoneService, run_service,
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal error: {e}");
            eprintln!("Fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<(), RunError> {
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let config_path = config_dir.join(CONFIG_FILE_NAME);
    let existed = config_path.exists();
    let (mut config, load_error) = match Config::load_or_create(&config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_cli_overrides(&args);

    let level = config.listen_settings(args.service).log_level;
    let log = meridian_log::init_logging(&config.logging, &level)?;
    match load_error {
        Some(e) => tracing::warn!(
            "Failed to load config from {}: {e}, using defaults",
            config_dir.display()
        ),
        None if existed => tracing::info!("Loaded config from {}", config_path.display()),
        None => tracing::info!("Created default config at {}", config_path.display()),
    }

    let context = RunContext {
        config: config.clone(),
        config_dir,
        log: Some(log),
        overrides: Some(args.clone()),
    };
    let stdin = BufReader::new(tokio::io::stdin());

    match args.service {
        ServiceKind::Auth => run_service(AuthService::new(), context, stdin).await,
        ServiceKind::Gateway => {
            run_service(GatewayService::new(&config.gateway), context, stdin).await
        }
        ServiceKind::Game => run_service(GameService::new(&config.game), context, stdin).await,
        ServiceKind::Zone => run_service(ZoneService::new(&config.zone), context, stdin).await,
    }
}

//! `meridian-client`: send test requests to a Meridian service.
//!
//! Run with: `cargo run -p meridian-client -- --connect 127.0.0.1 8001`

use std::process::ExitCode;

use clap::Parser;
use meridian_client::{Client, ClientCommand};
use meridian_config::LoggingConfig;
use meridian_net::SocketConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "meridian-client", about = "Interactive Meridian test client")]
struct ClientArgs {
    /// Connect to `<host> <port>` before reading commands.
    #[arg(long, num_args = 2, value_names = ["HOST", "PORT"])]
    connect: Option<Vec<String>>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = ClientArgs::parse();
    let logging = LoggingConfig {
        file_output: false,
        ..LoggingConfig::default()
    };
    if let Err(e) = meridian_log::init_logging(&logging, &args.log_level) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = received_rx.recv().await {
            tracing::info!("{line}");
        }
    });

    let mut client = Client::new(SocketConfig::default(), received_tx);
    for line in client.execute(ClientCommand::Help).await.unwrap_or_default() {
        tracing::info!("{line}");
    }
    if let Some(target) = args.connect {
        let command = ClientCommand::parse(&format!("connect {}", target.join(" ")));
        for line in client.execute(command).await.unwrap_or_default() {
            tracing::info!("{line}");
        }
    }

    let code = match read_commands(&mut client).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Failed to read input: {e}");
            ExitCode::FAILURE
        }
    };

    client.disconnect().await;
    drop(client);
    if let Err(e) = printer.await {
        tracing::warn!("Output task failed: {e}");
    }
    code
}

async fn read_commands(client: &mut Client) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };
        match client.execute(ClientCommand::parse(&line)).await {
            Some(output) => {
                for text in output {
                    tracing::info!("{text}");
                }
            }
            None => return Ok(()),
        }
    }
}

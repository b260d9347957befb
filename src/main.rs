mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{ClientArgs, Cli, Commands, ServerArgs};
use uftp::client::run_interactive;
use uftp::{Client, LocalFs, Shutdown, UftpServer};

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let server = args.server();
    let mut client = Client::connect(&server, &args.config())
        .await
        .with_context(|| format!("could not open a socket to {server}"))?;

    let local = LocalFs::new(".");
    let stdin = BufReader::new(tokio::io::stdin());
    run_interactive(&mut client, &local, stdin, &mut std::io::stdout()).await
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.config();
    let mut server = UftpServer::bind(&config)
        .await
        .with_context(|| format!("could not bind to {}", config.bind))?;

    if let Some(stun_server) = &config.stun_server {
        match server.discover_public_addr(stun_server).await {
            Ok(public) => info!(%public, "public address"),
            Err(err) => warn!(error = %err, "could not discover public address"),
        }
    }
    info!(addr = %server.local_addr()?, root = %config.root.display(), "bound");

    let shutdown = Shutdown::new();
    let mut trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.trigger();
        }
    });

    server.listen(shutdown).await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.cmd {
        Commands::Client(args) => {
            init_tracing("warn");
            run_client(args).await
        }
        Commands::Server(args) => {
            init_tracing("info");
            run_server(args).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("uftp: {err:#}");
            ExitCode::FAILURE
        }
    }
}

//! schemaport binary.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - Connection URLs are redacted in every log line and in the document
//! - The gateway token is never logged

use clap::Parser;
use schemaport::cli::{Cli, Command, ExportArgs, GatewayArgs};
use schemaport::output::{render_document, write_document};
use schemaport_core::connectors::{ConnectionLimits, ConnectorFactory, ConnectorRegistry};
use schemaport_core::gateway::{Gateway, GatewayConfig};
use schemaport_core::logging::{LoggingConfig, init_logging};
use schemaport_core::pipeline::ExportPipeline;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.global.debug;

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if debug {
                eprintln!("Error: {:?}", e);
            } else {
                eprintln!("Error: {}", e);
                eprintln!("(use --debug option to see the full error)");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    init_logging(
        LoggingConfig::new()
            .with_debug(cli.global.debug)
            .with_quiet(cli.global.quiet)
            .with_json(cli.global.json_logs),
    )?;

    if !cli.global.quiet {
        eprintln!(
            "schemaport {} - portable schema export",
            env!("CARGO_PKG_VERSION")
        );
    }

    match cli.command {
        Command::Export(args) => export(&args).await,
        Command::Gateway(args) => gateway(args).await,
        Command::List => {
            list_connectors();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing in-flight work");
            token.cancel();
        }
    });
}

async fn export(args: &ExportArgs) -> anyhow::Result<ExitCode> {
    let descriptor = args.descriptor()?;
    info!("Target: {}", descriptor.redacted_url());

    let registry = ConnectorRegistry::with_limits(
        ConnectionLimits::default().with_max_connections(args.concurrency.max(1)),
    );
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let outcome = ExportPipeline::new(Arc::new(registry), args.options())
        .with_cancellation(cancel)
        .run(&descriptor)
        .await;

    let rendered = render_document(&outcome.document, args.format)?;
    write_document(&rendered, args.output.as_deref()).await?;

    let document = &outcome.document;
    if document.has_fatal_error() {
        error!(
            run_id = %outcome.run_id,
            "Export failed with {} error(s)",
            document.errors.len()
        );
        return Ok(ExitCode::FAILURE);
    }

    info!(
        run_id = %outcome.run_id,
        "Exported {} entities, {} relations, {} non-fatal error(s)",
        document.entities.len(),
        document.relations.len(),
        document.errors.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn gateway(args: GatewayArgs) -> anyhow::Result<ExitCode> {
    let token = match args.token {
        Some(token) => token,
        None => {
            let token = uuid::Uuid::new_v4().to_string();
            eprintln!("Gateway token: {}", token);
            token
        }
    };

    let config = GatewayConfig::new(token)
        .with_bind(args.bind)
        .with_max_in_flight(args.max_in_flight);
    let gateway = Gateway::new(Arc::new(ConnectorRegistry::new()), config)?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    gateway.bind_and_serve(shutdown).await?;

    Ok(ExitCode::SUCCESS)
}

fn list_connectors() {
    println!("Available connectors:");
    for kind in ConnectorRegistry::new().available_kinds() {
        println!("  {}", kind);
    }
}

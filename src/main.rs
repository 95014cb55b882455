use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use allure_service::api;
use allure_service::config::{self, Config, LogSettings};
use allure_service::service::ReportService;
use allure_service::upstream::AllureClient;
use allure_service::AppState;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_loaded = config::load_dotenv();
    let log_settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
    let otel_enabled = init_tracing(&log_settings)?;
    if !dotenv_loaded {
        tracing::debug!("no .env file found, using process environment");
    }

    let args = cli::Cli::parse();
    let cfg = config::load().context("failed to load configuration")?;
    tracing::debug!(config = ?cfg, "configuration loaded");

    let client = AllureClient::new(&cfg).context("failed to build Allure HTTP client")?;
    let reports = ReportService::new(Arc::new(client), &cfg);

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, reports, port).await
        }
        Some(cli::Commands::NextLaunch { after }) => handle_next_launch(&reports, &after).await,
        Some(cli::Commands::Report { command }) => handle_report_command(&reports, command).await,
        None => {
            let port = cfg.port;
            run_server(cfg, reports, port).await
        }
    };

    if otel_enabled {
        opentelemetry::global::shutdown_tracer_provider();
    }

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Installs the global subscriber. Returns whether OTLP export is active.
fn init_tracing(settings: &LogSettings) -> anyhow::Result<bool> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if let Some(endpoint) = &settings.otlp_endpoint {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "allure-service"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };
    let otel_enabled = telemetry_layer.is_some();

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&settings.filter))
        .with(telemetry_layer);

    if settings.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(otel_enabled)
}

async fn run_server(cfg: Config, reports: ReportService, port: u16) -> anyhow::Result<()> {
    tracing::info!(
        base_url = %cfg.base_url,
        project_id = %cfg.project_id,
        "starting allure-service"
    );

    let state = Arc::new(AppState {
        config: cfg,
        reports,
    });
    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("allure-service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("allure-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

async fn handle_next_launch(reports: &ReportService, after: &str) -> anyhow::Result<()> {
    let after = api::handlers::parse_after(after).map_err(|e| anyhow::anyhow!("{}", e))?;
    let launch = reports
        .next_launch(after, &CancellationToken::new())
        .await
        .context("failed to find next launch")?;
    println!("{}", serde_json::to_string_pretty(&launch)?);
    Ok(())
}

async fn handle_report_command(
    reports: &ReportService,
    cmd: cli::ReportCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::ReportCommands::Generate { launch_id, name } => {
            if launch_id == 0 || name.trim().is_empty() {
                anyhow::bail!("both --launch-id (non-zero) and --name (non-empty) are required");
            }
            let report = reports
                .generate_report(launch_id, &name, &CancellationToken::new())
                .await
                .context("failed to generate report")?;
            println!(
                "Report requested:\n  ID:       {}\n  Status:   {}\n  Download: {}",
                report.id,
                report.status,
                reports.download_link(&report.id.to_string())
            );
        }
        cli::ReportCommands::Link { id } => {
            println!("{}", reports.download_link(&id));
        }
        cli::ReportCommands::Download { id, output } => {
            let report = reports
                .download_report(&id, &CancellationToken::new())
                .await
                .context("failed to download report")?;
            let path = output.unwrap_or_else(|| report.file_name.clone().into());
            tokio::fs::write(&path, &report.content)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "Saved {} ({} bytes)",
                path.display(),
                report.content.len()
            );
        }
    }
    Ok(())
}

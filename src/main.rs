use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use placement_hub::config::{AppConfig, EngineConfig};
use placement_hub::error::AppError;
use placement_hub::telemetry;
use placement_hub::workflows::placements::{
    placement_router, GateSettings, InMemoryAttemptRepository, MigrationReport,
    PlacementApplicationService, TierCatalog,
};
use serde_json::json;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

type GateService = PlacementApplicationService<InMemoryAttemptRepository>;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
    gate: Arc<GateService>,
}

#[derive(Parser, Debug)]
#[command(
    name = "Campus Placement Gate",
    about = "Run the placement application gate and quota service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect tier catalog configuration
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Validate an admin tier-catalog CSV export and print the ladder
    Validate(CatalogArgs),
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Path to the catalog CSV (label,lower_bound,upper_bound,cap)
    #[arg(long)]
    path: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Catalog {
            command: CatalogCommand::Validate(args),
        } => run_catalog_validate(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let catalog = load_catalog(&config.engine)?;
    let settings = GateSettings {
        reservation_ttl: Duration::seconds(config.engine.reservation_ttl_secs as i64),
    };
    let service = Arc::new(PlacementApplicationService::new(
        Arc::new(InMemoryAttemptRepository::default()),
        catalog,
        settings,
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
        gate: service.clone(),
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/admin/tier-catalog", put(catalog_reload_endpoint))
        .with_state(state)
        .merge(placement_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement application gate ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn load_catalog(engine: &EngineConfig) -> Result<TierCatalog, AppError> {
    match &engine.tier_catalog_path {
        Some(path) => {
            let catalog = TierCatalog::from_csv_path(path)?;
            info!(path = %path.display(), tiers = catalog.tiers().len(), "tier catalog imported");
            Ok(catalog)
        }
        None => Ok(TierCatalog::standard()),
    }
}

fn run_catalog_validate(args: CatalogArgs) -> Result<(), AppError> {
    let catalog = TierCatalog::from_csv_path(&args.path)?;

    println!("Tier catalog OK ({} tiers)", catalog.tiers().len());
    for line in catalog_lines(&catalog) {
        println!("- {line}");
    }

    Ok(())
}

fn catalog_lines(catalog: &TierCatalog) -> Vec<String> {
    catalog
        .tiers()
        .iter()
        .map(|tier| {
            let range = match tier.upper_bound {
                Some(upper) => format!("{}..{}", tier.lower_bound, upper),
                None => format!("{}..", tier.lower_bound),
            };
            format!(
                "{} [{}] {} (cap {})",
                tier.id, tier.label, range, tier.application_cap
            )
        })
        .collect()
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Replace the tier catalog mid-cycle from an admin CSV export; live quota
/// usage is migrated by original compensation values, and a conflicting
/// replacement leaves the current catalog serving.
async fn catalog_reload_endpoint(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<MigrationReport>, AppError> {
    let replacement = TierCatalog::from_csv_reader(Cursor::new(body.into_bytes()))?;
    let report = state.gate.replace_catalog(replacement)?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        // build_recorder avoids installing the process-global recorder twice
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let prometheus_handle = recorder.handle();
        let service = Arc::new(PlacementApplicationService::new(
            Arc::new(InMemoryAttemptRepository::default()),
            TierCatalog::standard(),
            GateSettings::default(),
        ));
        AppState {
            readiness: Arc::new(AtomicBool::new(true)),
            metrics: prometheus_handle,
            gate: service,
        }
    }

    #[tokio::test]
    async fn catalog_reload_endpoint_swaps_the_ladder() {
        let state = test_state();
        let csv = "label,lower_bound,upper_bound,cap\n\
                   Entry,0,1000000,20\n\
                   Senior,1000000,,5\n"
            .to_string();

        let Json(report) = catalog_reload_endpoint(State(state), csv)
            .await
            .expect("catalog replaces");

        assert_eq!(report.entries_before, 0);
        assert_eq!(report.consumed_units, 0);
    }

    #[tokio::test]
    async fn catalog_reload_endpoint_rejects_malformed_exports() {
        let state = test_state();
        let csv = "label,lower_bound,upper_bound,cap\nEntry,oops,1000000,20\n".to_string();

        match catalog_reload_endpoint(State(state), csv).await {
            Err(AppError::Catalog(_)) => {}
            other => panic!("expected catalog error, got {other:?}"),
        }
    }

    #[test]
    fn load_catalog_falls_back_to_standard_ladder() {
        let engine = EngineConfig {
            reservation_ttl_secs: 900,
            tier_catalog_path: None,
        };
        let catalog = load_catalog(&engine).expect("standard catalog loads");
        assert_eq!(catalog.tiers().len(), 5);
    }

    #[test]
    fn catalog_lines_render_ranges_and_caps() {
        let lines = catalog_lines(&TierCatalog::standard());
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("0..300000"));
        assert!(lines[0].contains("cap 15"));
        assert!(lines[4].contains("2000000.."));
    }
}

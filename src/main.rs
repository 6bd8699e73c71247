use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, cors_layer_from_env_value, router};
use mdr_core::{CoreConfig, database_name_from_env_value, store};

/// Main entry point for the MDR service
///
/// Connects to the document store once, then serves the REST API (with Swagger UI) until the
/// process is stopped. An unreachable store is fatal at startup.
///
/// # Environment Variables
/// - `MONGO_URI`: document store URI (required; `memory://` selects the in-process store)
/// - `MONGO_DB`: database name (default: the URI path, then `SamplePatientService`)
/// - `MDR_REST_ADDR`: REST server address (default: "0.0.0.0:8000")
/// - `ALLOWED_ORIGINS`: comma-separated CORS origins (default: any origin)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the store cannot be reached,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mdr=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store_uri = std::env::var("MONGO_URI").context("MONGO_URI must be set")?;
    let database = database_name_from_env_value(&store_uri, std::env::var("MONGO_DB").ok());
    let rest_addr = std::env::var("MDR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());

    let cfg = CoreConfig::new(store_uri, database)?;
    let collections = store::connect(&cfg)
        .await
        .context("failed to connect to the document store")?;

    let app = router(
        AppState::new(&collections),
        cors_layer_from_env_value(std::env::var("ALLOWED_ORIGINS").ok()),
    );

    tracing::info!("++ Starting MDR REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

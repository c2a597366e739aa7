use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use meal_ticket_server::config::Config;
use meal_ticket_server::decoder::BarcodeImageDecoder;
use meal_ticket_server::routes::create_routes;
use meal_ticket_server::state::AppState;
use meal_ticket_server::store::{InMemoryTicketStore, PgTicketStore, TicketStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meal_ticket_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let store: Arc<dyn TicketStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            tracing::info!("Migrations run successfully");
            Arc::new(PgTicketStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, tickets are kept in memory only");
            Arc::new(InMemoryTicketStore::new())
        }
    };

    let decoder = BarcodeImageDecoder::with_defaults(
        config.decoder.remote_url.as_deref(),
        config.decoder.remote_timeout,
    )
    .expect("Failed to build barcode decoder");
    tracing::info!(strategies = ?decoder.strategy_names(), "Barcode decoder ready");

    let addr = config.socket_addr();
    let app = create_routes(AppState::new(config, store, decoder));

    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}

use std::sync::Arc;

use quizhive::questions::{BuilderRegistry, CatalogProvider};
use quizhive::registry::Registry;
use quizhive::config;
use quizhive::server::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    config::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("Invalid PORT");

    let rules = config::load_rules();
    let catalog = config::load_catalog();
    let provider = Arc::new(CatalogProvider::new(catalog, BuilderRegistry::standard()));
    let registry = Registry::new();

    let state = AppState {
        registry,
        provider,
        rules,
    };

    server::run(state, port).await;
}

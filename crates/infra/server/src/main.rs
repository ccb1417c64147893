//! supasaasy server binary: loads configuration, registers connectors,
//! assembles the HTTP router, and spawns the worker and scheduler loops.

use std::sync::Arc;

use supasaasy_adapter_memory::{
    InMemoryEntityStore, InMemoryJobStore, InMemorySyncStateStore, InMemoryWebhookLogStore,
    NullWebhookLogStore,
};
use supasaasy_connector_billing::StripeConnector;
use supasaasy_connector_crm::HubSpotConnector;
use supasaasy_connector_docs::NotionConnector;
use supasaasy_connectors::ConnectorRegistry;
use supasaasy_core::traits::WebhookLogStore;
use supasaasy_server::{admin_api_key, build_router, build_scheduler, build_worker, config, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::var("SUPASAASY_CONFIG").unwrap_or_else(|_| "supasaasy.toml".to_string());
    let resolved = config::load_config(&config_path)?;
    for warning in &resolved.warnings {
        tracing::warn!("{warning}");
    }

    if admin_api_key().is_empty() {
        tracing::warn!("ADMIN_API_KEY is unset; /sync will reject every request");
    }

    let mut registry = ConnectorRegistry::new();
    registry.register(Arc::new(StripeConnector::new()));
    registry.register(Arc::new(HubSpotConnector::new()));
    registry.register(Arc::new(NotionConnector::new()));

    let validation_failures = {
        registry.load_apps(resolved.apps.clone()).await;
        registry.validate_all(resolved.server.production).await
    };
    if !validation_failures.is_empty() {
        for (app_key, errors) in &validation_failures {
            tracing::error!(app_key, ?errors, "connector configuration invalid");
        }
        return Err("one or more apps failed connector configuration validation".into());
    }

    let entity_store = Arc::new(InMemoryEntityStore::new());
    let webhook_log_store: Arc<dyn WebhookLogStore> = if resolved.webhook_logging.enabled {
        Arc::new(InMemoryWebhookLogStore::new(1000))
    } else {
        Arc::new(NullWebhookLogStore)
    };

    let ctx = AppContext {
        registry: Arc::new(registry),
        entity_store: entity_store.clone(),
        sync_state_store: Arc::new(InMemorySyncStateStore::new()),
        job_store: Arc::new(InMemoryJobStore::new()),
        webhook_log_store,
        engine: Arc::new(supasaasy_sync_engine::PaginatedSyncEngine::new(entity_store)),
        config: resolved,
    };

    let host = ctx.config.server.host.clone();
    let port = ctx.config.server.port;
    let router = build_router(&ctx);

    tokio::spawn(build_worker(&ctx).run());
    tokio::spawn(build_scheduler(&ctx).run());

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(host, port, "supasaasy server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

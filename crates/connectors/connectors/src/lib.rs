//! # supasaasy connector registry
//!
//! Resolves a provider name (`"stripe"`) or an app_key (a configured
//! connection instance) to the registered [`Connector`] implementation.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use supasaasy_core::traits::Connector;
use supasaasy_core::types::AppConfig;

pub use error::{ConnectorError, ConnectorRegistryResult};

/// Process-wide registry of connector implementations and configured apps.
///
/// Mirrors a two-tier resolution: `app_key` → `AppConfig.connector` (provider
/// name) → registered `Connector`. Initialized once at startup; tests reset
/// it explicitly by constructing a fresh instance.
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
    apps: RwLock<HashMap<String, AppConfig>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
            apps: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connector implementation under its `name()`.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.name(), connector);
    }

    /// Replaces the full set of configured apps (as loaded from configuration).
    pub async fn load_apps(&self, apps: Vec<AppConfig>) {
        let mut guard = self.apps.write().await;
        guard.clear();
        for app in apps {
            guard.insert(app.app_key.clone(), app);
        }
    }

    /// Looks up a connector by provider name directly.
    pub fn get_connector(&self, provider: &str) -> ConnectorRegistryResult<Arc<dyn Connector>> {
        self.connectors
            .get(provider)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownConnector(provider.to_string()))
    }

    /// Resolves an app_key to its configuration and registered connector.
    pub async fn resolve(
        &self,
        app_key: &str,
    ) -> ConnectorRegistryResult<(AppConfig, Arc<dyn Connector>)> {
        let apps = self.apps.read().await;
        let app = apps
            .get(app_key)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownApp(app_key.to_string()))?;
        let connector = self.get_connector(&app.connector)?;
        Ok((app, connector))
    }

    /// Validates every configured app's connector config, returning the
    /// failures keyed by app_key. Empty result means everything is valid.
    /// `production` is forwarded to each connector's `validate_config` to
    /// gate direct-secret rejection.
    pub async fn validate_all(&self, production: bool) -> HashMap<String, Vec<String>> {
        let apps = self.apps.read().await;
        let mut failures = HashMap::new();
        for app in apps.values() {
            if let Ok(connector) = self.get_connector(&app.connector) {
                let errors = connector.validate_config(&app.config, production);
                if !errors.is_empty() {
                    failures.insert(app.app_key.clone(), errors);
                }
            } else {
                failures.insert(
                    app.app_key.clone(),
                    vec![format!("unknown connector: {}", app.connector)],
                );
            }
        }
        failures
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use supasaasy_core::error::CoreResult;
    use supasaasy_core::traits::ConnectorPage;
    use supasaasy_core::types::{
        ConnectorAppConfig, ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent, SecretRef,
    };

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                name: "stub".into(),
                display_name: "Stub".into(),
                version: "0.1.0".into(),
                api_version: "1".into(),
                supported_resources: Vec::new(),
            }
        }

        fn resource_types(&self) -> &[&'static str] {
            &["widget"]
        }

        fn validate_config(&self, _config: &ConnectorAppConfig, _production: bool) -> Vec<String> {
            Vec::new()
        }

        async fn list_page(
            &self,
            _app_key: &str,
            _app_config: &ConnectorAppConfig,
            _resource_type: &str,
            _cursor: Option<&str>,
            _since: Option<chrono::DateTime<chrono::Utc>>,
        ) -> CoreResult<ConnectorPage> {
            Ok(ConnectorPage {
                items: Vec::<NormalizedEntity>::new(),
                next_cursor: None,
            })
        }

        fn verify_signature(
            &self,
            _headers: &HashMap<String, String>,
            _raw_body: &[u8],
            _secret: &str,
        ) -> CoreResult<()> {
            Ok(())
        }

        fn parse_webhook(&self, _raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn resolve_unknown_app_is_rejected() {
        let registry = ConnectorRegistry::new();
        let result = registry.resolve("missing").await;
        assert!(matches!(result, Err(ConnectorError::UnknownApp(_))));
    }

    #[tokio::test]
    async fn resolve_maps_app_key_through_connector_name() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(StubConnector));
        registry
            .load_apps(vec![AppConfig {
                app_key: "stub_test".into(),
                name: "Stub Test".into(),
                connector: "stub".into(),
                config: ConnectorAppConfig {
                    api_key: SecretRef::Direct("k".into()),
                    webhook_secret: SecretRef::Direct("s".into()),
                    sync_from: None,
                    sync_resources: None,
                },
            }])
            .await;

        let (app, connector) = registry.resolve("stub_test").await.unwrap();
        assert_eq!(app.app_key, "stub_test");
        assert_eq!(connector.name(), "stub");
    }
}

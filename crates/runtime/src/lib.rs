use std::sync::Arc;

use anyhow::{Context, Result};
use taskboard_api::{ApiClient, BackendApi, DeviceIdentity};
use taskboard_config::AppConfig;
use taskboard_realtime::{ConnectionManager, EventDispatcher, SubscriptionHandle};
use taskboard_stores::DomainStores;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything the client needs, built once at startup and passed around.
#[derive(Clone)]
pub struct SyncServices {
    pub identity: DeviceIdentity,
    pub api: Arc<ApiClient>,
    pub dispatcher: Arc<EventDispatcher>,
    pub connection: ConnectionManager,
    pub stores: DomainStores,
    pub bindings: Vec<SubscriptionHandle>,
}

impl SyncServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let identity = DeviceIdentity::load_or_create(&config.identity.device_id_path)
            .with_context(|| {
                format!(
                    "failed to load device identity from {}",
                    config.identity.device_id_path
                )
            })?;
        info!(device_id = %identity, "device identity ready");

        let api = Arc::new(
            ApiClient::new(&config.api, identity.clone())
                .context("failed to build backend api client")?,
        );

        let dispatcher = Arc::new(EventDispatcher::new());
        let connection = ConnectionManager::new(
            &config.realtime,
            api.base_url(),
            &identity,
            dispatcher.clone(),
        )
        .context("failed to prepare realtime connection")?;

        let backend: Arc<dyn BackendApi> = api.clone();
        let stores = DomainStores::new(backend, &config.api);
        let bindings = stores.bind(&dispatcher);

        info!(
            api = %api.base_url(),
            socket = %connection.endpoint(),
            "sync services ready"
        );

        Ok(Self {
            identity,
            api,
            dispatcher,
            connection,
            stores,
            bindings,
        })
    }

    /// Re-subscribe the stores, e.g. after `disconnect` cleared the dispatcher.
    pub fn rebind(&mut self) {
        self.bindings = self.stores.bind(&self.dispatcher);
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

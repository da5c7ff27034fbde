//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build admission, forwarding and the initial route table
//! - Start background tasks (config watcher, eviction sweep, SIGHUP, admin API)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::path::PathBuf;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use tokio::net::TcpListener;

use crate::admin::{self, AdminState};
use crate::config::loader::{load_config, ConfigError};
use crate::config::reload::Reloader;
use crate::config::schema::GatewayConfig;
use crate::config::watcher::ConfigWatcher;
use crate::http::forward::{Forward, HttpForwarder};
use crate::http::server::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::routing::manager::RouterManager;
use crate::routing::table::RouteCompiler;
use crate::security::rate_limit::AdmissionController;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    manager: Arc<RouterManager>,
    reloader: Arc<Reloader>,
    admission: Option<Arc<AdmissionController>>,
    shutdown: Shutdown,
}

impl Gateway {
    /// Load the config file at `path` and build the gateway from it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StartupError> {
        let path = path.into();
        let config = load_config(&path)?;
        Ok(Self::new(path, config))
    }

    pub fn new(path: impl Into<PathBuf>, config: GatewayConfig) -> Self {
        let admission = config
            .rate_limit
            .enabled
            .then(|| Arc::new(AdmissionController::from_config(&config.rate_limit)));
        let forwarder: Arc<dyn Forward> = Arc::new(HttpForwarder::new(&config.timeouts));
        let compiler = RouteCompiler::new(admission.clone(), forwarder);

        let table = compiler.compile(&config.routes);
        tracing::info!(
            routes = table.len(),
            skipped = table.skipped(),
            rate_limit = config.rate_limit.enabled,
            "Initial route table compiled"
        );

        let manager = Arc::new(RouterManager::new(table));
        let reloader = Arc::new(Reloader::new(path, compiler, Arc::clone(&manager), config.clone()));

        Self {
            config,
            manager,
            reloader,
            admission,
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<RouterManager> {
        &self.manager
    }

    pub fn reloader(&self) -> &Arc<Reloader> {
        &self.reloader
    }

    /// Handle for stopping the gateway from outside.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Bind `listener.bind_address` and serve until shutdown.
    pub async fn run(self) -> Result<(), StartupError> {
        let listener = bind(&self.config.listener.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let config = &self.config;

        let _watch = if config.watcher.enabled {
            let watcher = ConfigWatcher::new(Arc::clone(&self.reloader), config.watcher.debounce());
            Some(watcher.spawn(self.shutdown.subscribe())?)
        } else {
            tracing::info!("Config watcher disabled");
            None
        };

        if let Some(admission) = &self.admission {
            Arc::clone(admission).spawn_eviction(
                config.rate_limit.sweep_interval(),
                config.rate_limit.idle_ttl(),
                self.shutdown.subscribe(),
            );
        }

        signals::spawn_reload_on_hangup(Arc::clone(&self.reloader), &self.shutdown);

        let admin = if config.admin.enabled {
            let admin_listener = bind(&config.admin.bind_address).await?;
            let state = AdminState::new(
                Arc::clone(&self.reloader),
                self.admission.clone(),
                config.admin.api_key.as_str(),
            );
            Some(tokio::spawn(admin::serve(admin_listener, state, self.shutdown.clone())))
        } else {
            None
        };

        let server = HttpServer::new(Arc::clone(&self.manager), config.timeouts.drain());
        let result = server.run(listener, self.shutdown.clone()).await;

        // The server may also stop on its own (listener error).
        self.shutdown.trigger();
        if let Some(admin) = admin {
            if let Ok(Err(e)) = admin.await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }

        tracing::info!("Shutdown complete");
        result.map_err(StartupError::from)
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

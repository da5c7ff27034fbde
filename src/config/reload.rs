//! Load → compile → swap.
//!
//! Shared by the file watcher, SIGHUP and the admin API so every reload path
//! has the same all-or-nothing semantics: a file that fails to load leaves
//! the live route table untouched.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::GatewayConfig;
use crate::observability::metrics;
use crate::routing::manager::RouterManager;
use crate::routing::table::RouteCompiler;

/// Outcome of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub generation: u64,
    pub routes: usize,
    pub skipped: usize,
}

pub struct Reloader {
    path: PathBuf,
    compiler: RouteCompiler,
    manager: Arc<RouterManager>,
    /// Settings that only take effect on restart, used to warn on change.
    startup: GatewayConfig,
    lock: Mutex<()>,
}

impl Reloader {
    pub fn new(
        path: impl Into<PathBuf>,
        compiler: RouteCompiler,
        manager: Arc<RouterManager>,
        startup: GatewayConfig,
    ) -> Self {
        Self {
            path: path.into(),
            compiler,
            manager,
            startup,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manager(&self) -> &Arc<RouterManager> {
        &self.manager
    }

    /// Re-read the config file and publish a freshly compiled route table.
    pub fn reload(&self) -> Result<ReloadSummary, ConfigError> {
        // Serializes reloads against each other; dispatch never takes this.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config. Keeping current route table.");
                metrics::record_reload("failed");
                return Err(e);
            }
        };
        self.warn_on_restart_only_changes(&config);

        let table = self.compiler.compile(&config.routes);
        let routes = table.len();
        let skipped = table.skipped();
        let generation = self.manager.swap(table);

        metrics::record_reload("success");
        tracing::info!(generation, routes, skipped, "Config reloaded");
        Ok(ReloadSummary {
            generation,
            routes,
            skipped,
        })
    }

    fn warn_on_restart_only_changes(&self, config: &GatewayConfig) {
        let changed = [
            ("listener", config.listener != self.startup.listener),
            ("rate_limit", config.rate_limit != self.startup.rate_limit),
            ("timeouts", config.timeouts != self.startup.timeouts),
            ("watcher", config.watcher != self.startup.watcher),
            ("observability", config.observability != self.startup.observability),
            ("admin", config.admin != self.startup.admin),
        ];
        for (section, _) in changed.iter().filter(|(_, changed)| *changed) {
            tracing::warn!(section, "Config section changed; restart required for it to take effect");
        }
    }
}

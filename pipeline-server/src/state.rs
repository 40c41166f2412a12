//! Shared application state for the HTTP server.

use std::sync::Arc;

use pipeline::error::PipelineError;
use pipeline::flow::{Collaborators, Services};
use pipeline::io::config::AppConfig;
use pipeline::io::lease::RepoLeases;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration; never mutated afterwards.
    pub config: Arc<AppConfig>,
    /// Process-wide per-repository leases.
    pub leases: Arc<RepoLeases>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            leases: Arc::new(RepoLeases::new()),
        }
    }

    /// Run `f` on the blocking pool with collaborators built for this call.
    ///
    /// The HTTP clients inside [`Services`] are blocking, so they are created
    /// and dropped on the pool thread as well.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&Collaborators<'_>) -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let leases = Arc::clone(&self.leases);
        tokio::task::spawn_blocking(move || {
            let services = Services::from_config(&config).map_err(PipelineError::config)?;
            f(&services.collaborators(&config, &leases))
        })
        .await
        .map_err(|err| PipelineError::Io(std::io::Error::other(err)))?
    }
}

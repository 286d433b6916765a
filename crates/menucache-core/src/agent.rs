//! The cache policy agent.
//!
//! Reacts to the three lifecycle signals of its host:
//!
//! - **install**: precache the static asset list into the static partition,
//!   all-or-nothing, then skip the waiting phase
//! - **activate**: delete every partition that is neither the static nor
//!   the data partition, then claim open clients
//! - **fetch**: network-first for the menu data document, cache-first for
//!   everything else
//!
//! Every async step is awaited before the corresponding method returns, so
//! "the event is finished" is simply "the future resolved". The only work
//! that outlives a call is the data refresh write, which is attached to the
//! [`FetchEvent`] instead (see [`crate::event`]).

use std::fmt;

use futures::future::{join_all, try_join_all};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{CacheError, Result};
use crate::event::FetchEvent;
use crate::host::ClientHost;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::storage::{CacheStorage, Partition};
use crate::strategy::{self, FetchOutcome, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the host will not activate this agent.
    Redundant,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Parsed => "parsed",
            AgentState::Installing => "installing",
            AgentState::Installed => "installed",
            AgentState::Activating => "activating",
            AgentState::Activated => "activated",
            AgentState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Result of the activation sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Partitions whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
    pub clients_claimed: usize,
}

pub struct CachePolicyAgent<S, N, H> {
    config: AgentConfig,
    storage: S,
    network: N,
    host: H,
    state: RwLock<AgentState>,
}

impl<S, N, H> CachePolicyAgent<S, N, H>
where
    S: CacheStorage,
    N: Network,
    H: ClientHost,
{
    pub fn new(config: AgentConfig, storage: S, network: N, host: H) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            network,
            host,
            state: RwLock::new(AgentState::Parsed),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    async fn set_state(&self, state: AgentState) {
        *self.state.write().await = state;
    }

    /// Precache the static asset list.
    ///
    /// Every listed URL is fetched concurrently. If any fetch fails or comes
    /// back with a non-2xx status, nothing is stored and the agent becomes
    /// [`AgentState::Redundant`]. A single unreachable font or placeholder
    /// host is enough to fail the whole install.
    pub async fn install(&self) -> Result<()> {
        info!(partition = %self.config.static_cache_name, "Install event");
        self.set_state(AgentState::Installing).await;

        match self.precache().await {
            Ok(count) => {
                info!(
                    partition = %self.config.static_cache_name,
                    entries = count,
                    "Precached static assets"
                );
                if let Err(e) = self.host.skip_waiting().await {
                    self.set_state(AgentState::Redundant).await;
                    return Err(e);
                }
                self.set_state(AgentState::Installed).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Install failed");
                self.set_state(AgentState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let partition = self.storage.open(&self.config.static_cache_name).await?;
        debug!(partition = %partition.name(), "Static partition open, precaching");

        let requests = self
            .config
            .precache_urls
            .iter()
            .map(|url| self.config.resolve(url).map(Request::from_url))
            .collect::<Result<Vec<_>>>()?;

        let fetches = requests.into_iter().map(|request| async move {
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| CacheError::Install {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(CacheError::Install {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok::<(Request, Response), CacheError>((request, response))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        partition.put_all(entries).await?;
        Ok(count)
    }

    /// Sweep stale partitions and take control of open clients.
    ///
    /// Deletions run concurrently and independently: a failure is logged
    /// and reported but does not stop the others or the claim.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let state = self.state().await;
        if !matches!(state, AgentState::Installed | AgentState::Activated) {
            return Err(CacheError::InvalidState {
                operation: "activate",
                state: state.to_string(),
            });
        }

        info!("Activate event");
        self.set_state(AgentState::Activating).await;

        match self.sweep_and_claim().await {
            Ok(report) => {
                self.set_state(AgentState::Activated).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Activation failed");
                self.set_state(state).await;
                Err(e)
            }
        }
    }

    async fn sweep_and_claim(&self) -> Result<ActivationReport> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !self.config.is_whitelisted(name))
            .collect();

        let deletions = stale.into_iter().map(|name| async move {
            info!(partition = %name, "Deleting stale cache partition");
            let result = self.storage.delete(&name).await;
            (name, result)
        });

        let mut report = ActivationReport::default();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(partition = %name, error = %e, "Failed to delete stale cache partition");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report.clients_claimed = self.host.claim_clients().await?;
        Ok(report)
    }

    /// Answer one intercepted request.
    ///
    /// Work attached to `event.lifetime` may still be running when this
    /// returns; the host settles it before discarding the event.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> Result<FetchOutcome> {
        let strategy = Strategy::classify(&event.request, &self.config.data_path_marker);
        debug!(url = %event.request.url, method = %event.request.method, ?strategy, "Fetch event");

        match strategy {
            Strategy::NetworkFirst => {
                strategy::network_first(
                    &self.storage,
                    &self.network,
                    &self.config.data_cache_name,
                    event,
                )
                .await
            }
            Strategy::CacheFirst => {
                strategy::cache_first(&self.storage, &self.network, &event.request).await
            }
        }
    }
}

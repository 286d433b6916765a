//! Offline caching policy for the menu single-page app.
//!
//! The crate models the page's caching agent: it precaches the app shell on
//! install, sweeps stale cache partitions on activate, and answers every
//! outgoing request either network-first (the menu data document) or
//! cache-first (everything else).
//!
//! The host platform is reached only through traits:
//! - [`storage::CacheStorage`] / [`storage::Partition`] for named cache partitions
//! - [`network::Network`] for outgoing requests
//! - [`host::ClientHost`] for the lifecycle signals (skip waiting, claim clients)
//!
//! [`CachePolicyAgent`] ties them together.

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod http;
pub mod network;
pub mod storage;
pub mod strategy;
pub mod telemetry;

pub use agent::{ActivationReport, AgentState, CachePolicyAgent};
pub use config::AgentConfig;
pub use error::{CacheError, Result};
pub use event::{ExtendableEvent, FetchEvent};
pub use host::{ClientHost, LocalHost};
pub use http::{CachedResponse, Method, Request, RequestKey, Response};
pub use network::{HttpNetwork, Network};
pub use storage::{CacheStorage, FileStorage, MemoryStorage, Partition};
pub use strategy::{FetchOutcome, Strategy};

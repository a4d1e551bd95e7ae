//! Governed client for the GRID esports GraphQL API.
//!
//! Every outbound query passes a [`gate::Gate`]: circuit breaker, optional
//! per-run budget, process-wide fixed-window budget and a TTL response cache
//! with sticky error entries. Nothing retries; failures surface as
//! [`error::GridError`].

pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod grid;
pub mod http;
pub mod server;
pub mod tools;

pub use config::{Config, FaultMode};
pub use error::{ErrorKind, GridError, RateScope};
pub use gate::{Gate, GateSettings, GridHealth};
pub use grid::GridFetcher;
pub use http::GridClient;

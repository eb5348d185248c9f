//! lintdock - container-based engine manager and request dispatcher
//!
//! lintdock runs a fleet of pluggable analysis "engines" (linters, analyzers,
//! a UI) as isolated containers on a private network with a shared volume,
//! and dispatches inbound HTTP/websocket traffic to the right engine.
//!
//! # Core concepts
//!
//! - **Engine manager** ([`manager::EngineManager`]): the multi-phase startup
//!   state machine. It discovers or provisions the manager network and
//!   volume by owner label, converges the network by tearing down whatever a
//!   crashed instance left behind, attaches its own container, and installs
//!   the configured engines all-or-nothing.
//! - **Request dispatcher** ([`server::build_router`]): builds an immutable
//!   route table from the engine snapshot — a prefix-stripping,
//!   upgrade-capable reverse proxy per engine plus a catch-all route to the
//!   UI engine.
//! - **Container runtime boundary** ([`runtime::ContainerRuntime`]): the
//!   slice of docker the manager consumes, implemented on bollard and
//!   replaceable in tests.
//! - **Analysis pipeline** ([`pipeline::AnalysisPipeline`]): fans a file
//!   analysis out to the engines that cover its language; the dispatcher
//!   wraps it with validation and post-processing.

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod runtime;
pub mod server;

pub use config::{EngineConfig, ManagerConfig};
pub use engine::Engine;
pub use error::Error;
pub use manager::EngineManager;

/// Crate version, reported by `GET /version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

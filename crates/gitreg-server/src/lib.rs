//! gitreg server
//!
//! Speaks the npm registry wire protocol over the catalog, dist cache
//! and git access layer provided by `gitreg-core`. The pieces:
//!
//! - [`routes`]: path-template matcher and dispatcher
//! - [`service`]: per-remote state and registry response builders
//! - [`http`]: thin axum glue mapping routes and errors onto HTTP
//! - [`config`]: server config file and CLI remote parsing

pub mod config;
pub mod http;
pub mod routes;
pub mod service;

pub use config::ServerConfig;
pub use http::build_router;
pub use routes::{Route, RouteTable, RouteTemplate};
pub use service::{RegistryService, RemoteRegistry};

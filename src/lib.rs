//! # Transform Gateway
//!
//! Routes an uploaded image through a set of named pixel transforms, each
//! served by a worker that is either in-process or a separately deployed
//! instance of this service, and aggregates the results.
//!
//! ## Architecture
//!
//! - [`directory`]: which transform workers are live ([`ServiceDirectory`],
//!   [`WorkerRegistry`])
//! - [`invoker`]: one call to one worker, local or over HTTP
//! - [`dispatcher`]: concurrent fan-out and unordered fan-in of results
//! - [`registration`]: worker heartbeat against a gateway registry
//! - [`handlers`]: HTTP endpoints for both roles
//! - [`config`]: environment configuration
//! - [`error`]: HTTP error responses
//!
//! The pixel work itself lives in the `transformations` crate.
//!
//! ## Example
//!
//! ```no_run
//! use actix_web::{web, App, HttpServer};
//! use transform_gateway::{build_gateway, config::{Config, Role}, handlers};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Config::from_env();
//!     let (registry, dispatcher) = build_gateway(&config);
//!     let dispatcher = web::Data::new(dispatcher);
//!     let registry = web::Data::from(registry);
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(dispatcher.clone())
//!             .app_data(registry.clone())
//!             .app_data(web::Data::new(Role::Gateway))
//!             .configure(handlers::configure_gateway)
//!     })
//!     .bind("0.0.0.0:8080")?
//!     .run()
//!     .await
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod invoker;
pub mod registration;

pub use directory::{ServiceDirectory, WorkerRegistry};
pub use dispatcher::{Dispatcher, FanOut, FanOutReport, TransformOutcome};
pub use error::{GatewayError, Result};
pub use invoker::{LocalInvoker, TransformInvoker, TransformRequest, WorkerClient, WorkerError};

/// Builds the gateway's registry and dispatcher from `config`.
///
/// With no `TRANSFORM_WORKERS` configured every transform runs in-process;
/// remote workers may still register at runtime.
pub fn build_gateway(config: &config::Config) -> (Arc<WorkerRegistry>, Dispatcher) {
    let registry = if config.transform_workers.is_empty() {
        WorkerRegistry::local().with_lease_ttl(config.lease_ttl)
    } else {
        WorkerRegistry::with_static(config.transform_workers.iter().cloned(), config.lease_ttl)
    };
    let registry = Arc::new(registry);

    let invoker = WorkerClient::new(registry.clone(), config.worker_timeout);
    let mut dispatcher = Dispatcher::new(registry.clone(), Arc::new(invoker))
        .with_max_concurrency(config.max_concurrency);
    if let Some(deadline) = config.fanout_deadline {
        dispatcher = dispatcher.with_deadline(deadline);
    }

    (registry, dispatcher)
}

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use transform_gateway::config::{Config, Role};
use transform_gateway::{build_gateway, handlers, registration, WorkerRegistry};
use transformations::{Transform, TransformWorker};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let config = Config::from_env();

    info!("Initializing transform service ({})", config.role);
    info!("Server configuration: {:?}", config);

    match config.role {
        Role::Gateway => run_gateway(config).await,
        Role::Worker => run_worker(config).await,
    }
}

async fn run_gateway(config: Config) -> anyhow::Result<()> {
    let (registry, dispatcher) = build_gateway(&config);
    spawn_eviction(registry.clone(), config.lease_ttl);

    let dispatcher = web::Data::new(dispatcher);
    let registry = web::Data::from(registry);

    info!("Starting gateway on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(dispatcher.clone())
            .app_data(registry.clone())
            .app_data(web::Data::new(Role::Gateway))
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::DefaultHeaders::new().add(("X-Version", env!("CARGO_PKG_VERSION"))))
            .service(web::scope("/api/v1").configure(handlers::configure_gateway))
            .configure(handlers::configure_gateway)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .workers(config.workers)
    .run()
    .await?;

    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    if let Some(registry_url) = config.registry_url.clone() {
        info!("Registering with {} as {}", registry_url, config.public_url);
        registration::spawn_heartbeat(
            registry_url,
            config.public_url.clone(),
            Transform::ALL.to_vec(),
            config.heartbeat,
        );
    }

    let worker = web::Data::new(TransformWorker::new());

    info!("Starting worker on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(worker.clone())
            .app_data(web::Data::new(Role::Worker))
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::DefaultHeaders::new().add(("X-Version", env!("CARGO_PKG_VERSION"))))
            .service(web::scope("/api/v1").configure(handlers::configure_worker))
            .configure(handlers::configure_worker)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .workers(config.workers)
    .run()
    .await?;

    Ok(())
}

/// Periodically drops registrations whose lease was not renewed.
fn spawn_eviction(registry: Arc<WorkerRegistry>, lease_ttl: Duration) {
    let period = (lease_ttl / 3).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            registry.evict_expired();
        }
    });
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

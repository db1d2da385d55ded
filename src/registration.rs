//! Worker-side registration with the gateway's registry.

use std::time::Duration;

use tokio::task::JoinHandle;
use transformations::Transform;

use crate::directory::RegisterWorker;

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Registers `transforms` at `registry_url` and renews them every
/// `interval`, at most once a second. Failures are logged and retried on
/// the next tick.
pub fn spawn_heartbeat(
    registry_url: String,
    public_url: String,
    transforms: Vec<Transform>,
    interval: Duration,
) -> JoinHandle<()> {
    let client = reqwest::Client::new();
    let endpoint = format!("{}/registry/workers", registry_url.trim_end_matches('/'));

    let period = interval.max(MIN_HEARTBEAT);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            for transform in &transforms {
                let body = RegisterWorker {
                    name: transform.name().to_string(),
                    url: public_url.clone(),
                };
                if let Err(e) = register_once(&client, &endpoint, &body).await {
                    log::warn!("Failed to register {} with {}: {}", transform, endpoint, e);
                }
            }
        }
    })
}

async fn register_once(
    client: &reqwest::Client,
    endpoint: &str,
    body: &RegisterWorker,
) -> reqwest::Result<()> {
    client
        .post(endpoint)
        .json(body)
        .timeout(Duration::from_secs(5))
        .send()
        .await?
        .error_for_status()?;
    log::debug!("Registered {} at {}", body.name, body.url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_interval_keeps_running() {
        let handle = spawn_heartbeat(
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:8081".to_string(),
            Transform::ALL.to_vec(),
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}

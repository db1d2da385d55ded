use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use transformations::{TransformWorker, TransformationError, TransformedImage};

use crate::directory::{WorkerLocation, WorkerRegistry};

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single worker call. Never affects sibling calls.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Transform(#[from] TransformationError),

    #[error("Worker {worker} unreachable: {reason}")]
    Unreachable { worker: String, reason: String },

    #[error("Worker rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid worker response: {0}")]
    InvalidResponse(String),

    #[error("Worker task panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transform(e) => e.kind(),
            Self::Unreachable { .. } => "worker_unreachable",
            Self::Rejected { .. } => "worker_rejected",
            Self::InvalidResponse(_) => "invalid_worker_response",
            Self::Panicked(_) => "worker_panicked",
        }
    }
}

/// One transform applied to one image, consumed by a single invocation.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub transform_name: String,
    pub file_name: Arc<str>,
    pub image_bytes: Arc<[u8]>,
}

pub type InvokeFuture = BoxFuture<'static, Result<TransformedImage, WorkerError>>;

/// Performs a transform request, in-process or over the network.
pub trait TransformInvoker: Send + Sync {
    fn invoke(&self, request: TransformRequest) -> InvokeFuture;
}

/// Runs [`TransformWorker`] on tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct LocalInvoker {
    worker: TransformWorker,
}

impl LocalInvoker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransformInvoker for LocalInvoker {
    fn invoke(&self, request: TransformRequest) -> InvokeFuture {
        let worker = self.worker;
        async move {
            let name = request.transform_name.clone();
            tokio::task::spawn_blocking(move || {
                worker.apply(&request.transform_name, &request.file_name, &request.image_bytes)
            })
            .await
            .map_err(|e| WorkerError::Panicked(format!("{}: {}", name, e)))?
            .map_err(WorkerError::from)
        }
        .boxed()
    }
}

/// Resolves each request against the registry at call time and routes it
/// to the in-process worker or to the remote worker's HTTP endpoint.
#[derive(Clone)]
pub struct WorkerClient {
    registry: Arc<WorkerRegistry>,
    local: LocalInvoker,
    http: reqwest::Client,
    timeout: Duration,
}

impl WorkerClient {
    pub fn new(registry: Arc<WorkerRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            local: LocalInvoker::new(),
            http: reqwest::Client::new(),
            timeout,
        }
    }
}

impl TransformInvoker for WorkerClient {
    fn invoke(&self, request: TransformRequest) -> InvokeFuture {
        match self.registry.location(&request.transform_name) {
            Some(WorkerLocation::Local) => self.local.invoke(request),
            Some(WorkerLocation::Remote(base_url)) => {
                post_transform(self.http.clone(), base_url, self.timeout, request).boxed()
            }
            None => {
                let worker = request.transform_name;
                async move {
                    Err(WorkerError::Unreachable {
                        worker,
                        reason: "no live registration".to_string(),
                    })
                }
                .boxed()
            }
        }
    }
}

async fn post_transform(
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    request: TransformRequest,
) -> Result<TransformedImage, WorkerError> {
    let url = format!("{}/apply-transform", base_url.trim_end_matches('/'));
    let unreachable = |e: reqwest::Error| WorkerError::Unreachable {
        worker: url.clone(),
        reason: e.to_string(),
    };

    let image = reqwest::multipart::Part::bytes(request.image_bytes.to_vec())
        .file_name(request.file_name.to_string());
    let form = reqwest::multipart::Form::new()
        .text("filename", request.file_name.to_string())
        .part("image", image);

    log::debug!("POST {} transform={}", url, request.transform_name);

    let response = client
        .post(&url)
        .query(&[("transform", request.transform_name.as_str())])
        .multipart(form)
        .timeout(timeout)
        .send()
        .await
        .map_err(unreachable)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        return Err(WorkerError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.bytes().await.map_err(unreachable)?;
    serde_json::from_slice(&body).map_err(|e| WorkerError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DEFAULT_LEASE_TTL;

    fn request(name: &str, bytes: &[u8]) -> TransformRequest {
        TransformRequest {
            transform_name: name.to_string(),
            file_name: Arc::from("x.png"),
            image_bytes: Arc::from(bytes),
        }
    }

    #[tokio::test]
    async fn test_local_invoker_decode_error() {
        let result = LocalInvoker::new().invoke(request("sepia", b"nope")).await;
        assert!(matches!(
            result,
            Err(WorkerError::Transform(TransformationError::Decode(_)))
        ));
    }

    #[tokio::test]
    async fn test_client_unregistered_is_unreachable() {
        let client = WorkerClient::new(Arc::new(WorkerRegistry::default()), DEFAULT_WORKER_TIMEOUT);
        let result = client.invoke(request("sepia", b"nope")).await;
        match result {
            Err(WorkerError::Unreachable { worker, .. }) => assert_eq!(worker, "sepia"),
            other => panic!("Expected Unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_connection_refused_is_unreachable() {
        let registry =
            WorkerRegistry::with_static([("tint", "http://127.0.0.1:1")], DEFAULT_LEASE_TTL);
        let client = WorkerClient::new(Arc::new(registry), Duration::from_secs(2));
        let result = client.invoke(request("tint", b"bytes")).await;
        assert!(matches!(result, Err(WorkerError::Unreachable { .. })));
    }

    #[test]
    fn test_error_kinds() {
        let error = WorkerError::Transform(TransformationError::UnsupportedTransform("x".into()));
        assert_eq!(error.kind(), "unsupported_transform");
        assert_eq!(error.to_string(), "Unsupported transform type: x");

        let error = WorkerError::Rejected {
            status: 422,
            message: "bad".into(),
        };
        assert_eq!(error.kind(), "worker_rejected");
    }
}

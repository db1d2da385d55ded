//! Fan-out of one image to every requested transform worker, and fan-in of
//! the results as an unordered completion stream.
//!
//! [`Dispatcher::fan_out`] snapshots the directory once, keeps the requested
//! names that have a live worker, and spawns one task per name. The returned
//! [`FanOut`] yields exactly one [`TransformOutcome`] per spawned task, in
//! completion order, then ends. Names without a live worker never reach a
//! task; they are reported by [`FanOut::unregistered`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, Stream, StreamExt};
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError};
use transformations::TransformedImage;
use uuid::Uuid;

use crate::directory::{registry_key, ServiceDirectory};
use crate::invoker::{TransformInvoker, TransformRequest, WorkerError};

pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Outcome of one dispatched transform.
#[derive(Debug)]
pub enum TransformOutcome {
    Completed(TransformedImage),
    Failed {
        transform_name: String,
        error: WorkerError,
    },
    /// The call was still in flight when the fan-out was cancelled or its
    /// deadline elapsed.
    Abandoned { transform_name: String },
}

impl TransformOutcome {
    pub fn transform_name(&self) -> &str {
        match self {
            Self::Completed(image) => &image.transform_name,
            Self::Failed { transform_name, .. } | Self::Abandoned { transform_name } => {
                transform_name
            }
        }
    }
}

/// Everything a drained [`FanOut`] produced, split by kind.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub images: Vec<TransformedImage>,
    pub failed: Vec<(String, WorkerError)>,
    pub abandoned: Vec<String>,
    pub unregistered: Vec<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<dyn ServiceDirectory>,
    invoker: Arc<dyn TransformInvoker>,
    permits: Arc<Semaphore>,
    deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn ServiceDirectory>, invoker: Arc<dyn TransformInvoker>) -> Self {
        Self {
            directory,
            invoker,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
            deadline: None,
        }
    }

    /// Caps the number of worker calls in flight across all fan-outs.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Abandons calls still running this long after `fan_out` was called.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Dispatches `image_bytes` to the worker of every requested transform
    /// that is currently registered. Must be called within a tokio runtime.
    pub fn fan_out<S: AsRef<str>>(
        &self,
        requested: &[S],
        file_name: &str,
        image_bytes: impl Into<Arc<[u8]>>,
    ) -> FanOut {
        let request_id = Uuid::new_v4();
        let live = self.directory.list_registered_names();
        let (selected, unregistered) = select_live(requested, &live);

        if !unregistered.is_empty() {
            log::info!(
                "[{}] Skipping transforms with no live worker: {:?}",
                request_id,
                unregistered
            );
        }
        log::info!(
            "[{}] Dispatching {} to {} worker(s): {:?}",
            request_id,
            file_name,
            selected.len(),
            selected
        );

        let file_name: Arc<str> = Arc::from(file_name);
        let image_bytes = image_bytes.into();
        let in_flight = FuturesUnordered::new();
        let mut pending = HashMap::with_capacity(selected.len());

        for transform_name in selected {
            let request = TransformRequest {
                transform_name: transform_name.clone(),
                file_name: file_name.clone(),
                image_bytes: image_bytes.clone(),
            };
            let invoker = self.invoker.clone();
            let permits = self.permits.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                invoker.invoke(request).await
            });

            pending.insert(transform_name.clone(), handle.abort_handle());
            in_flight.push(
                handle
                    .map(move |joined| (transform_name, joined))
                    .boxed(),
            );
        }

        FanOut {
            request_id,
            in_flight,
            pending,
            abandoned: VecDeque::new(),
            unregistered,
            deadline: self
                .deadline
                .map(|deadline| Box::pin(tokio::time::sleep(deadline))),
        }
    }
}

type JoinResult = Result<Result<TransformedImage, WorkerError>, JoinError>;
type Joined = (String, JoinResult);

/// Unordered stream of per-transform outcomes for one fan-out.
///
/// Yields one outcome per dispatched name and then `None`. Dropping it
/// aborts calls still in flight.
pub struct FanOut {
    request_id: Uuid,
    in_flight: FuturesUnordered<BoxFuture<'static, Joined>>,
    pending: HashMap<String, AbortHandle>,
    abandoned: VecDeque<String>,
    unregistered: Vec<String>,
    deadline: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl FanOut {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Requested names that had no live worker in the directory snapshot.
    pub fn unregistered(&self) -> &[String] {
        &self.unregistered
    }

    /// Names dispatched but not yet reported.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    /// Aborts every call still in flight. Each of them is then reported as
    /// [`TransformOutcome::Abandoned`] before the stream ends.
    pub fn cancel(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let mut names: Vec<String> = Vec::with_capacity(self.pending.len());
        for (name, handle) in self.pending.drain() {
            handle.abort();
            names.push(name);
        }
        names.sort();

        log::warn!("[{}] Abandoning unfinished transforms: {:?}", self.request_id, names);
        self.abandoned.extend(names);
        self.in_flight = FuturesUnordered::new();
        self.deadline = None;
    }

    /// Drains the stream into a [`FanOutReport`].
    pub async fn collect_report(mut self) -> FanOutReport {
        let mut report = FanOutReport {
            unregistered: std::mem::take(&mut self.unregistered),
            ..FanOutReport::default()
        };

        while let Some(outcome) = self.next().await {
            match outcome {
                TransformOutcome::Completed(image) => report.images.push(image),
                TransformOutcome::Failed {
                    transform_name,
                    error,
                } => report.failed.push((transform_name, error)),
                TransformOutcome::Abandoned { transform_name } => {
                    report.abandoned.push(transform_name)
                }
            }
        }

        report
    }

    fn outcome(&mut self, transform_name: String, joined: JoinResult) -> TransformOutcome {
        self.pending.remove(&transform_name);

        let result = joined.unwrap_or_else(|e| {
            Err(if e.is_panic() {
                WorkerError::Panicked(transform_name.clone())
            } else {
                WorkerError::Unreachable {
                    worker: transform_name.clone(),
                    reason: "call aborted".to_string(),
                }
            })
        });

        match result {
            Ok(image) => {
                log::debug!("[{}] {} completed", self.request_id, transform_name);
                TransformOutcome::Completed(image)
            }
            Err(error) => {
                log::warn!("[{}] {} failed: {}", self.request_id, transform_name, error);
                TransformOutcome::Failed {
                    transform_name,
                    error,
                }
            }
        }
    }
}

impl Stream for FanOut {
    type Item = TransformOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(transform_name) = this.abandoned.pop_front() {
            return Poll::Ready(Some(TransformOutcome::Abandoned { transform_name }));
        }
        if this.pending.is_empty() {
            return Poll::Ready(None);
        }

        if let Poll::Ready(Some((name, joined))) = this.in_flight.poll_next_unpin(cx) {
            return Poll::Ready(Some(this.outcome(name, joined)));
        }

        let expired = this
            .deadline
            .as_mut()
            .map_or(false, |sleep| sleep.as_mut().poll(cx).is_ready());
        if expired {
            log::warn!("[{}] Fan-out deadline elapsed", this.request_id);
            this.cancel();
            let next = this
                .abandoned
                .pop_front()
                .map(|transform_name| TransformOutcome::Abandoned { transform_name });
            return Poll::Ready(next);
        }

        Poll::Pending
    }
}

impl Drop for FanOut {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}

/// Splits `requested` into (live, unregistered), matching names
/// case-insensitively. Both lists are lowercased and deduplicated, keeping
/// the order of first appearance.
pub fn select_live<S: AsRef<str>>(
    requested: &[S],
    live: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut unregistered = Vec::new();

    for name in requested {
        let key = registry_key(name.as_ref());
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        if live.contains(&key) {
            selected.push(key);
        } else {
            unregistered.push(key);
        }
    }

    (selected, unregistered)
}

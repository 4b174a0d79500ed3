//! Single-result data-task bridge
//!
//! Wraps an async [`DataSource`] as a publisher that defers all work to the
//! first non-zero request, then delivers one [`Payload`] followed by
//! `Finished`, or a `Failure(SourceError)`. Cancelling aborts the in-flight
//! task and clears the downstream reference.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::error::SourceError;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// The single result a data task produces: a body plus metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Raw response body
    pub body: Bytes,
    /// Transport metadata (headers, status, source tags)
    pub meta: HashMap<String, String>,
}

impl Payload {
    /// A payload with the given body and no metadata
    pub fn new(body: impl Into<Bytes>) -> Payload {
        Payload {
            body: body.into(),
            meta: HashMap::new(),
        }
    }

    /// Add one metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Payload {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// An asynchronous single-result source (network fetch, file read, …)
///
/// Implementations map their platform errors into [`SourceError`] at this
/// boundary; inside the pipeline the failure type stays `SourceError`.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Produce the one result
    async fn load(&self) -> Result<Payload, SourceError>;
}

/// Publisher bridging a [`DataSource`] into a one-value stream
#[derive(Clone)]
pub struct DataTaskPublisher {
    source: Arc<dyn DataSource>,
    handle: Handle,
}

impl DataTaskPublisher {
    /// Bridge `source`, spawning on the current tokio runtime
    ///
    /// Panics outside of a runtime, as [`Handle::current`] does.
    pub fn new(source: impl DataSource) -> DataTaskPublisher {
        DataTaskPublisher::with_handle(source, Handle::current())
    }

    /// Bridge `source`, spawning on an explicit runtime handle
    pub fn with_handle(source: impl DataSource, handle: Handle) -> DataTaskPublisher {
        DataTaskPublisher {
            source: Arc::new(source),
            handle,
        }
    }
}

impl Publisher for DataTaskPublisher {
    type Output = Payload;
    type Failure = SourceError;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Payload, Failure = SourceError>,
    {
        let downstream = Arc::new(subscriber);
        let node = Arc::new_cyclic(|me: &Weak<TaskNode<S>>| TaskNode {
            me: me.clone(),
            source: Arc::clone(&self.source),
            handle: self.handle.clone(),
            state: Mutex::new(TaskState::Idle {
                downstream: Arc::clone(&downstream),
            }),
            delivery: ReentrantMutex::new(()),
        });
        downstream.receive_subscription(AnySubscription::from_arc(node));
    }
}

struct TaskNode<S> {
    me: Weak<Self>,
    source: Arc<dyn DataSource>,
    handle: Handle,
    state: Mutex<TaskState<S>>,
    delivery: ReentrantMutex<()>,
}

enum TaskState<S> {
    /// Attached, no demand yet; the task has not started
    Idle { downstream: Arc<S> },
    /// The load is in flight
    Running {
        downstream: Arc<S>,
        task: JoinHandle<()>,
    },
    Terminal,
}

impl<S> TaskNode<S>
where
    S: Subscriber<Input = Payload, Failure = SourceError>,
{
    /// Deliver the task's result; single-result sources ignore demand here
    /// because the task only ever starts after a request
    fn fulfill(&self, result: Result<Payload, SourceError>) {
        let downstream = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, TaskState::Terminal) {
                TaskState::Terminal => return,
                TaskState::Idle { downstream } | TaskState::Running { downstream, .. } => {
                    downstream
                }
            }
        };
        let _delivery = self.delivery.lock();
        match result {
            Ok(payload) => {
                downstream.receive(payload);
                downstream.receive_completion(Completion::Finished);
            }
            Err(error) => {
                tracing::warn!(error = %error, "Data task failed");
                downstream.receive_completion(Completion::Failure(error));
            }
        }
    }
}

impl<S> Subscription for TaskNode<S>
where
    S: Subscriber<Input = Payload, Failure = SourceError>,
{
    fn request(&self, _demand: Demand) {
        let mut state = self.state.lock();
        let TaskState::Idle { downstream } = &*state else {
            return;
        };
        let downstream = Arc::clone(downstream);
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let source = Arc::clone(&self.source);
        // Work is deferred to the first request; start it now.
        let task = self.handle.spawn(async move {
            let result = source.load().await;
            me.fulfill(result);
        });
        *state = TaskState::Running { downstream, task };
    }
}

impl<S> Cancellable for TaskNode<S>
where
    S: Subscriber<Input = Payload, Failure = SourceError>,
{
    fn cancel(&self) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, TaskState::Terminal)
        };
        if let TaskState::Running { task, .. } = previous {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::PublisherExt;
    use std::time::Duration;

    struct StubSource {
        delay: Duration,
        result: Result<Payload, SourceError>,
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn load(&self) -> Result<Payload, SourceError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_delivers_payload_then_finished() {
        let publisher = DataTaskPublisher::new(StubSource {
            delay: Duration::from_millis(1),
            result: Ok(Payload::new("body").with_meta("status", "200")),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let values_in = Arc::clone(&events);
        let done_in = Arc::clone(&events);
        let _token = publisher.sink(
            move |payload: Payload| {
                values_in
                    .lock()
                    .push(format!("body={:?}", payload.body));
            },
            move |completion| {
                done_in.lock().push(match completion {
                    Completion::Finished => "finished".to_string(),
                    Completion::Failure(e) => format!("failure={e}"),
                });
            },
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("body"));
        assert_eq!(events[1], "finished");
    }

    #[tokio::test]
    async fn test_failure_is_typed() {
        let publisher = DataTaskPublisher::new(StubSource {
            delay: Duration::from_millis(1),
            result: Err(SourceError::Load("dns".to_string())),
        });

        let done = Arc::new(Mutex::new(Vec::new()));
        let done_in = Arc::clone(&done);
        let _token = publisher.sink(|_| {}, move |c| done_in.lock().push(c));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            *done.lock(),
            vec![Completion::Failure(SourceError::Load("dns".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_no_request_no_work() {
        let publisher = DataTaskPublisher::new(StubSource {
            delay: Duration::ZERO,
            result: Ok(Payload::new("unwanted")),
        });

        // A subscriber that retains the subscription but never requests.
        let handlers = crate::subscriber::Handlers::<Payload, SourceError> {
            on_subscription: None,
            on_value: Some(Box::new(|_| panic!("value without demand"))),
            on_completion: Some(Box::new(|_| panic!("completion without demand"))),
        };
        publisher.subscribe(crate::subscriber::AnySubscriber::from_handlers(handlers));

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_cancel_aborts_the_task() {
        let publisher = DataTaskPublisher::new(StubSource {
            delay: Duration::from_millis(500),
            result: Ok(Payload::new("slow")),
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let token = publisher.sink_values(move |p: Payload| seen_in.lock().push(p));

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(seen.lock().is_empty());
    }
}

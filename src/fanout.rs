//! Per-invocation publish/subscribe topics.
//!
//! A [`FanoutTopic`] bridges one upstream gRPC stream to one or more
//! downstream subscription consumers. Every streaming activation gets its
//! own topic with a process-unique identifier; the topic is torn down when
//! the upstream ends, errors, or the last consumer disconnects, whichever
//! comes first. Once the producer and every consumer are gone the
//! identifier is released from the [`FanoutHub`].

use crate::stub::ResponseStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for fan-out topics.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Per-topic event buffer size (default: 256)
    ///
    /// A consumer that falls further behind than this loses the oldest
    /// events; a warning is logged when that happens.
    pub buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

/// Process-wide registry of live topic identifiers.
///
/// The hub only tracks lifecycles; payloads never pass through it. Entries
/// are removed automatically when a topic's producer and all of its
/// consumers have finished.
#[derive(Clone)]
pub struct FanoutHub {
    topics: Arc<Mutex<HashSet<String>>>,
    config: FanoutConfig,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::with_config(FanoutConfig::default())
    }

    pub fn with_config(config: FanoutConfig) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Open a fresh topic with a process-unique identifier.
    pub fn open(&self) -> FanoutTopic {
        let id = Uuid::new_v4().to_string();
        self.topics.lock().insert(id.clone());
        let (tx, _) = broadcast::channel(self.config.buffer);
        let (alive_tx, gone_rx) = mpsc::channel(1);
        debug!(topic = %id, "fanout topic opened");
        FanoutTopic {
            membership: Arc::new(TopicMembership {
                id,
                topics: Arc::downgrade(&self.topics),
            }),
            tx,
            alive_tx,
            gone_rx,
        }
    }

    /// Number of topics currently registered.
    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.topics.lock().contains(id)
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FanoutHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutHub")
            .field("topics", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Keeps the hub entry alive while the producer or any consumer still
/// holds it; the last holder releases the identifier.
struct TopicMembership {
    id: String,
    topics: Weak<Mutex<HashSet<String>>>,
}

impl Drop for TopicMembership {
    fn drop(&mut self) {
        if let Some(topics) = self.topics.upgrade() {
            topics.lock().remove(&self.id);
            debug!(topic = %self.id, "fanout topic released");
        }
    }
}

/// Producer side of one topic, owned by the streaming invocation that
/// created it. Never shared across invocations.
pub struct FanoutTopic {
    membership: Arc<TopicMembership>,
    tx: broadcast::Sender<Value>,
    alive_tx: mpsc::Sender<()>,
    gone_rx: mpsc::Receiver<()>,
}

impl FanoutTopic {
    pub fn id(&self) -> &str {
        &self.membership.id
    }

    /// Attach a consumer. Consumers attached after events were published
    /// only see later events.
    pub fn subscribe(&self) -> FanoutStream {
        FanoutStream {
            topic_id: self.membership.id.clone(),
            inner: BroadcastStream::new(self.tx.subscribe()),
            _alive: self.alive_tx.clone(),
            _membership: self.membership.clone(),
        }
    }

    /// Drive the topic: publish every upstream `data` event, stop on
    /// upstream end or error, and cancel the upstream call as soon as the
    /// last consumer disconnects.
    ///
    /// Terminal upstream events end the producer side but are not
    /// forwarded as payloads; consumers observe completion.
    pub async fn forward(self, mut upstream: ResponseStream) {
        let FanoutTopic {
            membership,
            tx,
            alive_tx,
            mut gone_rx,
        } = self;
        // The template sender goes away here, so `gone_rx` resolves once
        // every consumer handle has been dropped.
        drop(alive_tx);

        loop {
            tokio::select! {
                _ = gone_rx.recv() => {
                    debug!(topic = %membership.id, "last subscriber disconnected, cancelling upstream");
                    break;
                }
                item = upstream.next() => match item {
                    Some(Ok(value)) => {
                        if tx.send(value).is_err() {
                            debug!(topic = %membership.id, "no subscribers left");
                            break;
                        }
                    }
                    Some(Err(status)) => {
                        warn!(topic = %membership.id, error = %status, "upstream stream failed");
                        break;
                    }
                    None => {
                        debug!(topic = %membership.id, "upstream stream completed");
                        break;
                    }
                }
            }
        }
        // Dropping `tx` completes every consumer stream; dropping
        // `upstream` cancels the remote call.
    }
}

/// Consumer side of one topic.
///
/// Dropping the stream counts as a disconnect; when the last consumer
/// disconnects the producer cancels the upstream call.
pub struct FanoutStream {
    topic_id: String,
    inner: BroadcastStream<Value>,
    _alive: mpsc::Sender<()>,
    _membership: Arc<TopicMembership>,
}

impl FanoutStream {
    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }
}

impl std::fmt::Debug for FanoutStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutStream")
            .field("topic_id", &self.topic_id)
            .finish_non_exhaustive()
    }
}

impl futures::Stream for FanoutStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(value)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(topic = %this.topic_id, skipped, "subscriber lagging, events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

//! One direction of the bridge: a queued FIFO publish/subscribe topic.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::traffic::{Direction, TrafficLog};
use super::BridgeMessage;
use crate::error::ExtensionError;

/// Listener invoked for every delivered message.
pub type Handler<M> = Arc<dyn Fn(&M) -> Result<(), ExtensionError> + Send + Sync>;

/// Registration handle returned by `on`, passed back to `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct TopicInner<M> {
    handlers: Vec<(HandlerId, Handler<M>)>,
    subscribers: Vec<mpsc::UnboundedSender<M>>,
    queue: VecDeque<M>,
    draining: bool,
    disposed: bool,
    next_id: u64,
}

pub(crate) struct Topic<M> {
    direction: Direction,
    traffic: Option<Arc<TrafficLog>>,
    inner: Mutex<TopicInner<M>>,
}

impl<M: BridgeMessage> Topic<M> {
    pub(crate) fn new(direction: Direction, traffic: Option<Arc<TrafficLog>>) -> Self {
        Self {
            direction,
            traffic,
            inner: Mutex::new(TopicInner {
                handlers: Vec::new(),
                subscribers: Vec::new(),
                queue: VecDeque::new(),
                draining: false,
                disposed: false,
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicInner<M>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn on(&self, handler: Handler<M>) -> HandlerId {
        let mut inner = self.lock();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        if !inner.disposed {
            inner.handlers.push((id, handler));
        }
        id
    }

    pub(crate) fn off(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(existing, _)| *existing != id);
        inner.handlers.len() != before
    }

    /// Channel receiving a clone of every delivered message.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // A disposed topic drops the sender right away so the receiver ends.
        if !inner.disposed {
            inner.subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Queue `message` and deliver it in send order.
    ///
    /// A send issued from inside a handler is appended to the queue and
    /// delivered by the outer call after the current message finishes.
    pub(crate) fn send(&self, message: M) {
        {
            let mut inner = self.lock();
            if inner.disposed {
                tracing::trace!(
                    direction = self.direction.as_str(),
                    kind = message.kind(),
                    "send on disposed bridge ignored"
                );
                return;
            }
            if let Some(traffic) = &self.traffic {
                traffic.record(self.direction, message.kind());
            }
            inner.queue.push_back(message);
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let (message, handlers, subscribers) = {
                let mut inner = self.lock();
                let Some(message) = inner.queue.pop_front() else {
                    inner.draining = false;
                    return;
                };
                inner.subscribers.retain(|tx| !tx.is_closed());
                let handlers: Vec<Handler<M>> = inner
                    .handlers
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect();
                (message, handlers, inner.subscribers.clone())
            };
            self.deliver(&message, &handlers, &subscribers);
        }
    }

    fn deliver(
        &self,
        message: &M,
        handlers: &[Handler<M>],
        subscribers: &[mpsc::UnboundedSender<M>],
    ) {
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(
                    direction = self.direction.as_str(),
                    kind = message.kind(),
                    error = %err,
                    "bridge handler failed"
                ),
                Err(_) => tracing::error!(
                    direction = self.direction.as_str(),
                    kind = message.kind(),
                    "bridge handler panicked"
                ),
            }
        }
        for tx in subscribers {
            let _ = tx.send(message.clone());
        }
    }

    /// Drop every handler, subscriber and queued message.
    pub(crate) fn dispose(&self) {
        let mut inner = self.lock();
        inner.disposed = true;
        inner.handlers.clear();
        inner.subscribers.clear();
        inner.queue.clear();
    }
}

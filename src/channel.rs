//! Update channel between radio callbacks and a consumer.
//!
//! Senders never block: they may run on a radio callback thread. When a
//! bounded channel is full, one update is discarded according to the
//! configured [`OverflowPolicy`] and the loss is counted. The receiver sees
//! the count once, as an [`Error::ChannelOverflow`] item, before the next
//! update.

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

use crate::error::{Error, Result};

/// Default bounded capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Which update to discard when a bounded channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverflowPolicy {
    /// Drop the oldest queued update to make room.
    #[default]
    DropOldest,
    /// Drop the update being sent.
    DropNewest,
}

/// Channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelConfig {
    /// Maximum queued updates, or `None` for unbounded.
    pub capacity: Option<usize>,
    /// What to discard when full.
    pub overflow: OverflowPolicy,
}

impl ChannelConfig {
    /// An unbounded channel. Never drops.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::default(),
        }
    }

    /// A bounded channel with the given policy.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            overflow,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::bounded(DEFAULT_CAPACITY, OverflowPolicy::DropOldest)
    }
}

/// Outcome of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The update was queued.
    Queued,
    /// The update was queued after discarding the oldest one.
    DroppedOldest,
    /// The update itself was discarded.
    DroppedNewest,
    /// The receiver is gone; the update was discarded.
    Closed,
}

struct Queue<T> {
    items: VecDeque<T>,
    /// Drops not yet reported to the receiver.
    unreported: u64,
    /// Drops since creation.
    dropped_total: u64,
    receiver_closed: bool,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    notify: Notify,
    senders: AtomicUsize,
    config: ChannelConfig,
}

/// Create a new update channel.
pub fn update_channel<T>(config: ChannelConfig) -> (UpdateSender<T>, UpdateReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue {
            items: VecDeque::new(),
            unreported: 0,
            dropped_total: 0,
            receiver_closed: false,
        }),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        config,
    });

    (
        UpdateSender {
            shared: shared.clone(),
        },
        UpdateReceiver { shared },
    )
}

/// Sending half. Cheap to clone and safe to use from any thread.
pub struct UpdateSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> UpdateSender<T> {
    /// Queue an update without blocking.
    pub fn send(&self, item: T) -> SendStatus {
        let status = {
            let mut queue = self.shared.queue.lock();

            if queue.receiver_closed {
                return SendStatus::Closed;
            }

            let full = self
                .shared
                .config
                .capacity
                .map(|cap| queue.items.len() >= cap)
                .unwrap_or(false);

            if !full {
                queue.items.push_back(item);
                SendStatus::Queued
            } else {
                queue.unreported += 1;
                queue.dropped_total += 1;
                match self.shared.config.overflow {
                    OverflowPolicy::DropOldest => {
                        queue.items.pop_front();
                        queue.items.push_back(item);
                        SendStatus::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => SendStatus::DroppedNewest,
                }
            }
        };

        if status != SendStatus::Queued {
            warn!("Update channel full, {:?}", status);
        }

        self.shared.notify.notify_one();
        status
    }

    /// Check if the receiver has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().receiver_closed
    }
}

impl<T> Clone for UpdateSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for UpdateSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

/// Receiving half.
pub struct UpdateReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> UpdateReceiver<T> {
    /// Wait for the next update.
    ///
    /// Yields `Err(Error::ChannelOverflow)` once after updates were dropped.
    /// Returns `None` when all senders are gone and the queue is drained,
    /// or after [`close`](Self::close).
    pub async fn recv(&mut self) -> Option<Result<T>> {
        loop {
            {
                let mut queue = self.shared.queue.lock();
                if let Some(item) = Self::take(&mut queue) {
                    return Some(item);
                }
                if queue.receiver_closed || self.shared.senders.load(Ordering::SeqCst) == 0 {
                    return None;
                }
            }

            self.shared.notify.notified().await;
        }
    }

    /// Take the next update if one is queued.
    pub fn try_recv(&mut self) -> Option<Result<T>> {
        Self::take(&mut self.shared.queue.lock())
    }

    /// Stop accepting updates. Already-queued updates are discarded.
    pub fn close(&mut self) {
        let mut queue = self.shared.queue.lock();
        queue.receiver_closed = true;
        queue.items.clear();
        queue.unreported = 0;
    }

    /// Number of updates currently queued.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    /// Check if no updates are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of updates dropped since the channel was created.
    pub fn dropped_total(&self) -> u64 {
        self.shared.queue.lock().dropped_total
    }

    /// Convert into a [`Stream`] of updates.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::unfold(self, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
    }

    fn take(queue: &mut Queue<T>) -> Option<Result<T>> {
        if queue.unreported > 0 {
            let dropped = std::mem::take(&mut queue.unreported);
            return Some(Err(Error::ChannelOverflow { dropped }));
        }

        queue.items.pop_front().map(Ok)
    }
}

impl<T> Drop for UpdateReceiver<T> {
    fn drop(&mut self) {
        self.close();
    }
}

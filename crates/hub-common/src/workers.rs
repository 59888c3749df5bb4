//! Ordered sharded workers
//!
//! ```text
//! dispatch(key, item) ─► hash(key) % N ─► shard queue ─► sequential handler
//! ```
//!
//! Items sharing a key always land on the same shard and are handled in
//! dispatch order; different keys spread across shards and run in parallel.

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::WorkerError;

enum ShardMessage<T> {
    Item(T),
    Flush(oneshot::Sender<()>),
}

/// Pool of sequential shard workers
pub struct ShardedWorkers<T> {
    name: String,
    senders: RwLock<Vec<mpsc::UnboundedSender<ShardMessage<T>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> ShardedWorkers<T> {
    /// Spawn `shards` workers on the current tokio runtime
    pub fn spawn<F, Fut>(name: impl Into<String>, shards: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let shards = shards.max(1);
        let handler = Arc::new(handler);
        let mut senders = Vec::with_capacity(shards);
        let mut handles = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, mut rx) = mpsc::unbounded_channel::<ShardMessage<T>>();
            let handler = handler.clone();
            let worker = name.clone();

            handles.push(tokio::spawn(async move {
                tracing::debug!(workers = %worker, shard, "shard worker started");
                while let Some(msg) = rx.recv().await {
                    match msg {
                        ShardMessage::Item(item) => {
                            if AssertUnwindSafe(handler(item)).catch_unwind().await.is_err() {
                                tracing::error!(workers = %worker, shard, "work item panicked");
                            }
                        }
                        ShardMessage::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                tracing::debug!(workers = %worker, shard, "shard worker stopped");
            }));
            senders.push(tx);
        }

        Self {
            name,
            senders: RwLock::new(senders),
            handles: Mutex::new(handles),
        }
    }

    /// Queue an item on the shard owning `key`
    pub fn dispatch<K: Hash + ?Sized>(&self, key: &K, item: T) -> Result<(), WorkerError> {
        let senders = self.senders.read();
        if senders.is_empty() {
            return Err(WorkerError::Closed(self.name.clone()));
        }
        let shard = shard_index(key, senders.len());
        senders[shard]
            .send(ShardMessage::Item(item))
            .map_err(|_| WorkerError::Closed(self.name.clone()))
    }

    /// Wait until everything dispatched before this call has been handled
    pub async fn flush(&self) {
        let pending: Vec<oneshot::Receiver<()>> = {
            let senders = self.senders.read();
            senders
                .iter()
                .filter_map(|tx| {
                    let (done_tx, done_rx) = oneshot::channel();
                    tx.send(ShardMessage::Flush(done_tx)).ok().map(|_| done_rx)
                })
                .collect()
        };

        for done in pending {
            let _ = done.await;
        }
    }

    /// Close the queues and wait for the workers to drain
    pub async fn shutdown(&self) {
        drop(std::mem::take(&mut *self.senders.write()));
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(workers = %self.name, "shard worker join failed: {}", e);
            }
        }
    }

    /// Number of live shards
    pub fn shards(&self) -> usize {
        self.senders.read().len()
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn shard_index<K: Hash + ?Sized>(key: &K, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::protocol::ServerEvent;

pub type ClientId = u64;

/// Connected consumers, each represented by its bounded outbound queue.
///
/// Fan-out never waits on a consumer: a full queue means the consumer is
/// stalled and it is dropped from the set; a closed queue means it has gone.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<ClientId, mpsc::Sender<ServerEvent>>>>,
    next_id: Arc<AtomicU64>,
    queue_depth: usize,
}

impl ClientRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_depth: queue_depth.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, mpsc::Sender<ServerEvent>>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a consumer whose first queued event is `greeting`.
    pub fn register(&self, greeting: ServerEvent) -> (ClientId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        // Fresh channel with capacity >= 1 always has room.
        let _ = tx.try_send(greeting);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut clients = self.lock();
            clients.insert(id, tx);
            clients.len()
        };
        log::info!("Consumer {} connected. Total consumers: {}", id, total);
        (id, rx)
    }

    pub fn remove(&self, id: ClientId) {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            log::info!("Consumer {} disconnected. Total consumers: {}", id, self.len());
        }
    }

    /// Deliver `event` to every consumer, returning how many accepted it.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        let mut clients = self.lock();
        for (id, tx) in clients.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!("Consumer {} stalled, dropping it", id);
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }
        for id in dropped {
            clients.remove(&id);
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_queues_greeting() {
        let registry = ClientRegistry::new(4);
        let (_, mut rx) = registry.register(ServerEvent::Done);
        assert_eq!(rx.recv().await, Some(ServerEvent::Done));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all() {
        let registry = ClientRegistry::new(4);
        let mut receivers: Vec<_> = (0..3)
            .map(|_| registry.register(ServerEvent::Done).1)
            .collect();

        let event = ServerEvent::Position { position: 9 };
        assert_eq!(registry.broadcast(&event), 3);

        for rx in receivers.iter_mut() {
            assert_eq!(rx.recv().await, Some(ServerEvent::Done));
            assert_eq!(rx.recv().await, Some(event.clone()));
        }
    }

    #[tokio::test]
    async fn test_gone_consumer_is_pruned_silently() {
        let registry = ClientRegistry::new(4);
        let (_, mut a) = registry.register(ServerEvent::Done);
        let (_, b) = registry.register(ServerEvent::Done);
        let (_, mut c) = registry.register(ServerEvent::Done);
        drop(b);

        let event = ServerEvent::Position { position: 1 };
        assert_eq!(registry.broadcast(&event), 2);
        assert_eq!(registry.len(), 2);

        for rx in [&mut a, &mut c] {
            rx.recv().await;
            assert_eq!(rx.recv().await, Some(event.clone()));
        }
    }

    #[test]
    fn test_stalled_consumer_is_dropped() {
        let registry = ClientRegistry::new(2);
        let (_, _slow) = registry.register(ServerEvent::Done);
        let (_, mut fast) = registry.register(ServerEvent::Done);

        // Greeting + one event fill the slow queue.
        registry.broadcast(&ServerEvent::Position { position: 1 });
        while fast.try_recv().is_ok() {}

        assert_eq!(registry.broadcast(&ServerEvent::Position { position: 2 }), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ClientRegistry::new(2);
        let (id, _rx) = registry.register(ServerEvent::Done);
        registry.remove(id);
        registry.remove(id);
        assert!(registry.is_empty());
    }
}

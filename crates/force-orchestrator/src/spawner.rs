//! Monitoring spawner — one background task per live entity instance.
//!
//! Each task sleeps the monitoring interval and then runs a tick. The
//! orchestrator's tick re-reads the instance record and submits a
//! `monitoring` job; it asks the task to stop once the record is
//! `OFFLOADED` or gone. Tasks can also be stopped from outside, which
//! teardown does as soon as it starts.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What a spawner task does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub type TickFuture = Pin<Box<dyn Future<Output = Tick> + Send>>;

/// Work run by a spawner task once per interval.
pub type TickFn = Arc<dyn Fn() -> TickFuture + Send + Sync>;

/// Per-instance spawner state.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    /// Tells a replaced slot apart from its successor.
    generation: u64,
}

type Slots = Arc<RwLock<HashMap<String, MonitorSlot>>>;

/// Manages the spawner tasks of all live instances.
#[derive(Clone, Default)]
pub struct MonitorSpawner {
    /// Active spawners: instance_id → slot.
    monitors: Slots,
    next_generation: Arc<AtomicU64>,
}

impl MonitorSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the spawner of an instance, replacing a running one.
    pub async fn start(&self, instance_id: &str, interval: Duration, tick: TickFn) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        // Held across the spawn so a task that ends immediately still
        // finds its slot when it cleans up.
        let mut monitors = self.monitors.write().await;

        let handle = tokio::spawn(run_spawn_loop(
            instance_id.to_string(),
            interval,
            tick,
            shutdown_rx,
            self.monitors.clone(),
            generation,
        ));

        if let Some(old) = monitors.insert(
            instance_id.to_string(),
            MonitorSlot {
                handle,
                shutdown_tx,
                generation,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%instance_id, interval = ?interval, "monitoring spawner started");
    }

    pub async fn stop(&self, instance_id: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(instance_id) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%instance_id, "monitoring spawner stopped");
        }
    }

    /// Stop all spawners (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (id, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(instance_id = %id, "monitoring spawner stopped");
        }
        info!("all monitoring spawners stopped");
    }

    /// Instance ids with a running spawner.
    pub async fn active(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        let mut ids: Vec<String> = monitors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_monitoring(&self, instance_id: &str) -> bool {
        let monitors = self.monitors.read().await;
        monitors.contains_key(instance_id)
    }
}

async fn run_spawn_loop(
    instance_id: String,
    interval: Duration,
    tick: TickFn,
    mut shutdown: watch::Receiver<bool>,
    monitors: Slots,
    generation: u64,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                debug!(%instance_id, "spawner loop shutting down");
                return;
            }
        }

        if tick().await == Tick::Stop {
            break;
        }
    }

    let mut monitors = monitors.write().await;
    if monitors
        .get(&instance_id)
        .is_some_and(|slot| slot.generation == generation)
    {
        monitors.remove(&instance_id);
    }
    info!(%instance_id, "monitoring spawner finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_tick(counter: Arc<AtomicU32>, stop_after: u32) -> TickFn {
        Arc::new(move || -> TickFuture {
            let counter = counter.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= stop_after { Tick::Stop } else { Tick::Continue }
            })
        })
    }

    async fn wait_until_idle(spawner: &MonitorSpawner, instance_id: &str) {
        for _ in 0..200 {
            if !spawner.is_monitoring(instance_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("spawner for {instance_id} never finished");
    }

    #[tokio::test]
    async fn spawner_starts_empty() {
        let spawner = MonitorSpawner::new();
        assert!(spawner.active().await.is_empty());
        assert!(!spawner.is_monitoring("i1").await);
    }

    #[tokio::test]
    async fn ticks_until_told_to_stop() {
        let spawner = MonitorSpawner::new();
        let counter = Arc::new(AtomicU32::new(0));
        spawner
            .start("i1", Duration::from_millis(5), counting_tick(counter.clone(), 3))
            .await;
        assert!(spawner.is_monitoring("i1").await);

        wait_until_idle(&spawner, "i1").await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_cancels_the_task() {
        let spawner = MonitorSpawner::new();
        let counter = Arc::new(AtomicU32::new(0));
        spawner
            .start("i1", Duration::from_secs(3600), counting_tick(counter.clone(), 1))
            .await;
        spawner.stop("i1").await;
        assert!(!spawner.is_monitoring("i1").await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_replaces_the_slot() {
        let spawner = MonitorSpawner::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        spawner
            .start("i1", Duration::from_secs(3600), counting_tick(first.clone(), 1))
            .await;
        spawner
            .start("i1", Duration::from_millis(5), counting_tick(second.clone(), 2))
            .await;
        assert_eq!(spawner.active().await, vec!["i1".to_string()]);

        wait_until_idle(&spawner, "i1").await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_all_clears_every_slot() {
        let spawner = MonitorSpawner::new();
        for id in ["a", "b"] {
            let counter = Arc::new(AtomicU32::new(0));
            spawner
                .start(id, Duration::from_secs(3600), counting_tick(counter, 1))
                .await;
        }
        assert_eq!(spawner.active().await.len(), 2);
        spawner.stop_all().await;
        assert!(spawner.active().await.is_empty());
    }
}

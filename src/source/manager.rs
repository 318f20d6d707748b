//! Holder of the active frame source.
//!
//! Swapping the source broadcasts a reset to every registered listener, in
//! registration order, before `set` returns. This is how dependents learn
//! to discard caches tied to the previous source.
//!
//! Listeners are registered with `on_reset` and removed with
//! `remove_listener`. The broadcast runs on a snapshot of the listener list
//! taken without holding its lock, so a callback may itself register or remove
//! listeners (or drop the last handle to a tracker). Such changes take effect
//! from the next `set`.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::{EmptySource, FrameSource};

type ResetListener = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Handle returned by `on_reset`; pass it to `remove_listener` to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResetSubscription(u64);

pub struct FrameSourceManager {
    current: RwLock<Arc<dyn FrameSource>>,
    listeners: Mutex<Vec<(ResetSubscription, ResetListener)>>,
    next_subscription: AtomicU64,
}

impl FrameSourceManager {
    /// Manager holding an `EmptySource`.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(EmptySource)),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// The active source.
    pub fn current(&self) -> Result<Arc<dyn FrameSource>> {
        let guard = self
            .current
            .read()
            .map_err(|_| anyhow!("frame source lock poisoned"))?;
        Ok(Arc::clone(&*guard))
    }

    /// Install a new source and notify every listener.
    ///
    /// The first listener error is returned as-is; listeners registered after
    /// it are not called.
    pub fn set(&self, source: Arc<dyn FrameSource>) -> Result<()> {
        log::info!(
            "FrameSourceManager: switching to {} ({} frames)",
            source.name(),
            source.total_frames()
        );
        {
            let mut guard = self
                .current
                .write()
                .map_err(|_| anyhow!("frame source lock poisoned"))?;
            *guard = source;
        }

        let listeners: Vec<ResetListener> = self
            .listeners
            .lock()
            .map_err(|_| anyhow!("reset listener lock poisoned"))?
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener()?;
        }
        Ok(())
    }

    /// Register a listener fired on every `set`.
    pub fn on_reset<F>(&self, listener: F) -> Result<ResetSubscription>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let subscription =
            ResetSubscription(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .map_err(|_| anyhow!("reset listener lock poisoned"))?
            .push((subscription, Arc::new(listener)));
        Ok(subscription)
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn remove_listener(&self, subscription: ResetSubscription) -> Result<bool> {
        let mut listeners = self
            .listeners
            .lock()
            .map_err(|_| anyhow!("reset listener lock poisoned"))?;
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        Ok(listeners.len() != before)
    }

    pub fn listener_count(&self) -> Result<usize> {
        let listeners = self
            .listeners
            .lock()
            .map_err(|_| anyhow!("reset listener lock poisoned"))?;
        Ok(listeners.len())
    }
}

impl Default for FrameSourceManager {
    fn default() -> Self {
        Self::new()
    }
}

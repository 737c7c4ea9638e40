use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::broadcast::{Detach, ObserverId};

/// A registration handle returned by `Broadcast::subscribe`.
///
/// Automatically unsubscribes when dropped. The handle does not keep the broadcast alive.
#[must_use = "dropping a Subscription unsubscribes its observer"]
pub struct Subscription {
    id: ObserverId,
    source: Option<Weak<dyn Detach>>,
    unsubscribed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: ObserverId, source: Weak<dyn Detach>) -> Self { Self { id, source: Some(source), unsubscribed: AtomicBool::new(false) } }

    /// A handle for an observer that was never registered because the broadcast had already terminated
    pub(crate) fn terminated(id: ObserverId) -> Self { Self { id, source: None, unsubscribed: AtomicBool::new(false) } }

    pub fn id(&self) -> ObserverId { self.id }

    /// Detaches the observer. Only the first call has any effect.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(source) = self.source.as_ref().and_then(|source| source.upgrade()) {
            if source.detach(self.id) {
                debug!("Subscription {} unsubscribed", self.id);
            }
        }
    }

    /// True once unsubscribed, or once the broadcast has terminated (or been dropped)
    pub fn closed(&self) -> bool {
        if self.unsubscribed.load(Ordering::Acquire) {
            return true;
        }
        match self.source.as_ref().and_then(|source| source.upgrade()) {
            Some(source) => !source.contains(self.id),
            None => true,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.unsubscribe(); }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Subscription({}, closed: {})", self.id, self.closed()) }
}

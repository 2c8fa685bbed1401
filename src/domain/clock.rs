use chrono::{DateTime, Utc};
use std::ops::Deref;
use std::sync::Arc;

/// Source of "now" for every component that makes time-based decisions.
///
/// The admission scheduler, the timeline builder and the event processor
/// never call `Utc::now()` directly; they go through this trait so tests
/// can pin or advance the clock.
pub trait SystemClock: std::fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn clone_box(&self) -> SharedClock;
}

#[derive(Debug)]
pub struct SharedClock(pub Arc<dyn SystemClock>);

impl Clone for SharedClock {
    fn clone(&self) -> Self {
        self.0.clone_box()
    }
}

impl Deref for SharedClock {
    type Target = dyn SystemClock;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        SharedClock(Arc::new(WallClock))
    }
}

/// Real wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct WallClock;

impl SystemClock for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn clone_box(&self) -> SharedClock {
        SharedClock(Arc::new(*self))
    }
}

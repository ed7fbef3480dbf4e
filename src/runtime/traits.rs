//! Trait abstractions for the runtime's ambient inputs
//!
//! Time and identifiers are injected so the reducer stays deterministic
//! under test.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Source of timestamps. Must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of unique identifiers for events and tasks
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Wall clock, clamped so readings are non-decreasing
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = match *last {
            Some(prev) => Utc::now().max(prev),
            None => Utc::now(),
        };
        *last = Some(now);
        now
    }
}

/// Random v4 identifiers
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<T: IdGenerator + ?Sized> IdGenerator for Arc<T> {
    fn next_id(&self) -> Uuid {
        (**self).next_id()
    }
}

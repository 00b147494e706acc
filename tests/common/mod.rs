pub mod builders;

pub use builders::*;

use std::sync::atomic::{AtomicU64, Ordering};

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a name that is unique within the test process, so tests that
/// share a store never collide on scoped-uniqueness constraints.
pub fn unique_name(prefix: &str) -> String {
    let counter = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{counter}")
}

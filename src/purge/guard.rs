use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Users with a purge currently running in this process
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<i64>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `user_id`, or `None` if another purge already holds it
    pub fn claim(&self, user_id: i64) -> Option<Claim> {
        if !lock(&self.ids).insert(user_id) {
            return None;
        }
        Some(Claim {
            ids: Arc::clone(&self.ids),
            user_id,
        })
    }

    pub fn is_claimed(&self, user_id: i64) -> bool {
        lock(&self.ids).contains(&user_id)
    }
}

/// Released on drop
#[derive(Debug)]
pub struct Claim {
    ids: Arc<Mutex<HashSet<i64>>>,
    user_id: i64,
}

impl Drop for Claim {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.user_id);
    }
}

// The set stays consistent even if a holder panicked
fn lock(ids: &Mutex<HashSet<i64>>) -> MutexGuard<'_, HashSet<i64>> {
    ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

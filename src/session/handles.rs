//! Opaque variable references handed out to the client.

use std::collections::HashMap;

/// Handles start here; everything below is free for fixed ids.
const HANDLE_SEED: i64 = 1000;

/// Monotonic handle table.
///
/// References are never reclaimed for the session lifetime and the same
/// label may be bound to many handles; a session is short-lived, so the
/// table is allowed to grow without bound.
#[derive(Debug)]
pub struct Handles<T> {
    next: i64,
    map: HashMap<i64, T>,
}

impl<T> Default for Handles<T> {
    fn default() -> Self {
        Handles {
            next: HANDLE_SEED,
            map: HashMap::new(),
        }
    }
}

impl<T> Handles<T> {
    pub fn create(&mut self, value: T) -> i64 {
        let handle = self.next;
        self.next += 1;
        self.map.insert(handle, value);
        handle
    }

    pub fn get(&self, handle: i64) -> Option<&T> {
        self.map.get(&handle)
    }
}

use std::sync::{Mutex, PoisonError};

/// Round-robin cursor over a fixed number of sessions.
///
/// The cursor has its own lock so rotation never contends with
/// session reads or organization id writes.
pub struct SessionRotator {
    cursor: Mutex<usize>,
    len: usize,
}

impl SessionRotator {
    pub fn new(len: usize) -> Self {
        Self {
            cursor: Mutex::new(0),
            len,
        }
    }

    /// Return the current index and advance the cursor modulo the pool size.
    ///
    /// With an empty pool this always yields 0, which the session lookup
    /// then rejects as out of range.
    pub fn next_index(&self) -> usize {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let index = *cursor;
        if self.len > 0 {
            *cursor = (index + 1) % self.len;
        }
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

//! Type aliases for commonly used complex types.
//!
//! Shared state crossing the worker boundary uses `parking_lot` locks behind
//! an `Arc`; callbacks invoked from the worker must be `Send + Sync`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grblkit_core::types::*;
//!
//! // Instead of: Arc<Mutex<VecDeque<Vec<u8>>>>
//! let queue: ThreadSafeDeque<Vec<u8>> = thread_safe_deque();
//! ```

use crate::data::FieldValue;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

// =============================================================================
// THREAD-SAFE SHARED TYPES (Arc<Mutex<T>> / Arc<RwLock<T>>)
// =============================================================================

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe deque, used for producer/worker command queues.
pub type ThreadSafeDeque<T> = Arc<Mutex<VecDeque<T>>>;

/// A thread-safe read-write lock wrapper for read-heavy shared state.
///
/// The worker writes, any number of consumers read.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// Change notification callback: `(field_name, value)`.
///
/// Invoked on the worker only when a field actually changes.
pub type ChangeCallback = Arc<dyn Fn(&str, &FieldValue) + Send + Sync>;

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Create a new thread-safe value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new empty thread-safe deque.
#[inline]
pub fn thread_safe_deque<T>() -> ThreadSafeDeque<T> {
    Arc::new(Mutex::new(VecDeque::new()))
}

/// Create a new thread-safe read-write value.
#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_deque_shared() {
        let queue: ThreadSafeDeque<u8> = thread_safe_deque();
        let producer = queue.clone();
        producer.lock().push_back(1);
        producer.lock().push_back(2);
        assert_eq!(queue.lock().pop_front(), Some(1));
        assert_eq!(queue.lock().len(), 1);
    }

    #[test]
    fn test_change_callback_is_shareable() {
        let seen = thread_safe(Vec::<String>::new());
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |name: &str, _value: &FieldValue| {
            sink.lock().push(name.to_string());
        });
        callback("feed_rate", &FieldValue::Number(1.0));
        assert_eq!(seen.lock().as_slice(), ["feed_rate".to_string()]);
    }
}

//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Arc<Mutex<T>>`, notification callbacks, etc.

pub mod aliases;

pub use aliases::*;

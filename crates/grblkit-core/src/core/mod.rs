//! Engine-level events and their dispatcher

pub mod event;

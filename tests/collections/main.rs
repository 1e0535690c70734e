//! Collections Integration Tests
//!
//! Transactional collections and the finger tree underneath them, exercised
//! through the public API across threads.

#[path = "../common/mod.rs"]
mod common;

mod broadcast;
mod fingertree;

//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **kv**: key-value store adapters (in-process and Redis-backed)
//! - **persistence**: the user repository built on any key-value store,
//!   together with its uniqueness index and stored record formats
//!
//! Store adapters are thin translators. The claim protocol lives in
//! `persistence` so that it is identical for every backend.

pub mod kv;
pub mod persistence;

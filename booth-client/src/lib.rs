//! Booth Client - REST access to the booth reservation backend
//!
//! Wraps the backend's auth, exhibition and booking endpoints behind typed,
//! async APIs. Authentication goes through the [`AuthBackend`] trait so the
//! session layer can be driven by a fake in tests.

pub mod api;

pub use api::*;

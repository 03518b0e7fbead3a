//! Booth Session - client-side login session for the booth reservation backend
//!
//! [`SessionManager`] is the single writer of the session. It restores the
//! session persisted by a [`SessionStore`], logs in and out through an
//! [`AuthBackend`](booth_client::AuthBackend), and publishes every change
//! to subscribers.

pub mod manager;
pub mod normalize;
pub mod store;

pub use manager::SessionManager;
pub use normalize::{decode_stored_user, encode_stored_user, normalize_profile};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, TOKEN_KEY, USER_KEY};

//! Session registry keyed by connection.

mod sessions;

pub use sessions::{SessionHandle, SessionRegistry};

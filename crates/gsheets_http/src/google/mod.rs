//! Google api authorization.

pub mod credentials;
pub mod session;

//! OAuth consumer lifecycle
//!
//! The `NoToken -> Unauthorized -> Authorized -> AccessGranted` state
//! machine and the token storage backing it.

pub mod consumer;
pub mod tokens;

pub use consumer::{Consumer, ConsumerOptions, ServiceDescription};
pub use tokens::{FileTokenStore, InMemoryTokenStore, IssuedToken, TokenState, TokenStore};

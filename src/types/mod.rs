//! Type definitions for authwire
//!
//! Newtype identifiers used throughout the crate for type safety.

pub mod identifiers;

pub use identifiers::{AssociationHandle, ConsumerKey, TokenIdentifier};

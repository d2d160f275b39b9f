//! OpenID association lifecycle
//!
//! The `Unestablished -> Negotiating -> Established -> Expired` flow:
//! shared-secret establishment (optionally via Diffie-Hellman) and
//! per-association signing.

pub mod association;
pub mod relying_party;

pub use association::{Association, SessionType};
pub use relying_party::{AssociationPreference, RelyingParty};

//! # authwire
//!
//! OAuth 1.0 and OpenID 2.0 message toolkit: constructing, signing,
//! transmitting, receiving, verifying, and replay-protecting protocol
//! messages exchanged between a relying party/consumer and a provider.
//!
//! ## Quick Start
//!
//! Run the OAuth token lifecycle over a channel:
//!
//! ```no_run
//! use std::sync::Arc;
//! use authwire::channel::{Channel, ChannelOptions};
//! use authwire::crypto::SignatureMethod;
//! use authwire::nonce::InMemoryNonceStore;
//! use authwire::oauth::{Consumer, ConsumerOptions, InMemoryTokenStore, ServiceDescription};
//! use authwire::transport::{DeliveryMethods, HttpTransport, MessageEndpoint};
//! use authwire::types::ConsumerKey;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new());
//! let nonces = Arc::new(InMemoryNonceStore::new(Duration::from_secs(420)));
//! let channel = Channel::new(transport, nonces, &ChannelOptions::default())?;
//!
//! let service = ServiceDescription {
//!     request_token_endpoint: MessageEndpoint::new(
//!         "https://provider.example/request_token".parse()?,
//!         DeliveryMethods::POST_BODY,
//!     ),
//!     user_authorization_endpoint: "https://provider.example/authorize".parse()?,
//!     access_token_endpoint: MessageEndpoint::new(
//!         "https://provider.example/access_token".parse()?,
//!         DeliveryMethods::POST_BODY,
//!     ),
//!     signature_method: SignatureMethod::HmacSha1,
//! };
//! let options = ConsumerOptions::builder()
//!     .consumer_key(ConsumerKey::new("my-consumer"))
//!     .consumer_secret("my-secret".to_string())
//!     .build();
//! let consumer = Consumer::new(service, options, channel, Arc::new(InMemoryTokenStore::new()));
//!
//! let issued = consumer.request_token(None).await?;
//! println!("send the user to {}", consumer.authorization_url(&issued)?);
//! // ... after the owner approves out-of-band:
//! let authorized = consumer.finalize_authorization(&issued, issued.token.as_str(), None)?;
//! let access = consumer.exchange_access_token(authorized.token.as_str()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`message`]: typed messages, static field descriptors, the tolerant
//!   serializer, and the extension registry
//! - [`crypto`]: signature methods, the canonical signature base string,
//!   Diffie-Hellman key agreement, nonce generation
//! - [`channel`]: the binding element pipeline (expiration, replay
//!   protection, signing) and the channel orchestrating both directions
//! - [`nonce`]: the nonce store backing replay protection
//! - [`transport`]: abstract request/response shapes, delivery-method
//!   placement, and the reqwest-backed HTTP transport
//! - [`oauth`]: the consumer token state machine and token storage
//! - [`openid`]: association establishment and per-association signing
//! - [`discovery`]: resolved discovery input (service elements)
//! - [`error`]: error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for
//! structured logging. Events are always emitted but are zero-cost when
//! no subscriber is attached; attach one in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, AuthWireError>`](Result).
//! Wire-level protection failures carry a typed reason:
//!
//! ```no_run
//! # use authwire::{AuthWireError, ProtectionFailureReason};
//! # fn example(err: AuthWireError) {
//! match err {
//!     AuthWireError::ProtectionFailure { reason: ProtectionFailureReason::ReplayedMessage } => {
//!         eprintln!("message replayed");
//!     }
//!     AuthWireError::Protocol { message, .. } => {
//!         eprintln!("provider rejected the request: {message}");
//!     }
//!     e => eprintln!("error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod message;
pub mod nonce;
pub mod oauth;
pub mod openid;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use channel::{Channel, ChannelOptions, Envelope, Pipeline};
pub use crypto::{AssociationAlgorithm, SignatureMethod, SigningCredential};
pub use error::{AuthWireError, ProtectionFailureReason, Result};
pub use message::{Direction, Message, ProtectionKind, ProtocolVersion};
pub use nonce::{InMemoryNonceStore, NonceStore};
pub use oauth::{Consumer, ConsumerOptions, IssuedToken, ServiceDescription, TokenState};
pub use openid::{Association, AssociationPreference, RelyingParty, SessionType};
pub use transport::{
    DeliveryMethods, HttpMethod, HttpTransport, MessageEndpoint, Transport, WireRequest,
    WireResponse,
};
pub use types::{AssociationHandle, ConsumerKey, TokenIdentifier};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Transport layer
//!
//! The abstract request/response shapes the channel hands to its
//! transport collaborator, and the delivery-method selection that
//! decides where on the wire the field mapping rides. Retry and timeout
//! policy belong to the transport, not to the channel.

pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::utils::percent_encode;

pub use http::HttpTransport;

// ============================================================================
// Delivery Methods
// ============================================================================

/// The methods available for sending a message to a remote party,
/// bitwise-combinable per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryMethods(u8);

impl DeliveryMethods {
    /// No delivery methods allowed
    pub const NONE: Self = Self(0);
    /// In the HTTP Authorization header
    pub const AUTHORIZATION_HEADER: Self = Self(0x1);
    /// As a form-encoded HTTP POST body
    pub const POST_BODY: Self = Self(0x2);
    /// Appended to the URL query string
    pub const QUERY_STRING: Self = Self(0x4);

    /// Whether all methods in `other` are allowed here
    #[must_use]
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no method is allowed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DeliveryMethods {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DeliveryMethods {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// HTTP methods the channel emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
}

impl HttpMethod {
    /// Canonical upper-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// An endpoint a message type may be delivered to, with its allowed
/// delivery methods
#[derive(Debug, Clone)]
pub struct MessageEndpoint {
    /// The endpoint URL
    pub url: Url,
    /// Delivery methods the endpoint accepts
    pub methods: DeliveryMethods,
}

impl MessageEndpoint {
    /// Create an endpoint description
    #[must_use]
    pub fn new(url: Url, methods: DeliveryMethods) -> Self {
        Self { url, methods }
    }
}

// ============================================================================
// Wire Shapes
// ============================================================================

/// A fully placed outgoing request, ready for the transport
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Target URL, including any query-string placement
    pub url: Url,
    /// Authorization header value, when header placement was chosen
    pub authorization: Option<String>,
    /// Form-encoded body, when body placement was chosen
    pub body: Option<String>,
}

/// The transport's view of a response
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl WireResponse {
    /// Whether the status is in the success range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait the channel delegates network exchange to.
///
/// Implementations own connection handling, timeouts, and any retry
/// policy; a failed or timed-out exchange must surface as an error so
/// the caller's state machine stays unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a placed request and return the raw response.
    ///
    /// # Errors
    /// Returns a transport error when the exchange cannot complete.
    async fn send(&self, request: WireRequest) -> Result<WireResponse>;
}

/// Render protocol parameters as an `OAuth` Authorization header value.
///
/// Only the protocol's own parameters belong in the header; application
/// parameters stay in the body or query string.
#[must_use]
pub fn render_authorization_header(fields: &BTreeMap<String, String>) -> String {
    let rendered = fields
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", percent_encode(name), percent_encode(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {rendered}")
}

/// Split a field mapping into protocol parameters (header-eligible) and
/// application parameters.
#[must_use]
pub fn split_protocol_fields(
    fields: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut protocol = BTreeMap::new();
    let mut application = BTreeMap::new();
    for (name, value) in fields {
        if name.starts_with("oauth_") {
            protocol.insert(name.clone(), value.clone());
        } else {
            application.insert(name.clone(), value.clone());
        }
    }
    (protocol, application)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_methods_combine() {
        let methods = DeliveryMethods::AUTHORIZATION_HEADER | DeliveryMethods::POST_BODY;
        assert!(methods.contains(DeliveryMethods::AUTHORIZATION_HEADER));
        assert!(methods.contains(DeliveryMethods::POST_BODY));
        assert!(!methods.contains(DeliveryMethods::QUERY_STRING));
        assert!(DeliveryMethods::NONE.is_empty());
    }

    #[test]
    fn test_authorization_header_rendering() {
        let mut fields = BTreeMap::new();
        fields.insert("oauth_token".to_string(), "abc".to_string());
        fields.insert("oauth_signature".to_string(), "a+b/c=".to_string());
        let header = render_authorization_header(&fields);
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_token=\"abc\""));
        assert!(header.contains("oauth_signature=\"a%2Bb%2Fc%3D\""));
    }

    #[test]
    fn test_split_protocol_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("oauth_token".to_string(), "abc".to_string());
        fields.insert("q".to_string(), "contacts".to_string());
        let (protocol, application) = split_protocol_fields(&fields);
        assert!(protocol.contains_key("oauth_token"));
        assert!(application.contains_key("q"));
        assert_eq!(protocol.len() + application.len(), fields.len());
    }
}

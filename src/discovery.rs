//! Resolved discovery input
//!
//! Discovery document parsing (XRDS or equivalent) happens outside this
//! crate; what arrives here is its resolved output, a sequence of
//! (service type URIs, endpoint URI, priority) tuples used to learn
//! provider endpoints and advertised extension support.

use url::Url;

/// One service element from a resolved discovery document
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceElement {
    /// Type URIs the service advertises
    pub type_uris: Vec<String>,
    /// The service endpoint
    pub endpoint: Url,
    /// Selection priority; lower is preferred, absent sorts last
    pub priority: Option<u32>,
}

impl ServiceElement {
    /// Create a service element
    #[must_use]
    pub fn new(type_uris: Vec<String>, endpoint: Url, priority: Option<u32>) -> Self {
        Self {
            type_uris,
            endpoint,
            priority,
        }
    }

    /// Whether the element advertises a type URI
    #[must_use]
    pub fn advertises(&self, type_uri: &str) -> bool {
        self.type_uris.iter().any(|uri| uri == type_uri)
    }
}

/// The resolved output of discovery for one identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResult {
    services: Vec<ServiceElement>,
}

impl DiscoveryResult {
    /// Create a result, ordering services by ascending priority with
    /// unprioritized elements last
    #[must_use]
    pub fn new(mut services: Vec<ServiceElement>) -> Self {
        services.sort_by_key(|service| (service.priority.is_none(), service.priority));
        Self { services }
    }

    /// All services, in selection order
    #[must_use]
    pub fn services(&self) -> &[ServiceElement] {
        &self.services
    }

    /// The preferred service advertising a type URI
    #[must_use]
    pub fn find_service(&self, type_uri: &str) -> Option<&ServiceElement> {
        self.services
            .iter()
            .find(|service| service.advertises(type_uri))
    }

    /// Whether any service advertises the extension type URI
    #[must_use]
    pub fn supports_extension(&self, type_uri: &str) -> bool {
        self.find_service(type_uri).is_some()
    }
}

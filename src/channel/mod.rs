//! Message channel
//!
//! The single entry and exit point external collaborators use: the
//! channel serializes typed messages, runs the binding element pipeline
//! over the serialized fields, places the result on the wire per the
//! endpoint's allowed delivery methods, and reverses the whole process
//! for incoming fields.

pub mod binding;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::crypto::SigningCredential;
use crate::error::{AuthWireError, ProtectionFailureReason, Result};
use crate::message::{
    ExtensionDescriptor, ExtensionRegistry, Message, ProtectionKind, ProtocolVersion, deserialize,
    serialize,
};
use crate::nonce::NonceStore;
use crate::transport::{
    DeliveryMethods, HttpMethod, MessageEndpoint, Transport, WireRequest,
    render_authorization_header, split_protocol_fields,
};
use crate::utils::{decode_response_body, encode_form};

pub use binding::{
    BindingDirection, BindingElement, BindingOutcome, Envelope, ExpirationElement, Pipeline,
    ReplayProtectionElement, TamperProtectionElement,
};

/// Channel configuration
#[derive(Debug, Clone, TypedBuilder)]
pub struct ChannelOptions {
    /// Maximum accepted age of an incoming signed message
    #[builder(default = Duration::from_secs(300))]
    pub max_message_age: Duration,
    /// Tolerated clock skew between the two parties
    #[builder(default = Duration::from_secs(120))]
    pub clock_skew: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

enum Placement {
    AuthorizationHeader,
    PostBody,
    QueryString,
}

fn select_placement(methods: DeliveryMethods) -> Result<(Placement, HttpMethod)> {
    if methods.contains(DeliveryMethods::AUTHORIZATION_HEADER) {
        Ok((Placement::AuthorizationHeader, HttpMethod::Post))
    } else if methods.contains(DeliveryMethods::POST_BODY) {
        Ok((Placement::PostBody, HttpMethod::Post))
    } else if methods.contains(DeliveryMethods::QUERY_STRING) {
        Ok((Placement::QueryString, HttpMethod::Get))
    } else {
        Err(AuthWireError::invalid_config(
            "endpoint allows no delivery method",
        ))
    }
}

/// Orchestrates serialization and pipeline application for both
/// directions of a message exchange
pub struct Channel {
    pipeline: Pipeline,
    registry: ExtensionRegistry,
    transport: Arc<dyn Transport>,
}

impl Channel {
    /// Create a channel with the standard protection pipeline:
    /// expiration stamping, nonce-based replay protection backed by the
    /// given store, and signing.
    ///
    /// # Errors
    /// Returns an invalid-configuration error if the pipeline invariants
    /// fail (not possible for the standard set).
    pub fn new(
        transport: Arc<dyn Transport>,
        nonce_store: Arc<dyn NonceStore>,
        options: &ChannelOptions,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(vec![
            Arc::new(ExpirationElement::new(
                options.max_message_age,
                options.clock_skew,
            )),
            Arc::new(ReplayProtectionElement::new(nonce_store)),
            Arc::new(TamperProtectionElement::new()),
        ])?;
        Ok(Self::with_pipeline(transport, pipeline))
    }

    /// Create a channel around an explicit pipeline
    #[must_use]
    pub fn with_pipeline(transport: Arc<dyn Transport>, pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            registry: ExtensionRegistry::new(),
            transport,
        }
    }

    /// Register an extension type for incoming deserialization
    pub fn register_extension(&mut self, descriptor: ExtensionDescriptor) {
        self.registry.register(descriptor);
    }

    /// The extension registry consulted during deserialization
    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    fn enforce_required<M: Message>(envelope: &Envelope) -> Result<()> {
        let missing: Vec<ProtectionKind> = M::required_protections()
            .iter()
            .copied()
            .filter(|kind| !envelope.has_applied(*kind))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        // A missing credential is the root cause whenever protections
        // could not be applied at all; otherwise report the strongest
        // protection that is absent.
        let reason = if envelope.credential.is_none() {
            ProtectionFailureReason::MissingCredential
        } else if missing.contains(&ProtectionKind::TamperProtection) {
            ProtectionFailureReason::InvalidSignature
        } else if missing.contains(&ProtectionKind::ReplayProtection) {
            ProtectionFailureReason::ReplayedMessage
        } else {
            ProtectionFailureReason::Expired
        };
        tracing::warn!(
            message = M::message_name(),
            missing = ?missing,
            "required protections were not applied"
        );
        Err(AuthWireError::protection(reason))
    }

    /// Serialize a message and run the outgoing pipeline over it.
    ///
    /// # Errors
    /// Returns validation errors from serialization, protection failures
    /// from the pipeline, and a protection failure when a protection the
    /// message type requires could not be applied.
    pub fn prepare<M: Message + 'static>(
        &self,
        message: &M,
        endpoint: &MessageEndpoint,
        credential: Option<SigningCredential>,
    ) -> Result<Envelope> {
        tracing::debug!(
            message = M::message_name(),
            direction = ?M::direction(),
            endpoint = %endpoint.url,
            "preparing outgoing message"
        );
        let fields = serialize(message)?;
        let (_, http_method) = select_placement(endpoint.methods)?;
        let mut envelope = Envelope::new(http_method, endpoint.url.clone(), fields, credential);
        self.pipeline.apply_outgoing(&mut envelope)?;
        Self::enforce_required::<M>(&envelope)?;
        Ok(envelope)
    }

    /// Run the incoming pipeline over received fields and deserialize
    /// the typed message.
    ///
    /// # Errors
    /// Returns protection failures from the pipeline (verification
    /// first, then replay, then expiration), a protection failure when a
    /// required protection was absent, and validation errors from
    /// deserialization.
    pub fn open<M: Message + 'static>(&self, mut envelope: Envelope, version: ProtocolVersion) -> Result<M> {
        self.pipeline.apply_incoming(&mut envelope)?;
        Self::enforce_required::<M>(&envelope)?;
        deserialize(&envelope.fields, version, &self.registry)
    }

    /// Place a prepared envelope on the wire.
    ///
    /// Delivery methods are equivalent in protection semantics and
    /// differ only in wire placement; when several are allowed the
    /// channel prefers the Authorization header, then the POST body,
    /// then the query string.
    ///
    /// # Errors
    /// Returns an invalid-configuration error when the endpoint allows
    /// no delivery method.
    pub fn place(&self, envelope: Envelope, methods: DeliveryMethods) -> Result<WireRequest> {
        let (placement, http_method) = select_placement(methods)?;
        debug_assert_eq!(http_method, envelope.http_method);

        match placement {
            Placement::AuthorizationHeader => {
                let (protocol, application) = split_protocol_fields(&envelope.fields);
                Ok(WireRequest {
                    method: envelope.http_method,
                    url: envelope.endpoint,
                    authorization: Some(render_authorization_header(&protocol)),
                    body: Some(encode_form(&application)),
                })
            }
            Placement::PostBody => Ok(WireRequest {
                method: envelope.http_method,
                url: envelope.endpoint,
                authorization: None,
                body: Some(encode_form(&envelope.fields)),
            }),
            Placement::QueryString => {
                let mut url = envelope.endpoint;
                url.query_pairs_mut().extend_pairs(envelope.fields.iter());
                Ok(WireRequest {
                    method: envelope.http_method,
                    url,
                    authorization: None,
                    body: None,
                })
            }
        }
    }

    /// Send a prepared envelope and return the decoded response fields.
    ///
    /// No direct-error detection happens here; callers that need to
    /// branch on provider error fields (association renegotiation) use
    /// this and [`Channel::open`] directly.
    ///
    /// # Errors
    /// Returns transport errors, and a transport error for non-success
    /// statuses whose body decodes to nothing.
    pub async fn request_fields(
        &self,
        envelope: Envelope,
        methods: DeliveryMethods,
    ) -> Result<(u16, BTreeMap<String, String>)> {
        let wire = self.place(envelope, methods)?;
        let response = self.transport.send(wire).await?;
        let fields = decode_response_body(&response.body);
        if !response.is_success() && fields.is_empty() {
            return Err(AuthWireError::transport(format!(
                "provider returned status {} with an undecodable body",
                response.status
            )));
        }
        Ok((response.status, fields))
    }

    /// Detect a provider's direct error response among decoded fields
    #[must_use]
    pub fn direct_error(fields: &BTreeMap<String, String>) -> Option<AuthWireError> {
        if let Some(message) = fields.get("error") {
            return Some(AuthWireError::protocol(
                fields.get("error_code").cloned(),
                message.clone(),
                fields.get("contact").cloned(),
                fields.get("reference").cloned(),
            ));
        }
        if let Some(problem) = fields.get("oauth_problem") {
            return Some(AuthWireError::protocol(
                Some(problem.clone()),
                fields
                    .get("oauth_problem_advice")
                    .cloned()
                    .unwrap_or_else(|| problem.clone()),
                None,
                None,
            ));
        }
        None
    }

    /// Perform a complete direct exchange: prepare, place, send, and
    /// open the typed response.
    ///
    /// # Errors
    /// Returns a protocol error when the provider answers with a direct
    /// error response, and everything [`Channel::prepare`],
    /// [`Channel::request_fields`], and [`Channel::open`] can return.
    pub async fn request<Req: Message + 'static, Resp: Message + 'static>(
        &self,
        message: &Req,
        endpoint: &MessageEndpoint,
        credential: Option<SigningCredential>,
    ) -> Result<Resp> {
        let version = message.version();
        let envelope = self.prepare(message, endpoint, credential)?;
        let (status, fields) = self.request_fields(envelope, endpoint.methods).await?;

        if let Some(error) = Self::direct_error(&fields) {
            return Err(error);
        }
        if !(200..300).contains(&status) {
            return Err(AuthWireError::transport(format!(
                "provider returned status {status}"
            )));
        }

        let incoming = Envelope::new(HttpMethod::Post, endpoint.url.clone(), fields, None);
        self.open(incoming, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{SignatureMethod, SigningCredential};
    use crate::message::oauth::{ResourceRequest, UnauthorizedTokenRequest, UnauthorizedTokenResponse};
    use crate::nonce::InMemoryNonceStore;
    use crate::transport::WireResponse;
    use crate::types::{ConsumerKey, TokenIdentifier};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport returning scripted responses and recording requests
    pub(crate) struct ScriptedTransport {
        responses: Mutex<Vec<WireResponse>>,
        pub requests: Mutex<Vec<WireRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<WireResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: WireRequest) -> Result<WireResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AuthWireError::transport("no scripted response left"))
        }
    }

    fn credential() -> SigningCredential {
        SigningCredential::Consumer {
            key: ConsumerKey::new("consumer1"),
            consumer_secret: "secret".to_string(),
            token_secret: String::new(),
            method: SignatureMethod::HmacSha1,
        }
    }

    fn channel(responses: Vec<WireResponse>) -> (Channel, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let store = Arc::new(InMemoryNonceStore::new(Duration::from_secs(420)));
        let channel = Channel::new(
            transport.clone(),
            store,
            &ChannelOptions::default(),
        )
        .unwrap();
        (channel, transport)
    }

    fn endpoint(methods: DeliveryMethods) -> MessageEndpoint {
        MessageEndpoint::new("https://provider.example/rt".parse().unwrap(), methods)
    }

    #[test]
    fn test_prepare_then_open_round_trip() {
        let (channel, _) = channel(Vec::new());
        let message = ResourceRequest::new(
            ProtocolVersion::V1_0,
            ConsumerKey::new("consumer1"),
            TokenIdentifier::new("access1"),
        )
        .with_parameter("q", "contacts");

        let ep = endpoint(DeliveryMethods::POST_BODY);
        let envelope = channel
            .prepare(&message, &ep, Some(credential()))
            .unwrap();

        let incoming = Envelope::new(
            envelope.http_method,
            envelope.endpoint.clone(),
            envelope.fields.clone(),
            Some(credential()),
        );
        let opened: ResourceRequest = channel.open(incoming, ProtocolVersion::V1_0).unwrap();
        assert_eq!(opened, message);
    }

    #[test]
    fn test_open_unsigned_required_message_fails() {
        let (channel, _) = channel(Vec::new());
        let fields: BTreeMap<String, String> = [
            ("oauth_consumer_key".to_string(), "consumer1".to_string()),
            ("oauth_token".to_string(), "access1".to_string()),
        ]
        .into();
        let incoming = Envelope::new(
            HttpMethod::Post,
            "https://provider.example/rt".parse().unwrap(),
            fields,
            Some(credential()),
        );
        let err = channel
            .open::<ResourceRequest>(incoming, ProtocolVersion::V1_0)
            .unwrap_err();
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::InvalidSignature)
        );
    }

    #[test]
    fn test_prepare_without_credential_for_signed_type_fails() {
        let (channel, _) = channel(Vec::new());
        let message = UnauthorizedTokenRequest::new(
            ProtocolVersion::V1_0A,
            ConsumerKey::new("consumer1"),
            None,
        );
        let err = channel
            .prepare(&message, &endpoint(DeliveryMethods::POST_BODY), None)
            .unwrap_err();
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::MissingCredential)
        );
    }

    #[test]
    fn test_placement_preference_and_header_split() {
        let (channel, _) = channel(Vec::new());
        let message = ResourceRequest::new(
            ProtocolVersion::V1_0,
            ConsumerKey::new("consumer1"),
            TokenIdentifier::new("access1"),
        )
        .with_parameter("q", "contacts");
        let methods = DeliveryMethods::AUTHORIZATION_HEADER | DeliveryMethods::POST_BODY;
        let ep = endpoint(methods);

        let envelope = channel.prepare(&message, &ep, Some(credential())).unwrap();
        let wire = channel.place(envelope, methods).unwrap();

        let authorization = wire.authorization.expect("header placement preferred");
        assert!(authorization.starts_with("OAuth "));
        assert!(authorization.contains("oauth_signature="));
        // Application parameters stay out of the header.
        assert!(!authorization.contains("q="));
        assert_eq!(wire.body.as_deref(), Some("q=contacts"));
    }

    #[test]
    fn test_query_string_placement() {
        let (channel, _) = channel(Vec::new());
        let message = ResourceRequest::new(
            ProtocolVersion::V1_0,
            ConsumerKey::new("consumer1"),
            TokenIdentifier::new("access1"),
        );
        let ep = endpoint(DeliveryMethods::QUERY_STRING);
        let envelope = channel.prepare(&message, &ep, Some(credential())).unwrap();
        let wire = channel.place(envelope, ep.methods).unwrap();
        assert_eq!(wire.method, HttpMethod::Get);
        assert!(wire.body.is_none());
        let query = wire.url.query().unwrap();
        assert!(query.contains("oauth_signature="));
        assert!(query.contains("oauth_token=access1"));
    }

    #[tokio::test]
    async fn test_request_parses_typed_response() {
        let (channel, transport) = channel(vec![WireResponse {
            status: 200,
            body: "oauth_token=abc&oauth_token_secret=xyz&oauth_callback_confirmed=true"
                .to_string(),
        }]);
        let message = UnauthorizedTokenRequest::new(
            ProtocolVersion::V1_0A,
            ConsumerKey::new("consumer1"),
            None,
        );
        let response: UnauthorizedTokenResponse = channel
            .request(&message, &endpoint(DeliveryMethods::POST_BODY), Some(credential()))
            .await
            .unwrap();
        assert_eq!(response.token.as_ref().unwrap().as_str(), "abc");
        assert_eq!(response.token_secret.as_deref(), Some("xyz"));
        assert_eq!(response.callback_confirmed, Some(true));

        let sent = transport.requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.as_ref().unwrap().contains("oauth_signature="));
    }

    #[tokio::test]
    async fn test_request_surfaces_direct_error() {
        let (channel, _) = channel(vec![WireResponse {
            status: 400,
            body: "error:Some Error\ncontact:admin@provider.example\n".to_string(),
        }]);
        let message = UnauthorizedTokenRequest::new(
            ProtocolVersion::V1_0A,
            ConsumerKey::new("consumer1"),
            None,
        );
        let err = channel
            .request::<_, UnauthorizedTokenResponse>(
                &message,
                &endpoint(DeliveryMethods::POST_BODY),
                Some(credential()),
            )
            .await
            .unwrap_err();
        match err {
            AuthWireError::Protocol {
                message, contact, ..
            } => {
                assert_eq!(message, "Some Error");
                assert_eq!(contact.as_deref(), Some("admin@provider.example"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

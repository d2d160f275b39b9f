//! Integration tests for the token and association lifecycles
//!
//! A scripted in-process provider stands in for the transport so the
//! full path is exercised: typed message -> serializer -> binding
//! pipeline -> wire placement -> response decoding -> state machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use authwire::channel::{Channel, ChannelOptions};
use authwire::crypto::dh::{DhKeyPair, mask_mac_key, parse_public};
use authwire::crypto::{AssociationAlgorithm, SignatureMethod};
use authwire::nonce::InMemoryNonceStore;
use authwire::oauth::{
    Consumer, ConsumerOptions, InMemoryTokenStore, ServiceDescription, TokenState, TokenStore,
};
use authwire::openid::{AssociationPreference, RelyingParty, SessionType};
use authwire::transport::{
    DeliveryMethods, MessageEndpoint, Transport, WireRequest, WireResponse,
};
use authwire::types::ConsumerKey;
use authwire::utils::decode_form;
use authwire::{AuthWireError, Result};

// ============================================================================
// Scripted Provider
// ============================================================================

type Handler = Box<dyn Fn(&WireRequest) -> Result<WireResponse> + Send + Sync>;

/// Transport whose responses are computed by a queue of handlers, one
/// per expected request
struct ScriptedProvider {
    handlers: Mutex<VecDeque<Handler>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl ScriptedProvider {
    fn new(handlers: Vec<Handler>) -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(handlers.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_body_fields(&self, index: usize) -> std::collections::BTreeMap<String, String> {
        let requests = self.requests.lock().unwrap();
        decode_form(requests[index].body.as_deref().unwrap_or(""))
    }
}

#[async_trait]
impl Transport for ScriptedProvider {
    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AuthWireError::transport("no scripted handler left"))?;
        let response = handler(&request)?;
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

fn form_response(status: u16, body: &str) -> Handler {
    let body = body.to_string();
    Box::new(move |_| {
        Ok(WireResponse {
            status,
            body: body.clone(),
        })
    })
}

fn channel(transport: Arc<ScriptedProvider>) -> Channel {
    let nonces = Arc::new(InMemoryNonceStore::new(Duration::from_secs(420)));
    Channel::new(transport, nonces, &ChannelOptions::default()).unwrap()
}

fn service() -> ServiceDescription {
    ServiceDescription {
        request_token_endpoint: MessageEndpoint::new(
            "https://provider.example/request_token".parse().unwrap(),
            DeliveryMethods::POST_BODY,
        ),
        user_authorization_endpoint: "https://provider.example/authorize".parse().unwrap(),
        access_token_endpoint: MessageEndpoint::new(
            "https://provider.example/access_token".parse().unwrap(),
            DeliveryMethods::POST_BODY,
        ),
        signature_method: SignatureMethod::HmacSha1,
    }
}

fn consumer(transport: Arc<ScriptedProvider>) -> Consumer {
    let options = ConsumerOptions::builder()
        .consumer_key(ConsumerKey::new("consumer1"))
        .consumer_secret("consumer-secret".to_string())
        .build();
    Consumer::new(
        service(),
        options,
        channel(transport),
        Arc::new(InMemoryTokenStore::new()),
    )
}

// ============================================================================
// OAuth Token Lifecycle
// ============================================================================

#[tokio::test]
async fn test_token_lifecycle_with_exactly_one_access_exchange() {
    let provider = ScriptedProvider::new(vec![
        form_response(
            200,
            "oauth_token=abc&oauth_token_secret=xyz&oauth_callback_confirmed=true",
        ),
        form_response(200, "oauth_token=access1&oauth_token_secret=access-secret"),
    ]);
    let consumer = consumer(provider.clone());

    // Step 1: request token.
    let issued = consumer.request_token(None).await.unwrap();
    assert_eq!(issued.token.as_str(), "abc");
    assert_eq!(issued.secret, "xyz");
    assert_eq!(issued.state, TokenState::Unauthorized);

    // The request was signed and nonce-stamped.
    let sent = provider.request_body_fields(0);
    assert_eq!(sent["oauth_consumer_key"], "consumer1");
    assert!(sent.contains_key("oauth_signature"));
    assert!(sent.contains_key("oauth_nonce"));
    assert!(sent.contains_key("oauth_timestamp"));

    // The owner is redirected with the issued token in the query.
    let auth_url = consumer.authorization_url(&issued).unwrap();
    assert!(auth_url.query().unwrap().contains("oauth_token=abc"));

    // Token substitution in the callback is rejected without a state
    // change.
    let substituted = consumer
        .parse_authorization_callback("oauth_token=evil&oauth_verifier=v9")
        .unwrap();
    let err = consumer
        .finalize_authorization(
            &issued,
            substituted.token.as_ref().unwrap().as_str(),
            substituted.verifier.clone(),
        )
        .unwrap_err();
    assert!(matches!(err, AuthWireError::Validation { .. }));
    assert_eq!(
        consumer.tokens().get("abc").unwrap().unwrap().state,
        TokenState::Unauthorized
    );

    // Step 2: finalize with the matching callback.
    let callback = consumer
        .parse_authorization_callback("oauth_token=abc&oauth_verifier=v9")
        .unwrap();
    let authorized = consumer
        .finalize_authorization(
            &issued,
            callback.token.as_ref().unwrap().as_str(),
            callback.verifier.clone(),
        )
        .unwrap();
    assert_eq!(authorized.state, TokenState::Authorized);

    // Step 3: exchange succeeds exactly once.
    let access = consumer.exchange_access_token("abc").await.unwrap();
    assert_eq!(access.token.as_str(), "access1");
    assert_eq!(access.state, TokenState::AccessGranted);

    // The exchange was signed with the token secret and carried the
    // verifier.
    let exchange = provider.request_body_fields(1);
    assert_eq!(exchange["oauth_token"], "abc");
    assert_eq!(exchange["oauth_verifier"], "v9");

    let err = consumer.exchange_access_token("abc").await.unwrap_err();
    assert!(matches!(err, AuthWireError::TokenState(_)));
    assert_eq!(provider.request_count(), 2, "no second exchange on the wire");

    // Step 4: resource requests sign with the access token.
    let resource_endpoint = MessageEndpoint::new(
        "https://provider.example/api/contacts".parse().unwrap(),
        DeliveryMethods::AUTHORIZATION_HEADER | DeliveryMethods::POST_BODY,
    );
    let wire = consumer
        .prepare_resource_request(&access, &resource_endpoint, &[("q", "friends")])
        .unwrap();
    let header = wire.authorization.unwrap();
    assert!(header.contains("oauth_token=\"access1\""));
    assert!(header.contains("oauth_signature="));
    assert_eq!(wire.body.as_deref(), Some("q=friends"));

    // A non-access token cannot address resources.
    let err = consumer
        .prepare_resource_request(&issued, &resource_endpoint, &[])
        .unwrap_err();
    assert!(matches!(err, AuthWireError::TokenState(_)));
}

#[tokio::test]
async fn test_request_token_failure_is_non_mutating() -> anyhow::Result<()> {
    let provider = ScriptedProvider::new(vec![
        form_response(401, "oauth_problem=consumer_key_unknown"),
        form_response(
            200,
            "oauth_token=abc&oauth_token_secret=xyz&oauth_callback_confirmed=true",
        ),
    ]);
    let consumer = consumer(provider.clone());

    let err = consumer.request_token(None).await.unwrap_err();
    assert!(matches!(err, AuthWireError::Protocol { .. }));
    assert!(consumer.tokens().get("abc")?.is_none());

    // The failed attempt left the state machine unchanged; a retry
    // starts from scratch and succeeds.
    let issued = consumer.request_token(None).await?;
    assert_eq!(issued.state, TokenState::Unauthorized);
    Ok(())
}

// ============================================================================
// OpenID Association Lifecycle
// ============================================================================

fn dh_provider_handler(
    mac_key: &'static [u8],
    algorithm: &'static str,
    session: &'static str,
    expires_in: u64,
) -> Handler {
    Box::new(move |request| {
        let fields = decode_form(request.body.as_deref().unwrap_or(""));
        assert_eq!(fields["mode"], "associate");
        let consumer_public = parse_public(&fields["dh_consumer_public"]).unwrap();

        let provider_pair = DhKeyPair::generate();
        let shared = provider_pair.shared_secret(&consumer_public);
        let hash = SessionType::from_wire_name(session).unwrap().dh_hash().unwrap();
        let wrapped = mask_mac_key(&shared, mac_key, hash).unwrap();

        let body = format!(
            "ns:http://specs.openid.net/auth/2.0\n\
             assoc_handle:handle-42\n\
             assoc_type:{algorithm}\n\
             session_type:{session}\n\
             expires_in:{expires_in}\n\
             dh_server_public:{}\n\
             enc_mac_key:{}\n",
            provider_pair.public_base64(),
            STANDARD.encode(&wrapped),
        );
        Ok(WireResponse { status: 200, body })
    })
}

fn unsupported_type_handler(preferred_algorithm: &'static str, preferred_session: &'static str) -> Handler {
    Box::new(move |_| {
        let body = format!(
            "ns:http://specs.openid.net/auth/2.0\n\
             error:association type not supported\n\
             error_code:unsupported-type\n\
             assoc_type:{preferred_algorithm}\n\
             session_type:{preferred_session}\n",
        );
        Ok(WireResponse { status: 400, body })
    })
}

fn openid_endpoint() -> MessageEndpoint {
    MessageEndpoint::new(
        "https://op.example/endpoint".parse().unwrap(),
        DeliveryMethods::POST_BODY,
    )
}

#[tokio::test]
async fn test_dh_association_handshake_recovers_mac_key() {
    static MAC_KEY: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let provider = ScriptedProvider::new(vec![dh_provider_handler(
        &MAC_KEY,
        "HMAC-SHA256",
        "DH-SHA256",
        3600,
    )]);
    let relying_party = RelyingParty::new(channel(provider.clone()));

    let association = relying_party
        .associate(&openid_endpoint(), AssociationPreference::default())
        .await
        .unwrap();

    // The XOR-wrapped secret unwraps byte-for-byte.
    assert_eq!(association.secret(), MAC_KEY.as_slice());
    assert_eq!(association.handle.as_str(), "handle-42");
    assert_eq!(association.algorithm, AssociationAlgorithm::HmacSha256);
    assert!(!association.is_expired());

    // The association is cached and signs messages.
    let found = relying_party
        .find(&"https://op.example/endpoint".parse().unwrap())
        .unwrap();
    let credential = found.credential().unwrap();
    let signature = credential.sign("some-base-string").unwrap();
    assert!(credential.verify("some-base-string", &signature).unwrap());
}

#[tokio::test]
async fn test_unsupported_type_retries_once_with_provider_preference() {
    static MAC_KEY: [u8; 20] = [9; 20];
    let provider = ScriptedProvider::new(vec![
        unsupported_type_handler("HMAC-SHA1", "DH-SHA1"),
        dh_provider_handler(&MAC_KEY, "HMAC-SHA1", "DH-SHA1", 3600),
    ]);
    let relying_party = RelyingParty::new(channel(provider.clone()));

    let association = relying_party
        .associate(&openid_endpoint(), AssociationPreference::default())
        .await
        .unwrap();
    assert_eq!(association.algorithm, AssociationAlgorithm::HmacSha1);
    assert_eq!(provider.request_count(), 2);

    // The retry carried the provider's stated preference.
    let retry = provider.request_body_fields(1);
    assert_eq!(retry["assoc_type"], "HMAC-SHA1");
    assert_eq!(retry["session_type"], "DH-SHA1");
}

#[tokio::test]
async fn test_repeated_type_mismatch_is_terminal() {
    let provider = ScriptedProvider::new(vec![
        unsupported_type_handler("HMAC-SHA1", "DH-SHA1"),
        unsupported_type_handler("HMAC-SHA1", "DH-SHA1"),
    ]);
    let relying_party = RelyingParty::new(channel(provider.clone()));

    let err = relying_party
        .associate(&openid_endpoint(), AssociationPreference::default())
        .await
        .unwrap_err();
    match err {
        AuthWireError::Protocol { code, .. } => {
            assert_eq!(code.as_deref(), Some("unsupported-type"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Exactly one retry; no unbounded renegotiation.
    assert_eq!(provider.request_count(), 2);

    // Nothing half-established was stored.
    assert!(
        relying_party
            .find(&"https://op.example/endpoint".parse().unwrap())
            .is_none()
    );
}

#[tokio::test]
async fn test_expired_association_is_not_offered() {
    static MAC_KEY: [u8; 32] = [3; 32];
    let provider = ScriptedProvider::new(vec![dh_provider_handler(
        &MAC_KEY,
        "HMAC-SHA256",
        "DH-SHA256",
        0,
    )]);
    let relying_party = RelyingParty::new(channel(provider.clone()));

    let association = relying_party
        .associate(&openid_endpoint(), AssociationPreference::default())
        .await
        .unwrap();
    assert!(association.is_expired());
    assert!(matches!(
        association.credential().unwrap_err(),
        AuthWireError::AssociationExpired { .. }
    ));

    // Lookup drops the expired entry; the caller must negotiate afresh.
    assert!(
        relying_party
            .find(&"https://op.example/endpoint".parse().unwrap())
            .is_none()
    );
}

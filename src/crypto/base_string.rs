//! Canonical signature base string
//!
//! The deterministic concatenation of HTTP method, normalized endpoint
//! URI, and the sorted-and-escaped parameter list. Signer and verifier
//! must produce byte-identical output for a signature to validate, so
//! every rule here (case, ordering, escaping, default-port handling) is
//! load-bearing.

use std::collections::BTreeMap;

use url::Url;

use crate::utils::percent_encode;

/// The field excluded from its own signature
pub const SIGNATURE_FIELD: &str = "oauth_signature";

fn normalized_endpoint(endpoint: &Url) -> String {
    let scheme = endpoint.scheme().to_ascii_lowercase();
    let host = endpoint.host_str().unwrap_or("").to_ascii_lowercase();
    // Url::port() already yields None for scheme-default ports.
    let port = endpoint
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    format!("{scheme}://{host}{port}{}", endpoint.path())
}

/// Compute the signature base string for a field mapping sent to an
/// endpoint.
///
/// Parameters are the message fields (minus any existing signature) plus
/// the endpoint's own query parameters, sorted by encoded name then
/// encoded value.
#[must_use]
pub fn signature_base_string(
    http_method: &str,
    endpoint: &Url,
    fields: &BTreeMap<String, String>,
) -> String {
    let mut params: Vec<(String, String)> = fields
        .iter()
        .filter(|(name, _)| name.as_str() != SIGNATURE_FIELD)
        .map(|(name, value)| (percent_encode(name), percent_encode(value)))
        .collect();
    for (name, value) in endpoint.query_pairs() {
        params.push((percent_encode(&name), percent_encode(&value)));
    }
    params.sort();

    let param_string = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        http_method.to_ascii_uppercase(),
        percent_encode(&normalized_endpoint(endpoint)),
        percent_encode(&param_string)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_base_string_is_deterministic() {
        let endpoint: Url = "https://provider.example/request_token".parse().unwrap();
        let f = fields(&[("oauth_consumer_key", "key"), ("oauth_nonce", "n1")]);
        let a = signature_base_string("post", &endpoint, &f);
        let b = signature_base_string("POST", &endpoint, &f);
        assert_eq!(a, b);
        assert!(a.starts_with("POST&https%3A%2F%2Fprovider.example%2Frequest_token&"));
    }

    #[test]
    fn test_signature_field_excluded() {
        let endpoint: Url = "https://provider.example/rt".parse().unwrap();
        let without = fields(&[("a", "1")]);
        let mut with = without.clone();
        with.insert(SIGNATURE_FIELD.to_string(), "sig".to_string());
        assert_eq!(
            signature_base_string("POST", &endpoint, &without),
            signature_base_string("POST", &endpoint, &with)
        );
    }

    #[test]
    fn test_endpoint_query_params_included_and_sorted() {
        let endpoint: Url = "https://provider.example/rt?b=2".parse().unwrap();
        let f = fields(&[("a", "1"), ("c", "3")]);
        let base = signature_base_string("GET", &endpoint, &f);
        let params = base.split('&').nth(2).unwrap();
        assert_eq!(params, "a%3D1%26b%3D2%26c%3D3");
    }

    #[test]
    fn test_default_port_omitted_nonstandard_kept() {
        let default: Url = "https://provider.example:443/rt".parse().unwrap();
        let custom: Url = "https://provider.example:8443/rt".parse().unwrap();
        let f = fields(&[]);
        assert!(
            signature_base_string("GET", &default, &f)
                .contains(&percent_encode("https://provider.example/rt"))
        );
        assert!(
            signature_base_string("GET", &custom, &f)
                .contains(&percent_encode("https://provider.example:8443/rt"))
        );
    }

    #[test]
    fn test_value_change_changes_base_string() {
        let endpoint: Url = "https://provider.example/rt".parse().unwrap();
        let a = signature_base_string("POST", &endpoint, &fields(&[("k", "v1")]));
        let b = signature_base_string("POST", &endpoint, &fields(&[("k", "v2")]));
        assert_ne!(a, b);
    }
}

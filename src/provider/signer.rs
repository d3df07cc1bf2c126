//! AWS Signature Version 4 request signing.
//!
//! Requests are signed with an `Authorization` header over the host, content
//! type, date, optional target and optional session token headers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::config::Credentials;

/// Signing algorithm identifier.
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A request about to be signed.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Host header value.
    pub host: &'a str,
    /// Unencoded request path.
    pub path: &'a str,
    /// Query parameters.
    pub query: &'a [(String, String)],
    /// Extra headers to sign (lowercase names).
    pub headers: &'a [(&'a str, &'a str)],
    /// Request body.
    pub body: &'a [u8],
}

/// Signs requests for one service and region.
#[derive(Debug, Clone)]
pub struct RequestSigner<'a> {
    /// Credentials to sign with.
    credentials: &'a Credentials,
    /// Signing region.
    region: &'a str,
    /// Signing service name.
    service: &'a str,
}

impl<'a> RequestSigner<'a> {
    /// Creates a signer.
    #[must_use]
    pub const fn new(credentials: &'a Credentials, region: &'a str, service: &'a str) -> Self {
        Self {
            credentials,
            region,
            service,
        }
    }

    /// Returns the headers to add to `request`, `Authorization` included.
    #[must_use]
    pub fn sign(&self, request: &SignableRequest<'_>, now: DateTime<Utc>) -> Vec<(String, String)> {
        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        headers.insert(String::from("host"), request.host.to_string());
        headers.insert(String::from("x-amz-date"), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            headers.insert(String::from("x-amz-security-token"), token.clone());
        }

        let canonical_headers: String = headers.iter().fold(String::new(), |mut out, (k, v)| {
            let _ = writeln!(out, "{k}:{v}");
            out
        });
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            uri_encode_path(request.path),
            canonical_query_string(request.query),
            canonical_headers,
            signed_headers,
            hex_sha256(request.body)
        );

        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = calculate_signature(
            &self.credentials.secret_access_key,
            &date,
            self.region,
            self.service,
            &string_to_sign,
        );

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );

        headers.remove("host");
        let mut out: Vec<(String, String)> = headers.into_iter().collect();
        out.push((String::from("authorization"), authorization));
        out
    }
}

/// Builds the canonical query string: sorted, every key and value encoded.
#[must_use]
pub fn canonical_query_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode_value(k), uri_encode_value(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Derives the signing key and signs `string_to_sign`.
fn calculate_signature(
    secret_key: &str,
    date: &str,
    region: &str,
    service: &str,
    string_to_sign: &str,
) -> String {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded SHA-256 of `data`.
#[must_use]
pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// URI-encodes a path, preserving slashes.
#[must_use]
pub fn uri_encode_path(path: &str) -> String {
    encode(path, true)
}

/// URI-encodes a query key or value.
#[must_use]
pub fn uri_encode_value(value: &str) -> String {
    encode(value, false)
}

fn encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            b'/' if keep_slash => out.push('/'),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

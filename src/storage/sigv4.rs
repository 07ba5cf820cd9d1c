//! AWS Signature Version 4 request signing for the object-store backend.
//!
//! Only the header-based flavour is implemented (no presigned URLs, no
//! chunked payload signing). Every request signs `host`, `x-amz-date`,
//! `x-amz-content-sha256` and, with temporary credentials,
//! `x-amz-security-token`.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::StorageError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static or session credentials read from the standard AWS variables.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, StorageError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        Ok(Self {
            access_key_id: read("AWS_ACCESS_KEY_ID")
                .ok_or(StorageError::MissingCredentials("AWS_ACCESS_KEY_ID"))?,
            secret_access_key: read("AWS_SECRET_ACCESS_KEY")
                .ok_or(StorageError::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?,
            session_token: read("AWS_SESSION_TOKEN"),
        })
    }
}

/// The parts of an HTTP request that go into the signature.
pub struct CanonicalRequest<'a> {
    method: &'a str,
    uri: &'a str,
    query: String,
    /// Lowercased names, sorted.
    headers: Vec<(String, String)>,
    payload_hash: &'a str,
}

impl<'a> CanonicalRequest<'a> {
    /// `uri` must already be URI-encoded (see [`uri_encode`]).
    pub fn new(
        method: &'a str,
        uri: &'a str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
        payload_hash: &'a str,
    ) -> Self {
        let mut headers: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), collapse_whitespace(value)))
            .collect();
        headers.sort();

        Self {
            method,
            uri,
            query: canonical_query(query),
            headers,
            payload_hash,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn signed_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    fn render(&self) -> String {
        let mut canonical_headers = String::new();
        for (name, value) in &self.headers {
            canonical_headers.push_str(name);
            canonical_headers.push(':');
            canonical_headers.push_str(value);
            canonical_headers.push('\n');
        }
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.uri,
            self.query,
            canonical_headers,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

pub struct Signer<'a> {
    credentials: &'a Credentials,
    region: &'a str,
    service: &'a str,
}

impl<'a> Signer<'a> {
    pub fn new(credentials: &'a Credentials, region: &'a str, service: &'a str) -> Self {
        Self {
            credentials,
            region,
            service,
        }
    }

    /// Value for the `Authorization` header. `amz_date` is `YYYYMMDDTHHMMSSZ`
    /// and must equal the signed `x-amz-date` header.
    pub fn authorization(&self, amz_date: &str, request: &CanonicalRequest<'_>) -> String {
        format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id,
            self.scope(amz_date),
            request.signed_headers(),
            self.signature(amz_date, request)
        )
    }

    fn scope(&self, amz_date: &str) -> String {
        let day = amz_date.get(..8).unwrap_or(amz_date);
        format!("{day}/{}/{}/aws4_request", self.region, self.service)
    }

    fn signature(&self, amz_date: &str, request: &CanonicalRequest<'_>) -> String {
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{}\n{}",
            self.scope(amz_date),
            sha256_hex(request.render().as_bytes())
        );

        let day = amz_date.get(..8).unwrap_or(amz_date);
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac(secret.as_bytes(), day.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, self.service.as_bytes());
        let k_signing = hmac(&k_service, b"aws4_request");

        hex::encode(hmac(&k_signing, string_to_sign.as_bytes()))
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode everything except RFC 3986 unreserved characters.
/// `/` is kept as-is when `keep_slash` is set (object key paths).
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

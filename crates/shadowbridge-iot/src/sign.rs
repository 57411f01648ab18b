//! SigV4 request signing.
//!
//! Two variants are used by the bridge:
//! - [`websocket_url`] signs the streaming-transport connection as a
//!   presigned query string (service `iotdevicegateway`, fixed path `/mqtt`)
//! - [`sign_headers`] signs REST calls against the registry and shadow
//!   services via the `Authorization` header
//!
//! Both are pure with respect to the supplied clock, so the transport can
//! mint a fresh URL before every reconnection attempt. Signing cannot fail
//! on well-formed string input; bad credentials simply produce a URL or
//! header the remote side rejects at request time.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const GATEWAY_SERVICE: &str = "iotdevicegateway";

/// Signing service name for registry (control-plane) calls.
pub const CONTROL_PLANE_SERVICE: &str = "execute-api";
/// Signing service name for shadow (data-plane) calls.
pub const DATA_PLANE_SERVICE: &str = "iotdata";

/// Credentials used for request signing.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Headers produced for a signed REST request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Chain `AWS4<secret> -> date -> region -> service -> aws4_request`.
fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build the presigned websocket URL for the streaming transport.
///
/// The layout must match the remote verifier byte for byte: canonical query
/// string in fixed order, canonical request over `GET /mqtt` with the single
/// `host` header and an empty payload hash, then the standard string-to-sign
/// and key chain.
pub fn websocket_url(
    host: &str,
    region: &str,
    credentials: &SigningCredentials,
    now: DateTime<Utc>,
) -> String {
    let amz_date = amz_date(now);
    let date = &amz_date[..8];

    let credential = format!(
        "{}%2F{}%2F{}%2F{}%2Faws4_request",
        urlencoding::encode(&credentials.access_key),
        date,
        region,
        GATEWAY_SERVICE
    );
    let query = format!(
        "X-Amz-Algorithm={}&X-Amz-Credential={}&X-Amz-Date={}&X-Amz-SignedHeaders=host",
        ALGORITHM, credential, amz_date
    );

    let canonical_request = format!(
        "GET\n/mqtt\n{}\nhost:{}\n\nhost\n{}",
        query,
        host.to_lowercase(),
        sha256_hex(b"")
    );

    let string_to_sign = format!(
        "{}\n{}\n{}/{}/{}/aws4_request\n{}",
        ALGORITHM,
        amz_date,
        date,
        region,
        GATEWAY_SERVICE,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_key, date, region, GATEWAY_SERVICE);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!("wss://{}/mqtt?{}&X-Amz-Signature={}", host, query, signature)
}

/// Sign a REST request via the `Authorization` header.
///
/// Signed headers are fixed to `host;x-amz-date`; the caller must send
/// exactly those (reqwest fills `host` from the URL).
#[allow(clippy::too_many_arguments)]
pub fn sign_headers(
    method: &str,
    host: &str,
    path: &str,
    query: &str,
    service: &str,
    region: &str,
    credentials: &SigningCredentials,
    payload: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = amz_date(now);
    let date = &amz_date[..8];

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-date:{}\n\nhost;x-amz-date\n{}",
        method,
        path,
        query,
        host.to_lowercase(),
        amz_date,
        sha256_hex(payload)
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_key, date, region, service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders=host;x-amz-date, Signature={}",
        ALGORITHM, credentials.access_key, scope, signature
    );

    SignedHeaders {
        authorization,
        amz_date,
    }
}

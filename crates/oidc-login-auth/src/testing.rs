//! Token and key builders shared by unit tests.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::jwe::{self, JweHeader, PBES2_HS512_A256KW};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};

/// Raw bearer secret used across tests.
pub const BEARER_SECRET: &[u8] = b"JQ17C99A-DAF8-4E27-FBW4-GV23B043C993";

/// Key id of the shared RSA test key.
pub const RSA_KID: &str = "test-rsa-1";

pub struct TestRsaKey {
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

/// Lazily generated 2048-bit RSA key, shared by all tests in the process.
pub fn rsa_key() -> &'static TestRsaKey {
    static KEY: OnceLock<TestRsaKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = private.to_pkcs1_pem(LineEnding::LF).unwrap();
        TestRsaKey {
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
            n: URL_SAFE_NO_PAD.encode(private.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private.e().to_bytes_be()),
        }
    })
}

impl TestRsaKey {
    /// Public JWKS containing this key under [`RSA_KID`].
    pub fn jwks(&self) -> Value {
        json!({
            "keys": [{
                "kty": "RSA",
                "kid": RSA_KID,
                "use": "sig",
                "alg": "RS256",
                "n": self.n,
                "e": self.e
            }]
        })
    }
}

/// Base64url form of a raw secret, as configured on a provider.
pub fn encoded_secret(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// Current unix time in seconds.
pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Signs `claims` with HS256.
pub fn sign_hs256(claims: &Value, secret: &[u8]) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .unwrap()
}

/// Signs `claims` with the shared RSA key, setting `kid` when given.
pub fn sign_rs256(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, &rsa_key().encoding_key).unwrap()
}

/// Wraps a JWS in a PBES2-HS512+A256KW / A256CBC-HS512 JWE.
pub fn encrypt_pbes2(jws: &str, secret: &[u8], deflate: bool) -> String {
    let mut header = JweHeader::new();
    header.set_content_encryption("A256CBC-HS512");
    header.set_content_type("JWT");
    if deflate {
        header.set_compression("DEF");
    }
    let encrypter = PBES2_HS512_A256KW.encrypter_from_bytes(secret).unwrap();
    jwe::serialize_compact(jws.as_bytes(), &header, &encrypter).unwrap()
}

/// Rewrites the `p2c` of a PBES2 JWE header. The result no longer decrypts.
pub fn with_pbes2_count(jwe: &str, count: u64) -> String {
    let mut parts: Vec<String> = jwe.split('.').map(str::to_string).collect();
    let mut header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&parts[0]).unwrap()).unwrap();
    header["p2c"] = json!(count);
    parts[0] = URL_SAFE_NO_PAD.encode(header.to_string());
    parts.join(".")
}

/// Replaces one character in the middle of the given compact segment.
pub fn tamper_segment(token: &str, segment: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let target = &mut parts[segment];
    let mid = target.len() / 2;
    let original = target.as_bytes()[mid];
    let replacement = if original == b'A' { 'B' } else { 'A' };
    target.replace_range(mid..mid + 1, &replacement.to_string());
    parts.join(".")
}

/// SAM-style bearer payload for `client_id`, valid for two hours.
pub fn sam_claims(client_id: &str, sub: &str) -> Value {
    let now = now();
    json!({
        "iss": "https://accounts.login.idm.telekom.com",
        "sub": sub,
        "iat": now,
        "nbf": now,
        "exp": now + 7200,
        "urn:telekom.com:idm:at:version": "1.0",
        "urn:telekom.com:idm:at:attributes": [
            {"name": "client_id", "value": client_id},
            {"name": "displayname", "value": "nmc01@ver.sul.t-online.de"},
            {"name": "email", "value": "nmc01@ver.sul.t-online.de"},
            {"name": "anid", "value": "120049010000000010239960"},
            {"name": "d556", "value": "0"},
            {"name": "domt", "value": "ver.sul.t-online.de"},
            {"name": "f048", "value": "1"},
            {"name": "f049", "value": "1"},
            {"name": "f051", "value": "0"},
            {"name": "f460", "value": "0"},
            {"name": "f467", "value": "0"},
            {"name": "f468", "value": "0"},
            {"name": "f469", "value": "0"},
            {"name": "f471", "value": "0"},
            {"name": "f556", "value": "1"},
            {"name": "f734", "value": "0"},
            {"name": "mainEmail", "value": "nmc01@ver.sul.t-online.de"},
            {"name": "s556", "value": "0"},
            {"name": "usta", "value": "1"}
        ]
    })
}

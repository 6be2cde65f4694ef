//! Token verification.
//!
//! Verification happens in stages so the provider matcher can tell a token
//! signed for another provider apart from a broken one:
//!
//! 1. [`TokenVerifier::decrypt`] unwraps a compact JWE into the inner JWS.
//! 2. [`TokenVerifier::verify_signature`] checks the JWS with a shared secret
//!    or a provider key set.
//! 3. [`TokenVerifier::decode_claims`] decodes the payload (remapping SAM
//!    attribute lists).
//! 4. [`TokenVerifier::verify_claims`] applies timing, audience and nonce rules.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::jwe::{self, ECDH_ES_A256KW, JweDecrypter, PBES2_HS512_A256KW, RSA_OAEP_256};
use josekit::jwk::Jwk as JoseJwk;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::config::TokenConfig;

use super::claims::ClaimBag;
use super::error::TokenError;
use super::jwks::KeySet;
use super::provider::Provider;

/// The only accepted JWE content encryption.
pub const CONTENT_ENCRYPTION: &str = "A256CBC-HS512";

/// Compact serialization of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    /// Signed token, three segments.
    Jws,
    /// Encrypted token, five segments.
    Jwe,
}

impl TokenShape {
    /// Classifies a compact token by its segment count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for anything but three or five segments.
    pub fn detect(token: &str) -> Result<Self, TokenError> {
        match token.split('.').count() {
            3 => Ok(Self::Jws),
            5 => Ok(Self::Jwe),
            n => Err(TokenError::invalid(format!(
                "expected 3 or 5 compact segments, found {n}"
            ))),
        }
    }
}

/// Provider key material for bearer tokens.
#[derive(Clone, Default)]
pub struct BearerKeys {
    secret: Option<Vec<u8>>,
    private_jwk: Option<JoseJwk>,
}

impl BearerKeys {
    /// Collects the bearer secret and private decryption key of a provider.
    ///
    /// An unparseable decryption key is logged and ignored.
    #[must_use]
    pub fn for_provider(provider: &Provider) -> Self {
        let private_jwk = provider.bearer_decryption_key.as_deref().and_then(|json| {
            JoseJwk::from_bytes(json.as_bytes())
                .inspect_err(|e| {
                    tracing::warn!(
                        provider = %provider.identifier,
                        error = %e,
                        "Bearer decryption key is not a valid JWK"
                    );
                })
                .ok()
        });

        Self {
            secret: provider.bearer_key(),
            private_jwk,
        }
    }

    /// Key material consisting of a raw shared secret.
    #[must_use]
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Some(secret.into()),
            private_jwk: None,
        }
    }

    /// Adds a private JWK for asymmetric key unwrapping.
    #[must_use]
    pub fn with_private_jwk(mut self, jwk: JoseJwk) -> Self {
        self.private_jwk = Some(jwk);
        self
    }

    /// The raw shared secret, if configured.
    #[must_use]
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    /// Whether no key material is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secret.is_none() && self.private_jwk.is_none()
    }
}

impl fmt::Debug for BearerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerKeys")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("private_jwk", &self.private_jwk.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Key used to verify a JWS signature.
#[derive(Debug, Clone, Copy)]
pub enum VerificationKey<'a> {
    /// Shared HMAC secret (HS256/384/512 only).
    Secret(&'a [u8]),
    /// Provider JWKS (asymmetric algorithms).
    KeySet(&'a KeySet),
}

/// Stateless token verifier.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    leeway: i64,
    max_pbes2_count: u64,
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::from_config(&TokenConfig::default())
    }
}

impl TokenVerifier {
    /// Creates a verifier with the given clock-skew leeway.
    #[must_use]
    pub fn new(leeway: Duration) -> Self {
        Self {
            leeway: i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX),
            max_pbes2_count: TokenConfig::default().max_pbes2_count,
        }
    }

    /// Creates a verifier from token configuration.
    #[must_use]
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(config.leeway).with_max_pbes2_count(config.max_pbes2_count)
    }

    /// Sets the largest accepted PBES2 iteration count.
    #[must_use]
    pub fn with_max_pbes2_count(mut self, count: u64) -> Self {
        self.max_pbes2_count = count;
        self
    }

    /// Leeway in seconds.
    #[must_use]
    pub fn leeway(&self) -> i64 {
        self.leeway
    }

    /// Decrypts a compact JWE and returns the inner compact JWS.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` if the token is not a JWE, the header is malformed,
    ///   the algorithm or content encryption is unsupported, the PBES2
    ///   iteration count exceeds the limit, or the payload is not a JWS.
    /// - `Decryption` if no matching key is configured or unwrapping fails.
    pub fn decrypt(&self, raw: &str, keys: &BearerKeys) -> Result<String, TokenError> {
        if TokenShape::detect(raw)? != TokenShape::Jwe {
            return Err(TokenError::invalid("token is not a JWE"));
        }

        let header = protected_header(raw)?;
        let alg = header.get("alg").and_then(Value::as_str).unwrap_or_default();
        let enc = header.get("enc").and_then(Value::as_str).unwrap_or_default();

        if enc != CONTENT_ENCRYPTION {
            return Err(TokenError::invalid(format!(
                "unsupported content encryption '{enc}'"
            )));
        }

        if alg.starts_with("PBES2") {
            let count = header.get("p2c").and_then(Value::as_u64).unwrap_or_default();
            if count > self.max_pbes2_count {
                return Err(TokenError::invalid(format!(
                    "PBES2 iteration count {count} exceeds {}",
                    self.max_pbes2_count
                )));
            }
        }

        let decrypter = decrypter_for(alg, keys)?;
        let (payload, _) = jwe::deserialize_compact(raw, decrypter.as_ref())
            .map_err(|e| TokenError::Decryption(e.to_string()))?;

        let inner = String::from_utf8(payload)
            .map_err(|_| TokenError::invalid("decrypted payload is not UTF-8"))?;
        let inner = inner.trim();
        match TokenShape::detect(inner) {
            Ok(TokenShape::Jws) => Ok(inner.to_string()),
            _ => Err(TokenError::invalid("decrypted payload is not a JWS")),
        }
    }

    /// Verifies the signature of a compact JWS.
    ///
    /// Expiry, audience and other claims are not checked here.
    ///
    /// # Errors
    ///
    /// - `Signature` if no key verifies the signature or the algorithm does
    ///   not fit the key.
    /// - `InvalidToken` if the token cannot be parsed.
    pub fn verify_signature(&self, token: &str, key: VerificationKey<'_>) -> Result<(), TokenError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| TokenError::invalid(format!("malformed JWS header: {e}")))?;

        match key {
            VerificationKey::Secret(secret) => {
                if !matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
                    return Err(TokenError::signature(format!(
                        "algorithm {:?} cannot be verified with a shared secret",
                        header.alg
                    )));
                }
                verify_with(token, &header, &DecodingKey::from_secret(secret))
            }
            VerificationKey::KeySet(keys) => {
                let candidates = keys.candidates(&header);
                if candidates.is_empty() {
                    return Err(TokenError::signature(format!(
                        "no key for kid {:?} and algorithm {:?}",
                        header.kid, header.alg
                    )));
                }

                let mut last_error = None;
                for candidate in &candidates {
                    match verify_with(token, &header, candidate) {
                        Ok(()) => return Ok(()),
                        Err(e) if e.is_wrong_key() => last_error = Some(e),
                        Err(e) => return Err(e),
                    }
                }
                Err(last_error
                    .unwrap_or_else(|| TokenError::signature("no candidate key verified the token")))
            }
        }
    }

    /// Decodes the payload of a compact JWS without verifying it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the payload is not a base64url JSON object.
    pub fn decode_claims(&self, token: &str) -> Result<ClaimBag, TokenError> {
        let segment = token
            .split('.')
            .nth(1)
            .ok_or_else(|| TokenError::invalid("token has no payload segment"))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .map_err(|e| TokenError::invalid(format!("payload is not base64url: {e}")))?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(payload)) => Ok(ClaimBag::from_payload(payload)),
            Ok(_) => Err(TokenError::invalid("payload is not a JSON object")),
            Err(e) => Err(TokenError::invalid(format!("payload is not JSON: {e}"))),
        }
    }

    /// Validates timing, audience and nonce against the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_claims_at`].
    pub fn verify_claims(
        &self,
        claims: &ClaimBag,
        expected_audiences: &[&str],
        nonce: Option<&str>,
    ) -> Result<(), TokenError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.verify_claims_at(claims, expected_audiences, nonce, now)
    }

    /// Validates timing, audience and nonce at `now` (unix seconds).
    ///
    /// Absent `nbf`, `iat` or `exp` claims are not enforced. A nonce is only
    /// compared when one is expected and the token carries one.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` for `nbf` or `iat` in the future, or an expired token.
    /// - `AudienceMismatch` if no expected audience is in `aud`.
    /// - `NonceMismatch` if the nonce differs.
    pub fn verify_claims_at(
        &self,
        claims: &ClaimBag,
        expected_audiences: &[&str],
        nonce: Option<&str>,
        now: i64,
    ) -> Result<(), TokenError> {
        if let Some(nbf) = claims.numeric_date("nbf")
            && nbf > now.saturating_add(self.leeway)
        {
            return Err(TokenError::invalid("Cannot handle token prior to nbf"));
        }

        if let Some(iat) = claims.numeric_date("iat")
            && iat > now.saturating_add(self.leeway)
        {
            return Err(TokenError::invalid("Cannot handle token prior to iat"));
        }

        if let Some(exp) = claims.numeric_date("exp")
            && now.saturating_sub(self.leeway) >= exp
        {
            return Err(TokenError::invalid("Expired token"));
        }

        let audiences = claims.audiences();
        if !expected_audiences.iter().any(|aud| audiences.contains(aud)) {
            return Err(TokenError::AudienceMismatch {
                client_id: expected_audiences.join(","),
            });
        }

        if let (Some(expected), Some(actual)) = (nonce, claims.nonce())
            && expected != actual
        {
            return Err(TokenError::NonceMismatch);
        }

        Ok(())
    }
}

fn protected_header(raw: &str) -> Result<Map<String, Value>, TokenError> {
    let segment = raw.split('.').next().unwrap_or_default();
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| TokenError::invalid(format!("JWE header is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(header)) => Ok(header),
        _ => Err(TokenError::invalid("JWE header is not a JSON object")),
    }
}

fn decrypter_for(alg: &str, keys: &BearerKeys) -> Result<Box<dyn JweDecrypter>, TokenError> {
    let missing = || TokenError::Decryption(format!("no key configured for {alg}"));
    let failed = |e: josekit::JoseError| TokenError::Decryption(e.to_string());

    match alg {
        "PBES2-HS512+A256KW" => {
            let secret = keys.secret.as_deref().ok_or_else(missing)?;
            let decrypter = PBES2_HS512_A256KW.decrypter_from_bytes(secret).map_err(failed)?;
            Ok(Box::new(decrypter))
        }
        "RSA-OAEP-256" => {
            let jwk = keys.private_jwk.as_ref().ok_or_else(missing)?;
            let decrypter = RSA_OAEP_256.decrypter_from_jwk(jwk).map_err(failed)?;
            Ok(Box::new(decrypter))
        }
        "ECDH-ES+A256KW" => {
            let jwk = keys.private_jwk.as_ref().ok_or_else(missing)?;
            let decrypter = ECDH_ES_A256KW.decrypter_from_jwk(jwk).map_err(failed)?;
            Ok(Box::new(decrypter))
        }
        other => Err(TokenError::invalid(format!(
            "unsupported key management algorithm '{other}'"
        ))),
    }
}

fn verify_with(token: &str, header: &Header, key: &DecodingKey) -> Result<(), TokenError> {
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;

    jsonwebtoken::decode::<Value>(token, key, &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::Base64(_) => TokenError::signature(e.to_string()),
            _ => TokenError::invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        BEARER_SECRET, RSA_KID, encrypt_pbes2, now, rsa_key, sam_claims, sign_hs256, sign_rs256,
        tamper_segment, with_pbes2_count,
    };
    use josekit::jwe::JweHeader;
    use serde_json::json;

    const CLIENT_ID: &str = "10TVL0SAM30000004901NEXTMAGENTACLOUDTEST";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Duration::from_secs(60))
    }

    fn bag(value: Value) -> ClaimBag {
        match value {
            Value::Object(map) => ClaimBag::from_payload(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_token_shape() {
        assert_eq!(TokenShape::detect("a.b.c").unwrap(), TokenShape::Jws);
        assert_eq!(TokenShape::detect("a.b.c.d.e").unwrap(), TokenShape::Jwe);
        assert!(TokenShape::detect("a.b").is_err());
        assert!(TokenShape::detect("opaque").is_err());
    }

    #[test]
    fn test_hs256_signature() {
        let token = sign_hs256(&json!({"sub": "jgyros", "aud": CLIENT_ID}), BEARER_SECRET);
        let v = verifier();

        assert!(v.verify_signature(&token, VerificationKey::Secret(BEARER_SECRET)).is_ok());

        let err = v
            .verify_signature(&token, VerificationKey::Secret(b"another-secret-entirely"))
            .unwrap_err();
        assert!(err.is_wrong_key());
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let token = sign_hs256(&json!({"sub": "jgyros"}), BEARER_SECRET);
        let tampered = tamper_segment(&token, 2);

        let err = verifier()
            .verify_signature(&tampered, VerificationKey::Secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::Signature(_)));
    }

    #[test]
    fn test_secret_rejects_asymmetric_algorithm() {
        let token = sign_rs256(&json!({"sub": "jgyros"}), Some(RSA_KID));
        let err = verifier()
            .verify_signature(&token, VerificationKey::Secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::Signature(_)));
    }

    #[test]
    fn test_rs256_with_key_set() {
        let keys = KeySet::from_slice(rsa_key().jwks().to_string().as_bytes()).unwrap();
        let v = verifier();

        let with_kid = sign_rs256(&json!({"sub": "jgyros"}), Some(RSA_KID));
        assert!(v.verify_signature(&with_kid, VerificationKey::KeySet(&keys)).is_ok());

        let without_kid = sign_rs256(&json!({"sub": "jgyros"}), None);
        assert!(v.verify_signature(&without_kid, VerificationKey::KeySet(&keys)).is_ok());

        let unknown_kid = sign_rs256(&json!({"sub": "jgyros"}), Some("rotated-away"));
        let err = v
            .verify_signature(&unknown_kid, VerificationKey::KeySet(&keys))
            .unwrap_err();
        assert!(err.is_wrong_key());
    }

    #[test]
    fn test_tampered_rs256_is_rejected() {
        let keys = KeySet::from_slice(rsa_key().jwks().to_string().as_bytes()).unwrap();
        let token = sign_rs256(&json!({"sub": "jgyros", "aud": CLIENT_ID}), Some(RSA_KID));

        for segment in [1, 2] {
            let err = verifier()
                .verify_signature(&tamper_segment(&token, segment), VerificationKey::KeySet(&keys))
                .unwrap_err();
            assert!(matches!(err, TokenError::Signature(_)), "segment {segment}: {err}");
        }
    }

    #[test]
    fn test_malformed_jws_is_invalid() {
        let err = verifier()
            .verify_signature("not.a.jwt", VerificationKey::Secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[test]
    fn test_decrypt_pbes2() {
        let jws = sign_hs256(&sam_claims(CLIENT_ID, "120049010000000010239960"), BEARER_SECRET);
        let jwe = encrypt_pbes2(&jws, BEARER_SECRET, false);
        let keys = BearerKeys::from_secret(BEARER_SECRET);

        assert_eq!(verifier().decrypt(&jwe, &keys).unwrap(), jws);
    }

    #[test]
    fn test_decrypt_deflated_payload() {
        let jws = sign_hs256(&sam_claims(CLIENT_ID, "120049010000000010239960"), BEARER_SECRET);
        let jwe = encrypt_pbes2(&jws, BEARER_SECRET, true);
        let keys = BearerKeys::from_secret(BEARER_SECRET);

        assert_eq!(verifier().decrypt(&jwe, &keys).unwrap(), jws);
    }

    #[test]
    fn test_decrypt_with_wrong_secret() {
        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let jwe = encrypt_pbes2(&jws, BEARER_SECRET, false);
        let keys = BearerKeys::from_secret(b"some-other-provider-secret".to_vec());

        let err = verifier().decrypt(&jwe, &keys).unwrap_err();
        assert!(matches!(err, TokenError::Decryption(_)));
        assert!(err.is_wrong_key());
    }

    #[test]
    fn test_decrypt_tampered_ciphertext() {
        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let jwe = tamper_segment(&encrypt_pbes2(&jws, BEARER_SECRET, false), 3);
        let keys = BearerKeys::from_secret(BEARER_SECRET);

        assert!(matches!(
            verifier().decrypt(&jwe, &keys),
            Err(TokenError::Decryption(_))
        ));
    }

    #[test]
    fn test_decrypt_without_key_material() {
        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let jwe = encrypt_pbes2(&jws, BEARER_SECRET, false);

        assert!(matches!(
            verifier().decrypt(&jwe, &BearerKeys::default()),
            Err(TokenError::Decryption(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_other_content_encryption() {
        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let mut header = JweHeader::new();
        header.set_content_encryption("A128GCM");
        let encrypter = PBES2_HS512_A256KW.encrypter_from_bytes(BEARER_SECRET).unwrap();
        let jwe = jwe::serialize_compact(jws.as_bytes(), &header, &encrypter).unwrap();

        let err = verifier()
            .decrypt(&jwe, &BearerKeys::from_secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[test]
    fn test_decrypt_ecdh_es() {
        let private = JoseJwk::generate_ec_key(josekit::jwk::alg::ec::EcCurve::P256).unwrap();
        let public = private.to_public_key().unwrap();

        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let mut header = JweHeader::new();
        header.set_content_encryption(CONTENT_ENCRYPTION);
        let encrypter = ECDH_ES_A256KW.encrypter_from_jwk(&public).unwrap();
        let jwe = jwe::serialize_compact(jws.as_bytes(), &header, &encrypter).unwrap();

        let keys = BearerKeys::default().with_private_jwk(private);
        assert_eq!(verifier().decrypt(&jwe, &keys).unwrap(), jws);
    }

    #[test]
    fn test_decrypt_rsa_oaep_256() {
        let private = JoseJwk::generate_rsa_key(2048).unwrap();
        let public = private.to_public_key().unwrap();

        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let mut header = JweHeader::new();
        header.set_content_encryption(CONTENT_ENCRYPTION);
        let encrypter = RSA_OAEP_256.encrypter_from_jwk(&public).unwrap();
        let jwe = jwe::serialize_compact(jws.as_bytes(), &header, &encrypter).unwrap();

        let keys = BearerKeys::default().with_private_jwk(private);
        assert_eq!(verifier().decrypt(&jwe, &keys).unwrap(), jws);

        let other = JoseJwk::generate_rsa_key(2048).unwrap();
        let err = verifier()
            .decrypt(&jwe, &BearerKeys::default().with_private_jwk(other))
            .unwrap_err();
        assert!(err.is_wrong_key());
    }

    #[test]
    fn test_decrypt_rejects_excessive_pbes2_count() {
        let jws = sign_hs256(&json!({"sub": "x"}), BEARER_SECRET);
        let jwe = with_pbes2_count(&encrypt_pbes2(&jws, BEARER_SECRET, false), 1_000_000);

        let err = verifier()
            .decrypt(&jwe, &BearerKeys::from_secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
        assert!(err.to_string().contains("iteration count 1000000"));

        let untouched = encrypt_pbes2(&jws, BEARER_SECRET, false);
        let strict = verifier().with_max_pbes2_count(1);
        assert!(matches!(
            strict.decrypt(&untouched, &BearerKeys::from_secret(BEARER_SECRET)),
            Err(TokenError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_non_jws_payload() {
        let jwe = encrypt_pbes2("just some text", BEARER_SECRET, false);
        let err = verifier()
            .decrypt(&jwe, &BearerKeys::from_secret(BEARER_SECRET))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[test]
    fn test_decode_claims_remaps_sam() {
        let jws = sign_hs256(&sam_claims(CLIENT_ID, "120049010000000010239960"), BEARER_SECRET);
        let claims = verifier().decode_claims(&jws).unwrap();

        assert_eq!(claims.audiences(), vec![CLIENT_ID]);
        assert_eq!(
            claims.get_str("urn:telekom.com:displayname"),
            Some("nmc01@ver.sul.t-online.de")
        );
    }

    #[test]
    fn test_decode_claims_rejects_garbage() {
        assert!(verifier().decode_claims("a.!!!.c").is_err());
        assert!(verifier().decode_claims("a.WzEsMiwzXQ.c").is_err());
        assert!(verifier().decode_claims("single").is_err());
    }

    #[test]
    fn test_timing_boundaries() {
        let v = verifier();
        let now = 1_700_000_000;
        let check = |claims: Value| v.verify_claims_at(&bag(claims), &["A"], None, now);

        assert!(check(json!({"aud": "A", "nbf": now + 60})).is_ok());
        assert!(check(json!({"aud": "A", "nbf": now + 61})).is_err());

        assert!(check(json!({"aud": "A", "iat": now + 60})).is_ok());
        assert!(check(json!({"aud": "A", "iat": now + 61})).is_err());

        assert!(check(json!({"aud": "A", "exp": now - 59})).is_ok());
        assert!(check(json!({"aud": "A", "exp": now - 60})).is_err());

        assert!(check(json!({"aud": "A"})).is_ok());
    }

    #[test]
    fn test_expired_message() {
        let v = verifier();
        let err = v
            .verify_claims_at(&bag(json!({"aud": "A", "exp": 10})), &["A"], None, 1000)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid token: Expired token");
    }

    #[test]
    fn test_audience() {
        let v = verifier();
        let now = now();

        assert!(v.verify_claims_at(&bag(json!({"aud": "A"})), &["A"], None, now).is_ok());
        assert!(
            v.verify_claims_at(&bag(json!({"aud": ["X", "A"]})), &["A"], None, now)
                .is_ok()
        );
        assert!(matches!(
            v.verify_claims_at(&bag(json!({"aud": "B"})), &["A"], None, now),
            Err(TokenError::AudienceMismatch { .. })
        ));
        assert!(matches!(
            v.verify_claims_at(&bag(json!({"sub": "x"})), &["A"], None, now),
            Err(TokenError::AudienceMismatch { .. })
        ));
    }

    #[test]
    fn test_nonce() {
        let v = verifier();
        let now = now();
        let claims = bag(json!({"aud": "A", "nonce": "N1"}));

        assert!(v.verify_claims_at(&claims, &["A"], Some("N1"), now).is_ok());
        assert!(v.verify_claims_at(&claims, &["A"], None, now).is_ok());
        assert!(matches!(
            v.verify_claims_at(&claims, &["A"], Some("N2"), now),
            Err(TokenError::NonceMismatch)
        ));

        let without_nonce = bag(json!({"aud": "A"}));
        assert!(v.verify_claims_at(&without_nonce, &["A"], Some("N1"), now).is_ok());
    }

    #[test]
    fn test_timing_checked_before_audience() {
        let v = verifier();
        let err = v
            .verify_claims_at(&bag(json!({"aud": "B", "exp": 10})), &["A"], None, 1000)
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[test]
    fn test_bearer_keys_for_provider() {
        let provider = Provider::new(
            1,
            "Telekom",
            CLIENT_ID,
            url::Url::parse("https://idp.example/.well-known/openid-configuration").unwrap(),
        )
        .with_bearer_secret(crate::testing::encoded_secret(BEARER_SECRET))
        .with_bearer_decryption_key("{not a jwk");

        let keys = BearerKeys::for_provider(&provider);
        assert_eq!(keys.secret(), Some(BEARER_SECRET));
        assert!(keys.private_jwk.is_none());
        assert!(!format!("{keys:?}").contains("JQ17"));
    }
}

//! Verified claim bag.
//!
//! Claims are kept as a JSON object so provider-specific URN claims survive
//! untouched. Payloads in the SAM attribute-list format are flattened into the
//! same shape as plain OIDC tokens when they are decoded.

use serde::Serialize;
use serde_json::{Map, Value};

/// Claim carrying the SAM `{name, value}` attribute list.
pub const SAM_ATTRIBUTES_CLAIM: &str = "urn:telekom.com:idm:at:attributes";

/// Namespace prepended to remapped SAM attribute names.
pub const SAM_CLAIM_PREFIX: &str = "urn:telekom.com:";

const SAM_COPIED_CLAIMS: [&str; 5] = ["iss", "sub", "iat", "nbf", "exp"];

/// Claims of a token, string-keyed with JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClaimBag {
    claims: Map<String, Value>,
}

impl ClaimBag {
    /// Creates a bag from an already-normalized claim map.
    #[must_use]
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Builds a bag from a decoded token payload.
    ///
    /// A payload carrying [`SAM_ATTRIBUTES_CLAIM`] is remapped: `aud` becomes
    /// the value of the `client_id` entry, the standard subject and timing
    /// claims are copied, and every entry is exposed as
    /// `urn:telekom.com:{name}`. Other payload claims are dropped.
    #[must_use]
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        match payload.get(SAM_ATTRIBUTES_CLAIM) {
            Some(Value::Array(attributes)) => Self::from_sam(&payload, attributes),
            _ => Self { claims: payload },
        }
    }

    fn from_sam(payload: &Map<String, Value>, attributes: &[Value]) -> Self {
        let mut claims = Map::new();

        let audience: Vec<Value> = attributes
            .iter()
            .filter(|kv| kv.get("name").and_then(Value::as_str) == Some("client_id"))
            .filter_map(|kv| kv.get("value").cloned())
            .take(1)
            .collect();
        claims.insert("aud".to_string(), Value::Array(audience));

        for name in SAM_COPIED_CLAIMS {
            if let Some(value) = payload.get(name) {
                claims.insert(name.to_string(), value.clone());
            }
        }

        for kv in attributes {
            if let Some(name) = kv.get("name").and_then(Value::as_str) {
                let value = kv.get("value").cloned().unwrap_or(Value::Null);
                claims.insert(format!("{}{}", SAM_CLAIM_PREFIX, name), value);
            }
        }

        tracing::trace!(claims = claims.len(), "Remapped SAM attribute claims");
        Self { claims }
    }

    /// Returns a claim by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Returns a string claim by name.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Returns a numeric date claim in seconds. Fractional seconds are truncated.
    #[must_use]
    pub fn numeric_date(&self, name: &str) -> Option<i64> {
        let value = self.claims.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
    }

    /// Subject identifier.
    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Audience values; a scalar `aud` yields a single entry.
    #[must_use]
    pub fn audiences(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Nonce claim.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Returns the raw claim map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Adds claims from `other` that this bag does not carry yet.
    pub fn fill_missing(&mut self, other: Map<String, Value>) {
        for (name, value) in other {
            self.claims.entry(name).or_insert(value);
        }
    }
}

impl From<Map<String, Value>> for ClaimBag {
    fn from(claims: Map<String, Value>) -> Self {
        Self::new(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_fill_missing_keeps_existing_claims() {
        let mut bag = ClaimBag::new(object(json!({"sub": "jgyros", "name": "Jane"})));
        bag.fill_missing(object(json!({"name": "Other", "email": "jane@example.com"})));

        assert_eq!(bag.get_str("name"), Some("Jane"));
        assert_eq!(bag.get_str("email"), Some("jane@example.com"));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_plain_payload_is_kept() {
        let bag = ClaimBag::from_payload(object(json!({
            "sub": "jgyros",
            "aud": "CLIENT_A",
            "exp": 1700000000,
            "urn:example:custom": {"nested": true}
        })));

        assert_eq!(bag.sub(), Some("jgyros"));
        assert_eq!(bag.audiences(), vec!["CLIENT_A"]);
        assert_eq!(bag.numeric_date("exp"), Some(1700000000));
        assert_eq!(bag.get("urn:example:custom"), Some(&json!({"nested": true})));
    }

    #[test]
    fn test_sam_payload_is_remapped() {
        let bag = ClaimBag::from_payload(object(json!({
            "iss": "https://accounts.login.idm.telekom.com",
            "sub": "1200490100000000100XXXXX",
            "iat": 1600000000,
            "nbf": 1600000000,
            "exp": 1600007200,
            "scope": "spica",
            "urn:telekom.com:idm:at:attributes": [
                {"name": "client_id", "value": "10TVL0SAM30000004901NEXTMAGENTACLOUDTEST"},
                {"name": "displayname", "value": "nmc01@ver.sul.t-online.de"},
                {"name": "email", "value": "nmc01@ver.sul.t-online.de"},
                {"name": "anid", "value": "120049010000000010239960"}
            ]
        })));

        assert_eq!(
            bag.audiences(),
            vec!["10TVL0SAM30000004901NEXTMAGENTACLOUDTEST"]
        );
        assert_eq!(bag.sub(), Some("1200490100000000100XXXXX"));
        assert_eq!(bag.numeric_date("exp"), Some(1600007200));
        assert_eq!(
            bag.get_str("urn:telekom.com:displayname"),
            Some("nmc01@ver.sul.t-online.de")
        );
        assert_eq!(
            bag.get_str("urn:telekom.com:anid"),
            Some("120049010000000010239960")
        );
        assert!(bag.get("scope").is_none());
        assert!(bag.get(SAM_ATTRIBUTES_CLAIM).is_none());
    }

    #[test]
    fn test_sam_payload_without_client_id_has_empty_audience() {
        let bag = ClaimBag::from_payload(object(json!({
            "sub": "x",
            "urn:telekom.com:idm:at:attributes": [{"name": "email", "value": "a@b.c"}]
        })));

        assert!(bag.audiences().is_empty());
        assert_eq!(bag.get("aud"), Some(&json!([])));
    }

    #[test]
    fn test_numeric_date_accepts_floats() {
        let bag = ClaimBag::new(object(json!({"iat": 1600000000.75, "nbf": "soon"})));
        assert_eq!(bag.numeric_date("iat"), Some(1600000000));
        assert_eq!(bag.numeric_date("nbf"), None);
        assert_eq!(bag.numeric_date("exp"), None);
    }
}

//! Identity model and normalization of backend user payloads.
//!
//! The backend describes users with a `type` field (`ADMIN` / `USER`) while
//! clients work with a `role` (`ROLE_ADMIN` / `ROLE_USER`). Endpoints also
//! nest the user differently: auth responses carry `{token, user, email,
//! userType}`, profile endpoints return the bare user record.
//!
//! Normalization precedence:
//! 1. the primary candidate object, if present;
//! 2. otherwise a candidate synthesized from the body's `email` + `userType`;
//! 3. then `role` is derived from `type` only when `role` is absent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Backend field that must never be retained client-side.
const PASSWORD_HASH_FIELD: &str = "passwordHash";

/// Client-facing role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    #[serde(rename = "ROLE_USER")]
    User,
}

impl Role {
    /// Maps a backend user type: `ADMIN` is an admin, anything else a user.
    pub fn from_user_type(user_type: &str) -> Self {
        if user_type == "ADMIN" {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::User => "ROLE_USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ROLE_ADMIN" => Ok(Role::Admin),
            "ROLE_USER" => Ok(Role::User),
            _ => Err(format!("Unknown role: {value}")),
        }
    }
}

/// A user record in any shape the backend (or an older client) produced.
///
/// Scalar fields are read leniently: numbers and booleans become strings,
/// anything else reads as absent, so one odd field never discards the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIdentity {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remaining profile fields (`dob`, `address`, `userPackage`, ...).
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl RawIdentity {
    /// Parses a candidate from a JSON value. Only objects qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(error = %err, "user record could not be read");
                None
            }
        }
    }

    /// Builds a candidate from the flat `email` / `userType` fields of an
    /// auth response body.
    pub fn synthesize(body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(scalar_string);
        Self {
            email: field("email"),
            user_type: field("userType"),
            ..Self::default()
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_string))
}

/// Canonical identity used by the application and persisted under `user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    pub role: Role,
    /// Client-local display name; never sent to or sourced from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The local name when set, else the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// Reads a preserved profile field as a string.
    pub fn profile_str(&self, key: &str) -> Option<&str> {
        self.profile.get(key).and_then(Value::as_str)
    }

    /// Serializes for the `user` storage entry.
    ///
    /// # Errors
    /// Returns an error if the profile holds values JSON cannot encode.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Which rule produced the identity candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Primary,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub identity: Identity,
    pub source: IdentitySource,
}

/// Normalization cannot produce an identity without an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeError {
    pub source: IdentitySource,
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            IdentitySource::Primary => write!(f, "User record is missing an email"),
            IdentitySource::Synthesized => write!(f, "Response does not describe a user"),
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Reconciles a primary candidate and/or a raw response body into one
/// canonical [`Identity`].
///
/// An already-present `role` is never altered. Without `role` or `type`
/// the identity is a plain user.
///
/// # Errors
/// Returns [`NormalizeError`] when the selected candidate has no email.
pub fn normalize(
    primary: Option<RawIdentity>,
    body: Option<&Value>,
) -> Result<Normalized, NormalizeError> {
    let (raw, source) = match primary {
        Some(raw) => (raw, IdentitySource::Primary),
        None => (
            body.map(RawIdentity::synthesize).unwrap_or_default(),
            IdentitySource::Synthesized,
        ),
    };

    let RawIdentity {
        id,
        email,
        user_type,
        role,
        name,
        mut profile,
    } = raw;

    let email = email
        .filter(|email| !email.trim().is_empty())
        .ok_or(NormalizeError { source })?;

    let role = match role.as_deref() {
        Some(existing) => existing.parse().unwrap_or_else(|_| {
            tracing::warn!(role = existing, "unrecognized role, treating as ROLE_USER");
            Role::User
        }),
        None => user_type.as_deref().map_or(Role::User, Role::from_user_type),
    };

    profile.remove(PASSWORD_HASH_FIELD);

    Ok(Normalized {
        identity: Identity {
            id,
            email,
            user_type,
            role,
            name,
            profile,
        },
        source,
    })
}

/// Normalizes an auth response (`{token, user, email, userType}`): the nested
/// `user` is primary whenever it is present and not null; the flat fields
/// are only the fallback for a missing `user`.
///
/// # Errors
/// Returns [`NormalizeError`] when the selected candidate carries no email.
pub fn normalize_auth_body(body: &Value) -> Result<Normalized, NormalizeError> {
    let primary = match body.get("user") {
        None | Some(Value::Null) => None,
        Some(user) => Some(RawIdentity::from_value(user).unwrap_or_default()),
    };
    normalize(primary, Some(body))
}

/// Normalizes a bare user record (profile endpoints, persisted identity).
///
/// # Errors
/// Returns [`NormalizeError`] when the record carries no email.
pub fn normalize_user_record(record: &Value) -> Result<Normalized, NormalizeError> {
    normalize(RawIdentity::from_value(record), None)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_role_derived_from_type() {
        for (user_type, expected) in [
            ("ADMIN", Role::Admin),
            ("USER", Role::User),
            ("admin", Role::User),
            ("", Role::User),
        ] {
            let record = json!({"email": "a@b.com", "type": user_type});
            let identity = normalize_user_record(&record).unwrap().identity;
            assert_eq!(identity.role, expected, "type {user_type:?}");
        }
    }

    #[test]
    fn test_present_role_is_never_overwritten() {
        let record = json!({"email": "a@b.com", "type": "ADMIN", "role": "ROLE_USER"});
        let identity = normalize_user_record(&record).unwrap().identity;
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.user_type.as_deref(), Some("ADMIN"));

        let record = json!({"email": "a@b.com", "type": "USER", "role": "ROLE_ADMIN"});
        assert!(normalize_user_record(&record).unwrap().identity.is_admin());
    }

    #[test]
    fn test_missing_type_and_role_defaults_to_user() {
        let identity = normalize_user_record(&json!({"email": "a@b.com"}))
            .unwrap()
            .identity;
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.user_type, None);
    }

    #[test]
    fn test_synthesized_from_flat_fields() {
        let body = json!({"token": "T", "email": "x@y.com", "userType": "ADMIN"});
        let normalized = normalize_auth_body(&body).unwrap();

        assert_eq!(normalized.source, IdentitySource::Synthesized);
        assert_eq!(
            serde_json::to_value(&normalized.identity).unwrap(),
            json!({"email": "x@y.com", "type": "ADMIN", "role": "ROLE_ADMIN"})
        );
    }

    #[test]
    fn test_nested_user_is_preferred_over_flat_fields() {
        let body = json!({
            "token": "T",
            "email": "flat@y.com",
            "userType": "ADMIN",
            "user": {"id": "u1", "email": "nested@y.com", "type": "USER"}
        });
        let normalized = normalize_auth_body(&body).unwrap();

        assert_eq!(normalized.source, IdentitySource::Primary);
        assert_eq!(normalized.identity.email, "nested@y.com");
        assert_eq!(normalized.identity.role, Role::User);
        assert_eq!(normalized.identity.id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_null_user_falls_back_to_flat_fields() {
        let body = json!({"token": "T", "user": null, "email": "x@y.com", "userType": "USER"});
        let normalized = normalize_auth_body(&body).unwrap();
        assert_eq!(normalized.source, IdentitySource::Synthesized);
        assert_eq!(normalized.identity.email, "x@y.com");
    }

    #[test]
    fn test_profile_fields_preserved_and_password_hash_dropped() {
        let record = json!({
            "email": "a@b.com",
            "type": "USER",
            "address": "1 Camp Rd",
            "userPackage": {"packageType": "FULL"},
            "passwordHash": null
        });
        let identity = normalize_user_record(&record).unwrap().identity;

        assert_eq!(identity.profile_str("address"), Some("1 Camp Rd"));
        assert_eq!(identity.profile["userPackage"]["packageType"], "FULL");
        assert!(!identity.profile.contains_key("passwordHash"));
    }

    #[test]
    fn test_missing_email_is_rejected() {
        let err = normalize_auth_body(&json!({"token": "T"})).unwrap_err();
        assert_eq!(err.source, IdentitySource::Synthesized);

        let err = normalize_user_record(&json!({"type": "ADMIN"})).unwrap_err();
        assert_eq!(err.source, IdentitySource::Primary);
    }

    #[test]
    fn test_numeric_id_keeps_record_primary() {
        let record = json!({"id": 7, "email": "a@b.com", "type": "ADMIN"});
        let normalized = normalize_user_record(&record).unwrap();

        assert_eq!(normalized.source, IdentitySource::Primary);
        assert_eq!(normalized.identity.id.as_deref(), Some("7"));
        assert!(normalized.identity.is_admin());
    }

    #[test]
    fn test_non_string_role_falls_back_to_type() {
        let record = json!({"email": "a@b.com", "type": "ADMIN", "role": {"name": "x"}});
        assert!(normalize_user_record(&record).unwrap().identity.is_admin());
    }

    #[test]
    fn test_nested_user_with_odd_fields_is_not_replaced_by_flat_fields() {
        let body = json!({
            "token": "T",
            "email": "flat@y.com",
            "userType": "ADMIN",
            "user": {"id": 42, "email": "nested@y.com", "type": "USER", "enabled": true}
        });
        let normalized = normalize_auth_body(&body).unwrap();

        assert_eq!(normalized.source, IdentitySource::Primary);
        assert_eq!(normalized.identity.email, "nested@y.com");
        assert_eq!(normalized.identity.role, Role::User);
        assert_eq!(normalized.identity.profile["enabled"], true);
    }

    #[test]
    fn test_malformed_nested_user_is_rejected() {
        let body = json!({"token": "T", "email": "x@y.com", "user": "x@y.com"});
        let err = normalize_auth_body(&body).unwrap_err();
        assert_eq!(err.source, IdentitySource::Primary);
    }

    #[test]
    fn test_unknown_role_string_becomes_user() {
        let record = json!({"email": "a@b.com", "role": "SUPERUSER", "type": "ADMIN"});
        let identity = normalize_user_record(&record).unwrap().identity;
        assert_eq!(identity.role, Role::User);
    }

    #[test]
    fn test_persisted_identity_renormalizes_unchanged() {
        let record = json!({"email": "a@b.com", "type": "ADMIN", "dob": "1990-04-01"});
        let mut identity = normalize_user_record(&record).unwrap().identity;
        identity.name = Some("Ada".to_string());

        let stored: Value = serde_json::from_str(&identity.to_json().unwrap()).unwrap();
        let restored = normalize_user_record(&stored).unwrap().identity;
        assert_eq!(restored, identity);
        assert_eq!(restored.display_name(), "Ada");
    }
}

//! Auth endpoints of the Kheyma backend.
//!
//! Thin wrappers over [`RequestGateway`]; none of them touch session state.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::gateway::{GatewayError, RequestGateway};

const REGISTER_PATH: &str = "/api/auth/register";
const LOGIN_PATH: &str = "/api/auth/login";
const ME_PATH: &str = "/api/auth/me";
const FORGOT_PASSWORD_PATH: &str = "/api/auth/forgot-password";
const RESET_PASSWORD_PATH: &str = "/api/auth/reset-password";

/// Email/password pair sent to login and register.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Subscription tier stored on the backend user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageType {
    Basic,
    Advanced,
    Full,
}

impl std::str::FromStr for PackageType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASIC" => Ok(Self::Basic),
            "ADVANCED" => Ok(Self::Advanced),
            "FULL" => Ok(Self::Full),
            other => Err(format!(
                "Unknown package type: {other} (expected BASIC, ADVANCED or FULL)"
            )),
        }
    }
}

/// Partial profile mutation; absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Date of birth, `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_type: Option<PackageType>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.dob.is_none() && self.address.is_none() && self.package_type.is_none()
    }
}

#[derive(Clone)]
pub struct AuthApi {
    gateway: RequestGateway,
}

impl AuthApi {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// `POST /api/auth/register` → `{token, user, email, userType}`.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn register(&self, credentials: &Credentials<'_>) -> Result<Value, GatewayError> {
        self.gateway.post(REGISTER_PATH, credentials).await
    }

    /// `POST /api/auth/login` → `{token, user, email, userType}`.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn login(&self, credentials: &Credentials<'_>) -> Result<Value, GatewayError> {
        self.gateway.post(LOGIN_PATH, credentials).await
    }

    /// `GET /api/auth/me` → user record.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn get_me(&self) -> Result<Value, GatewayError> {
        self.gateway.get(ME_PATH).await
    }

    /// `PUT /api/auth/me` → updated user record.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn update_me(&self, update: &ProfileUpdate) -> Result<Value, GatewayError> {
        self.gateway.put(ME_PATH, update).await
    }

    /// `POST /api/auth/forgot-password`.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn forgot_password(&self, email: &str) -> Result<Value, GatewayError> {
        self.gateway
            .post(FORGOT_PASSWORD_PATH, &json!({ "email": email }))
            .await
    }

    /// `POST /api/auth/reset-password`.
    ///
    /// # Errors
    /// Propagates the gateway error.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<Value, GatewayError> {
        self.gateway
            .post(
                RESET_PASSWORD_PATH,
                &json!({ "token": token, "password": password }),
            )
            .await
    }
}

//! Session store: owns the identity, the credential and the loading flag.
//!
//! The store is the only writer of the durable `user` entry. Lifecycle
//! operations take `&mut self`, so two of them can never interleave on the
//! same store. Failures are returned as [`SessionError`] values and leave
//! both the snapshot and durable storage at their pre-call values.

use std::sync::Arc;

use serde_json::Value;

use crate::api::{AuthApi, Credentials, ProfileUpdate};
use crate::gateway::{GatewayError, RequestGateway};
use crate::identity::{self, Identity};
use crate::storage::{SessionStorage, StoredRecord, USER_KEY, mask_token};

mod state;

pub use state::{SessionError, SessionSnapshot, SessionState};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const UPDATE_FAILED: &str = "Update failed";

pub struct SessionStore {
    api: AuthApi,
    storage: Arc<dyn SessionStorage>,
    snapshot: SessionSnapshot,
    state: SessionState,
}

impl SessionStore {
    /// Creates an uninitialized store sharing the gateway's storage.
    pub fn new(gateway: RequestGateway) -> Self {
        let storage = Arc::clone(gateway.storage());
        Self {
            api: AuthApi::new(gateway),
            storage,
            snapshot: SessionSnapshot::empty(),
            state: SessionState::Uninitialized,
        }
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.snapshot.identity.as_ref()
    }

    pub fn credential(&self) -> Option<&str> {
        self.snapshot.credential.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.loading
    }

    /// The auth endpoints, for calls that do not change session state.
    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    /// Restores the persisted session and re-validates it against the backend.
    ///
    /// Intended to run once per process. Never fails: any validation error
    /// (rejected, revoked or unreachable) ends in `Anonymous`.
    pub async fn initialize(&mut self) {
        self.state = SessionState::Initializing;

        let end_state = match self.restore() {
            None => {
                self.clear_memory();
                SessionState::Anonymous
            }
            Some((token, stored_identity)) => {
                tracing::debug!(token = %mask_token(&token), "restored stored session");
                self.snapshot.credential = Some(token);
                self.snapshot.identity = Some(stored_identity);
                self.state = SessionState::Authenticated;

                match self.validate().await {
                    Ok(identity) => {
                        self.persist_identity(&identity);
                        self.snapshot.identity = Some(identity);
                        SessionState::Authenticated
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "stored session rejected, clearing");
                        self.clear_storage();
                        self.clear_memory();
                        SessionState::Anonymous
                    }
                }
            }
        };

        self.state = end_state;
        self.snapshot.loading = false;
    }

    /// Logs in and commits the returned credential and identity.
    ///
    /// # Errors
    /// Returns a [`SessionError`] (fallback "Login failed"); state is unchanged.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), SessionError> {
        let result = self.authenticate(email, password, None, false).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "login failed");
        }
        result
    }

    /// Registers an account. `name` is kept client-side only.
    ///
    /// # Errors
    /// Returns a [`SessionError`] (fallback "Registration failed"); state is unchanged.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<(), SessionError> {
        let result = self.authenticate(email, password, name, true).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "registration failed");
        }
        result
    }

    /// Clears the session in memory and in storage. Cannot fail.
    pub fn logout(&mut self) {
        self.clear_storage();
        self.clear_memory();
        self.state = SessionState::Anonymous;
    }

    /// Loop-back to `Anonymous` after the gateway reported an invalidation.
    pub fn invalidate(&mut self) {
        tracing::info!(state = %self.state, "session invalidated");
        self.logout();
    }

    /// Sends a profile mutation and replaces the identity with the result.
    /// The credential is untouched.
    ///
    /// # Errors
    /// Returns a [`SessionError`] (fallback "Update failed"); the identity is unchanged.
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<(), SessionError> {
        let result = self.apply_profile_update(update).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "profile update failed");
        }
        result
    }

    async fn authenticate(
        &mut self,
        email: &str,
        password: &str,
        name: Option<&str>,
        register: bool,
    ) -> Result<(), SessionError> {
        let fallback = if register {
            REGISTRATION_FAILED
        } else {
            LOGIN_FAILED
        };
        let credentials = Credentials { email, password };

        let response = if register {
            self.api.register(&credentials).await
        } else {
            self.api.login(&credentials).await
        };
        let body = response.map_err(|err| SessionError::from_gateway(&err, fallback))?;

        let (token, mut identity) =
            parse_auth_response(&body).map_err(|err| SessionError::from_gateway(&err, fallback))?;

        if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
            identity.name = Some(name.to_string());
        }

        self.commit(token, identity, fallback)
    }

    async fn apply_profile_update(&mut self, update: &ProfileUpdate) -> Result<(), SessionError> {
        let body = self
            .api
            .update_me(update)
            .await
            .map_err(|err| SessionError::from_gateway(&err, UPDATE_FAILED))?;

        let mut identity = identity::normalize_user_record(&body)
            .map_err(|err| SessionError::new(format!("{UPDATE_FAILED}: {err}")))?
            .identity;
        self.carry_local_name(&mut identity);

        let user_json = identity
            .to_json()
            .map_err(|err| SessionError::new(format!("{UPDATE_FAILED}: {err}")))?;
        if let Err(err) = self.storage.set(USER_KEY, &user_json) {
            tracing::error!(error = %err, "failed to persist identity");
            return Err(SessionError::new(format!(
                "{UPDATE_FAILED}: could not save profile"
            )));
        }

        self.snapshot.identity = Some(identity);
        Ok(())
    }

    /// Fetches the current user for the stored credential.
    async fn validate(&self) -> Result<Identity, GatewayError> {
        let body = self.api.get_me().await?;
        let mut identity = identity::normalize_user_record(&body)
            .map_err(|err| GatewayError::parse(err.to_string()))?
            .identity;
        self.carry_local_name(&mut identity);
        Ok(identity)
    }

    /// Reads the durable record. Both entries must be present and the
    /// identity parseable; anything else is cleared and treated as absent.
    fn restore(&self) -> Option<(String, Identity)> {
        let record = match self.storage.load_record() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored session, discarding");
                self.clear_storage();
                return None;
            }
        };

        let StoredRecord { token, user } = record;
        let token = token.filter(|token| !token.is_empty());
        let user = user.filter(|user| !user.is_empty());

        match (token, user) {
            (None, None) => None,
            (Some(token), Some(user)) => {
                let parsed = serde_json::from_str::<Value>(&user)
                    .ok()
                    .and_then(|value| identity::normalize_user_record(&value).ok());
                if let Some(normalized) = parsed {
                    Some((token, normalized.identity))
                } else {
                    tracing::warn!("stored identity is unreadable, discarding session");
                    self.clear_storage();
                    None
                }
            }
            _ => {
                tracing::warn!("stored session is incomplete, discarding");
                self.clear_storage();
                None
            }
        }
    }

    /// Persists then publishes a new session; on a storage failure the
    /// previous record is written back and the snapshot is left alone.
    fn commit(
        &mut self,
        token: String,
        identity: Identity,
        fallback: &str,
    ) -> Result<(), SessionError> {
        let user_json = identity
            .to_json()
            .map_err(|err| SessionError::new(format!("{fallback}: {err}")))?;

        if let Err(err) = self.storage.save_record(&token, &user_json) {
            tracing::error!(error = %err, "failed to persist session");
            self.rewrite_persisted();
            return Err(SessionError::new(format!(
                "{fallback}: could not save session"
            )));
        }

        self.snapshot.credential = Some(token);
        self.snapshot.identity = Some(identity);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    fn persist_identity(&self, identity: &Identity) {
        let result = identity
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(USER_KEY, &json));
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to refresh stored identity");
        }
    }

    /// Writes the in-memory snapshot back to storage.
    fn rewrite_persisted(&self) {
        let restored = match (&self.snapshot.credential, &self.snapshot.identity) {
            (Some(token), Some(identity)) => identity
                .to_json()
                .map_err(anyhow::Error::from)
                .and_then(|json| self.storage.save_record(token, &json)),
            _ => self.storage.clear_session(),
        };
        if let Err(err) = restored {
            tracing::warn!(error = %err, "failed to restore stored session");
        }
    }

    /// The backend never returns `name`; keep the local one.
    fn carry_local_name(&self, identity: &mut Identity) {
        if identity.name.is_none() {
            identity.name = self
                .snapshot
                .identity
                .as_ref()
                .and_then(|current| current.name.clone());
        }
    }

    fn clear_storage(&self) {
        if let Err(err) = self.storage.clear_session() {
            tracing::warn!(error = %err, "failed to clear stored session");
        }
    }

    fn clear_memory(&mut self) {
        self.snapshot.credential = None;
        self.snapshot.identity = None;
    }
}

/// Extracts `{token, user}` from a login/register response.
fn parse_auth_response(body: &Value) -> Result<(String, Identity), GatewayError> {
    let token = body
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| GatewayError::parse("Response did not include a token"))?;

    let identity = identity::normalize_auth_body(body)
        .map_err(|err| GatewayError::parse(err.to_string()))?
        .identity;

    Ok((token.to_string(), identity))
}

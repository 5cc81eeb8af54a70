use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{HttpClient, Transport};
use crate::error::{Error, Result, Stage};
use crate::store::{Credential, CredentialStore, is_fresh};

const ALIVE_ENDPOINT: &str = "isalive";
const TOKEN_ENDPOINT: &str = "token";

#[derive(Debug, serde::Deserialize)]
struct TokenReply {
    #[serde(default)]
    result: Option<String>,
}

/// Turns the long-lived refresh token into a data access token and keeps the
/// client's bearer pointed at it.
#[derive(Debug)]
pub struct Authenticator<S> {
    store: S,
    refresh_token: String,
}

impl<S: CredentialStore> Authenticator<S> {
    pub fn new(store: S, refresh_token: impl Into<String>) -> Self {
        Self {
            store,
            refresh_token: refresh_token.into().trim().to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn ensure_access_token<T: Transport>(&mut self, client: &mut HttpClient<T>) -> Result<()> {
        self.ensure_access_token_at(client, Utc::now())
    }

    /// Installs a valid access token on `client`, asking the provider for a new
    /// one only when the cached token is missing or older than the TTL.
    pub fn ensure_access_token_at<T: Transport>(
        &mut self,
        client: &mut HttpClient<T>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(credential) = self.store.load().map_err(|e| e.in_stage(Stage::Auth))? {
            if is_fresh(&credential, now) {
                info!(issued_at = %credential.issued_at, "reusing cached data access token");
                client.set_bearer(credential.access_token);
                return Ok(());
            }
            debug!(issued_at = %credential.issued_at, "cached data access token expired");
        }

        let credential = self
            .exchange(client, now)
            .map_err(|e| e.in_stage(Stage::Auth))?;
        self.store
            .save(&credential)
            .map_err(|e| e.in_stage(Stage::Auth))?;
        client.set_bearer(credential.access_token);
        Ok(())
    }

    fn exchange<T: Transport>(
        &self,
        client: &mut HttpClient<T>,
        now: DateTime<Utc>,
    ) -> Result<Credential> {
        info!("checking API status");
        let alive: Value = client.get(ALIVE_ENDPOINT).map_err(|e| Error::AuthenticationFailed {
            message: "liveness probe failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        if alive != Value::Bool(true) {
            return Err(Error::AuthenticationFailed {
                message: format!("API reports that it is down (isalive returned {alive})"),
                source: None,
            });
        }

        info!("requesting data access token");
        client.set_bearer(self.refresh_token.as_str());
        let reply = client.get::<TokenReply>(TOKEN_ENDPOINT);
        // Never leave the refresh token installed once the exchange is over.
        client.clear_bearer();

        let reply = reply.map_err(|e| Error::AuthenticationFailed {
            message: "unable to get data access token".to_string(),
            source: Some(Box::new(e)),
        })?;
        match reply.result {
            Some(token) if !token.trim().is_empty() => Ok(Credential::new(token.trim(), now)),
            _ => Err(Error::AuthenticationFailed {
                message: "token endpoint returned no data access token".to_string(),
                source: None,
            }),
        }
    }
}

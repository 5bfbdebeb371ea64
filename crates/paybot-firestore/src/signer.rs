//! Service-account assertion signing and token exchange.
//!
//! The runtime this client targets cannot load the native driver or its auth
//! stack, so token minting is done by hand: build the JWT-bearer assertion,
//! sign it with the service account's RSA key, and trade it for a short-lived
//! bearer token at the OAuth2 endpoint.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::credentials::ServiceAccountKey;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_token_exchange;

/// OAuth scope for Firestore/Datastore access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// OAuth scope for the Realtime Database, requested alongside datastore.
pub const REALTIME_DB_SCOPE: &str = "https://www.googleapis.com/auth/firebase.database";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion validity window, per the token endpoint's maximum.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// A freshly exchanged bearer token and its advertised lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in_secs: u64,
}

/// Source of bearer tokens. The production implementation signs and
/// exchanges service-account assertions; tests substitute a fixed token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> FirestoreResult<AccessToken>;
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    scope: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Signs assertions with a service-account RSA key and exchanges them for
/// bearer tokens.
pub struct ServiceAccountSigner {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: Client,
}

impl ServiceAccountSigner {
    /// Import the private key and build a signer. A key that does not parse
    /// fails here, not on the first request.
    pub fn new(key: ServiceAccountKey, http: Client) -> FirestoreResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| FirestoreError::key_format(format!("cannot import RSA key: {}", e)))?;
        Ok(Self {
            key,
            encoding_key,
            http,
        })
    }

    /// Build and sign the JWT-bearer assertion: RS256 over the base64url
    /// header and claims, one hour of validity, both required scopes.
    pub fn sign_assertion(&self) -> FirestoreResult<String> {
        let iat = unix_now();
        let claims = Claims {
            iss: &self.key.client_email,
            sub: &self.key.client_email,
            aud: &self.key.token_uri,
            scope: format!("{} {}", DATASTORE_SCOPE, REALTIME_DB_SCOPE),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| FirestoreError::auth(format!("failed to sign assertion: {}", e)))
    }

    async fn exchange(&self, assertion: &str) -> FirestoreResult<AccessToken> {
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)];

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                record_token_exchange("transport_error");
                FirestoreError::transient_auth(format!("token exchange unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenErrorBody>(&body)
                .ok()
                .map(|e| {
                    if e.error_description.is_empty() {
                        e.error
                    } else {
                        e.error_description
                    }
                })
                .filter(|d| !d.is_empty())
                .unwrap_or(body);
            record_token_exchange("rejected");
            return Err(FirestoreError::auth(format!(
                "token exchange rejected (status {}): {}",
                status.as_u16(),
                detail
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            record_token_exchange("malformed_response");
            FirestoreError::transient_auth(format!("malformed token response: {}", e))
        })?;

        record_token_exchange("ok");
        Ok(AccessToken {
            token: token.access_token,
            expires_in_secs: token.expires_in,
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountSigner {
    async fn fetch_token(&self) -> FirestoreResult<AccessToken> {
        let assertion = self.sign_assertion()?;
        self.exchange(&assertion).await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

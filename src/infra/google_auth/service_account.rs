// =============================================================================
// GOOGLE SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Exchanges a signed JWT for an OAuth2 access token (the "JWT bearer" grant),
// which is how a service account talks to Google APIs without a user.
//
// **Setup:**
// 1. Create a service account in Google Cloud Console and enable the Drive API
// 2. Create a JSON key for it
// 3. Either set `DRIVE_FOLDER_ID` to a folder shared with the service account
//    email (looks like: name@project.iam.gserviceaccount.com), or set
//    `DRIVE_FOLDER_NAME` and let the run find or create the folder in the
//    service account's own Drive. A folder shared with the account by a user
//    is only reachable by id; lookups by name only see folders the account
//    created itself.
// 4. Put the key in `GOOGLE_SERVICE_ACCOUNT_KEY`, either the JSON content or a
//    path to the file

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::config::ServiceAccountSource;
use crate::core::sync::{DriveError, FolderTarget};

/// Only files this app creates or opens are visible to it.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Full Drive access, needed to see a folder someone else shared with the account.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Narrowest scope that can reach the destination.
pub fn scope_for(target: &FolderTarget) -> &'static str {
    match target {
        FolderTarget::Id(_) => DRIVE_SCOPE,
        FolderTarget::Name(_) => DRIVE_FILE_SCOPE,
    }
}

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    /// The service account email (used as issuer in JWT).
    client_email: String,

    /// The private key in PEM format.
    private_key: String,

    /// The token URI (where to exchange JWT for access token).
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    /// Max 1 hour after `iat`.
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Authenticator that handles OAuth2 with service account credentials.
pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    scope: String,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Creates a new authenticator from JSON key content.
    pub fn from_json(json: &str, scope: &str) -> Result<Self, DriveError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json)
            .map_err(|e| DriveError::Auth(format!("invalid service account key: {}", e)))?;

        Ok(Self {
            credentials,
            scope: scope.to_string(),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn from_source(
        source: &ServiceAccountSource,
        scope: &str,
    ) -> Result<Self, DriveError> {
        match source {
            ServiceAccountSource::Inline(json) => Self::from_json(json, scope),
            ServiceAccountSource::File(path) => {
                let content = tokio::fs::read_to_string(path).await?;
                Self::from_json(&content, scope)
            }
        }
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String, DriveError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = self.fetch_new_token().await?;
        let token = fresh.access_token.clone();

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(CachedToken {
                token: fresh.access_token,
                expires_at: SystemTime::now() + Duration::from_secs(fresh.expires_in),
            });
        }

        Ok(token)
    }

    fn signed_assertion(&self, now: u64) -> Result<String, DriveError> {
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| DriveError::Auth(format!("invalid private key: {}", e)))?;
        encode(&header, &claims, &key).map_err(|e| DriveError::Auth(e.to_string()))
    }

    async fn fetch_new_token(&self) -> Result<TokenResponse, DriveError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::Auth(e.to_string()))?
            .as_secs();
        let jwt = self.signed_assertion(now)?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DriveError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!(
                "Token exchange failed ({}): {}",
                status, text
            )));
        }

        tracing::debug!("Fetched new Drive access token");
        response
            .json()
            .await
            .map_err(|e| DriveError::Auth(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_uri_defaults() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email":"bot@proj.iam.gserviceaccount.com","private_key":"pem"}"#,
            DRIVE_FILE_SCOPE,
        )
        .unwrap();

        assert_eq!(auth.client_email(), "bot@proj.iam.gserviceaccount.com");
        assert_eq!(auth.credentials.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = ServiceAccountAuth::from_json(r#"{"type":"service_account"}"#, DRIVE_FILE_SCOPE)
            .err()
            .unwrap();
        assert!(matches!(err, DriveError::Auth(_)));
    }

    #[test]
    fn test_bad_private_key_rejected() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email":"a@b","private_key":"not a pem","token_uri":"https://x"}"#,
            DRIVE_FILE_SCOPE,
        )
        .unwrap();

        assert!(matches!(
            auth.signed_assertion(1_700_000_000),
            Err(DriveError::Auth(_))
        ));
    }

    #[test]
    fn test_shared_folder_id_gets_full_drive_scope() {
        assert_eq!(
            scope_for(&FolderTarget::Id("1AbCdEf".to_string())),
            "https://www.googleapis.com/auth/drive"
        );
        assert_eq!(
            scope_for(&FolderTarget::Name("CodmonFiles".to_string())),
            DRIVE_FILE_SCOPE
        );
    }

    #[test]
    fn test_scope_ends_up_in_assertion_claims() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email":"a@b","private_key":"pem"}"#,
            scope_for(&FolderTarget::Id("shared".to_string())),
        )
        .unwrap();
        assert_eq!(auth.scope, DRIVE_SCOPE);
    }

    #[tokio::test]
    async fn test_key_read_from_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"client_email":"file@proj.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();

        let source = ServiceAccountSource::File(tmp.path().to_path_buf());
        let auth = ServiceAccountAuth::from_source(&source, DRIVE_FILE_SCOPE)
            .await
            .unwrap();
        assert_eq!(auth.client_email(), "file@proj.iam.gserviceaccount.com");
    }
}

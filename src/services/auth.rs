use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

/// A bearer token for the photo library, possibly refreshable.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now(),
            None => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no usable credentials: {0}")]
    Unauthenticated(String),
    #[error("failed to read {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("token endpoint error ({status}): {detail}")]
    TokenEndpoint {
        status: reqwest::StatusCode,
        detail: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed credential file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Yields a valid credential or an unauthenticated condition that needs
/// out-of-band remediation. Never retried automatically.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, AuthError>;
    async fn refresh_if_needed(&self, credential: Credential) -> Result<Credential, AuthError>;
}

/// Loads a stored token and refreshes it when expired, or reports how to
/// re-authenticate.
pub async fn authenticate(provider: &dyn CredentialProvider) -> Result<Credential, AuthError> {
    match provider.load().await? {
        Some(credential) => provider.refresh_if_needed(credential).await,
        None => Err(AuthError::Unauthenticated(
            "no stored token found; run the authorization helper first".to_string(),
        )),
    }
}

/// OAuth client registration, in the JSON layout the consent console exports.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: InstalledApp,
}

#[derive(Debug, Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    token_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token persistence on local disk: a JSON token file written by the
/// authorization helper, plus the OAuth client secrets needed to refresh it.
pub struct FileTokenStore {
    token_file: PathBuf,
    credentials_file: PathBuf,
    auth_port: u16,
    client: reqwest::Client,
}

impl FileTokenStore {
    pub fn new(token_file: PathBuf, credentials_file: PathBuf, auth_port: u16) -> Self {
        Self {
            token_file,
            credentials_file,
            auth_port,
            client: reqwest::Client::new(),
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl CredentialProvider for FileTokenStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.token_file.exists() {
            return Ok(None);
        }
        let credential: Credential = Self::read_json(&self.token_file)?;
        log::debug!("🔑 Loaded stored token from {}", self.token_file.display());
        Ok(Some(credential))
    }

    async fn refresh_if_needed(&self, credential: Credential) -> Result<Credential, AuthError> {
        if !credential.is_expired() {
            return Ok(credential);
        }

        let refresh_token = match credential.refresh_token {
            Some(token) => token,
            None => {
                return Err(AuthError::Unauthenticated(format!(
                    "token expired and no refresh token stored; re-run the authorization helper (callback port {})",
                    self.auth_port
                )))
            }
        };

        let secrets: ClientSecrets = Self::read_json(&self.credentials_file)?;
        let params = [
            ("client_id", secrets.installed.client_id.as_str()),
            ("client_secret", secrets.installed.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        log::info!("🔄 Access token expired, refreshing");
        let response = self
            .client
            .post(&secrets.installed.token_uri)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await?;
            log::error!("❌ Token refresh failed ({}): {}", status, detail);
            return Err(AuthError::TokenEndpoint { status, detail });
        }

        let token: TokenResponse = response.json().await?;
        log::info!("✅ Access token refreshed");

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: Some(refresh_token),
            expiry: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_credential() -> Credential {
        Credential {
            access_token: "token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: Some(Utc::now() + Duration::hours(1)),
        }
    }

    #[test]
    fn test_expiry_checks() {
        let mut credential = valid_credential();
        assert!(!credential.is_expired());

        credential.expiry = Some(Utc::now() - Duration::hours(1));
        assert!(credential.is_expired());

        credential.expiry = None;
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn test_load_without_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(
            dir.path().join("token.json"),
            dir.path().join("client_secret.json"),
            8080,
        );

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let mut file = std::fs::File::create(&token_path).unwrap();
        write!(
            file,
            r#"{{"access_token":"abc","refresh_token":"def","expiry":"2030-01-01T00:00:00Z"}}"#
        )
        .unwrap();

        let store = FileTokenStore::new(token_path, dir.path().join("client_secret.json"), 8080);
        let credential = store.load().await.unwrap().unwrap();

        assert_eq!(credential.access_token, "abc");
        assert_eq!(credential.refresh_token.as_deref(), Some("def"));
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn test_load_garbage_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        std::fs::write(&token_path, "not json").unwrap();

        let store = FileTokenStore::new(token_path, dir.path().join("client_secret.json"), 8080);
        assert!(matches!(store.load().await, Err(AuthError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_refresh_skipped_while_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(
            dir.path().join("token.json"),
            dir.path().join("client_secret.json"),
            8080,
        );

        let refreshed = store.refresh_if_needed(valid_credential()).await.unwrap();
        assert_eq!(refreshed.access_token, "token");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(
            dir.path().join("token.json"),
            dir.path().join("client_secret.json"),
            8080,
        );

        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            expiry: Some(Utc::now() - Duration::hours(1)),
        };
        assert!(matches!(
            store.refresh_if_needed(credential).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_without_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(
            dir.path().join("token.json"),
            dir.path().join("client_secret.json"),
            8080,
        );

        assert!(matches!(
            authenticate(&store).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }
}

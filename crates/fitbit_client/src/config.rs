use crate::FitbitError;
use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://api.fitbit.com";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub base_url: String,
    pub redirect_uri: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, FitbitError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, FitbitError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client_id = get("FITBIT_CLIENT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FitbitError::Config("FITBIT_CLIENT_ID missing".into()))?;
        let client_secret = get("FITBIT_CLIENT_SECRET")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FitbitError::Config("FITBIT_CLIENT_SECRET missing".into()))?;
        let base_url = get("FITBIT_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let redirect_uri =
            get("FITBIT_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.into());
        Ok(Self {
            client_id,
            client_secret: SecretString::new(client_secret.into()),
            base_url,
            redirect_uri,
        })
    }
}

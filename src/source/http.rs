//! HTTP plumbing shared by the remote config sources

use crate::error::{KeymasterError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-request timeout for remote config sources
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Validate a base URL of the form `<scheme>://<hostname>[:<port>]`
pub fn validate_base_url(url: &str) -> Result<Url> {
    let invalid = || {
        KeymasterError::Config(format!(
            "{} is not a valid URL. Must be of the form <scheme>://<hostname>[:<port>]",
            url
        ))
    };

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    let bare_path = matches!(parsed.path(), "" | "/");
    if !has_host
        || !bare_path
        || parsed.query().is_some()
        || parsed.fragment().is_some()
    {
        return Err(invalid());
    }

    Ok(parsed)
}

/// JSON API client bound to one base URL
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    client: Client,
    authorization: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = validate_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KeymasterError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            authorization: None,
        })
    }

    /// Send `value` as the Authorization header on every request
    pub fn with_authorization(mut self, value: String) -> Self {
        self.authorization = Some(value);
        self
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.authorization {
            Some(value) => request.header(reqwest::header::AUTHORIZATION, value),
            None => request,
        }
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");

        let body = self
            .authorize(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;

        Ok(body)
    }

    /// PATCH `path` with a JSON body, discarding the response body
    pub async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path)?;
        debug!(%url, "PATCH");

        self.authorize(self.client.patch(url))
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authorization", &self.authorization.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Render a remote record id (string or number) as a string
pub(crate) fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

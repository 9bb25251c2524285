use crate::fetch::client::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects a credential as an HTTP header.
///
/// The header name and value are validated once at construction so every
/// request can be sent without re-checking them.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())?;
        let mut key = HeaderValue::from_str(key)?;
        key.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            key,
        })
    }

    /// Uses `Authorization: Bearer <key>`, the usual shape for OAuth tokens.
    pub fn bearer(inner: C, key: &str) -> Result<Self> {
        Self::new(inner, "Authorization", &format!("Bearer {key}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use std::time::Duration;

    #[test]
    fn test_bearer_builds_authorization_header() {
        let client = BasicClient::new(Duration::from_secs(1)).unwrap();
        let wrapped = ApiKey::bearer(client, "secret").unwrap();
        assert_eq!(wrapped.header_name, "authorization");
        assert_eq!(wrapped.key.to_str().unwrap(), "Bearer secret");
        assert!(wrapped.key.is_sensitive());
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        let client = BasicClient::new(Duration::from_secs(1)).unwrap();
        assert!(ApiKey::new(client, "bad header", "x").is_err());
    }
}

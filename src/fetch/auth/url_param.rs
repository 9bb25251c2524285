use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends a credential as a URL query parameter.
///
/// Realtime-database style endpoints take their secret this way, e.g.
/// `param_name = "auth"` for `https://<db>.firebaseio.com/gpsdata.json?auth=<key>`.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }

    fn sign(&self, url: &mut reqwest::Url) {
        url.query_pairs_mut().append_pair(&self.param_name, &self.key);
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.sign(req.url_mut());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_appends_encoded_secret() {
        let wrapped = UrlParam::new((), "auth", "a b&c");
        let mut url = reqwest::Url::parse("https://db.example.com/gpsdata.json?print=silent").unwrap();
        wrapped.sign(&mut url);
        assert_eq!(
            url.as_str(),
            "https://db.example.com/gpsdata.json?print=silent&auth=a+b%26c"
        );
    }
}

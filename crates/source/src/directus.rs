//! Directus REST client.

use crate::error::{ErrorKind, Result};
use crate::{Query, RemoteSource};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use graft_assets::AssetKind;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use url::Url;

/// How to authenticate against the API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Auth {
    /// Log in with a user account; the session is closed again on logout.
    Credentials { email: String, password: String },
    /// A static access token.
    Token { token: String },
}
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials { email, .. } => f.debug_struct("Credentials").field("email", email).finish_non_exhaustive(),
            Self::Token { .. } => f.debug_struct("Token").finish_non_exhaustive(),
        }
    }
}

/// An authenticated Directus session.
pub struct DirectusClient {
    client: reqwest::Client,
    base: Url,
    access_token: String,
    refresh_token: Option<String>,
}
impl DirectusClient {
    /// Authenticate against the API rooted at `base`.
    ///
    /// With [`Auth::Credentials`] this logs in (`POST auth/login`) and keeps
    /// the returned access token for every later request.
    pub async fn connect(base: Url, auth: &Auth, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(connect_timeout).build().or_raise(|| ErrorKind::Client)?;
        Self::connect_with(client, base, auth).await
    }

    /// Like [`connect`](Self::connect), sharing an existing client.
    pub async fn connect_with(client: reqwest::Client, base: Url, auth: &Auth) -> Result<Self> {
        let base = normalize_base(base);
        let (access_token, refresh_token) = match auth {
            Auth::Token { token } => (token.clone(), None),
            Auth::Credentials { email, password } => {
                let url = endpoint(&base, "auth/login")?;
                tracing::info!(url = %url, email = %email, "Logging in");
                let response = client
                    .post(url.clone())
                    .json(&json!({ "email": email, "password": password }))
                    .send()
                    .await
                    .or_raise(|| ErrorKind::Authentication(url.to_string()))?;
                if !response.status().is_success() {
                    exn::bail!(ErrorKind::Authentication(url.to_string()));
                }
                let body: Value = response.json().await.or_raise(|| ErrorKind::InvalidResponse(url.to_string()))?;
                read_tokens(&body).ok_or_raise(|| ErrorKind::Authentication(url.to_string()))?
            },
        };
        Ok(Self {
            client,
            base,
            access_token,
            refresh_token,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl RemoteSource for DirectusClient {
    fn name(&self) -> &str {
        "directus"
    }

    async fn read_items(&self, path: &str, query: &Query) -> Result<Value> {
        let url = endpoint(&self.base, &format!("items/{path}"))?;
        tracing::debug!(url = %url, "Reading items");
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .query(&query.to_pairs())
            .send()
            .await
            .or_raise(|| ErrorKind::Request(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16(), url.to_string()));
        }
        let mut body: Value = response.json().await.or_raise(|| ErrorKind::InvalidResponse(url.to_string()))?;
        body.get_mut("data").map(Value::take).ok_or_raise(|| ErrorKind::InvalidResponse(url.to_string()))
    }

    fn token(&self) -> Option<String> {
        Some(self.access_token.clone())
    }

    fn asset_url(&self, kind: AssetKind, id: &str) -> String {
        format!("{}{}/{}", self.base, kind.endpoint(), id)
    }

    async fn logout(&self) -> Result<()> {
        // Static tokens have no session to close.
        let Some(refresh_token) = &self.refresh_token else {
            return Ok(());
        };
        let url = endpoint(&self.base, "auth/logout")?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.access_token)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .or_raise(|| ErrorKind::Request(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16(), url.to_string()));
        }
        tracing::debug!("Logged out");
        Ok(())
    }
}

/// Relative endpoints are joined onto the base, so it must end in `/`.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path).or_raise(|| ErrorKind::InvalidUrl(format!("{base}{path}")))
}

/// Login responses carry the token as `data.access_token` (or `data.token`
/// on older servers).
fn read_tokens(body: &Value) -> Option<(String, Option<String>)> {
    let data = body.get("data")?;
    let access = data.get("access_token").or_else(|| data.get("token"))?.as_str()?;
    let refresh = data.get("refresh_token").and_then(Value::as_str).map(str::to_string);
    Some((access.to_string(), refresh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://cms.example", "https://cms.example/items/posts")]
    #[case("https://cms.example/", "https://cms.example/items/posts")]
    #[case("https://example.com/directus", "https://example.com/directus/items/posts")]
    fn test_endpoints_stay_under_base(#[case] base: &str, #[case] expected: &str) {
        let base = normalize_base(Url::parse(base).unwrap());
        assert_eq!(endpoint(&base, "items/posts").unwrap().as_str(), expected);
    }

    #[rstest]
    #[case(json!({"data": {"access_token": "a", "refresh_token": "r"}}), Some(("a", Some("r"))))]
    #[case(json!({"data": {"token": "legacy"}}), Some(("legacy", None)))]
    #[case(json!({"data": {"access_token": 5}}), None)]
    #[case(json!({"errors": []}), None)]
    fn test_read_tokens(#[case] body: Value, #[case] expected: Option<(&str, Option<&str>)>) {
        let expected = expected.map(|(a, r)| (a.to_string(), r.map(str::to_string)));
        assert_eq!(read_tokens(&body), expected);
    }

    #[test]
    fn test_auth_variants_deserialize() {
        let auth: Auth = serde_json::from_value(json!({"email": "a@b.c", "password": "pw"})).unwrap();
        assert!(matches!(auth, Auth::Credentials { .. }));
        let auth: Auth = serde_json::from_value(json!({"token": "static"})).unwrap();
        assert_eq!(auth, Auth::Token { token: "static".to_string() });
        assert!(!format!("{auth:?}").contains("static"));
    }

    #[tokio::test]
    async fn test_static_token_needs_no_login() {
        let base = Url::parse("https://cms.example").unwrap();
        let auth = Auth::Token { token: "static".to_string() };
        let client = DirectusClient::connect_with(reqwest::Client::new(), base, &auth).await.unwrap();
        assert_eq!(client.token().as_deref(), Some("static"));
        assert_eq!(client.asset_url(AssetKind::Image, "7"), "https://cms.example/assets/7");
        assert_eq!(client.asset_url(AssetKind::File, "7"), "https://cms.example/files/7");
        client.logout().await.unwrap();
    }
}

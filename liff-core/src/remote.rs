//! [`UserRepository`] backed by the liff-server REST surface.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::error::{StoreError, StoreResult};
use crate::store::{PersistedUser, UserRecord, UserRepository};

/// HTTP client for `/api/v1/users`.
#[derive(Debug, Clone)]
pub struct RemoteUserRepository {
    base: Url,
    http: reqwest::Client,
}

impl RemoteUserRepository {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> StoreResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::Transport(format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn users_url(&self, user_id: Option<&str>) -> StoreResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::Transport(format!("{} cannot be used as a base URL", self.base))
            })?;
            segments.pop_if_empty().extend(["api", "v1", "users"]);
            if let Some(id) = user_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

async fn rejected(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    StoreError::Rejected { status, message }
}

#[async_trait]
impl UserRepository for RemoteUserRepository {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<PersistedUser>> {
        let resp = self.http.get(self.users_url(Some(user_id))?).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.json().await?)),
            _ => Err(rejected(resp).await),
        }
    }

    async fn save(&self, record: &UserRecord) -> StoreResult<PersistedUser> {
        record.validate()?;
        let resp = self
            .http
            .put(self.users_url(Some(&record.user_id))?)
            .json(record)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn find_by_friendship(&self, is_friend: bool) -> StoreResult<Vec<PersistedUser>> {
        let resp = self
            .http
            .get(self.users_url(None)?)
            .query(&[("is_friend", is_friend)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        let resp = self.http.delete(self.users_url(Some(user_id))?).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(rejected(resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_user_urls() {
        let repo = RemoteUserRepository::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            repo.users_url(Some("U1")).unwrap().as_str(),
            "http://127.0.0.1:8080/api/v1/users/U1"
        );
        let nested = RemoteUserRepository::new("http://example.com/liff/").unwrap();
        assert_eq!(
            nested.users_url(None).unwrap().as_str(),
            "http://example.com/liff/api/v1/users"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(RemoteUserRepository::new("not a url").is_err());
        let repo = RemoteUserRepository::new("mailto:someone@example.com").unwrap();
        assert!(repo.users_url(None).is_err());
    }
}

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{Message, MsgId, User, UserId};

use super::{BackendError, MessageStore, SpamChecker, UserDirectory};

/// JSON-over-HTTP adapter for all three collaborators.
///
/// - `GET  {base}users?email=<email>` → `{"id": 1, "email": "..."}`
/// - `POST {base}messages` with `{"user_ids": [..]}` → `{"messages": [{"id": .., "user_id": ..}]}`
/// - `GET  {base}spam/<id>` → `{"has_spam": true}`
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(http: Client, base: Url) -> Self {
        Self {
            http,
            base: with_trailing_slash(base),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }
}

#[derive(Debug, Serialize)]
struct FetchMessagesRequest<'a> {
    user_ids: &'a [UserId],
}

#[derive(Debug, Deserialize)]
struct FetchMessagesResponse {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct SpamResponse {
    has_spam: bool,
}

#[async_trait]
impl UserDirectory for HttpBackend {
    async fn resolve_user(&self, email: &str) -> Result<User, BackendError> {
        let response = self
            .http
            .get(self.endpoint("users")?)
            .query(&[("email", email)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::UnknownUser(email.to_string()));
        }
        Ok(checked(response)?.json().await?)
    }
}

#[async_trait]
impl MessageStore for HttpBackend {
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, BackendError> {
        let user_ids: Vec<UserId> = users.iter().map(|u| u.id).collect();
        let response: FetchMessagesResponse = self
            .http
            .post(self.endpoint("messages")?)
            .json(&FetchMessagesRequest {
                user_ids: &user_ids,
            })
            .send()
            .await
            .map_err(BackendError::from)
            .and_then(checked)?
            .json()
            .await?;
        Ok(response.messages)
    }
}

#[async_trait]
impl SpamChecker for HttpBackend {
    async fn check_spam(&self, id: MsgId) -> Result<bool, BackendError> {
        let response: SpamResponse = self
            .http
            .get(self.endpoint(&format!("spam/{id}"))?)
            .send()
            .await
            .map_err(BackendError::from)
            .and_then(checked)?
            .json()
            .await?;
        Ok(response.has_spam)
    }
}

/// 5xx and 429 mean the service is temporarily out; other failures are
/// reported as plain HTTP errors.
fn checked(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::Unavailable(format!(
            "{} answered {status}",
            response.url()
        )));
    }
    Ok(response.error_for_status()?)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

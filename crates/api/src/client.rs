//! HTTP client for the Backend API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use taskboard_config::ApiConfig;

use crate::entities::{
    Chat, Claim, CreateTaskRequest, Message, SubmitCompletionRequest, Task,
};
use crate::error::{ApiError, ApiResult};
use crate::identity::DeviceIdentity;

/// Header carrying the device identifier on every request and on the socket
/// handshake. Lowercase so it can be used as a static header name.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

const API_PREFIX: [&str; 2] = ["api", "v1"];

/// Resource operations the domain stores consume.
///
/// Implemented over HTTP by [`ApiClient`]; tests substitute in-memory doubles.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn create_task(&self, request: &CreateTaskRequest) -> ApiResult<Task>;
    async fn open_tasks(&self, limit: u32, offset: u32) -> ApiResult<Vec<Task>>;
    async fn my_tasks(&self, limit: u32, offset: u32) -> ApiResult<Vec<Task>>;
    async fn task(&self, task_id: &str) -> ApiResult<Task>;

    async fn claim_task(&self, task_id: &str) -> ApiResult<Claim>;
    async fn claims_for_task(&self, task_id: &str) -> ApiResult<Vec<Claim>>;
    async fn claim(&self, claim_id: &str) -> ApiResult<Claim>;
    async fn submit_completion(
        &self,
        claim_id: &str,
        request: &SubmitCompletionRequest,
    ) -> ApiResult<Claim>;
    async fn approve_claim(&self, claim_id: &str) -> ApiResult<()>;
    async fn reject_claim(&self, claim_id: &str) -> ApiResult<()>;

    async fn chats_for_task(&self, task_id: &str) -> ApiResult<Vec<Chat>>;
    async fn get_or_create_chat(&self, task_id: &str, claimer_id: Option<&str>)
        -> ApiResult<Chat>;
    async fn delete_chat(&self, chat_id: &str) -> ApiResult<()>;
    async fn send_message(&self, chat_id: &str, content: &str) -> ApiResult<Message>;
    async fn messages(&self, chat_id: &str, limit: u32, offset: u32) -> ApiResult<Vec<Message>>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// Go-style backends encode an empty slice as `null`.
#[derive(Debug, Deserialize)]
struct TaskList {
    #[serde(default)]
    tasks: Option<Vec<Task>>,
}

#[derive(Debug, Deserialize)]
struct ClaimList {
    #[serde(default)]
    claims: Option<Vec<Claim>>,
}

#[derive(Debug, Deserialize)]
struct ChatList {
    #[serde(default)]
    chats: Option<Vec<Chat>>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Option<Vec<Message>>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    identity: DeviceIdentity,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, identity: DeviceIdentity) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|error| ApiError::invalid_base_url(&config.base_url, error.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::invalid_base_url(
                &config.base_url,
                "url cannot carry a path",
            ));
        }

        let device_header = HeaderValue::from_str(identity.as_str())
            .map_err(|_| ApiError::InvalidDeviceId(identity.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(HeaderName::from_static(DEVICE_ID_HEADER), device_header);

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            identity,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::invalid_base_url(self.base_url.as_str(), "url cannot carry a path"))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                warn!(status = status.as_u16(), %error, "failed to read rejection body");
                String::new()
            }
        };
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) if !body.trim().is_empty() => body,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string(),
        };

        warn!(status = status.as_u16(), %message, "backend rejected request");
        Err(ApiError::rejected(status.as_u16(), message))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        body: &impl serde::Serialize,
    ) -> ApiResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.http.post(url).query(query).json(body).send().await?;
        Self::decode(response).await
    }

    async fn post_empty(&self, segments: &[&str]) -> ApiResult<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.http.post(url).send().await?;
        Self::check(response).await.map(|_| ())
    }

    fn page(limit: u32, offset: u32) -> [(&'static str, String); 2] {
        [("limit", limit.to_string()), ("offset", offset.to_string())]
    }
}

#[async_trait]
impl BackendApi for ApiClient {
    async fn create_task(&self, request: &CreateTaskRequest) -> ApiResult<Task> {
        self.post(&["tasks"], &[], request).await
    }

    async fn open_tasks(&self, limit: u32, offset: u32) -> ApiResult<Vec<Task>> {
        let list: TaskList = self.get(&["tasks"], &Self::page(limit, offset)).await?;
        Ok(list.tasks.unwrap_or_default())
    }

    async fn my_tasks(&self, limit: u32, offset: u32) -> ApiResult<Vec<Task>> {
        let list: TaskList = self
            .get(&["tasks", "my"], &Self::page(limit, offset))
            .await?;
        Ok(list.tasks.unwrap_or_default())
    }

    async fn task(&self, task_id: &str) -> ApiResult<Task> {
        self.get(&["tasks", task_id], &[]).await
    }

    async fn claim_task(&self, task_id: &str) -> ApiResult<Claim> {
        self.post(&["tasks", task_id, "claims"], &[], &serde_json::json!({}))
            .await
    }

    async fn claims_for_task(&self, task_id: &str) -> ApiResult<Vec<Claim>> {
        let list: ClaimList = self.get(&["tasks", task_id, "claims"], &[]).await?;
        Ok(list.claims.unwrap_or_default())
    }

    async fn claim(&self, claim_id: &str) -> ApiResult<Claim> {
        self.get(&["claims", claim_id], &[]).await
    }

    async fn submit_completion(
        &self,
        claim_id: &str,
        request: &SubmitCompletionRequest,
    ) -> ApiResult<Claim> {
        self.post(&["claims", claim_id, "submit"], &[], request).await
    }

    async fn approve_claim(&self, claim_id: &str) -> ApiResult<()> {
        self.post_empty(&["claims", claim_id, "approve"]).await
    }

    async fn reject_claim(&self, claim_id: &str) -> ApiResult<()> {
        self.post_empty(&["claims", claim_id, "reject"]).await
    }

    async fn chats_for_task(&self, task_id: &str) -> ApiResult<Vec<Chat>> {
        let list: ChatList = self.get(&["tasks", task_id, "chats"], &[]).await?;
        Ok(list.chats.unwrap_or_default())
    }

    async fn get_or_create_chat(
        &self,
        task_id: &str,
        claimer_id: Option<&str>,
    ) -> ApiResult<Chat> {
        let query: Vec<(&str, String)> = claimer_id
            .map(|id| vec![("claimer_id", id.to_string())])
            .unwrap_or_default();
        self.post(&["tasks", task_id, "chats"], &query, &serde_json::json!({}))
            .await
    }

    async fn delete_chat(&self, chat_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["chats", chat_id])?;
        debug!(%url, "DELETE");
        let response = self.http.delete(url).send().await?;
        Self::check(response).await.map(|_| ())
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> ApiResult<Message> {
        self.post(
            &["chats", chat_id, "messages"],
            &[],
            &serde_json::json!({ "content": content }),
        )
        .await
    }

    async fn messages(&self, chat_id: &str, limit: u32, offset: u32) -> ApiResult<Vec<Message>> {
        let list: MessageList = self
            .get(&["chats", chat_id, "messages"], &Self::page(limit, offset))
            .await?;
        Ok(list.messages.unwrap_or_default())
    }
}

use crate::domain::models::{Session, SessionType};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub session_type: SessionType,
    pub duration: u32,
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start(&self, request: StartSessionRequest) -> Result<Session, InfraError>;

    async fn get_active(&self) -> Result<Option<Session>, InfraError>;

    async fn pause(&self, session_id: &str) -> Result<Session, InfraError>;

    async fn resume(&self, session_id: &str) -> Result<Session, InfraError>;

    async fn complete(&self, session_id: &str) -> Result<(), InfraError>;

    async fn cancel(&self, session_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSessionApi {
    client: Client,
    base_url: Url,
}

impl ReqwestSessionApi {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Ok(Self {
            client: http_client(),
            base_url: parse_base_url(base_url)?,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Sync(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn sessions_endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        endpoint(&self.base_url, "sessions", segments)
    }

    async fn post_action(&self, session_id: &str, action: &str) -> Result<String, InfraError> {
        Self::ensure_non_empty(session_id, "session id")?;
        let endpoint = self.sessions_endpoint(&[session_id, action])?;
        let response = self.client.post(endpoint).send().await.map_err(|error| {
            InfraError::Sync(format!("network error while calling session {action}: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Sync(format!("failed reading session {action} response: {error}"))
        })?;
        check_action_status(session_id, status, &body)?;
        Ok(body)
    }
}

fn check_action_status(session_id: &str, status: StatusCode, body: &str) -> Result<(), InfraError> {
    if status == StatusCode::NOT_FOUND {
        return Err(InfraError::SessionNotFound(session_id.to_string()));
    }
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    Ok(())
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|error| {
            log::warn!("falling back to default http client: {error}");
            Client::new()
        })
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, InfraError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig("api base url must not be empty".to_string()));
    }
    Url::parse(trimmed)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid api base url: {error}")))
}

pub(crate) fn endpoint(base_url: &Url, resource: &str, segments: &[&str]) -> Result<Url, InfraError> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
        path.pop_if_empty();
        path.push(resource);
        path.extend(segments);
    }
    Ok(url)
}

pub(crate) fn http_error(status: StatusCode, body: &str) -> InfraError {
    let message = if body.trim().is_empty() {
        format!("session api error: http {}", status.as_u16())
    } else {
        format!("session api error: http {}; body={body}", status.as_u16())
    };
    InfraError::Sync(message)
}

fn decode_session(body: &str) -> Result<Session, InfraError> {
    let session: Session = serde_json::from_str(body).map_err(|error| {
        InfraError::Sync(format!("invalid session payload: {error}; body={body}"))
    })?;
    session.validate().map_err(InfraError::Sync)?;
    Ok(session)
}

fn decode_active_session(status: StatusCode, body: &str) -> Result<Option<Session>, InfraError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    decode_session(trimmed).map(Some)
}

#[async_trait]
impl SessionApi for ReqwestSessionApi {
    async fn start(&self, request: StartSessionRequest) -> Result<Session, InfraError> {
        let endpoint = self.sessions_endpoint(&[])?;
        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::Sync(format!("network error while starting session: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Sync(format!("failed reading session start response: {error}")))?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        decode_session(&body)
    }

    async fn get_active(&self) -> Result<Option<Session>, InfraError> {
        let endpoint = self.sessions_endpoint(&["active"])?;
        let response = self.client.get(endpoint).send().await.map_err(|error| {
            InfraError::Sync(format!("network error while fetching active session: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Sync(format!("failed reading active session response: {error}"))
        })?;
        decode_active_session(status, &body)
    }

    async fn pause(&self, session_id: &str) -> Result<Session, InfraError> {
        let body = self.post_action(session_id, "pause").await?;
        decode_session(&body)
    }

    async fn resume(&self, session_id: &str) -> Result<Session, InfraError> {
        let body = self.post_action(session_id, "resume").await?;
        decode_session(&body)
    }

    async fn complete(&self, session_id: &str) -> Result<(), InfraError> {
        self.post_action(session_id, "complete").await.map(|_| ())
    }

    async fn cancel(&self, session_id: &str) -> Result<(), InfraError> {
        self.post_action(session_id, "cancel").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SessionStatus;

    #[test]
    fn endpoints_keep_base_path() {
        let base = parse_base_url("https://api.example.test/v1").expect("base url");
        let url = endpoint(&base, "sessions", &["ses 1", "pause"]).expect("endpoint");
        assert_eq!(url.as_str(), "https://api.example.test/v1/sessions/ses%201/pause");

        let root = endpoint(&base, "sessions", &[]).expect("root endpoint");
        assert_eq!(root.as_str(), "https://api.example.test/v1/sessions");
    }

    #[test]
    fn base_url_must_be_present_and_valid() {
        assert!(parse_base_url("  ").is_err());
        assert!(parse_base_url("not a url").is_err());
        assert!(ReqwestSessionApi::new("http://127.0.0.1:8080").is_ok());
    }

    #[test]
    fn start_request_uses_camel_case() {
        let request = StartSessionRequest {
            session_type: SessionType::Break,
            duration: 5,
        };
        let json = serde_json::to_value(request).expect("serialize request");
        assert_eq!(json, serde_json::json!({"sessionType": "break", "duration": 5}));
    }

    #[test]
    fn active_session_absent_on_404_or_null() {
        assert_eq!(decode_active_session(StatusCode::NOT_FOUND, "").expect("404"), None);
        assert_eq!(decode_active_session(StatusCode::OK, "null").expect("null"), None);
        assert!(decode_active_session(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_err());
    }

    #[test]
    fn active_session_payload_is_decoded_and_validated() {
        let body = r#"{"id":"ses-9","sessionType":"focus","status":"running","remainingTime":61,"duration":25}"#;
        let session = decode_active_session(StatusCode::OK, body)
            .expect("decode")
            .expect("session present");
        assert_eq!(session.id, "ses-9");
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.remaining_time, 61);

        let invalid = r#"{"id":"","sessionType":"focus","status":"running","remainingTime":61,"duration":25}"#;
        assert!(decode_active_session(StatusCode::OK, invalid).is_err());
    }

    #[test]
    fn unknown_session_on_action_is_not_found() {
        assert!(matches!(
            check_action_status("ses-1", StatusCode::NOT_FOUND, "missing"),
            Err(InfraError::SessionNotFound(id)) if id == "ses-1"
        ));
        let unavailable = check_action_status("ses-1", StatusCode::SERVICE_UNAVAILABLE, "")
            .expect_err("503 is an error");
        assert!(unavailable.is_transient());
        assert!(check_action_status("ses-1", StatusCode::OK, "{}").is_ok());
    }

    #[test]
    fn http_errors_are_transient() {
        let error = http_error(StatusCode::BAD_GATEWAY, "");
        assert!(error.is_transient());
        assert!(error.to_string().contains("502"));
    }
}

//! REST implementation of the quest gateway.

use std::time::Duration;

use async_trait::async_trait;
use questline_core::{
    Day, Goal, GoalId, GoalUpdate, Milestone, MilestoneId, NewGoal, NewTask, Task, TaskId,
    TaskUpdate,
};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{GatewayError, QuestGateway, Result};

/// Connection settings for [`HttpQuestGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// API root, e.g. `https://api.example.com/v1`
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    /// Config with the default 30 second timeout and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gateway backed by the remote REST API.
#[derive(Clone)]
pub struct HttpQuestGateway {
    /// HTTP client
    client: Client,

    /// API root without trailing slash
    base_url: String,

    /// Bearer token
    token: Option<String>,
}

impl HttpQuestGateway {
    /// Create a new gateway.
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = ClientBuilder::new().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        debug!("{} -> {}", what, status);

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(request, what).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl QuestGateway for HttpQuestGateway {
    async fn list_goals(&self) -> Result<Vec<Goal>> {
        self.fetch(self.client.get(self.url("/goals")), "GET /goals").await
    }

    async fn get_goal(&self, id: &GoalId) -> Result<Goal> {
        let path = format!("/goals/{}", id);
        self.fetch(self.client.get(self.url(&path)), &format!("GET {}", path))
            .await
    }

    async fn create_goal(&self, goal: &NewGoal) -> Result<Goal> {
        self.fetch(self.client.post(self.url("/goals")).json(goal), "POST /goals")
            .await
    }

    async fn update_goal(&self, id: &GoalId, update: &GoalUpdate) -> Result<Goal> {
        let path = format!("/goals/{}", id);
        self.fetch(
            self.client.put(self.url(&path)).json(update),
            &format!("PUT {}", path),
        )
        .await
    }

    async fn delete_goal(&self, id: &GoalId) -> Result<()> {
        let path = format!("/goals/{}", id);
        self.send(self.client.delete(self.url(&path)), &format!("DELETE {}", path))
            .await?;
        Ok(())
    }

    async fn get_roadmap(&self, goal_id: &GoalId) -> Result<Vec<Milestone>> {
        let path = format!("/goals/{}/roadmap", goal_id);
        self.fetch(self.client.get(self.url(&path)), &format!("GET {}", path))
            .await
    }

    async fn trigger_roadmap_generation(&self, goal_id: &GoalId) -> Result<()> {
        let path = format!("/goals/{}/roadmap/generate", goal_id);
        self.send(self.client.post(self.url(&path)), &format!("POST {}", path))
            .await?;
        Ok(())
    }

    async fn complete_milestone(&self, goal_id: &GoalId, milestone_id: &MilestoneId) -> Result<()> {
        let path = format!("/goals/{}/milestones/{}/complete", goal_id, milestone_id);
        self.send(self.client.post(self.url(&path)), &format!("POST {}", path))
            .await?;
        Ok(())
    }

    async fn list_tasks(&self, date: Day) -> Result<Vec<Task>> {
        let date = date.format("%Y-%m-%d").to_string();
        self.fetch(
            self.client.get(self.url("/tasks")).query(&[("date", date.as_str())]),
            &format!("GET /tasks?date={}", date),
        )
        .await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.fetch(self.client.post(self.url("/tasks")).json(task), "POST /tasks")
            .await
    }

    async fn update_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<Task> {
        let path = format!("/tasks/{}", id);
        self.fetch(
            self.client.put(self.url(&path)).json(update),
            &format!("PUT {}", path),
        )
        .await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let path = format!("/tasks/{}", id);
        self.send(self.client.delete(self.url(&path)), &format!("DELETE {}", path))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway = HttpQuestGateway::new(HttpGatewayConfig::new("http://localhost:8080/api/"))
            .unwrap();
        assert_eq!(gateway.url("/goals"), "http://localhost:8080/api/goals");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let mut config = HttpGatewayConfig::new("http://127.0.0.1:9");
        config.timeout = Duration::from_millis(500);
        let gateway = HttpQuestGateway::new(config).unwrap();

        let err = gateway.list_goals().await.unwrap_err();
        assert!(matches!(err, GatewayError::Http(_)));
    }
}

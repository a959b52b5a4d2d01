use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::service::{ExecutePhaseBody, ExecutePhaseResponse, PhaseRequest, PhaseService, ServiceError};
use crate::config::ServiceConfig;
use crate::project::{ProjectRef, UserIdentity};
use crate::workflow::PhaseResult;

/// HTTP client for the remote transformation service with client-side
/// rate limiting
#[derive(Debug, Clone)]
pub struct HttpPhaseService {
    client: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpPhaseService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute);

        // Overall phase deadlines are enforced by the executor, this only
        // bounds connection setup
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn project_url(&self, project: &ProjectRef) -> String {
        format!("{}/projects/{}/{}", self.base_url, project.owner(), project.repo())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn remote_error(response: reqwest::Response) -> ServiceError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        ServiceError::Remote { status, message }
    }
}

#[async_trait]
impl PhaseService for HttpPhaseService {
    async fn execute_phase(&self, request: &PhaseRequest) -> Result<PhaseResult, ServiceError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let url = format!("{}/phases/{}", self.project_url(&request.project), request.phase_number);
        debug!(url = %url, is_last_phase = request.is_last_phase, "Executing remote phase");

        let response = self
            .authorize(self.client.post(&url))
            .json(&ExecutePhaseBody::from(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }

        let body: ExecutePhaseResponse = response.json().await?;
        Ok(body.phase_results)
    }

    async fn discard_project(&self, project: &ProjectRef, user: &UserIdentity) -> Result<(), ServiceError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .authorize(self.client.delete(self.project_url(project)))
            .query(&[("userId", user.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(project = %project, "Discarded remote project artifacts");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(project = %project, "No remote artifacts to discard");
                Ok(())
            }
            _ => Err(Self::remote_error(response).await),
        }
    }
}

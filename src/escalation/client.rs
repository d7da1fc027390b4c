//! HTTP client for the vision-model analysis endpoint.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use tracing::debug;

use super::{AnalysisRequest, AnalysisResponse, VisionAnalyzer};
use crate::config::EscalationConfig;
use crate::error::{CoachError, EscalationError, EscalationResult};

#[derive(Debug, Clone)]
pub struct VisionClient {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl VisionClient {
    pub fn new(config: &EscalationConfig) -> Result<Self, CoachError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.analyze_path.trim_start_matches('/')
        );
        Ok(Self {
            http,
            url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(
        http: Client,
        url: String,
        api_key: Option<String>,
        request: AnalysisRequest,
    ) -> EscalationResult<AnalysisResponse> {
        debug!("Sending {:?} analysis to {}", request.mode, url);

        let mut builder = http.post(&url).json(&request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EscalationError::RequestFailed(format!("{}: {}", status, body)));
        }

        let parsed: AnalysisResponse = serde_json::from_str(&body)?;
        if parsed.is_empty() {
            return Err(EscalationError::InvalidResponse("no usable fields".to_string()));
        }
        Ok(parsed)
    }
}

impl VisionAnalyzer for VisionClient {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, EscalationResult<AnalysisResponse>> {
        Self::post(self.http.clone(), self.url.clone(), self.api_key.clone(), request).boxed()
    }
}

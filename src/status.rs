use std::sync::Arc;
use std::time::Duration;

use crate::error::{EarthGuardError, Result};
use crate::models::{Content, GenerateContentRequest, GenerateContentResponse, Part, Tool};
use crate::persona::{STATUS_NO_DATA, STATUS_PROMPT, STATUS_UNAVAILABLE};
use crate::transport::Transport;

/// One-off regional seismic activity summary for the dashboard.
///
/// Shares nothing with the conversation; the summary is never recorded as a turn.
pub struct StatusPoller {
    tx: Arc<dyn Transport>,
    model: String,
    deadline: Duration,
}

impl StatusPoller {
    pub fn new(tx: Arc<dyn Transport>, model: String, deadline: Duration) -> Self {
        Self {
            tx,
            model,
            deadline,
        }
    }

    pub fn build_request(&self) -> GenerateContentRequest {
        GenerateContentRequest {
            model: self.model.clone(),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(STATUS_PROMPT)],
            }],
            system_instruction: None,
            tools: vec![Tool::GoogleSearch {}],
            tool_config: None,
        }
    }

    pub async fn poll(&self) -> String {
        match self.fetch().await {
            Ok(response) => {
                let summary = response
                    .candidates
                    .first()
                    .map(|c| c.joined_text())
                    .unwrap_or_default();
                if summary.trim().is_empty() {
                    tracing::warn!("Status check returned no summary");
                    STATUS_NO_DATA.to_string()
                } else {
                    summary
                }
            }
            Err(e) => {
                tracing::warn!("Status check failed: {}", e);
                STATUS_UNAVAILABLE.to_string()
            }
        }
    }

    async fn fetch(&self) -> Result<GenerateContentResponse> {
        let request = self.build_request();
        tokio::time::timeout(self.deadline, self.tx.generate(&request))
            .await
            .map_err(|_| EarthGuardError::Timeout(self.deadline))?
    }
}

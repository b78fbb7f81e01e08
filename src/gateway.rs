use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::error::{EarthGuardError, Result};
use crate::grounding::GroundingClassifier;
use crate::models::{
    AssistantResult, Content, GenerateContentRequest, GenerateContentResponse, LocationState,
    Part, RetrievalConfig, Tool, ToolConfig, UserQuery,
};
use crate::persona::{EMPTY_ANSWER_FALLBACK, OFFLINE_FALLBACK, SYSTEM_INSTRUCTION};
use crate::transport::Transport;

/// Answers one user query. Implementations must always produce a renderable result.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn dispatch(&self, query: &UserQuery, location: &LocationState) -> AssistantResult;
}

pub struct AssistantGateway {
    tx: Arc<dyn Transport>,
    model: String,
    deadline: Duration,
    classifier: GroundingClassifier,
}

impl AssistantGateway {
    pub fn new(tx: Arc<dyn Transport>, model: String, deadline: Duration) -> Self {
        Self {
            tx,
            model,
            deadline,
            classifier: GroundingClassifier,
        }
    }

    /// Web search is always on; map retrieval only when we can anchor it.
    pub fn build_request(
        &self,
        query: &UserQuery,
        location: &LocationState,
    ) -> GenerateContentRequest {
        let mut tools = vec![Tool::GoogleSearch {}];
        let tool_config = location.coordinates().map(|lat_lng| {
            tools.push(Tool::GoogleMaps {});
            ToolConfig {
                retrieval_config: RetrievalConfig { lat_lng },
            }
        });

        GenerateContentRequest {
            model: self.model.clone(),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(query.as_str())],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(SYSTEM_INSTRUCTION)],
            }),
            tools,
            tool_config,
        }
    }

    fn normalize(&self, response: GenerateContentResponse) -> AssistantResult {
        let Some(candidate) = response.candidates.into_iter().next() else {
            tracing::warn!("Gemini returned no candidates");
            return AssistantResult {
                text: EMPTY_ANSWER_FALLBACK.to_string(),
                evidence: None,
            };
        };

        let mut text = candidate.joined_text();
        if text.trim().is_empty() {
            tracing::warn!("Gemini returned an empty answer");
            text = EMPTY_ANSWER_FALLBACK.to_string();
        }

        AssistantResult {
            text,
            evidence: self.classifier.classify(candidate.grounding_metadata.as_ref()),
        }
    }

    async fn call(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        tokio::time::timeout(self.deadline, self.tx.generate(request))
            .await
            .map_err(|_| EarthGuardError::Timeout(self.deadline))?
    }
}

#[async_trait]
impl Assistant for AssistantGateway {
    async fn dispatch(&self, query: &UserQuery, location: &LocationState) -> AssistantResult {
        let request = self.build_request(query, location);
        tracing::info!(
            model = %self.model,
            maps = request.has_tool(Tool::GoogleMaps {}),
            "Dispatching query to Gemini"
        );

        match self.call(&request).await {
            Ok(response) => self.normalize(response),
            Err(e) => {
                tracing::error!("Gemini API error: {}", e);
                AssistantResult {
                    text: OFFLINE_FALLBACK.to_string(),
                    evidence: None,
                }
            }
        }
    }
}

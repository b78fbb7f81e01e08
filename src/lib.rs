pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod grounding;
pub mod location;
pub mod models;
pub mod persona;
pub mod render;
pub mod status;
pub mod transport;

use std::sync::Arc;

use crate::config::Config;
use crate::conversation::{ConversationSnapshot, ConversationStore};
use crate::error::Result;
use crate::gateway::AssistantGateway;
use crate::location::{ConfiguredLocationSource, LocationProvider, LocationSource};
use crate::models::{ConversationTurn, LocationState};
use crate::status::StatusPoller;
use crate::transport::{GeminiTransport, Transport};

/// One assistant session: conversation, location, and the status card.
pub struct EarthGuard {
    conversation: Arc<ConversationStore>,
    location: LocationProvider,
    status: StatusPoller,
}

impl EarthGuard {
    pub fn new(cfg: &Config) -> Result<Self> {
        let transport = Arc::new(GeminiTransport::new(
            cfg.gemini.api_key.clone(),
            cfg.gemini.base_url.clone(),
            cfg.request_timeout(),
            cfg.retry.clone(),
        )?);
        let source = Arc::new(ConfiguredLocationSource::new(cfg.location.clone()));

        Ok(Self::with_parts(cfg, transport, source))
    }

    pub fn with_parts(
        cfg: &Config,
        transport: Arc<dyn Transport>,
        source: Arc<dyn LocationSource>,
    ) -> Self {
        let gateway = AssistantGateway::new(
            Arc::clone(&transport),
            cfg.gemini.model.clone(),
            cfg.dispatch_deadline(),
        );
        let status = StatusPoller::new(
            Arc::clone(&transport),
            cfg.gemini.model.clone(),
            cfg.status_deadline(),
        );

        Self {
            conversation: Arc::new(ConversationStore::new(
                Arc::new(gateway),
                cfg.conversation.max_message_chars,
            )),
            location: LocationProvider::new(source, cfg.location_timeout()),
            status,
        }
    }

    pub fn conversation(&self) -> Arc<ConversationStore> {
        Arc::clone(&self.conversation)
    }

    pub async fn resolve_location(&self) -> LocationState {
        self.conversation.resolve_location(&self.location).await
    }

    pub async fn submit(&self, text: &str) -> Result<ConversationTurn> {
        self.conversation.submit(text).await
    }

    pub async fn poll_status(&self) -> String {
        self.status.poll().await
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.conversation.snapshot()
    }
}

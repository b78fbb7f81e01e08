use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EarthGuardError, Result};

// ---------------------------------------------------------------------------
// Conversation model
// ---------------------------------------------------------------------------

/// Creation-ordered identifier of a turn within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// One message in the conversation history. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: TurnId,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceBundle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub map_results: Vec<MapResult>,
    pub web_citations: Vec<WebCitation>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.map_results.is_empty() && self.web_citations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapResult {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebCitation {
    pub title: String,
    pub uri: String,
}

/// Normalized answer handed back by the gateway on every dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantResult {
    pub text: String,
    pub evidence: Option<EvidenceBundle>,
}

/// Non-empty, length-checked user text. The only way to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery(String);

impl UserQuery {
    pub fn new(text: impl Into<String>, max_chars: usize) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EarthGuardError::EmptyMessage);
        }
        if text.chars().count() > max_chars {
            return Err(EarthGuardError::MessageTooLong(max_chars));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Location model
// ---------------------------------------------------------------------------

/// Range-checked position. Only `Coordinates::new` can build one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(EarthGuardError::Location(format!(
                "latitude {latitude} out of range"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(EarthGuardError::Location(format!(
                "longitude {longitude} out of range"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Outcome of the one-shot location acquisition.
///
/// The three variants make "coordinates and error at once" unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LocationState {
    #[default]
    Pending,
    Resolved(Coordinates),
    Failed {
        error: String,
    },
}

impl LocationState {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Self::Resolved(coords) => Some(*coords),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// ---------------------------------------------------------------------------
// Gemini generateContent wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    GoogleSearch {},
    GoogleMaps {},
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub retrieval_config: RetrievalConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub lat_lng: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Carried in the URL path, not the body.
    #[serde(skip)]
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

impl GenerateContentRequest {
    pub fn has_tool(&self, tool: Tool) -> bool {
        self.tools.contains(&tool)
    }

    pub fn retrieval_bias(&self) -> Option<Coordinates> {
        self.tool_config.map(|c| c.retrieval_config.lat_lng)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

impl Candidate {
    /// All text fragments joined in order with no separator.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// Evidence block of a candidate.
///
/// Anything other than an object with a `groundingChunks` array decodes to no
/// chunks, so bad evidence never costs the answer text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct GroundingMetadata {
    pub grounding_chunks: Vec<GroundingChunk>,
}

impl From<serde_json::Value> for GroundingMetadata {
    fn from(mut value: serde_json::Value) -> Self {
        let grounding_chunks = match value
            .get_mut("groundingChunks")
            .map(serde_json::Value::take)
        {
            Some(serde_json::Value::Array(items)) => {
                items.into_iter().map(GroundingChunk::from).collect()
            }
            _ => Vec::new(),
        };
        Self { grounding_chunks }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundingSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl GroundingSource {
    /// Non-string fields count as absent; anything but an object is no source.
    fn from_value(value: &serde_json::Value) -> Option<Self> {
        let fields = value.as_object()?;
        let field = |key: &str| fields.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Some(Self {
            uri: field("uri"),
            title: field("title"),
        })
    }
}

/// A single evidence item, decoded from whatever shape the backend sent.
///
/// Items are decoded leniently so an unfamiliar kind never fails the whole
/// response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum GroundingChunk {
    Map(GroundingSource),
    Web(GroundingSource),
    Unknown,
}

impl From<serde_json::Value> for GroundingChunk {
    fn from(value: serde_json::Value) -> Self {
        let source = |key: &str| value.get(key).and_then(GroundingSource::from_value);

        // Map marker wins when an item carries both.
        if let Some(src) = source("maps") {
            GroundingChunk::Map(src)
        } else if let Some(src) = source("web") {
            GroundingChunk::Web(src)
        } else {
            GroundingChunk::Unknown
        }
    }
}

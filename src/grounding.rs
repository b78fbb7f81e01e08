use crate::models::{
    EvidenceBundle, GroundingChunk, GroundingMetadata, GroundingSource, MapResult, WebCitation,
};

pub const DEFAULT_CITATION_TITLE: &str = "Source";
pub const DEFAULT_PLACE_TITLE: &str = "Unnamed location";

/// Splits backend grounding evidence into map results and web citations.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundingClassifier;

impl GroundingClassifier {
    /// Returns `None` when there is no evidence or nothing in it was usable.
    pub fn classify(&self, metadata: Option<&GroundingMetadata>) -> Option<EvidenceBundle> {
        let metadata = metadata?;
        let mut bundle = EvidenceBundle::default();
        let mut dropped = 0usize;

        for chunk in &metadata.grounding_chunks {
            match chunk {
                GroundingChunk::Map(src) => match place(src) {
                    Some(result) => bundle.map_results.push(result),
                    None => dropped += 1,
                },
                GroundingChunk::Web(src) => match citation(src) {
                    Some(result) => bundle.web_citations.push(result),
                    None => dropped += 1,
                },
                GroundingChunk::Unknown => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, "Ignored unusable grounding chunks");
        }

        if bundle.is_empty() { None } else { Some(bundle) }
    }
}

fn usable_uri(src: &GroundingSource) -> Option<String> {
    src.uri
        .as_deref()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
}

fn title_or(src: &GroundingSource, fallback: &str) -> String {
    src.title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn place(src: &GroundingSource) -> Option<MapResult> {
    Some(MapResult {
        uri: usable_uri(src)?,
        title: title_or(src, DEFAULT_PLACE_TITLE),
    })
}

fn citation(src: &GroundingSource) -> Option<WebCitation> {
    Some(WebCitation {
        uri: usable_uri(src)?,
        title: title_or(src, DEFAULT_CITATION_TITLE),
    })
}

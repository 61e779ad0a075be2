//! Fallback collaborator for section resolution.
//!
//! The resolver only sees [`SectionFallback`]. The LLM-backed
//! implementation sends the heading catalog and the unresolved titles and
//! parses back a best-effort section list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BookIndexError, Result};
use crate::tree::{HeadingRecord, UnresolvedEntry};

use super::{LlmClient, Prompts};

/// Everything the fallback gets to see.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackRequest {
    pub headings: Vec<HeadingRecord>,
    pub unresolved: Vec<UnresolvedEntry>,
}

/// One section suggested by the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSection {
    pub title: String,
    #[serde(default)]
    pub depth: Option<u8>,
    /// Approximate internal page.
    #[serde(default)]
    pub page: Option<u32>,
}

#[async_trait]
pub trait SectionFallback: Send + Sync {
    async fn resolve_fallback(&self, request: &FallbackRequest) -> Result<Vec<FallbackSection>>;
}

/// Fallback backed by an OpenAI-compatible chat endpoint.
pub struct LlmFallback {
    client: LlmClient,
}

impl LlmFallback {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SectionFallback for LlmFallback {
    async fn resolve_fallback(&self, request: &FallbackRequest) -> Result<Vec<FallbackSection>> {
        if request.headings.is_empty() && request.unresolved.is_empty() {
            return Ok(Vec::new());
        }
        log::info!(
            "asking LLM to infer sections from {} headings ({} unresolved)",
            request.headings.len(),
            request.unresolved.len()
        );
        let user = Prompts::section_inference_user(&request.headings, &request.unresolved);
        let response = self.client.complete(Some(Prompts::section_inference()), &user).await?;
        parse_sections(&response)
    }
}

/// Parse a JSON array of `{title, depth?, page?}`, tolerating a fenced
/// code block around it and numbers sent as strings.
pub fn parse_sections(response: &str) -> Result<Vec<FallbackSection>> {
    let mut text = response.trim();
    if text.contains("```") {
        if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
            if end > start {
                text = &text[start..=end];
            }
        }
    }

    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        return Err(BookIndexError::LlmParse("expected a JSON array of sections".to_string()));
    };

    let sections = items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.trim();
            if title.chars().count() < 2 {
                return None;
            }
            let depth = item.get("depth").and_then(as_u64).map(|d| d.clamp(1, 6) as u8);
            let page = item.get("page").and_then(as_u64).and_then(|p| u32::try_from(p).ok());
            Some(FallbackSection {
                title: title.to_string(),
                depth,
                page,
            })
        })
        .collect();
    Ok(sections)
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fallback that never answers; used when no LLM is configured.
pub struct NoFallback;

#[async_trait]
impl SectionFallback for NoFallback {
    async fn resolve_fallback(&self, _request: &FallbackRequest) -> Result<Vec<FallbackSection>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_response() {
        let response = "Here you go:\n```json\n[{\"title\": \"It's Only A Game\", \"depth\": 1, \"page\": 14},\n {\"title\": \"Getting Started\", \"depth\": \"2\"}]\n```";
        let sections = parse_sections(response).unwrap();
        assert_eq!(
            sections,
            vec![
                FallbackSection {
                    title: "It's Only A Game".into(),
                    depth: Some(1),
                    page: Some(14)
                },
                FallbackSection {
                    title: "Getting Started".into(),
                    depth: Some(2),
                    page: None
                },
            ]
        );
    }

    #[test]
    fn test_parse_skips_bad_items() {
        let sections = parse_sections(r#"[{"title": "x"}, {"depth": 1}, "text", {"title": "Valid", "depth": 9}]"#).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].depth, Some(6));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(parse_sections(r#"{"title": "x"}"#), Err(BookIndexError::LlmParse(_))));
        assert!(parse_sections("not json").is_err());
    }

    #[tokio::test]
    async fn test_no_fallback_is_empty() {
        let sections = NoFallback.resolve_fallback(&FallbackRequest::default()).await.unwrap();
        assert!(sections.is_empty());
    }
}

//! `generateContent` response envelope.
//!
//! The API has shipped inline data as both `inlineData { mimeType }` and
//! `inline_data { mime_type }`. Both shapes are accepted on the wire and
//! folded into one [`Part`] as soon as the body is parsed.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBlob {
    pub data: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub text: Option<String>,
    pub inline: Option<InlineBlob>,
}

/// All parts of all candidates, in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationEnvelope {
    pub parts: Vec<Part>,
}

impl GenerationEnvelope {
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        let wire: WireResponse = serde_json::from_str(body)?;
        Ok(wire.into())
    }

    /// First non-blank text part, trimmed.
    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .map(str::trim)
            .find(|text| !text.is_empty())
    }

    pub fn first_inline(&self) -> Option<&InlineBlob> {
        self.parts
            .iter()
            .filter_map(|part| part.inline.as_ref())
            .find(|blob| !blob.data.is_empty())
    }

    /// All text parts joined, cut to `max_chars` characters.
    pub fn text_excerpt(&self, max_chars: usize) -> String {
        let joined = self
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        truncate_chars(&joined, max_chars)
    }
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[derive(Debug, Default, Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Default, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Debug, Default, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData")]
    inline_camel: Option<CamelInline>,
    #[serde(default, rename = "inline_data")]
    inline_snake: Option<SnakeInline>,
}

#[derive(Debug, Deserialize)]
struct CamelInline {
    #[serde(default)]
    data: String,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnakeInline {
    #[serde(default)]
    data: String,
    #[serde(default)]
    mime_type: Option<String>,
}

impl From<CamelInline> for InlineBlob {
    fn from(wire: CamelInline) -> Self {
        Self {
            data: wire.data,
            mime_type: wire.mime_type,
        }
    }
}

impl From<SnakeInline> for InlineBlob {
    fn from(wire: SnakeInline) -> Self {
        Self {
            data: wire.data,
            mime_type: wire.mime_type,
        }
    }
}

impl From<WirePart> for Part {
    fn from(wire: WirePart) -> Self {
        let inline = wire
            .inline_camel
            .map(InlineBlob::from)
            .filter(|blob| !blob.data.is_empty())
            .or_else(|| wire.inline_snake.map(InlineBlob::from));
        Self {
            text: wire.text,
            inline,
        }
    }
}

impl From<WireResponse> for GenerationEnvelope {
    fn from(wire: WireResponse) -> Self {
        let parts = wire
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(Part::from)
            .collect();
        Self { parts }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn camel_and_snake_inline_data_normalize_to_one_shape() -> anyhow::Result<()> {
        let camel = json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/jpeg", "data": "AAAA"}}
            ]}}]
        });
        let snake = json!({
            "candidates": [{"content": {"parts": [
                {"inline_data": {"mime_type": "image/jpeg", "data": "AAAA"}}
            ]}}]
        });
        let a = GenerationEnvelope::parse(&camel.to_string())?;
        let b = GenerationEnvelope::parse(&snake.to_string())?;
        assert_eq!(a, b);
        let blob = a.first_inline().cloned();
        assert_eq!(
            blob,
            Some(InlineBlob {
                data: "AAAA".to_string(),
                mime_type: Some("image/jpeg".to_string()),
            })
        );
        Ok(())
    }

    #[test]
    fn first_text_skips_blank_parts_and_trims() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [
                {"content": {"parts": [{"text": "   "}, {"text": "\n 안녕하세요. \n"}]}},
                {"content": {"parts": [{"text": "second"}]}}
            ]
        });
        let envelope = GenerationEnvelope::parse(&body.to_string())?;
        assert_eq!(envelope.first_text(), Some("안녕하세요."));
        assert_eq!(envelope.first_inline(), None);
        Ok(())
    }

    #[test]
    fn empty_or_blocked_responses_have_no_payload() -> anyhow::Result<()> {
        let blocked = json!({
            "candidates": [{"finishReason": "SAFETY"}],
            "promptFeedback": {"blockReason": "SAFETY"}
        });
        let envelope = GenerationEnvelope::parse(&blocked.to_string())?;
        assert!(envelope.parts.is_empty());
        assert_eq!(envelope.first_text(), None);

        let bare = GenerationEnvelope::parse("{}")?;
        assert_eq!(bare, GenerationEnvelope::default());
        Ok(())
    }

    #[test]
    fn text_excerpt_is_truncated() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "abcdefghij"}, {"text": "klm"}]}}]
        });
        let envelope = GenerationEnvelope::parse(&body.to_string())?;
        assert_eq!(envelope.text_excerpt(100), "abcdefghij klm");
        assert_eq!(envelope.text_excerpt(4), "abcd…");
        Ok(())
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(GenerationEnvelope::parse("<html>").is_err());
    }
}

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use metascribe_contracts::markers::MetaAction;
use metascribe_contracts::settings::{Settings, DEFAULT_REQUEST_TIMEOUT_S};
use metascribe_contracts::tone::ToneContext;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};

use crate::diagnostics::{DiagnosticsReporter, FailureReport};
use crate::envelope::{truncate_chars, GenerationEnvelope};
use crate::error::GenerationError;

pub const TEXT_OPERATION: &str = "text generation";
pub const IMAGE_OPERATION: &str = "image generation";

const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_MAX_CHARS: usize = 512;
const MISSING_IMAGE_EXCERPT_CHARS: usize = 200;
const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Remote content generation used by the document rewriter.
pub trait ContentGenerator {
    /// Returns the generated passage, or an empty string when the service
    /// answered without usable text.
    fn generate_text(
        &self,
        action: &MetaAction,
        tone: &ToneContext,
        writing_profile: &str,
    ) -> Result<String, GenerationError>;

    fn generate_image(&self, instruction: &str) -> Result<ImagePayload, GenerationError>;
}

/// Gemini `generateContent` client. One attempt per call.
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    text_model: String,
    image_model: String,
    timeout: Duration,
    http: HttpClient,
    diagnostics: DiagnosticsReporter,
}

impl GeminiClient {
    pub fn new(
        settings: &Settings,
        api_key: impl Into<String>,
        diagnostics: DiagnosticsReporter,
    ) -> Self {
        Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            text_model: settings.text_model.clone(),
            image_model: settings.image_model.clone(),
            timeout: request_timeout(settings.request_timeout_s),
            http: HttpClient::new(),
            diagnostics,
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(
        &self,
        operation: &str,
        model: &str,
        payload: &Value,
    ) -> Result<GenerationEnvelope, GenerationError> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let message = format!("request to {endpoint} failed: {err}");
                self.diagnostics.report(&FailureReport {
                    raw_body: Some(message.clone()),
                    ..FailureReport::new(operation)
                });
                return Err(GenerationError::transport(operation, None, message));
            }
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => {
                let message = format!("response body read failed: {err}");
                self.diagnostics.report(&FailureReport {
                    status: Some(status),
                    retry_after,
                    raw_body: Some(message.clone()),
                    ..FailureReport::new(operation)
                });
                return Err(GenerationError::transport(operation, Some(status), message));
            }
        };

        interpret_response(operation, status, retry_after, &body, &self.diagnostics)
    }
}

impl ContentGenerator for GeminiClient {
    fn generate_text(
        &self,
        action: &MetaAction,
        tone: &ToneContext,
        writing_profile: &str,
    ) -> Result<String, GenerationError> {
        let prompt = build_text_prompt(action, tone, writing_profile);
        let envelope = self.post(TEXT_OPERATION, &self.text_model, &text_request(&prompt))?;
        Ok(envelope.first_text().unwrap_or_default().to_string())
    }

    fn generate_image(&self, instruction: &str) -> Result<ImagePayload, GenerationError> {
        let prompt = build_image_prompt(instruction);
        let envelope = self.post(IMAGE_OPERATION, &self.image_model, &image_request(&prompt))?;
        decode_image_payload(&envelope)
    }
}

/// Non-positive or unrepresentable values fall back to the default timeout.
fn request_timeout(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|timeout| !timeout.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S))
}

/// Turns a raw HTTP exchange into an envelope, reporting every failure to
/// `diagnostics` before returning it.
pub fn interpret_response(
    operation: &str,
    status: u16,
    retry_after: Option<String>,
    body: &str,
    diagnostics: &DiagnosticsReporter,
) -> Result<GenerationEnvelope, GenerationError> {
    if !(200..300).contains(&status) {
        diagnostics.report(&FailureReport {
            operation: operation.to_string(),
            status: Some(status),
            retry_after,
            raw_body: Some(body.to_string()),
            payload: serde_json::from_str::<Value>(body).ok(),
        });
        return Err(GenerationError::transport(
            operation,
            Some(status),
            truncate_chars(body, ERROR_BODY_MAX_CHARS),
        ));
    }

    GenerationEnvelope::parse(body).map_err(|err| {
        diagnostics.report(&FailureReport {
            operation: operation.to_string(),
            status: Some(status),
            retry_after,
            raw_body: Some(body.to_string()),
            payload: None,
        });
        GenerationError::transport(
            operation,
            Some(status),
            format!("invalid JSON response: {err}"),
        )
    })
}

pub fn decode_image_payload(envelope: &GenerationEnvelope) -> Result<ImagePayload, GenerationError> {
    let Some(blob) = envelope.first_inline() else {
        return Err(GenerationError::MissingPayload {
            excerpt: envelope.text_excerpt(MISSING_IMAGE_EXCERPT_CHARS),
        });
    };
    let bytes = BASE64
        .decode(blob.data.trim().as_bytes())
        .map_err(|err| GenerationError::Decode {
            message: err.to_string(),
        })?;
    let mime_type = blob
        .mime_type
        .as_deref()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string();
    Ok(ImagePayload { bytes, mime_type })
}

pub fn build_text_prompt(action: &MetaAction, tone: &ToneContext, writing_profile: &str) -> String {
    let preceding = if tone.excerpt.is_empty() {
        "(none)"
    } else {
        tone.excerpt.as_str()
    };
    let profile = writing_profile.trim();
    format!(
        "You write a passage that is inserted directly into the user's note in place of an \
action marker.\n\
Rules:\n\
- Keep proper nouns (people, places, brands, titles) exactly as written.\n\
- Respond only in the language of the note and the instruction. No translation notes.\n\
- Stay on the topic of the instruction. Do not add greetings or commentary.\n\
- Mirror the sentence endings and rhythm of the preceding text: {style}.\n\
- Return only the passage, without quotes, headings or code fences.\n\
\n\
Writing profile: {profile}\n\
Preceding text: {preceding}\n\
Action: {action_type}\n\
Instruction: {instruction}",
        style = tone.category.descriptor(),
        action_type = action.action_type,
        instruction = action.instruction,
    )
}

pub fn build_image_prompt(instruction: &str) -> String {
    format!(
        "Create one illustration for a personal note. Subject: {}. \
Render it as a clean, detailed image without any text, captions or watermarks.",
        instruction.trim()
    )
}

fn text_request(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
    })
}

fn image_request(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
        },
    })
}

#[cfg(test)]
mod tests {
    use metascribe_contracts::events::EventLog;
    use metascribe_contracts::markers::parse_meta_actions;
    use metascribe_contracts::settings::{load_settings_with_base, SettingsPaths};
    use metascribe_contracts::tone::{infer_tone, ToneCategory};

    use super::*;

    fn read_rows(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    #[test]
    fn text_prompt_is_deterministic_and_embeds_context() {
        let action = parse_meta_actions("@(continue)[카페 이야기를 이어서]")
            .into_iter()
            .next()
            .expect("marker");
        let tone = infer_tone("커피가 정말 좋아요.");
        assert_eq!(tone.category, ToneCategory::CasualPolite);

        let prompt = build_text_prompt(&action, &tone, "  warm ");
        assert_eq!(prompt, build_text_prompt(&action, &tone, "warm"));
        assert!(prompt.contains("Keep proper nouns"));
        assert!(prompt.contains(ToneCategory::CasualPolite.descriptor()));
        assert!(prompt.contains("Writing profile: warm\n"));
        assert!(prompt.contains("Preceding text: 커피가 정말 좋아요\n"));
        assert!(prompt.ends_with("Instruction: 카페 이야기를 이어서"));

        let empty = build_text_prompt(&action, &ToneContext::insufficient(), "warm");
        assert!(empty.contains("Preceding text: (none)"));
    }

    #[test]
    fn request_bodies_follow_generate_content_shape() {
        let body = text_request("hello");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert!(body.get("generationConfig").is_none());

        let image = image_request(&build_image_prompt(" a red fox "));
        assert!(image["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .contains("Subject: a red fox."));
        assert_eq!(
            image["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = load_settings_with_base(
            &SettingsPaths::for_root(temp.path()),
            Some("http://localhost:1/v1beta/".to_string()),
        )?;
        let client = GeminiClient::new(&settings, "k", DiagnosticsReporter::disabled());
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash"),
            "http://localhost:1/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model(" models/custom "),
            "http://localhost:1/v1beta/models/custom:generateContent"
        );
        Ok(())
    }

    #[test]
    fn oversized_or_invalid_timeouts_fall_back_to_default() -> anyhow::Result<()> {
        let default = Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S);
        assert_eq!(request_timeout(1e300), default);
        assert_eq!(request_timeout(f64::INFINITY), default);
        assert_eq!(request_timeout(f64::NAN), default);
        assert_eq!(request_timeout(-5.0), default);
        assert_eq!(request_timeout(0.0), default);
        assert_eq!(request_timeout(12.5), Duration::from_millis(12_500));

        let temp = tempfile::tempdir()?;
        let mut settings =
            load_settings_with_base(&SettingsPaths::for_root(temp.path()), None)?;
        settings.request_timeout_s = 1e300;
        let client = GeminiClient::new(&settings, "k", DiagnosticsReporter::disabled());
        assert_eq!(client.timeout, default);
        Ok(())
    }

    #[test]
    fn unreachable_endpoint_is_logged_then_raised() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log_path = temp.path().join("diag.jsonl");
        let settings = load_settings_with_base(
            &SettingsPaths::for_root(temp.path()),
            Some("http://127.0.0.1:1/v1beta".to_string()),
        )?;
        let client = GeminiClient::new(
            &settings,
            "k",
            DiagnosticsReporter::new(EventLog::new(&log_path, "s")),
        );
        let action = parse_meta_actions("@(t)[x]").into_iter().next().expect("marker");

        let err = client
            .generate_text(&action, &ToneContext::insufficient(), "profile")
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, GenerationError::Transport { status: None, .. }));
        assert!(err.user_message().contains("Could not reach"));

        let rows = read_rows(&log_path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], "generation_failed");
        assert_eq!(rows[0]["operation"], TEXT_OPERATION);
        assert_eq!(rows[0]["retry_after"], "");
        assert!(rows[0]["status"].is_null());
        assert!(rows[0]["body"]
            .as_str()
            .unwrap_or_default()
            .contains("127.0.0.1:1"));
        Ok(())
    }

    #[test]
    fn non_success_status_is_logged_then_raised() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log_path = temp.path().join("diag.jsonl");
        let diagnostics = DiagnosticsReporter::new(EventLog::new(&log_path, "s"));

        let body = r#"{"error":{"code":429,"message":"Resource exhausted"}}"#;
        let err = interpret_response(TEXT_OPERATION, 429, Some("30".to_string()), body, &diagnostics)
            .expect_err("429 must fail");
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("Resource exhausted"));

        let rows = read_rows(&log_path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["operation"], TEXT_OPERATION);
        assert_eq!(rows[0]["status"], 429);
        assert_eq!(rows[0]["retry_after"], "30");
        assert_eq!(rows[0]["body"], body);
        Ok(())
    }

    #[test]
    fn invalid_json_on_success_is_a_transport_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log_path = temp.path().join("diag.jsonl");
        let diagnostics = DiagnosticsReporter::new(EventLog::new(&log_path, "s"));

        let err = interpret_response(IMAGE_OPERATION, 200, None, "<html>", &diagnostics)
            .expect_err("html is not an envelope");
        assert!(matches!(err, GenerationError::Transport { status: Some(200), .. }));
        assert_eq!(read_rows(&log_path).len(), 1);
        Ok(())
    }

    #[test]
    fn successful_text_response_extracts_first_text() -> anyhow::Result<()> {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "  결과예요. "}]}}]});
        let envelope = interpret_response(
            TEXT_OPERATION,
            200,
            None,
            &body.to_string(),
            &DiagnosticsReporter::disabled(),
        )?;
        assert_eq!(envelope.first_text(), Some("결과예요."));
        Ok(())
    }

    #[test]
    fn image_payload_decodes_either_field_spelling() -> anyhow::Result<()> {
        let encoded = BASE64.encode(b"\x89PNG-bytes");
        for body in [
            json!({"candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/webp", "data": encoded}}
            ]}}]}),
            json!({"candidates": [{"content": {"parts": [
                {"inline_data": {"mime_type": "image/webp", "data": encoded}}
            ]}}]}),
        ] {
            let envelope = GenerationEnvelope::parse(&body.to_string())?;
            let payload = decode_image_payload(&envelope)?;
            assert_eq!(payload.bytes, b"\x89PNG-bytes".to_vec());
            assert_eq!(payload.mime_type, "image/webp");
        }
        Ok(())
    }

    #[test]
    fn missing_inline_data_carries_text_excerpt() -> anyhow::Result<()> {
        let explanation = "I can't create that image. ".repeat(20);
        let body = json!({"candidates": [{"content": {"parts": [{"text": explanation}]}}]});
        let envelope = GenerationEnvelope::parse(&body.to_string())?;
        match decode_image_payload(&envelope) {
            Err(GenerationError::MissingPayload { excerpt }) => {
                assert!(excerpt.starts_with("I can't create that image."));
                assert_eq!(excerpt.chars().count(), MISSING_IMAGE_EXCERPT_CHARS + 1);
            }
            other => panic!("expected missing payload, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_mime_defaults_to_png_and_bad_base64_fails() -> anyhow::Result<()> {
        let body = json!({"candidates": [{"content": {"parts": [
            {"inlineData": {"data": BASE64.encode(b"x")}}
        ]}}]});
        let payload = decode_image_payload(&GenerationEnvelope::parse(&body.to_string())?)?;
        assert_eq!(payload.mime_type, "image/png");

        let bad = json!({"candidates": [{"content": {"parts": [
            {"inlineData": {"data": "%%%not-base64"}}
        ]}}]});
        assert!(matches!(
            decode_image_payload(&GenerationEnvelope::parse(&bad.to_string())?),
            Err(GenerationError::Decode { .. })
        ));
        Ok(())
    }
}

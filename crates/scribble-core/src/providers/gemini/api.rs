//! Gemini API key client.

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use super::sse::GeminiSseParser;
use crate::providers::shared::{USER_AGENT, resolve_base_url};
use crate::providers::{
    FragmentStream, GenerationApi, GenerationError, GenerationErrorKind, GenerationResult,
    HistoryTurn, ImageReply, ImageRequest, TextRequest,
};
use crate::sessions::InlineImage;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable overriding the API endpoint.
pub const BASE_URL_ENV_VAR: &str = "GEMINI_BASE_URL";

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GeminiConfig {
    /// Creates a config, resolving the base URL from env > config > default.
    ///
    /// # Errors
    /// Returns an error if the resolved base URL is malformed.
    pub fn new(api_key: impl Into<String>, config_base_url: Option<&str>) -> Result<Self> {
        let base_url = resolve_base_url(
            config_base_url,
            BASE_URL_ENV_VAR,
            DEFAULT_BASE_URL,
            "Gemini",
        )?;
        Ok(Self {
            api_key: api_key.into(),
            base_url,
        })
    }
}

/// Gemini client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Value,
    ) -> GenerationResult<reqwest::Response> {
        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GenerationError::http_status(status.as_u16(), &error_body));
        }
        Ok(response)
    }
}

impl GenerationApi for GeminiClient {
    async fn stream_text(&self, request: TextRequest) -> GenerationResult<FragmentStream> {
        let body = build_text_request(&request);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, request.model
        );
        debug!(model = %request.model, turns = request.history.len(), "streaming text request");

        let headers = build_headers(&self.config.api_key)?;
        let response = self.post(&url, headers, &body).await?;
        Ok(GeminiSseParser::new(response.bytes_stream()).boxed())
    }

    async fn generate_image(&self, request: ImageRequest) -> GenerationResult<ImageReply> {
        let body = build_image_request(&request);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, request.model
        );
        debug!(model = %request.model, "image request");

        let headers = build_json_headers(&self.config.api_key)?;
        let response = self.post(&url, headers, &body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let value: Value = serde_json::from_str(&text).map_err(|err| {
            GenerationError::new(
                GenerationErrorKind::Other,
                format!("Failed to parse Gemini image response JSON: {err}"),
            )
        })?;
        Ok(parse_image_response(&value))
    }
}

/// Classifies a reqwest error into a `GenerationError`.
fn classify_reqwest_error(e: &reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::classified(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        GenerationError::classified(format!("Connection failed: {e}"))
    } else {
        GenerationError::classified(format!("Network error: {e}"))
    }
}

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn build_contents(history: &[HistoryTurn], prompt: &str) -> Vec<Value> {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "parts": [text_part(&turn.text)],
            })
        })
        .collect();
    contents.push(json!({
        "role": "user",
        "parts": [text_part(prompt)],
    }));
    contents
}

fn build_text_request(request: &TextRequest) -> Value {
    let mut body = json!({
        "contents": build_contents(&request.history, &request.prompt),
    });
    if !request.system_instruction.trim().is_empty() {
        body["systemInstruction"] = json!({
            "parts": [text_part(&request.system_instruction)],
        });
    }
    body
}

fn build_image_request(request: &ImageRequest) -> Value {
    let mut generation_config = json!({
        "responseModalities": ["TEXT", "IMAGE"]
    });

    if let Some(aspect_ratio) = request.aspect_ratio.as_deref()
        && !aspect_ratio.trim().is_empty()
    {
        generation_config["imageConfig"] = json!({ "aspectRatio": aspect_ratio });
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [text_part(&request.prompt)],
        }],
        "generationConfig": generation_config,
    })
}

/// Collects text parts and the last inline image of the first candidate.
fn parse_image_response(value: &Value) -> ImageReply {
    let payload = value.get("response").unwrap_or(value);
    let mut reply = ImageReply::default();

    let Some(parts) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
    else {
        return reply;
    };

    for part in parts {
        if let Some(inline_data) = part.get("inlineData").or_else(|| part.get("inline_data")) {
            let Some(data) = inline_data.get("data").and_then(Value::as_str) else {
                continue;
            };
            let mime_type = inline_data
                .get("mimeType")
                .or_else(|| inline_data.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            reply.image = Some(InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            });
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            reply.text.push_str(text);
        }
    }

    reply
}

/// Builds request headers.
///
/// A key that cannot travel in a header is rejected as an invalid credential
/// before anything is sent.
fn build_headers(api_key: &str) -> GenerationResult<HeaderMap> {
    let key = HeaderValue::from_str(api_key).map_err(|_| {
        GenerationError::new(
            GenerationErrorKind::InvalidCredential,
            "API key contains characters not allowed in a header",
        )
    })?;

    let mut headers = HeaderMap::new();
    headers.insert("x-goog-api-key", key);
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    Ok(headers)
}

fn build_json_headers(api_key: &str) -> GenerationResult<HeaderMap> {
    let mut headers = build_headers(api_key)?;
    headers.insert("accept", HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sessions::Role;

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
        })
    }

    fn text_request() -> TextRequest {
        TextRequest {
            model: "gemini-3-flash-preview".to_string(),
            system_instruction: "be silly".to_string(),
            history: vec![HistoryTurn {
                role: Role::Model,
                text: "meow!".to_string(),
            }],
            prompt: "draw me a cat".to_string(),
        }
    }

    #[test]
    fn text_request_carries_history_prompt_and_system_instruction() {
        let body = build_text_request(&text_request());

        assert_eq!(body["contents"][0]["role"], json!("model"));
        assert_eq!(body["contents"][0]["parts"][0]["text"], json!("meow!"));
        assert_eq!(body["contents"][1]["role"], json!("user"));
        assert_eq!(body["contents"][1]["parts"][0]["text"], json!("draw me a cat"));
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            json!("be silly")
        );
    }

    #[test]
    fn image_request_sets_modalities_and_aspect_ratio() {
        let body = build_image_request(&ImageRequest {
            model: "gemini-2.5-flash-image".to_string(),
            prompt: "a red fox".to_string(),
            aspect_ratio: Some("1:1".to_string()),
        });

        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        assert_eq!(
            body["generationConfig"]["imageConfig"]["aspectRatio"],
            json!("1:1")
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], json!("a red fox"));
    }

    #[test]
    fn parse_image_response_extracts_text_and_last_image() {
        let value = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here " },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                        { "text": "it is" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "AQID" } }
                    ]
                }
            }]
        });

        let reply = parse_image_response(&value);
        assert_eq!(reply.text, "here it is");
        assert_eq!(
            reply.image,
            Some(InlineImage {
                mime_type: "image/jpeg".to_string(),
                data: "AQID".to_string(),
            })
        );
    }

    #[test]
    fn parse_image_response_without_candidates_is_empty() {
        let reply = parse_image_response(&json!({ "candidates": [] }));
        assert_eq!(reply, ImageReply::default());
    }

    #[tokio::test]
    async fn stream_text_yields_fragments_from_sse() {
        let server = MockServer::start().await;
        let body = [
            r#"data: {"candidates":[{"content":{"parts":[{"text":"hi"}],"role":"model"}}]}"#,
            r#"data: {"candidates":[{"content":{"parts":[{"text":" there"}],"role":"model"},"finishReason":"STOP"}]}"#,
        ]
        .join("\n\n")
            + "\n\n";

        Mock::given(method("POST"))
            .and(path(
                "/models/gemini-3-flash-preview:streamGenerateContent",
            ))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .stream_text(text_request())
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["hi", " there"]);
    }

    #[tokio::test]
    async fn quota_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
            ))
            .mount(&server)
            .await;

        let Err(err) = client_for(&server).stream_text(text_request()).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind, GenerationErrorKind::QuotaExhausted);
    }

    #[tokio::test]
    async fn unsendable_api_key_is_an_invalid_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = GeminiClient::new(GeminiConfig {
            api_key: "bad\nkey".to_string(),
            base_url: server.uri(),
        });

        let Err(err) = client.stream_text(text_request()).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind, GenerationErrorKind::InvalidCredential);
        assert_eq!(
            err.apology(),
            "uh oh, your token seems wrong. double check it in settings!"
        );

        let err = client
            .generate_image(ImageRequest {
                model: "gemini-2.5-flash-image".to_string(),
                prompt: "cat".to_string(),
                aspect_ratio: Some("1:1".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::InvalidCredential);
    }

    #[tokio::test]
    async fn generate_image_parses_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-image:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "inlineData": { "mimeType": "image/png", "data": "AQID" } }]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .generate_image(ImageRequest {
                model: "gemini-2.5-flash-image".to_string(),
                prompt: "cat".to_string(),
                aspect_ratio: Some("1:1".to_string()),
            })
            .await
            .unwrap();

        assert!(reply.text.is_empty());
        assert_eq!(reply.image.unwrap().decode().unwrap(), vec![1, 2, 3]);
    }
}

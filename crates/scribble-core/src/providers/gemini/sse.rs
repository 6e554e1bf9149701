//! Gemini SSE stream parser.
//!
//! Turns `streamGenerateContent?alt=sse` events into text fragments. Each
//! event's non-thought text parts are joined into one fragment; fragments are
//! yielded exactly as they arrive.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use serde_json::Value;

use crate::providers::{GenerationError, GenerationErrorKind, GenerationResult};

/// Gemini SSE stream parser.
pub struct GeminiSseParser<S> {
    inner: EventStream<S>,
    pending: VecDeque<GenerationResult<String>>,
    finished: bool,
}

impl<S> GeminiSseParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn handle_event_data(&mut self, data: &str) -> GenerationResult<()> {
        let trimmed = data.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return Ok(());
        }

        let value = serde_json::from_str::<Value>(trimmed).map_err(|err| {
            GenerationError::new(
                GenerationErrorKind::Other,
                format!("Failed to parse SSE JSON: {err}"),
            )
        })?;
        self.handle_chunk(&value);
        Ok(())
    }

    fn handle_chunk(&mut self, value: &Value) {
        let payload = value.get("response").unwrap_or(value);

        if let Some(error) = value.get("error").or_else(|| payload.get("error")) {
            let status = error
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("error");
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            self.pending
                .push_back(Err(GenerationError::classified(format!("{status}: {message}"))));
            self.finished = true;
            return;
        }

        let Some(parts) = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
        else {
            return;
        };

        let mut fragment = String::new();
        for part in parts {
            let is_thought = part
                .get("thought")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !is_thought && let Some(text) = part.get("text").and_then(Value::as_str) {
                fragment.push_str(text);
            }
        }

        if !fragment.is_empty() {
            self.pending.push_back(Ok(fragment));
        }
    }
}

impl<S, E> Stream for GeminiSseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = GenerationResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if let Err(err) = self.handle_event_data(&event.data) {
                        self.finished = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(GenerationError::classified(format!(
                        "SSE stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use super::*;

    fn parser_over(
        chunks: Vec<&'static str>,
    ) -> GeminiSseParser<impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin> {
        let byte_stream = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())))
                .collect::<Vec<_>>(),
        );
        GeminiSseParser::new(byte_stream)
    }

    fn empty_parser() -> GeminiSseParser<impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin>
    {
        parser_over(Vec::new())
    }

    #[tokio::test]
    async fn yields_fragments_in_arrival_order() {
        let parser = parser_over(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"meow\"}],\"role\":\"model\"}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" meow\"}],\"role\":\"model\"}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}]}\n\n",
        ]);

        let fragments: Vec<String> = parser.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["meow", " meow", "!"]);
    }

    #[tokio::test]
    async fn events_split_across_byte_chunks_are_reassembled() {
        let parser = parser_over(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"te",
            "xt\":\"hello\"}]}}]}\n\n",
        ]);

        let fragments: Vec<String> = parser.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["hello"]);
    }

    #[tokio::test]
    async fn repeated_fragments_are_not_deduplicated() {
        let parser = parser_over(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ha\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ha\"}]}}]}\n\n",
        ]);

        let fragments: Vec<String> = parser.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["ha", "ha"]);
    }

    #[test]
    fn thought_parts_are_skipped_and_text_parts_joined() {
        let mut parser = empty_parser();
        parser.handle_chunk(&json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "thought": true, "text": "pondering..." },
                        { "text": "first " },
                        { "text": "second" }
                    ]
                }
            }]
        }));

        assert_eq!(parser.pending.len(), 1);
        assert_eq!(
            parser.pending.pop_front().unwrap().unwrap(),
            "first second"
        );
    }

    #[test]
    fn chunk_without_text_emits_nothing() {
        let mut parser = empty_parser();
        parser.handle_chunk(&json!({
            "candidates": [{ "finishReason": "STOP", "content": { "parts": [] } }],
            "usageMetadata": { "promptTokenCount": 10 }
        }));
        assert!(parser.pending.is_empty());
    }

    #[test]
    fn error_chunk_is_classified_and_ends_stream() {
        let mut parser = empty_parser();
        parser.handle_chunk(&json!({
            "error": {
                "code": 429,
                "status": "RESOURCE_EXHAUSTED",
                "message": "Resource has been exhausted"
            }
        }));

        let err = parser.pending.pop_front().unwrap().unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::QuotaExhausted);
        assert!(parser.finished);
    }

    #[tokio::test]
    async fn invalid_json_surfaces_error() {
        let mut parser = parser_over(vec!["data: {not json}\n\n"]);
        let item = parser.next().await.unwrap();
        assert!(item.unwrap_err().message.contains("Failed to parse SSE JSON"));
        assert!(parser.next().await.is_none());
    }
}

//! Anthropic Messages API client
//!
//! Streams assistant replies over SSE. The HTTP request is sent eagerly so a
//! bad credential or rejected request surfaces before any fragment is
//! delivered; a reader task then decodes `content_block_delta` events into
//! plain text fragments on an mpsc channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{FragmentReceiver, ModelClient, ModelError, Turn, TurnRole};

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const MODEL_ENV: &str = "LANTERN_MODEL";

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 8192;

const SYSTEM_PROMPT: &str = "You are a coding assistant with access to a \
server-side code execution tool. When you want to call out a key observation \
or takeaway, wrap it in literal <insight> and </insight> tags; the client \
renders these as highlighted callouts. Use the tags sparingly and never nest \
them.";

/// Production [`ModelClient`] backed by the Anthropic Messages API.
///
/// Construction never fails: a missing `ANTHROPIC_API_KEY` is reported by
/// `open_stream` as [`ModelError::MissingCredential`], so the process can
/// start without a credential and each turn fails fast instead.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    memory: Arc<Mutex<Vec<Turn>>>,
}

impl AnthropicClient {
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let model = std::env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: ANTHROPIC_API_URL.to_string(),
            memory: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Override the API endpoint (local proxies, recorded fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn wire_messages(memory: &[Turn]) -> Vec<WireMessage> {
        memory
            .iter()
            .map(|turn| WireMessage {
                role: match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                content: turn.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn open_stream(&self, user_input: &str) -> Result<FragmentReceiver, ModelError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(ModelError::MissingCredential)?;

        let messages = {
            let mut memory = self.memory.lock().expect("memory lock poisoned");
            memory.push(Turn::user(user_input));
            Self::wire_messages(&memory)
        };

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages,
            stream: true,
        };

        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_api_error(status.as_u16(), &body));
        }

        let (tx, rx) = mpsc::channel(256);
        let memory = self.memory.clone();
        tokio::spawn(async move {
            read_sse_stream(response, tx, memory).await;
        });

        Ok(rx)
    }

    fn memory(&self) -> Vec<Turn> {
        self.memory.lock().expect("memory lock poisoned").clone()
    }

    fn set_memory(&self, turns: Vec<Turn>) {
        *self.memory.lock().expect("memory lock poisoned") = turns;
    }
}

/// Decode the SSE byte stream, forwarding text deltas as fragments. On a
/// normal end the accumulated assistant text is folded into `memory`; an
/// aborted stream leaves memory without the assistant turn (the next turn
/// reseeds memory from the canonical store anyway).
async fn read_sse_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String, ModelError>>,
    memory: Arc<Mutex<Vec<Turn>>>,
) {
    let mut bytes = response.bytes_stream();
    let mut raw: Vec<u8> = Vec::new();
    let mut buffer = String::new();
    let mut assistant_text = String::new();

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    component = "anthropic",
                    event = "model.stream.transport_error",
                    error = %e,
                    "Model stream failed mid-turn"
                );
                let _ = tx.send(Err(ModelError::Http(e))).await;
                return;
            }
        };
        // Chunk boundaries are byte boundaries, not character boundaries: a
        // multibyte character can arrive half in one chunk, half in the next.
        raw.extend_from_slice(&chunk);
        match take_complete_utf8(&mut raw) {
            Ok(text) => buffer.push_str(&text),
            Err(_) => {
                let _ = tx
                    .send(Err(ModelError::Stream(
                        "stream payload is not valid UTF-8".to_string(),
                    )))
                    .await;
                return;
            }
        }

        while let Some(end) = buffer.find("\n\n") {
            let event = buffer[..end].to_string();
            buffer.drain(..end + 2);

            for line in event.lines() {
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let parsed: StreamEvent = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::Stream(e.to_string()))).await;
                        return;
                    }
                };
                match parsed.event_type.as_str() {
                    "content_block_delta" => {
                        let text = parsed
                            .delta
                            .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
                            .and_then(|d| d.text);
                        if let Some(text) = text {
                            assistant_text.push_str(&text);
                            if tx.send(Ok(text)).await.is_err() {
                                // Receiver dropped (turn aborted); stop reading.
                                return;
                            }
                        }
                    }
                    "error" => {
                        let message = parsed
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "unknown stream error".to_string());
                        let _ = tx.send(Err(ModelError::Stream(message))).await;
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!(
        component = "anthropic",
        event = "model.stream.completed",
        assistant_chars = assistant_text.len(),
    );
    memory
        .lock()
        .expect("memory lock poisoned")
        .push(Turn::assistant(assistant_text));
}

/// Split off the longest complete UTF-8 prefix of `buf`. A character whose
/// trailing bytes have not arrived yet stays in `buf` until they do; bytes
/// that can never complete a character are an error.
fn take_complete_utf8(buf: &mut Vec<u8>) -> Result<String, std::str::Utf8Error> {
    match std::str::from_utf8(buf) {
        Ok(_) => {
            let bytes = std::mem::take(buf);
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) if e.error_len().is_none() => {
            let rest = buf.split_off(e.valid_up_to());
            let bytes = std::mem::replace(buf, rest);
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) => Err(e),
    }
}

fn parse_api_error(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(240).collect());
    ModelError::Api { status, message }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

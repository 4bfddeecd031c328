use crate::capabilities::parse_capability_names;
use crate::error::{AgentSessionError, SessionPhase};
use crate::identifier::redact_url;
use chainflow_protocol::{ContentPart, Message, Role};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of a single agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no socket yet
    Unconnected,
    /// Socket handshake and `initialize` in flight
    Connecting,
    /// Initialized, capabilities not yet listed
    Connected,
    /// Capabilities listed; ready to invoke
    ToolsListed,
    /// A capability call was issued
    Invoking,
    /// A message was sent
    Messaging,
    /// Socket closed
    Closed,
    /// Transport failure; the socket is unusable
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::ToolsListed => "tools-listed",
            SessionState::Invoking => "invoking",
            SessionState::Messaging => "messaging",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Text extracted from an agent reply plus the reply itself
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Concatenated text parts
    pub text: String,
    /// JSON-RPC `result` as received
    pub raw: Value,
}

/// One JSON-RPC session with a remote agent over a WebSocket.
///
/// Dropping the session releases the socket; [`AgentSession::close`] also
/// sends a close frame.
pub struct AgentSession {
    agent_id: String,
    state: SessionState,
    stream: Option<WsStream>,
    next_id: u64,
    tools: Vec<String>,
    listing_timeout: Duration,
    call_timeout: Duration,
}

impl AgentSession {
    /// Create an unconnected session.
    ///
    /// `listing_timeout` bounds the handshake and `tools/list`;
    /// `call_timeout` bounds tool calls and messages.
    pub fn new(agent_id: impl Into<String>, listing_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            agent_id: agent_id.into(),
            state: SessionState::Unconnected,
            stream: None,
            next_id: 1,
            tools: Vec::new(),
            listing_timeout,
            call_timeout,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capability names from the last listing
    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    /// Agent id this session talks to
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Open the socket and run the `initialize` handshake
    pub async fn connect(&mut self, url: &Url) -> Result<(), AgentSessionError> {
        self.expect_state(SessionState::Unconnected, "connect")?;
        self.state = SessionState::Connecting;
        debug!(url = %redact_url(url), "Opening agent session");

        let stream = match timeout(self.listing_timeout, connect_async(url.as_str())).await {
            Err(_) => {
                let message = format!(
                    "connect timed out after {}s",
                    self.listing_timeout.as_secs()
                );
                return Err(self.transport_failure(message));
            }
            Ok(Err(e)) => return Err(self.transport_failure(e.to_string())),
            Ok(Ok((stream, _))) => stream,
        };
        self.stream = Some(stream);

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "chainflow",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let limit = self.listing_timeout;
        self.request(SessionPhase::Initialize, None, "initialize", params, limit)
            .await?;
        self.notify("notifications/initialized").await?;

        self.state = SessionState::Connected;
        Ok(())
    }

    /// Request the capability list and keep the names found in it
    pub async fn list_tools(&mut self) -> Result<Vec<String>, AgentSessionError> {
        self.expect_state(SessionState::Connected, "list tools")?;
        let limit = self.listing_timeout;
        let result = self
            .request(SessionPhase::ListTools, None, "tools/list", json!({}), limit)
            .await?;

        self.tools = parse_capability_names(&result);
        self.state = SessionState::ToolsListed;
        info!(agent_id = %self.agent_id, tools = %self.tools.join(", "), "Available tools");
        Ok(self.tools.clone())
    }

    /// Call a named capability.
    ///
    /// Application-level failures leave the session usable, so a caller may
    /// still fall back to [`AgentSession::send_message`].
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, AgentSessionError> {
        self.expect_state(SessionState::ToolsListed, "call a tool")?;
        self.state = SessionState::Invoking;
        info!(agent_id = %self.agent_id, tool = name, "Calling agent tool");

        let limit = self.call_timeout;
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .request(SessionPhase::CallTool, Some(name), "tools/call", params, limit)
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                if matches!(err, AgentSessionError::Agent { .. }) {
                    self.state = SessionState::ToolsListed;
                }
                return Err(err);
            }
        };

        let text = reply_text(&raw);
        if raw.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            self.state = SessionState::ToolsListed;
            let message = if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            };
            return Err(AgentSessionError::Agent {
                agent_id: self.agent_id.clone(),
                phase: SessionPhase::CallTool,
                tool_name: Some(name.to_string()),
                message,
            });
        }

        Ok(ToolOutput { text, raw })
    }

    /// Send `prompt` as a single user message and collect the reply text
    pub async fn send_message(&mut self, prompt: &str) -> Result<ToolOutput, AgentSessionError> {
        self.expect_state(SessionState::ToolsListed, "send a message")?;
        self.state = SessionState::Messaging;
        info!(
            agent_id = %self.agent_id,
            prompt = %preview(prompt, 50),
            "Sending prompt to agent"
        );

        let message = Message::from_text(Role::User, prompt).with_content_type("text");
        let limit = self.call_timeout;
        let raw = self
            .request(
                SessionPhase::SendMessage,
                None,
                "message/send",
                json!({ "message": message }),
                limit,
            )
            .await?;

        Ok(ToolOutput {
            text: reply_text(&raw),
            raw,
        })
    }

    /// Send a close frame and release the socket. Safe to call in any state.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match timeout(CLOSE_TIMEOUT, stream.close(None)).await {
                Ok(Ok(())) => debug!(agent_id = %self.agent_id, "Agent session closed"),
                Ok(Err(e)) => debug!(agent_id = %self.agent_id, "Close frame failed: {}", e),
                Err(_) => debug!(agent_id = %self.agent_id, "Close frame timed out"),
            }
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
    }

    fn expect_state(
        &self,
        expected: SessionState,
        operation: &'static str,
    ) -> Result<(), AgentSessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AgentSessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn transport_failure(&mut self, message: String) -> AgentSessionError {
        warn!(agent_id = %self.agent_id, "Agent transport failure: {}", message);
        self.state = SessionState::Failed;
        self.stream = None;
        AgentSessionError::Connection {
            agent_id: self.agent_id.clone(),
            message,
        }
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn request(
        &mut self,
        phase: SessionPhase,
        tool_name: Option<&str>,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value, AgentSessionError> {
        let id = self.next_request_id();
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let Some(stream) = self.stream.as_mut() else {
            return Err(AgentSessionError::InvalidState {
                operation: "send a request",
                state: self.state,
            });
        };

        let payload = match timeout(limit, exchange(stream, &body, id)).await {
            Err(_) => {
                let message = format!("{method} timed out after {}s", limit.as_secs());
                return Err(self.transport_failure(message));
            }
            Ok(Err(message)) => return Err(self.transport_failure(message)),
            Ok(Ok(payload)) => payload,
        };

        extract_result(payload).map_err(|message| AgentSessionError::Agent {
            agent_id: self.agent_id.clone(),
            phase,
            tool_name: tool_name.map(str::to_string),
            message,
        })
    }

    async fn notify(&mut self, method: &str) -> Result<(), AgentSessionError> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let Some(stream) = self.stream.as_mut() else {
            return Err(AgentSessionError::InvalidState {
                operation: "send a notification",
                state: self.state,
            });
        };
        let sent = stream.send(WsMessage::Text(body.to_string())).await;
        sent.map_err(|e| self.transport_failure(e.to_string()))
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            debug!(agent_id = %self.agent_id, "Agent session dropped while open; releasing socket");
        }
    }
}

/// Send one request and wait for the frame answering it
async fn exchange(stream: &mut WsStream, body: &Value, request_id: u64) -> Result<Value, String> {
    stream
        .send(WsMessage::Text(body.to_string()))
        .await
        .map_err(|e| format!("failed to send request: {e}"))?;

    loop {
        let payload: Value = match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => serde_json::from_str(&text)
                .map_err(|e| format!("invalid JSON from agent: {e}"))?,
            Some(Ok(WsMessage::Binary(data))) => serde_json::from_slice(&data)
                .map_err(|e| format!("invalid JSON from agent: {e}"))?,
            Some(Ok(WsMessage::Ping(data))) => {
                if let Err(e) = stream.send(WsMessage::Pong(data)).await {
                    debug!("Pong failed: {}", e);
                }
                continue;
            }
            Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => continue,
            Some(Ok(WsMessage::Close(frame))) => {
                return Err(format!(
                    "agent closed the session: {}",
                    frame.map(|f| f.reason.into_owned()).unwrap_or_default()
                ))
            }
            Some(Err(e)) => return Err(format!("websocket error: {e}")),
            None => return Err("agent closed the session unexpectedly".to_string()),
        };

        if matches_request(&payload, request_id) {
            return Ok(payload);
        }
        debug!("Skipping unrelated agent frame: {}", payload);
    }
}

fn matches_request(payload: &Value, request_id: u64) -> bool {
    match payload.get("id") {
        Some(Value::Number(num)) => num.as_u64() == Some(request_id),
        Some(Value::String(text)) => text.parse::<u64>().map_or(false, |id| id == request_id),
        _ => false,
    }
}

fn extract_result(payload: Value) -> Result<Value, String> {
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(message);
    }

    match payload {
        Value::Object(mut map) => Ok(map.remove("result").unwrap_or(Value::Null)),
        other => Ok(other),
    }
}

/// Concatenated text parts of a reply.
///
/// Accepts `{message: {content: {parts}}}`, a bare message, and the
/// `{content: [parts]}` shape tool calls answer with. Anything else is `""`.
fn reply_text(result: &Value) -> String {
    let message = result.get("message").unwrap_or(result);
    let parts = match message.get("content") {
        Some(Value::Array(parts)) => parts.as_slice(),
        Some(content) => content
            .get("parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        None => &[],
    };

    parts
        .iter()
        .cloned()
        .filter_map(|part| ContentPart::from(part).into_text())
        .collect()
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reply_text_reads_message_shapes() {
        let wrapped = json!({"message": {"role": "assistant", "content": {
            "content_type": "text",
            "parts": [{"type": "text", "text": "Sunny"}, {"type": "image"}, {"type": "text", "text": ", 21C"}]
        }}});
        assert_eq!(reply_text(&wrapped), "Sunny, 21C");

        let bare = json!({"role": "assistant", "content": {"content_type": "text", "parts": [{"type": "text", "text": "ok"}]}});
        assert_eq!(reply_text(&bare), "ok");

        let tool = json!({"content": [{"type": "text", "text": "42"}], "isError": false});
        assert_eq!(reply_text(&tool), "42");

        assert_eq!(reply_text(&json!({"status": "done"})), "");
        assert_eq!(reply_text(&Value::Null), "");
    }

    #[test]
    fn extract_result_separates_errors() {
        assert_eq!(
            extract_result(json!({"id": 1, "result": {"tools": []}})),
            Ok(json!({"tools": []}))
        );
        assert_eq!(
            extract_result(json!({"id": 1, "error": {"code": -32601, "message": "Method not found"}})),
            Err("Method not found".to_string())
        );
    }

    #[test]
    fn matches_numeric_and_string_ids() {
        assert!(matches_request(&json!({"id": 3}), 3));
        assert!(matches_request(&json!({"id": "3"}), 3));
        assert!(!matches_request(&json!({"method": "notifications/progress"}), 3));
    }

    #[tokio::test]
    async fn operations_out_of_order_are_rejected() {
        let mut session = AgentSession::new("@a/b", Duration::from_secs(1), Duration::from_secs(1));
        let err = session.list_tools().await.err();
        assert!(matches!(
            err,
            Some(AgentSessionError::InvalidState {
                state: SessionState::Unconnected,
                ..
            })
        ));
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 50), "short");
    }
}

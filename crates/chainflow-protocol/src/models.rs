use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Content type used for every message the chainflow crates produce
pub const DEFAULT_CONTENT_TYPE: &str = "multimodal/html";

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// System prompt
    System,
    /// Backend response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::System => write!(f, "system"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Role a step uses when it appends the running context to its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepRole {
    /// Context is sent as user input
    #[default]
    User,
    /// Context is sent as a system prompt
    System,
}

impl From<StepRole> for Role {
    fn from(role: StepRole) -> Self {
        match role {
            StepRole::User => Role::User,
            StepRole::System => Role::System,
        }
    }
}

/// One part of a message body.
///
/// Only `{"type": "text"}` parts are interpreted. Every other part is carried
/// as the raw JSON it arrived as and serialized back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// A text part; `extra` keeps any sibling fields besides `type` and `text`
    Text {
        /// The text payload
        text: String,
        /// Additional fields sent alongside the text
        extra: Map<String, Value>,
    },
    /// Any part that is not a well-formed text part
    Other(Value),
}

impl ContentPart {
    /// Create a plain text part
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            text: text.into(),
            extra: Map::new(),
        }
    }

    /// The text payload, if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text, .. } => Some(text),
            ContentPart::Other(_) => None,
        }
    }

    /// Consume the part, keeping the text payload of text parts
    pub fn into_text(self) -> Option<String> {
        match self {
            ContentPart::Text { text, .. } => Some(text),
            ContentPart::Other(_) => None,
        }
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.get("type").and_then(Value::as_str) == Some("text") => {
                match map.remove("text") {
                    Some(Value::String(text)) => {
                        map.remove("type");
                        ContentPart::Text { text, extra: map }
                    }
                    other => {
                        if let Some(v) = other {
                            map.insert("text".to_string(), v);
                        }
                        ContentPart::Other(Value::Object(map))
                    }
                }
            }
            other => ContentPart::Other(other),
        }
    }
}

impl From<Value> for ContentPart {
    fn from(value: Value) -> Self {
        ContentPart::from_value(value)
    }
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentPart::Text { text, extra } => {
                let mut map = serializer.serialize_map(Some(extra.len() + 2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
                for (key, value) in extra {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            ContentPart::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ContentPart::from_value)
    }
}

impl JsonSchema for ContentPart {
    fn schema_name() -> String {
        "ContentPart".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <Map<String, Value>>::json_schema(gen)
    }
}

/// Message body: a content-type tag plus ordered parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Content {
    /// Content-type tag (e.g. "multimodal/html", "text")
    pub content_type: String,
    /// Ordered parts
    #[serde(default)]
    pub parts: Vec<ContentPart>,
}

impl Content {
    /// Concatenate every text part, in order. No text parts yields `""`.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(ContentPart::as_text).collect()
    }
}

/// A message exchanged with any backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Role of the author
    pub role: Role,
    /// Message body
    pub content: Content,
}

impl Message {
    /// Create a message carrying a single text part
    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content {
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                parts: vec![ContentPart::text(text)],
            },
        }
    }

    /// Override the content-type tag
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content.content_type = content_type.into();
        self
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// A predefined message attached to a step.
///
/// Mirrors the loose records front-ends send: every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeedMessage {
    /// Author role, defaults to `system`
    #[serde(default = "default_seed_role")]
    pub role: Role,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Content-type tag
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_seed_role() -> Role {
    Role::System
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl SeedMessage {
    /// Create a seed message with the default content type
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_type: default_content_type(),
        }
    }

    /// Convert to a wire message with a single text part
    pub fn to_message(&self) -> Message {
        Message::from_text(self.role, self.content.clone()).with_content_type(&self.content_type)
    }
}

/// A named capability call made on a remote agent instead of a free-text message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCallSpec {
    /// Capability name as listed by the agent
    pub name: String,
    /// Arguments passed to the capability
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Remote agent a step is dispatched to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemoteAgentSpec {
    /// Agent identifier (e.g. "@turkyden/weather")
    pub agent_id: String,
    /// Connection parameters forwarded to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    /// Invoke a named capability rather than sending a message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolCallSpec>,
}

/// One stage of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    /// Step name, reported back in results and errors
    pub name: String,
    /// Direct backend address; the configured default is used when absent
    #[serde(default, alias = "mcp_server", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Role used for the context message
    #[serde(default)]
    pub role: StepRole,
    /// Messages sent ahead of the context message
    #[serde(default, alias = "messages")]
    pub seed_messages: Vec<SeedMessage>,
    /// Opaque tool descriptors forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    /// Remote agent execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_agent: Option<RemoteAgentSpec>,
}

/// How a step is executed, resolved from [`StepDefinition::remote_agent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDispatch<'a> {
    /// Chat-completion call against an explicit target or the default backend
    Direct {
        /// Explicit target, if any
        target: Option<&'a str>,
    },
    /// Remote agent session
    RemoteAgent(&'a RemoteAgentSpec),
}

impl StepDefinition {
    /// Create a step dispatched to the default direct backend
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            role: StepRole::User,
            seed_messages: Vec::new(),
            tools: None,
            remote_agent: None,
        }
    }

    /// Create a step dispatched to a remote agent
    pub fn remote_agent(name: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let mut step = Self::new(name);
        step.remote_agent = Some(RemoteAgentSpec {
            agent_id: agent_id.into(),
            params: None,
            tool: None,
        });
        step
    }

    /// Set the direct backend address
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the context message role
    pub fn with_role(mut self, role: StepRole) -> Self {
        self.role = role;
        self
    }

    /// Append a seed message
    pub fn with_seed(mut self, seed: SeedMessage) -> Self {
        self.seed_messages.push(seed);
        self
    }

    /// Set the tool descriptors
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set remote agent connection parameters (no-op for direct steps)
    pub fn with_agent_params(mut self, params: Map<String, Value>) -> Self {
        if let Some(agent) = self.remote_agent.as_mut() {
            agent.params = Some(params);
        }
        self
    }

    /// Select a capability call on the remote agent (no-op for direct steps)
    pub fn with_agent_tool(mut self, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        if let Some(agent) = self.remote_agent.as_mut() {
            agent.tool = Some(ToolCallSpec {
                name: name.into(),
                arguments,
            });
        }
        self
    }

    /// Explicit direct target, ignoring blank strings
    pub fn explicit_target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Resolve the execution mode
    pub fn dispatch(&self) -> StepDispatch<'_> {
        match &self.remote_agent {
            Some(agent) => StepDispatch::RemoteAgent(agent),
            None => StepDispatch::Direct {
                target: self.explicit_target(),
            },
        }
    }
}

/// A workflow submission: ordered steps plus the initial input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowRequest {
    /// Steps, executed in order
    pub steps: Vec<StepDefinition>,
    /// Initial context
    pub input: String,
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    /// Name of the step that produced this result
    pub step_name: String,
    /// Backend address, or `agent:<agentId>` for remote agents
    pub backend_label: String,
    /// Normalized response
    pub response: Message,
    /// Backend payload as received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_backend_payload: Option<Value>,
}

impl StepResult {
    /// Text the next step receives as its context
    pub fn continuation(&self) -> String {
        self.response.text()
    }
}

/// Outcome of a fully successful workflow run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowResult {
    /// One entry per step, in submission order
    pub results: Vec<StepResult>,
}

impl WorkflowResult {
    /// Context produced by the last step
    pub fn final_text(&self) -> Option<String> {
        self.results.last().map(StepResult::continuation)
    }
}

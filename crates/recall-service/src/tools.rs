//! Agent-facing memory tools and their registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use recall_types::RecordSource;

use crate::error::ServiceError;
use crate::preferences::PreferenceMemory;

pub const USER_PREFERENCES: &str = "user_preferences";
pub const SEARCH_PREFERENCES: &str = "search_preferences";
pub const REMEMBER_PREFERENCE: &str = "remember_preference";

#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name was not found in registry.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// Tool received invalid arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<ServiceError> for ToolError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => ToolError::InvalidArguments(msg),
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

/// Tool metadata for discovery and schema presentation.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub args_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for tool arguments.
    fn args_schema(&self) -> Value;

    async fn call(&self, args: Value) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            args_schema: self.args_schema(),
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Full-profile rendering used by `user_preferences`.
pub fn format_user_preferences(user: &str, preferences: &[String]) -> String {
    if preferences.is_empty() {
        return format!("No stored preferences found for {user}. This might be a new user.");
    }
    let lines: Vec<String> = preferences.iter().map(|p| format!("- {p}")).collect();
    format!("User {user}'s preferences:\n{}", lines.join("\n"))
}

#[derive(Debug, Deserialize)]
struct UserArgs {
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    user_name: String,
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RememberArgs {
    user_name: String,
    preference: String,
}

struct UserPreferencesTool {
    memory: Arc<PreferenceMemory>,
}

#[async_trait]
impl Tool for UserPreferencesTool {
    fn name(&self) -> &str {
        USER_PREFERENCES
    }

    fn description(&self) -> &str {
        "Retrieve every stored preference of a user from long-term memory."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_name": {"type": "string", "description": "The name of the user to retrieve preferences for"}
            },
            "required": ["user_name"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: UserArgs = parse_args(args)?;
        let preferences = self.memory.retrieve_all(&args.user_name).await;
        Ok(Value::String(format_user_preferences(&args.user_name, &preferences)))
    }
}

struct SearchPreferencesTool {
    memory: Arc<PreferenceMemory>,
    default_k: usize,
}

#[async_trait]
impl Tool for SearchPreferencesTool {
    fn name(&self) -> &str {
        SEARCH_PREFERENCES
    }

    fn description(&self) -> &str {
        "Find the stored preferences of a user that relate to a query."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_name": {"type": "string"},
                "query": {"type": "string", "description": "What the preferences should relate to"},
                "k": {"type": "integer", "minimum": 1}
            },
            "required": ["user_name", "query"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let k = args.k.unwrap_or(self.default_k);
        let found = self
            .memory
            .retrieve_relevant(&args.user_name, &args.query, k)
            .await?;
        let text = if found.is_empty() {
            format!(
                "No preferences of {} match \"{}\".",
                args.user_name, args.query
            )
        } else {
            let lines: Vec<String> = found.iter().map(|p| format!("- {p}")).collect();
            format!(
                "Preferences of {} related to \"{}\":\n{}",
                args.user_name,
                args.query,
                lines.join("\n")
            )
        };
        Ok(Value::String(text))
    }
}

struct RememberPreferenceTool {
    memory: Arc<PreferenceMemory>,
}

#[async_trait]
impl Tool for RememberPreferenceTool {
    fn name(&self) -> &str {
        REMEMBER_PREFERENCE
    }

    fn description(&self) -> &str {
        "Store a new preference of a user in long-term memory."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_name": {"type": "string"},
                "preference": {"type": "string", "description": "The preference, as a short statement"}
            },
            "required": ["user_name", "preference"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: RememberArgs = parse_args(args)?;
        self.memory
            .learn(&args.user_name, &args.preference, RecordSource::Learned)
            .await?;
        Ok(Value::String(format!(
            "Remembered for {}: {}",
            args.user_name,
            args.preference.trim()
        )))
    }
}

/// Name to tool map, built once at start-up.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three preference tools over `memory`.
    pub fn with_memory_tools(memory: Arc<PreferenceMemory>, default_k: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UserPreferencesTool {
            memory: Arc::clone(&memory),
        }));
        registry.register(Arc::new(SearchPreferencesTool {
            memory: Arc::clone(&memory),
            default_k,
        }));
        registry.register(Arc::new(RememberPreferenceTool { memory }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(name = tool.name(), "Registering tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::ToolNotFound(name.to_string()))?;
        tool.call(args).await
    }
}

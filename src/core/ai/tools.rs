// =============================================================================
// TOOL REGISTRY
// =============================================================================
//
// Maps a tool name to its descriptor and handler. Every handler receives the
// whole argument mapping the model produced, never positional arguments.
// Descriptors are checked when they are registered; lookups return an
// explicit `NotFound` carrying the valid names so the caller can report them
// back to the model.

use super::models::{PropertyDef, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Returned to the model when a destructive tool is called without
/// `confirm: true`.
pub const CONFIRMATION_REQUIRED_MESSAGE: &str =
    "This is a destructive action. Ask the user to confirm, then call the tool again with confirm: true to proceed.";

const PARAMETER_TYPES: &[&str] = &["string", "number", "integer", "boolean", "array", "object"];

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Tool name must not be empty")]
    EmptyName,

    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error("Tool '{tool}': required parameter '{param}' is not declared in properties")]
    UndeclaredRequired { tool: String, param: String },

    #[error("Tool '{tool}': parameter '{param}' has unsupported type '{prop_type}'")]
    UnsupportedType {
        tool: String,
        param: String,
        prop_type: String,
    },

    #[error("Tool '{tool}': parameter '{param}' declares enum values but is not a string")]
    EnumOnNonString { tool: String, param: String },
}

/// Errors a handler may raise. The orchestrator turns every one of them into
/// a `success: false` result; they never end a turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing '{0}' argument")]
    MissingArgument(String),

    #[error("Invalid '{name}' argument: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("{0}")]
    Upstream(String),
}

// =============================================================================
// ARGUMENTS
// =============================================================================

/// The argument mapping of one tool call with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// A required, non-blank string argument.
    pub fn str(&self, key: &str) -> Result<&str, ToolError> {
        self.opt_str(key)
            .ok_or_else(|| ToolError::MissingArgument(key.to_string()))
    }

    /// An optional string. Blank strings count as absent since models often
    /// send `""` for parameters they mean to skip.
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// An optional non-negative count. Models send integers as JSON floats.
    pub fn opt_u32(&self, key: &str) -> Result<Option<u32>, ToolError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| ToolError::InvalidArgument {
                    name: key.to_string(),
                    reason: format!("expected a non-negative whole number, got {}", value),
                }),
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::Bool(true)))
    }

    pub fn str_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> Result<ToolResult, ToolError>;
}

/// Adapts an async closure into a `ToolHandler`.
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send,
{
    async fn call(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        (self.0)(args).await
    }
}

/// Binds shared state to an async handler function, so integrations can
/// write each tool as `async fn(Arc<Client>, ToolArgs)`.
pub fn with_state<S, F, Fut>(
    state: &Arc<S>,
    f: F,
) -> impl Fn(ToolArgs) -> Fut + Send + Sync + 'static
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, ToolArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
{
    let state = Arc::clone(state);
    move |args| f(Arc::clone(&state), args)
}

/// Wraps a destructive handler: without `confirm: true` the inner handler is
/// never reached.
pub struct ConfirmationGuard<H> {
    inner: H,
}

impl<H: ToolHandler> ConfirmationGuard<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: ToolHandler> ToolHandler for ConfirmationGuard<H> {
    async fn call(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        if !args.flag("confirm") {
            return Ok(ToolResult::failure(CONFIRMATION_REQUIRED_MESSAGE));
        }
        self.inner.call(args).await
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A registered tool: its immutable descriptor and handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub destructive: bool,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub async fn invoke(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        self.handler.call(args).await
    }
}

/// Outcome of looking a tool up by name.
pub enum ToolLookup<'a> {
    Found(&'a RegisteredTool),
    NotFound { available: Vec<String> },
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool after checking its descriptor.
    pub fn register<H>(&mut self, descriptor: ToolDescriptor, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        self.insert(descriptor, Arc::new(handler), false)
    }

    /// Registers an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, descriptor: ToolDescriptor, f: F) -> Result<(), RegistryError>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        self.register(descriptor, FnTool(f))
    }

    /// Registers a tool that only runs when called with `confirm: true`.
    /// The `confirm` parameter is added to the descriptor so the model knows
    /// about it.
    pub fn register_destructive<H>(
        &mut self,
        mut descriptor: ToolDescriptor,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        descriptor.parameters.properties.insert(
            "confirm".to_string(),
            PropertyDef::boolean(
                "Must be true, and only after the user has explicitly confirmed this action",
            ),
        );
        self.insert(descriptor, Arc::new(ConfirmationGuard::new(handler)), true)
    }

    fn insert(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        destructive: bool,
    ) -> Result<(), RegistryError> {
        validate_descriptor(&descriptor)?;
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }

        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.descriptors.push(descriptor.clone());
        self.tools.push(RegisteredTool {
            descriptor,
            destructive,
            handler,
        });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> ToolLookup<'_> {
        match self.index.get(name) {
            Some(&i) => ToolLookup::Found(&self.tools[i]),
            None => ToolLookup::NotFound {
                available: self.names(),
            },
        }
    }

    /// All descriptors, in registration order.
    pub fn describe_all(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.descriptor.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn validate_descriptor(descriptor: &ToolDescriptor) -> Result<(), RegistryError> {
    if descriptor.name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }

    let params = &descriptor.parameters;
    for required in &params.required {
        if !params.properties.contains_key(required) {
            return Err(RegistryError::UndeclaredRequired {
                tool: descriptor.name.clone(),
                param: required.clone(),
            });
        }
    }

    for (param, def) in &params.properties {
        if !PARAMETER_TYPES.contains(&def.prop_type.as_str()) {
            return Err(RegistryError::UnsupportedType {
                tool: descriptor.name.clone(),
                param: param.clone(),
                prop_type: def.prop_type.clone(),
            });
        }
        if def.enum_values.is_some() && def.prop_type != "string" {
            return Err(RegistryError::EnumOnNonString {
                tool: descriptor.name.clone(),
                param: param.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => ToolArgs::new(map),
            _ => ToolArgs::default(),
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(
                ToolDescriptor::new("echo", "Echo the text back")
                    .param("text", PropertyDef::string("Text to echo")),
                |args: ToolArgs| async move {
                    let text = args.str("text")?.to_string();
                    Ok(ToolResult::ok("echoed", json!({ "text": text })))
                },
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_resolve_and_invoke() {
        let registry = echo_registry();

        let ToolLookup::Found(tool) = registry.resolve("echo") else {
            panic!("echo should be registered");
        };
        let result = tool.invoke(args(json!({ "text": "hi" }))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(json!({ "text": "hi" })));
    }

    #[test]
    fn test_unknown_tool_lists_available_names() {
        let registry = echo_registry();

        match registry.resolve("nope") {
            ToolLookup::NotFound { available } => assert_eq!(available, vec!["echo"]),
            ToolLookup::Found(_) => panic!("nope is not registered"),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = echo_registry();
        let err = registry
            .register_fn(ToolDescriptor::new("echo", "again"), |_args: ToolArgs| async {
                Ok(ToolResult::failure("unused"))
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("echo".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_descriptor_validation() {
        let mut registry = ToolRegistry::new();
        let noop = |_args: ToolArgs| async { Ok(ToolResult::failure("unused")) };

        let mut missing = ToolDescriptor::new("bad_required", "x");
        missing.parameters.required.push("ghost".to_string());
        assert!(matches!(
            registry.register_fn(missing, noop),
            Err(RegistryError::UndeclaredRequired { .. })
        ));

        let bad_type = ToolDescriptor::new("bad_type", "x")
            .param("when", PropertyDef::new("date", "a date"));
        assert!(matches!(
            registry.register_fn(bad_type, noop),
            Err(RegistryError::UnsupportedType { .. })
        ));

        let mut bad_enum = PropertyDef::number("n");
        bad_enum.enum_values = Some(vec!["1".to_string()]);
        let bad_enum = ToolDescriptor::new("bad_enum", "x").param("n", bad_enum);
        assert!(matches!(
            registry.register_fn(bad_enum, noop),
            Err(RegistryError::EnumOnNonString { .. })
        ));

        assert_eq!(
            registry.register_fn(ToolDescriptor::new("  ", "x"), noop),
            Err(RegistryError::EmptyName)
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_destructive_tool_requires_confirm() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut registry = ToolRegistry::new();
        registry
            .register_destructive(
                ToolDescriptor::new("delete_thing", "Delete a thing")
                    .param("id", PropertyDef::string("Thing id")),
                FnTool(move |_args: ToolArgs| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(ToolResult::ok("deleted", json!({})))
                    }
                }),
            )
            .unwrap();

        // confirm is advertised but not required
        let descriptor = &registry.describe_all()[0];
        assert!(descriptor.parameters.properties.contains_key("confirm"));
        assert_eq!(descriptor.parameters.required, vec!["id"]);

        let ToolLookup::Found(tool) = registry.resolve("delete_thing") else {
            panic!("delete_thing should be registered");
        };
        assert!(tool.destructive);

        for unconfirmed in [json!({ "id": "1" }), json!({ "id": "1", "confirm": "true" })] {
            let result = tool.invoke(args(unconfirmed)).await.unwrap();
            assert!(!result.success);
            assert_eq!(result.message, CONFIRMATION_REQUIRED_MESSAGE);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = tool
            .invoke(args(json!({ "id": "1", "confirm": true })))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_args_accessors() {
        let a = args(json!({
            "query": "  atlas ",
            "blank": "",
            "max": 10.0,
            "neg": -1,
            "labels": ["a", 1, "b"],
        }));

        assert_eq!(a.str("query").unwrap(), "atlas");
        assert!(matches!(a.str("blank"), Err(ToolError::MissingArgument(_))));
        assert_eq!(a.opt_u32("max").unwrap(), Some(10));
        assert_eq!(a.opt_u32("absent").unwrap(), None);
        assert!(a.opt_u32("neg").is_err());
        assert_eq!(a.str_list("labels"), vec!["a", "b"]);
        assert!(!a.flag("confirm"));
    }
}

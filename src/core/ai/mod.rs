pub mod ai_service;
pub mod conversation;
pub mod exchange;
pub mod formatting;
pub mod models;
pub mod tools;

pub use ai_service::{AiError, AiProvider, AiService, Assistant, ModelRequest, TurnPolicy};
pub use conversation::{ConversationStore, StoreError};
pub use models::{
    AiConfig, ConversationTurn, LoopExit, ModelReply, PropertyDef, ToolCall, ToolDescriptor,
    ToolOutput, ToolResult, TurnOutcome, TurnRole,
};
pub use tools::{with_state, FnTool, RegistryError, ToolArgs, ToolError, ToolRegistry};

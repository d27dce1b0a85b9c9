use super::conversation::{ConversationStore, StoreError, DEFAULT_MAX_HISTORY};
use super::exchange::Exchange;
use super::models::{
    AiConfig, ConversationTurn, LoopExit, ModelReply, ToolCall, ToolDescriptor, ToolOutput,
    ToolResult, TurnOutcome,
};
use super::tools::{ToolArgs, ToolLookup, ToolRegistry};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful WhatsApp assistant that can interact with Google Drive, Google Docs, and Linear.\n\
IMPORTANT DOCUMENT HANDLING RULES:\n\
1. When a user mentions a document by name (e.g., 'meeting notes', 'project plan'), ALWAYS use search_google_docs first to find matching documents.\n\
2. If search returns MULTIPLE documents, list them all with their names and IDs, and let the user know there are multiple matches.\n\
3. If search returns ONLY ONE document, use that document's ID to perform the requested operation without asking.\n\
4. If the user provides a specific document ID, use it directly.\n\
5. Extract key words from the user's message to search (e.g., 'atlas ai document' -> search for 'atlas ai').\n\n\
When users ask about files, folders, or Google Drive operations, use the available functions. \
When users ask about issues, projects, or status updates in Linear, use the Linear functions. \
Be conversational and helpful. Always confirm with the user before deleting files.";

const UPSTREAM_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't complete that request right now. Please try again in a moment.";
const TURN_TIMEOUT_MESSAGE: &str =
    "Sorry, that took too long to finish. Please try again, or ask for something smaller.";
const CEILING_FALLBACK_MESSAGE: &str =
    "I had to stop after several steps without reaching a final answer. Could you narrow the request down?";
const EMPTY_REPLY_MESSAGE: &str = "I don't have an answer for that. Could you rephrase it?";

// =============================================================================
// MODEL PROVIDER PORT
// =============================================================================

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error talking to the model: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model returned no usable content: {0}")]
    EmptyResponse(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the model sees for one request.
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub tools: &'a [ToolDescriptor],
    pub history: &'a [ConversationTurn],
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends the full context and returns either text or tool calls.
    async fn generate(
        &self,
        request: &ModelRequest<'_>,
        config: &AiConfig,
    ) -> Result<ModelReply, AiError>;
}

// Lets the service hold a provider chosen at runtime.
#[async_trait]
impl AiProvider for Box<dyn AiProvider> {
    async fn generate(
        &self,
        request: &ModelRequest<'_>,
        config: &AiConfig,
    ) -> Result<ModelReply, AiError> {
        (**self).generate(request, config).await
    }
}

/// What the transport layer needs from the orchestrator.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn process_turn(&self, user_id: &str, text: &str) -> TurnOutcome;

    async fn clear_history(&self, user_id: &str) -> Result<(), StoreError>;
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Limits applied to every user turn.
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    pub max_tool_iterations: usize,
    pub max_history: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub turn_timeout: Duration,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            max_history: DEFAULT_MAX_HISTORY,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            turn_timeout: Duration::from_secs(180),
        }
    }
}

/// Drives the model/tool loop for each user turn.
pub struct AiService<P: AiProvider, S: ConversationStore> {
    provider: P,
    store: S,
    tools: ToolRegistry,
    system_prompt: String,
    config: AiConfig,
    policy: TurnPolicy,
    /// One lock per user so a user's turns never interleave on the store.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<P: AiProvider, S: ConversationStore> AiService<P, S> {
    pub fn new(
        provider: P,
        store: S,
        tools: ToolRegistry,
        system_prompt: String,
        config: AiConfig,
        policy: TurnPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            tools,
            system_prompt,
            config,
            policy,
            user_locks: DashMap::new(),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the user's lock once nobody else holds or waits on it.
    fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Processes one user message. Always returns a well-formed outcome with
    /// a non-empty message; no model or tool failure escapes.
    pub async fn process_turn(&self, user_id: &str, text: &str) -> TurnOutcome {
        let lock = self.user_lock(user_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.guarded_turn(user_id, text).await
        };
        self.release_user_lock(user_id, lock);
        outcome
    }

    async fn guarded_turn(&self, user_id: &str, text: &str) -> TurnOutcome {
        match tokio::time::timeout(self.policy.turn_timeout, self.run_turn(user_id, text)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(user_id, error = %e, "AI turn failed");
                TurnOutcome {
                    success: false,
                    message: UPSTREAM_FAILURE_MESSAGE.to_string(),
                    exit: LoopExit::UpstreamError,
                    tool_iterations: 0,
                }
            }
            Err(_) => {
                tracing::warn!(
                    user_id,
                    timeout = ?self.policy.turn_timeout,
                    "AI turn exceeded its time budget"
                );
                TurnOutcome {
                    success: false,
                    message: TURN_TIMEOUT_MESSAGE.to_string(),
                    exit: LoopExit::TurnTimeout,
                    tool_iterations: 0,
                }
            }
        }
    }

    /// One model/tool loop.
    ///
    /// Calls in a batch run one at a time in emission order, and the model
    /// is re-invoked once per batch with all of that batch's results in a
    /// single tool-result turn rather than once per call. Gemini expects
    /// every function response of a parallel call set together.
    async fn run_turn(&self, user_id: &str, text: &str) -> Result<TurnOutcome, AiError> {
        let history = self.store.get(user_id).await?;
        let mut exchange = Exchange::start(
            &self.provider,
            &self.config,
            &self.system_prompt,
            self.tools.describe_all(),
            history,
            self.policy.model_timeout,
        );

        let mut reply = exchange
            .send(ConversationTurn::User(text.to_string()))
            .await?;
        if let Some(thinking) = &reply.thinking {
            tracing::debug!(user_id, "Model thinking: {}", thinking);
        }

        let mut iterations = 0;
        while reply.has_tool_calls() && iterations < self.policy.max_tool_iterations {
            iterations += 1;

            // Sequential, in the order the model emitted them.
            let mut outputs = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                outputs.push(ToolOutput {
                    name: call.name.clone(),
                    result: self.execute_tool(call).await,
                });
            }

            reply = exchange.send(ConversationTurn::ToolResults(outputs)).await?;
        }

        let exit = if reply.has_tool_calls() {
            tracing::warn!(
                user_id,
                ceiling = self.policy.max_tool_iterations,
                pending_calls = reply.tool_calls.len(),
                "Tool loop safety triggered (max iterations reached)"
            );
            LoopExit::IterationCeilingHit
        } else {
            LoopExit::FinalText
        };

        let message = match (reply.text.trim().is_empty(), &exit) {
            (false, _) => reply.text.trim().to_string(),
            (true, LoopExit::IterationCeilingHit) => CEILING_FALLBACK_MESSAGE.to_string(),
            (true, _) => EMPTY_REPLY_MESSAGE.to_string(),
        };
        exchange.finish_with_text(message.clone());

        let context_turns = exchange.history().len();
        self.store.append(user_id, exchange.new_turns()).await?;
        self.store.truncate(user_id, self.policy.max_history).await?;

        tracing::info!(
            user_id,
            tool_iterations = iterations,
            context_turns,
            "AI response generated: {}",
            preview(&message, 100)
        );

        Ok(TurnOutcome {
            success: true,
            message,
            exit,
            tool_iterations: iterations,
        })
    }

    /// Runs one tool call. Unknown tools, handler errors and timeouts all
    /// become `success: false` results for the model to react to.
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let tool = match self.tools.resolve(&call.name) {
            ToolLookup::Found(tool) => tool,
            ToolLookup::NotFound { available } => {
                tracing::warn!(tool = %call.name, "Model requested an unknown tool");
                return ToolResult::failure(format!(
                    "Unknown function: {}. Available: {}",
                    call.name,
                    available.join(", ")
                ));
            }
        };

        let args = ToolArgs::new(call.args.clone());
        tracing::debug!(
            tool = %call.name,
            args = ?args.keys(),
            destructive = tool.destructive,
            "AI calling function"
        );

        match tokio::time::timeout(self.policy.tool_timeout, tool.invoke(args)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::failure(e.to_string())
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, "Tool call timed out");
                ToolResult::failure(format!(
                    "{} timed out after {} seconds",
                    call.name,
                    self.policy.tool_timeout.as_secs()
                ))
            }
        }
    }

    /// Waits for any turn the user has in flight, so a finished turn can
    /// never write its history back after the clear.
    pub async fn clear_history(&self, user_id: &str) -> Result<(), StoreError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.store.clear(user_id).await
        };
        self.release_user_lock(user_id, lock);
        result
    }
}

#[async_trait]
impl<P: AiProvider, S: ConversationStore> Assistant for AiService<P, S> {
    async fn process_turn(&self, user_id: &str, text: &str) -> TurnOutcome {
        AiService::process_turn(self, user_id, text).await
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), StoreError> {
        AiService::clear_history(self, user_id).await
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// An in-flight exchange with the model for one user turn.
//
// Started from the stored history, it accumulates every turn sent and
// received while the tool loop runs. Nothing here touches the conversation
// store; the orchestrator persists `new_turns()` once the turn completes.

use super::ai_service::{AiError, AiProvider, ModelRequest};
use super::models::{AiConfig, ConversationTurn, ModelReply, ToolDescriptor};
use std::time::Duration;

pub struct Exchange<'a, P: AiProvider> {
    provider: &'a P,
    config: &'a AiConfig,
    system_instruction: &'a str,
    tools: &'a [ToolDescriptor],
    turns: Vec<ConversationTurn>,
    /// Number of turns that came from the stored history.
    base_len: usize,
    call_timeout: Duration,
}

impl<'a, P: AiProvider> Exchange<'a, P> {
    pub fn start(
        provider: &'a P,
        config: &'a AiConfig,
        system_instruction: &'a str,
        tools: &'a [ToolDescriptor],
        history: Vec<ConversationTurn>,
        call_timeout: Duration,
    ) -> Self {
        let base_len = history.len();
        Self {
            provider,
            config,
            system_instruction,
            tools,
            turns: history,
            base_len,
            call_timeout,
        }
    }

    /// Appends `input`, sends the whole context to the model and records the
    /// reply.
    pub async fn send(&mut self, input: ConversationTurn) -> Result<ModelReply, AiError> {
        self.turns.push(input);

        let request = ModelRequest {
            system_instruction: self.system_instruction,
            tools: self.tools,
            history: &self.turns,
        };

        let reply = tokio::time::timeout(
            self.call_timeout,
            self.provider.generate(&request, self.config),
        )
        .await
        .map_err(|_| AiError::Timeout(self.call_timeout))??;

        self.turns.push(reply.as_turn());
        Ok(reply)
    }

    /// Replaces the last recorded model reply with a final text answer.
    ///
    /// Used to close the exchange: a reply still holding tool calls that
    /// will never be answered must not be stored, or the next request would
    /// replay calls without results.
    pub fn finish_with_text(&mut self, text: String) {
        if self.turns.len() > self.base_len
            && matches!(
                self.turns.last(),
                Some(ConversationTurn::ToolCalls(_)) | Some(ConversationTurn::ModelText(_))
            )
        {
            self.turns.pop();
        }
        self.turns.push(ConversationTurn::ModelText(text));
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Turns produced during this exchange, in order.
    pub fn new_turns(self) -> Vec<ConversationTurn> {
        let mut turns = self.turns;
        turns.split_off(self.base_len)
    }
}

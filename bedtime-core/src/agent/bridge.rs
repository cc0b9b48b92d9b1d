//! Bounded tool-call loop between the storyteller and the facts lookup.
//!
//! Each submission of the conversation to the model is one round. When the
//! model stops to ask for facts, the answers are appended to the same
//! conversation and it is submitted again, up to `max_rounds` times. The
//! last allowed round is sent with tool use switched off, so the model has
//! to answer in text; a model that asks for tools anyway is cut off there
//! and whatever text it produced is used as-is.

use super::model::{bounded, TextModel};
use super::tools::{answer, parse_fact_call, FactTools};
use claude::{ContentBlock, Message, Request, ToolChoice, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One fact lookup served to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub topic: String,
    /// The fact text, or `None` if the topic is unknown.
    pub fact: Option<String>,
    /// 1-based round in which the lookup was answered.
    pub round: u32,
}

/// How a bridge run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model finished without asking for more tools.
    Completed,
    /// The round cap was hit while the model still wanted tools.
    RoundsExhausted,
}

#[derive(Debug, Clone)]
pub struct BridgeOutput {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    pub rounds: u32,
    pub termination: Termination,
    pub model: String,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("model call failed in round {round}: {source}")]
    Model {
        round: u32,
        #[source]
        source: claude::Error,
    },
}

impl BridgeError {
    pub fn into_model_error(self) -> claude::Error {
        match self {
            BridgeError::Model { source, .. } => source,
        }
    }
}

/// Runs the tool-call loop for one generation attempt.
#[derive(Debug, Clone)]
pub struct ToolBridge {
    max_rounds: u32,
    call_timeout: Duration,
}

impl ToolBridge {
    pub fn new(max_rounds: u32, call_timeout: Duration) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            call_timeout,
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Drive `request` to a final text, serving fact lookups along the way.
    pub async fn run(
        &self,
        model: &dyn TextModel,
        mut request: Request,
    ) -> Result<BridgeOutput, BridgeError> {
        request.tools = Some(FactTools::all());
        request.tool_choice = Some(ToolChoice::Auto);

        let budget = self.max_rounds as usize;
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut round = 0;

        loop {
            round += 1;
            if round >= self.max_rounds {
                request.tool_choice = Some(ToolChoice::None);
            }

            let response = bounded(
                self.call_timeout,
                claude::Error::Timeout,
                model.complete(request.clone()),
            )
            .await
            .map_err(|source| BridgeError::Model { round, source })?;

            tracing::debug!(
                round,
                stop_reason = ?response.stop_reason,
                output_tokens = response.usage.output_tokens,
                "storyteller round trip"
            );

            if !response.wants_tools() {
                return Ok(BridgeOutput {
                    text: response.text(),
                    invocations,
                    rounds: round,
                    termination: Termination::Completed,
                    model: response.model,
                });
            }

            if round >= self.max_rounds {
                tracing::warn!(
                    rounds = round,
                    lookups = invocations.len(),
                    "fact lookups exhausted; keeping the last response text"
                );
                return Ok(BridgeOutput {
                    text: response.text(),
                    invocations,
                    rounds: round,
                    termination: Termination::RoundsExhausted,
                    model: response.model,
                });
            }

            let mut results = Vec::new();
            for call in response.tool_uses() {
                let result = match parse_fact_call(&call.name, &call.input) {
                    Err(err) => err,
                    Ok(_) if invocations.len() >= budget => ToolResult::error(
                        "No more fact lookups are available. Finish the story with what you have.",
                    ),
                    Ok(topic) => {
                        let (fact, text) = answer(&topic);
                        tracing::debug!(round, %topic, found = fact.is_some(), "fact lookup");
                        invocations.push(ToolInvocation {
                            topic,
                            fact: fact.map(|f| f.text.to_string()),
                            round,
                        });
                        ToolResult::success(text)
                    }
                };
                results.push(ContentBlock::tool_result(call.id, result));
            }

            request.messages.push(response.into_turn());
            request.messages.push(Message::tool_results(results));
        }
    }
}

//! Turn-by-turn loop driver and its termination state machine.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AgentError;
use crate::mcp::is_exit_tool;

use super::conversation::Conversation;
use super::turn::{TurnOptions, TurnOutcome, TurnProcessor};

/// Unique identifier for one loop run.
pub type RunId = Uuid;

/// Why a run reached `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The model invoked a reserved exit tool.
    ExitTool(String),
    /// Two consecutive turns produced no tool call.
    Converged,
    /// The configured turn budget ran out. Not a failure.
    TurnBudgetExceeded,
}

/// Loop state. A run starts `Running` and ends `Terminated`; there is no
/// third state and no way back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminated(TerminationReason),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Turns processed, early-exit turns included.
    pub turns: usize,
    pub reason: TerminationReason,
}

/// Drives `TurnProcessor` until the conversation terminates.
///
/// Exactly one turn is in flight at a time; the loop owns the only write
/// path into the conversation for the duration of the run.
pub struct AgentLoop {
    processor: TurnProcessor,
    max_turns: usize,
    expect_tool: bool,
}

impl AgentLoop {
    pub fn new(processor: TurnProcessor, max_turns: usize) -> Self {
        Self {
            processor,
            max_turns,
            expect_tool: true,
        }
    }

    /// Override the initial tool expectation. When true (the default) the
    /// loop is primed to expect the model's first follow-up action to be a
    /// tool call.
    pub fn with_expect_tool(mut self, expect_tool: bool) -> Self {
        self.expect_tool = expect_tool;
        self
    }

    /// Run the loop to termination.
    ///
    /// There are only three ways out: a reserved exit tool, budget
    /// exhaustion, or convergence (two consecutive non-tool turns).
    /// Cancellation exits immediately with `AgentError::Aborted` regardless
    /// of loop state.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AgentError> {
        let run_id = Uuid::new_v4();
        let mut state = LoopState::Running;
        let mut expect_tool = self.expect_tool;
        let mut turn_count = 0usize;

        info!(run_id = %run_id, max_turns = self.max_turns, "run started");

        let reason = loop {
            let options = TurnOptions {
                exit_if_first_chunk_no_tool: turn_count > 0 && expect_tool,
            };
            turn_count += 1;

            let outcome = match self.processor.process(conversation, options, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!(run_id = %run_id, turn = turn_count, state = ?state, error = %e, "run failed");
                    return Err(e);
                }
            };
            debug!(run_id = %run_id, turn = turn_count, ?outcome, "turn processed");

            if let Some(name) = exit_tool_invoked(conversation) {
                break TerminationReason::ExitTool(name);
            }
            if turn_count > self.max_turns {
                break TerminationReason::TurnBudgetExceeded;
            }
            let produced_tool = matches!(outcome, TurnOutcome::ToolResults(_));
            if !produced_tool && !expect_tool {
                break TerminationReason::Converged;
            }
            expect_tool = produced_tool;
        };

        state = LoopState::Terminated(reason.clone());
        debug!(run_id = %run_id, ?state, turns = turn_count, "run terminated");

        Ok(RunSummary {
            run_id,
            turns: turn_count,
            reason,
        })
    }
}

/// Did the most recent append resolve a reserved exit tool?
fn exit_tool_invoked(conversation: &Conversation) -> Option<String> {
    let last = conversation.last()?;
    if !last.is_tool_result() {
        return None;
    }
    let name = last.tool_name.as_deref()?;
    is_exit_tool(name).then(|| name.to_owned())
}

//! Engine facade: one turn in, one reply out.
//!
//! The engine holds everything read-only (patterns, catalog, tool adapter)
//! and is shared by any number of [`Session`]s. Each session owns its memory.

use std::sync::Arc;
use wren_tool::{CalculatorBackend, ToolAdapter};

use crate::catalog::Catalog;
use crate::cognition::calculator::LocalCalculator;
use crate::cognition::executor::{ActionExecutor, Execution, TurnInput};
use crate::cognition::perception::PatternMatcher;
use crate::cognition::{planner, slots};
use crate::config::EngineCfg;
use crate::dialogue::{OutletFlow, topic_tracking};
use crate::memory::{ConversationMemory, NewTurn};
use crate::types::{
    Action, ConversationState, DebugSummary, Extraction, Intent, MissingSlot, SessionExport,
    Summary,
};

const EMPTY_REPLY: &str = "I didn't catch that. Could you re-type your question?";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One conversation.
#[derive(Debug, Clone, Default)]
pub struct Session {
    memory: ConversationMemory,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from an export. An unknown state in the export reads as `Initial`.
    pub fn restore(export: SessionExport) -> Self {
        Self {
            memory: ConversationMemory::from_export(export),
        }
    }

    pub fn id(&self) -> &str {
        self.memory.session_id()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn export(&self) -> SessionExport {
        self.memory.export()
    }
}

pub struct Engine {
    cfg: EngineCfg,
    matcher: Arc<PatternMatcher>,
    flow: Arc<OutletFlow>,
    executor: ActionExecutor,
}

impl Engine {
    pub fn new(
        cfg: EngineCfg,
        catalog: Catalog,
        backend: Arc<dyn CalculatorBackend>,
    ) -> Result<Self, EngineError> {
        let matcher = Arc::new(PatternMatcher::new(cfg.max_utterance_bytes)?);
        let catalog = Arc::new(catalog);
        let flow = Arc::new(OutletFlow::new(catalog.clone(), matcher.clone()));
        let adapter = ToolAdapter::new(backend, cfg.retry_policy());
        tracing::info!(
            backend = adapter.backend_name(),
            regions = catalog.regions().count(),
            "engine ready"
        );
        Ok(Self {
            executor: ActionExecutor::new(catalog, flow.clone(), adapter),
            cfg,
            matcher,
            flow,
        })
    }

    /// Built-in catalog with the in-process calculator.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(EngineCfg::default(), Catalog::builtin(), Arc::new(LocalCalculator))
    }

    pub fn config(&self) -> &EngineCfg {
        &self.cfg
    }

    pub fn new_session(&self) -> Session {
        Session::new()
    }

    /// Process one utterance and commit exactly one turn. Never fails.
    pub async fn process_input(&self, session: &mut Session, input: &str) -> String {
        let memory = &mut session.memory;
        let text = input.trim();
        if text.is_empty() {
            memory.add_turn(NewTurn {
                user_input: input.to_owned(),
                bot_response: EMPTY_REPLY.to_owned(),
                ..NewTurn::default()
            });
            return EMPTY_REPLY.to_owned();
        }

        let state = memory.state();
        let ex = self.matcher.extract(text);
        let missing = slots::detect(&self.matcher, text, &ex);
        let (action, execution) = self.dispatch(state, text, &ex, &missing, memory).await;

        let Execution {
            reply,
            updates,
            next_state,
            tool_result,
            expression,
            tool_called,
        } = execution;

        for update in updates {
            memory.apply(update);
        }
        if let Some(next) = next_state {
            memory.set_state(next);
        }
        if let (Some(expression), Some(result)) = (expression, tool_result) {
            memory.record_calculation(expression, result);
        }
        if tool_called {
            memory.record_tool_call();
        }
        let turn_id = memory.add_turn(NewTurn {
            user_input: text.to_owned(),
            bot_response: reply.clone(),
            action,
            intents: ex.intents.iter().copied().collect(),
            entities: ex.entities.iter().copied().collect(),
            missing_slots: missing,
            tool_result,
        });

        tracing::info!(
            session = memory.session_id(),
            turn = turn_id,
            from = %state,
            to = %memory.state(),
            ?action,
            "turn committed"
        );
        reply
    }

    /// Route the turn: topic switch, then outlet-flow handlers, then the planner.
    async fn dispatch(
        &self,
        state: ConversationState,
        text: &str,
        ex: &Extraction,
        missing: &[MissingSlot],
        memory: &ConversationMemory,
    ) -> (Option<Action>, Execution) {
        if let Some(region) = topic_tracking::detect_switch(&self.matcher, text, state) {
            return (None, self.flow.switch_region(region, text, ex).into());
        }

        if state.is_outlet_flow() && !leaves_outlet_flow(state, ex) {
            return (None, self.flow.handle(state, text, ex, memory).into());
        }

        let action = planner::decide(state, &ex.intents, missing);
        let input = TurnInput {
            text,
            extraction: ex,
            missing_slots: missing,
        };
        (Some(action), self.executor.execute(action, input, memory).await)
    }

    /// Replace the session's memory wholesale.
    pub fn reset(&self, session: &mut Session) {
        let old = session.id().to_owned();
        session.memory.reset();
        tracing::info!(old = %old, new = session.id(), "session reset");
    }

    pub fn summary(&self, session: &Session) -> Summary {
        session.memory.summary()
    }

    pub fn debug_summary(&self, session: &Session) -> DebugSummary {
        session.memory.debug_summary()
    }
}

/// Calculation or product questions with no place named, and a bare goodbye
/// before an outlet is chosen, go to the planner.
fn leaves_outlet_flow(state: ConversationState, ex: &Extraction) -> bool {
    if ex.names_location() {
        return false;
    }
    if ex.has_intent(Intent::CalcRequest) || ex.has_intent(Intent::ProductQuery) {
        return true;
    }
    state != ConversationState::InformationRequest
        && ex.has_intent(Intent::Goodbye)
        && ex.entities.is_empty()
}

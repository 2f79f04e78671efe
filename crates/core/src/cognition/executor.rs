use std::sync::Arc;
use wren_tool::ToolAdapter;

use crate::catalog::{Catalog, plural};
use crate::cognition::calculator;
use crate::dialogue::{FlowOutcome, OutletFlow};
use crate::memory::{ContextUpdate, ConversationMemory};
use crate::types::{Action, ConversationState, Extraction, Intent, MissingSlot};

/// What the executor needs from the current turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnInput<'a> {
    pub text: &'a str,
    pub extraction: &'a Extraction,
    pub missing_slots: &'a [MissingSlot],
}

/// Result of one executed action.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub reply: String,
    pub updates: Vec<ContextUpdate>,
    pub next_state: Option<ConversationState>,
    pub tool_result: Option<f64>,
    /// Expression sent to the calculator, set on success.
    pub expression: Option<String>,
    /// True when a tool (calculator, catalog, outlet query) was invoked.
    pub tool_called: bool,
}

impl Execution {
    fn reply(text: impl Into<String>, next_state: Option<ConversationState>) -> Self {
        Self {
            reply: text.into(),
            updates: Vec::new(),
            next_state,
            tool_result: None,
            expression: None,
            tool_called: false,
        }
    }
}

impl From<FlowOutcome> for Execution {
    fn from(outcome: FlowOutcome) -> Self {
        Self {
            reply: outcome.reply,
            updates: outcome.updates,
            next_state: outcome.next_state,
            tool_result: None,
            expression: None,
            tool_called: false,
        }
    }
}

/// Runs a planned action. Every failure ends as a reply string.
pub struct ActionExecutor {
    catalog: Arc<Catalog>,
    flow: Arc<OutletFlow>,
    calculator: ToolAdapter,
}

impl ActionExecutor {
    pub fn new(catalog: Arc<Catalog>, flow: Arc<OutletFlow>, calculator: ToolAdapter) -> Self {
        Self {
            catalog,
            flow,
            calculator,
        }
    }

    pub async fn execute(
        &self,
        action: Action,
        input: TurnInput<'_>,
        memory: &ConversationMemory,
    ) -> Execution {
        match action {
            Action::AskFollowup => self.ask_followup(input.missing_slots),
            Action::CallCalculator => self.calculate(input.text).await,
            Action::CallCatalogSearch => self.search_catalog(input.extraction, input.text),
            Action::CallStructuredQuery => {
                let mut execution =
                    Execution::from(self.flow.initial(input.text, input.extraction, memory));
                execution.tool_called = true;
                execution
            }
            Action::Finish => finish(input.extraction, memory),
        }
    }

    fn ask_followup(&self, missing: &[MissingSlot]) -> Execution {
        match missing.first() {
            Some(MissingSlot::IncompleteExpression) => Execution::reply(
                "Could you provide a complete mathematical expression? For example: '5 + 3' or '10 * 2'",
                Some(ConversationState::WaitingForClarification),
            ),
            Some(MissingSlot::NoSpecificProduct) => Execution::reply(
                format!(
                    "What specific drinkware are you looking for? We have {}.",
                    self.catalog.product_list()
                ),
                Some(ConversationState::WaitingForClarification),
            ),
            Some(MissingSlot::NoLocationOrQuery) => Execution::reply(
                "We have outlets in several locations! Which area are you interested in, or what would you like to know (hours, phone, address)?",
                Some(ConversationState::LocationInquiry),
            ),
            None => Execution::reply(
                "Could you provide more details?",
                Some(ConversationState::WaitingForClarification),
            ),
        }
    }

    async fn calculate(&self, text: &str) -> Execution {
        let expression = calculator::extract_expression(text);
        if let Err(e) = calculator::validate(&expression) {
            tracing::info!(expression = %expression, error = %e, "expression rejected before tool call");
            return Execution::reply(
                format!("Sorry, I couldn't calculate that: {e}"),
                Some(ConversationState::Processing),
            );
        }

        let outcome = match self.calculator.call(&expression).await {
            Ok(value) => {
                tracing::info!(
                    backend = self.calculator.backend_name(),
                    expression = %expression,
                    value,
                    "calculated"
                );
                Execution {
                    tool_result: Some(value),
                    expression: Some(expression),
                    ..Execution::reply(
                        format!("The result is: {}", calculator::format_result(value)),
                        Some(ConversationState::Processing),
                    )
                }
            }
            Err(e) => Execution::reply(
                format!("Sorry, I couldn't calculate that: {e}"),
                Some(ConversationState::Processing),
            ),
        };
        Execution {
            tool_called: true,
            ..outcome
        }
    }

    fn search_catalog(&self, ex: &Extraction, text: &str) -> Execution {
        let found = ex
            .products()
            .find_map(|keyword| self.catalog.product(keyword))
            .or_else(|| self.catalog.search_products(text));
        let reply = match found {
            Some(product) => format!(
                "Here's what I found about {}: {}",
                plural(&product.keyword),
                product.description
            ),
            None => format!(
                "I couldn't find specific drinkware matching your query. We offer {}.",
                self.catalog.product_list()
            ),
        };
        Execution {
            tool_called: true,
            ..Execution::reply(reply, Some(ConversationState::Processing))
        }
    }
}

/// Closing reply. Always lands in `Completed` and reports the tool calls made
/// so far. Once completed, further greeting or help turns stay there.
fn finish(ex: &Extraction, memory: &ConversationMemory) -> Execution {
    let calls = tool_call_count(memory.tool_calls());
    let reply = if ex.has_intent(Intent::Goodbye) {
        match calls {
            Some(calls) => format!("Goodbye! I made {calls} for you this session. Have a great day!"),
            None => "Goodbye! Feel free to come back anytime.".to_owned(),
        }
    } else if ex.has_intent(Intent::Greeting) || memory.state() == ConversationState::Completed {
        let lead = if ex.has_intent(Intent::Greeting) {
            "Hello! I can help you with calculations, our drinkware products, or outlet information."
        } else {
            "I can still help you with calculations, our drinkware products, or outlet information."
        };
        match calls {
            Some(calls) => format!("{lead} So far I've made {calls} for you. What would you like to know?"),
            None => format!("{lead} What would you like to know?"),
        }
    } else {
        match calls {
            Some(calls) => format!(
                "Alright, that wraps it up. I made {calls} for you this session. Let me know if you need anything else!"
            ),
            None => "Alright! Let me know if you need help with calculations, our drinkware, or our outlets.".to_owned(),
        }
    };
    Execution::reply(reply, Some(ConversationState::Completed))
}

/// "1 tool call", "3 tool calls"; `None` for zero.
fn tool_call_count(n: u32) -> Option<String> {
    match n {
        0 => None,
        1 => Some("1 tool call".to_owned()),
        n => Some(format!("{n} tool calls")),
    }
}

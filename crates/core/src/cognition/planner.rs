use crate::types::{Action, ConversationState, Intent, MissingSlot};
use std::collections::BTreeSet;

/// Choose the next action. Total and deterministic; first match wins:
/// missing slot, calculation, product, outlet, otherwise finish.
///
/// `state` is accepted for callers that log it; the decision table itself
/// does not branch on it.
pub fn decide(
    state: ConversationState,
    intents: &BTreeSet<Intent>,
    missing_slots: &[MissingSlot],
) -> Action {
    let action = if !missing_slots.is_empty() {
        Action::AskFollowup
    } else if intents.contains(&Intent::CalcRequest) {
        Action::CallCalculator
    } else if intents.contains(&Intent::ProductQuery) {
        Action::CallCatalogSearch
    } else if intents.contains(&Intent::OutletQuery) {
        Action::CallStructuredQuery
    } else {
        Action::Finish
    };
    tracing::debug!(%state, ?action, "planned");
    action
}

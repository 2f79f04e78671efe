use crate::cognition::perception::PatternMatcher;
use crate::types::{ConversationState, Region};

/// Mid-conversation topic switch: an explicit marker ("actually", "what about",
/// "instead", ...) plus a named region, outside the initial state.
///
/// When several regions are named the one mentioned last wins. Takes
/// priority over every state handler and the planner.
pub fn detect_switch(matcher: &PatternMatcher, text: &str, state: ConversationState) -> Option<Region> {
    if state == ConversationState::Initial || !matcher.has_switch_marker(text) {
        return None;
    }
    let region = matcher.last_mentioned_region(text)?;
    tracing::info!(from = %state, to = region.key(), "topic switch");
    Some(region)
}

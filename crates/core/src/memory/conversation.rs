use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{
    Action, CalculationRecord, ConversationState, DebugSummary, EntityTag, Intent, MissingSlot,
    OutletRef, Region, SessionExport, Summary, Turn,
};

pub const KEY_INQUIRY_LOCATION: &str = "inquiry_location";
pub const KEY_SELECTED_OUTLET: &str = "selected_outlet";

static NULL: Value = Value::Null;

/// Everything a turn contributes, before the memory stamps id and time.
#[derive(Debug, Clone, Default)]
pub struct NewTurn {
    pub user_input: String,
    pub bot_response: String,
    pub action: Option<Action>,
    pub intents: Vec<Intent>,
    pub entities: Vec<EntityTag>,
    pub missing_slots: Vec<MissingSlot>,
    pub tool_result: Option<f64>,
}

/// A context mutation produced by a handler, applied when the turn commits.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    Set(String, Value),
    Remove(String),
}

/// Per-session conversation record. Owned by exactly one session.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    session_id: String,
    turns: Vec<Turn>,
    state: ConversationState,
    context: BTreeMap<String, Value>,
    calculations: Vec<CalculationRecord>,
    tool_calls: u32,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self {
            session_id: new_session_id(),
            turns: Vec::new(),
            state: ConversationState::Initial,
            context: BTreeMap::new(),
            calculations: Vec::new(),
            tool_calls: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn calculations(&self) -> &[CalculationRecord] {
        &self.calculations
    }

    pub fn tool_calls(&self) -> u32 {
        self.tool_calls
    }

    /// Append a turn stamped with the current state. Returns its 1-based number.
    pub fn add_turn(&mut self, turn: NewTurn) -> u32 {
        let turn_id = self.turns.len() as u32 + 1;
        self.turns.push(Turn {
            turn_id,
            timestamp: Utc::now(),
            user_input: turn.user_input,
            bot_response: turn.bot_response,
            state: self.state,
            action: turn.action,
            intents: turn.intents,
            entities: turn.entities,
            missing_slots: turn.missing_slots,
            tool_result: turn.tool_result,
        });
        turn_id
    }

    pub fn set_state(&mut self, state: ConversationState) {
        if state != self.state {
            tracing::debug!(from = %self.state, to = %state, "state transition");
        }
        self.state = state;
    }

    // ── Context ──

    pub fn update_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn get_context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn get_context_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.context.get(key).unwrap_or(default)
    }

    pub fn remove_context(&mut self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }

    pub fn apply(&mut self, update: ContextUpdate) {
        match update {
            ContextUpdate::Set(key, value) => self.update_context(key, value),
            ContextUpdate::Remove(key) => {
                self.remove_context(&key);
            }
        }
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Region the outlet flow is scoped to, if set and known.
    pub fn inquiry_location(&self) -> Option<Region> {
        self.get_context_or(KEY_INQUIRY_LOCATION, &NULL)
            .as_str()
            .and_then(Region::from_key)
    }

    /// Currently selected outlet. A malformed stored value reads as none.
    pub fn selected_outlet(&self) -> Option<OutletRef> {
        serde_json::from_value(self.get_context_or(KEY_SELECTED_OUTLET, &NULL).clone()).ok()
    }

    // ── Tool bookkeeping ──

    pub fn record_calculation(&mut self, expression: impl Into<String>, result: f64) {
        self.calculations.push(CalculationRecord {
            expression: expression.into(),
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    /// Replace the whole record: new id, no history, empty context, `Initial`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn summary(&self) -> Summary {
        Summary {
            session_id: self.session_id.clone(),
            state: self.state,
            turn_count: self.turns.len(),
            context: self.context.clone(),
        }
    }

    pub fn debug_summary(&self) -> DebugSummary {
        let last = self.turns.last();
        DebugSummary {
            session_id: self.session_id.clone(),
            total_turns: self.turns.len(),
            current_state: self.state,
            last_user_input: last.map(|t| t.user_input.clone()),
            last_bot_response: last.map(|t| t.bot_response.clone()),
            context: self.context.clone(),
            conversation_flow: self.turns.iter().map(|t| t.state).collect(),
            tool_calls: self.tool_calls,
            calculations: self.calculations.len(),
        }
    }

    pub fn export(&self) -> SessionExport {
        SessionExport {
            session_id: self.session_id.clone(),
            turns: self.turns.clone(),
            final_state: self.state,
            context: self.context.clone(),
            calculations: self.calculations.clone(),
            tool_calls: self.tool_calls,
        }
    }

    /// Rebuild from an export. Turns are renumbered so ids stay gapless.
    pub fn from_export(export: SessionExport) -> Self {
        let mut turns = export.turns;
        for (i, turn) in turns.iter_mut().enumerate() {
            turn.turn_id = i as u32 + 1;
        }
        let session_id = if export.session_id.trim().is_empty() {
            new_session_id()
        } else {
            export.session_id
        };
        Self {
            session_id,
            turns,
            state: export.final_state,
            context: export.context,
            calculations: export.calculations,
            tool_calls: export.tool_calls,
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// `20260517_142233_1a2b3c4d`: timestamp plus a short random suffix.
fn new_session_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(input: &str) -> NewTurn {
        NewTurn {
            user_input: input.into(),
            bot_response: format!("re: {input}"),
            ..NewTurn::default()
        }
    }

    #[test]
    fn turn_numbers_are_gapless() {
        let mut mem = ConversationMemory::new();
        for i in 1..=5 {
            assert_eq!(mem.add_turn(turn(&format!("msg {i}"))), i);
        }
        let ids: Vec<u32> = mem.turns().iter().map(|t| t.turn_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn turn_records_state_at_commit() {
        let mut mem = ConversationMemory::new();
        mem.set_state(ConversationState::OutletSelection);
        mem.add_turn(turn("pj"));
        assert_eq!(mem.turns()[0].state, ConversationState::OutletSelection);
    }

    #[test]
    fn context_last_write_wins() {
        let mut mem = ConversationMemory::new();
        mem.update_context("k", json!(1));
        mem.update_context("k", json!("two"));
        assert_eq!(mem.get_context("k"), Some(&json!("two")));
        let fallback = json!(null);
        assert_eq!(mem.get_context_or("missing", &fallback), &json!(null));
        assert_eq!(mem.remove_context("k"), Some(json!("two")));
        assert!(mem.get_context("k").is_none());
    }

    #[test]
    fn apply_updates_in_order() {
        let mut mem = ConversationMemory::new();
        mem.apply(ContextUpdate::Set("a".into(), json!(1)));
        mem.apply(ContextUpdate::Set("b".into(), json!(2)));
        mem.apply(ContextUpdate::Remove("a".into()));
        mem.apply(ContextUpdate::Remove("never-set".into()));
        assert_eq!(mem.context().len(), 1);
        assert_eq!(mem.get_context("b"), Some(&json!(2)));
    }

    #[test]
    fn typed_context_accessors() {
        let mut mem = ConversationMemory::new();
        assert_eq!(mem.inquiry_location(), None);
        assert_eq!(mem.selected_outlet(), None);

        mem.update_context(KEY_INQUIRY_LOCATION, json!("kuala_lumpur"));
        mem.update_context(
            KEY_SELECTED_OUTLET,
            json!({ "region": "kuala_lumpur", "name": "KLCC Outlet" }),
        );
        assert_eq!(mem.inquiry_location(), Some(Region::KualaLumpur));
        assert_eq!(
            mem.selected_outlet(),
            Some(OutletRef::new(Region::KualaLumpur, "KLCC Outlet"))
        );

        mem.update_context(KEY_INQUIRY_LOCATION, json!("atlantis"));
        mem.update_context(KEY_SELECTED_OUTLET, json!(42));
        assert_eq!(mem.inquiry_location(), None);
        assert_eq!(mem.selected_outlet(), None);
    }

    #[test]
    fn reset_replaces_everything() {
        let mut mem = ConversationMemory::new();
        let old_id = mem.session_id().to_owned();
        mem.add_turn(turn("hello"));
        mem.update_context("k", json!(true));
        mem.set_state(ConversationState::Completed);
        mem.record_calculation("5 + 3", 8.0);
        mem.record_tool_call();

        mem.reset();
        assert_ne!(mem.session_id(), old_id);
        assert_eq!(mem.state(), ConversationState::Initial);
        assert!(mem.turns().is_empty());
        assert!(mem.context().is_empty());
        assert!(mem.calculations().is_empty());
        assert_eq!(mem.tool_calls(), 0);
    }

    #[test]
    fn session_id_shape() {
        let mem = ConversationMemory::new();
        let parts: Vec<&str> = mem.session_id().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn debug_summary_tracks_flow() {
        let mut mem = ConversationMemory::new();
        mem.set_state(ConversationState::OutletSelection);
        mem.add_turn(turn("pj"));
        mem.set_state(ConversationState::InformationRequest);
        mem.add_turn(turn("ss 2"));

        let debug = mem.debug_summary();
        assert_eq!(debug.total_turns, 2);
        assert_eq!(debug.last_user_input.as_deref(), Some("ss 2"));
        assert_eq!(
            debug.conversation_flow,
            vec![ConversationState::OutletSelection, ConversationState::InformationRequest]
        );
    }

    #[test]
    fn export_restore_preserves_session() {
        let mut mem = ConversationMemory::new();
        mem.set_state(ConversationState::InformationRequest);
        mem.add_turn(turn("klcc"));
        mem.update_context(KEY_INQUIRY_LOCATION, json!("kuala_lumpur"));
        mem.record_calculation("1 + 1", 2.0);

        let json = serde_json::to_string(&mem.export()).unwrap();
        let restored = ConversationMemory::from_export(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.session_id(), mem.session_id());
        assert_eq!(restored.state(), ConversationState::InformationRequest);
        assert_eq!(restored.turns().len(), 1);
        assert_eq!(restored.calculations().len(), 1);
        assert_eq!(restored.inquiry_location(), Some(Region::KualaLumpur));
    }

    #[test]
    fn corrupted_export_state_heals() {
        let raw = json!({
            "session_id": "abc",
            "turns": [],
            "final_state": "limbo",
        });
        let export: SessionExport = serde_json::from_value(raw).unwrap();
        let mem = ConversationMemory::from_export(export);
        assert_eq!(mem.state(), ConversationState::Initial);
        assert!(mem.context().is_empty());
    }
}

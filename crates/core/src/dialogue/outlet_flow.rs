//! Outlet dialogue: state handlers for location inquiry, outlet selection
//! and information requests.
//!
//! Handlers read memory but never write it. They return a [`FlowOutcome`]
//! the engine commits at the end of the turn.

use serde_json::{Value, json};
use std::sync::Arc;

use crate::catalog::{Catalog, OutletRecord};
use crate::cognition::perception::{PatternMatcher, place_name};
use crate::memory::{ContextUpdate, ConversationMemory, KEY_INQUIRY_LOCATION, KEY_SELECTED_OUTLET};
use crate::types::{ConversationState, Extraction, Intent, OutletRef, Region};

const BARE_PLACE_MAX_WORDS: usize = 3;

/// Reply plus the context and state changes a handler wants committed.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub reply: String,
    pub updates: Vec<ContextUpdate>,
    /// `None` leaves the state unchanged.
    pub next_state: Option<ConversationState>,
}

impl FlowOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            updates: Vec::new(),
            next_state: None,
        }
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.updates.push(ContextUpdate::Set(key.to_owned(), value));
        self
    }

    fn remove(mut self, key: &str) -> Self {
        self.updates.push(ContextUpdate::Remove(key.to_owned()));
        self
    }

    fn to(mut self, state: ConversationState) -> Self {
        self.next_state = Some(state);
        self
    }
}

fn outlet_value(outlet: &OutletRef) -> Value {
    json!({ "region": outlet.region.key(), "name": outlet.name })
}

/// Lowercase alphanumeric runs: "SS 2, what's" → ["ss", "2", "what", "s"].
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

pub struct OutletFlow {
    catalog: Arc<Catalog>,
    matcher: Arc<PatternMatcher>,
}

impl OutletFlow {
    pub fn new(catalog: Arc<Catalog>, matcher: Arc<PatternMatcher>) -> Self {
        Self { catalog, matcher }
    }

    /// Dispatch on the current state. States outside the outlet flow use
    /// the initial handler.
    pub fn handle(
        &self,
        state: ConversationState,
        text: &str,
        ex: &Extraction,
        memory: &ConversationMemory,
    ) -> FlowOutcome {
        match state {
            ConversationState::LocationInquiry => self.location_inquiry(text, ex),
            ConversationState::OutletSelection => self.outlet_selection(text, ex, memory),
            ConversationState::InformationRequest => self.information_request(ex, memory),
            _ => self.initial(text, ex, memory),
        }
    }

    // ── Handlers ──

    /// Entry point for outlet questions: direct outlet names first, then
    /// regions, then unknown places.
    pub fn initial(&self, text: &str, ex: &Extraction, memory: &ConversationMemory) -> FlowOutcome {
        if let Some(outcome) = self.direct_outlet(ex, "Great!") {
            return outcome;
        }
        if let Some(region) = self.matcher.last_mentioned_region(text) {
            return self.region_outcome(region, ex, "Yes!");
        }
        if let Some(place) = self.matcher.unknown_place(text) {
            return FlowOutcome::reply(format!(
                "I'm sorry, we don't have any outlets in {place} at the moment."
            ));
        }
        if ex.has_outlet_detail() {
            return match self.resolve_selected(memory) {
                Some((outlet, record)) => {
                    FlowOutcome::reply(info_reply(record, ex))
                        .set(KEY_INQUIRY_LOCATION, json!(outlet.region.key()))
                        .to(ConversationState::InformationRequest)
                }
                None => need_outlet_first(),
            };
        }
        FlowOutcome::reply("Yes, we have outlets in several locations! Which area are you interested in?")
            .to(ConversationState::LocationInquiry)
    }

    pub fn location_inquiry(&self, text: &str, ex: &Extraction) -> FlowOutcome {
        if let Some(outcome) = self.direct_outlet(ex, "Perfect!") {
            return outcome;
        }
        if let Some(region) = self.matcher.last_mentioned_region(text) {
            return self.region_outcome(region, ex, "Great!");
        }
        let regions = self.catalog.region_list();
        match self.named_place(text, ex) {
            Some(place) => FlowOutcome::reply(format!(
                "I'm sorry, we don't have any outlets in {place} at the moment. We have outlets in {regions}."
            )),
            None => FlowOutcome::reply(format!(
                "Which location are you interested in? We have outlets in {regions}."
            )),
        }
    }

    /// Resolve the utterance against the outlets of the region in context.
    pub fn outlet_selection(
        &self,
        text: &str,
        ex: &Extraction,
        memory: &ConversationMemory,
    ) -> FlowOutcome {
        let Some(region) = memory.inquiry_location() else {
            return FlowOutcome::reply(
                "I'm not sure which outlet you're referring to. Could you please specify which outlet you're interested in?",
            )
            .to(ConversationState::LocationInquiry);
        };

        if let Some(record) = self.match_outlet(region, text) {
            let outlet = OutletRef::new(region, record.name.clone());
            return select(outlet, record, ex, "Perfect!");
        }

        let region_name = region.display_name();
        FlowOutcome::reply(format!(
            "We don't have that outlet in {region_name}. Our {region_name} outlets are: {}.",
            self.catalog.outlet_names(region).join(", ")
        ))
    }

    /// Answer about the selected outlet. Naming another outlet re-selects it.
    pub fn information_request(&self, ex: &Extraction, memory: &ConversationMemory) -> FlowOutcome {
        let renamed = ex
            .outlet_ref()
            .filter(|named| memory.selected_outlet().as_ref() != Some(named))
            .and_then(|named| {
                let record = self.catalog.resolve(&named)?;
                Some((named, record))
            });
        if let Some((outlet, record)) = renamed {
            return select(outlet, record, ex, "Sure!");
        }

        let Some((_, record)) = self.resolve_selected(memory) else {
            return need_outlet_first();
        };

        if ex.has_intent(Intent::Goodbye) {
            return FlowOutcome::reply(
                "You're welcome! Feel free to ask if you need any other information about our outlets.",
            )
            .to(ConversationState::Completed);
        }
        FlowOutcome::reply(info_reply(record, ex))
    }

    /// Mid-conversation switch to `region`: drop the selection and list the
    /// region's outlets, or select one directly if the utterance names it.
    pub fn switch_region(&self, region: Region, text: &str, ex: &Extraction) -> FlowOutcome {
        let names = self.catalog.outlet_names(region);
        if names.is_empty() {
            return FlowOutcome::reply(format!(
                "I'm sorry, we don't have any outlets in {region} at the moment. We have outlets in {}.",
                self.catalog.region_list()
            ));
        }

        let switched = FlowOutcome::reply(String::new())
            .set(KEY_INQUIRY_LOCATION, json!(region.key()))
            .remove(KEY_SELECTED_OUTLET);

        if let Some(record) = self.match_outlet(region, text) {
            let outlet = OutletRef::new(region, record.name.clone());
            let mut chosen = select(outlet, record, ex, "");
            chosen.reply = format!("Switching to {region}. {}", chosen.reply.trim_start());
            let mut updates = switched.updates;
            updates.extend(chosen.updates);
            chosen.updates = updates;
            return chosen;
        }

        FlowOutcome {
            reply: format!(
                "Switching to {region}. Which outlet are you referring to? We have: {}",
                names.join(", ")
            ),
            ..switched
        }
        .to(ConversationState::OutletSelection)
    }

    // ── Helpers ──

    fn direct_outlet(&self, ex: &Extraction, lead: &str) -> Option<FlowOutcome> {
        let outlet = ex.outlet_ref()?;
        let record = self.catalog.resolve(&outlet)?;
        Some(select(outlet, record, ex, lead))
    }

    fn region_outcome(&self, region: Region, ex: &Extraction, lead: &str) -> FlowOutcome {
        let outlets = self.catalog.outlets(region);
        match outlets {
            [] => FlowOutcome::reply(format!(
                "I'm sorry, we don't have any outlets in {region} at the moment. We have outlets in {}.",
                self.catalog.region_list()
            )),
            [only] => {
                let outlet = OutletRef::new(region, only.name.clone());
                let reply = if ex.has_outlet_detail() {
                    info_reply(only, ex)
                } else {
                    format!(
                        "{lead} We have the {} in {}. What would you like to know about it?",
                        only.name, only.location
                    )
                };
                FlowOutcome::reply(reply)
                    .set(KEY_INQUIRY_LOCATION, json!(region.key()))
                    .set(KEY_SELECTED_OUTLET, outlet_value(&outlet))
                    .to(ConversationState::InformationRequest)
            }
            many => {
                let names: Vec<&str> = many.iter().map(|o| o.name.as_str()).collect();
                FlowOutcome::reply(format!(
                    "{lead} We have outlets in {region}. Which outlet are you referring to? We have: {}",
                    names.join(", ")
                ))
                .set(KEY_INQUIRY_LOCATION, json!(region.key()))
                .remove(KEY_SELECTED_OUTLET)
                .to(ConversationState::OutletSelection)
            }
        }
    }

    fn resolve_selected(&self, memory: &ConversationMemory) -> Option<(OutletRef, &OutletRecord)> {
        let outlet = memory.selected_outlet()?;
        let record = self.catalog.resolve(&outlet)?;
        Some((outlet, record))
    }

    /// Outlet in `region` whose alias appears as whole words in `text`.
    ///
    /// An SS-numbered outlet is rejected when any other SS number is also
    /// mentioned, so "ss 2" never matches "ss 20" or "ss 2 or ss 15".
    fn match_outlet(&self, region: Region, text: &str) -> Option<&OutletRecord> {
        let words = tokens(text);
        let mentioned = self.matcher.ss_numbers(text);
        self.catalog.outlets(region).iter().find(|outlet| {
            let named = outlet
                .aliases
                .iter()
                .any(|alias| contains_sequence(&words, &tokens(alias)));
            if !named {
                return false;
            }
            let own = outlet
                .aliases
                .iter()
                .find_map(|alias| self.matcher.ss_numbers(alias).first().copied());
            match own {
                Some(own) => mentioned.iter().all(|n| *n == own),
                None => true,
            }
        })
    }

    /// Place named in an utterance that is not a known region.
    fn named_place(&self, text: &str, ex: &Extraction) -> Option<String> {
        if let Some(place) = self.matcher.unknown_place(text) {
            return Some(place);
        }
        let bare = text.trim().trim_end_matches(['?', '!', '.']);
        let words = bare.split_whitespace().count();
        let alphabetic = bare.chars().all(|c| c.is_alphabetic() || c == ' ');
        let plain = ex.intents.is_empty() && ex.entities.is_empty();
        if plain && alphabetic && (1..=BARE_PLACE_MAX_WORDS).contains(&words) {
            place_name(bare)
        } else {
            None
        }
    }
}

fn select(outlet: OutletRef, record: &OutletRecord, ex: &Extraction, lead: &str) -> FlowOutcome {
    let reply = if ex.has_outlet_detail() {
        info_reply(record, ex)
    } else {
        format!(
            "{lead} You're asking about the {}. What would you like to know about it?",
            record.name
        )
    };
    FlowOutcome::reply(reply)
        .set(KEY_INQUIRY_LOCATION, json!(outlet.region.key()))
        .set(KEY_SELECTED_OUTLET, outlet_value(&outlet))
        .to(ConversationState::InformationRequest)
}

fn need_outlet_first() -> FlowOutcome {
    FlowOutcome::reply("I'm sorry, I need to know which outlet you're asking about first.")
        .to(ConversationState::LocationInquiry)
}

/// Detail reply for one outlet: hours, then address, then phone, else the full card.
fn info_reply(outlet: &OutletRecord, ex: &Extraction) -> String {
    if ex.has_intent(Intent::OpeningTime) {
        format!(
            "Ah yes, the {} opens at {} and closes at {}. Is there anything else you'd like to know?",
            outlet.name, outlet.open_time, outlet.close_time
        )
    } else if ex.has_intent(Intent::Address) {
        format!(
            "The {} address is {}. What else would you like to know?",
            outlet.name, outlet.address
        )
    } else if ex.has_intent(Intent::Phone) {
        format!("You can contact the {} at {}. Any other questions?", outlet.name, outlet.phone)
    } else {
        format!(
            "Here's the information for {}:\nLocation: {}\nHours: {} - {}\nPhone: {}\nIs there anything specific you'd like to know?",
            outlet.name, outlet.address, outlet.open_time, outlet.close_time, outlet.phone
        )
    }
}

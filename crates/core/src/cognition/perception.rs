//! Perception: rule-based intent and entity extraction.
//!
//! Every pattern is compiled once in [`PatternMatcher::new`]; the matcher is
//! immutable afterwards and shared across sessions. The `regex` engine runs in
//! time linear in the input, so pathological utterances cannot blow up.

use crate::types::{EntityTag, Extraction, Intent, Region};
use regex::Regex;
use std::collections::BTreeSet;

const INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::CalcRequest,
        &[
            r"\d\s*[+\-*/]\s*[\d(]",
            r"\b(calculate|compute|math|add|subtract|multiply|divide|evaluate|solve)\b",
            r"\bwhat\s+is\s+\(?\d",
            r"\d\s*[+\-*/]",
            r"\d\s+(plus|minus|times|divided\s+by|multiplied\s+by)\b",
            r"\b(sum|product|difference|quotient)\s+of\s+\d",
        ],
    ),
    (
        Intent::ProductQuery,
        &[
            r"\b(mugs?|cups?|bottles?|tumblers?|glass(es)?|flasks?|drinkware)\b",
            r"\b(what|show|which)\b.*\bproducts?\b",
            r"\bavailable\s+items\b",
            r"\b(need\s+a|want\s+to\s+buy|looking\s+for\s+(a|an|some))\b",
        ],
    ),
    (
        Intent::OutletQuery,
        &[
            r"\b(outlets?|stores?|shops?|branch(es)?|locations?)\b",
            r"\bwhere\b.*\blocated\b|\baddress\b|\bfind\b.*\bstores?\b",
            r"\b(hours|opening|closing|open|phone|contact)\b|\btime\b",
            r"\b(petaling\s+jaya|kuala\s+lumpur|pj|kl|klcc|ss\s*\d+)\b",
        ],
    ),
    (
        Intent::OpeningTime,
        &[r"\b(opening|open|opens|time|hours|when|closing|close|closes)\b"],
    ),
    (
        Intent::Address,
        &[r"\b(where|location|address|located|exactly|directions?)\b"],
    ),
    (Intent::Phone, &[r"\b(phone|number|contact|call)\b"]),
    (
        Intent::Greeting,
        &[
            r"^\s*(hi|hello|hey|good\s+(morning|afternoon|evening))\b",
            r"^\s*(what's\s+up|how\s+are\s+you|how\s+do\s+you\s+do)\b",
        ],
    ),
    (
        Intent::Goodbye,
        &[
            r"\b(bye|goodbye|see\s+you|farewell|thanks|thx|thank\s+you|cheers)\b",
            r"\b(that's\s+all|that\s+is\s+all|i'm\s+done|i\s+am\s+done)\b",
        ],
    ),
];

const ENTITY_PATTERNS: &[(EntityTag, &str)] = &[
    (EntityTag::PetalingJaya, r"\b(petaling\s+jaya|pj|ss\s*\d+)\b"),
    (EntityTag::KualaLumpur, r"\b(kuala\s+lumpur|kl|klcc)\b"),
    (EntityTag::Ss2, r"\bss\s*2\b"),
    (EntityTag::PjCentral, r"\bpj\s*central\b"),
    (EntityTag::Klcc, r"\bklcc\b"),
    (EntityTag::Mug, r"\bmugs?\b"),
    (EntityTag::Cup, r"\bcups?\b"),
    (EntityTag::Bottle, r"\bbottles?\b"),
    (EntityTag::Tumbler, r"\btumblers?\b"),
    (EntityTag::Glass, r"\bglass(es)?\b"),
    (EntityTag::Flask, r"\bflasks?\b"),
];

const COMPLETE_EXPRESSION: &str =
    r"[\d)]\s*([+\-*/]|plus|minus|times|divided\s+by|multiplied\s+by)\s*[\d(]";
const SWITCH_MARKER: &str = r"\b(actually|what\s+about|how\s+about|instead|switch\s+to|change\s+to)\b";
const UNKNOWN_PLACE: &str = r"\boutlets?\s+(?:in|near)\s+([a-z][a-z ]*[a-z])";
const SS_NUMBER: &str = r"\bss\s*(\d+)\b";

const NOT_PLACE: &[&str] = &[
    "me", "my", "you", "your", "our", "us", "we", "i", "it", "here", "there", "the", "this",
    "that", "a", "an", "any", "some", "all", "every", "general", "moment", "area", "town",
    "city", "now", "today", "tonight", "please", "near", "in", "at", "around", "nearby",
];

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){pattern}"))
}

/// Compiled pattern table.
#[derive(Debug)]
pub struct PatternMatcher {
    intents: Vec<(Intent, Vec<Regex>)>,
    entities: Vec<(EntityTag, Regex)>,
    complete_expression: Regex,
    switch_marker: Regex,
    unknown_place: Regex,
    ss_number: Regex,
    max_bytes: usize,
}

impl PatternMatcher {
    /// Compile the pattern table. Inputs longer than `max_bytes` match nothing.
    pub fn new(max_bytes: usize) -> Result<Self, regex::Error> {
        let intents = INTENT_PATTERNS
            .iter()
            .map(|(intent, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|p| compile(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*intent, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let entities = ENTITY_PATTERNS
            .iter()
            .map(|(tag, p)| Ok((*tag, compile(p)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            intents,
            entities,
            complete_expression: compile(COMPLETE_EXPRESSION)?,
            switch_marker: compile(SWITCH_MARKER)?,
            unknown_place: compile(UNKNOWN_PLACE)?,
            ss_number: compile(SS_NUMBER)?,
            max_bytes,
        })
    }

    fn accepts(&self, text: &str) -> bool {
        if text.len() > self.max_bytes {
            tracing::warn!(
                len = text.len(),
                max = self.max_bytes,
                "utterance too long, skipping pattern match"
            );
            return false;
        }
        true
    }

    /// Matched intents and entity tags. Each tag appears at most once.
    pub fn extract(&self, text: &str) -> Extraction {
        if !self.accepts(text) {
            return Extraction::default();
        }

        let intents: BTreeSet<Intent> = self
            .intents
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
            .map(|(intent, _)| *intent)
            .collect();
        let entities: BTreeSet<EntityTag> = self
            .entities
            .iter()
            .filter(|(_, p)| p.is_match(text))
            .map(|(tag, _)| *tag)
            .collect();

        tracing::debug!(?intents, ?entities, "extracted");
        Extraction { intents, entities }
    }

    /// True if the utterance holds a full binary arithmetic expression.
    pub fn has_complete_expression(&self, text: &str) -> bool {
        self.accepts(text) && self.complete_expression.is_match(text)
    }

    pub fn has_switch_marker(&self, text: &str) -> bool {
        self.accepts(text) && self.switch_marker.is_match(text)
    }

    /// Region whose mention ends last in the utterance.
    pub fn last_mentioned_region(&self, text: &str) -> Option<Region> {
        if !self.accepts(text) {
            return None;
        }
        self.entities
            .iter()
            .filter_map(|(tag, p)| {
                let region = tag.region()?;
                let end = p.find_iter(text).last()?.end();
                Some((end, region))
            })
            .max_by_key(|(end, _)| *end)
            .map(|(_, region)| region)
    }

    /// Every "ss N" number mentioned.
    pub fn ss_numbers(&self, text: &str) -> Vec<u32> {
        if !self.accepts(text) {
            return Vec::new();
        }
        self.ss_number
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect()
    }

    /// Place named in "outlets in <place>", title-cased. "outlets near me"
    /// and "outlets in your area" name no place.
    pub fn unknown_place(&self, text: &str) -> Option<String> {
        if !self.accepts(text) {
            return None;
        }
        let place = self.unknown_place.captures(text)?.get(1)?.as_str();
        place_name(place)
    }
}

/// Leading run of place-like words, title-cased. `None` when the first word
/// is a pronoun, determiner, filler or time word.
pub fn place_name(candidate: &str) -> Option<String> {
    let words: Vec<&str> = candidate
        .split_whitespace()
        .take_while(|w| !NOT_PLACE.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        return None;
    }
    Some(title_case(&words.join(" ")))
}

/// "johor  bahru" → "Johor Bahru".
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Coarse user goal detected from phrasing. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CalcRequest,
    ProductQuery,
    OutletQuery,
    /// Outlet sub-intents, consumed by the information handler.
    OpeningTime,
    Address,
    Phone,
    Greeting,
    Goodbye,
}

impl Intent {
    /// True for the outlet detail sub-intents.
    pub fn is_outlet_detail(self) -> bool {
        matches!(self, Self::OpeningTime | Self::Address | Self::Phone)
    }
}

/// Region served by the outlet catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    PetalingJaya,
    KualaLumpur,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::PetalingJaya, Region::KualaLumpur];

    /// Context key form, e.g. `petaling_jaya`.
    pub fn key(self) -> &'static str {
        match self {
            Self::PetalingJaya => "petaling_jaya",
            Self::KualaLumpur => "kuala_lumpur",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::PetalingJaya => "Petaling Jaya",
            Self::KualaLumpur => "Kuala Lumpur",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.key() == key)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Named thing mentioned in an utterance. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTag {
    // regions
    PetalingJaya,
    KualaLumpur,
    // specific outlets
    Ss2,
    PjCentral,
    Klcc,
    // drinkware
    Mug,
    Cup,
    Bottle,
    Tumbler,
    Glass,
    Flask,
}

impl EntityTag {
    pub fn region(self) -> Option<Region> {
        match self {
            Self::PetalingJaya => Some(Region::PetalingJaya),
            Self::KualaLumpur => Some(Region::KualaLumpur),
            _ => None,
        }
    }

    /// Weak reference to the outlet this tag names directly, if any.
    pub fn outlet_ref(self) -> Option<OutletRef> {
        let (region, name) = match self {
            Self::Ss2 => (Region::PetalingJaya, "SS 2 Outlet"),
            Self::PjCentral => (Region::PetalingJaya, "PJ Central Outlet"),
            Self::Klcc => (Region::KualaLumpur, "KLCC Outlet"),
            _ => return None,
        };
        Some(OutletRef::new(region, name))
    }

    /// Catalog keyword for drinkware tags.
    pub fn product(self) -> Option<&'static str> {
        match self {
            Self::Mug => Some("mug"),
            Self::Cup => Some("cup"),
            Self::Bottle => Some("bottle"),
            Self::Tumbler => Some("tumbler"),
            Self::Glass => Some("glass"),
            Self::Flask => Some("flask"),
            _ => None,
        }
    }
}

/// Weak reference into the catalog: region plus outlet name, resolved on use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutletRef {
    pub region: Region,
    pub name: String,
}

impl OutletRef {
    pub fn new(region: Region, name: impl Into<String>) -> Self {
        Self {
            region,
            name: name.into(),
        }
    }
}

/// Intents and entities matched in one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub intents: BTreeSet<Intent>,
    pub entities: BTreeSet<EntityTag>,
}

impl Extraction {
    pub fn has_intent(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }

    pub fn has_entity(&self, tag: EntityTag) -> bool {
        self.entities.contains(&tag)
    }

    pub fn has_outlet_detail(&self) -> bool {
        self.intents.iter().any(|i| i.is_outlet_detail())
    }

    /// First specific outlet named, in vocabulary order.
    pub fn outlet_ref(&self) -> Option<OutletRef> {
        self.entities.iter().find_map(|e| e.outlet_ref())
    }

    /// True if any region or specific outlet is named.
    pub fn names_location(&self) -> bool {
        self.entities
            .iter()
            .any(|e| e.region().is_some() || e.outlet_ref().is_some())
    }

    pub fn products(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entities.iter().filter_map(|e| e.product())
    }
}

/// Bot action chosen by the planner. Exactly one per planned turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AskFollowup,
    CallCalculator,
    CallCatalogSearch,
    CallStructuredQuery,
    Finish,
}

/// Information required to fulfil an intent but absent from the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSlot {
    IncompleteExpression,
    NoSpecificProduct,
    NoLocationOrQuery,
}

/// Conversation state. `Initial` is the only entry state; `Completed` is soft-terminal.
///
/// Serialized as a snake_case string. Deserialization never fails: an
/// unrecognized value becomes `Initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    #[default]
    Initial,
    Processing,
    LocationInquiry,
    OutletSelection,
    InformationRequest,
    WaitingForClarification,
    Completed,
}

impl ConversationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Processing => "processing",
            Self::LocationInquiry => "location_inquiry",
            Self::OutletSelection => "outlet_selection",
            Self::InformationRequest => "information_request",
            Self::WaitingForClarification => "waiting_for_clarification",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let state = match s.trim().to_ascii_lowercase().as_str() {
            "initial" => Self::Initial,
            "processing" => Self::Processing,
            "location_inquiry" => Self::LocationInquiry,
            "outlet_selection" => Self::OutletSelection,
            "information_request" => Self::InformationRequest,
            "waiting_for_clarification" => Self::WaitingForClarification,
            "completed" => Self::Completed,
            _ => return None,
        };
        Some(state)
    }

    /// Parse, treating anything out of vocabulary as `Initial`.
    pub fn parse_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            tracing::warn!(state = s, "unrecognized conversation state, resetting to initial");
            Self::Initial
        })
    }

    /// States owned by the outlet dialogue handlers.
    pub fn is_outlet_flow(self) -> bool {
        matches!(
            self,
            Self::LocationInquiry | Self::OutletSelection | Self::InformationRequest
        )
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConversationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConversationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            Some(s) => Self::parse_lossy(s),
            None => Self::parse_lossy(&raw.to_string()),
        })
    }
}

/// One committed exchange. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based, gapless.
    pub turn_id: u32,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub bot_response: String,
    /// State after the turn.
    pub state: ConversationState,
    pub action: Option<Action>,
    pub intents: Vec<Intent>,
    pub entities: Vec<EntityTag>,
    pub missing_slots: Vec<MissingSlot>,
    pub tool_result: Option<f64>,
}

/// A successful calculator evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub expression: String,
    pub result: f64,
    pub timestamp: DateTime<Utc>,
}

/// Engine boundary summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub session_id: String,
    pub state: ConversationState,
    pub turn_count: usize,
    pub context: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSummary {
    pub session_id: String,
    pub total_turns: usize,
    pub current_state: ConversationState,
    pub last_user_input: Option<String>,
    pub last_bot_response: Option<String>,
    pub context: BTreeMap<String, serde_json::Value>,
    /// State after each turn, oldest first.
    pub conversation_flow: Vec<ConversationState>,
    pub tool_calls: u32,
    pub calculations: usize,
}

/// Flat, serializable session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub final_state: ConversationState,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub calculations: Vec<CalculationRecord>,
    #[serde(default)]
    pub tool_calls: u32,
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Normalized transport endpoint address
pub type PeerAddress = String;

/// Connected participants, keyed by endpoint address
pub type Roster = HashMap<PeerAddress, String>;

/// One participant's questionnaire answers, keyed by question position
pub type CharacterSheet = BTreeMap<usize, String>;

/// All character sheets, keyed by display name (not endpoint address)
pub type SheetCollection = HashMap<String, CharacterSheet>;

/// Ordered question list; positions are the join key for sheet answers
pub type QuestionnaireSchema = Vec<String>;

/// Namespace prefix for channel addresses, so session ids can't collide
/// with arbitrary endpoints on the same transport
pub const SESSION_NAMESPACE: &str = "dread-rpg-game-";

pub const DEFAULT_WEDGE_COUNT: usize = 25;

pub const DEFAULT_QUESTIONS: &[&str] = &[
    "What is your name?",
    "What do you look like?",
    "What is your occupation?",
    "Why did you choose to go on this adventure?",
    "What are your interests and hobbies?",
    "What is your biggest fear?",
    "What are you most proud of?",
    "What secret would you never share with anyone?",
    "What gives you courage?",
    "Tell me 3 of your weaknesses",
];

pub fn default_questions() -> QuestionnaireSchema {
    DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// Human-shared session identifier, kept verbatim for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as the user typed it
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical channel address: dashes stripped, whitespace trimmed,
    /// namespace prefixed. "a-bc-1" and "abc1" resolve to the same endpoint.
    pub fn address(&self) -> PeerAddress {
        format!("{}{}", SESSION_NAMESPACE, self.0.replace('-', "").trim())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One outcome slot on the wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wedge {
    Success,
    Death,
}

/// Positionally significant outcome labels; position = wedge index
pub type WheelDistribution = Vec<Wedge>;

/// All-success distribution, the state every session starts from
pub fn fresh_distribution(wedge_count: usize) -> WheelDistribution {
    vec![Wedge::Success; wedge_count]
}

/// GM-authored narrative document, replaced wholesale on every save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDocument {
    pub title: String,
    pub description: String,
    pub setting: String,
    pub characters: String,
    pub goals: String,
    pub threats: String,
    pub rules: String,
    /// RFC3339, set by the GM at save time
    pub last_updated: String,
}

/// Full authoritative state bundle exchanged via welcome / game-data-sync.
/// Applying the same snapshot twice must yield the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub host_name: String,
    pub users: Roster,
    pub wedge_count: usize,
    pub wheel_distribution: WheelDistribution,
    pub scenario: Option<ScenarioDocument>,
    pub character_sheets: SheetCollection,
    pub questionnaire_schema: QuestionnaireSchema,
    pub allow_sheet_view: bool,
}

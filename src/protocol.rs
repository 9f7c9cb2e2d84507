use crate::types::*;
use crate::wheel::SpinResult;
use serde::{Deserialize, Serialize};

/// Wire messages exchanged between hub and replicas.
///
/// Every message is a tagged record; the `type` discriminator on the wire
/// uses the kebab-case names below, payload fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Message {
    /// Player → hub: request to enter the roster
    Join {
        peer_address: PeerAddress,
        display_name: String,
    },
    /// Hub → the newly joined channel only: one-time onboarding snapshot
    Welcome(Snapshot),
    /// Hub → previously joined channels: roster-only delta after a join
    UserListUpdate { users: Roster },
    /// Player → hub: request a full resync (the only recovery path for a
    /// suspected missed broadcast)
    RefetchRequest { peer_address: PeerAddress },
    /// Hub → requester: full snapshot resend, wholesale replace on receipt
    GameDataSync(Snapshot),
    /// Either direction; the hub relays to all other channels verbatim
    Chat { from: String, text: String },
    /// GM → players: full scenario document, wholesale replace
    ScenarioUpdate { scenario: ScenarioDocument },
    /// GM → players: new question list; receivers restructure their sheets
    QuestionsUpdate {
        questionnaire_schema: QuestionnaireSchema,
    },
    /// Player → hub → other players: one participant's sheet replace
    CharacterSheetUpdate {
        display_name: String,
        sheet: CharacterSheet,
    },
    /// GM → players: wholesale replace of the full sheet collection
    CharacterSheetsBroadcast { all_sheets: SheetCollection },
    /// GM → players: whether players may view each other's sheets
    SheetVisibilityUpdate { allow_sheet_view: bool },
    /// Player → hub: ask the hub to perform a spin
    SpinRequest { peer_address: PeerAddress },
    /// Hub → all: begin the synchronized spin animation
    SpinStart {
        current_angle: f64,
        target_angle: f64,
    },
    /// Hub → all: semantic outcome plus the new distribution
    Spin {
        result: SpinResult,
        wheel_distribution: WheelDistribution,
        wedge_count: usize,
    },
    /// Hub → all: animation end angle confirmation
    SpinFinal { final_angle: f64 },
}

/// Handler families; each message type routes to exactly one topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Join / snapshot / roster plumbing, owned by the hub and replica cores
    Session,
    Chat,
    Scenario,
    Sheets,
    Wheel,
}

impl Message {
    /// Static type → topic table
    pub fn topic(&self) -> Topic {
        match self {
            Message::Join { .. }
            | Message::Welcome(_)
            | Message::UserListUpdate { .. }
            | Message::RefetchRequest { .. }
            | Message::GameDataSync(_) => Topic::Session,
            Message::Chat { .. } => Topic::Chat,
            Message::ScenarioUpdate { .. } => Topic::Scenario,
            Message::QuestionsUpdate { .. }
            | Message::CharacterSheetUpdate { .. }
            | Message::CharacterSheetsBroadcast { .. }
            | Message::SheetVisibilityUpdate { .. } => Topic::Sheets,
            Message::SpinRequest { .. }
            | Message::SpinStart { .. }
            | Message::Spin { .. }
            | Message::SpinFinal { .. } => Topic::Wheel,
        }
    }

    /// Serialize for the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a wire message. Unknown or malformed payloads yield `None`
    /// (discarded by the caller, never fatal).
    pub fn decode(raw: &str) -> Option<Message> {
        match serde_json::from_str(raw) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!("Discarding unparseable message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_are_kebab_case() {
        let msg = Message::RefetchRequest {
            peer_address: "dread-rpg-game-p1".to_string(),
        };
        let json = msg.encode().unwrap();
        assert!(json.contains("\"type\":\"refetch-request\""));
        assert!(json.contains("\"peerAddress\""));

        let msg = Message::SheetVisibilityUpdate {
            allow_sheet_view: true,
        };
        let json = msg.encode().unwrap();
        assert!(json.contains("\"type\":\"sheet-visibility-update\""));
        assert!(json.contains("\"allowSheetView\":true"));
    }

    #[test]
    fn test_join_round_trip() {
        let msg = Message::Join {
            peer_address: "dread-rpg-game-p1".to_string(),
            display_name: "Alice".to_string(),
        };
        let json = msg.encode().unwrap();
        assert_eq!(Message::decode(&json), Some(msg));
    }

    #[test]
    fn test_welcome_carries_snapshot_inline() {
        let snapshot = Snapshot {
            host_name: "GM".to_string(),
            users: Roster::new(),
            wedge_count: 4,
            wheel_distribution: fresh_distribution(4),
            scenario: None,
            character_sheets: SheetCollection::new(),
            questionnaire_schema: default_questions(),
            allow_sheet_view: false,
        };
        let json = Message::Welcome(snapshot.clone()).encode().unwrap();
        assert!(json.contains("\"type\":\"welcome\""));
        assert!(json.contains("\"hostName\":\"GM\""));
        assert!(json.contains("\"wheelDistribution\""));
        assert_eq!(Message::decode(&json), Some(Message::Welcome(snapshot)));
    }

    #[test]
    fn test_unknown_type_is_discarded() {
        assert_eq!(Message::decode(r#"{"type":"self-destruct"}"#), None);
        assert_eq!(Message::decode("not json at all"), None);
    }

    #[test]
    fn test_every_type_routes_to_one_topic() {
        let chat = Message::Chat {
            from: "Alice".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(chat.topic(), Topic::Chat);
        assert_eq!(
            Message::SpinFinal { final_angle: 1.0 }.topic(),
            Topic::Wheel
        );
        assert_eq!(
            Message::QuestionsUpdate {
                questionnaire_schema: vec![]
            }
            .topic(),
            Topic::Sheets
        );
    }
}

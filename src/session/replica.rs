//! Non-authoritative session replica (player role).
//!
//! The replica mirrors the hub's state: snapshots replace everything,
//! narrower broadcasts patch one field. Local edits show up immediately in
//! the local mirror for responsiveness, but propagation to anyone else goes
//! through the hub; in particular the replica never mutates the roster.

use crate::dispatch::Registry;
use crate::protocol::{Message, Topic};
use crate::session::{blank_sheet, restructure_all, restructure_sheet, GameData};
use crate::transport::ChannelHandle;
use crate::types::*;
use crate::wheel::{SpinResult, SpinTracker};
use std::time::{Duration, Instant};

/// Minimum gap between refetch-requests, so a confused replica can't trigger
/// a full-snapshot feedback storm
pub const DEFAULT_REFETCH_INTERVAL: Duration = Duration::from_secs(2);

/// Mutable replica state, passed by handle into every handler invocation
pub struct ReplicaState {
    session_id: SessionId,
    self_address: PeerAddress,
    display_name: String,
    hub: Option<ChannelHandle>,
    data: GameData,
    /// This player's own answers; the optimistic local copy
    my_sheet: CharacterSheet,
    chat_log: Vec<(String, String)>,
    spin: SpinTracker,
    last_result: Option<SpinResult>,
    last_refetch: Option<Instant>,
    refetch_interval: Duration,
}

impl ReplicaState {
    fn send_to_hub(&self, msg: Message) {
        match &self.hub {
            Some(hub) => {
                if hub.send(msg).is_err() {
                    tracing::warn!("Hub channel closed, message lost");
                }
            }
            None => tracing::warn!("Not connected to a hub, message dropped"),
        }
    }

    /// Wholesale replace from a welcome / game-data-sync snapshot
    fn apply_snapshot(&mut self, snap: Snapshot) {
        self.data.apply_snapshot(snap);
        // Pick up whatever the hub holds for us; otherwise start blank
        // against the current schema
        self.my_sheet = match self.data.sheets.get(&self.display_name) {
            Some(sheet) => restructure_sheet(sheet, self.data.questions.len()),
            None => blank_sheet(self.data.questions.len()),
        };
        tracing::info!(
            "Synced with hub: {} users, {} wedges",
            self.data.users.len(),
            self.data.wedge_count
        );
    }

    /// Schema changed: rebuild the own sheet by position and push the new
    /// shape back so the hub's collection converges
    fn apply_questions(&mut self, questions: &QuestionnaireSchema) {
        self.data.questions = questions.clone();
        self.my_sheet = restructure_sheet(&self.my_sheet, questions.len());
        self.data.sheets = restructure_all(&self.data.sheets, questions.len());
        self.data
            .sheets
            .insert(self.display_name.clone(), self.my_sheet.clone());
        self.send_to_hub(Message::CharacterSheetUpdate {
            display_name: self.display_name.clone(),
            sheet: self.my_sheet.clone(),
        });
    }
}

/// A player's side of the replication protocol
pub struct Replica {
    state: ReplicaState,
    registry: Registry<ReplicaState>,
}

impl Replica {
    /// Prepare to join the session. The caller opens the channel to
    /// `session_id.address()` and hands it over via [`Replica::attach`].
    pub fn join_session(
        session_id: SessionId,
        self_address: &str,
        display_name: &str,
    ) -> Replica {
        let state = ReplicaState {
            session_id,
            self_address: self_address.to_string(),
            display_name: display_name.to_string(),
            hub: None,
            data: GameData::fresh("", DEFAULT_WEDGE_COUNT),
            my_sheet: CharacterSheet::new(),
            chat_log: Vec::new(),
            spin: SpinTracker::new(),
            last_result: None,
            last_refetch: None,
            refetch_interval: DEFAULT_REFETCH_INTERVAL,
        };
        Replica {
            state,
            registry: Self::build_registry(),
        }
    }

    /// One handler table, built at session start and never re-registered
    fn build_registry() -> Registry<ReplicaState> {
        let mut registry = Registry::new();

        registry.register(Topic::Chat, |state: &mut ReplicaState, msg, _from| {
            if let Message::Chat { from, text } = msg {
                state.chat_log.push((from.clone(), text.clone()));
            }
        });

        registry.register(Topic::Scenario, |state: &mut ReplicaState, msg, _from| {
            if let Message::ScenarioUpdate { scenario } = msg {
                state.data.scenario = Some(scenario.clone());
            }
        });

        registry.register(Topic::Sheets, |state: &mut ReplicaState, msg, _from| {
            match msg {
                Message::QuestionsUpdate {
                    questionnaire_schema,
                } => state.apply_questions(questionnaire_schema),
                Message::CharacterSheetUpdate {
                    display_name,
                    sheet,
                } => {
                    let fixed = restructure_sheet(sheet, state.data.questions.len());
                    state.data.sheets.insert(display_name.clone(), fixed);
                }
                Message::CharacterSheetsBroadcast { all_sheets } => {
                    state.data.sheets = all_sheets.clone();
                }
                Message::SheetVisibilityUpdate { allow_sheet_view } => {
                    state.data.allow_sheet_view = *allow_sheet_view;
                }
                _ => {}
            }
        });

        registry.register(Topic::Wheel, |state: &mut ReplicaState, msg, _from| {
            match msg {
                Message::SpinStart {
                    current_angle,
                    target_angle,
                } => {
                    state.spin.follow(*current_angle, *target_angle);
                    state.last_result = None;
                }
                Message::Spin {
                    result,
                    wheel_distribution,
                    wedge_count,
                } => {
                    state.data.wheel = wheel_distribution.clone();
                    state.data.wedge_count = *wedge_count;
                    state.last_result = Some(*result);
                }
                Message::SpinFinal { final_angle } => {
                    state.spin.settle(*final_angle);
                }
                Message::SpinRequest { .. } => {
                    tracing::debug!("Replica is not the spin authority, ignoring request");
                }
                _ => {}
            }
        });

        registry
    }

    /// The channel to the hub opened: keep it and announce ourselves
    pub fn attach(&mut self, hub: ChannelHandle) {
        let join = Message::Join {
            peer_address: self.state.self_address.clone(),
            display_name: self.state.display_name.clone(),
        };
        tracing::info!(
            "[{}] Connected, sending join for session {}",
            self.state.display_name,
            self.state.session_id
        );
        if hub.send(join).is_err() {
            tracing::warn!("Join message lost, hub channel already closed");
        }
        self.state.hub = Some(hub);
    }

    /// Apply an inbound hub broadcast
    pub fn on_message(&mut self, msg: Message) {
        tracing::debug!(
            "[{}] Received {:?}",
            self.state.display_name,
            msg.topic()
        );
        match msg {
            Message::Welcome(snap) | Message::GameDataSync(snap) => {
                self.state.apply_snapshot(snap)
            }
            Message::UserListUpdate { users } => {
                self.state.data.users = users;
            }
            Message::Join { .. } | Message::RefetchRequest { .. } => {
                tracing::debug!("Replica ignoring spoke-originated message");
            }
            other => {
                let from = match &self.state.hub {
                    Some(hub) => hub.clone(),
                    None => {
                        tracing::warn!("Message before attach, dropping {:?}", other.topic());
                        return;
                    }
                };
                self.registry.dispatch(&mut self.state, &other, &from);
            }
        }
    }

    // Local player actions

    /// Answer one questionnaire field: the local mirror updates immediately,
    /// authoritative propagation flows through the hub
    pub fn set_answer(&mut self, position: usize, answer: &str) {
        if position >= self.state.data.questions.len() {
            tracing::warn!("Answer for position {} beyond the schema, ignored", position);
            return;
        }
        self.state.my_sheet.insert(position, answer.to_string());
        self.state
            .data
            .sheets
            .insert(self.state.display_name.clone(), self.state.my_sheet.clone());
        self.state.send_to_hub(Message::CharacterSheetUpdate {
            display_name: self.state.display_name.clone(),
            sheet: self.state.my_sheet.clone(),
        });
    }

    pub fn send_chat(&mut self, text: &str) {
        let from = self.state.display_name.clone();
        // The hub relays to everyone else, not back to us
        self.state.chat_log.push((from.clone(), text.to_string()));
        self.state.send_to_hub(Message::Chat {
            from,
            text: text.to_string(),
        });
    }

    /// Ask the hub to spin; the hub discards the request if a spin is
    /// already in flight, and so do we
    pub fn request_spin(&mut self) {
        if self.state.spin.is_spinning() {
            tracing::debug!("Spin already in flight, not requesting another");
            return;
        }
        self.state.send_to_hub(Message::SpinRequest {
            peer_address: self.state.self_address.clone(),
        });
    }

    /// Request a full resync. Rate-limited: returns false when the minimum
    /// interval since the last request has not elapsed.
    pub fn request_resync(&mut self) -> bool {
        if let Some(last) = self.state.last_refetch {
            if last.elapsed() < self.state.refetch_interval {
                tracing::debug!("Resync requested too soon, suppressed");
                return false;
            }
        }
        self.state.last_refetch = Some(Instant::now());
        self.state.send_to_hub(Message::RefetchRequest {
            peer_address: self.state.self_address.clone(),
        });
        true
    }

    /// Override the refetch guard interval (e.g. for tests)
    pub fn set_refetch_interval(&mut self, interval: Duration) {
        self.state.refetch_interval = interval;
    }

    pub fn session_id(&self) -> &SessionId {
        &self.state.session_id
    }

    pub fn display_name(&self) -> &str {
        &self.state.display_name
    }

    pub fn data(&self) -> &GameData {
        &self.state.data
    }

    pub fn my_sheet(&self) -> &CharacterSheet {
        &self.state.my_sheet
    }

    pub fn chat_log(&self) -> &[(String, String)] {
        &self.state.chat_log
    }

    pub fn spin(&self) -> &SpinTracker {
        &self.state.spin
    }

    pub fn last_result(&self) -> Option<SpinResult> {
        self.state.last_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;
    use crate::wheel::SpinPhase;

    fn snapshot() -> Snapshot {
        let mut users = Roster::new();
        users.insert("dread-rpg-game-abc".to_string(), "Host".to_string());
        users.insert("dread-rpg-game-p1".to_string(), "Alice".to_string());
        Snapshot {
            host_name: "Host".to_string(),
            users,
            wedge_count: 4,
            wheel_distribution: vec![
                Wedge::Success,
                Wedge::Death,
                Wedge::Success,
                Wedge::Success,
            ],
            scenario: None,
            character_sheets: SheetCollection::new(),
            questionnaire_schema: vec!["Q0".to_string(), "Q1".to_string()],
            allow_sheet_view: false,
        }
    }

    /// A replica attached to one end of a channel pair; the other end plays
    /// the hub and collects everything the replica sends
    fn attached() -> (Replica, transport::Connection) {
        let (player_end, hub_end) = transport::pair("dread-rpg-game-p1", "dread-rpg-game-abc");
        let mut replica =
            Replica::join_session(SessionId::new("abc"), "dread-rpg-game-p1", "Alice");
        replica.attach(player_end.handle.clone());
        // The replica only sends through its handle in these tests
        drop(player_end);
        (replica, hub_end)
    }

    #[test]
    fn test_attach_sends_join() {
        let (_replica, mut hub_end) = attached();
        match hub_end.try_recv() {
            Some(Message::Join {
                peer_address,
                display_name,
            }) => {
                assert_eq!(peer_address, "dread-rpg-game-p1");
                assert_eq!(display_name, "Alice");
            }
            other => panic!("Expected Join, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_applies_wholesale_and_idempotently() {
        let (mut replica, _hub_end) = attached();
        // Local junk the snapshot must wipe
        replica.state.data.scenario = Some(ScenarioDocument::default());

        replica.on_message(Message::Welcome(snapshot()));
        let after_once = replica.data().clone();
        assert_eq!(after_once.users.len(), 2);
        assert_eq!(after_once.wedge_count, 4);
        assert!(after_once.scenario.is_none());
        // Blank own sheet sized to the schema
        assert_eq!(replica.my_sheet().len(), 2);

        replica.on_message(Message::GameDataSync(snapshot()));
        assert_eq!(*replica.data(), after_once);
    }

    #[test]
    fn test_roster_delta_replaces_users_only() {
        let (mut replica, _hub_end) = attached();
        replica.on_message(Message::Welcome(snapshot()));

        let mut users = Roster::new();
        users.insert("dread-rpg-game-abc".to_string(), "Host".to_string());
        users.insert("dread-rpg-game-p1".to_string(), "Alice".to_string());
        users.insert("dread-rpg-game-p2".to_string(), "Bob".to_string());
        replica.on_message(Message::UserListUpdate {
            users: users.clone(),
        });

        assert_eq!(replica.data().users, users);
        assert_eq!(replica.data().wedge_count, 4, "other fields untouched");
    }

    #[test]
    fn test_questions_update_restructures_and_pushes_back() {
        let (mut replica, mut hub_end) = attached();
        let _ = hub_end.try_recv(); // join
        replica.on_message(Message::Welcome(snapshot()));
        replica.set_answer(0, "a");
        replica.set_answer(1, "b");
        let _ = hub_end.try_recv();
        let _ = hub_end.try_recv();

        replica.on_message(Message::QuestionsUpdate {
            questionnaire_schema: vec![
                "Q0".to_string(),
                "Q1 rewritten".to_string(),
                "Q2".to_string(),
            ],
        });

        assert_eq!(replica.my_sheet().get(&0).unwrap(), "a");
        assert_eq!(replica.my_sheet().get(&1).unwrap(), "b");
        assert_eq!(replica.my_sheet().get(&2).unwrap(), "");
        assert_eq!(replica.my_sheet().len(), 3);

        match hub_end.try_recv() {
            Some(Message::CharacterSheetUpdate {
                display_name,
                sheet,
            }) => {
                assert_eq!(display_name, "Alice");
                assert_eq!(sheet.len(), 3);
            }
            other => panic!("Expected pushed-back sheet, got {:?}", other),
        }
    }

    #[test]
    fn test_set_answer_is_optimistic_and_forwarded() {
        let (mut replica, mut hub_end) = attached();
        let _ = hub_end.try_recv(); // join
        replica.on_message(Message::Welcome(snapshot()));

        replica.set_answer(1, "afraid of the dark");
        assert_eq!(replica.my_sheet().get(&1).unwrap(), "afraid of the dark");
        assert_eq!(
            replica.data().sheets["Alice"].get(&1).unwrap(),
            "afraid of the dark"
        );

        match hub_end.try_recv() {
            Some(Message::CharacterSheetUpdate { display_name, .. }) => {
                assert_eq!(display_name, "Alice");
            }
            other => panic!("Expected CharacterSheetUpdate, got {:?}", other),
        }

        // Beyond the schema: dropped locally, nothing sent
        replica.set_answer(9, "ignored");
        assert!(hub_end.try_recv().is_none());
    }

    #[test]
    fn test_spin_broadcasts_drive_local_tracker() {
        let (mut replica, _hub_end) = attached();
        replica.on_message(Message::Welcome(snapshot()));

        replica.on_message(Message::SpinStart {
            current_angle: 0.0,
            target_angle: 30.0,
        });
        assert_eq!(replica.spin().phase(), SpinPhase::Spinning);
        assert!(replica.last_result().is_none());

        let new_wheel = vec![Wedge::Success, Wedge::Death, Wedge::Death, Wedge::Success];
        replica.on_message(Message::Spin {
            result: SpinResult::Success,
            wheel_distribution: new_wheel.clone(),
            wedge_count: 4,
        });
        assert_eq!(replica.data().wheel, new_wheel);
        assert_eq!(replica.last_result(), Some(SpinResult::Success));

        replica.on_message(Message::SpinFinal { final_angle: 30.0 });
        assert_eq!(replica.spin().phase(), SpinPhase::Resolved);
        assert_eq!(replica.spin().angle(), 30.0);
    }

    #[test]
    fn test_spin_request_suppressed_while_spinning() {
        let (mut replica, mut hub_end) = attached();
        let _ = hub_end.try_recv(); // join

        replica.request_spin();
        assert!(matches!(
            hub_end.try_recv(),
            Some(Message::SpinRequest { .. })
        ));

        replica.on_message(Message::SpinStart {
            current_angle: 0.0,
            target_angle: 30.0,
        });
        replica.request_spin();
        assert!(hub_end.try_recv().is_none());
    }

    #[test]
    fn test_resync_requests_are_rate_limited() {
        let (mut replica, mut hub_end) = attached();
        let _ = hub_end.try_recv(); // join

        assert!(replica.request_resync());
        assert!(matches!(
            hub_end.try_recv(),
            Some(Message::RefetchRequest { .. })
        ));

        // Immediately again: suppressed
        assert!(!replica.request_resync());
        assert!(hub_end.try_recv().is_none());

        // With the guard disabled it goes through
        replica.set_refetch_interval(Duration::ZERO);
        assert!(replica.request_resync());
        assert!(matches!(
            hub_end.try_recv(),
            Some(Message::RefetchRequest { .. })
        ));
    }

    #[test]
    fn test_sheet_views_follow_visibility_flag() {
        let (mut replica, _hub_end) = attached();
        replica.on_message(Message::Welcome(snapshot()));
        assert!(!replica.data().allow_sheet_view);

        replica.on_message(Message::SheetVisibilityUpdate {
            allow_sheet_view: true,
        });
        assert!(replica.data().allow_sheet_view);

        let mut all = SheetCollection::new();
        all.insert("Bob".to_string(), blank_sheet(2));
        replica.on_message(Message::CharacterSheetsBroadcast {
            all_sheets: all.clone(),
        });
        assert_eq!(replica.data().sheets, all);
    }
}

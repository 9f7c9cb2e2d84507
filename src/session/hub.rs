//! Authoritative session hub (GM role).
//!
//! The hub owns the canonical copy of every replicated field, processes
//! inbound messages from all spokes, and decides what to broadcast and to
//! whom. Joins get the full snapshot; everyone else gets the narrowest
//! delta that keeps them converged.

use crate::dispatch::Registry;
use crate::protocol::Message;
use crate::protocol::Topic;
use crate::session::{restructure_all, restructure_sheet, GameData};
use crate::transport::{ChannelHandle, Listener, Switchboard};
use crate::types::*;
use crate::wheel::{resolve_spin, SpinPlan, SpinResult, SpinTracker};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Mutable hub state, passed by handle into every handler invocation
pub struct HubState {
    session_id: SessionId,
    address: PeerAddress,
    data: GameData,
    spin: SpinTracker,
    /// Every channel a peer has opened to us, trusted or not
    channels: Vec<ChannelHandle>,
    chat_log: Vec<(String, String)>,
    rng: StdRng,
}

impl HubState {
    /// Send to every connected channel, fire-and-forget
    fn broadcast(&self, msg: Message) {
        for channel in &self.channels {
            if channel.send(msg.clone()).is_err() {
                tracing::debug!("Dropping broadcast to closed channel {}", channel.peer());
            }
        }
    }

    /// Send to every connected channel except `skip`
    fn relay_except(&self, skip: &ChannelHandle, msg: Message) {
        for channel in &self.channels {
            if channel.same_channel(skip) {
                continue;
            }
            if channel.send(msg.clone()).is_err() {
                tracing::debug!("Dropping relay to closed channel {}", channel.peer());
            }
        }
    }

    fn handle_join(&mut self, from: &ChannelHandle, peer_address: &str, display_name: &str) {
        // Duplicate joins overwrite: the roster is keyed by address
        self.data
            .users
            .insert(peer_address.to_string(), display_name.to_string());
        tracing::info!("{} joined as {}", peer_address, display_name);

        // Full snapshot to the joiner only, roster delta to everyone who
        // already has the rest of the state
        if from.send(Message::Welcome(self.data.snapshot())).is_err() {
            tracing::warn!("Welcome to {} failed, channel already closed", peer_address);
        }
        self.relay_except(
            from,
            Message::UserListUpdate {
                users: self.data.users.clone(),
            },
        );
    }

    fn handle_refetch(&self, from: &ChannelHandle, peer_address: &str) {
        tracing::info!("Resync requested by {}", peer_address);
        if from.send(Message::GameDataSync(self.data.snapshot())).is_err() {
            tracing::warn!("Resync to {} failed, channel already closed", peer_address);
        }
    }

    /// One spin authority for both call sites: the GM spinning locally and
    /// a relayed player request. No-op while a spin is in flight.
    fn start_spin(&mut self) -> Option<SpinPlan> {
        let plan = match self.spin.start(&mut self.rng) {
            Some(plan) => plan,
            None => {
                tracing::debug!("Spin already in flight, discarding request");
                return None;
            }
        };
        tracing::info!(
            "Spin started: {:.2} -> {:.2}",
            plan.current_angle,
            plan.target_angle
        );
        self.broadcast(Message::SpinStart {
            current_angle: plan.current_angle,
            target_angle: plan.target_angle,
        });
        Some(plan)
    }
}

/// The GM's side of the replication protocol
pub struct Hub {
    state: HubState,
    registry: Registry<HubState>,
}

impl Hub {
    /// Reset all owned state to fresh defaults and open the transport under
    /// the normalized session address
    pub fn create_session(
        switchboard: &Switchboard,
        session_id: SessionId,
        host_name: &str,
        wedge_count: usize,
    ) -> crate::transport::Result<(Hub, Listener)> {
        let listener = switchboard.bind(&session_id.address())?;
        let hub = Hub::with_rng(session_id, host_name, wedge_count, StdRng::from_os_rng());
        tracing::info!(
            "Session created, waiting for players at {}",
            listener.address()
        );
        Ok((hub, listener))
    }

    /// Build a hub without touching the transport; tests inject a seeded rng
    pub fn with_rng(
        session_id: SessionId,
        host_name: &str,
        wedge_count: usize,
        rng: StdRng,
    ) -> Hub {
        let host_name = if host_name.trim().is_empty() {
            "GM"
        } else {
            host_name
        };
        let address = session_id.address();
        let mut data = GameData::fresh(host_name, wedge_count);
        data.users.insert(address.clone(), host_name.to_string());

        let state = HubState {
            session_id,
            address,
            data,
            spin: SpinTracker::new(),
            channels: Vec::new(),
            chat_log: Vec::new(),
            rng,
        };
        Hub {
            state,
            registry: Self::build_registry(),
        }
    }

    /// One handler table, built at session start and never re-registered
    fn build_registry() -> Registry<HubState> {
        let mut registry = Registry::new();

        registry.register(Topic::Chat, |state: &mut HubState, msg, from| {
            if let Message::Chat { from: who, text } = msg {
                state.chat_log.push((who.clone(), text.clone()));
                state.relay_except(from, msg.clone());
            }
        });

        registry.register(Topic::Scenario, |_state: &mut HubState, msg, from| {
            // The scenario is exclusively GM-authored; a spoke sending one
            // is out of contract and gets dropped
            tracing::warn!(
                "Ignoring {:?} from spoke {}, scenario is GM-owned",
                msg.topic(),
                from.peer()
            );
        });

        registry.register(Topic::Sheets, |state: &mut HubState, msg, from| match msg {
            Message::CharacterSheetUpdate {
                display_name,
                sheet,
            } => {
                // Never trust the incoming shape: re-derive the key set
                // against the current schema before storing
                let fixed = restructure_sheet(sheet, state.data.questions.len());
                if !state.data.users.values().any(|name| name == display_name) {
                    tracing::warn!("Sheet update from {} who is not in the roster", display_name);
                }
                state
                    .data
                    .sheets
                    .insert(display_name.clone(), fixed.clone());
                state.relay_except(
                    from,
                    Message::CharacterSheetUpdate {
                        display_name: display_name.clone(),
                        sheet: fixed,
                    },
                );
            }
            _ => {
                tracing::warn!(
                    "Ignoring GM-only sheet message {:?} from spoke {}",
                    msg.topic(),
                    from.peer()
                );
            }
        });

        registry.register(Topic::Wheel, |state: &mut HubState, msg, _from| match msg {
            Message::SpinRequest { peer_address } => {
                tracing::info!("Spin requested by {}", peer_address);
                state.start_spin();
            }
            _ => {
                tracing::debug!("Hub is the spin authority, ignoring {:?}", msg.topic());
            }
        });

        registry
    }

    /// A peer opened a channel to us. It lands in the broadcast list but is
    /// not trusted until its join message arrives.
    pub fn on_peer_connected(&mut self, channel: ChannelHandle) {
        tracing::info!("Channel opened from {}", channel.peer());
        self.state.channels.push(channel);
    }

    /// Dispatch an inbound message by type
    pub fn on_message(&mut self, from: &ChannelHandle, msg: Message) {
        tracing::debug!("[GM] Received {:?} from {}", msg.topic(), from.peer());
        match &msg {
            Message::Join {
                peer_address,
                display_name,
            } => self.state.handle_join(from, peer_address, display_name),
            Message::RefetchRequest { peer_address } => {
                self.state.handle_refetch(from, peer_address)
            }
            Message::Welcome(_) | Message::GameDataSync(_) | Message::UserListUpdate { .. } => {
                tracing::debug!("Hub ignoring hub-originated message {:?}", msg.topic());
            }
            _ => self.registry.dispatch(&mut self.state, &msg, from),
        }
    }

    // GM-local operations, mirroring what players do through messages

    pub fn send_chat(&mut self, text: &str) {
        let from = self.state.data.host_name.clone();
        self.state.chat_log.push((from.clone(), text.to_string()));
        self.state.broadcast(Message::Chat {
            from,
            text: text.to_string(),
        });
    }

    /// Save the scenario document and broadcast it wholesale. The hub stamps
    /// the last-updated timestamp at save time.
    pub fn save_scenario(&mut self, mut scenario: ScenarioDocument) {
        scenario.last_updated = Utc::now().to_rfc3339();
        self.state.data.scenario = Some(scenario.clone());
        self.state.broadcast(Message::ScenarioUpdate { scenario });
    }

    /// Replace the questionnaire schema. Every stored sheet is restructured
    /// so its key set matches the new schema, then both the schema and the
    /// rebuilt collection go out.
    pub fn set_questions(&mut self, questions: QuestionnaireSchema) {
        self.state.data.sheets = restructure_all(&self.state.data.sheets, questions.len());
        self.state.data.questions = questions.clone();
        self.state.broadcast(Message::QuestionsUpdate {
            questionnaire_schema: questions,
        });
        self.state.broadcast(Message::CharacterSheetsBroadcast {
            all_sheets: self.state.data.sheets.clone(),
        });
    }

    /// Toggle whether players may view each other's sheets. Turning the flag
    /// on also pushes the full collection so players see sheets immediately.
    pub fn set_sheet_visibility(&mut self, allow: bool) {
        self.state.data.allow_sheet_view = allow;
        self.state
            .broadcast(Message::SheetVisibilityUpdate { allow_sheet_view: allow });
        if allow {
            self.state.broadcast(Message::CharacterSheetsBroadcast {
                all_sheets: self.state.data.sheets.clone(),
            });
        }
    }

    /// The GM's own character sheet, stored under the host display name
    pub fn set_own_sheet(&mut self, sheet: CharacterSheet) {
        let fixed = restructure_sheet(&sheet, self.state.data.questions.len());
        let name = self.state.data.host_name.clone();
        self.state.data.sheets.insert(name.clone(), fixed.clone());
        self.state.broadcast(Message::CharacterSheetUpdate {
            display_name: name,
            sheet: fixed,
        });
    }

    /// GM spins the wheel locally. The returned plan is what the local
    /// renderer animates; everyone else gets it via `spin-start`.
    pub fn request_spin(&mut self) -> Option<SpinPlan> {
        self.state.start_spin()
    }

    /// The rendering collaborator reports which wedge the pointer landed on.
    /// The hub computes the semantic outcome from the pre-resolution wedge,
    /// replaces the distribution, and broadcasts both.
    pub fn finish_spin(&mut self, selected: usize) -> Option<SpinResult> {
        let state = &mut self.state;
        let final_angle = state.spin.finish()?;
        let result = match state.data.wheel.get(selected) {
            Some(wedge) => SpinResult::from(*wedge),
            None => {
                tracing::warn!(
                    "Pointer reported out-of-range wedge {}, skipping resolution",
                    selected
                );
                state.broadcast(Message::SpinFinal { final_angle });
                return None;
            }
        };
        let next = resolve_spin(selected, &state.data.wheel, &mut state.rng);
        state.data.wheel = next;
        tracing::info!("Spin resolved: {} at wedge {}", result, selected);
        state.broadcast(Message::Spin {
            result,
            wheel_distribution: state.data.wheel.clone(),
            wedge_count: state.data.wheel.len(),
        });
        state.broadcast(Message::SpinFinal { final_angle });
        Some(result)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.state.session_id
    }

    /// The hub's own normalized channel address
    pub fn address(&self) -> &str {
        &self.state.address
    }

    pub fn data(&self) -> &GameData {
        &self.state.data
    }

    pub fn spin(&self) -> &SpinTracker {
        &self.state.spin
    }

    pub fn chat_log(&self) -> &[(String, String)] {
        &self.state.chat_log
    }

    pub fn connected_channels(&self) -> usize {
        self.state.channels.len()
    }
}

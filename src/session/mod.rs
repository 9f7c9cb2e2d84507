//! Session state shared between the hub and its replicas.
//!
//! `GameData` is the replicated bundle: the hub owns the authoritative copy,
//! every replica mirrors it. Snapshots replace the whole bundle so a stale
//! replica converges no matter what it missed.

mod hub;
mod replica;
pub mod runner;

pub use hub::Hub;
pub use replica::{Replica, DEFAULT_REFETCH_INTERVAL};

use crate::types::*;

/// The replicated session state bundle
#[derive(Debug, Clone, PartialEq)]
pub struct GameData {
    pub host_name: String,
    pub users: Roster,
    pub wedge_count: usize,
    pub wheel: WheelDistribution,
    pub scenario: Option<ScenarioDocument>,
    pub sheets: SheetCollection,
    pub questions: QuestionnaireSchema,
    pub allow_sheet_view: bool,
}

impl GameData {
    /// Fresh defaults for a newly created session
    pub fn fresh(host_name: &str, wedge_count: usize) -> Self {
        Self {
            host_name: host_name.to_string(),
            users: Roster::new(),
            wedge_count,
            wheel: fresh_distribution(wedge_count),
            scenario: None,
            sheets: SheetCollection::new(),
            questions: default_questions(),
            allow_sheet_view: false,
        }
    }

    /// The full authoritative bundle as a wire snapshot
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            host_name: self.host_name.clone(),
            users: self.users.clone(),
            wedge_count: self.wedge_count,
            wheel_distribution: self.wheel.clone(),
            scenario: self.scenario.clone(),
            character_sheets: self.sheets.clone(),
            questionnaire_schema: self.questions.clone(),
            allow_sheet_view: self.allow_sheet_view,
        }
    }

    /// Wholesale replace of every replicated field. Never a partial merge,
    /// so applying the same snapshot twice is a no-op the second time.
    pub fn apply_snapshot(&mut self, snap: Snapshot) {
        self.host_name = snap.host_name;
        self.users = snap.users;
        self.wedge_count = snap.wedge_count;
        self.wheel = snap.wheel_distribution;
        self.scenario = snap.scenario;
        self.sheets = snap.character_sheets;
        self.questions = snap.questionnaire_schema;
        self.allow_sheet_view = snap.allow_sheet_view;
    }
}

/// All-blank sheet matching a schema of `question_count` questions
pub fn blank_sheet(question_count: usize) -> CharacterSheet {
    (0..question_count).map(|i| (i, String::new())).collect()
}

/// Rebuild a sheet against a schema of `question_count` questions: answers
/// carry over by position, missing positions become blank, stale positions
/// beyond the schema are dropped. The result's key set is always exactly
/// `0..question_count`.
pub fn restructure_sheet(sheet: &CharacterSheet, question_count: usize) -> CharacterSheet {
    (0..question_count)
        .map(|i| (i, sheet.get(&i).cloned().unwrap_or_default()))
        .collect()
}

/// Restructure every sheet in the collection against the new schema length
pub fn restructure_all(sheets: &SheetCollection, question_count: usize) -> SheetCollection {
    sheets
        .iter()
        .map(|(name, sheet)| (name.clone(), restructure_sheet(sheet, question_count)))
        .collect()
}

//! Wheel outcome engine and spin state machine.
//!
//! The wheel replaces the physical block tower: every safe spin converts the
//! landed wedge to `death`, so failure probability only ever climbs until a
//! fatal spin resets the wheel.

use crate::types::{fresh_distribution, Wedge, WheelDistribution};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A spin always makes at least this many full turns
pub const MIN_SPIN_TURNS: f64 = 3.0;
/// and fewer than this many, plus a random sub-turn offset
pub const MAX_SPIN_TURNS: f64 = 6.0;

/// Fixed animation length; every client runs it to completion locally,
/// untied to any message arrival.
pub const SPIN_DURATION_SECS: f64 = 5.0;

/// Semantic outcome of a spin, decided from the wedge's label *before*
/// the distribution is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinResult {
    Success,
    Death,
}

impl From<Wedge> for SpinResult {
    fn from(w: Wedge) -> Self {
        match w {
            Wedge::Success => SpinResult::Success,
            Wedge::Death => SpinResult::Death,
        }
    }
}

impl std::fmt::Display for SpinResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpinResult::Success => f.write_str("Success!"),
            SpinResult::Death => f.write_str("You Died!"),
        }
    }
}

/// Compute the next distribution after the pointer lands on `selected`.
///
/// Landing on `success` escalates: that one wedge flips to `death`. Landing
/// on `death` resets the wheel to all-success with one freshly chosen random
/// death wedge, so danger persists across resets. An out-of-range index
/// leaves the distribution unchanged.
pub fn resolve_spin(
    selected: usize,
    wheel: &WheelDistribution,
    rng: &mut impl Rng,
) -> WheelDistribution {
    match wheel.get(selected) {
        Some(Wedge::Success) => {
            let mut next = wheel.clone();
            next[selected] = Wedge::Death;
            next
        }
        Some(Wedge::Death) => {
            let mut next = fresh_distribution(wheel.len());
            next[rng.random_range(0..wheel.len())] = Wedge::Death;
            next
        }
        None => wheel.clone(),
    }
}

/// Which wedge the fixed pointer (twelve o'clock) indicates when the wheel
/// rests at `final_angle`. Wedge 0 starts at three o'clock and wedges run
/// clockwise, matching the renderer's layout; this is the one geometric fact
/// the core and the rendering collaborator must agree on.
pub fn wedge_for_angle(final_angle: f64, wedge_count: usize) -> usize {
    if wedge_count == 0 {
        return 0;
    }
    let step = TAU / wedge_count as f64;
    // Pointer position in wheel-local coordinates after rotating by final_angle
    let local = (1.5 * PI - final_angle).rem_euclid(TAU);
    ((local / step) as usize).min(wedge_count - 1)
}

/// Rotation plan broadcast at spin start so every client animates the same
/// motion in parallel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinPlan {
    pub current_angle: f64,
    pub target_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinPhase {
    Idle,
    Spinning,
    Resolved,
}

/// Spin lifecycle: idle → spinning → resolved → (next spin) → spinning.
///
/// One tracker serves both call sites: the GM spinning locally and the GM
/// relaying a player's spin request. A start while already spinning is a
/// no-op, which is how concurrent spin requests get discarded.
#[derive(Debug, Clone)]
pub struct SpinTracker {
    phase: SpinPhase,
    angle: f64,
    target_angle: f64,
}

impl SpinTracker {
    pub fn new() -> Self {
        Self {
            phase: SpinPhase::Idle,
            angle: 0.0,
            target_angle: 0.0,
        }
    }

    pub fn phase(&self) -> SpinPhase {
        self.phase
    }

    /// Resting (or final) rotation angle
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn is_spinning(&self) -> bool {
        self.phase == SpinPhase::Spinning
    }

    /// Plan a new spin from the current resting angle. Returns `None` while
    /// a spin is already in flight.
    pub fn start(&mut self, rng: &mut impl Rng) -> Option<SpinPlan> {
        if self.is_spinning() {
            return None;
        }
        let turns = rng.random_range(MIN_SPIN_TURNS..MAX_SPIN_TURNS);
        let offset = rng.random_range(0.0..TAU);
        let target = self.angle + turns * TAU + offset;
        self.target_angle = target;
        self.phase = SpinPhase::Spinning;
        Some(SpinPlan {
            current_angle: self.angle,
            target_angle: target,
        })
    }

    /// Follow a spin the hub planned (replica side of `spin-start`)
    pub fn follow(&mut self, current_angle: f64, target_angle: f64) {
        self.angle = current_angle;
        self.target_angle = target_angle;
        self.phase = SpinPhase::Spinning;
    }

    /// Animation ran to completion; settle at the target angle. Returns the
    /// final angle, or `None` if no spin was in flight.
    pub fn finish(&mut self) -> Option<f64> {
        if !self.is_spinning() {
            return None;
        }
        self.angle = self.target_angle;
        self.phase = SpinPhase::Resolved;
        Some(self.angle)
    }

    /// Replica side of `spin-final`: settle at the hub-confirmed angle
    pub fn settle(&mut self, final_angle: f64) {
        self.angle = final_angle;
        self.target_angle = final_angle;
        self.phase = SpinPhase::Resolved;
    }
}

impl Default for SpinTracker {
    fn default() -> Self {
        Self::new()
    }
}

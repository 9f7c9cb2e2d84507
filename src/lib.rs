//! Peer-replicated session state for a Dread-style tabletop horror session.
//!
//! One participant hosts as GM and owns the authoritative state (roster,
//! scenario, questionnaire and answers, wheel distribution); every player
//! holds a replica that converges with the hub after any mutation, over a
//! star of point-to-point channels with the GM as arbiter and relay.

pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod wheel;

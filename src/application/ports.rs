//! Ports consumed by the engine
//!
//! The engine is deterministic and host-agnostic: attribute delivery, timers
//! and application policy are all injected through these traits. Every port
//! is synchronous; the single-owner execution model (one operation at a time,
//! serialized by the host) makes async seams unnecessary here.

use crate::domain::bearer::TerminateReason;
use crate::domain::shared::AttributeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Identifies a connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(u32);

impl PeerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// The characteristics a bearer exposes.
///
/// Dispatch is an exhaustive match over this enum; the attribute table itself
/// (UUIDs, permissions, CCC descriptors) is owned by the attribute server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacteristicId {
    ProviderName,
    Uci,
    Technology,
    UriSchemeList,
    SignalStrength,
    SignalInterval,
    CurrentCalls,
    ContentControlId,
    StatusFlags,
    IncomingUri,
    CallState,
    ControlPoint,
    OptionalOpcodes,
    TerminateReason,
    IncomingCall,
    FriendlyName,
}

/// Attribute/characteristic table host.
///
/// Registers and unregisters a bearer's attribute set and delivers
/// notification payloads, either broadcast to subscribers or to one peer.
/// Delivery is fire-and-forget: a failure is reported but never rolls back
/// the state mutation that preceded it.
#[cfg_attr(test, automock)]
pub trait AttributeServer {
    fn register_bearer(&mut self, bearer_index: u8) -> Result<(), AttributeError>;

    fn unregister_bearer(&mut self, bearer_index: u8) -> Result<(), AttributeError>;

    /// Notify every subscriber of the characteristic.
    fn notify(
        &mut self,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), AttributeError>;

    /// Notify a single peer.
    fn notify_peer(
        &mut self,
        peer: PeerId,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), AttributeError>;
}

/// One-shot timer capability driving periodic signal-strength reporting.
///
/// Timers are keyed by bearer index. When a timer fires the host must call
/// [`CallControlEngine::signal_timer_fired`] inside the same serialization
/// domain as every other engine entry point.
///
/// [`CallControlEngine::signal_timer_fired`]: crate::application::CallControlEngine::signal_timer_fired
#[cfg_attr(test, automock)]
pub trait Scheduler {
    /// Arm (or re-arm) the bearer's one-shot timer.
    fn schedule(&mut self, bearer_index: u8, delay: Duration);

    /// Best-effort cancel. Returns true if a scheduled firing was cancelled
    /// before it fired; false if nothing was armed or the firing already
    /// raced past the cancellation.
    fn cancel(&mut self, bearer_index: u8) -> bool;

    /// Whether the bearer's timer is currently armed.
    fn is_armed(&self, bearer_index: u8) -> bool;
}

/// Application callbacks invoked after successful control operations.
///
/// `peer` carries the requesting connection for peer-written commands and
/// None for operations the application itself initiated.
#[cfg_attr(test, automock)]
pub trait CallCallbacks {
    /// Authorization policy hook, consulted only for bearers flagged as
    /// requiring it. The default denies.
    fn authorize(&mut self, peer: PeerId) -> bool {
        let _ = peer;
        false
    }

    fn call_accepted(&mut self, peer: Option<PeerId>, call_index: u8) {
        let _ = (peer, call_index);
    }

    fn call_terminated(&mut self, peer: Option<PeerId>, call_index: u8, reason: TerminateReason) {
        let _ = (peer, call_index, reason);
    }

    /// Also invoked once per call demoted by hold-others.
    fn call_held(&mut self, peer: Option<PeerId>, call_index: u8) {
        let _ = (peer, call_index);
    }

    fn call_retrieved(&mut self, peer: Option<PeerId>, call_index: u8) {
        let _ = (peer, call_index);
    }

    /// Returns whether the remote party was reached; false auto-terminates
    /// the new call with reason CallFailed.
    fn call_originated(&mut self, peer: Option<PeerId>, call_index: u8, uri: &str) -> bool {
        let _ = (peer, call_index, uri);
        false
    }

    fn calls_joined(&mut self, peer: Option<PeerId>, call_indexes: &[u8]) {
        let _ = (peer, call_indexes);
    }
}

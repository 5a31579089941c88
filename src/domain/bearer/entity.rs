//! Bearer entity

use crate::domain::bearer::value_object::{
    BearerFeatures, BearerKind, StatusFlags, Technology, TerminateRecord,
    SIGNAL_STRENGTH_UNKNOWN,
};
use crate::domain::call::{Call, CallState};
use serde::{Deserialize, Serialize};

/// A `{call_index, uri}` record backing the incoming-call, incoming-URI and
/// friendly-name characteristics. Unset records read as zero-length values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriRecord {
    pub call_index: u8,
    pub uri: String,
}

/// A logical call endpoint exposing the call-control protocol.
///
/// Regular bearers represent distinct transports/accounts; the single
/// aggregate bearer presents the union of all regular bearers and owns no
/// call slots of its own.
#[derive(Debug, Clone)]
pub struct Bearer {
    kind: BearerKind,
    provider_name: String,
    uci: String,
    technology: Technology,
    /// Comma-delimited URI scheme list, e.g. "tel,sip"
    uri_scheme_list: String,
    features: BearerFeatures,
    status_flags: StatusFlags,
    signal_strength: u8,
    /// Reporting interval in seconds; 0 disables periodic re-arming
    signal_strength_interval: u8,
    authorization_required: bool,
    /// Content-control id assigned at registration
    ccid: u8,
    /// Fixed-capacity call slots; freed slots stay in place (no compaction)
    calls: Vec<Option<Call>>,
    notify_call_states: bool,
    notify_current_calls: bool,
    pending_signal_report: bool,
    terminate_record: Option<TerminateRecord>,
    incoming_call: Option<UriRecord>,
    incoming_uri: Option<UriRecord>,
    friendly_name: Option<UriRecord>,
}

impl Bearer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: BearerKind,
        provider_name: String,
        uci: String,
        technology: Technology,
        uri_scheme_list: String,
        features: BearerFeatures,
        authorization_required: bool,
        ccid: u8,
        call_capacity: usize,
    ) -> Self {
        let call_capacity = match kind {
            // The aggregate owns no calls; its visible set is the union of
            // all regular bearers'.
            BearerKind::Aggregate => 0,
            BearerKind::Regular(_) => call_capacity,
        };

        Self {
            kind,
            provider_name,
            uci,
            technology,
            uri_scheme_list,
            features,
            status_flags: StatusFlags::none(),
            signal_strength: SIGNAL_STRENGTH_UNKNOWN,
            signal_strength_interval: 0,
            authorization_required,
            ccid,
            calls: vec![None; call_capacity],
            notify_call_states: false,
            notify_current_calls: false,
            pending_signal_report: false,
            terminate_record: None,
            incoming_call: None,
            incoming_uri: None,
            friendly_name: None,
        }
    }

    pub fn kind(&self) -> BearerKind {
        self.kind
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, BearerKind::Aggregate)
    }

    /// Bearer index as addressed by peers: the slot number for regular
    /// bearers, the aggregate sentinel otherwise.
    pub fn index(&self) -> u8 {
        match self.kind {
            BearerKind::Regular(slot) => slot,
            BearerKind::Aggregate => super::value_object::AGGREGATE_INDEX,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn set_provider_name(&mut self, name: String) {
        self.provider_name = name;
    }

    pub fn uci(&self) -> &str {
        &self.uci
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn set_technology(&mut self, technology: Technology) {
        self.technology = technology;
    }

    pub fn uri_scheme_list(&self) -> &str {
        &self.uri_scheme_list
    }

    pub fn set_uri_scheme_list(&mut self, list: String) {
        self.uri_scheme_list = list;
    }

    pub fn features(&self) -> BearerFeatures {
        self.features
    }

    pub fn status_flags(&self) -> StatusFlags {
        self.status_flags
    }

    pub fn set_status_flags(&mut self, flags: StatusFlags) {
        self.status_flags = flags;
    }

    pub fn signal_strength(&self) -> u8 {
        self.signal_strength
    }

    pub fn set_signal_strength(&mut self, value: u8) {
        self.signal_strength = value;
    }

    pub fn signal_strength_interval(&self) -> u8 {
        self.signal_strength_interval
    }

    pub fn set_signal_strength_interval(&mut self, seconds: u8) {
        self.signal_strength_interval = seconds;
    }

    pub fn pending_signal_report(&self) -> bool {
        self.pending_signal_report
    }

    pub fn set_pending_signal_report(&mut self, pending: bool) {
        self.pending_signal_report = pending;
    }

    pub fn authorization_required(&self) -> bool {
        self.authorization_required
    }

    pub fn ccid(&self) -> u8 {
        self.ccid
    }

    pub fn call_capacity(&self) -> usize {
        self.calls.len()
    }

    /// Live calls in stable slot order
    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter().flatten()
    }

    pub(crate) fn calls_mut(&mut self) -> impl Iterator<Item = &mut Call> {
        self.calls.iter_mut().flatten()
    }

    pub fn call_count(&self) -> usize {
        self.calls.iter().flatten().count()
    }

    pub fn find_call(&self, call_index: u8) -> Option<&Call> {
        if call_index == crate::domain::call::FREE_CALL_INDEX {
            return None;
        }
        self.calls
            .iter()
            .flatten()
            .find(|call| call.index() == call_index)
    }

    pub fn find_call_mut(&mut self, call_index: u8) -> Option<&mut Call> {
        if call_index == crate::domain::call::FREE_CALL_INDEX {
            return None;
        }
        self.calls
            .iter_mut()
            .flatten()
            .find(|call| call.index() == call_index)
    }

    pub fn owns_call(&self, call_index: u8) -> bool {
        self.find_call(call_index).is_some()
    }

    /// Store a freshly-allocated call in the first free slot.
    ///
    /// Returns the call back when every slot is occupied.
    pub fn insert_call(&mut self, call: Call) -> Result<(), Call> {
        match self.calls.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(call);
                Ok(())
            }
            None => Err(call),
        }
    }

    /// Reset the slot holding `call_index` back to free without compacting,
    /// so slot positions stay stable for in-progress scans.
    pub fn free_call(&mut self, call_index: u8) -> Option<Call> {
        self.calls
            .iter_mut()
            .find(|slot| {
                slot.as_ref()
                    .is_some_and(|call| call.index() == call_index)
            })
            .and_then(Option::take)
    }

    /// At most one call per bearer may be alerting at any time.
    pub fn has_alerting_call(&self) -> bool {
        self.calls().any(|call| call.state() == CallState::Alerting)
    }

    pub fn notify_call_states(&self) -> bool {
        self.notify_call_states
    }

    pub fn set_notify_call_states(&mut self, enabled: bool) {
        self.notify_call_states = enabled;
    }

    pub fn notify_current_calls(&self) -> bool {
        self.notify_current_calls
    }

    pub fn set_notify_current_calls(&mut self, enabled: bool) {
        self.notify_current_calls = enabled;
    }

    pub fn terminate_record(&self) -> Option<TerminateRecord> {
        self.terminate_record
    }

    pub fn set_terminate_record(&mut self, record: TerminateRecord) {
        self.terminate_record = Some(record);
    }

    pub fn incoming_call(&self) -> Option<&UriRecord> {
        self.incoming_call.as_ref()
    }

    pub fn set_incoming_call(&mut self, record: Option<UriRecord>) {
        self.incoming_call = record;
    }

    pub fn incoming_uri(&self) -> Option<&UriRecord> {
        self.incoming_uri.as_ref()
    }

    pub fn set_incoming_uri(&mut self, record: Option<UriRecord>) {
        self.incoming_uri = record;
    }

    pub fn friendly_name(&self) -> Option<&UriRecord> {
        self.friendly_name.as_ref()
    }

    pub fn set_friendly_name(&mut self, record: Option<UriRecord>) {
        self.friendly_name = record;
    }
}

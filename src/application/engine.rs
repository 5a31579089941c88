//! Call-control engine
//!
//! Single-owner execution context tying the bearer registry, the call state
//! machine and the injected ports together. Every entry point takes
//! `&mut self`; the host serializes peer writes, application calls and timer
//! firings onto one engine instance.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::fanout;
use crate::application::ports::{AttributeServer, CallCallbacks, CharacteristicId, Scheduler};
use crate::application::registry::{
    self, AllocationError, BearerRegistry, CallIndexAllocator,
};
use crate::application::state_machine;
use crate::config::EngineConfig;
use crate::domain::bearer::{
    Bearer, BearerFeatures, BearerKind, StatusFlags, Technology, TerminateReason, TerminateRecord,
    UriRecord, AGGREGATE_INDEX,
};
use crate::domain::call::{CallDirection, CallState};
use crate::domain::shared::{ControlError, Result, ServiceError};
use crate::infrastructure::protocol::{records, uri};

/// Static description of a bearer to register.
#[derive(Debug, Clone)]
pub struct RegisterParams {
    pub provider_name: String,
    pub uci: String,
    pub uri_schemes: Vec<String>,
    pub technology: Technology,
    pub features: BearerFeatures,
    pub aggregate: bool,
    pub authorization_required: bool,
}

/// The engine itself.
///
/// Owns all bearer and call state and drives every state change through the
/// state machine, then fans the resulting reports out through the attribute
/// server. The aggregate bearer mirrors every regular bearer's reports.
pub struct CallControlEngine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: BearerRegistry,
    pub(crate) allocator: CallIndexAllocator,
    /// Indexes transitioned to a locally-held state by the last operation.
    pub(crate) held_scratch: Vec<u8>,
    pub(crate) next_ccid: u8,
    pub(crate) server: Box<dyn AttributeServer>,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) callbacks: Option<Box<dyn CallCallbacks>>,
}

impl CallControlEngine {
    pub fn new(
        config: EngineConfig,
        server: Box<dyn AttributeServer>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let registry = BearerRegistry::new(config.bearer_count);

        Self {
            config,
            registry,
            allocator: CallIndexAllocator::new(),
            held_scratch: Vec::new(),
            next_ccid: 0,
            server,
            scheduler,
            callbacks: None,
        }
    }

    /// Install the application callback sink. Without one, authorization
    /// defaults to denial on bearers that require it and no call events are
    /// reported.
    pub fn register_callbacks(&mut self, callbacks: Box<dyn CallCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    // ---- Lifecycle ----

    /// Register a bearer and publish its attribute set.
    ///
    /// The aggregate must be registered before any regular bearer and only
    /// once. Returns the bearer index (slot number, or the reserved aggregate
    /// index).
    pub fn register(&mut self, params: RegisterParams) -> Result<u8> {
        if params.provider_name.is_empty()
            || params.provider_name.len() > self.config.max_provider_name_len
        {
            return Err(ServiceError::InvalidParameter(
                "provider name empty or too long".into(),
            ));
        }
        if params.uci.is_empty() {
            return Err(ServiceError::InvalidParameter("empty UCI".into()));
        }
        let scheme_list = params.uri_schemes.join(",");
        if scheme_list.is_empty() || scheme_list.len() > self.config.max_scheme_list_len {
            return Err(ServiceError::InvalidParameter(
                "URI scheme list empty or too long".into(),
            ));
        }

        let (kind, bearer_index) = if params.aggregate {
            if self.registry.aggregate().is_some() {
                return Err(ServiceError::AggregateAlreadyRegistered);
            }
            (BearerKind::Aggregate, AGGREGATE_INDEX)
        } else {
            if self.registry.aggregate().is_none() {
                return Err(ServiceError::AggregateNotRegistered);
            }
            let slot = self
                .registry
                .free_slot()
                .ok_or(ServiceError::NoFreeBearerSlot)?;
            (BearerKind::Regular(slot), slot)
        };

        let ccid = self.next_ccid;
        self.next_ccid = self.next_ccid.wrapping_add(1);

        let bearer = Bearer::new(
            kind,
            params.provider_name,
            params.uci,
            params.technology,
            scheme_list,
            params.features,
            params.authorization_required,
            ccid,
            self.config.calls_per_bearer,
        );

        // Publish before committing; a failed registration leaves the
        // registry untouched.
        self.server.register_bearer(bearer_index)?;

        info!(
            bearer_index,
            provider = bearer.provider_name(),
            ccid,
            "Registered bearer"
        );
        match kind {
            BearerKind::Aggregate => self.registry.set_aggregate(bearer),
            BearerKind::Regular(slot) => self.registry.insert_regular(slot, bearer),
        }

        Ok(bearer_index)
    }

    /// Unregister a bearer and retract its attribute set.
    ///
    /// The aggregate can only go last. A failed retraction keeps the bearer
    /// registered; its signal timer is re-armed if one was running.
    pub fn unregister(&mut self, bearer_index: u8) -> Result<()> {
        let bearer = self
            .registry
            .get(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;

        if bearer.is_aggregate() && self.registry.any_regular_registered() {
            return Err(ServiceError::RegularBearersRemain);
        }
        let interval = bearer.signal_strength_interval();

        let was_armed = self.scheduler.cancel(bearer_index);
        if let Err(err) = self.server.unregister_bearer(bearer_index) {
            if was_armed && interval > 0 {
                self.scheduler
                    .schedule(bearer_index, Duration::from_secs(u64::from(interval)));
            }
            return Err(err.into());
        }

        self.registry.remove(bearer_index);
        info!(bearer_index, "Unregistered bearer");
        Ok(())
    }

    /// Content-control ID of a registered bearer.
    pub fn ccid(&self, bearer_index: u8) -> Result<u8> {
        self.registry
            .get(bearer_index)
            .map(Bearer::ccid)
            .ok_or(ServiceError::BearerNotFound(bearer_index))
    }

    // ---- Application-driven call control ----
    //
    // These mirror the peer-driven opcodes but bypass the control point:
    // no authorization, no acknowledgement, no opcode callbacks. State
    // reports still fan out.

    pub fn accept(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        self.held_scratch.clear();
        let bearer = self
            .registry
            .get_mut(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;
        state_machine::accept_call(bearer, call_index, &mut self.held_scratch)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn hold(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        self.held_scratch.clear();
        let bearer = self.bearer_mut(bearer_index)?;
        state_machine::hold_call(bearer, call_index)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn retrieve(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        self.held_scratch.clear();
        let bearer = self
            .registry
            .get_mut(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;
        state_machine::retrieve_call(bearer, call_index, &mut self.held_scratch)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn terminate(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        self.held_scratch.clear();
        self.do_terminate(bearer_index, call_index, TerminateReason::ServerEnded)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    /// Place an outgoing call on the given bearer. Returns the new call
    /// index; the call is left in the alerting state.
    pub fn originate(&mut self, bearer_index: u8, target_uri: &str) -> Result<u8> {
        if self.registry.get(bearer_index).is_none() {
            return Err(ServiceError::BearerNotFound(bearer_index));
        }
        self.held_scratch.clear();
        let call_index = self.do_originate(bearer_index, target_uri)?;
        Ok(call_index)
    }

    pub fn join(&mut self, call_indexes: &[u8]) -> Result<()> {
        let first = *call_indexes
            .first()
            .ok_or(ControlError::InvalidCallIndex)?;
        let bearer_index = self.owner_of(first)?;
        self.held_scratch.clear();
        let bearer = self
            .registry
            .get_mut(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;
        state_machine::join_calls(bearer, call_indexes, &mut self.held_scratch)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    // ---- Remote-party events ----

    pub fn remote_answer(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        let bearer = self.bearer_mut(bearer_index)?;
        state_machine::remote_answer(bearer, call_index)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn remote_hold(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        let bearer = self.bearer_mut(bearer_index)?;
        state_machine::remote_hold(bearer, call_index)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn remote_retrieve(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        let bearer = self.bearer_mut(bearer_index)?;
        state_machine::remote_retrieve(bearer, call_index)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    pub fn remote_terminate(&mut self, call_index: u8) -> Result<()> {
        let bearer_index = self.owner_of(call_index)?;
        self.held_scratch.clear();
        self.do_terminate(bearer_index, call_index, TerminateReason::RemoteEnded)?;
        self.fan_out(bearer_index);
        Ok(())
    }

    /// Present an incoming call on a bearer. `destination_uri` is the callee
    /// URI dialed by the remote party; `caller_uri` identifies the remote
    /// party. Returns the new call index.
    pub fn remote_incoming(
        &mut self,
        bearer_index: u8,
        destination_uri: &str,
        caller_uri: &str,
        friendly_name: Option<&str>,
    ) -> Result<u8> {
        if self.registry.get(bearer_index).is_none() {
            return Err(ServiceError::BearerNotFound(bearer_index));
        }
        let max = self.config.max_uri_len;
        if !uri::valid_uri(destination_uri.as_bytes(), max)
            || !uri::valid_uri(caller_uri.as_bytes(), max)
        {
            return Err(ServiceError::InvalidParameter(
                "incoming-call URI out of bounds".into(),
            ));
        }

        self.held_scratch.clear();
        let call_index = registry::allocate_call(
            &mut self.registry,
            &mut self.allocator,
            bearer_index,
            CallState::Incoming,
            CallDirection::Incoming,
            caller_uri.to_string(),
        )
        .map_err(Self::allocation_failed)?;

        let incoming_uri = UriRecord {
            call_index,
            uri: destination_uri.to_string(),
        };
        let incoming_call = UriRecord {
            call_index,
            uri: caller_uri.to_string(),
        };
        let friendly = friendly_name.map(|name| UriRecord {
            call_index,
            uri: name.to_string(),
        });

        for index in [bearer_index, AGGREGATE_INDEX] {
            let Some(bearer) = self.registry.get_mut(index) else {
                continue;
            };
            bearer.set_incoming_uri(Some(incoming_uri.clone()));
            bearer.set_incoming_call(Some(incoming_call.clone()));
            bearer.set_friendly_name(friendly.clone());

            let uri_payload = records::uri_record(Some(&incoming_uri));
            let call_payload = records::uri_record(Some(&incoming_call));
            self.notify_char(index, CharacteristicId::IncomingUri, &uri_payload);
            self.notify_char(index, CharacteristicId::IncomingCall, &call_payload);
            if let Some(ref friendly) = friendly {
                let payload = records::uri_record(Some(friendly));
                self.notify_char(index, CharacteristicId::FriendlyName, &payload);
            }
        }

        self.fan_out(bearer_index);
        info!(bearer_index, call_index, caller_uri, "Incoming call");
        Ok(call_index)
    }

    // ---- Bearer property setters ----
    //
    // Unchanged values are silently accepted without a notification.

    pub fn set_provider_name(&mut self, bearer_index: u8, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > self.config.max_provider_name_len {
            return Err(ServiceError::InvalidParameter(
                "provider name empty or too long".into(),
            ));
        }
        let bearer = self.bearer_mut(bearer_index)?;
        if bearer.provider_name() == name {
            return Ok(());
        }
        bearer.set_provider_name(name.to_string());
        let payload = name.as_bytes().to_vec();
        self.notify_char(bearer_index, CharacteristicId::ProviderName, &payload);
        Ok(())
    }

    pub fn set_technology(&mut self, bearer_index: u8, technology: Technology) -> Result<()> {
        let bearer = self.bearer_mut(bearer_index)?;
        if bearer.technology() == technology {
            return Ok(());
        }
        bearer.set_technology(technology);
        self.notify_char(
            bearer_index,
            CharacteristicId::Technology,
            &[technology.to_u8()],
        );
        Ok(())
    }

    pub fn set_status_flags(&mut self, bearer_index: u8, flags: StatusFlags) -> Result<()> {
        let bearer = self.bearer_mut(bearer_index)?;
        if bearer.status_flags() == flags {
            return Ok(());
        }
        bearer.set_status_flags(flags);
        let payload = flags.to_u16().to_le_bytes();
        self.notify_char(bearer_index, CharacteristicId::StatusFlags, &payload);
        Ok(())
    }

    /// Replace a regular bearer's supported URI schemes. The aggregate's
    /// derived list is re-announced as well.
    pub fn set_uri_scheme_list(&mut self, bearer_index: u8, schemes: &[&str]) -> Result<()> {
        if bearer_index == AGGREGATE_INDEX {
            return Err(ServiceError::InvalidParameter(
                "the aggregate scheme list is derived, not set".into(),
            ));
        }
        let list = schemes.join(",");
        if list.is_empty() || list.len() > self.config.max_scheme_list_len {
            return Err(ServiceError::InvalidParameter(
                "URI scheme list empty or too long".into(),
            ));
        }
        let bearer = self.bearer_mut(bearer_index)?;
        if bearer.uri_scheme_list() == list {
            return Ok(());
        }
        bearer.set_uri_scheme_list(list.clone());
        self.notify_char(
            bearer_index,
            CharacteristicId::UriSchemeList,
            list.as_bytes(),
        );

        if self.registry.aggregate().is_some() {
            let merged = aggregate_scheme_list(&self.registry, self.config.max_scheme_list_len);
            self.notify_char(
                AGGREGATE_INDEX,
                CharacteristicId::UriSchemeList,
                merged.as_bytes(),
            );
        }
        Ok(())
    }

    // ---- Shared internals ----

    pub(crate) fn owner_of(&self, call_index: u8) -> Result<u8> {
        self.registry
            .owner_of_call(call_index)
            .ok_or_else(|| ControlError::InvalidCallIndex.into())
    }

    pub(crate) fn bearer_mut(&mut self, bearer_index: u8) -> Result<&mut Bearer> {
        self.registry
            .get_mut(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))
    }

    fn allocation_failed(err: AllocationError) -> ServiceError {
        warn!(error = %err, "Call allocation failed");
        ControlError::OutOfResources.into()
    }

    /// Free the call, record the reason and announce it on the bearer and
    /// the aggregate. The caller decides whether a call-state fan-out
    /// follows.
    pub(crate) fn do_terminate(
        &mut self,
        bearer_index: u8,
        call_index: u8,
        reason: TerminateReason,
    ) -> std::result::Result<(), ControlError> {
        let record = TerminateRecord { call_index, reason };
        let bearer = self
            .registry
            .get_mut(bearer_index)
            .ok_or(ControlError::InvalidCallIndex)?;
        state_machine::terminate_call(bearer, call_index)?;
        bearer.set_terminate_record(record);
        let is_aggregate = bearer.is_aggregate();

        debug!(bearer_index, call_index, %reason, "Terminated call");

        let payload = records::terminate_report(record);
        self.notify_char(bearer_index, CharacteristicId::TerminateReason, &payload);
        if !is_aggregate {
            let mut mirrored = false;
            if let Some(aggregate) = self.registry.aggregate_mut() {
                aggregate.set_terminate_record(record);
                mirrored = true;
            }
            if mirrored {
                self.notify_char(AGGREGATE_INDEX, CharacteristicId::TerminateReason, &payload);
            }
        }
        Ok(())
    }

    /// Allocate and dial an outgoing call. Reports once in the dialing state
    /// and again once alerting.
    pub(crate) fn do_originate(
        &mut self,
        bearer_index: u8,
        target_uri: &str,
    ) -> std::result::Result<u8, ControlError> {
        let bearer = self
            .registry
            .get(bearer_index)
            .ok_or(ControlError::InvalidCallIndex)?;
        // One outgoing attempt at a time per bearer.
        if bearer.has_alerting_call() {
            return Err(ControlError::OperationNotPossible);
        }
        if !uri::valid_uri(target_uri.as_bytes(), self.config.max_uri_len) {
            return Err(ControlError::InvalidUri);
        }

        let call_index = registry::allocate_call(
            &mut self.registry,
            &mut self.allocator,
            bearer_index,
            CallState::Dialing,
            CallDirection::Outgoing,
            target_uri.to_string(),
        )
        .map_err(|err| {
            warn!(error = %err, "Call allocation failed");
            ControlError::OutOfResources
        })?;

        if let Some(bearer) = self.registry.get_mut(bearer_index) {
            state_machine::hold_other_calls(bearer, &[call_index], &mut self.held_scratch);
        }
        self.fan_out(bearer_index);

        if let Some(call) = self
            .registry
            .get_mut(bearer_index)
            .and_then(|bearer| bearer.find_call_mut(call_index))
        {
            call.set_state(CallState::Alerting);
        }
        self.fan_out(bearer_index);

        debug!(bearer_index, call_index, target_uri, "Outgoing call");
        Ok(call_index)
    }

    /// Notify the current-calls and call-state reports of a bearer, plus the
    /// aggregate mirror. Failures are logged, never propagated.
    pub(crate) fn fan_out(&mut self, bearer_index: u8) {
        if let Err(err) = fanout::notify_calls(
            &self.registry,
            self.server.as_mut(),
            bearer_index,
            self.config.report_buf_size,
        ) {
            warn!(bearer_index, error = %err, "Call report notification failed");
        }
    }

    pub(crate) fn notify_char(
        &mut self,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) {
        if let Err(err) = self.server.notify(bearer_index, characteristic, payload) {
            debug!(bearer_index, ?characteristic, error = %err, "Notification not delivered");
        }
    }
}

/// The aggregate's URI scheme list: its own schemes followed by every
/// regular bearer's, comma-joined and capped at the configured length on
/// whole-list boundaries.
pub(crate) fn aggregate_scheme_list(registry: &BearerRegistry, limit: usize) -> String {
    let own = registry.aggregate().map(|aggregate| aggregate.uri_scheme_list());
    let lists = own
        .into_iter()
        .chain(registry.regular_bearers().map(|bearer| bearer.uri_scheme_list()));

    let mut joined = String::new();
    for list in lists {
        if list.is_empty() {
            continue;
        }
        let extra = if joined.is_empty() { 0 } else { 1 } + list.len();
        if joined.len() + extra > limit {
            warn!("Aggregate URI scheme list truncated");
            break;
        }
        if !joined.is_empty() {
            joined.push(',');
        }
        joined.push_str(list);
    }

    joined
}

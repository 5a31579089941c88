//! Peer-facing characteristic surface
//!
//! Reads, writes and subscription changes arriving from the attribute layer
//! land here. Control-point commands are decoded, routed to the owning bearer
//! (resolving through the aggregate when addressed there), executed and
//! acknowledged in-band to the writing peer.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::application::engine::{aggregate_scheme_list, CallControlEngine};
use crate::application::fanout;
use crate::application::ports::{CharacteristicId, PeerId};
use crate::application::state_machine;
use crate::domain::bearer::{TerminateReason, AGGREGATE_INDEX};
use crate::domain::shared::{ControlError, Result, ServiceError, WriteError};
use crate::infrastructure::protocol::{records, Command, ParseError, ResultCode};

impl CallControlEngine {
    /// Serve a characteristic read.
    pub fn read(&self, bearer_index: u8, characteristic: CharacteristicId) -> Result<Bytes> {
        let bearer = self
            .registry
            .get(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;

        let payload = match characteristic {
            CharacteristicId::ProviderName => {
                Bytes::copy_from_slice(bearer.provider_name().as_bytes())
            }
            CharacteristicId::Uci => Bytes::copy_from_slice(bearer.uci().as_bytes()),
            CharacteristicId::Technology => {
                Bytes::copy_from_slice(&[bearer.technology().to_u8()])
            }
            CharacteristicId::UriSchemeList => {
                if bearer.is_aggregate() {
                    let merged =
                        aggregate_scheme_list(&self.registry, self.config.max_scheme_list_len);
                    Bytes::from(merged.into_bytes())
                } else {
                    Bytes::copy_from_slice(bearer.uri_scheme_list().as_bytes())
                }
            }
            CharacteristicId::SignalStrength => {
                Bytes::copy_from_slice(&[bearer.signal_strength()])
            }
            CharacteristicId::SignalInterval => {
                Bytes::copy_from_slice(&[bearer.signal_strength_interval()])
            }
            CharacteristicId::CurrentCalls => fanout::build_current_calls_report(
                &self.registry,
                bearer,
                self.config.report_buf_size,
            ),
            CharacteristicId::ContentControlId => Bytes::copy_from_slice(&[bearer.ccid()]),
            CharacteristicId::StatusFlags => {
                Bytes::copy_from_slice(&bearer.status_flags().to_u16().to_le_bytes())
            }
            CharacteristicId::IncomingUri => records::uri_record(bearer.incoming_uri()),
            CharacteristicId::CallState => fanout::build_call_state_report(
                &self.registry,
                bearer,
                self.config.report_buf_size,
            ),
            CharacteristicId::OptionalOpcodes => {
                Bytes::copy_from_slice(&bearer.features().to_u16().to_le_bytes())
            }
            CharacteristicId::IncomingCall => records::uri_record(bearer.incoming_call()),
            CharacteristicId::FriendlyName => records::uri_record(bearer.friendly_name()),
            CharacteristicId::ControlPoint | CharacteristicId::TerminateReason => {
                return Err(ServiceError::InvalidParameter(
                    "characteristic is not readable".into(),
                ));
            }
        };

        Ok(payload)
    }

    /// Serve a characteristic write from a peer.
    ///
    /// Rejection order is fixed: authorization, then offset, then payload
    /// length. A rejected write mutates nothing. A decoded control-point
    /// command is always answered in-band, success or not.
    pub fn write(
        &mut self,
        peer: PeerId,
        bearer_index: u8,
        characteristic: CharacteristicId,
        offset: usize,
        payload: &[u8],
    ) -> std::result::Result<(), WriteError> {
        let Some(bearer) = self.registry.get(bearer_index) else {
            return Err(WriteError::UnknownBearer);
        };

        if bearer.authorization_required() {
            let mut callbacks = self.callbacks.take();
            let allowed = callbacks
                .as_mut()
                .map(|callbacks| callbacks.authorize(peer))
                .unwrap_or(false);
            self.callbacks = callbacks;
            if !allowed {
                debug!(%peer, bearer_index, "Unauthorized write rejected");
                return Err(WriteError::AuthorizationRequired);
            }
        }
        if offset != 0 {
            return Err(WriteError::InvalidOffset);
        }

        match characteristic {
            CharacteristicId::ControlPoint => self.control_point_write(peer, bearer_index, payload),
            CharacteristicId::SignalInterval => {
                if payload.len() != 1 {
                    return Err(WriteError::InvalidLength);
                }
                let seconds = payload[0];
                if let Some(bearer) = self.registry.get_mut(bearer_index) {
                    bearer.set_signal_strength_interval(seconds);
                    debug!(bearer_index, seconds, "Signal reporting interval updated");
                }
                Ok(())
            }
            _ => Err(WriteError::NotWritable),
        }
    }

    /// Track a peer (un)subscribing from a value-notified characteristic.
    /// Only the call reports are gated; everything else notifies through the
    /// attribute server's own subscriber bookkeeping.
    pub fn subscription_changed(
        &mut self,
        bearer_index: u8,
        characteristic: CharacteristicId,
        subscribed: bool,
    ) {
        let Some(bearer) = self.registry.get_mut(bearer_index) else {
            return;
        };

        match characteristic {
            CharacteristicId::CallState => bearer.set_notify_call_states(subscribed),
            CharacteristicId::CurrentCalls => bearer.set_notify_current_calls(subscribed),
            _ => {}
        }
        debug!(bearer_index, ?characteristic, subscribed, "Subscription changed");
    }

    fn control_point_write(
        &mut self,
        peer: PeerId,
        bearer_index: u8,
        payload: &[u8],
    ) -> std::result::Result<(), WriteError> {
        let command = match Command::parse(payload) {
            Ok(command) => command,
            Err(ParseError::InvalidLength) => return Err(WriteError::InvalidLength),
            Err(ParseError::UnknownOpcode(opcode)) => {
                debug!(%peer, bearer_index, opcode, "Unknown control-point opcode");
                self.ack(peer, bearer_index, 0, opcode, ResultCode::OpcodeNotSupported);
                return Ok(());
            }
        };

        self.held_scratch.clear();
        let opcode = command.opcode();

        let (status, target, reported_index) = match self.execute_command(bearer_index, &command) {
            Ok((target, call_index)) => (ResultCode::Success, Some(target), call_index),
            Err(err) => {
                debug!(
                    %peer,
                    bearer_index,
                    opcode = opcode.name(),
                    error = %err,
                    "Control-point command rejected"
                );
                // A failed command reports no call index.
                (ResultCode::from(err), None, 0)
            }
        };

        self.ack(peer, bearer_index, reported_index, opcode.to_u8(), status);

        if let Some(target) = target {
            self.fan_out(target);
            self.dispatch_callbacks(peer, target, &command, reported_index);
        }
        Ok(())
    }

    /// Route a command to its owning bearer and run it. Commands written to
    /// the aggregate resolve to the bearer owning the call, or for originate
    /// to the first bearer supporting the URI scheme.
    fn execute_command(
        &mut self,
        bearer_index: u8,
        command: &Command,
    ) -> std::result::Result<(u8, u8), ControlError> {
        let is_aggregate = bearer_index == AGGREGATE_INDEX;

        match *command {
            Command::Accept { call_index } => {
                let target = self.resolve_owner(bearer_index, call_index)?;
                let bearer = self
                    .registry
                    .get_mut(target)
                    .ok_or(ControlError::InvalidCallIndex)?;
                state_machine::accept_call(bearer, call_index, &mut self.held_scratch)?;
                Ok((target, call_index))
            }
            Command::Terminate { call_index } => {
                let target = self.resolve_owner(bearer_index, call_index)?;
                self.do_terminate(target, call_index, TerminateReason::ClientTerminated)?;
                Ok((target, call_index))
            }
            Command::Hold { call_index } => {
                let target = self.resolve_owner(bearer_index, call_index)?;
                let bearer = self
                    .registry
                    .get_mut(target)
                    .ok_or(ControlError::InvalidCallIndex)?;
                state_machine::hold_call(bearer, call_index)?;
                Ok((target, call_index))
            }
            Command::Retrieve { call_index } => {
                let target = self.resolve_owner(bearer_index, call_index)?;
                let bearer = self
                    .registry
                    .get_mut(target)
                    .ok_or(ControlError::InvalidCallIndex)?;
                state_machine::retrieve_call(bearer, call_index, &mut self.held_scratch)?;
                Ok((target, call_index))
            }
            Command::Originate { ref uri } => {
                let uri = std::str::from_utf8(uri).map_err(|_| ControlError::InvalidUri)?;
                let target = if is_aggregate {
                    self.registry
                        .by_uri_scheme(uri)
                        .ok_or(ControlError::InvalidUri)?
                } else {
                    bearer_index
                };
                let call_index = self.do_originate(target, uri)?;
                Ok((target, call_index))
            }
            Command::Join { ref call_indexes } => {
                let first = *call_indexes
                    .first()
                    .ok_or(ControlError::InvalidCallIndex)?;
                let target = self.resolve_owner(bearer_index, first)?;
                let bearer = self
                    .registry
                    .get_mut(target)
                    .ok_or(ControlError::InvalidCallIndex)?;
                state_machine::join_calls(bearer, call_indexes, &mut self.held_scratch)?;
                Ok((target, first))
            }
        }
    }

    fn resolve_owner(
        &self,
        bearer_index: u8,
        call_index: u8,
    ) -> std::result::Result<u8, ControlError> {
        if bearer_index == AGGREGATE_INDEX {
            self.registry
                .owner_of_call(call_index)
                .ok_or(ControlError::InvalidCallIndex)
        } else {
            Ok(bearer_index)
        }
    }

    fn ack(&mut self, peer: PeerId, bearer_index: u8, call_index: u8, opcode: u8, status: ResultCode) {
        debug!(%peer, bearer_index, call_index, status = status.name(), "Acknowledging control-point write");
        let report = records::status_report(call_index, opcode, status);
        if let Err(err) = self.server.notify_peer(
            peer,
            bearer_index,
            CharacteristicId::ControlPoint,
            &report,
        ) {
            warn!(%peer, bearer_index, error = %err, "Control-point acknowledgement failed");
        }
    }

    /// Report a completed peer command to the application.
    ///
    /// Originate is special: the application answers whether the remote
    /// party could be alerted, and a negative answer tears the new call down
    /// with a call-failed reason. Calls held as a side effect are reported
    /// one by one.
    fn dispatch_callbacks(
        &mut self,
        peer: PeerId,
        target: u8,
        command: &Command,
        new_call_index: u8,
    ) {
        let Some(mut callbacks) = self.callbacks.take() else {
            return;
        };
        let peer = Some(peer);

        match *command {
            Command::Accept { call_index } => callbacks.call_accepted(peer, call_index),
            Command::Terminate { call_index } => {
                callbacks.call_terminated(peer, call_index, TerminateReason::ClientTerminated)
            }
            Command::Hold { call_index } => callbacks.call_held(peer, call_index),
            Command::Retrieve { call_index } => callbacks.call_retrieved(peer, call_index),
            Command::Originate { ref uri } => {
                let uri = String::from_utf8_lossy(uri).into_owned();
                let reached = callbacks.call_originated(peer, new_call_index, &uri);
                if !reached {
                    if let Err(err) =
                        self.do_terminate(target, new_call_index, TerminateReason::CallFailed)
                    {
                        debug!(call_index = new_call_index, error = %err, "Teardown of unreachable call failed");
                    }
                }
                self.fan_out(target);
            }
            Command::Join { ref call_indexes } => callbacks.calls_joined(peer, call_indexes),
        }

        for held in self.held_scratch.clone() {
            callbacks.call_held(peer, held);
        }
        self.callbacks = Some(callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::RegisterParams;
    use crate::application::ports::{MockAttributeServer, MockScheduler};
    use crate::config::EngineConfig;
    use crate::domain::bearer::{BearerFeatures, Technology};
    use crate::domain::call::CallState;

    fn quiet_server() -> Box<MockAttributeServer> {
        let mut server = MockAttributeServer::new();
        server.expect_register_bearer().returning(|_| Ok(()));
        server.expect_unregister_bearer().returning(|_| Ok(()));
        server.expect_notify().returning(|_, _, _| Ok(()));
        server.expect_notify_peer().returning(|_, _, _, _| Ok(()));
        Box::new(server)
    }

    fn idle_scheduler() -> Box<MockScheduler> {
        let mut scheduler = MockScheduler::new();
        scheduler.expect_schedule().returning(|_, _| ());
        scheduler.expect_cancel().returning(|_| false);
        scheduler.expect_is_armed().returning(|_| false);
        Box::new(scheduler)
    }

    fn params(aggregate: bool, schemes: &[&str], features: BearerFeatures) -> RegisterParams {
        RegisterParams {
            provider_name: "Example Telco".into(),
            uci: "un000".into(),
            uri_schemes: schemes.iter().map(|s| s.to_string()).collect(),
            technology: Technology::Lte,
            features,
            aggregate,
            authorization_required: false,
        }
    }

    fn engine_with_bearer(features: BearerFeatures) -> (CallControlEngine, u8) {
        let mut engine =
            CallControlEngine::new(EngineConfig::default(), quiet_server(), idle_scheduler());
        engine
            .register(params(true, &["tel"], BearerFeatures::all()))
            .unwrap();
        let bearer = engine.register(params(false, &["tel"], features)).unwrap();
        (engine, bearer)
    }

    const PEER: PeerId = PeerId::new(7);

    #[test]
    fn test_read_static_characteristics() {
        let (engine, bearer) = engine_with_bearer(BearerFeatures::all());

        assert_eq!(
            engine.read(bearer, CharacteristicId::ProviderName).unwrap(),
            Bytes::from_static(b"Example Telco")
        );
        assert_eq!(
            engine.read(bearer, CharacteristicId::Technology).unwrap(),
            Bytes::copy_from_slice(&[Technology::Lte.to_u8()])
        );
        assert_eq!(
            engine
                .read(bearer, CharacteristicId::OptionalOpcodes)
                .unwrap(),
            Bytes::from_static(&[0x03, 0x00])
        );
        assert!(engine.read(bearer, CharacteristicId::ControlPoint).is_err());
    }

    #[test]
    fn test_aggregate_scheme_list_read_is_derived() {
        let (mut engine, _) = engine_with_bearer(BearerFeatures::all());
        engine
            .register(params(false, &["sip"], BearerFeatures::all()))
            .unwrap();

        assert_eq!(
            engine
                .read(AGGREGATE_INDEX, CharacteristicId::UriSchemeList)
                .unwrap(),
            Bytes::from_static(b"tel,tel,sip")
        );
    }

    #[test]
    fn test_write_rejection_order() {
        let mut engine =
            CallControlEngine::new(EngineConfig::default(), quiet_server(), idle_scheduler());
        engine
            .register(RegisterParams {
                authorization_required: true,
                ..params(true, &["tel"], BearerFeatures::all())
            })
            .unwrap();

        // No callback sink installed: authorization defaults to denial, and
        // it outranks the bad offset and bad length.
        assert_eq!(
            engine.write(PEER, AGGREGATE_INDEX, CharacteristicId::SignalInterval, 1, &[]),
            Err(WriteError::AuthorizationRequired)
        );

        struct AllowAll;
        impl crate::application::ports::CallCallbacks for AllowAll {
            fn authorize(&mut self, _peer: PeerId) -> bool {
                true
            }
        }
        engine.register_callbacks(Box::new(AllowAll));

        assert_eq!(
            engine.write(PEER, AGGREGATE_INDEX, CharacteristicId::SignalInterval, 1, &[5]),
            Err(WriteError::InvalidOffset)
        );
        assert_eq!(
            engine.write(PEER, AGGREGATE_INDEX, CharacteristicId::SignalInterval, 0, &[5, 5]),
            Err(WriteError::InvalidLength)
        );
        assert_eq!(
            engine.write(PEER, AGGREGATE_INDEX, CharacteristicId::SignalInterval, 0, &[5]),
            Ok(())
        );
        assert_eq!(
            engine
                .read(AGGREGATE_INDEX, CharacteristicId::SignalInterval)
                .unwrap(),
            Bytes::from_static(&[5])
        );
    }

    #[test]
    fn test_non_writable_characteristic() {
        let (mut engine, bearer) = engine_with_bearer(BearerFeatures::all());
        assert_eq!(
            engine.write(PEER, bearer, CharacteristicId::ProviderName, 0, b"x"),
            Err(WriteError::NotWritable)
        );
    }

    #[test]
    fn test_unknown_opcode_is_acked_in_band() {
        let mut server = MockAttributeServer::new();
        server.expect_register_bearer().returning(|_| Ok(()));
        server.expect_notify().returning(|_, _, _| Ok(()));
        server
            .expect_notify_peer()
            .withf(|_, _, characteristic, payload| {
                *characteristic == CharacteristicId::ControlPoint
                    && payload == [0x00, 0xAB, ResultCode::OpcodeNotSupported.to_u8()]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut engine =
            CallControlEngine::new(EngineConfig::default(), Box::new(server), idle_scheduler());
        engine
            .register(params(true, &["tel"], BearerFeatures::all()))
            .unwrap();

        assert_eq!(
            engine.write(
                PEER,
                AGGREGATE_INDEX,
                CharacteristicId::ControlPoint,
                0,
                &[0xAB, 0x01],
            ),
            Ok(())
        );
    }

    #[test]
    fn test_originate_via_aggregate_resolves_by_scheme() {
        let (mut engine, bearer) = engine_with_bearer(BearerFeatures::all());
        let sip_bearer = engine
            .register(params(false, &["sip"], BearerFeatures::all()))
            .unwrap();

        let mut payload = vec![0x04];
        payload.extend_from_slice(b"sip:alice@example.com");
        engine
            .write(PEER, AGGREGATE_INDEX, CharacteristicId::ControlPoint, 0, &payload)
            .unwrap();

        let owner = engine.registry.owner_of_call(1);
        assert_eq!(owner, Some(sip_bearer));
        assert_ne!(owner, Some(bearer));
        assert_eq!(
            engine.registry.find_call(1).map(|c| c.state()),
            Some(CallState::Alerting)
        );
    }

    #[test]
    fn test_failed_command_acks_with_zero_index() {
        let mut server = MockAttributeServer::new();
        server.expect_register_bearer().returning(|_| Ok(()));
        server.expect_notify().returning(|_, _, _| Ok(()));
        server
            .expect_notify_peer()
            .withf(|_, _, _, payload| {
                payload == [0x00, 0x00, ResultCode::InvalidCallIndex.to_u8()]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut engine =
            CallControlEngine::new(EngineConfig::default(), Box::new(server), idle_scheduler());
        engine
            .register(params(true, &["tel"], BearerFeatures::all()))
            .unwrap();

        // Accept of a call nobody owns.
        engine
            .write(PEER, AGGREGATE_INDEX, CharacteristicId::ControlPoint, 0, &[0x00, 9])
            .unwrap();
    }

    #[test]
    fn test_unreached_originate_is_torn_down() {
        struct NeverReaches;
        impl crate::application::ports::CallCallbacks for NeverReaches {
            fn call_originated(
                &mut self,
                _peer: Option<PeerId>,
                _call_index: u8,
                _uri: &str,
            ) -> bool {
                false
            }
        }

        let (mut engine, bearer) = engine_with_bearer(BearerFeatures::all());
        engine.register_callbacks(Box::new(NeverReaches));

        let mut payload = vec![0x04];
        payload.extend_from_slice(b"tel:999");
        engine
            .write(PEER, bearer, CharacteristicId::ControlPoint, 0, &payload)
            .unwrap();

        assert!(engine.registry.find_call(1).is_none());
        assert_eq!(
            engine
                .registry
                .get(bearer)
                .and_then(|b| b.terminate_record())
                .map(|r| r.reason),
            Some(TerminateReason::CallFailed)
        );
    }

    #[test]
    fn test_accept_reports_held_calls_to_app() {
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Default)]
        struct Sink {
            accepted: Vec<u8>,
            held: Vec<u8>,
        }
        struct Recorder(Rc<RefCell<Sink>>);
        impl crate::application::ports::CallCallbacks for Recorder {
            fn call_accepted(&mut self, _peer: Option<PeerId>, call_index: u8) {
                self.0.borrow_mut().accepted.push(call_index);
            }
            fn call_held(&mut self, _peer: Option<PeerId>, call_index: u8) {
                self.0.borrow_mut().held.push(call_index);
            }
        }

        let (mut engine, bearer) = engine_with_bearer(BearerFeatures::all());
        let sink = Rc::new(RefCell::new(Sink::default()));
        engine.register_callbacks(Box::new(Recorder(sink.clone())));

        let active = engine.originate(bearer, "tel:111").unwrap();
        engine.remote_answer(active).unwrap();
        let incoming = engine
            .remote_incoming(bearer, "tel:me", "tel:them", None)
            .unwrap();

        engine
            .write(
                PEER,
                bearer,
                CharacteristicId::ControlPoint,
                0,
                &[0x00, incoming],
            )
            .unwrap();

        let sink = sink.borrow();
        assert_eq!(sink.accepted, vec![incoming]);
        assert_eq!(sink.held, vec![active]);
        assert_eq!(
            engine.registry.find_call(active).map(|c| c.state()),
            Some(CallState::LocallyHeld)
        );
    }

    #[test]
    fn test_subscription_gates_call_reports() {
        let (mut engine, bearer) = engine_with_bearer(BearerFeatures::all());
        engine.subscription_changed(bearer, CharacteristicId::CallState, true);
        assert!(engine.registry.get(bearer).is_some_and(|b| b.notify_call_states()));
        engine.subscription_changed(bearer, CharacteristicId::CallState, false);
        assert!(!engine.registry.get(bearer).is_some_and(|b| b.notify_call_states()));
    }
}

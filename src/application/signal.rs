//! Signal-strength reporting
//!
//! Value changes are rate-limited per bearer: the first change arms a
//! one-shot timer and every further change before it fires only overwrites
//! the stored value. The firing reports the latest value and re-arms the
//! timer when a nonzero reporting interval is configured.

use std::time::Duration;

use tracing::debug;

use crate::application::engine::CallControlEngine;
use crate::application::ports::CharacteristicId;
use crate::domain::bearer::{SIGNAL_STRENGTH_MAX, SIGNAL_STRENGTH_UNKNOWN};
use crate::domain::shared::{Result, ServiceError};

impl CallControlEngine {
    /// Store a new signal-strength value and schedule its report.
    ///
    /// Accepts 0..=100 and the reserved "unknown" value. Setting an unchanged
    /// value is a no-op.
    pub fn set_signal_strength(&mut self, bearer_index: u8, value: u8) -> Result<()> {
        if value > SIGNAL_STRENGTH_MAX && value != SIGNAL_STRENGTH_UNKNOWN {
            return Err(ServiceError::InvalidParameter(
                "signal strength out of range".into(),
            ));
        }

        let bearer = self
            .registry
            .get_mut(bearer_index)
            .ok_or(ServiceError::BearerNotFound(bearer_index))?;
        if bearer.signal_strength() == value {
            return Ok(());
        }

        bearer.set_signal_strength(value);
        bearer.set_pending_signal_report(true);

        // An armed timer coalesces further changes; only the value reported
        // at firing time matters.
        if !self.scheduler.is_armed(bearer_index) {
            self.scheduler.schedule(bearer_index, Duration::ZERO);
        }

        debug!(bearer_index, value, "Signal strength updated");
        Ok(())
    }

    /// Handle the bearer's report timer firing.
    ///
    /// Called by the host when the scheduler's timer elapses. Quiet when the
    /// bearer has since been unregistered or has nothing pending; otherwise
    /// notifies the latest value and re-arms for the configured interval.
    pub fn signal_timer_fired(&mut self, bearer_index: u8) {
        let Some(bearer) = self.registry.get(bearer_index) else {
            return;
        };
        if !bearer.pending_signal_report() {
            return;
        }
        let value = bearer.signal_strength();
        let interval = bearer.signal_strength_interval();

        self.notify_char(bearer_index, CharacteristicId::SignalStrength, &[value]);
        if interval > 0 {
            self.scheduler
                .schedule(bearer_index, Duration::from_secs(u64::from(interval)));
        }

        if let Some(bearer) = self.registry.get_mut(bearer_index) {
            bearer.set_pending_signal_report(false);
        }
        debug!(bearer_index, value, "Signal strength reported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::RegisterParams;
    use crate::application::ports::{MockAttributeServer, MockScheduler};
    use crate::config::EngineConfig;
    use crate::domain::bearer::{BearerFeatures, Technology, AGGREGATE_INDEX};

    fn aggregate_params() -> RegisterParams {
        RegisterParams {
            provider_name: "Example Telco".into(),
            uci: "un000".into(),
            uri_schemes: vec!["tel".into()],
            technology: Technology::Lte,
            features: BearerFeatures::all(),
            aggregate: true,
            authorization_required: false,
        }
    }

    fn quiet_server() -> Box<MockAttributeServer> {
        let mut server = MockAttributeServer::new();
        server.expect_register_bearer().returning(|_| Ok(()));
        server.expect_notify().returning(|_, _, _| Ok(()));
        Box::new(server)
    }

    #[test]
    fn test_first_change_arms_timer_once() {
        let mut scheduler = MockScheduler::new();
        let mut armed = false;
        scheduler
            .expect_is_armed()
            .returning(move |_| std::mem::replace(&mut armed, true));
        scheduler
            .expect_schedule()
            .withf(|_, delay| *delay == Duration::ZERO)
            .times(1)
            .returning(|_, _| ());

        let mut engine = CallControlEngine::new(
            EngineConfig::default(),
            quiet_server(),
            Box::new(scheduler),
        );
        engine.register(aggregate_params()).unwrap();

        engine.set_signal_strength(AGGREGATE_INDEX, 40).unwrap();
        engine.set_signal_strength(AGGREGATE_INDEX, 50).unwrap();
        engine.set_signal_strength(AGGREGATE_INDEX, 60).unwrap();
    }

    #[test]
    fn test_firing_reports_latest_value_and_rearms() {
        let mut server = MockAttributeServer::new();
        server.expect_register_bearer().returning(|_| Ok(()));
        server
            .expect_notify()
            .withf(|_, characteristic, payload| {
                *characteristic == CharacteristicId::SignalStrength && payload == [60]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        server.expect_notify().returning(|_, _, _| Ok(()));

        let mut scheduler = MockScheduler::new();
        scheduler.expect_is_armed().returning(|_| false);
        scheduler
            .expect_schedule()
            .withf(|_, delay| *delay == Duration::ZERO)
            .returning(|_, _| ());
        scheduler
            .expect_schedule()
            .withf(|_, delay| *delay == Duration::from_secs(3))
            .times(1)
            .returning(|_, _| ());

        let mut engine = CallControlEngine::new(
            EngineConfig::default(),
            Box::new(server),
            Box::new(scheduler),
        );
        engine.register(aggregate_params()).unwrap();
        engine
            .registry
            .aggregate_mut()
            .map(|aggregate| aggregate.set_signal_strength_interval(3))
            .unwrap();

        engine.set_signal_strength(AGGREGATE_INDEX, 60).unwrap();
        engine.signal_timer_fired(AGGREGATE_INDEX);
        // Nothing pending anymore: a second firing is silent.
        engine.signal_timer_fired(AGGREGATE_INDEX);
    }

    #[test]
    fn test_out_of_range_value_rejected() {
        let mut scheduler = MockScheduler::new();
        scheduler.expect_is_armed().returning(|_| false);
        scheduler.expect_schedule().returning(|_, _| ());

        let mut engine = CallControlEngine::new(
            EngineConfig::default(),
            quiet_server(),
            Box::new(scheduler),
        );
        engine.register(aggregate_params()).unwrap();

        assert!(engine.set_signal_strength(AGGREGATE_INDEX, 101).is_err());
        assert!(engine
            .set_signal_strength(AGGREGATE_INDEX, SIGNAL_STRENGTH_UNKNOWN)
            .is_ok());
        assert!(engine.set_signal_strength(AGGREGATE_INDEX, 100).is_ok());
    }

    #[test]
    fn test_unchanged_value_is_a_noop() {
        let mut scheduler = MockScheduler::new();
        scheduler.expect_is_armed().returning(|_| false);
        scheduler.expect_schedule().times(1).returning(|_, _| ());

        let mut engine = CallControlEngine::new(
            EngineConfig::default(),
            quiet_server(),
            Box::new(scheduler),
        );
        engine.register(aggregate_params()).unwrap();

        engine.set_signal_strength(AGGREGATE_INDEX, 70).unwrap();
        // Firing clears the pending flag; re-setting the same value must not
        // schedule again.
        engine.signal_timer_fired(AGGREGATE_INDEX);
        engine.set_signal_strength(AGGREGATE_INDEX, 70).unwrap();
    }
}

//! Notification fan-out
//!
//! Builds wire-format call-state and current-calls snapshots and routes them
//! to a bearer's subscribers. A regular bearer's notification is always
//! mirrored on the aggregate with its own superset view; a failure on one leg
//! never prevents the other legs from being attempted.

use crate::application::ports::{AttributeServer, CharacteristicId};
use crate::application::registry::BearerRegistry;
use crate::domain::bearer::Bearer;
use crate::domain::shared::AttributeError;
use crate::infrastructure::protocol::ReportWriter;
use bytes::Bytes;
use tracing::warn;

fn put_call_states_for(bearer: &Bearer, writer: &mut ReportWriter) {
    for call in bearer.calls() {
        if !writer.put_call_state(call) {
            warn!(
                bearer_index = bearer.index(),
                "Not able to store all call states in the report"
            );
            return;
        }
    }
}

fn put_current_calls_for(bearer: &Bearer, writer: &mut ReportWriter) {
    for call in bearer.calls() {
        if !writer.put_current_call(call) {
            warn!(
                bearer_index = bearer.index(),
                "Not able to store all calls in the report"
            );
            return;
        }
    }
}

/// Build the call-state report for a bearer: `{index, state, flags}` triples
/// across the bearer itself and, for the aggregate, every regular bearer.
pub(crate) fn build_call_state_report(
    registry: &BearerRegistry,
    bearer: &Bearer,
    limit: usize,
) -> Bytes {
    let mut writer = ReportWriter::new(limit);
    put_call_states_for(bearer, &mut writer);

    if bearer.is_aggregate() {
        for regular in registry.regular_bearers() {
            put_call_states_for(regular, &mut writer);
        }
    }

    writer.freeze()
}

/// Build the current-calls report, same sourcing rules as the call-state
/// report but with length-prefixed URI-carrying records.
pub(crate) fn build_current_calls_report(
    registry: &BearerRegistry,
    bearer: &Bearer,
    limit: usize,
) -> Bytes {
    let mut writer = ReportWriter::new(limit);
    put_current_calls_for(bearer, &mut writer);

    if bearer.is_aggregate() {
        for regular in registry.regular_bearers() {
            put_current_calls_for(regular, &mut writer);
        }
    }

    writer.freeze()
}

fn notify_one(
    registry: &BearerRegistry,
    server: &mut dyn AttributeServer,
    bearer: &Bearer,
    limit: usize,
    first_err: &mut Option<AttributeError>,
) {
    if bearer.notify_call_states() {
        let report = build_call_state_report(registry, bearer, limit);
        if let Err(err) = server.notify(bearer.index(), CharacteristicId::CallState, &report) {
            warn!(bearer_index = bearer.index(), %err, "Call-state notification failed");
            first_err.get_or_insert(err);
        }
    }

    if bearer.notify_current_calls() {
        let report = build_current_calls_report(registry, bearer, limit);
        if let Err(err) = server.notify(bearer.index(), CharacteristicId::CurrentCalls, &report) {
            warn!(bearer_index = bearer.index(), %err, "Current-calls notification failed");
            first_err.get_or_insert(err);
        }
    }
}

/// Notify a bearer's call reports and mirror them on the aggregate.
///
/// Best-effort on every leg; the first failure is returned after all legs
/// have been attempted. The state mutation that triggered the notification
/// is never rolled back.
pub(crate) fn notify_calls(
    registry: &BearerRegistry,
    server: &mut dyn AttributeServer,
    bearer_index: u8,
    limit: usize,
) -> Result<(), AttributeError> {
    let Some(bearer) = registry.get(bearer_index) else {
        warn!(bearer_index, "Cannot notify an unregistered bearer");
        return Ok(());
    };

    let mut first_err = None;
    notify_one(registry, server, bearer, limit, &mut first_err);

    if !bearer.is_aggregate() {
        if let Some(aggregate) = registry.aggregate() {
            notify_one(registry, server, aggregate, limit, &mut first_err);
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockAttributeServer;
    use crate::domain::bearer::{BearerFeatures, BearerKind, Technology, AGGREGATE_INDEX};
    use crate::domain::call::{Call, CallDirection, CallState};
    use mockall::predicate::eq;

    fn registry_with_calls() -> BearerRegistry {
        let mut registry = BearerRegistry::new(2);
        let mut aggregate = Bearer::new(
            BearerKind::Aggregate,
            "Aggregate".to_string(),
            "un255".to_string(),
            Technology::Lte,
            String::new(),
            BearerFeatures::all(),
            false,
            0,
            4,
        );
        aggregate.set_notify_call_states(true);
        registry.set_aggregate(aggregate);

        let mut bearer = Bearer::new(
            BearerKind::Regular(0),
            "Carrier".to_string(),
            "un000".to_string(),
            Technology::Lte,
            "tel".to_string(),
            BearerFeatures::all(),
            false,
            1,
            4,
        );
        bearer.set_notify_call_states(true);
        bearer
            .insert_call(Call::new(
                3,
                CallState::Active,
                CallDirection::Outgoing,
                "tel:123".to_string(),
            ))
            .unwrap();
        registry.insert_regular(0, bearer);
        registry
    }

    #[test]
    fn test_regular_report_excludes_other_bearers() {
        let mut registry = registry_with_calls();
        let mut other = Bearer::new(
            BearerKind::Regular(1),
            "Other".to_string(),
            "un001".to_string(),
            Technology::Gsm,
            "sip".to_string(),
            BearerFeatures::all(),
            false,
            2,
            4,
        );
        other
            .insert_call(Call::new(
                9,
                CallState::Active,
                CallDirection::Incoming,
                "sip:x".to_string(),
            ))
            .unwrap();
        registry.insert_regular(1, other);

        let report =
            build_call_state_report(&registry, registry.get(0).unwrap(), 512);
        assert_eq!(report.len(), 3);
        assert_eq!(report[0], 3);

        // The aggregate view is the union
        let aggregate_report =
            build_call_state_report(&registry, registry.aggregate().unwrap(), 512);
        assert_eq!(aggregate_report.len(), 6);
    }

    #[test]
    fn test_notify_mirrors_to_aggregate() {
        let registry = registry_with_calls();
        let mut server = MockAttributeServer::new();
        server
            .expect_notify()
            .with(eq(0), eq(CharacteristicId::CallState), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Ok(()));
        server
            .expect_notify()
            .with(
                eq(AGGREGATE_INDEX),
                eq(CharacteristicId::CallState),
                mockall::predicate::always(),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        notify_calls(&registry, &mut server, 0, 512).unwrap();
    }

    #[test]
    fn test_aggregate_still_notified_after_owner_failure() {
        let registry = registry_with_calls();
        let mut server = MockAttributeServer::new();
        server
            .expect_notify()
            .with(eq(0), eq(CharacteristicId::CallState), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Err(AttributeError::Delivery("link lost".to_string())));
        server
            .expect_notify()
            .with(
                eq(AGGREGATE_INDEX),
                eq(CharacteristicId::CallState),
                mockall::predicate::always(),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let err = notify_calls(&registry, &mut server, 0, 512).unwrap_err();
        assert_eq!(err, AttributeError::Delivery("link lost".to_string()));
    }

    #[test]
    fn test_unsubscribed_characteristics_stay_silent() {
        let mut registry = registry_with_calls();
        registry.get_mut(0).unwrap().set_notify_call_states(false);
        registry
            .aggregate_mut()
            .unwrap()
            .set_notify_call_states(false);

        let mut server = MockAttributeServer::new();
        server.expect_notify().never();

        notify_calls(&registry, &mut server, 0, 512).unwrap();
    }
}

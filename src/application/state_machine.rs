//! Call-control state transitions
//!
//! Pure transition logic over one bearer's call table. Every function either
//! performs the full transition or returns a [`ControlError`] without having
//! mutated anything.

use crate::domain::bearer::Bearer;
use crate::domain::call::CallState;
use crate::domain::shared::ControlError;
use tracing::debug;

/// Demote every call on the bearer not listed in `protect`:
/// active -> locally held, remotely held -> locally and remotely held.
///
/// The scratch list is rebuilt on every invocation (never additive) and
/// collects the demoted call indices for later delivery to the hold callback.
pub(crate) fn hold_other_calls(bearer: &mut Bearer, protect: &[u8], scratch: &mut Vec<u8>) {
    scratch.clear();

    for call in bearer.calls_mut() {
        if protect.contains(&call.index()) {
            continue;
        }

        let next = match call.state() {
            CallState::Active => CallState::LocallyHeld,
            CallState::RemotelyHeld => CallState::LocallyAndRemotelyHeld,
            _ => continue,
        };
        call.set_state(next);
        scratch.push(call.index());
    }
}

/// accept: incoming -> active, then hold-others protecting this call.
pub(crate) fn accept_call(
    bearer: &mut Bearer,
    call_index: u8,
    scratch: &mut Vec<u8>,
) -> Result<(), ControlError> {
    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    if call.state() != CallState::Incoming {
        return Err(ControlError::StateMismatch);
    }

    call.set_state(CallState::Active);
    hold_other_calls(bearer, &[call_index], scratch);
    Ok(())
}

/// terminate: any state -> free. Always succeeds if the call exists; the
/// terminate-reason record is written by the caller, which also mirrors it
/// onto the aggregate.
pub(crate) fn terminate_call(bearer: &mut Bearer, call_index: u8) -> Result<(), ControlError> {
    bearer
        .free_call(call_index)
        .map(|_| ())
        .ok_or(ControlError::InvalidCallIndex)
}

/// Local hold: requires the hold capability.
pub(crate) fn hold_call(bearer: &mut Bearer, call_index: u8) -> Result<(), ControlError> {
    if !bearer.features().supports_hold() {
        return Err(ControlError::OpcodeNotSupported);
    }

    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    let next = match call.state() {
        CallState::Active => CallState::LocallyHeld,
        CallState::RemotelyHeld => CallState::LocallyAndRemotelyHeld,
        CallState::Incoming => CallState::LocallyHeld,
        _ => return Err(ControlError::StateMismatch),
    };
    call.set_state(next);
    Ok(())
}

/// Local retrieve: requires the hold capability; then hold-others protecting
/// this call.
pub(crate) fn retrieve_call(
    bearer: &mut Bearer,
    call_index: u8,
    scratch: &mut Vec<u8>,
) -> Result<(), ControlError> {
    if !bearer.features().supports_hold() {
        return Err(ControlError::OpcodeNotSupported);
    }

    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    let next = match call.state() {
        CallState::LocallyHeld => CallState::Active,
        CallState::LocallyAndRemotelyHeld => CallState::RemotelyHeld,
        _ => return Err(ControlError::StateMismatch),
    };
    call.set_state(next);

    hold_other_calls(bearer, &[call_index], scratch);
    Ok(())
}

/// join: promote each referenced call one hold-level, then hold-others
/// protecting the joined set.
///
/// Incoming calls are rejected outright; a call cannot be conferenced before
/// it has been accepted.
pub(crate) fn join_calls(
    bearer: &mut Bearer,
    call_indexes: &[u8],
    scratch: &mut Vec<u8>,
) -> Result<(), ControlError> {
    if !bearer.features().supports_join() {
        return Err(ControlError::OpcodeNotSupported);
    }

    if call_indexes.len() < 2 || call_indexes.len() > bearer.call_capacity() {
        return Err(ControlError::OperationNotPossible);
    }

    for (i, call_index) in call_indexes.iter().enumerate() {
        if call_indexes[..i].contains(call_index) {
            return Err(ControlError::InvalidCallIndex);
        }
    }

    // Validate the whole set before mutating anything
    for &call_index in call_indexes {
        let call = bearer
            .find_call(call_index)
            .ok_or(ControlError::InvalidCallIndex)?;

        match call.state() {
            CallState::Incoming => return Err(ControlError::OperationNotPossible),
            CallState::Active | CallState::LocallyHeld | CallState::LocallyAndRemotelyHeld => {}
            _ => return Err(ControlError::StateMismatch),
        }
    }

    for call in bearer.calls_mut() {
        if !call_indexes.contains(&call.index()) {
            continue;
        }
        let next = match call.state() {
            CallState::LocallyHeld => CallState::Active,
            CallState::LocallyAndRemotelyHeld => CallState::RemotelyHeld,
            // Active stays active
            other => other,
        };
        call.set_state(next);
    }

    debug!(joined = ?call_indexes, "Calls joined");
    hold_other_calls(bearer, call_indexes, scratch);
    Ok(())
}

/// remote answer: alerting -> active.
pub(crate) fn remote_answer(bearer: &mut Bearer, call_index: u8) -> Result<(), ControlError> {
    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    if call.state() != CallState::Alerting {
        return Err(ControlError::StateMismatch);
    }
    call.set_state(CallState::Active);
    Ok(())
}

/// Remote hold: toggles the remote half of the hold state.
pub(crate) fn remote_hold(bearer: &mut Bearer, call_index: u8) -> Result<(), ControlError> {
    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    let next = match call.state() {
        CallState::Active => CallState::RemotelyHeld,
        CallState::LocallyHeld => CallState::LocallyAndRemotelyHeld,
        _ => return Err(ControlError::StateMismatch),
    };
    call.set_state(next);
    debug!(call_index, state = next.name(), "Remote hold");
    Ok(())
}

/// Remote retrieve: clears the remote half of the hold state.
pub(crate) fn remote_retrieve(bearer: &mut Bearer, call_index: u8) -> Result<(), ControlError> {
    let call = bearer
        .find_call_mut(call_index)
        .ok_or(ControlError::InvalidCallIndex)?;

    let next = match call.state() {
        CallState::RemotelyHeld => CallState::Active,
        CallState::LocallyAndRemotelyHeld => CallState::LocallyHeld,
        _ => return Err(ControlError::StateMismatch),
    };
    call.set_state(next);
    debug!(call_index, state = next.name(), "Remote retrieve");
    Ok(())
}

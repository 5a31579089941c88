//! In-process attribute server
//!
//! A loopback implementation of the attribute port for hosts that embed the
//! engine without a radio transport, and for tests. Registration is tracked
//! per bearer; every delivered notification is kept in an inspectable log.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::trace;

use crate::application::ports::{AttributeServer, CharacteristicId, PeerId};
use crate::domain::shared::AttributeError;

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The addressed peer, or `None` for a subscriber broadcast.
    pub peer: Option<PeerId>,
    pub bearer_index: u8,
    pub characteristic: CharacteristicId,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
pub struct LoopbackAttributeServer {
    registered: HashSet<u8>,
    deliveries: Vec<Delivery>,
}

impl LoopbackAttributeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Most recent payload notified for the characteristic of a bearer.
    pub fn last_payload(
        &self,
        bearer_index: u8,
        characteristic: CharacteristicId,
    ) -> Option<&Bytes> {
        self.deliveries
            .iter()
            .rev()
            .find(|delivery| {
                delivery.bearer_index == bearer_index
                    && delivery.characteristic == characteristic
            })
            .map(|delivery| &delivery.payload)
    }

    fn record(
        &mut self,
        peer: Option<PeerId>,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), AttributeError> {
        if !self.registered.contains(&bearer_index) {
            return Err(AttributeError::Delivery(format!(
                "bearer {bearer_index} has no attribute set"
            )));
        }

        trace!(bearer_index, ?characteristic, len = payload.len(), "Delivering notification");
        self.deliveries.push(Delivery {
            peer,
            bearer_index,
            characteristic,
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }
}

impl AttributeServer for LoopbackAttributeServer {
    fn register_bearer(&mut self, bearer_index: u8) -> Result<(), AttributeError> {
        if !self.registered.insert(bearer_index) {
            return Err(AttributeError::Registration(format!(
                "bearer {bearer_index} already has an attribute set"
            )));
        }
        Ok(())
    }

    fn unregister_bearer(&mut self, bearer_index: u8) -> Result<(), AttributeError> {
        if !self.registered.remove(&bearer_index) {
            return Err(AttributeError::Registration(format!(
                "bearer {bearer_index} has no attribute set"
            )));
        }
        Ok(())
    }

    fn notify(
        &mut self,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), AttributeError> {
        self.record(None, bearer_index, characteristic, payload)
    }

    fn notify_peer(
        &mut self,
        peer: PeerId,
        bearer_index: u8,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), AttributeError> {
        self.record(Some(peer), bearer_index, characteristic, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_gates_delivery() {
        let mut server = LoopbackAttributeServer::new();

        assert!(server
            .notify(0, CharacteristicId::CallState, &[1, 0, 1])
            .is_err());

        server.register_bearer(0).unwrap();
        assert!(server.register_bearer(0).is_err());
        server
            .notify(0, CharacteristicId::CallState, &[1, 0, 1])
            .unwrap();

        assert_eq!(
            server.last_payload(0, CharacteristicId::CallState),
            Some(&Bytes::from_static(&[1, 0, 1]))
        );

        server.unregister_bearer(0).unwrap();
        assert!(server.unregister_bearer(0).is_err());
    }

    #[test]
    fn test_peer_notifications_carry_the_peer() {
        let mut server = LoopbackAttributeServer::new();
        server.register_bearer(2).unwrap();
        server
            .notify_peer(PeerId::new(9), 2, CharacteristicId::ControlPoint, &[1, 2, 0])
            .unwrap();

        assert_eq!(server.deliveries()[0].peer, Some(PeerId::new(9)));
    }
}

//! Bearer registry and the engine-wide call-index allocator

use crate::domain::bearer::{Bearer, AGGREGATE_INDEX};
use crate::domain::call::{Call, CallDirection, CallState, FREE_CALL_INDEX, MAX_CALL_INDEX};
use crate::infrastructure::protocol::uri;
use thiserror::Error;
use tracing::debug;

/// Why a call could not be allocated. Exhaustion of the shared index
/// namespace is distinct from one bearer's table being full; both surface as
/// OutOfResources on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Call-index namespace exhausted")]
    IndexSpaceExhausted,

    #[error("No free call slot on the bearer")]
    NoFreeSlot,
}

/// Holds the regular bearers plus the single aggregate bearer.
#[derive(Debug)]
pub struct BearerRegistry {
    aggregate: Option<Bearer>,
    bearers: Vec<Option<Bearer>>,
}

impl BearerRegistry {
    pub fn new(slot_count: usize) -> Self {
        Self {
            aggregate: None,
            bearers: vec![None; slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.bearers.len()
    }

    pub fn aggregate(&self) -> Option<&Bearer> {
        self.aggregate.as_ref()
    }

    pub fn aggregate_mut(&mut self) -> Option<&mut Bearer> {
        self.aggregate.as_mut()
    }

    pub fn set_aggregate(&mut self, bearer: Bearer) {
        self.aggregate = Some(bearer);
    }

    /// Registered regular bearers in slot order
    pub fn regular_bearers(&self) -> impl Iterator<Item = &Bearer> {
        self.bearers.iter().flatten()
    }

    pub fn any_regular_registered(&self) -> bool {
        self.bearers.iter().any(Option::is_some)
    }

    pub fn free_slot(&self) -> Option<u8> {
        self.bearers
            .iter()
            .position(Option::is_none)
            .map(|slot| slot as u8)
    }

    pub fn insert_regular(&mut self, slot: u8, bearer: Bearer) {
        self.bearers[slot as usize] = Some(bearer);
    }

    /// Lookup by bearer index: the aggregate sentinel resolves to the
    /// aggregate, anything else to the matching registered slot.
    pub fn get(&self, index: u8) -> Option<&Bearer> {
        if index == AGGREGATE_INDEX {
            self.aggregate.as_ref()
        } else {
            self.bearers.get(index as usize)?.as_ref()
        }
    }

    pub fn get_mut(&mut self, index: u8) -> Option<&mut Bearer> {
        if index == AGGREGATE_INDEX {
            self.aggregate.as_mut()
        } else {
            self.bearers.get_mut(index as usize)?.as_mut()
        }
    }

    pub fn remove(&mut self, index: u8) -> Option<Bearer> {
        if index == AGGREGATE_INDEX {
            self.aggregate.take()
        } else {
            self.bearers.get_mut(index as usize)?.take()
        }
    }

    /// Find the regular bearer owning a call index.
    ///
    /// The aggregate never owns calls, so an aggregate-addressed command is
    /// redirected through this lookup.
    pub fn owner_of_call(&self, call_index: u8) -> Option<u8> {
        if call_index == FREE_CALL_INDEX {
            return None;
        }

        self.regular_bearers()
            .find(|bearer| bearer.owns_call(call_index))
            .map(|bearer| bearer.index())
    }

    pub fn find_call(&self, call_index: u8) -> Option<&Call> {
        if call_index == FREE_CALL_INDEX {
            return None;
        }

        self.regular_bearers()
            .find_map(|bearer| bearer.find_call(call_index))
    }

    pub fn call_index_in_use(&self, call_index: u8) -> bool {
        self.find_call(call_index).is_some()
    }

    /// Resolve which bearer services an originate for the given URI: the
    /// first regular bearer listing the URI's scheme, falling back to the
    /// aggregate's own scheme list.
    pub fn by_uri_scheme(&self, uri_str: &str) -> Option<u8> {
        let scheme = uri::uri_scheme(uri_str)?;

        if let Some(bearer) = self
            .regular_bearers()
            .find(|bearer| uri::scheme_in_list(scheme, bearer.uri_scheme_list()))
        {
            return Some(bearer.index());
        }

        self.aggregate
            .as_ref()
            .filter(|bearer| uri::scheme_in_list(scheme, bearer.uri_scheme_list()))
            .map(|bearer| bearer.index())
    }
}

/// Assigns call indices from one counter shared by all bearers, which is what
/// lets the aggregate resolve an index to its owning bearer without a
/// back-pointer.
#[derive(Debug)]
pub struct CallIndexAllocator {
    next: u8,
}

impl CallIndexAllocator {
    pub fn new() -> Self {
        Self { next: FREE_CALL_INDEX }
    }

    /// Get the next free call index, cycling over 1..=254 and skipping any
    /// index currently in use by any bearer. Returns None only when the
    /// entire namespace is live.
    pub fn allocate(&mut self, registry: &BearerRegistry) -> Option<u8> {
        for _ in 0..MAX_CALL_INDEX {
            self.next = if self.next >= MAX_CALL_INDEX {
                1
            } else {
                self.next + 1
            };

            if !registry.call_index_in_use(self.next) {
                return Some(self.next);
            }
        }

        debug!("No more free call indices");
        None
    }
}

impl Default for CallIndexAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a fresh call index and place a new call in the bearer's table.
/// Leaves the registry untouched on failure.
pub fn allocate_call(
    registry: &mut BearerRegistry,
    allocator: &mut CallIndexAllocator,
    bearer_index: u8,
    state: CallState,
    direction: CallDirection,
    uri: String,
) -> Result<u8, AllocationError> {
    let call_index = allocator
        .allocate(registry)
        .ok_or(AllocationError::IndexSpaceExhausted)?;

    let bearer = registry
        .get_mut(bearer_index)
        .ok_or(AllocationError::NoFreeSlot)?;
    let call = Call::new(call_index, state, direction, uri);
    bearer.insert_call(call).map_err(|_| {
        debug!(bearer_index, calls = bearer.call_count(), "Call table full");
        AllocationError::NoFreeSlot
    })?;

    Ok(call_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bearer::{BearerFeatures, BearerKind, Technology};
    use crate::domain::call::{CallDirection, CallState};

    fn regular(slot: u8, schemes: &str, capacity: usize) -> Bearer {
        Bearer::new(
            BearerKind::Regular(slot),
            format!("Carrier {slot}"),
            format!("un{slot:03}"),
            Technology::Lte,
            schemes.to_string(),
            BearerFeatures::all(),
            false,
            slot,
            capacity,
        )
    }

    fn aggregate(schemes: &str) -> Bearer {
        Bearer::new(
            BearerKind::Aggregate,
            "Aggregate".to_string(),
            "un255".to_string(),
            Technology::Lte,
            schemes.to_string(),
            BearerFeatures::all(),
            false,
            0,
            4,
        )
    }

    fn add_call(bearer: &mut Bearer, index: u8) {
        bearer
            .insert_call(Call::new(
                index,
                CallState::Active,
                CallDirection::Outgoing,
                format!("tel:{index}"),
            ))
            .unwrap();
    }

    #[test]
    fn test_lookup_by_index() {
        let mut registry = BearerRegistry::new(2);
        registry.set_aggregate(aggregate("tel"));
        registry.insert_regular(1, regular(1, "tel", 2));

        assert!(registry.get(AGGREGATE_INDEX).unwrap().is_aggregate());
        assert_eq!(registry.get(1).unwrap().index(), 1);
        assert!(registry.get(0).is_none());
        assert!(registry.get(7).is_none());
    }

    #[test]
    fn test_owner_of_call_matches_direct_lookup() {
        let mut registry = BearerRegistry::new(2);
        registry.set_aggregate(aggregate(""));
        let mut b0 = regular(0, "tel", 2);
        let mut b1 = regular(1, "sip", 2);
        add_call(&mut b0, 3);
        add_call(&mut b1, 7);
        registry.insert_regular(0, b0);
        registry.insert_regular(1, b1);

        assert_eq!(registry.owner_of_call(3), Some(0));
        assert_eq!(registry.owner_of_call(7), Some(1));
        assert_eq!(registry.owner_of_call(9), None);
        assert_eq!(registry.owner_of_call(0), None);
        assert_eq!(
            registry.get(registry.owner_of_call(7).unwrap()).unwrap().find_call(7),
            registry.find_call(7)
        );
    }

    #[test]
    fn test_uri_scheme_resolution_prefers_regular_bearers() {
        let mut registry = BearerRegistry::new(2);
        registry.set_aggregate(aggregate("skype"));
        registry.insert_regular(0, regular(0, "tel,sip", 2));
        registry.insert_regular(1, regular(1, "tel", 2));

        // First match wins
        assert_eq!(registry.by_uri_scheme("tel:123"), Some(0));
        assert_eq!(registry.by_uri_scheme("sip:a@b"), Some(0));
        // Falls back to the aggregate's own list
        assert_eq!(registry.by_uri_scheme("skype:x"), Some(AGGREGATE_INDEX));
        assert_eq!(registry.by_uri_scheme("xmpp:x"), None);
        // No scheme at all
        assert_eq!(registry.by_uri_scheme(":123"), None);
    }

    #[test]
    fn test_allocator_skips_live_indices() {
        let mut registry = BearerRegistry::new(1);
        registry.set_aggregate(aggregate(""));
        let mut bearer = regular(0, "tel", 3);
        add_call(&mut bearer, 1);
        add_call(&mut bearer, 2);
        registry.insert_regular(0, bearer);

        let mut allocator = CallIndexAllocator::new();
        assert_eq!(allocator.allocate(&registry), Some(3));
    }

    #[test]
    fn test_allocator_wraps_before_reserved_indices() {
        let registry = BearerRegistry::new(0);
        let mut allocator = CallIndexAllocator::new();
        allocator.next = MAX_CALL_INDEX - 1;

        assert_eq!(allocator.allocate(&registry), Some(MAX_CALL_INDEX));
        // 255 (aggregate sentinel) and 0 (free sentinel) are never assigned
        assert_eq!(allocator.allocate(&registry), Some(1));
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut registry = BearerRegistry::new(1);
        registry.set_aggregate(aggregate(""));
        let mut bearer = regular(0, "tel", usize::from(MAX_CALL_INDEX));
        for index in 1..=MAX_CALL_INDEX {
            add_call(&mut bearer, index);
        }
        registry.insert_regular(0, bearer);

        let mut allocator = CallIndexAllocator::new();
        assert_eq!(allocator.allocate(&registry), None);
    }
}

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::types::{BinId, Color, ItemId};

/// Who currently holds an item. An item has exactly one owner at any instant; the owner only
/// changes at the single moment a transfer lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Source,
    Buffer(usize),
    Bin(BinId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Source,
    Buffer,
    Bin,
}

impl Owner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::Source => OwnerKind::Source,
            Owner::Buffer(_) => OwnerKind::Buffer,
            Owner::Bin(_) => OwnerKind::Bin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Available,
    Buffered,
    Reserved,
    InTransit,
    Placed,
    Committed,
    Disposed,
}

impl ItemState {
    /// Returns `true` for the documented lifecycle edges.
    ///
    /// available -> (buffered | reserved) -> in-transit -> placed -> committed -> disposed, plus the
    /// fallback edges a failed or abandoned transfer takes back to where the item came from.
    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Available, Buffered)
                | (Available, Reserved)
                | (Buffered, Reserved)
                | (Reserved, InTransit)
                | (Reserved, Available)
                | (Reserved, Buffered)
                | (InTransit, Placed)
                | (InTransit, Buffered)
                | (InTransit, Available)
                | (Placed, Committed)
                | (Committed, Disposed)
        )
    }

    /// Returns `true` if `owner` is a legal holder for an item in this state.
    fn fits_owner(self, owner: Owner) -> bool {
        use ItemState::*;
        match self {
            Available => owner == Owner::Source,
            Buffered => owner.kind() == OwnerKind::Buffer,
            // in-flight items still belong to where they came from
            Reserved | InTransit => owner.kind() != OwnerKind::Bin,
            Placed | Committed | Disposed => owner.kind() == OwnerKind::Bin,
        }
    }
}

/// Everything the registry knows about one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRecord {
    pub color: Color,
    pub owner: Owner,
    pub state: ItemState,
}

/// Tracks which owner holds each item and refuses undocumented moves.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    items: BTreeMap<ItemId, ItemRecord>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an item freed at the source. Re-registering an item that is still available is a
    /// no-op so callers can retry a rejected admission.
    pub fn register(&mut self, item: ItemId, color: Color) -> Result<()> {
        if let Some(existing) = self.items.get(&item) {
            if existing.state == ItemState::Available {
                return Ok(());
            }
            return Err(Error::InvalidTransition {
                item,
                from: existing.state,
                to: ItemState::Available,
            });
        }

        self.items.insert(
            item,
            ItemRecord {
                color,
                owner: Owner::Source,
                state: ItemState::Available,
            },
        );
        trace!(item, %color, "Item registered at source");
        Ok(())
    }

    pub fn get(&self, item: ItemId) -> Option<&ItemRecord> {
        self.items.get(&item)
    }

    pub fn state(&self, item: ItemId) -> Option<ItemState> {
        self.items.get(&item).map(|record| record.state)
    }

    pub fn is_held_by(&self, item: ItemId, owner: Owner) -> bool {
        self.items.get(&item).is_some_and(|record| record.owner == owner)
    }

    /// Moves an item to `state` under `owner`, validating both the edge and the pairing.
    pub fn transition(&mut self, item: ItemId, state: ItemState, owner: Owner) -> Result<()> {
        let record = self.items.get_mut(&item).ok_or(Error::UnknownItem(item))?;
        if !record.state.can_transition_to(state) || !state.fits_owner(owner) {
            return Err(Error::InvalidTransition {
                item,
                from: record.state,
                to: state,
            });
        }

        trace!(item, from = ?record.state, to = ?state, ?owner, "Item transition");
        record.state = state;
        record.owner = owner;
        Ok(())
    }

    /// Commits a placed item. Only bin retirement calls this.
    pub fn commit(&mut self, item: ItemId) -> Result<()> {
        let owner = self.items.get(&item).ok_or(Error::UnknownItem(item))?.owner;
        self.transition(item, ItemState::Committed, owner)
    }

    /// Disposes a committed item. Anything short of committed is refused.
    pub fn dispose(&mut self, item: ItemId) -> Result<()> {
        let owner = self.items.get(&item).ok_or(Error::UnknownItem(item))?.owner;
        self.transition(item, ItemState::Disposed, owner)
    }

    /// Inserts an item straight into a resting state when a saved level is loaded.
    pub(crate) fn insert_restored(&mut self, item: ItemId, color: Color, owner: Owner, state: ItemState) {
        debug_assert!(state.fits_owner(owner));
        self.items.insert(item, ItemRecord { color, owner, state });
    }

    pub fn count_in(&self, state: ItemState) -> usize {
        self.items.values().filter(|record| record.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &ItemRecord)> {
        self.items.iter().map(|(id, record)| (*id, record))
    }
}

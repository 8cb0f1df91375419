//! Mutation epochs.
//!
//! Graph nodes may only be mutated from the epoch that created them. A new
//! epoch is entered with [`EpochScope::enter`] (for example while a
//! transformation runs over a rebuilt copy of a graph); nodes created outside
//! it become read-only until the scope is dropped.

use std::cell::Cell;

use derive_more::Display;
use thiserror::Error;

thread_local! {
    static CURRENT: Cell<Epoch> = const { Cell::new(Epoch(0)) };
    static NEXT: Cell<u64> = const { Cell::new(1) };
}

/// A token identifying a mutation epoch.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch active on the current thread.
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    /// Whether mutation is allowed for an owner of this epoch.
    pub fn is_valid(&self) -> bool {
        *self == Self::current()
    }

    /// Fails unless this epoch is the active one.
    pub fn check(&self) -> Result<(), EpochError> {
        let current = Self::current();
        if *self == current {
            Ok(())
        } else {
            Err(EpochError {
                owner: *self,
                current,
            })
        }
    }
}

/// Mutation was attempted from an epoch other than the owning one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot mutate a node owned by epoch {owner} from epoch {current}")]
pub struct EpochError {
    /// The epoch that created the node.
    pub owner: Epoch,
    /// The epoch that attempted the mutation.
    pub current: Epoch,
}

/// Guard for a fresh epoch. The previous epoch is restored on drop.
#[derive(Debug)]
#[must_use = "the epoch ends when the scope is dropped"]
pub struct EpochScope {
    previous: Epoch,
    epoch: Epoch,
}

impl EpochScope {
    /// Enters a new epoch on the current thread.
    pub fn enter() -> Self {
        let epoch = Epoch(NEXT.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        }));
        let previous = CURRENT.with(|current| current.replace(epoch));
        tracing::trace!(%previous, %epoch, "entered epoch");
        Self { previous, epoch }
    }

    /// The epoch opened by this scope.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

impl Drop for EpochScope {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scopes_nest_and_restore() {
        let outer = Epoch::current();
        {
            let scope = EpochScope::enter();
            assert_eq!(Epoch::current(), scope.epoch());
            assert!(!outer.is_valid());
            let err = outer.check().unwrap_err();
            assert_eq!(err.owner, outer);
            assert_eq!(err.current, scope.epoch());
        }
        assert!(outer.is_valid());
    }
}

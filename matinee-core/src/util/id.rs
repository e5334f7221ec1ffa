use std::fmt::{Debug, Display};
use std::marker::PhantomData;

use crossbeam::atomic::AtomicCell;

static NEXT_ID: AtomicCell<u64> = AtomicCell::new(1);

/// A process-local identifier, unique for the lifetime of the program.
///
/// Not stable across restarts, so never persisted anywhere. Resources
/// that outlive the process carry string keys instead.
pub struct Id<T> {
    value: u64,
    kind: PhantomData<T>,
}

impl<T> Id<T> {
    /// Allocates the next free id
    pub fn new() -> Self {
        Self {
            value: NEXT_ID.fetch_add(1),
            kind: PhantomData,
        }
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

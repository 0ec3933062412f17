//! Snapshot versioning.
//!
//! A version is an `(epoch, counter)` pair ordered lexicographically. The
//! counter starts from a small random seed so restarts are unlikely to reuse a
//! version a proxy has already seen. When the counter would overflow it
//! starts over inside a fresh epoch, so versions keep increasing.
//! [`SnapshotVersion::LAST`] is terminal: nothing follows it and publishing
//! past it fails.

use std::fmt;

use rand::Rng;

/// Upper bound (exclusive) of the random counter seed.
pub const SEED_UPPER_BOUND: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    epoch: u64,
    counter: u64,
}

impl SnapshotVersion {
    /// The greatest representable version. It has no successor.
    pub const LAST: Self = Self::new(u64::MAX, u64::MAX);

    pub const fn new(epoch: u64, counter: u64) -> Self {
        Self { epoch, counter }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The version that follows this one, or `None` at [`Self::LAST`].
    pub fn next(self) -> Option<Self> {
        match self.counter.checked_add(1) {
            Some(counter) => Some(Self { epoch: self.epoch, counter }),
            None => self.epoch.checked_add(1).map(|epoch| Self { epoch, counter: 1 }),
        }
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.counter)
    }
}

/// Hands out versions. A version is only consumed once it is committed, so a
/// failed publish does not burn one.
#[derive(Debug, Clone)]
pub struct VersionCounter {
    last: SnapshotVersion,
}

impl VersionCounter {
    /// Counter seeded with a random value in `1..SEED_UPPER_BOUND`.
    pub fn random() -> Self {
        let seed = rand::thread_rng().gen_range(1..SEED_UPPER_BOUND);
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { last: SnapshotVersion::new(0, seed) }
    }

    pub fn starting_at(last: SnapshotVersion) -> Self {
        Self { last }
    }

    pub fn last(&self) -> SnapshotVersion {
        self.last
    }

    /// Next version to publish. `None` once the version space is exhausted.
    pub fn peek_next(&self) -> Option<SnapshotVersion> {
        self.last.next()
    }

    pub fn commit(&mut self, version: SnapshotVersion) {
        if version > self.last {
            self.last = version;
        }
    }
}

impl Default for VersionCounter {
    fn default() -> Self {
        Self::random()
    }
}

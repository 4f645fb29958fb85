//! Per-kind record counters.

use serde::{Deserialize, Serialize};

use crate::record::EventKind;

/// Number of records seen for each [`EventKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub register: u64,
    pub upload: u64,
    pub watch: u64,
    pub like: u64,
}

impl KindCounts {
    pub fn increment(&mut self, kind: EventKind) {
        *self.slot(kind) += 1;
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Register => self.register,
            EventKind::Upload => self.upload,
            EventKind::Watch => self.watch,
            EventKind::Like => self.like,
        }
    }

    pub fn total(&self) -> u64 {
        self.register + self.upload + self.watch + self.like
    }

    /// Add another set of counts into this one.
    pub fn merge(&mut self, other: &KindCounts) {
        for kind in EventKind::ALL {
            *self.slot(kind) += other.get(kind);
        }
    }

    fn slot(&mut self, kind: EventKind) -> &mut u64 {
        match kind {
            EventKind::Register => &mut self.register,
            EventKind::Upload => &mut self.upload,
            EventKind::Watch => &mut self.watch,
            EventKind::Like => &mut self.like,
        }
    }
}

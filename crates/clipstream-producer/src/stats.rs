use std::fmt;

use clipstream_core::KindCounts;
use serde::Serialize;

/// Totals for one producer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    /// Lines read from the input, valid or not
    pub lines: u64,

    /// Valid records per kind. LIKE records are counted here but never sent.
    pub records: KindCounts,

    /// Lines rejected by the record codec
    pub errors: u64,

    /// Data messages published (control messages excluded)
    pub batches_sent: u64,
}

impl ProducerStats {
    /// Records actually sent downstream.
    pub fn records_published(&self) -> u64 {
        self.records.total() - self.records.like
    }
}

impl fmt::Display for ProducerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lines read: {}", self.lines)?;
        writeln!(f, "Likes: {} (skipped)", self.records.like)?;
        writeln!(f, "Registrations: {}", self.records.register)?;
        writeln!(f, "Uploads: {}", self.records.upload)?;
        writeln!(f, "Views: {}", self.records.watch)?;
        writeln!(f, "Errors: {}", self.errors)?;
        write!(f, "Batches sent: {}", self.batches_sent)
    }
}

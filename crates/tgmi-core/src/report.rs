use serde::Serialize;

/// Counts returned by every warehouse load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub inserted_or_updated: usize,
    pub skipped: usize,
    pub total_seen: usize,
}

impl LoadReport {
    pub fn record_written(&mut self) {
        self.inserted_or_updated += 1;
        self.total_seen += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
        self.total_seen += 1;
    }

    /// Adds another report's counts into this one.
    pub fn merge(&mut self, other: LoadReport) {
        self.inserted_or_updated += other.inserted_or_updated;
        self.skipped += other.skipped;
        self.total_seen += other.total_seen;
    }
}

impl std::fmt::Display for LoadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} written, {} skipped, {} seen",
            self.inserted_or_updated, self.skipped, self.total_seen
        )
    }
}

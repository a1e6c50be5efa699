/// Per-tick counters; advisory only, never used to stop the scheduler
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_transmitted: usize,
    pub files_archived: usize,
    pub transmit_failures: usize,
    pub archive_failures: usize,
    pub files_received: usize,
    pub files_removed: usize,
    pub receive_failures: usize,
    pub remove_failures: usize,
    pub rules_skipped: usize,
}

impl Summary {
    /// Number of file-scoped failures; each of these files is retried on the next tick
    #[must_use]
    pub fn failures(&self) -> usize {
        self.transmit_failures + self.archive_failures + self.receive_failures + self.remove_failures
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_transmitted: self.files_transmitted + other.files_transmitted,
            files_archived: self.files_archived + other.files_archived,
            transmit_failures: self.transmit_failures + other.transmit_failures,
            archive_failures: self.archive_failures + other.archive_failures,
            files_received: self.files_received + other.files_received,
            files_removed: self.files_removed + other.files_removed,
            receive_failures: self.receive_failures + other.receive_failures,
            remove_failures: self.remove_failures + other.remove_failures,
            rules_skipped: self.rules_skipped + other.rules_skipped,
        }
    }
}

impl std::ops::AddAssign for Summary {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "transmitted: {} (archived: {}, failed: {}, not archived: {}), received: {} (removed: {}, failed: {}, not removed: {}), rules skipped: {}",
            self.files_transmitted,
            self.files_archived,
            self.transmit_failures,
            self.archive_failures,
            self.files_received,
            self.files_removed,
            self.receive_failures,
            self.remove_failures,
            self.rules_skipped
        )
    }
}

use std::fmt;

/// One independent outcome of merging a local URL with its remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeChange {
    /// The remote record must be rewritten from the merged local state.
    UpdateNode,
    /// The local row's fields changed and must be written back.
    LocalRowChanged,
    /// New visits must be added to the local history.
    LocalVisitsAdded,
}

impl MergeChange {
    pub const ALL: [MergeChange; 3] = [
        MergeChange::UpdateNode,
        MergeChange::LocalRowChanged,
        MergeChange::LocalVisitsAdded,
    ];

    fn bit(self) -> u8 {
        match self {
            MergeChange::UpdateNode => 1 << 0,
            MergeChange::LocalRowChanged => 1 << 1,
            MergeChange::LocalVisitsAdded => 1 << 2,
        }
    }
}

/// Set of [`MergeChange`]s. The empty set means both sides already agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MergeResult {
    bits: u8,
}

impl MergeResult {
    pub const NONE: MergeResult = MergeResult { bits: 0 };

    pub fn of(changes: &[MergeChange]) -> Self {
        let mut result = Self::NONE;
        for change in changes {
            result.insert(*change);
        }
        result
    }

    pub fn insert(&mut self, change: MergeChange) {
        self.bits |= change.bit();
    }

    pub fn contains(&self, change: MergeChange) -> bool {
        self.bits & change.bit() != 0
    }

    pub fn is_none(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MergeChange> + '_ {
        MergeChange::ALL
            .into_iter()
            .filter(move |change| self.contains(*change))
    }
}

impl fmt::Debug for MergeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "MergeResult(None)");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}

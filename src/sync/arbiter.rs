//! Write arbitration.
//!
//! Decides, per record and before any write, whether the target side may be
//! written. Only the current run's memory ([`RunState`]) is consulted;
//! duplicates across runs are prevented by correlation, not here.

use serde::Serialize;

use crate::sync::types::{LocalId, RemoteId, RunState};

/// Outcome of arbitration, with the reason for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The record has no counterpart yet; write it.
    Unmapped,
    /// The record has a counterpart and this side wins; overwrite it.
    MasterOverwrite,
    /// The record has a counterpart and the other side wins.
    AlreadyCorrelated,
    /// The counterpart was written by the other half of this run.
    EchoSuppressed,
}

impl Verdict {
    /// Whether the write proceeds.
    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::Unmapped | Self::MasterOverwrite)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::MasterOverwrite => "master_overwrite",
            Self::AlreadyCorrelated => "already_correlated",
            Self::EchoSuppressed => "echo_suppressed",
        }
    }
}

/// Ownership policy for one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictArbiter {
    /// The remote side is authoritative.
    pub remote_is_master: bool,
}

impl ConflictArbiter {
    #[must_use]
    pub const fn new(remote_is_master: bool) -> Self {
        Self { remote_is_master }
    }

    /// Remote → local. `existing` is the local record correlated to the
    /// incoming remote id, if any.
    #[must_use]
    pub fn allow_import(&self, run: &RunState, existing: Option<LocalId>) -> Verdict {
        match existing {
            None => Verdict::Unmapped,
            Some(_) if !self.remote_is_master => Verdict::AlreadyCorrelated,
            Some(local_id) if run.was_exported(local_id) => Verdict::EchoSuppressed,
            Some(_) => Verdict::MasterOverwrite,
        }
    }

    /// Local → remote. `existing` is the remote id the local record carries,
    /// if any.
    #[must_use]
    pub fn allow_export(&self, run: &RunState, existing: Option<RemoteId>) -> Verdict {
        match existing {
            None => Verdict::Unmapped,
            Some(_) if self.remote_is_master => Verdict::AlreadyCorrelated,
            Some(remote_id) if run.was_imported(remote_id) => Verdict::EchoSuppressed,
            Some(_) => Verdict::MasterOverwrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_always_writes() {
        let run = RunState::new();
        for master in [false, true] {
            let arbiter = ConflictArbiter::new(master);
            assert_eq!(arbiter.allow_import(&run, None), Verdict::Unmapped);
            assert_eq!(arbiter.allow_export(&run, None), Verdict::Unmapped);
        }
    }

    #[test]
    fn test_import_of_correlated_record() {
        let mut run = RunState::new();

        let local_wins = ConflictArbiter::new(false);
        assert_eq!(local_wins.allow_import(&run, Some(1)), Verdict::AlreadyCorrelated);

        let remote_wins = ConflictArbiter::new(true);
        assert_eq!(remote_wins.allow_import(&run, Some(1)), Verdict::MasterOverwrite);

        run.record_export(1, 500);
        assert_eq!(remote_wins.allow_import(&run, Some(1)), Verdict::EchoSuppressed);
        assert!(!remote_wins.allow_import(&run, Some(1)).allows_write());
    }

    #[test]
    fn test_export_of_correlated_record() {
        let mut run = RunState::new();

        let remote_wins = ConflictArbiter::new(true);
        assert_eq!(remote_wins.allow_export(&run, Some(500)), Verdict::AlreadyCorrelated);

        let local_wins = ConflictArbiter::new(false);
        assert_eq!(local_wins.allow_export(&run, Some(500)), Verdict::MasterOverwrite);
        assert!(local_wins.allow_export(&run, Some(500)).allows_write());

        run.record_import(500, 1);
        assert_eq!(local_wins.allow_export(&run, Some(500)), Verdict::EchoSuppressed);
    }
}

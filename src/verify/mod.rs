//! Post-download verification.
//!
//! A downloaded file is only accepted when its measured duration falls
//! inside the configured bounds. The caller owns deletion of rejected files.

use std::fmt;
use std::path::Path;

use crate::backend::DurationProbe;
use crate::model::DurationBounds;

/// Outcome of verifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { seconds: u32 },
    Rejected(Rejection),
}

/// Why a downloaded file was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The probe failed or reported zero seconds
    #[error("unreadable")]
    Unreadable,

    #[error("out of bounds ({seconds}s)")]
    OutOfBounds { seconds: u32 },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { seconds } => write!(f, "accepted ({}s)", seconds),
            Self::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Measure `path` and check it against `bounds`.
pub fn verify(path: &Path, bounds: DurationBounds, probe: &dyn DurationProbe) -> Verdict {
    let seconds = probe.probe_duration(path);
    if seconds == 0 {
        return Verdict::Rejected(Rejection::Unreadable);
    }
    if !bounds.contains(seconds) {
        return Verdict::Rejected(Rejection::OutOfBounds { seconds });
    }
    Verdict::Accepted { seconds }
}

/// Delete a rejected file. Failures are logged, never propagated.
pub fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Deleted rejected file {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to delete rejected file {:?}: {}", path, e),
    }
}

//! Progress reporting for build and merge runs

/// Progress update passed to callbacks
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current phase
    pub phase: Phase,
    /// Current item number (1-indexed)
    pub current: usize,
    /// Total number of items
    pub total: usize,
    /// Item being processed, if any
    pub current_file: Option<String>,
}

impl Progress {
    #[must_use]
    pub fn new(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            current_file: None,
        }
    }

    #[must_use]
    pub fn with_file(phase: Phase, current: usize, total: usize, file: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            current_file: Some(file.into()),
        }
    }

    /// Completion ratio (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Phase of a build or merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Enumerating mod files
    Scanning,
    /// Diffing files against vanilla
    Building,
    /// Merging targets
    Merging,
    /// Writing archives and the size table
    Writing,
    Complete,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scanning => "Scanning files",
            Self::Building => "Building changelogs",
            Self::Merging => "Merging",
            Self::Writing => "Writing output",
            Self::Complete => "Complete",
        }
    }
}

/// Callback type used by the orchestrators
pub type ProgressCallback<'a> = &'a (dyn Fn(&Progress) + Send + Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert!((Progress::new(Phase::Merging, 1, 4).percentage() - 0.25).abs() < f32::EPSILON);
        assert!((Progress::new(Phase::Complete, 0, 0).percentage() - 1.0).abs() < f32::EPSILON);
        assert_eq!(Phase::Building.as_str(), "Building changelogs");
    }
}

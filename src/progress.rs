//! Progress reporting for analysis runs.

use std::fmt;

use tracing::info;

/// Ordered phases of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Segmentation and chunk planning.
    Preparation,
    /// Per-chunk paragraph classification.
    Classification,
    /// Merge of chunk findings into one finding per paragraph.
    Merge,
    /// Missing-requirement detection.
    GapDetection,
    /// Contradiction detection.
    ContradictionDetection,
    /// Rights-imbalance detection.
    RightsImbalance,
    /// Final structural synthesis.
    Synthesis,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Self::Preparation,
        Self::Classification,
        Self::Merge,
        Self::GapDetection,
        Self::ContradictionDetection,
        Self::RightsImbalance,
        Self::Synthesis,
    ];

    /// One-based position in [`Stage::ALL`].
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).map_or(0, |i| i + 1)
    }

    /// Human-readable stage name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Preparation => "Preparing contract",
            Self::Classification => "Classifying paragraphs",
            Self::Merge => "Merging findings",
            Self::GapDetection => "Detecting missing requirements",
            Self::ContradictionDetection => "Detecting contradictions",
            Self::RightsImbalance => "Assessing rights balance",
            Self::Synthesis => "Synthesizing summary",
        }
    }

    /// Short machine name used in diagnostics.
    pub fn key(self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Classification => "classification",
            Self::Merge => "merge",
            Self::GapDetection => "gap-detection",
            Self::ContradictionDetection => "contradiction-detection",
            Self::RightsImbalance => "rights-imbalance",
            Self::Synthesis => "synthesis",
        }
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Current stage.
    pub stage: Stage,
    /// One-based stage position.
    pub stage_index: usize,
    /// Number of stages.
    pub stage_total: usize,
    /// Completion within the stage, 0 to 100.
    pub percent: u8,
    /// Free-form detail.
    pub message: String,
}

impl ProgressUpdate {
    /// Creates an update for `stage`; `percent` is clamped to 100.
    pub fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            stage_index: stage.index(),
            stage_total: Stage::ALL.len(),
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} ({}%)",
            self.stage_index,
            self.stage_total,
            self.stage.label(),
            self.percent
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Sink for progress updates.
pub trait ProgressReporter: Send + Sync {
    /// Receives one update.
    fn report(&self, update: &ProgressUpdate);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: &ProgressUpdate) {
        self(update);
    }
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _update: &ProgressUpdate) {}
}

/// Forwards updates to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, update: &ProgressUpdate) {
        info!(
            stage = update.stage.key(),
            stage_index = update.stage_index,
            stage_total = update.stage_total,
            percent = update.percent,
            "{}",
            update.message
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn stage_indices_are_one_based() {
        assert_eq!(Stage::Preparation.index(), 1);
        assert_eq!(Stage::Synthesis.index(), 7);
    }

    #[test]
    fn display_is_human_readable() {
        let update = ProgressUpdate::new(Stage::Classification, 150, "batch 2 of 3");
        assert_eq!(update.percent, 100);
        assert_eq!(
            update.to_string(),
            "[2/7] Classifying paragraphs (100%): batch 2 of 3"
        );
        let update = ProgressUpdate::new(Stage::Merge, 0, "");
        assert_eq!(update.to_string(), "[3/7] Merging findings (0%)");
    }

    #[test]
    fn closures_are_reporters() {
        let seen = Mutex::new(Vec::new());
        let reporter = |update: &ProgressUpdate| seen.lock().unwrap().push(update.stage);
        reporter.report(&ProgressUpdate::new(Stage::GapDetection, 10, ""));
        NoProgress.report(&ProgressUpdate::new(Stage::Merge, 10, ""));
        assert_eq!(*seen.lock().unwrap(), vec![Stage::GapDetection]);
    }
}

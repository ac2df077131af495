//! Progress reporting for an experiment run.
//!
//! An [`Experiment`](crate::Experiment) reports each step of a run through an
//! optional [`ProgressCallback`]:
//!
//! - which [`TrainingStage`] is executing
//! - overall progress from 0.0 to 1.0
//! - the model currently being searched
//! - how many selected models have been handled
//!
//! # Example
//!
//! ```
//! use tabml_learning::{Experiment, ProgressUpdate};
//!
//! let experiment = Experiment::builder()
//!     .on_progress(|update: ProgressUpdate| {
//!         println!("[{}] {:.0}% - {}", update.stage, update.progress * 100.0, update.message);
//!         if let Some((done, total)) = update.models_completed {
//!             println!("  Models: {done}/{total}");
//!         }
//!     })
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;

/// The current stage of an experiment run.
///
/// Runs move through these stages in order:
///
/// 1. [`Initializing`](Self::Initializing) - validating the specification against the data
/// 2. [`Preprocessing`](Self::Preprocessing) - splitting, separating the target, preflight fits
/// 3. [`Searching`](Self::Searching) - cross-validated grid search for one model
/// 4. [`Refitting`](Self::Refitting) - fitting the winning combination on the training partition
/// 5. [`Evaluation`](Self::Evaluation) - scoring the refitted pipeline on the test partition
/// 6. [`Complete`](Self::Complete) - every selected model has been handled
///
/// Stages 3 to 5 repeat for every selected model. A run that stops on a
/// configuration error ends in [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrainingStage {
    #[default]
    Initializing,
    Preprocessing,
    Searching,
    Refitting,
    Evaluation,
    Complete,
    Failed,
}

impl TrainingStage {
    /// Snake-case name of the stage.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabml_learning::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::Searching.as_str(), "searching");
    /// assert_eq!(TrainingStage::Refitting.as_str(), "refitting");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Initializing => "initializing",
            TrainingStage::Preprocessing => "preprocessing",
            TrainingStage::Searching => "searching",
            TrainingStage::Refitting => "refitting",
            TrainingStage::Evaluation => "evaluation",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
        }
    }

    /// Returns `true` for [`Complete`](Self::Complete) and [`Failed`](Self::Failed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStage::Complete | TrainingStage::Failed)
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress report.
///
/// # Example
///
/// ```
/// use tabml_learning::{ProgressUpdate, TrainingStage};
///
/// let update = ProgressUpdate {
///     stage: TrainingStage::Searching,
///     progress: 0.5,
///     message: "Searching random_forest (4 combinations x 3 folds)".to_string(),
///     current_model: Some("random_forest".to_string()),
///     models_completed: Some((1, 3)),
/// };
/// assert!(!update.stage.is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub stage: TrainingStage,

    /// Overall progress from 0.0 to 1.0; non-decreasing within a run.
    pub progress: f64,

    pub message: String,

    /// Model being handled, during the per-model stages.
    pub current_model: Option<String>,

    /// `(handled, total)` selected models, once model handling has started.
    pub models_completed: Option<(u32, u32)>,
}

impl ProgressUpdate {
    pub(crate) fn new(stage: TrainingStage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            current_model: None,
            models_completed: None,
        }
    }

    pub(crate) fn for_model(mut self, model: &str, completed: usize, total: usize) -> Self {
        self.current_model = Some(model.to_string());
        self.models_completed = Some((completed as u32, total as u32));
        self
    }
}

/// Callback receiving [`ProgressUpdate`]s.
///
/// Called from the thread running the experiment. It should return quickly;
/// forward updates to a channel for anything slow.
///
/// ```
/// use std::sync::Arc;
/// use tabml_learning::{ProgressCallback, ProgressUpdate};
///
/// let callback: ProgressCallback = Arc::new(|update: ProgressUpdate| {
///     println!("[{}] {} - {}", update.stage, update.progress, update.message);
/// });
/// ```
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

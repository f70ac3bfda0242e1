use crate::backend::BackendId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// A task name has no backend in the current task mapping.
    #[error("no backend configured for task '{0}'")]
    UnknownTask(String),

    /// The requested backend has no credentials and no alternate could stand in.
    #[error("backend '{0}' is unavailable and no fallback could be used")]
    BackendUnavailable(BackendId),

    /// Every attempt failed, including the single fallback hop if one was taken.
    #[error("no output from '{primary}'{}", fallback_suffix(.fallback))]
    NoOutput {
        primary: BackendId,
        fallback: Option<BackendId>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn fallback_suffix(fallback: &Option<BackendId>) -> String {
    match fallback {
        Some(alt) => format!(" or its fallback '{}'", alt),
        None => String::new(),
    }
}

impl AnalysisError {
    /// True for failures a caller recovers from by substituting placeholder text.
    pub fn is_no_output(&self) -> bool {
        matches!(
            self,
            AnalysisError::BackendUnavailable(_) | AnalysisError::NoOutput { .. }
        )
    }
}

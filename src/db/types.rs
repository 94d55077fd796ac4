use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Evaluation progress of a task answer. `status` is the only source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "answerstatus", rename_all = "snake_case")]
pub(crate) enum AnswerStatus {
    Pending,
    InProgress,
    Correct,
    Incorrect,
    Error,
}

impl AnswerStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Error => "error",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Correct | Self::Incorrect | Self::Error)
    }

    pub(crate) fn from_verdict(is_correct: bool) -> Self {
        if is_correct {
            Self::Correct
        } else {
            Self::Incorrect
        }
    }

    /// `Some(verdict)` only for answers that received one.
    pub(crate) fn verdict(self) -> Option<bool> {
        match self {
            Self::Correct => Some(true),
            Self::Incorrect => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptoutcome", rename_all = "snake_case")]
pub(crate) enum AttemptOutcome {
    Correct,
    Incorrect,
    TransientError,
    PermanentError,
}

impl AttemptOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::TransientError => "transient_error",
            Self::PermanentError => "permanent_error",
        }
    }

    pub(crate) fn from_verdict(is_correct: bool) -> Self {
        if is_correct {
            Self::Correct
        } else {
            Self::Incorrect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let value = serde_json::to_value(AnswerStatus::InProgress).unwrap();
        assert_eq!(value, serde_json::json!("in_progress"));
        assert_eq!(AnswerStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn only_verdict_statuses_carry_a_verdict() {
        assert_eq!(AnswerStatus::Correct.verdict(), Some(true));
        assert_eq!(AnswerStatus::Incorrect.verdict(), Some(false));
        assert_eq!(AnswerStatus::Error.verdict(), None);
        assert_eq!(AnswerStatus::Pending.verdict(), None);
        assert!(AnswerStatus::Error.is_terminal());
        assert!(!AnswerStatus::InProgress.is_terminal());
    }
}

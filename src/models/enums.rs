//! Shared enums: invoice processing state machine, review statuses,
//! correction sources.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// ProcessingState
// ═══════════════════════════════════════════════════════════

/// Lifecycle state of an invoice record.
///
/// The machine is linear: `extracted → in_review → {validated | needs_review}
/// → approved`. The only permitted loop is repeated `in_review` submissions
/// while a reviewer iterates on corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Extracted,
    InReview,
    Validated,
    NeedsReview,
    Approved,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Extracted => "extracted",
            ProcessingState::InReview => "in_review",
            ProcessingState::Validated => "validated",
            ProcessingState::NeedsReview => "needs_review",
            ProcessingState::Approved => "approved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "extracted" => Some(ProcessingState::Extracted),
            "in_review" => Some(ProcessingState::InReview),
            "validated" => Some(ProcessingState::Validated),
            "needs_review" => Some(ProcessingState::NeedsReview),
            "approved" => Some(ProcessingState::Approved),
            _ => None,
        }
    }

    /// Whether a review submission may move an invoice from `self` to `next`.
    pub fn can_transition_to(&self, next: ProcessingState) -> bool {
        use ProcessingState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Extracted, InReview)
                | (InReview, InReview)
                | (InReview, Validated)
                | (InReview, NeedsReview)
                | (Validated, Approved)
                | (NeedsReview, Approved)
        )
    }

    /// Terminal states accept no further submissions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Approved)
    }
}

// ═══════════════════════════════════════════════════════════
// CorrectionSource
// ═══════════════════════════════════════════════════════════

/// Where a field correction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionSource {
    LlmText,
    LlmMultimodal,
}

impl CorrectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionSource::LlmText => "llm_text",
            CorrectionSource::LlmMultimodal => "llm_multimodal",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for state in [
            ProcessingState::Extracted,
            ProcessingState::InReview,
            ProcessingState::Validated,
            ProcessingState::NeedsReview,
            ProcessingState::Approved,
        ] {
            assert_eq!(ProcessingState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(ProcessingState::from_str("bogus"), None);
    }

    #[test]
    fn machine_is_linear() {
        use ProcessingState::*;
        assert!(Extracted.can_transition_to(InReview));
        assert!(InReview.can_transition_to(InReview));
        assert!(InReview.can_transition_to(Validated));
        assert!(InReview.can_transition_to(NeedsReview));
        assert!(Validated.can_transition_to(Approved));
        assert!(NeedsReview.can_transition_to(Approved));
    }

    #[test]
    fn no_backwards_edges() {
        use ProcessingState::*;
        assert!(!Validated.can_transition_to(InReview));
        assert!(!NeedsReview.can_transition_to(InReview));
        assert!(!Approved.can_transition_to(InReview));
        assert!(!InReview.can_transition_to(Extracted));
        assert!(!Extracted.can_transition_to(Validated));
        assert!(!Extracted.can_transition_to(Approved));
    }

    #[test]
    fn approved_is_terminal() {
        use ProcessingState::*;
        assert!(Approved.is_terminal());
        for next in [Extracted, InReview, Validated, NeedsReview, Approved] {
            assert!(!Approved.can_transition_to(next));
        }
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessingState::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");
    }

    #[test]
    fn correction_source_labels() {
        assert_eq!(CorrectionSource::LlmText.as_str(), "llm_text");
        assert_eq!(CorrectionSource::LlmMultimodal.as_str(), "llm_multimodal");
    }
}

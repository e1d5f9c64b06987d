//! Canonical workflow status machine.
//!
//! ```text
//! received -> designed -> {in_production | sourcing} -> quality_review
//! quality_review -> {rework -> in_production | quality_approved}
//! quality_approved -> packaged -> final_review -> {final_approved -> completed | failed}
//! any non-terminal -> failed
//! ```
//!
//! `rework` is the only back-edge. Its bound lives on the record
//! (`rework_limit`), not here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Lifecycle status of a workflow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Received,
    Designed,
    InProduction,
    Sourcing,
    QualityReview,
    Rework,
    QualityApproved,
    Packaged,
    FinalReview,
    FinalApproved,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 12] = [
        WorkflowStatus::Received,
        WorkflowStatus::Designed,
        WorkflowStatus::InProduction,
        WorkflowStatus::Sourcing,
        WorkflowStatus::QualityReview,
        WorkflowStatus::Rework,
        WorkflowStatus::QualityApproved,
        WorkflowStatus::Packaged,
        WorkflowStatus::FinalReview,
        WorkflowStatus::FinalApproved,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Received => "received",
            WorkflowStatus::Designed => "designed",
            WorkflowStatus::InProduction => "in_production",
            WorkflowStatus::Sourcing => "sourcing",
            WorkflowStatus::QualityReview => "quality_review",
            WorkflowStatus::Rework => "rework",
            WorkflowStatus::QualityApproved => "quality_approved",
            WorkflowStatus::Packaged => "packaged",
            WorkflowStatus::FinalReview => "final_review",
            WorkflowStatus::FinalApproved => "final_approved",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Forward edges of the machine, excluding the implicit `-> failed` edge
    /// every non-terminal state has.
    pub fn successors(self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::*;
        match self {
            Received => &[Designed],
            Designed => &[InProduction, Sourcing],
            InProduction => &[QualityReview],
            Sourcing => &[QualityReview],
            QualityReview => &[Rework, QualityApproved],
            Rework => &[InProduction],
            QualityApproved => &[Packaged],
            Packaged => &[FinalReview],
            FinalReview => &[FinalApproved],
            FinalApproved => &[Completed],
            Completed | Failed => &[],
        }
    }

    /// Whether `self -> next` is a legal status write.
    ///
    /// Self-transitions on non-terminal states are accepted as no-op writes.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == self || next == WorkflowStatus::Failed || self.successors().contains(&next)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        WorkflowStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == token)
            .ok_or_else(|| StateError::UnknownStatus(s.to_string()))
    }
}

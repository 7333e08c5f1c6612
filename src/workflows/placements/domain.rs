use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for enrolled candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Identifier wrapper for job postings published by the posting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingId(pub String);

/// Identifier wrapper for compensation tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierId(pub String);

/// Identifier wrapper for application attempts recorded at the gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PostingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roster snapshot consumed from the enrollment collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    /// Cumulative grade average on a 0-10 scale.
    pub cumulative_grade: f32,
    pub department: String,
    pub backlog_count: u32,
    pub graduation_year: i32,
}

/// Objective thresholds a posting requires of an applicant.
///
/// Empty sets are wildcards: the posting accepts every department or every
/// graduation year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingEligibilityCriteria {
    pub minimum_grade: f32,
    pub allowed_departments: BTreeSet<String>,
    pub max_backlogs: u32,
    pub allowed_graduation_years: BTreeSet<i32>,
}

/// Minimal description of the advertised posting used during an attempt.
///
/// `compensation_value` arrives in the single unit shared by all postings and
/// is what the tier catalog partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingSnapshot {
    pub posting_id: PostingId,
    pub compensation_value: u64,
    pub criteria: PostingEligibilityCriteria,
}

/// One compensation bucket with its per-candidate application cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationTier {
    pub id: TierId,
    pub label: String,
    /// Inclusive lower bound of the compensation range.
    pub lower_bound: u64,
    /// Exclusive upper bound; `None` marks the unbounded top tier.
    pub upper_bound: Option<u64>,
    pub application_cap: u32,
}

impl CompensationTier {
    pub fn contains(&self, compensation_value: u64) -> bool {
        compensation_value >= self.lower_bound
            && self
                .upper_bound
                .map_or(true, |upper| compensation_value < upper)
    }
}

/// Phases an application attempt moves through at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptPhase {
    Initiated,
    EligibilityChecked,
    Reserved,
    Committed,
    Released,
    Expired,
    RejectedEligibility,
    RejectedQuota,
    RejectedConfiguration,
}

impl AttemptPhase {
    pub const fn label(self) -> &'static str {
        match self {
            AttemptPhase::Initiated => "initiated",
            AttemptPhase::EligibilityChecked => "eligibility_checked",
            AttemptPhase::Reserved => "reserved",
            AttemptPhase::Committed => "committed",
            AttemptPhase::Released => "released",
            AttemptPhase::Expired => "expired",
            AttemptPhase::RejectedEligibility => "rejected_eligibility",
            AttemptPhase::RejectedQuota => "rejected_quota",
            AttemptPhase::RejectedConfiguration => "rejected_configuration",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(
            self,
            AttemptPhase::Initiated | AttemptPhase::EligibilityChecked | AttemptPhase::Reserved
        )
    }
}

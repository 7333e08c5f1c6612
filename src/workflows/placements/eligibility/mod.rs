mod rules;

use serde::{Deserialize, Serialize};

use super::domain::{CandidateRecord, PostingEligibilityCriteria};

/// Stateless evaluator applying a posting's criteria to a candidate snapshot.
///
/// `evaluate` is pure: identical inputs always yield the identical outcome
/// and reason set, and no check short-circuits the others.
#[derive(Debug, Default, Clone, Copy)]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    pub fn evaluate(
        &self,
        candidate: &CandidateRecord,
        criteria: &PostingEligibilityCriteria,
    ) -> EligibilityOutcome {
        let violations = rules::collect_violations(candidate, criteria);
        if violations.is_empty() {
            EligibilityOutcome::Eligible
        } else {
            EligibilityOutcome::Ineligible { violations }
        }
    }
}

/// Result of an eligibility check; ineligible outcomes carry every violated
/// rule, not just the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EligibilityOutcome {
    Eligible,
    Ineligible { violations: Vec<EligibilityViolation> },
}

impl EligibilityOutcome {
    pub fn is_eligible(&self) -> bool {
        matches!(self, EligibilityOutcome::Eligible)
    }
}

/// A single violated rule with the required threshold and the observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EligibilityViolation {
    GradeBelowMinimum { minimum: f32, actual: f32 },
    DepartmentNotAllowed { department: String },
    BacklogsOverLimit { limit: u32, actual: u32 },
    GraduationYearNotAllowed { graduation_year: i32 },
}

impl EligibilityViolation {
    pub fn summary(&self) -> String {
        match self {
            EligibilityViolation::GradeBelowMinimum { minimum, actual } => {
                format!("grade {actual:.2} below required minimum {minimum:.2}")
            }
            EligibilityViolation::DepartmentNotAllowed { department } => {
                format!("department '{department}' not accepted by this posting")
            }
            EligibilityViolation::BacklogsOverLimit { limit, actual } => {
                format!("{actual} active backlog(s) exceeds allowed {limit}")
            }
            EligibilityViolation::GraduationYearNotAllowed { graduation_year } => {
                format!("graduation year {graduation_year} not accepted by this posting")
            }
        }
    }
}

use super::super::domain::{CandidateRecord, PostingEligibilityCriteria};
use super::EligibilityViolation;

pub(crate) fn collect_violations(
    candidate: &CandidateRecord,
    criteria: &PostingEligibilityCriteria,
) -> Vec<EligibilityViolation> {
    // every rule runs so the caller can surface the complete violation set
    [
        check_grade(candidate, criteria),
        check_department(candidate, criteria),
        check_backlogs(candidate, criteria),
        check_graduation_year(candidate, criteria),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn check_grade(
    candidate: &CandidateRecord,
    criteria: &PostingEligibilityCriteria,
) -> Option<EligibilityViolation> {
    if candidate.cumulative_grade >= criteria.minimum_grade {
        None
    } else {
        Some(EligibilityViolation::GradeBelowMinimum {
            minimum: criteria.minimum_grade,
            actual: candidate.cumulative_grade,
        })
    }
}

fn check_department(
    candidate: &CandidateRecord,
    criteria: &PostingEligibilityCriteria,
) -> Option<EligibilityViolation> {
    // empty set is a wildcard: the posting accepts every department
    if criteria.allowed_departments.is_empty()
        || criteria.allowed_departments.contains(&candidate.department)
    {
        None
    } else {
        Some(EligibilityViolation::DepartmentNotAllowed {
            department: candidate.department.clone(),
        })
    }
}

fn check_backlogs(
    candidate: &CandidateRecord,
    criteria: &PostingEligibilityCriteria,
) -> Option<EligibilityViolation> {
    if candidate.backlog_count <= criteria.max_backlogs {
        None
    } else {
        Some(EligibilityViolation::BacklogsOverLimit {
            limit: criteria.max_backlogs,
            actual: candidate.backlog_count,
        })
    }
}

fn check_graduation_year(
    candidate: &CandidateRecord,
    criteria: &PostingEligibilityCriteria,
) -> Option<EligibilityViolation> {
    if criteria.allowed_graduation_years.is_empty()
        || criteria
            .allowed_graduation_years
            .contains(&candidate.graduation_year)
    {
        None
    } else {
        Some(EligibilityViolation::GraduationYearNotAllowed {
            graduation_year: candidate.graduation_year,
        })
    }
}

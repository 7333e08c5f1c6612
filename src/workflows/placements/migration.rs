//! Ledger re-partitioning for catalog replacements.
//!
//! Every consumed unit and live hold is re-resolved by its original
//! compensation value against the replacement catalog, merging counts where
//! old tiers collapse into one. Exceeding a new cap aborts the whole
//! migration; usage is never clamped or dropped.

use std::collections::HashMap;

use serde::Serialize;

use super::catalog::TierCatalog;
use super::domain::{CandidateId, CompensationTier, TierId};
use super::quota::{LedgerEntry, LedgerKey};

/// Re-partition failure; the outgoing catalog must stay active for manual
/// reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum TierMigrationError {
    #[error(
        "candidate {candidate_id} would hold {projected} application(s) in tier '{tier_label}' (cap {cap})"
    )]
    CapExceeded {
        candidate_id: CandidateId,
        tier_id: TierId,
        tier_label: String,
        projected: u32,
        cap: u32,
    },
    #[error("compensation value {compensation_value} does not resolve to any tier in the replacement catalog")]
    UnmappedCompensation { compensation_value: u64 },
}

/// Counters describing a completed ledger migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub entries_before: usize,
    pub entries_after: usize,
    pub consumed_units: usize,
    pub reservations_carried: usize,
}

pub(crate) fn rebucket(
    snapshot: Vec<(LedgerKey, LedgerEntry)>,
    replacement: &TierCatalog,
) -> Result<(HashMap<LedgerKey, LedgerEntry>, MigrationReport), TierMigrationError> {
    let entries_before = snapshot.len();
    let mut migrated: HashMap<LedgerKey, LedgerEntry> = HashMap::new();
    let mut consumed_units = 0;
    let mut reservations_carried = 0;

    for (key, entry) in snapshot {
        for compensation_value in entry.consumed {
            let tier = resolve(replacement, compensation_value)?;
            let slot = migrated
                .entry(LedgerKey {
                    candidate_id: key.candidate_id.clone(),
                    tier_id: tier.id.clone(),
                })
                .or_default();
            slot.consumed.push(compensation_value);
            consumed_units += 1;
            check_cap(&key.candidate_id, tier, slot)?;
        }

        for (token_id, reservation) in entry.reserved {
            let tier = resolve(replacement, reservation.compensation_value)?;
            let slot = migrated
                .entry(LedgerKey {
                    candidate_id: key.candidate_id.clone(),
                    tier_id: tier.id.clone(),
                })
                .or_default();
            slot.reserved.insert(token_id, reservation);
            reservations_carried += 1;
            check_cap(&key.candidate_id, tier, slot)?;
        }
    }

    let report = MigrationReport {
        entries_before,
        entries_after: migrated.len(),
        consumed_units,
        reservations_carried,
    };
    Ok((migrated, report))
}

fn resolve(
    replacement: &TierCatalog,
    compensation_value: u64,
) -> Result<&CompensationTier, TierMigrationError> {
    replacement
        .resolve(compensation_value)
        .ok_or(TierMigrationError::UnmappedCompensation { compensation_value })
}

fn check_cap(
    candidate_id: &CandidateId,
    tier: &CompensationTier,
    slot: &LedgerEntry,
) -> Result<(), TierMigrationError> {
    let projected = slot.consumed_count() + slot.reserved_count();
    if projected > tier.application_cap {
        return Err(TierMigrationError::CapExceeded {
            candidate_id: candidate_id.clone(),
            tier_id: tier.id.clone(),
            tier_label: tier.label.clone(),
            projected,
            cap: tier.application_cap,
        });
    }
    Ok(())
}

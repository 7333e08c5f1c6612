use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::{CompensationTier, TierId};

/// Malformed tier catalog detected at load time.
///
/// Any variant is fatal: the engine refuses to serve until the catalog is
/// corrected, and a replacement catalog carrying one of these never becomes
/// active.
#[derive(Debug, thiserror::Error)]
pub enum CatalogConfigError {
    #[error("tier catalog must contain at least one tier")]
    Empty,
    #[error("tier {index} ('{label}') must have a positive application cap")]
    NonPositiveCap { index: usize, label: String },
    #[error("tier {index} ('{label}') has inverted bounds ({lower} >= {upper})")]
    InvertedBounds {
        index: usize,
        label: String,
        lower: u64,
        upper: u64,
    },
    #[error("tier {index} is unbounded but is not the final tier")]
    UnboundedBeforeEnd { index: usize },
    #[error("tiers {first_index} and {second_index} overlap ({second_lower} is below {first_upper})")]
    Overlap {
        first_index: usize,
        second_index: usize,
        first_upper: u64,
        second_lower: u64,
    },
    #[error("gap between tiers {first_index} and {second_index} ({first_upper}..{second_lower} is uncovered)")]
    Gap {
        first_index: usize,
        second_index: usize,
        first_upper: u64,
        second_lower: u64,
    },
    #[error("tier id '{id}' appears at both indices {first_index} and {second_index}")]
    DuplicateId {
        id: TierId,
        first_index: usize,
        second_index: usize,
    },
}

/// Errors raised while importing an admin catalog export.
#[derive(Debug, thiserror::Error)]
pub enum CatalogImportError {
    #[error("failed to read tier catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tier catalog row: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Invalid(#[from] CatalogConfigError),
}

/// Ordered, validated partition of the compensation axis.
///
/// Construction through [`TierCatalog::try_new`] guarantees the tiers ascend
/// without gaps or overlaps and that only the final tier may be unbounded, so
/// `resolve` returns exactly one tier for any value at or above the lowest
/// lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct TierCatalog {
    tiers: Vec<CompensationTier>,
}

impl TierCatalog {
    pub fn try_new(tiers: Vec<CompensationTier>) -> Result<Self, CatalogConfigError> {
        validate(&tiers)?;
        Ok(Self { tiers })
    }

    /// Default ladder used by demos and tests; deployments supply their own
    /// catalog through [`TierCatalog::from_csv_path`] or `try_new`.
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                tier("tier-1", "Tier I", 0, Some(300_000), 15),
                tier("tier-2", "Tier II", 300_000, Some(500_000), 10),
                tier("tier-3", "Tier III", 500_000, Some(1_000_000), 8),
                tier("tier-4", "Tier IV", 1_000_000, Some(2_000_000), 5),
                tier("tier-5", "Tier V", 2_000_000, None, 3),
            ],
        }
    }

    /// Import the admin collaborator's CSV export.
    ///
    /// Expected header: `label,lower_bound,upper_bound,cap`; an empty
    /// `upper_bound` marks the unbounded top tier. Tier ids are assigned by
    /// ordinal position.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut tiers = Vec::new();
        for (index, row) in csv_reader.deserialize::<CatalogRow>().enumerate() {
            let row = row?;
            tiers.push(CompensationTier {
                id: TierId(format!("tier-{}", index + 1)),
                label: row.label,
                lower_bound: row.lower_bound,
                upper_bound: row.upper_bound,
                application_cap: row.cap,
            });
        }

        Ok(Self::try_new(tiers)?)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CatalogImportError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Map a raw compensation value onto its tier; values below the lowest
    /// lower bound resolve to `None`.
    pub fn resolve(&self, compensation_value: u64) -> Option<&CompensationTier> {
        self.tiers
            .iter()
            .find(|tier| tier.contains(compensation_value))
    }

    pub fn tier(&self, id: &TierId) -> Option<&CompensationTier> {
        self.tiers.iter().find(|tier| &tier.id == id)
    }

    pub fn tiers(&self) -> &[CompensationTier] {
        &self.tiers
    }
}

fn tier(id: &str, label: &str, lower: u64, upper: Option<u64>, cap: u32) -> CompensationTier {
    CompensationTier {
        id: TierId(id.to_string()),
        label: label.to_string(),
        lower_bound: lower,
        upper_bound: upper,
        application_cap: cap,
    }
}

fn validate(tiers: &[CompensationTier]) -> Result<(), CatalogConfigError> {
    if tiers.is_empty() {
        return Err(CatalogConfigError::Empty);
    }

    for (index, tier) in tiers.iter().enumerate() {
        if tier.application_cap == 0 {
            return Err(CatalogConfigError::NonPositiveCap {
                index,
                label: tier.label.clone(),
            });
        }

        if let Some(upper) = tier.upper_bound {
            if upper <= tier.lower_bound {
                return Err(CatalogConfigError::InvertedBounds {
                    index,
                    label: tier.label.clone(),
                    lower: tier.lower_bound,
                    upper,
                });
            }
        } else if index + 1 != tiers.len() {
            return Err(CatalogConfigError::UnboundedBeforeEnd { index });
        }

        for (earlier_index, earlier) in tiers[..index].iter().enumerate() {
            if earlier.id == tier.id {
                return Err(CatalogConfigError::DuplicateId {
                    id: tier.id.clone(),
                    first_index: earlier_index,
                    second_index: index,
                });
            }
        }
    }

    for (first_index, pair) in tiers.windows(2).enumerate() {
        let second_index = first_index + 1;
        // unbounded-before-end is already rejected above, so the first of the
        // pair always carries an upper bound here
        if let Some(first_upper) = pair[0].upper_bound {
            let second_lower = pair[1].lower_bound;
            if second_lower < first_upper {
                return Err(CatalogConfigError::Overlap {
                    first_index,
                    second_index,
                    first_upper,
                    second_lower,
                });
            }
            if second_lower > first_upper {
                return Err(CatalogConfigError::Gap {
                    first_index,
                    second_index,
                    first_upper,
                    second_lower,
                });
            }
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    label: String,
    lower_bound: u64,
    #[serde(default)]
    upper_bound: Option<u64>,
    cap: u32,
}

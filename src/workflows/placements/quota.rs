//! Per-(candidate, tier) quota ledger with a reserve/commit/release protocol.
//!
//! A bare check-then-increment is racy once an application spans multiple
//! user-facing steps, so the ledger hands out single-use reservation tokens:
//! `reserve` atomically checks `consumed + reserved < cap` under a per-key
//! mutex, `commit` turns the hold into consumed quota, and `release` cancels
//! it. Holds that outlive their TTL are reclaimed lazily on the next access
//! to the key, or in bulk by [`QuotaTracker::sweep_expired`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CandidateId, TierId};

/// Time source port so reservation expiry can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Ledger key: one candidate's usage within one tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub candidate_id: CandidateId,
    pub tier_id: TierId,
}

/// Identifier for a provisional hold on one unit of quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationTokenId(pub String);

/// Single-use handle returned by `reserve`, later committed or released.
///
/// The token keeps the compensation value it was issued against so the gate
/// can re-resolve its tier even after the catalog has been replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationToken {
    pub id: ReservationTokenId,
    pub candidate_id: CandidateId,
    pub tier_id: TierId,
    pub compensation_value: u64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingReservation {
    pub(crate) compensation_value: u64,
    pub(crate) issued_at: DateTime<Utc>,
}

/// Usage for one ledger key. The compensation value of every unit is kept so
/// a catalog re-partition can re-resolve original values rather than remap by
/// tier id.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerEntry {
    pub(crate) consumed: Vec<u64>,
    pub(crate) reserved: HashMap<ReservationTokenId, PendingReservation>,
}

impl LedgerEntry {
    pub(crate) fn consumed_count(&self) -> u32 {
        self.consumed.len() as u32
    }

    pub(crate) fn reserved_count(&self) -> u32 {
        self.reserved.len() as u32
    }

    fn purge_expired(&mut self, expire_before: DateTime<Utc>) -> Vec<ReservationTokenId> {
        let expired: Vec<ReservationTokenId> = self
            .reserved
            .iter()
            .filter(|(_, reservation)| reservation.issued_at < expire_before)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.reserved.remove(id);
        }
        expired
    }
}

/// Cap rejection detail mirrored back to callers ("limit reached: 8/8").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaExceeded {
    pub tier_id: TierId,
    pub cap: u32,
    pub consumed: u32,
    pub reserved: u32,
}

/// Outcome of committing a reservation; a repeat commit reports
/// `InvalidToken` and changes no counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    Committed,
    InvalidToken,
}

/// Outcome of releasing a reservation; a repeat release reports
/// `AlreadyReleased` and changes no counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

/// Read-only usage snapshot for one ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub consumed: u32,
    pub reserved: u32,
    pub cap: u32,
    pub remaining: u32,
}

/// A reservation that outlived its TTL and was reclaimed by a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredReservation {
    pub key: LedgerKey,
    pub token_id: ReservationTokenId,
}

/// Quota ledger enforcing `consumed + reserved <= cap` per key.
///
/// The outer map lock is held only to fetch or insert a key's entry handle;
/// all counting happens under that key's own mutex, so operations on distinct
/// keys proceed fully in parallel.
pub struct QuotaTracker {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    entries: RwLock<HashMap<LedgerKey, Arc<Mutex<LedgerEntry>>>>,
}

impl QuotaTracker {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            sequence: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Atomically check `consumed + reserved < cap` and take a hold; on
    /// failure nothing is mutated.
    pub fn reserve(
        &self,
        key: &LedgerKey,
        cap: u32,
        compensation_value: u64,
    ) -> Result<ReservationToken, QuotaExceeded> {
        let handle = self.entry_handle(key);
        let mut entry = handle.lock().expect("ledger entry lock poisoned");
        let now = self.clock.now();
        entry.purge_expired(self.expiry_horizon(now));

        let consumed = entry.consumed_count();
        let reserved = entry.reserved_count();
        if consumed + reserved >= cap {
            return Err(QuotaExceeded {
                tier_id: key.tier_id.clone(),
                cap,
                consumed,
                reserved,
            });
        }

        let id = self.next_token_id();
        entry.reserved.insert(
            id.clone(),
            PendingReservation {
                compensation_value,
                issued_at: now,
            },
        );

        Ok(ReservationToken {
            id,
            candidate_id: key.candidate_id.clone(),
            tier_id: key.tier_id.clone(),
            compensation_value,
            issued_at: now,
        })
    }

    /// Move one unit from reserved to consumed. Unknown, expired, and
    /// already-settled tokens all report `InvalidToken` with the ledger left
    /// unmodified.
    pub fn commit(&self, key: &LedgerKey, token_id: &ReservationTokenId) -> CommitOutcome {
        let handle = self.entry_handle(key);
        let mut entry = handle.lock().expect("ledger entry lock poisoned");
        entry.purge_expired(self.expiry_horizon(self.clock.now()));

        match entry.reserved.remove(token_id) {
            Some(reservation) => {
                entry.consumed.push(reservation.compensation_value);
                CommitOutcome::Committed
            }
            None => CommitOutcome::InvalidToken,
        }
    }

    /// Cancel a hold without consuming quota. Idempotent.
    pub fn release(&self, key: &LedgerKey, token_id: &ReservationTokenId) -> ReleaseOutcome {
        let handle = self.entry_handle(key);
        let mut entry = handle.lock().expect("ledger entry lock poisoned");
        entry.purge_expired(self.expiry_horizon(self.clock.now()));

        match entry.reserved.remove(token_id) {
            Some(_) => ReleaseOutcome::Released,
            None => ReleaseOutcome::AlreadyReleased,
        }
    }

    /// Report usage for a key, reclaiming any expired holds first.
    pub fn status(&self, key: &LedgerKey, cap: u32) -> QuotaStatus {
        let handle = self.entry_handle(key);
        let mut entry = handle.lock().expect("ledger entry lock poisoned");
        entry.purge_expired(self.expiry_horizon(self.clock.now()));

        let consumed = entry.consumed_count();
        let reserved = entry.reserved_count();
        QuotaStatus {
            consumed,
            reserved,
            cap,
            remaining: cap.saturating_sub(consumed + reserved),
        }
    }

    /// Reclaim every expired hold across the ledger in one pass.
    pub fn sweep_expired(&self) -> Vec<ExpiredReservation> {
        let handles: Vec<(LedgerKey, Arc<Mutex<LedgerEntry>>)> = {
            let map = self.entries.read().expect("ledger map lock poisoned");
            map.iter()
                .map(|(key, handle)| (key.clone(), Arc::clone(handle)))
                .collect()
        };

        let horizon = self.expiry_horizon(self.clock.now());
        let mut reclaimed = Vec::new();
        for (key, handle) in handles {
            let mut entry = handle.lock().expect("ledger entry lock poisoned");
            for token_id in entry.purge_expired(horizon) {
                reclaimed.push(ExpiredReservation {
                    key: key.clone(),
                    token_id,
                });
            }
        }
        reclaimed
    }

    /// Drop all usage; the placement-cycle reset owned by the deploying
    /// organization.
    pub fn clear(&self) {
        self.entries
            .write()
            .expect("ledger map lock poisoned")
            .clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<(LedgerKey, LedgerEntry)> {
        let handles: Vec<(LedgerKey, Arc<Mutex<LedgerEntry>>)> = {
            let map = self.entries.read().expect("ledger map lock poisoned");
            map.iter()
                .map(|(key, handle)| (key.clone(), Arc::clone(handle)))
                .collect()
        };

        let horizon = self.expiry_horizon(self.clock.now());
        let mut snapshot = Vec::new();
        for (key, handle) in handles {
            let mut entry = handle.lock().expect("ledger entry lock poisoned");
            entry.purge_expired(horizon);
            if !entry.consumed.is_empty() || !entry.reserved.is_empty() {
                snapshot.push((key, entry.clone()));
            }
        }
        snapshot
    }

    pub(crate) fn replace_entries(&self, entries: HashMap<LedgerKey, LedgerEntry>) {
        let mut map = self.entries.write().expect("ledger map lock poisoned");
        *map = entries
            .into_iter()
            .map(|(key, entry)| (key, Arc::new(Mutex::new(entry))))
            .collect();
    }

    fn entry_handle(&self, key: &LedgerKey) -> Arc<Mutex<LedgerEntry>> {
        if let Some(handle) = self
            .entries
            .read()
            .expect("ledger map lock poisoned")
            .get(key)
        {
            return Arc::clone(handle);
        }

        let mut map = self.entries.write().expect("ledger map lock poisoned");
        Arc::clone(map.entry(key.clone()).or_default())
    }

    fn expiry_horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.ttl
    }

    fn next_token_id(&self) -> ReservationTokenId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        ReservationTokenId(format!("hold-{id:06}"))
    }
}

//! Key/value persistence for every repository the engine consumes.
//!
//! Only this module touches storage keys. One `KvStore` serves draws, winners,
//! audit records, prize structures, the blacklist and recharge events, over any
//! `cosmwasm_std::Storage`: a contract's `deps.storage`, or a `Mutex`-guarded
//! `MemoryStorage` shared between threads.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, NaiveDate};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{MemoryStorage, Order, StdError, StdResult, Storage, Timestamp};
use cw_storage_plus::{Bound, Item, Map};
use sweepstakes_common::{
    Actor, AuditRecord, Draw, DrawStatus, PrizeStructure, RechargeEvent, Winner, WinnerStatus,
};

use crate::error::{EngineError, EngineResult};
use crate::repository::{
    AuditSink, BlacklistRepository, CancelSignal, DrawCompletion, DrawRepository, Forfeiture,
    ForfeitureResult, ParticipantEventRepository, PrizeStructureRepository,
};

pub const STORE_STATE: Item<StoreState> = Item::new("store_state");
pub const PRIZE_STRUCTURES: Map<u64, PrizeStructure> = Map::new("prize_structures");
/// Currently listed msisdns.
pub const BLACKLIST: Map<&str, ()> = Map::new("blacklist");
/// change sequence → change; rebuilds the list as it stood at any sequence
pub const BLACKLIST_LOG: Map<u64, BlacklistChange> = Map::new("blacklist_log");
/// (timestamp nanos, ingestion sequence) → event
pub const RECHARGES: Map<(u64, u64), RechargeEvent> = Map::new("recharges");
pub const DRAWS: Map<u64, Draw> = Map::new("draws");
/// (draw date as days from CE, prize structure) → the Pending or Completed draw holding it
pub const DRAW_KEYS: Map<(i32, u64), u64> = Map::new("draw_keys");
pub const WINNERS: Map<u64, Winner> = Map::new("winners");
pub const DRAW_WINNERS: Map<(u64, u64), ()> = Map::new("draw_winners");
pub const AUDIT_LOG: Map<u64, AuditRecord> = Map::new("audit_log");
pub const DRAW_AUDIT: Map<(u64, u64), ()> = Map::new("draw_audit");

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Id sequences.
#[cw_serde]
#[derive(Default)]
pub struct StoreState {
    pub next_draw_id: u64,
    pub next_winner_id: u64,
    pub next_audit_id: u64,
    pub next_event_seq: u64,
    pub next_blacklist_seq: u64,
}

/// One effective add to or removal from the blacklist.
#[cw_serde]
pub struct BlacklistChange {
    pub msisdn: String,
    pub listed: bool,
    pub at: Timestamp,
}

/// How a `KvStore` reaches its `Storage`. A `write` closure runs as one unit:
/// nothing else reads or writes the same storage until it returns.
pub trait StorageAccess {
    fn read<T>(&self, f: impl FnOnce(&dyn Storage) -> EngineResult<T>) -> EngineResult<T>;
    fn write<T>(&self, f: impl FnOnce(&mut dyn Storage) -> EngineResult<T>) -> EngineResult<T>;
}

/// In-process storage shared by concurrent callers.
#[derive(Default)]
pub struct SharedStorage {
    inner: Mutex<MemoryStorage>,
}

impl StorageAccess for SharedStorage {
    fn read<T>(&self, f: impl FnOnce(&dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&*guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }
}

/// Mutable storage borrowed for one contract call.
pub struct StorageRef<'a> {
    inner: RefCell<&'a mut dyn Storage>,
}

impl<'a> StorageRef<'a> {
    pub fn new(storage: &'a mut dyn Storage) -> Self {
        StorageRef {
            inner: RefCell::new(storage),
        }
    }
}

impl StorageAccess for StorageRef<'_> {
    fn read<T>(&self, f: impl FnOnce(&dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        let guard = self.inner.borrow();
        f(&**guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        let mut guard = self.inner.borrow_mut();
        f(&mut **guard)
    }
}

/// Storage available to queries only.
pub struct ReadOnlyStorage<'a> {
    inner: &'a dyn Storage,
}

impl<'a> ReadOnlyStorage<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        ReadOnlyStorage { inner: storage }
    }
}

impl StorageAccess for ReadOnlyStorage<'_> {
    fn read<T>(&self, f: impl FnOnce(&dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        f(self.inner)
    }

    fn write<T>(&self, _f: impl FnOnce(&mut dyn Storage) -> EngineResult<T>) -> EngineResult<T> {
        Err(StdError::generic_err("storage is read-only").into())
    }
}

pub struct KvStore<A> {
    access: A,
}

impl KvStore<SharedStorage> {
    pub fn in_memory() -> Self {
        KvStore::new(SharedStorage::default())
    }
}

impl<A: StorageAccess> KvStore<A> {
    pub fn new(access: A) -> Self {
        KvStore { access }
    }

    fn read<T>(
        &self,
        cancel: &CancelSignal,
        f: impl FnOnce(&dyn Storage) -> EngineResult<T>,
    ) -> EngineResult<T> {
        cancel.check()?;
        self.access.read(f)
    }

    fn write<T>(
        &self,
        cancel: &CancelSignal,
        f: impl FnOnce(&mut dyn Storage) -> EngineResult<T>,
    ) -> EngineResult<T> {
        cancel.check()?;
        self.access.write(f)
    }

    // ── Collaborator side: configuration and ingestion ─────────

    /// Inserts or replaces a prize structure. Callers validate it first.
    pub fn save_prize_structure(
        &self,
        cancel: &CancelSignal,
        structure: &PrizeStructure,
    ) -> EngineResult<()> {
        self.write(cancel, |storage| {
            PRIZE_STRUCTURES.save(storage, structure.id, structure)?;
            Ok(())
        })
    }

    /// Appends recharge events in the given order; returns how many were stored.
    pub fn record_recharges(
        &self,
        cancel: &CancelSignal,
        events: &[RechargeEvent],
    ) -> EngineResult<u64> {
        self.write(cancel, |storage| {
            let mut state = load_state(storage)?;
            for event in events {
                RECHARGES.save(
                    storage,
                    (event.timestamp.nanos(), state.next_event_seq),
                    event,
                )?;
                state.next_event_seq += 1;
            }
            STORE_STATE.save(storage, &state)?;
            Ok(events.len() as u64)
        })
    }

    pub fn update_blacklist(
        &self,
        cancel: &CancelSignal,
        add: &[String],
        remove: &[String],
        at: Timestamp,
    ) -> EngineResult<()> {
        self.write(cancel, |storage| {
            let mut state = load_state(storage)?;
            // Only changes that alter the list are logged.
            for msisdn in remove {
                if BLACKLIST.has(storage, msisdn) {
                    BLACKLIST.remove(storage, msisdn);
                    log_blacklist_change(storage, &mut state, msisdn, false, at)?;
                }
            }
            for msisdn in add {
                if !BLACKLIST.has(storage, msisdn) {
                    BLACKLIST.save(storage, msisdn, &())?;
                    log_blacklist_change(storage, &mut state, msisdn, true, at)?;
                }
            }
            STORE_STATE.save(storage, &state)?;
            Ok(())
        })
    }

    // ── Read side for callers ──────────────────────────────────

    pub fn draw_history(
        &self,
        cancel: &CancelSignal,
        start_after: Option<u64>,
        limit: Option<u32>,
    ) -> EngineResult<Vec<Draw>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT) as usize;
        self.read(cancel, |storage| {
            let draws = DRAWS
                .range(storage, start_after.map(Bound::exclusive), None, Order::Ascending)
                .take(limit)
                .map(|r| r.map(|(_, draw)| draw))
                .collect::<StdResult<Vec<_>>>()?;
            Ok(draws)
        })
    }

    pub fn audit_trail(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Vec<AuditRecord>> {
        self.read(cancel, |storage| {
            let ids = DRAW_AUDIT
                .prefix(draw_id)
                .keys(storage, None, None, Order::Ascending)
                .collect::<StdResult<Vec<u64>>>()?;
            let records = ids
                .into_iter()
                .map(|id| AUDIT_LOG.load(storage, id))
                .collect::<StdResult<Vec<_>>>()?;
            Ok(records)
        })
    }
}

fn load_state(storage: &dyn Storage) -> StdResult<StoreState> {
    Ok(STORE_STATE.may_load(storage)?.unwrap_or_default())
}

fn draw_key(date: NaiveDate, prize_structure_id: u64) -> (i32, u64) {
    (date.num_days_from_ce(), prize_structure_id)
}

fn append_audit(
    storage: &mut dyn Storage,
    state: &mut StoreState,
    mut record: AuditRecord,
) -> StdResult<AuditRecord> {
    record.id = state.next_audit_id;
    state.next_audit_id += 1;
    AUDIT_LOG.save(storage, record.id, &record)?;
    DRAW_AUDIT.save(storage, (record.draw_id, record.id), &())?;
    Ok(record)
}

fn log_blacklist_change(
    storage: &mut dyn Storage,
    state: &mut StoreState,
    msisdn: &str,
    listed: bool,
    at: Timestamp,
) -> StdResult<()> {
    let change = BlacklistChange {
        msisdn: msisdn.to_string(),
        listed,
        at,
    };
    BLACKLIST_LOG.save(storage, state.next_blacklist_seq, &change)?;
    state.next_blacklist_seq += 1;
    Ok(())
}

fn load_pending_draw(storage: &dyn Storage, draw_id: u64) -> EngineResult<Draw> {
    let draw = DRAWS
        .may_load(storage, draw_id)?
        .ok_or(EngineError::DrawNotFound { draw_id })?;
    if draw.status != DrawStatus::Pending {
        return Err(EngineError::ConcurrentModification {
            reason: format!("draw {draw_id} is {}, not pending", draw.status),
        });
    }
    Ok(draw)
}

fn load_winner(storage: &dyn Storage, winner_id: u64) -> EngineResult<Winner> {
    WINNERS
        .may_load(storage, winner_id)?
        .ok_or(EngineError::WinnerNotFound { winner_id })
}

/// A primary winner still awaiting notification.
fn check_open_primary(winner: &Winner, to: WinnerStatus) -> EngineResult<()> {
    match winner.status {
        WinnerStatus::Forfeited if to == WinnerStatus::Forfeited => {
            return Err(EngineError::AlreadyForfeited {
                winner_id: winner.id,
            })
        }
        WinnerStatus::PendingNotification => {}
        from => {
            return Err(EngineError::InvalidWinnerTransition {
                winner_id: winner.id,
                from,
                to,
            })
        }
    }
    if winner.is_runner_up {
        return Err(EngineError::NotPrimaryWinner {
            winner_id: winner.id,
        });
    }
    Ok(())
}

fn tier_winners(
    storage: &dyn Storage,
    draw_id: u64,
    prize_tier_id: u64,
) -> StdResult<Vec<Winner>> {
    let ids = DRAW_WINNERS
        .prefix(draw_id)
        .keys(storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<u64>>>()?;
    let mut winners = Vec::new();
    for id in ids {
        let winner = WINNERS.load(storage, id)?;
        if winner.prize_tier_id == prize_tier_id {
            winners.push(winner);
        }
    }
    Ok(winners)
}

impl<A: StorageAccess> ParticipantEventRepository for KvStore<A> {
    fn fetch_eligible_events(
        &self,
        cancel: &CancelSignal,
        start: Timestamp,
        end: Timestamp,
        before_seq: u64,
    ) -> EngineResult<Vec<RechargeEvent>> {
        self.read(cancel, |storage| {
            let mut events = Vec::new();
            for item in RECHARGES.range(
                storage,
                Some(Bound::inclusive((start.nanos(), 0u64))),
                Some(Bound::exclusive((end.nanos(), 0u64))),
                Order::Ascending,
            ) {
                let ((_, seq), event) = item?;
                if seq < before_seq {
                    events.push(event);
                }
            }
            Ok(events)
        })
    }

    fn event_log_len(&self, cancel: &CancelSignal) -> EngineResult<u64> {
        self.read(cancel, |storage| Ok(load_state(storage)?.next_event_seq))
    }
}

impl<A: StorageAccess> BlacklistRepository for KvStore<A> {
    fn list_blacklisted(
        &self,
        cancel: &CancelSignal,
        before_seq: u64,
    ) -> EngineResult<BTreeSet<String>> {
        self.read(cancel, |storage| {
            if before_seq >= load_state(storage)?.next_blacklist_seq {
                let msisdns = BLACKLIST
                    .keys(storage, None, None, Order::Ascending)
                    .collect::<StdResult<BTreeSet<String>>>()?;
                return Ok(msisdns);
            }

            let mut listed = BTreeSet::new();
            for item in BLACKLIST_LOG.range(
                storage,
                None,
                Some(Bound::exclusive(before_seq)),
                Order::Ascending,
            ) {
                let (_, change) = item?;
                if change.listed {
                    listed.insert(change.msisdn);
                } else {
                    listed.remove(&change.msisdn);
                }
            }
            Ok(listed)
        })
    }

    fn blacklist_log_len(&self, cancel: &CancelSignal) -> EngineResult<u64> {
        self.read(cancel, |storage| Ok(load_state(storage)?.next_blacklist_seq))
    }
}

impl<A: StorageAccess> PrizeStructureRepository for KvStore<A> {
    fn prize_structure(
        &self,
        cancel: &CancelSignal,
        prize_structure_id: u64,
    ) -> EngineResult<Option<PrizeStructure>> {
        self.read(cancel, |storage| {
            Ok(PRIZE_STRUCTURES.may_load(storage, prize_structure_id)?)
        })
    }
}

impl<A: StorageAccess> AuditSink for KvStore<A> {
    fn record(&self, cancel: &CancelSignal, record: AuditRecord) -> EngineResult<AuditRecord> {
        self.write(cancel, |storage| {
            let mut state = load_state(storage)?;
            let record = append_audit(storage, &mut state, record)?;
            STORE_STATE.save(storage, &state)?;
            Ok(record)
        })
    }
}

impl<A: StorageAccess> DrawRepository for KvStore<A> {
    fn reserve_draw(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
        executed_by: &Actor,
        now: Timestamp,
    ) -> EngineResult<Draw> {
        self.write(cancel, |storage| {
            let key = draw_key(date, prize_structure_id);
            if let Some(existing_id) = DRAW_KEYS.may_load(storage, key)? {
                let existing = DRAWS.load(storage, existing_id)?;
                return Err(EngineError::DuplicateDraw {
                    date,
                    prize_structure_id,
                    existing_draw_id: existing.id,
                    existing_status: existing.status,
                });
            }

            let mut state = load_state(storage)?;
            let draw = Draw {
                id: state.next_draw_id,
                draw_date: date,
                prize_structure_id,
                status: DrawStatus::Pending,
                executed_by: executed_by.to_string(),
                created_at: now,
                completed_at: None,
                failure_reason: None,
                seed_token: None,
                pool_root: None,
                total_participants: 0,
                total_weight: 0,
                basis: None,
            };
            state.next_draw_id += 1;

            DRAWS.save(storage, draw.id, &draw)?;
            DRAW_KEYS.save(storage, key, &draw.id)?;
            STORE_STATE.save(storage, &state)?;
            Ok(draw)
        })
    }

    fn fail_draw(&self, cancel: &CancelSignal, draw_id: u64, reason: &str) -> EngineResult<Draw> {
        self.write(cancel, |storage| {
            let mut draw = load_pending_draw(storage, draw_id)?;
            let key = draw_key(draw.draw_date, draw.prize_structure_id);
            if DRAW_KEYS.may_load(storage, key)? == Some(draw_id) {
                DRAW_KEYS.remove(storage, key);
            }

            draw.status = DrawStatus::Failed;
            draw.failure_reason = Some(reason.to_string());
            DRAWS.save(storage, draw_id, &draw)?;
            Ok(draw)
        })
    }

    fn complete_draw(
        &self,
        cancel: &CancelSignal,
        completion: DrawCompletion,
    ) -> EngineResult<(Draw, Vec<Winner>, AuditRecord)> {
        self.write(cancel, |storage| {
            let mut draw = load_pending_draw(storage, completion.draw_id)?;
            let key = draw_key(draw.draw_date, draw.prize_structure_id);
            if DRAW_KEYS.may_load(storage, key)? != Some(draw.id) {
                return Err(EngineError::ConcurrentModification {
                    reason: format!("draw {} no longer holds its date", draw.id),
                });
            }
            let mut state = load_state(storage)?;

            let mut winners = Vec::with_capacity(completion.winners.len());
            for new_winner in completion.winners {
                let winner = Winner {
                    id: state.next_winner_id,
                    draw_id: draw.id,
                    msisdn: new_winner.msisdn,
                    prize_tier_id: new_winner.prize_tier_id,
                    status: WinnerStatus::PendingNotification,
                    is_runner_up: new_winner.runner_up_rank > 0,
                    runner_up_rank: new_winner.runner_up_rank,
                    selection_rank: new_winner.runner_up_rank,
                    forfeit_reason: None,
                    created_at: completion.completed_at,
                    updated_at: completion.completed_at,
                };
                state.next_winner_id += 1;
                WINNERS.save(storage, winner.id, &winner)?;
                DRAW_WINNERS.save(storage, (draw.id, winner.id), &())?;
                winners.push(winner);
            }

            draw.status = DrawStatus::Completed;
            draw.completed_at = Some(completion.completed_at);
            draw.seed_token = Some(completion.seed_token);
            draw.pool_root = Some(completion.pool_root);
            draw.total_participants = completion.total_participants;
            draw.total_weight = completion.total_weight;
            draw.basis = Some(completion.basis);
            DRAWS.save(storage, draw.id, &draw)?;

            let audit = append_audit(storage, &mut state, completion.audit)?;
            STORE_STATE.save(storage, &state)?;
            Ok((draw, winners, audit))
        })
    }

    fn draw(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Option<Draw>> {
        self.read(cancel, |storage| Ok(DRAWS.may_load(storage, draw_id)?))
    }

    fn draw_for_date(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
    ) -> EngineResult<Option<Draw>> {
        self.read(cancel, |storage| {
            match DRAW_KEYS.may_load(storage, draw_key(date, prize_structure_id))? {
                Some(draw_id) => Ok(DRAWS.may_load(storage, draw_id)?),
                None => Ok(None),
            }
        })
    }

    fn winner(&self, cancel: &CancelSignal, winner_id: u64) -> EngineResult<Option<Winner>> {
        self.read(cancel, |storage| Ok(WINNERS.may_load(storage, winner_id)?))
    }

    fn winners_for_draw(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Vec<Winner>> {
        self.read(cancel, |storage| {
            let ids = DRAW_WINNERS
                .prefix(draw_id)
                .keys(storage, None, None, Order::Ascending)
                .collect::<StdResult<Vec<u64>>>()?;
            let winners = ids
                .into_iter()
                .map(|id| WINNERS.load(storage, id))
                .collect::<StdResult<Vec<_>>>()?;
            Ok(winners)
        })
    }

    fn apply_forfeiture(
        &self,
        cancel: &CancelSignal,
        forfeiture: Forfeiture,
    ) -> EngineResult<ForfeitureResult> {
        self.write(cancel, |storage| {
            let mut forfeited = load_winner(storage, forfeiture.winner_id)?;
            check_open_primary(&forfeited, WinnerStatus::Forfeited)?;

            let siblings = tier_winners(storage, forfeited.draw_id, forfeited.prize_tier_id)?;
            let mut promoted = match forfeiture.promote_winner_id {
                Some(promote_id) => {
                    let candidate = siblings
                        .iter()
                        .find(|w| w.id == promote_id)
                        .filter(|w| w.is_runner_up && w.status == WinnerStatus::PendingNotification)
                        .cloned()
                        .ok_or_else(|| EngineError::ConcurrentModification {
                            reason: format!("runner-up {promote_id} is no longer available"),
                        })?;
                    Some(candidate)
                }
                None => None,
            };
            let mut state = load_state(storage)?;

            forfeited.status = WinnerStatus::Forfeited;
            forfeited.forfeit_reason = Some(forfeiture.reason.clone());
            forfeited.updated_at = forfeiture.at;
            WINNERS.save(storage, forfeited.id, &forfeited)?;

            if let Some(winner) = promoted.as_mut() {
                winner.is_runner_up = false;
                winner.runner_up_rank = 0;
                winner.updated_at = forfeiture.at;
                WINNERS.save(storage, winner.id, winner)?;

                // Close the gap left in the backup order.
                let mut remaining: Vec<Winner> = siblings
                    .into_iter()
                    .filter(|w| w.is_runner_up && w.id != winner.id)
                    .collect();
                remaining.sort_by_key(|w| w.runner_up_rank);
                for (position, mut runner_up) in remaining.into_iter().enumerate() {
                    let rank = position as u32 + 1;
                    if runner_up.runner_up_rank != rank {
                        runner_up.runner_up_rank = rank;
                        runner_up.updated_at = forfeiture.at;
                        WINNERS.save(storage, runner_up.id, &runner_up)?;
                    }
                }
            }

            let audit = append_audit(storage, &mut state, forfeiture.audit)?;
            STORE_STATE.save(storage, &state)?;
            Ok(ForfeitureResult {
                forfeited,
                promoted,
                audit,
            })
        })
    }

    fn mark_paid(
        &self,
        cancel: &CancelSignal,
        winner_id: u64,
        audit: AuditRecord,
        at: Timestamp,
    ) -> EngineResult<(Winner, AuditRecord)> {
        self.write(cancel, |storage| {
            let mut winner = load_winner(storage, winner_id)?;
            check_open_primary(&winner, WinnerStatus::Paid)?;
            let mut state = load_state(storage)?;

            winner.status = WinnerStatus::Paid;
            winner.updated_at = at;
            WINNERS.save(storage, winner.id, &winner)?;

            let audit = append_audit(storage, &mut state, audit)?;
            STORE_STATE.save(storage, &state)?;
            Ok((winner, audit))
        })
    }
}

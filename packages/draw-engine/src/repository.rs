use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use cosmwasm_std::Timestamp;
use sweepstakes_common::{
    Actor, AuditRecord, Draw, DrawBasis, PrizeStructure, RechargeEvent, Winner,
};

use crate::error::{EngineError, EngineResult};

/// Caller-owned cancellation flag checked before every storage call.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Option<Arc<AtomicBool>>,
}

impl CancelSignal {
    /// A signal that can never fire.
    pub fn never() -> Self {
        CancelSignal { flag: None }
    }

    pub fn new() -> Self {
        CancelSignal {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// Who is calling, when, and how the call can be aborted.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub actor: Actor,
    pub now: Timestamp,
    pub cancel: CancelSignal,
}

impl CallContext {
    pub fn new(actor: Actor, now: Timestamp) -> Self {
        CallContext {
            actor,
            now,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Append-only recharge log. Every event gets the next ingestion sequence.
pub trait ParticipantEventRepository {
    /// Events with `start <= timestamp < end` and an ingestion sequence below
    /// `before_seq`, in timestamp then ingestion order.
    fn fetch_eligible_events(
        &self,
        cancel: &CancelSignal,
        start: Timestamp,
        end: Timestamp,
        before_seq: u64,
    ) -> EngineResult<Vec<RechargeEvent>>;

    /// Sequence the next ingested event will get.
    fn event_log_len(&self, cancel: &CancelSignal) -> EngineResult<u64>;
}

/// Blacklist with its change history, so past states can be rebuilt.
pub trait BlacklistRepository {
    /// Msisdns listed after applying the changes with a sequence below `before_seq`.
    fn list_blacklisted(
        &self,
        cancel: &CancelSignal,
        before_seq: u64,
    ) -> EngineResult<BTreeSet<String>>;

    /// Sequence the next blacklist change will get.
    fn blacklist_log_len(&self, cancel: &CancelSignal) -> EngineResult<u64>;
}

pub trait PrizeStructureRepository {
    fn prize_structure(
        &self,
        cancel: &CancelSignal,
        prize_structure_id: u64,
    ) -> EngineResult<Option<PrizeStructure>>;
}

pub trait AuditSink {
    /// Appends the record and returns it with its assigned id.
    fn record(&self, cancel: &CancelSignal, record: AuditRecord) -> EngineResult<AuditRecord>;
}

/// A winner row before the store has assigned its id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewWinner {
    pub msisdn: String,
    pub prize_tier_id: u64,
    pub runner_up_rank: u32,
}

/// Everything written when a reserved draw completes.
#[derive(Clone, Debug)]
pub struct DrawCompletion {
    pub draw_id: u64,
    pub seed_token: String,
    pub pool_root: String,
    pub total_participants: u64,
    pub total_weight: u64,
    pub basis: DrawBasis,
    pub winners: Vec<NewWinner>,
    pub audit: AuditRecord,
    pub completed_at: Timestamp,
}

/// A forfeiture, with the runner-up to promote if one is left.
///
/// Applying it re-checks both rows so a racing promotion cannot slip in between
/// the caller's read and the write.
#[derive(Clone, Debug)]
pub struct Forfeiture {
    pub winner_id: u64,
    pub reason: String,
    pub promote_winner_id: Option<u64>,
    pub audit: AuditRecord,
    pub at: Timestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForfeitureResult {
    pub forfeited: Winner,
    pub promoted: Option<Winner>,
    pub audit: AuditRecord,
}

/// Transactional Draw/Winner persistence.
///
/// Each method is one atomic unit: its preconditions are checked before any write.
pub trait DrawRepository {
    /// Conditionally inserts a Pending draw for `(date, prize_structure_id)`.
    /// Fails with `DuplicateDraw` if a Pending or Completed draw holds the key.
    fn reserve_draw(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
        executed_by: &Actor,
        now: Timestamp,
    ) -> EngineResult<Draw>;

    /// Pending → Failed; releases the `(date, prize_structure_id)` key.
    fn fail_draw(&self, cancel: &CancelSignal, draw_id: u64, reason: &str) -> EngineResult<Draw>;

    /// Pending → Completed together with all winner rows and the audit record.
    fn complete_draw(
        &self,
        cancel: &CancelSignal,
        completion: DrawCompletion,
    ) -> EngineResult<(Draw, Vec<Winner>, AuditRecord)>;

    fn draw(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Option<Draw>>;

    /// The Pending or Completed draw holding `(date, prize_structure_id)`, if any.
    fn draw_for_date(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
    ) -> EngineResult<Option<Draw>>;

    fn winner(&self, cancel: &CancelSignal, winner_id: u64) -> EngineResult<Option<Winner>>;

    /// Winner rows of a draw ordered by id.
    fn winners_for_draw(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Vec<Winner>>;

    fn apply_forfeiture(
        &self,
        cancel: &CancelSignal,
        forfeiture: Forfeiture,
    ) -> EngineResult<ForfeitureResult>;

    /// PendingNotification → Paid for a primary winner, with its audit record.
    fn mark_paid(
        &self,
        cancel: &CancelSignal,
        winner_id: u64,
        audit: AuditRecord,
        at: Timestamp,
    ) -> EngineResult<(Winner, AuditRecord)>;
}

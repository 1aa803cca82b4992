use std::collections::BTreeMap;

use chrono::NaiveDate;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Timestamp;
use sweepstakes_common::calendar::{day_code, day_window};
use sweepstakes_common::{
    normalize_msisdn, DrawBasis, EligibilityPool, LogPosition, ParticipantEntry, PrizeStructure,
};

use crate::error::{EngineError, EngineResult};
use crate::repository::{BlacklistRepository, CancelSignal, ParticipantEventRepository};

/// Recharge amount (minor units) that buys one entry.
pub const DEFAULT_AMOUNT_PER_ENTRY: u64 = 100;

#[cw_serde]
pub struct EligibilityRules {
    pub amount_per_entry: u64,
    /// Zone the draw calendar runs in, minutes ahead of UTC.
    pub utc_offset_minutes: i32,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        EligibilityRules {
            amount_per_entry: DEFAULT_AMOUNT_PER_ENTRY,
            utc_offset_minutes: 0,
        }
    }
}

impl From<&DrawBasis> for EligibilityRules {
    fn from(basis: &DrawBasis) -> Self {
        EligibilityRules {
            amount_per_entry: basis.amount_per_entry,
            utc_offset_minutes: basis.utc_offset_minutes,
        }
    }
}

impl EligibilityRules {
    /// `[start, end)` of the calendar day `date` in the configured zone.
    pub fn day_bounds(&self, date: NaiveDate) -> EngineResult<(Timestamp, Timestamp)> {
        day_window(date, self.utc_offset_minutes).ok_or_else(|| EngineError::InvalidDate {
            date,
            reason: "day starts before the Unix epoch".to_string(),
        })
    }
}

/// floor(total / amount_per_entry); 0 for non-positive totals.
pub fn weight_for_amount(total: i128, amount_per_entry: u64) -> u64 {
    if total <= 0 || amount_per_entry == 0 {
        return 0;
    }
    u64::try_from(total / i128::from(amount_per_entry)).unwrap_or(u64::MAX)
}

#[cw_serde]
pub struct EligibilityStats {
    pub total_eligible_participants: u64,
    pub total_weighted_entries: u64,
}

/// Validity window, then weekday.
pub fn check_applicability(date: NaiveDate, structure: &PrizeStructure) -> EngineResult<()> {
    if !structure.covers(date) {
        return Err(EngineError::OutOfValidityWindow {
            date,
            prize_structure_id: structure.id,
            valid_from: structure.valid_from,
            valid_to: structure.valid_to,
        });
    }
    let weekday = day_code(date);
    if !structure.applies_on(weekday) {
        return Err(EngineError::NotApplicableDay {
            date,
            prize_structure_id: structure.id,
            weekday,
        });
    }
    Ok(())
}

/// Builds the weighted participant pool for one draw date.
///
/// Read-only: the same rules and [`LogPosition`] always give the same pool, with
/// entries ordered by msisdn, however much is appended later.
pub struct EligibilityAggregator<'a> {
    events: &'a dyn ParticipantEventRepository,
    blacklist: &'a dyn BlacklistRepository,
    rules: EligibilityRules,
}

impl<'a> EligibilityAggregator<'a> {
    pub fn new(
        events: &'a dyn ParticipantEventRepository,
        blacklist: &'a dyn BlacklistRepository,
        rules: EligibilityRules,
    ) -> Self {
        EligibilityAggregator {
            events,
            blacklist,
            rules,
        }
    }

    /// Current ends of the recharge log and the blacklist history.
    pub fn position(&self, cancel: &CancelSignal) -> EngineResult<LogPosition> {
        Ok(LogPosition {
            recharge_seq: self.events.event_log_len(cancel)?,
            blacklist_seq: self.blacklist.blacklist_log_len(cancel)?,
        })
    }

    pub fn build_pool(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        structure: &PrizeStructure,
        at: LogPosition,
    ) -> EngineResult<EligibilityPool> {
        check_applicability(date, structure)?;
        let pool = self.aggregate(cancel, date, structure.id, at)?;
        if pool.is_empty() {
            return Err(EngineError::NoEligibleParticipants { date });
        }
        Ok(pool)
    }

    /// Same filters as `build_pool`, but an empty pool is reported as zeros.
    pub fn stats(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        structure: &PrizeStructure,
    ) -> EngineResult<EligibilityStats> {
        check_applicability(date, structure)?;
        let at = self.position(cancel)?;
        let pool = self.aggregate(cancel, date, structure.id, at)?;
        Ok(EligibilityStats {
            total_eligible_participants: pool.len() as u64,
            total_weighted_entries: pool.total_weight,
        })
    }

    /// The pool for `date` as of `at`, without the applicability checks,
    /// possibly empty. Replays a draw whose prize structure has since changed.
    pub fn aggregate(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
        at: LogPosition,
    ) -> EngineResult<EligibilityPool> {
        let (start, end) = self.rules.day_bounds(date)?;
        let blacklisted = self.blacklist.list_blacklisted(cancel, at.blacklist_seq)?;
        let events = self
            .events
            .fetch_eligible_events(cancel, start, end, at.recharge_seq)?;

        let mut totals: BTreeMap<String, i128> = BTreeMap::new();
        for event in events {
            let Some(msisdn) = normalize_msisdn(&event.msisdn) else {
                continue;
            };
            if blacklisted.contains(&msisdn) {
                continue;
            }
            *totals.entry(msisdn).or_insert(0) += i128::from(event.amount);
        }

        let mut entries = Vec::with_capacity(totals.len());
        let mut total_weight = 0u64;
        for (msisdn, amount) in totals {
            let weight = weight_for_amount(amount, self.rules.amount_per_entry);
            if weight == 0 {
                continue;
            }
            total_weight = total_weight
                .checked_add(weight)
                .ok_or_else(|| EngineError::WeightOverflow {
                    msisdn: msisdn.clone(),
                })?;
            entries.push(ParticipantEntry { msisdn, weight });
        }

        Ok(EligibilityPool {
            draw_date: date,
            prize_structure_id,
            entries,
            total_weight,
        })
    }
}

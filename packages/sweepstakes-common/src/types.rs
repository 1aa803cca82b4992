use std::fmt;

use chrono::NaiveDate;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Timestamp;

use crate::merkle::{merkle_root, pool_leaves};

/// Weekday codes a prize structure can be drawn on.
#[cw_serde]
#[derive(Copy, Eq, Hash, PartialOrd, Ord)]
pub enum DayCode {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<chrono::Weekday> for DayCode {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => DayCode::Monday,
            chrono::Weekday::Tue => DayCode::Tuesday,
            chrono::Weekday::Wed => DayCode::Wednesday,
            chrono::Weekday::Thu => DayCode::Thursday,
            chrono::Weekday::Fri => DayCode::Friday,
            chrono::Weekday::Sat => DayCode::Saturday,
            chrono::Weekday::Sun => DayCode::Sunday,
        }
    }
}

impl fmt::Display for DayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DayCode::Monday => "monday",
            DayCode::Tuesday => "tuesday",
            DayCode::Wednesday => "wednesday",
            DayCode::Thursday => "thursday",
            DayCode::Friday => "friday",
            DayCode::Saturday => "saturday",
            DayCode::Sunday => "sunday",
        };
        f.write_str(s)
    }
}

/// The lifecycle status of a draw.
#[cw_serde]
#[derive(Copy, Eq)]
pub enum DrawStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawStatus::Pending => "pending",
            DrawStatus::Completed => "completed",
            DrawStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Payout status of a winner row. `Paid` and `Forfeited` are terminal.
#[cw_serde]
#[derive(Copy, Eq)]
pub enum WinnerStatus {
    PendingNotification,
    Paid,
    Forfeited,
}

impl fmt::Display for WinnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WinnerStatus::PendingNotification => "pending_notification",
            WinnerStatus::Paid => "paid",
            WinnerStatus::Forfeited => "forfeited",
        };
        f.write_str(s)
    }
}

/// The authenticated caller of a state-changing operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Actor {
    id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Actor { id: id.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A single recharge transaction as recorded by the ingestion side.
/// `amount` is in minor currency units; reversals are negative.
#[cw_serde]
pub struct RechargeEvent {
    pub msisdn: String,
    pub amount: i64,
    pub timestamp: Timestamp,
}

#[cw_serde]
#[derive(Eq)]
pub struct ParticipantEntry {
    pub msisdn: String,
    pub weight: u64,
}

/// Weighted participants for one draw date, ordered by msisdn.
#[cw_serde]
pub struct EligibilityPool {
    pub draw_date: NaiveDate,
    pub prize_structure_id: u64,
    pub entries: Vec<ParticipantEntry>,
    pub total_weight: u64,
}

impl EligibilityPool {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hex-encoded Merkle root over the entries' cumulative weight ranges.
    pub fn commitment(&self) -> String {
        hex::encode(merkle_root(&pool_leaves(&self.entries)))
    }
}

#[cw_serde]
pub struct PrizeTier {
    pub id: u64,
    pub name: String,
    /// Primary winners to select.
    pub quantity: u32,
    pub number_of_runner_ups: u32,
    /// Draw order within the structure, ascending.
    pub rank: u32,
}

impl PrizeTier {
    pub fn picks_required(&self) -> u64 {
        u64::from(self.quantity) + u64::from(self.number_of_runner_ups)
    }
}

#[cw_serde]
pub struct PrizeStructure {
    pub id: u64,
    pub name: String,
    pub valid_from: NaiveDate,
    /// `None` means open-ended.
    pub valid_to: Option<NaiveDate>,
    pub applicable_days: Vec<DayCode>,
    pub tiers: Vec<PrizeTier>,
}

impl PrizeStructure {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_to.map_or(true, |to| date <= to)
    }

    pub fn applies_on(&self, day: DayCode) -> bool {
        self.applicable_days.contains(&day)
    }

    pub fn tier(&self, tier_id: u64) -> Option<&PrizeTier> {
        self.tiers.iter().find(|t| t.id == tier_id)
    }
}

/// How far the recharge log and the blacklist history had been written.
/// Anything appended at or past a position is invisible to a pool built there.
#[cw_serde]
#[derive(Copy, Default, Eq)]
pub struct LogPosition {
    /// Recharge events with a lower ingestion sequence are included.
    pub recharge_seq: u64,
    /// Blacklist changes with a lower sequence are applied.
    pub blacklist_seq: u64,
}

/// What a completed draw's pool and selection were computed from.
#[cw_serde]
pub struct DrawBasis {
    pub amount_per_entry: u64,
    pub utc_offset_minutes: i32,
    /// Tiers as drawn, whatever the prize structure holds today.
    pub tiers: Vec<PrizeTier>,
    pub position: LogPosition,
}

#[cw_serde]
pub struct Draw {
    pub id: u64,
    pub draw_date: NaiveDate,
    pub prize_structure_id: u64,
    pub status: DrawStatus,
    pub executed_by: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub failure_reason: Option<String>,
    /// Hex seed the selection was run with; replays the draw exactly.
    pub seed_token: Option<String>,
    /// Merkle root of the eligibility pool the draw was run against.
    pub pool_root: Option<String>,
    pub total_participants: u64,
    pub total_weight: u64,
    /// Set on completion.
    pub basis: Option<DrawBasis>,
}

#[cw_serde]
pub struct Winner {
    pub id: u64,
    pub draw_id: u64,
    pub msisdn: String,
    pub prize_tier_id: u64,
    pub status: WinnerStatus,
    pub is_runner_up: bool,
    /// 0 for a primary winner, 1..N for the backup order.
    pub runner_up_rank: u32,
    /// Rank assigned at selection time; never changes after promotion.
    pub selection_rank: u32,
    pub forfeit_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Per-tier summary recorded with a completed draw.
#[cw_serde]
pub struct TierOutcome {
    pub prize_tier_id: u64,
    pub quantity: u32,
    pub winners_selected: u32,
    pub runner_ups_requested: u32,
    pub runner_ups_selected: u32,
}

#[cw_serde]
pub enum AuditAction {
    DrawCompleted {
        seed_token: String,
        pool_root: String,
        total_participants: u64,
        total_weight: u64,
        tiers: Vec<TierOutcome>,
        basis: DrawBasis,
    },
    DrawFailed {
        reason: String,
    },
    RunnerUpInvoked {
        prize_tier_id: u64,
        forfeited_winner_id: u64,
        forfeited_msisdn: String,
        promoted_winner_id: Option<u64>,
        promoted_msisdn: Option<String>,
        reason: String,
    },
    WinnerPaid {
        winner_id: u64,
        msisdn: String,
    },
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::DrawCompleted { .. } => "draw_completed",
            AuditAction::DrawFailed { .. } => "draw_failed",
            AuditAction::RunnerUpInvoked { .. } => "runner_up_invoked",
            AuditAction::WinnerPaid { .. } => "winner_paid",
        }
    }
}

/// Append-only audit trail entry. `id` is assigned by the store.
#[cw_serde]
pub struct AuditRecord {
    pub id: u64,
    pub draw_id: u64,
    pub action: AuditAction,
    pub actor: String,
    pub timestamp: Timestamp,
    pub summary: String,
}

/// Trim surrounding whitespace and a leading `+`; the rest must be ASCII digits.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn structure(valid_to: Option<NaiveDate>) -> PrizeStructure {
        PrizeStructure {
            id: 1,
            name: "daily".to_string(),
            valid_from: date(2024, 3, 1),
            valid_to,
            applicable_days: vec![DayCode::Monday, DayCode::Friday],
            tiers: vec![
                PrizeTier {
                    id: 20,
                    name: "consolation".to_string(),
                    quantity: 5,
                    number_of_runner_ups: 0,
                    rank: 2,
                },
                PrizeTier {
                    id: 10,
                    name: "jackpot".to_string(),
                    quantity: 1,
                    number_of_runner_ups: 2,
                    rank: 1,
                },
            ],
        }
    }

    #[test]
    fn test_validity_window_bounds_are_inclusive() {
        let bounded = structure(Some(date(2024, 3, 31)));
        assert!(!bounded.covers(date(2024, 2, 29)));
        assert!(bounded.covers(date(2024, 3, 1)));
        assert!(bounded.covers(date(2024, 3, 31)));
        assert!(!bounded.covers(date(2024, 4, 1)));

        let open = structure(None);
        assert!(open.covers(date(2030, 1, 1)));
    }

    #[test]
    fn test_tier_lookup() {
        let s = structure(None);
        assert_eq!(s.tier(10).unwrap().picks_required(), 3);
        assert_eq!(s.tier(20).unwrap().name, "consolation");
        assert!(s.tier(30).is_none());
    }

    #[test]
    fn test_normalize_msisdn() {
        assert_eq!(normalize_msisdn(" +2348030000001 "), Some("2348030000001".to_string()));
        assert_eq!(normalize_msisdn("08030000001"), Some("08030000001".to_string()));
        assert_eq!(normalize_msisdn("+"), None);
        assert_eq!(normalize_msisdn("0803-000"), None);
        assert_eq!(normalize_msisdn(""), None);
    }

    #[test]
    fn test_day_code_serializes_snake_case() {
        let json = serde_json::to_string(&DayCode::Wednesday).unwrap();
        assert_eq!(json, "\"wednesday\"");
        assert_eq!(DayCode::from(chrono::Weekday::Sun), DayCode::Sunday);
    }
}

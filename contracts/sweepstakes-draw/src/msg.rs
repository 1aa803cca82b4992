use chrono::NaiveDate;
use cosmwasm_schema::{cw_serde, QueryResponses};
use sweepstakes_common::{AuditRecord, Draw, PrizeStructure, RechargeEvent, Winner};
use sweepstakes_draw_engine::{DrawVerification, EligibilityStats, EntryProof};

use crate::state::Config;

#[cw_serde]
pub struct InstantiateMsg {
    pub operators: Vec<String>,
    /// Defaults to 100
    pub amount_per_entry: Option<u64>,
    /// Defaults to 0 (UTC)
    pub utc_offset_minutes: Option<i32>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Run the draw for one calendar date under a prize structure. Admin only.
    ExecuteDraw {
        draw_date: NaiveDate,
        prize_structure_id: u64,
        /// Extra hex-encoded entropy mixed into the selection seed.
        entropy_hex: Option<String>,
    },
    /// Forfeit a primary winner and promote the next runner-up.
    /// Admin or operator.
    InvokeRunnerUp { winner_id: u64, reason: String },
    /// Record that a primary winner was paid. Admin only.
    MarkWinnerPaid { winner_id: u64 },
    /// Append recharge events. Operator only.
    RecordRecharges { events: Vec<RechargeEvent> },
    /// Admin only.
    UpdateBlacklist {
        add: Vec<String>,
        remove: Vec<String>,
    },
    /// Create or replace a prize structure. Admin only.
    SetPrizeStructure { structure: PrizeStructure },
    /// Admin only.
    UpdateConfig {
        admin: Option<String>,
        amount_per_entry: Option<u64>,
        utc_offset_minutes: Option<i32>,
    },
    /// Admin only.
    UpdateOperators {
        add: Vec<String>,
        remove: Vec<String>,
    },
}

#[cw_serde]
pub struct MigrateMsg {}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    #[returns(Config)]
    Config {},

    #[returns(EligibilityStats)]
    EligibilityStats {
        draw_date: NaiveDate,
        prize_structure_id: u64,
    },

    #[returns(DrawResponse)]
    Draw { draw_id: u64 },

    /// The Pending or Completed draw holding the date, if any.
    #[returns(Option<DrawResponse>)]
    DrawByDate {
        draw_date: NaiveDate,
        prize_structure_id: u64,
    },

    #[returns(DrawHistoryResponse)]
    DrawHistory {
        start_after: Option<u64>,
        limit: Option<u32>,
    },

    #[returns(Option<Winner>)]
    Winner { winner_id: u64 },

    #[returns(Vec<AuditRecord>)]
    AuditTrail { draw_id: u64 },

    #[returns(Option<PrizeStructure>)]
    PrizeStructure { prize_structure_id: u64 },

    /// Replay a completed draw against the current event log.
    #[returns(DrawVerification)]
    VerifyDraw { draw_id: u64 },

    /// Merkle inclusion proof of an msisdn in a completed draw's pool.
    #[returns(EntryProof)]
    ProveEntry { draw_id: u64, msisdn: String },
}

#[cw_serde]
pub struct DrawResponse {
    pub draw: Draw,
    pub winners: Vec<Winner>,
}

#[cw_serde]
pub struct DrawHistoryResponse {
    pub draws: Vec<Draw>,
}

use chrono::NaiveDate;
use cosmwasm_std::StdError;
use sweepstakes_common::{DayCode, DrawStatus, WinnerStatus};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse grouping of engine failures, for callers deciding how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was mutated.
    Configuration,
    /// The draw was rejected as a whole; any reservation is marked Failed.
    Eligibility,
    /// Another caller got there first.
    Concurrency,
    /// Local to a single winner or tier.
    Forfeiture,
    /// Fatal for the current call.
    Storage,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("prize structure {prize_structure_id} not found")]
    PrizeStructureNotFound { prize_structure_id: u64 },

    #[error("invalid prize structure {prize_structure_id}: {reason}")]
    InvalidPrizeStructure {
        prize_structure_id: u64,
        reason: String,
    },

    #[error("draw date {date} outside prize structure {prize_structure_id} validity window ({valid_from} to {})", .valid_to.map_or("open".to_string(), |d| d.to_string()))]
    OutOfValidityWindow {
        date: NaiveDate,
        prize_structure_id: u64,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
    },

    #[error("prize structure {prize_structure_id} does not apply on {weekday} ({date})")]
    NotApplicableDay {
        date: NaiveDate,
        prize_structure_id: u64,
        weekday: DayCode,
    },

    #[error("invalid draw date {date}: {reason}")]
    InvalidDate { date: NaiveDate, reason: String },

    #[error("no eligible participants for {date}")]
    NoEligibleParticipants { date: NaiveDate },

    #[error("insufficient eligible pool for tier {prize_tier_id}: need {required} winners, {available} participants left")]
    InsufficientEligiblePool {
        prize_tier_id: u64,
        required: u32,
        available: usize,
    },

    #[error("total weight overflow while aggregating {msisdn}")]
    WeightOverflow { msisdn: String },

    #[error("draw for {date} under prize structure {prize_structure_id} already exists (draw {existing_draw_id}, {existing_status})")]
    DuplicateDraw {
        date: NaiveDate,
        prize_structure_id: u64,
        existing_draw_id: u64,
        existing_status: DrawStatus,
    },

    #[error("concurrent modification: {reason}")]
    ConcurrentModification { reason: String },

    #[error("draw {draw_id} not found")]
    DrawNotFound { draw_id: u64 },

    #[error("draw {draw_id} is {status}, not completed")]
    DrawNotCompleted { draw_id: u64, status: DrawStatus },

    #[error("winner {winner_id} not found")]
    WinnerNotFound { winner_id: u64 },

    #[error("winner {winner_id} is already forfeited")]
    AlreadyForfeited { winner_id: u64 },

    #[error("winner {winner_id} is a runner-up, not a primary winner")]
    NotPrimaryWinner { winner_id: u64 },

    #[error("winner {winner_id} cannot move from {from} to {to}")]
    InvalidWinnerTransition {
        winner_id: u64,
        from: WinnerStatus,
        to: WinnerStatus,
    },

    #[error("no runner-up left for tier {prize_tier_id} of draw {draw_id} (winner {forfeited_winner_id} forfeited)")]
    RunnerUpExhausted {
        draw_id: u64,
        prize_tier_id: u64,
        forfeited_winner_id: u64,
    },

    #[error("draw {draw_id} failed ({cause}); recording the failure also failed: {cleanup}")]
    DrawCleanupFailed {
        draw_id: u64,
        #[source]
        cause: Box<EngineError>,
        cleanup: Box<EngineError>,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PrizeStructureNotFound { .. }
            | EngineError::InvalidPrizeStructure { .. }
            | EngineError::OutOfValidityWindow { .. }
            | EngineError::NotApplicableDay { .. }
            | EngineError::InvalidDate { .. }
            | EngineError::DrawNotCompleted { .. } => ErrorKind::Configuration,
            EngineError::NoEligibleParticipants { .. }
            | EngineError::InsufficientEligiblePool { .. }
            | EngineError::WeightOverflow { .. } => ErrorKind::Eligibility,
            EngineError::DuplicateDraw { .. } | EngineError::ConcurrentModification { .. } => {
                ErrorKind::Concurrency
            }
            EngineError::DrawNotFound { .. }
            | EngineError::WinnerNotFound { .. }
            | EngineError::AlreadyForfeited { .. }
            | EngineError::NotPrimaryWinner { .. }
            | EngineError::InvalidWinnerTransition { .. }
            | EngineError::RunnerUpExhausted { .. } => ErrorKind::Forfeiture,
            EngineError::Std(_)
            | EngineError::Cancelled
            | EngineError::DrawCleanupFailed { .. } => ErrorKind::Storage,
        }
    }
}

/// For query entry points, which can only return `StdError`.
impl From<EngineError> for StdError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Std(err) => err,
            other => StdError::generic_err(other.to_string()),
        }
    }
}

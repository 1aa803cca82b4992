pub mod calendar;
pub mod merkle;
pub mod seed;
pub mod types;

pub use merkle::{compute_leaf_hash, verify_merkle_proof};
pub use seed::DrawSeed;
pub use types::{
    normalize_msisdn, Actor, AuditAction, AuditRecord, DayCode, Draw, DrawBasis, DrawStatus,
    EligibilityPool, LogPosition, ParticipantEntry, PrizeStructure, PrizeTier, RechargeEvent,
    TierOutcome, Winner, WinnerStatus,
};

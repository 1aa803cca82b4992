pub mod eligibility;
pub mod error;
pub mod orchestrator;
pub mod repository;
pub mod runner_up;
pub mod selector;
pub mod store;

pub use eligibility::{EligibilityAggregator, EligibilityRules, EligibilityStats};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use orchestrator::{
    validate_prize_structure, DerivedSeed, DrawOrchestrator, DrawOutcome, DrawVerification,
    EntryProof, FixedSeed, Repositories, SeedSource,
};
pub use repository::{CallContext, CancelSignal};
pub use runner_up::{PayoutOutcome, PromotionOutcome, RunnerUpChain};
pub use selector::{select_winners, Selection, SelectionResult};
pub use store::{KvStore, ReadOnlyStorage, SharedStorage, StorageRef};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::NaiveDate;
    use cosmwasm_std::Timestamp;
    use sweepstakes_common::calendar::day_window;
    use sweepstakes_common::{Actor, DayCode, PrizeStructure, PrizeTier, RechargeEvent};

    use crate::repository::{CallContext, CancelSignal};
    use crate::store::{KvStore, SharedStorage};

    pub const TEST_SEED: [u8; 32] = [7u8; 32];

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn monday() -> NaiveDate {
        date(2024, 3, 4)
    }

    /// UTC wall-clock time on `date`.
    pub fn at(date: NaiveDate, hour: u64, minute: u64) -> Timestamp {
        let (start, _) = day_window(date, 0).unwrap();
        start.plus_seconds(hour * 3_600 + minute * 60)
    }

    pub fn tier(id: u64, quantity: u32, runner_ups: u32, rank: u32) -> PrizeTier {
        PrizeTier {
            id,
            name: format!("Tier {id}"),
            quantity,
            number_of_runner_ups: runner_ups,
            rank,
        }
    }

    /// Valid from 2024-03-01, open-ended, Monday to Saturday.
    pub fn daily_structure(tiers: Vec<PrizeTier>) -> PrizeStructure {
        PrizeStructure {
            id: 1,
            name: "Daily recharge draw".to_string(),
            valid_from: date(2024, 3, 1),
            valid_to: None,
            applicable_days: vec![
                DayCode::Monday,
                DayCode::Tuesday,
                DayCode::Wednesday,
                DayCode::Thursday,
                DayCode::Friday,
                DayCode::Saturday,
            ],
            tiers,
        }
    }

    pub fn recharge(msisdn: &str, amount: i64, timestamp: Timestamp) -> RechargeEvent {
        RechargeEvent {
            msisdn: msisdn.to_string(),
            amount,
            timestamp,
        }
    }

    pub fn seeded_store(
        structure: &PrizeStructure,
        events: &[RechargeEvent],
    ) -> KvStore<SharedStorage> {
        let store = KvStore::in_memory();
        let cancel = CancelSignal::never();
        store.save_prize_structure(&cancel, structure).unwrap();
        store.record_recharges(&cancel, events).unwrap();
        store
    }

    pub fn operator() -> Actor {
        Actor::new("operator-1")
    }

    pub fn ctx(actor: Actor) -> CallContext {
        CallContext::new(actor, at(monday(), 21, 0))
    }
}

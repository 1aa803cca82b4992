use cosmwasm_schema::cw_serde;
use cosmwasm_std::Addr;
use cw_storage_plus::Item;
use sweepstakes_draw_engine::EligibilityRules;

/// Draws, winners, audit records and participant data live under the engine's
/// own keys (`sweepstakes_draw_engine::store`).
pub const CONFIG: Item<Config> = Item::new("config");

#[cw_serde]
pub struct Config {
    pub admin: Addr,
    /// May record recharge events and invoke runner-ups.
    pub operators: Vec<Addr>,
    /// Recharge amount (minor units) per entry
    pub amount_per_entry: u64,
    /// Draw calendar zone, minutes ahead of UTC
    pub utc_offset_minutes: i32,
}

impl Config {
    pub fn rules(&self) -> EligibilityRules {
        EligibilityRules {
            amount_per_entry: self.amount_per_entry,
            utc_offset_minutes: self.utc_offset_minutes,
        }
    }

    pub fn is_operator(&self, addr: &Addr) -> bool {
        self.operators.contains(addr)
    }
}

use chrono::NaiveDate;
use cosmwasm_std::{DepsMut, Env, Event, MessageInfo, Response};
use sweepstakes_common::calendar::{local_date, MAX_UTC_OFFSET_MINUTES};
use sweepstakes_common::{normalize_msisdn, Actor, PrizeStructure, RechargeEvent};
use sweepstakes_draw_engine::{
    validate_prize_structure, CallContext, CancelSignal, DerivedSeed, DrawOrchestrator,
    EngineError, KvStore, StorageRef,
};

use crate::error::ContractError;
use crate::state::{Config, CONFIG};

fn ensure_admin(config: &Config, info: &MessageInfo, reason: &str) -> Result<(), ContractError> {
    if info.sender != config.admin {
        return Err(ContractError::Unauthorized {
            reason: reason.to_string(),
        });
    }
    Ok(())
}

fn call_context(env: &Env, info: &MessageInfo) -> CallContext {
    CallContext::new(Actor::new(info.sender.as_str()), env.block.time)
}

/// Every msisdn in its canonical form.
fn normalize_all(msisdns: &[String]) -> Result<Vec<String>, ContractError> {
    msisdns
        .iter()
        .map(|raw| {
            normalize_msisdn(raw).ok_or_else(|| ContractError::InvalidMsisdn {
                msisdn: raw.clone(),
            })
        })
        .collect()
}

pub fn validate_rules(amount_per_entry: u64, utc_offset_minutes: i32) -> Result<(), ContractError> {
    if amount_per_entry == 0 {
        return Err(ContractError::InvalidConfig {
            reason: "amount_per_entry must be positive".to_string(),
        });
    }
    if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(ContractError::InvalidConfig {
            reason: format!("utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}"),
        });
    }
    Ok(())
}

/// Block height, block time, chain id, transaction index, then the caller's extra bytes.
fn draw_entropy(env: &Env, entropy_hex: Option<&str>) -> Result<Vec<u8>, ContractError> {
    let mut entropy = Vec::new();
    entropy.extend_from_slice(&env.block.height.to_be_bytes());
    entropy.extend_from_slice(&env.block.time.nanos().to_be_bytes());
    entropy.extend_from_slice(env.block.chain_id.as_bytes());
    if let Some(tx) = &env.transaction {
        entropy.extend_from_slice(&tx.index.to_be_bytes());
    }
    if let Some(extra) = entropy_hex {
        let bytes = hex::decode(extra).map_err(|_| ContractError::InvalidHex {
            field: "entropy_hex".to_string(),
        })?;
        entropy.extend_from_slice(&bytes);
    }
    Ok(entropy)
}

/// Run the draw for `draw_date`. Admin only.
/// Any engine error reverts the transaction, reservation included.
pub fn execute_draw(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    draw_date: NaiveDate,
    prize_structure_id: u64,
    entropy_hex: Option<String>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can execute draws")?;

    // The recharge window must have closed in the configured zone.
    let today = local_date(env.block.time, config.utc_offset_minutes);
    if today.map_or(true, |today| today <= draw_date) {
        return Err(EngineError::InvalidDate {
            date: draw_date,
            reason: "draw day has not ended".to_string(),
        }
        .into());
    }

    let seeds = DerivedSeed::new(draw_entropy(&env, entropy_hex.as_deref())?);
    let store = KvStore::new(StorageRef::new(deps.storage));
    let outcome = DrawOrchestrator::from_store(&store, config.rules()).execute_draw(
        &call_context(&env, &info),
        draw_date,
        prize_structure_id,
        &seeds,
    )?;

    let primaries = outcome.winners.iter().filter(|w| !w.is_runner_up).count();
    Ok(Response::new()
        .add_attribute("action", "execute_draw")
        .add_attribute("draw_id", outcome.draw.id.to_string())
        .add_attribute("draw_date", draw_date.to_string())
        .add_attribute("winners", primaries.to_string())
        .add_attribute("runner_ups", (outcome.winners.len() - primaries).to_string())
        .add_attribute("audit_action", outcome.audit.action.name())
        .add_events(outcome.events))
}

/// Forfeit a primary winner and promote the next runner-up. Admin or operator.
///
/// A tier without runner-ups left still keeps the forfeiture; the response
/// carries a `sweepstakes_runner_up_exhausted` event instead of a promotion.
pub fn invoke_runner_up(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    winner_id: u64,
    reason: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.admin && !config.is_operator(&info.sender) {
        return Err(ContractError::Unauthorized {
            reason: "only admin or operators can invoke runner-ups".to_string(),
        });
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ContractError::EmptyReason);
    }

    let store = KvStore::new(StorageRef::new(deps.storage));
    let result = DrawOrchestrator::from_store(&store, config.rules()).invoke_runner_up(
        &call_context(&env, &info),
        winner_id,
        reason,
    );

    match result {
        Ok(outcome) => Ok(Response::new()
            .add_attribute("action", "invoke_runner_up")
            .add_attribute("draw_id", outcome.forfeited.draw_id.to_string())
            .add_attribute("forfeited_winner_id", outcome.forfeited.id.to_string())
            .add_attribute("promoted_winner_id", outcome.promoted.id.to_string())
            .add_events(outcome.events)),
        Err(EngineError::RunnerUpExhausted {
            draw_id,
            prize_tier_id,
            forfeited_winner_id,
        }) => Ok(Response::new()
            .add_attribute("action", "invoke_runner_up")
            .add_attribute("draw_id", draw_id.to_string())
            .add_attribute("forfeited_winner_id", forfeited_winner_id.to_string())
            .add_attribute("promoted_winner_id", "none")
            .add_event(
                Event::new("sweepstakes_runner_up_exhausted")
                    .add_attribute("draw_id", draw_id.to_string())
                    .add_attribute("prize_tier_id", prize_tier_id.to_string())
                    .add_attribute("forfeited_winner_id", forfeited_winner_id.to_string())
                    .add_attribute("actor", info.sender.to_string()),
            )),
        Err(err) => Err(err.into()),
    }
}

/// Admin only.
pub fn mark_winner_paid(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    winner_id: u64,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can mark winners paid")?;

    let store = KvStore::new(StorageRef::new(deps.storage));
    let outcome = DrawOrchestrator::from_store(&store, config.rules())
        .mark_winner_paid(&call_context(&env, &info), winner_id)?;

    Ok(Response::new()
        .add_attribute("action", "mark_winner_paid")
        .add_attribute("winner_id", outcome.winner.id.to_string())
        .add_events(outcome.events))
}

/// Append recharge events. Operator only.
pub fn record_recharges(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    events: Vec<RechargeEvent>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if !config.is_operator(&info.sender) {
        return Err(ContractError::Unauthorized {
            reason: "only operators can record recharges".to_string(),
        });
    }

    let events = events
        .into_iter()
        .map(|event| match normalize_msisdn(&event.msisdn) {
            Some(msisdn) => Ok(RechargeEvent { msisdn, ..event }),
            None => Err(ContractError::InvalidMsisdn {
                msisdn: event.msisdn,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let store = KvStore::new(StorageRef::new(deps.storage));
    let recorded = store.record_recharges(&CancelSignal::never(), &events)?;

    Ok(Response::new()
        .add_attribute("action", "record_recharges")
        .add_attribute("recorded", recorded.to_string())
        .add_attribute("operator", info.sender.to_string()))
}

/// Admin only.
pub fn update_blacklist(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    add: Vec<String>,
    remove: Vec<String>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can update the blacklist")?;

    let add = normalize_all(&add)?;
    let remove = normalize_all(&remove)?;
    let store = KvStore::new(StorageRef::new(deps.storage));
    store.update_blacklist(&CancelSignal::never(), &add, &remove, env.block.time)?;

    Ok(Response::new()
        .add_attribute("action", "update_blacklist")
        .add_attribute("added", add.len().to_string())
        .add_attribute("removed", remove.len().to_string()))
}

/// Create or replace a prize structure. Admin only.
pub fn set_prize_structure(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    structure: PrizeStructure,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can set prize structures")?;
    validate_prize_structure(&structure)?;

    let store = KvStore::new(StorageRef::new(deps.storage));
    store.save_prize_structure(&CancelSignal::never(), &structure)?;

    Ok(Response::new()
        .add_attribute("action", "set_prize_structure")
        .add_attribute("prize_structure_id", structure.id.to_string())
        .add_attribute("tiers", structure.tiers.len().to_string()))
}

/// Admin only.
pub fn update_config(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    admin: Option<String>,
    amount_per_entry: Option<u64>,
    utc_offset_minutes: Option<i32>,
) -> Result<Response, ContractError> {
    let mut config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can update config")?;

    if let Some(new_admin) = admin {
        config.admin = deps.api.addr_validate(&new_admin)?;
    }
    if let Some(amount) = amount_per_entry {
        config.amount_per_entry = amount;
    }
    if let Some(offset) = utc_offset_minutes {
        config.utc_offset_minutes = offset;
    }
    validate_rules(config.amount_per_entry, config.utc_offset_minutes)?;

    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("action", "update_config")
        .add_attribute("admin", config.admin.to_string()))
}

/// Update the operator list. Admin only.
pub fn update_operators(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    add: Vec<String>,
    remove: Vec<String>,
) -> Result<Response, ContractError> {
    let mut config = CONFIG.load(deps.storage)?;
    ensure_admin(&config, &info, "only admin can update operators")?;

    for addr_str in &remove {
        let addr = deps.api.addr_validate(addr_str)?;
        config.operators.retain(|a| *a != addr);
    }
    for addr_str in &add {
        let addr = deps.api.addr_validate(addr_str)?;
        if !config.operators.contains(&addr) {
            config.operators.push(addr);
        }
    }

    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("action", "update_operators")
        .add_attribute("operators", config.operators.len().to_string()))
}

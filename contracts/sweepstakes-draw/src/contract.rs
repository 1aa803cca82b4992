use cosmwasm_std::{entry_point, Binary, Deps, DepsMut, Env, MessageInfo, Response, StdResult};
use cw2::{get_contract_version, set_contract_version};
use sweepstakes_draw_engine::eligibility::DEFAULT_AMOUNT_PER_ENTRY;

use crate::error::ContractError;
use crate::execute;
use crate::msg::{ExecuteMsg, InstantiateMsg, MigrateMsg, QueryMsg};
use crate::query;
use crate::state::{Config, CONFIG};

const CONTRACT_NAME: &str = "crates.io:sweepstakes-draw";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[entry_point]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let amount_per_entry = msg.amount_per_entry.unwrap_or(DEFAULT_AMOUNT_PER_ENTRY);
    let utc_offset_minutes = msg.utc_offset_minutes.unwrap_or(0);
    execute::validate_rules(amount_per_entry, utc_offset_minutes)?;

    let mut operators = Vec::new();
    for op in &msg.operators {
        operators.push(deps.api.addr_validate(op)?);
    }

    let config = Config {
        admin: info.sender.clone(),
        operators,
        amount_per_entry,
        utc_offset_minutes,
    };
    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("contract", "sweepstakes-draw")
        .add_attribute("admin", info.sender.to_string()))
}

#[entry_point]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::ExecuteDraw {
            draw_date,
            prize_structure_id,
            entropy_hex,
        } => execute::execute_draw(deps, env, info, draw_date, prize_structure_id, entropy_hex),
        ExecuteMsg::InvokeRunnerUp { winner_id, reason } => {
            execute::invoke_runner_up(deps, env, info, winner_id, reason)
        }
        ExecuteMsg::MarkWinnerPaid { winner_id } => {
            execute::mark_winner_paid(deps, env, info, winner_id)
        }
        ExecuteMsg::RecordRecharges { events } => {
            execute::record_recharges(deps, env, info, events)
        }
        ExecuteMsg::UpdateBlacklist { add, remove } => {
            execute::update_blacklist(deps, env, info, add, remove)
        }
        ExecuteMsg::SetPrizeStructure { structure } => {
            execute::set_prize_structure(deps, env, info, structure)
        }
        ExecuteMsg::UpdateConfig {
            admin,
            amount_per_entry,
            utc_offset_minutes,
        } => execute::update_config(deps, env, info, admin, amount_per_entry, utc_offset_minutes),
        ExecuteMsg::UpdateOperators { add, remove } => {
            execute::update_operators(deps, env, info, add, remove)
        }
    }
}

#[entry_point]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Config {} => query::query_config(deps),
        QueryMsg::EligibilityStats {
            draw_date,
            prize_structure_id,
        } => query::query_eligibility_stats(deps, draw_date, prize_structure_id),
        QueryMsg::Draw { draw_id } => query::query_draw(deps, draw_id),
        QueryMsg::DrawByDate {
            draw_date,
            prize_structure_id,
        } => query::query_draw_by_date(deps, draw_date, prize_structure_id),
        QueryMsg::DrawHistory { start_after, limit } => {
            query::query_draw_history(deps, start_after, limit)
        }
        QueryMsg::Winner { winner_id } => query::query_winner(deps, winner_id),
        QueryMsg::AuditTrail { draw_id } => query::query_audit_trail(deps, draw_id),
        QueryMsg::PrizeStructure { prize_structure_id } => {
            query::query_prize_structure(deps, prize_structure_id)
        }
        QueryMsg::VerifyDraw { draw_id } => query::query_verify_draw(deps, draw_id),
        QueryMsg::ProveEntry { draw_id, msisdn } => {
            query::query_prove_entry(deps, draw_id, msisdn)
        }
    }
}

#[entry_point]
pub fn migrate(deps: DepsMut, _env: Env, _msg: MigrateMsg) -> Result<Response, ContractError> {
    let stored = get_contract_version(deps.storage)?;
    if stored.contract != CONTRACT_NAME {
        return Err(ContractError::Unauthorized {
            reason: "cannot migrate from a different contract".to_string(),
        });
    }

    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    Ok(Response::new()
        .add_attribute("action", "migrate")
        .add_attribute("from_version", stored.version)
        .add_attribute("to_version", CONTRACT_VERSION))
}

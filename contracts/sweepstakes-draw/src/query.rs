use chrono::NaiveDate;
use cosmwasm_std::{to_json_binary, Binary, Deps, StdResult};
use sweepstakes_draw_engine::repository::{DrawRepository, PrizeStructureRepository};
use sweepstakes_draw_engine::{CancelSignal, DrawOrchestrator, EngineError, KvStore, ReadOnlyStorage};

use crate::msg::{DrawHistoryResponse, DrawResponse};
use crate::state::CONFIG;

fn read_store(deps: Deps) -> KvStore<ReadOnlyStorage<'_>> {
    KvStore::new(ReadOnlyStorage::new(deps.storage))
}

pub fn query_config(deps: Deps) -> StdResult<Binary> {
    let config = CONFIG.load(deps.storage)?;
    to_json_binary(&config)
}

pub fn query_eligibility_stats(
    deps: Deps,
    draw_date: NaiveDate,
    prize_structure_id: u64,
) -> StdResult<Binary> {
    let config = CONFIG.load(deps.storage)?;
    let store = read_store(deps);
    let stats = DrawOrchestrator::from_store(&store, config.rules()).eligibility_stats(
        &CancelSignal::never(),
        draw_date,
        prize_structure_id,
    )?;
    to_json_binary(&stats)
}

pub fn query_draw(deps: Deps, draw_id: u64) -> StdResult<Binary> {
    let store = read_store(deps);
    let cancel = CancelSignal::never();
    let draw = store
        .draw(&cancel, draw_id)?
        .ok_or(EngineError::DrawNotFound { draw_id })?;
    let winners = store.winners_for_draw(&cancel, draw_id)?;
    to_json_binary(&DrawResponse { draw, winners })
}

pub fn query_draw_by_date(
    deps: Deps,
    draw_date: NaiveDate,
    prize_structure_id: u64,
) -> StdResult<Binary> {
    let store = read_store(deps);
    let cancel = CancelSignal::never();
    let response = match store.draw_for_date(&cancel, draw_date, prize_structure_id)? {
        Some(draw) => {
            let winners = store.winners_for_draw(&cancel, draw.id)?;
            Some(DrawResponse { draw, winners })
        }
        None => None,
    };
    to_json_binary(&response)
}

pub fn query_draw_history(
    deps: Deps,
    start_after: Option<u64>,
    limit: Option<u32>,
) -> StdResult<Binary> {
    let draws = read_store(deps).draw_history(&CancelSignal::never(), start_after, limit)?;
    to_json_binary(&DrawHistoryResponse { draws })
}

pub fn query_winner(deps: Deps, winner_id: u64) -> StdResult<Binary> {
    let winner = read_store(deps).winner(&CancelSignal::never(), winner_id)?;
    to_json_binary(&winner)
}

pub fn query_audit_trail(deps: Deps, draw_id: u64) -> StdResult<Binary> {
    let records = read_store(deps).audit_trail(&CancelSignal::never(), draw_id)?;
    to_json_binary(&records)
}

pub fn query_prize_structure(deps: Deps, prize_structure_id: u64) -> StdResult<Binary> {
    let structure = read_store(deps).prize_structure(&CancelSignal::never(), prize_structure_id)?;
    to_json_binary(&structure)
}

pub fn query_verify_draw(deps: Deps, draw_id: u64) -> StdResult<Binary> {
    let config = CONFIG.load(deps.storage)?;
    let store = read_store(deps);
    let verification = DrawOrchestrator::from_store(&store, config.rules())
        .verify_draw(&CancelSignal::never(), draw_id)?;
    to_json_binary(&verification)
}

pub fn query_prove_entry(deps: Deps, draw_id: u64, msisdn: String) -> StdResult<Binary> {
    let config = CONFIG.load(deps.storage)?;
    let store = read_store(deps);
    let proof = DrawOrchestrator::from_store(&store, config.rules()).prove_entry(
        &CancelSignal::never(),
        draw_id,
        &msisdn,
    )?;
    to_json_binary(&proof)
}

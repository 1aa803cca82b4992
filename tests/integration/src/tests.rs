//! Integration tests for the sweepstakes draw contract.
//!
//! These tests drive the contract through its `instantiate` / `execute` /
//! `query` entry points with `cosmwasm_std::testing` mocks, and check the
//! published draw data (seed tokens, pool roots, inclusion proofs) the way an
//! outside auditor would.
//!
//! Run:
//! ```bash
//! cargo test -p sweepstakes-integration-tests
//! ```

use std::collections::BTreeSet;

use chrono::NaiveDate;
use cosmwasm_std::testing::{message_info, mock_dependencies, mock_env, MockApi, MockQuerier};
use cosmwasm_std::{from_json, Env, MemoryStorage, OwnedDeps, Response, Timestamp};
use sweepstakes_common::{
    compute_leaf_hash, verify_merkle_proof, AuditAction, AuditRecord, DayCode, DrawStatus,
    PrizeStructure, PrizeTier, RechargeEvent, Winner, WinnerStatus,
};
use sweepstakes_draw::msg::{
    DrawHistoryResponse, DrawResponse, ExecuteMsg, InstantiateMsg, QueryMsg,
};
use sweepstakes_draw::ContractError;
use sweepstakes_draw_engine::{DrawVerification, EligibilityStats, EngineError, EntryProof};

type Deps = OwnedDeps<MemoryStorage, MockApi, MockQuerier>;

// ─── Constants ───

/// 2024-03-04T00:00:00Z, a Monday
const MONDAY_UTC: u64 = 1_709_510_400;
const DAY: u64 = 86_400;
/// Draw calendar one hour ahead of UTC
const OFFSET_MINUTES: i32 = 60;
const OFFSET_SECONDS: u64 = 3_600;

// ─── Helpers ───

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
}

/// Start of the local calendar day `days` after Monday, in UTC seconds.
fn local_day_start(days: u64) -> u64 {
    MONDAY_UTC + days * DAY - OFFSET_SECONDS
}

fn env_at(seconds: u64) -> Env {
    let mut env = mock_env();
    env.block.time = Timestamp::from_seconds(seconds);
    env
}

fn recharge(msisdn: &str, amount: i64, seconds: u64) -> RechargeEvent {
    RechargeEvent {
        msisdn: msisdn.to_string(),
        amount,
        timestamp: Timestamp::from_seconds(seconds),
    }
}

fn tier(id: u64, quantity: u32, runner_ups: u32, rank: u32) -> PrizeTier {
    PrizeTier {
        id,
        name: format!("tier-{id}"),
        quantity,
        number_of_runner_ups: runner_ups,
        rank,
    }
}

fn structure(tiers: Vec<PrizeTier>) -> PrizeStructure {
    PrizeStructure {
        id: 1,
        name: "Weekday airtime".to_string(),
        valid_from: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        valid_to: None,
        applicable_days: vec![DayCode::Monday, DayCode::Wednesday, DayCode::Friday],
        tiers,
    }
}

fn setup(deps: &mut Deps, tiers: Vec<PrizeTier>) {
    let admin = deps.api.addr_make("admin");
    let operator = deps.api.addr_make("operator");
    let msg = InstantiateMsg {
        operators: vec![operator.to_string()],
        amount_per_entry: None,
        utc_offset_minutes: Some(OFFSET_MINUTES),
    };
    sweepstakes_draw::contract::instantiate(
        deps.as_mut(),
        mock_env(),
        message_info(&admin, &[]),
        msg,
    )
    .unwrap();
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        mock_env(),
        message_info(&admin, &[]),
        ExecuteMsg::SetPrizeStructure {
            structure: structure(tiers),
        },
    )
    .unwrap();
}

fn record(deps: &mut Deps, events: Vec<RechargeEvent>) {
    let operator = deps.api.addr_make("operator");
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        mock_env(),
        message_info(&operator, &[]),
        ExecuteMsg::RecordRecharges { events },
    )
    .unwrap();
}

fn try_draw(
    deps: &mut Deps,
    date: NaiveDate,
    entropy_hex: Option<&str>,
) -> Result<Response, ContractError> {
    let admin = deps.api.addr_make("admin");
    // Evening after the draw date
    let env = env_at(MONDAY_UTC + (date - monday()).num_days() as u64 * DAY + DAY + 18 * 3_600);
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        env,
        message_info(&admin, &[]),
        ExecuteMsg::ExecuteDraw {
            draw_date: date,
            prize_structure_id: 1,
            entropy_hex: entropy_hex.map(str::to_string),
        },
    )
}

fn invoke_runner_up(deps: &mut Deps, winner_id: u64) -> Response {
    let operator = deps.api.addr_make("operator");
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        mock_env(),
        message_info(&operator, &[]),
        ExecuteMsg::InvokeRunnerUp {
            winner_id,
            reason: "unreachable after three attempts".to_string(),
        },
    )
    .unwrap()
}

fn query_draw(deps: &Deps, draw_id: u64) -> DrawResponse {
    from_json(
        sweepstakes_draw::contract::query(deps.as_ref(), mock_env(), QueryMsg::Draw { draw_id })
            .unwrap(),
    )
    .unwrap()
}

fn query_audit(deps: &Deps, draw_id: u64) -> Vec<AuditRecord> {
    from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::AuditTrail { draw_id },
        )
        .unwrap(),
    )
    .unwrap()
}

fn query_verify(deps: &Deps, draw_id: u64) -> DrawVerification {
    from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::VerifyDraw { draw_id },
        )
        .unwrap(),
    )
    .unwrap()
}

fn query_proof(deps: &Deps, draw_id: u64, msisdn: &str) -> EntryProof {
    from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::ProveEntry {
                draw_id,
                msisdn: msisdn.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap()
}

fn attribute<'a>(res: &'a Response, key: &str) -> &'a str {
    res.attributes
        .iter()
        .find(|a| a.key == key)
        .map(|a| a.value.as_str())
        .unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_weekly_draws_with_local_calendar() {
    let mut deps = mock_dependencies();
    setup(&mut deps, vec![tier(1, 1, 1, 1), tier(2, 1, 0, 2)]);

    record(
        &mut deps,
        vec![
            // First second of local Monday
            recharge("+2348030000001", 2_000, local_day_start(0)),
            // First second of local Tuesday, so not Monday
            recharge("2348030000002", 1_000, local_day_start(1)),
            recharge("2348030000003", 800, local_day_start(0) + 3_600),
            recharge("2348030000003", -300, local_day_start(0) + 7_200),
            // Below one entry
            recharge("2348030000004", 99, local_day_start(0) + 10_000),
            recharge("2348030000005", 1_500, local_day_start(0) + 40_000),
            // Wednesday
            recharge("2348030000006", 700, local_day_start(2) + 1_000),
            recharge("2348030000001", 300, local_day_start(2) + 2_000),
            recharge("2348030000007", 1_200, local_day_start(2) + 80_000),
        ],
    );

    let stats: EligibilityStats = from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::EligibilityStats {
                draw_date: monday(),
                prize_structure_id: 1,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(stats.total_eligible_participants, 3);
    assert_eq!(stats.total_weighted_entries, 40);

    let monday_pool: BTreeSet<&str> = ["2348030000001", "2348030000003", "2348030000005"]
        .into_iter()
        .collect();
    let wednesday_pool: BTreeSet<&str> = ["2348030000001", "2348030000006", "2348030000007"]
        .into_iter()
        .collect();

    for (date, pool, expected_id, expected_weight) in [
        (monday(), &monday_pool, 0u64, 40u64),
        (wednesday(), &wednesday_pool, 1u64, 22u64),
    ] {
        let res = try_draw(&mut deps, date, None).unwrap();
        assert_eq!(attribute(&res, "draw_id"), expected_id.to_string());

        let DrawResponse { draw, winners } = query_draw(&deps, expected_id);
        assert_eq!(draw.status, DrawStatus::Completed);
        assert_eq!(draw.draw_date, date);
        assert_eq!(draw.total_participants, 3);
        assert_eq!(draw.total_weight, expected_weight);

        // Tier 1 takes a winner and a runner-up, tier 2 the last participant
        assert_eq!(winners.len(), 3);
        let drawn: BTreeSet<&str> = winners.iter().map(|w| w.msisdn.as_str()).collect();
        assert_eq!(&drawn, pool);

        for winner in &winners {
            let proof = query_proof(&deps, draw.id, &winner.msisdn);
            assert!(proof.included);
            assert!(proof.root_matches_draw);
            assert_eq!(Some(&proof.root), draw.pool_root.as_ref());
            let leaf = compute_leaf_hash(
                &winner.msisdn,
                proof.range_start.u128(),
                proof.range_end.u128(),
            );
            assert!(verify_merkle_proof(&proof.root, &proof.proof, &leaf));
            assert_eq!(
                proof.range_end.u128() - proof.range_start.u128(),
                u128::from(proof.weight)
            );
        }

        let verification = query_verify(&deps, draw.id);
        assert!(verification.pool_matches);
        assert!(verification.selection_matches);
        assert_eq!(Some(verification.seed_token), draw.seed_token);
    }

    let history: DrawHistoryResponse = from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::DrawHistory {
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(history.draws.len(), 2);
}

#[test]
fn test_runner_up_chain_to_exhaustion() {
    let mut deps = mock_dependencies();
    setup(&mut deps, vec![tier(1, 1, 2, 1)]);
    record(
        &mut deps,
        vec![
            recharge("2348030000001", 500, local_day_start(0) + 100),
            recharge("2348030000002", 500, local_day_start(0) + 200),
            recharge("2348030000003", 500, local_day_start(0) + 300),
            recharge("2348030000004", 500, local_day_start(0) + 400),
        ],
    );
    try_draw(&mut deps, monday(), Some("5eed")).unwrap();

    let winners = query_draw(&deps, 0).winners;
    let primary = winners.iter().find(|w| !w.is_runner_up).unwrap().clone();
    let mut backups: Vec<&Winner> = winners.iter().filter(|w| w.is_runner_up).collect();
    backups.sort_by_key(|w| w.runner_up_rank);
    assert_eq!(backups.len(), 2);

    let res = invoke_runner_up(&mut deps, primary.id);
    assert_eq!(attribute(&res, "promoted_winner_id"), backups[0].id.to_string());

    // The promoted runner-up is now the primary and can forfeit in turn
    let res = invoke_runner_up(&mut deps, backups[0].id);
    assert_eq!(attribute(&res, "promoted_winner_id"), backups[1].id.to_string());
    let promoted = &res.events[0];
    assert_eq!(promoted.ty, "sweepstakes_runner_up_promoted");
    assert!(promoted
        .attributes
        .iter()
        .any(|a| a.key == "promoted_selection_rank" && a.value == "2"));

    let res = invoke_runner_up(&mut deps, backups[1].id);
    assert_eq!(attribute(&res, "promoted_winner_id"), "none");
    assert_eq!(res.events[0].ty, "sweepstakes_runner_up_exhausted");

    let winners = query_draw(&deps, 0).winners;
    assert!(winners.iter().all(|w| w.status == WinnerStatus::Forfeited));

    let trail = query_audit(&deps, 0);
    assert_eq!(trail.len(), 4);
    assert!(matches!(trail[0].action, AuditAction::DrawCompleted { .. }));
    assert!(matches!(
        trail[3].action,
        AuditAction::RunnerUpInvoked {
            promoted_winner_id: None,
            ..
        }
    ));
}

#[test]
fn test_failed_draw_can_be_rerun() {
    let mut deps = mock_dependencies();
    setup(&mut deps, vec![tier(1, 2, 0, 1)]);
    record(
        &mut deps,
        vec![recharge("2348030000001", 1_000, local_day_start(0) + 100)],
    );

    let err = try_draw(&mut deps, monday(), None).unwrap_err();
    assert!(matches!(
        err,
        ContractError::Engine(EngineError::InsufficientEligiblePool {
            prize_tier_id: 1,
            required: 2,
            available: 1,
        })
    ));

    // Mock storage keeps what a reverted transaction would roll back
    let failed = query_draw(&deps, 0);
    assert_eq!(failed.draw.status, DrawStatus::Failed);
    assert!(failed.draw.failure_reason.is_some());
    assert!(failed.winners.is_empty());
    let trail = query_audit(&deps, 0);
    assert!(matches!(trail[0].action, AuditAction::DrawFailed { .. }));

    let by_date: Option<DrawResponse> = from_json(
        sweepstakes_draw::contract::query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::DrawByDate {
                draw_date: monday(),
                prize_structure_id: 1,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert!(by_date.is_none());

    record(
        &mut deps,
        vec![recharge("2348030000002", 400, local_day_start(0) + 200)],
    );
    let res = try_draw(&mut deps, monday(), None).unwrap();
    assert_eq!(attribute(&res, "draw_id"), "1");
    assert_eq!(query_draw(&deps, 1).draw.status, DrawStatus::Completed);
}

#[test]
fn test_draws_are_reproducible() {
    let participants: Vec<RechargeEvent> = (1..=20u64)
        .map(|i| recharge(&format!("23480300000{i:02}"), 100 * i as i64, local_day_start(0) + i))
        .collect();

    let mut outcomes = Vec::new();
    for entropy in ["aa", "aa", "bb"] {
        let mut deps = mock_dependencies();
        setup(&mut deps, vec![tier(1, 3, 2, 1), tier(2, 5, 0, 2)]);
        record(&mut deps, participants.clone());
        try_draw(&mut deps, monday(), Some(entropy)).unwrap();

        let DrawResponse { draw, winners } = query_draw(&deps, 0);
        let picks: Vec<(u64, String, u32)> = winners
            .into_iter()
            .map(|w| (w.prize_tier_id, w.msisdn, w.selection_rank))
            .collect();
        outcomes.push((draw.seed_token.unwrap(), draw.pool_root.unwrap(), picks));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_ne!(outcomes[0].0, outcomes[2].0);
    // Same participants, same pool commitment
    assert_eq!(outcomes[0].1, outcomes[2].1);
}

#[test]
fn test_late_backfill_keeps_verification() {
    let mut deps = mock_dependencies();
    setup(&mut deps, vec![tier(1, 1, 0, 1)]);
    record(
        &mut deps,
        vec![
            recharge("2348030000001", 500, local_day_start(0) + 100),
            recharge("2348030000002", 500, local_day_start(0) + 200),
        ],
    );
    try_draw(&mut deps, monday(), None).unwrap();
    let recorded = query_verify(&deps, 0);
    assert!(recorded.pool_matches);

    // Ingested after the draw, timestamped inside the drawn day
    record(
        &mut deps,
        vec![recharge("2348030000009", 5_000, local_day_start(0) + 300)],
    );
    let verification = query_verify(&deps, 0);
    assert!(verification.pool_matches);
    assert!(verification.selection_matches);
    assert_eq!(verification.recomputed_root, recorded.recomputed_root);

    let outsider = query_proof(&deps, 0, "2348030000009");
    assert!(!outsider.included);
    assert!(outsider.proof.is_empty());
}

#[test]
fn test_blacklisted_participants_never_win() {
    let mut deps = mock_dependencies();
    setup(&mut deps, vec![tier(1, 2, 0, 1)]);
    record(
        &mut deps,
        vec![
            recharge("2348030000001", 90_000, local_day_start(0) + 100),
            recharge("2348030000002", 500, local_day_start(0) + 200),
            recharge("2348030000003", 500, local_day_start(0) + 300),
        ],
    );
    let admin = deps.api.addr_make("admin");
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        mock_env(),
        message_info(&admin, &[]),
        ExecuteMsg::UpdateBlacklist {
            add: vec!["+2348030000001".to_string()],
            remove: vec![],
        },
    )
    .unwrap();

    try_draw(&mut deps, monday(), None).unwrap();
    let drawn: BTreeSet<String> = query_draw(&deps, 0)
        .winners
        .into_iter()
        .map(|w| w.msisdn)
        .collect();
    assert_eq!(
        drawn,
        BTreeSet::from(["2348030000002".to_string(), "2348030000003".to_string()])
    );

    // Lifting the ban later does not put them back into the drawn pool
    sweepstakes_draw::contract::execute(
        deps.as_mut(),
        mock_env(),
        message_info(&admin, &[]),
        ExecuteMsg::UpdateBlacklist {
            add: vec![],
            remove: vec!["2348030000001".to_string()],
        },
    )
    .unwrap();
    let verification = query_verify(&deps, 0);
    assert!(verification.pool_matches);
    assert!(verification.selection_matches);
    assert!(!query_proof(&deps, 0, "2348030000001").included);
}

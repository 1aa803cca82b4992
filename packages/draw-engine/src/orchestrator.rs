use std::collections::BTreeSet;

use chrono::NaiveDate;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Event, StdError, Uint128};
use sweepstakes_common::merkle::{cumulative_ranges, merkle_proof, merkle_root, pool_leaves};
use sweepstakes_common::{
    normalize_msisdn, AuditAction, AuditRecord, Draw, DrawBasis, DrawSeed, DrawStatus,
    EligibilityPool, PrizeStructure, Winner,
};

use crate::eligibility::{
    check_applicability, EligibilityAggregator, EligibilityRules, EligibilityStats,
};
use crate::error::{EngineError, EngineResult};
use crate::repository::{
    AuditSink, BlacklistRepository, CallContext, CancelSignal, DrawCompletion, DrawRepository,
    ParticipantEventRepository, PrizeStructureRepository,
};
use crate::runner_up::{PayoutOutcome, PromotionOutcome, RunnerUpChain};
use crate::selector::select_winners;

/// Where a draw's selection seed comes from.
pub trait SeedSource {
    fn draw_seed(&self, draw: &Draw) -> EngineResult<DrawSeed>;
}

/// Always the same seed. Replays a recorded draw.
pub struct FixedSeed(pub DrawSeed);

impl SeedSource for FixedSeed {
    fn draw_seed(&self, _draw: &Draw) -> EngineResult<DrawSeed> {
        Ok(self.0)
    }
}

/// Hashes caller entropy together with the reserved draw's identity.
pub struct DerivedSeed {
    entropy: Vec<u8>,
}

impl DerivedSeed {
    pub fn new(entropy: impl Into<Vec<u8>>) -> Self {
        DerivedSeed {
            entropy: entropy.into(),
        }
    }
}

impl SeedSource for DerivedSeed {
    fn draw_seed(&self, draw: &Draw) -> EngineResult<DrawSeed> {
        let date = draw.draw_date.to_string();
        Ok(DrawSeed::derive(&[
            self.entropy.as_slice(),
            &draw.id.to_be_bytes()[..],
            date.as_bytes(),
            &draw.prize_structure_id.to_be_bytes()[..],
            &draw.created_at.nanos().to_be_bytes()[..],
        ]))
    }
}

/// The repositories a `DrawOrchestrator` runs against.
#[derive(Clone, Copy)]
pub struct Repositories<'a> {
    pub structures: &'a dyn PrizeStructureRepository,
    pub events: &'a dyn ParticipantEventRepository,
    pub blacklist: &'a dyn BlacklistRepository,
    pub draws: &'a dyn DrawRepository,
    pub audit: &'a dyn AuditSink,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawOutcome {
    pub draw: Draw,
    pub winners: Vec<Winner>,
    pub audit: AuditRecord,
    pub events: Vec<Event>,
}

#[cw_serde]
pub struct DrawVerification {
    pub draw_id: u64,
    pub seed_token: String,
    pub recorded_root: Option<String>,
    pub recomputed_root: String,
    /// The rebuilt pool hashes to the committed root.
    pub pool_matches: bool,
    /// Re-running selection with the recorded seed reproduces the stored winners.
    pub selection_matches: bool,
}

#[cw_serde]
pub struct EntryProof {
    pub draw_id: u64,
    pub msisdn: String,
    pub included: bool,
    pub weight: u64,
    /// `[range_start, range_end)` in the pool's cumulative weight line.
    pub range_start: Uint128,
    pub range_end: Uint128,
    pub proof: Vec<String>,
    pub root: String,
    pub root_matches_draw: bool,
}

/// Checks a prize structure before it is stored or drawn.
pub fn validate_prize_structure(structure: &PrizeStructure) -> EngineResult<()> {
    let invalid = |reason: &str| EngineError::InvalidPrizeStructure {
        prize_structure_id: structure.id,
        reason: reason.to_string(),
    };

    if structure.tiers.is_empty() {
        return Err(invalid("at least one prize tier is required"));
    }
    if structure.applicable_days.is_empty() {
        return Err(invalid("at least one applicable day is required"));
    }
    if structure
        .valid_to
        .is_some_and(|valid_to| valid_to < structure.valid_from)
    {
        return Err(invalid("valid_to is before valid_from"));
    }
    let mut seen = BTreeSet::new();
    for tier in &structure.tiers {
        if !seen.insert(tier.id) {
            return Err(invalid(&format!("duplicate prize tier id {}", tier.id)));
        }
        if tier.quantity == 0 {
            return Err(invalid(&format!("prize tier {} has zero quantity", tier.id)));
        }
    }
    Ok(())
}

/// Runs a draw for one `(date, prize structure)` exactly once.
///
/// The date is reserved before any participant data is read. If aggregation or
/// selection fails, the reservation is moved to Failed and the date can be
/// drawn again; otherwise the draw, its winners and its audit record are
/// written in a single `complete_draw` call.
pub struct DrawOrchestrator<'a> {
    repos: Repositories<'a>,
    rules: EligibilityRules,
}

impl<'a> DrawOrchestrator<'a> {
    pub fn new(repos: Repositories<'a>, rules: EligibilityRules) -> Self {
        DrawOrchestrator { repos, rules }
    }

    /// One store serving every repository.
    pub fn from_store<S>(store: &'a S, rules: EligibilityRules) -> Self
    where
        S: PrizeStructureRepository
            + ParticipantEventRepository
            + BlacklistRepository
            + DrawRepository
            + AuditSink,
    {
        DrawOrchestrator::new(
            Repositories {
                structures: store,
                events: store,
                blacklist: store,
                draws: store,
                audit: store,
            },
            rules,
        )
    }

    fn aggregator(&self) -> EligibilityAggregator<'a> {
        EligibilityAggregator::new(self.repos.events, self.repos.blacklist, self.rules.clone())
    }

    pub fn runner_ups(&self) -> RunnerUpChain<'a> {
        RunnerUpChain::new(self.repos.draws)
    }

    fn load_structure(
        &self,
        cancel: &CancelSignal,
        prize_structure_id: u64,
    ) -> EngineResult<PrizeStructure> {
        let structure = self
            .repos
            .structures
            .prize_structure(cancel, prize_structure_id)?
            .ok_or(EngineError::PrizeStructureNotFound { prize_structure_id })?;
        validate_prize_structure(&structure)?;
        Ok(structure)
    }

    fn completed_draw(&self, cancel: &CancelSignal, draw_id: u64) -> EngineResult<Draw> {
        let draw = self
            .repos
            .draws
            .draw(cancel, draw_id)?
            .ok_or(EngineError::DrawNotFound { draw_id })?;
        if draw.status != DrawStatus::Completed {
            return Err(EngineError::DrawNotCompleted {
                draw_id,
                status: draw.status,
            });
        }
        Ok(draw)
    }

    pub fn execute_draw(
        &self,
        ctx: &CallContext,
        date: NaiveDate,
        prize_structure_id: u64,
        seeds: &dyn SeedSource,
    ) -> EngineResult<DrawOutcome> {
        let cancel = &ctx.cancel;
        let structure = self.load_structure(cancel, prize_structure_id)?;
        check_applicability(date, &structure)?;
        self.rules.day_bounds(date)?;

        let draw = self.repos.draws.reserve_draw(
            cancel,
            date,
            prize_structure_id,
            &ctx.actor,
            ctx.now,
        )?;

        self.run_reserved(ctx, &draw, &structure, seeds)
            .map_err(|err| self.abandon(ctx, &draw, err))
    }

    fn run_reserved(
        &self,
        ctx: &CallContext,
        draw: &Draw,
        structure: &PrizeStructure,
        seeds: &dyn SeedSource,
    ) -> EngineResult<DrawOutcome> {
        let cancel = &ctx.cancel;
        let aggregator = self.aggregator();
        let position = aggregator.position(cancel)?;
        let pool = aggregator.build_pool(cancel, draw.draw_date, structure, position)?;
        let seed = seeds.draw_seed(draw)?;
        let selection = select_winners(&pool, &structure.tiers, &seed)?;

        let tiers = selection.outcomes();
        let seed_token = seed.to_token();
        let pool_root = pool.commitment();
        let total_participants = pool.len() as u64;
        let basis = DrawBasis {
            amount_per_entry: self.rules.amount_per_entry,
            utc_offset_minutes: self.rules.utc_offset_minutes,
            tiers: structure.tiers.clone(),
            position,
        };
        let audit = AuditRecord {
            id: 0,
            draw_id: draw.id,
            action: AuditAction::DrawCompleted {
                seed_token: seed_token.clone(),
                pool_root: pool_root.clone(),
                total_participants,
                total_weight: pool.total_weight,
                tiers: tiers.clone(),
                basis: basis.clone(),
            },
            actor: ctx.actor.to_string(),
            timestamp: ctx.now,
            summary: format!(
                "draw {} for {} under prize structure {} by {}: {} participants, {} entries, {} tiers",
                draw.id,
                draw.draw_date,
                structure.id,
                ctx.actor,
                total_participants,
                pool.total_weight,
                tiers.len()
            ),
        };

        let (draw, winners, audit) = self.repos.draws.complete_draw(
            cancel,
            DrawCompletion {
                draw_id: draw.id,
                seed_token: seed_token.clone(),
                pool_root: pool_root.clone(),
                total_participants,
                total_weight: pool.total_weight,
                basis,
                winners: selection.into_new_winners(),
                audit,
                completed_at: ctx.now,
            },
        )?;

        let mut events = vec![Event::new("sweepstakes_draw_completed")
            .add_attribute("draw_id", draw.id.to_string())
            .add_attribute("draw_date", draw.draw_date.to_string())
            .add_attribute("prize_structure_id", draw.prize_structure_id.to_string())
            .add_attribute("executed_by", draw.executed_by.clone())
            .add_attribute("total_participants", total_participants.to_string())
            .add_attribute("total_weight", pool.total_weight.to_string())
            .add_attribute("seed_token", seed_token)
            .add_attribute("pool_root", pool_root)
            .add_attribute("audit_id", audit.id.to_string())];
        events.extend(tiers.iter().map(|tier| {
            Event::new("sweepstakes_tier_drawn")
                .add_attribute("draw_id", draw.id.to_string())
                .add_attribute("prize_tier_id", tier.prize_tier_id.to_string())
                .add_attribute(
                    "tier_name",
                    structure.tier(tier.prize_tier_id).map_or("", |t| t.name.as_str()),
                )
                .add_attribute("winners_selected", tier.winners_selected.to_string())
                .add_attribute("runner_ups_requested", tier.runner_ups_requested.to_string())
                .add_attribute("runner_ups_selected", tier.runner_ups_selected.to_string())
        }));

        Ok(DrawOutcome {
            draw,
            winners,
            audit,
            events,
        })
    }

    /// Moves the reservation to Failed and records why. Gives back `err`, or
    /// `DrawCleanupFailed` wrapping it when either write fails.
    fn abandon(&self, ctx: &CallContext, draw: &Draw, err: EngineError) -> EngineError {
        // Runs even when the caller cancelled, so no reservation stays Pending.
        let cleanup = CancelSignal::never();
        let reason = err.to_string();
        let recorded = self
            .repos
            .draws
            .fail_draw(&cleanup, draw.id, &reason)
            .and_then(|_| {
                let audit = AuditRecord {
                    id: 0,
                    draw_id: draw.id,
                    action: AuditAction::DrawFailed {
                        reason: reason.clone(),
                    },
                    actor: ctx.actor.to_string(),
                    timestamp: ctx.now,
                    summary: format!("draw {} for {} failed: {}", draw.id, draw.draw_date, reason),
                };
                self.repos.audit.record(&cleanup, audit)
            });
        match recorded {
            Ok(_) => err,
            Err(cleanup) => EngineError::DrawCleanupFailed {
                draw_id: draw.id,
                cause: Box::new(err),
                cleanup: Box::new(cleanup),
            },
        }
    }

    pub fn eligibility_stats(
        &self,
        cancel: &CancelSignal,
        date: NaiveDate,
        prize_structure_id: u64,
    ) -> EngineResult<EligibilityStats> {
        let structure = self.load_structure(cancel, prize_structure_id)?;
        self.aggregator().stats(cancel, date, &structure)
    }

    pub fn invoke_runner_up(
        &self,
        ctx: &CallContext,
        winner_id: u64,
        reason: &str,
    ) -> EngineResult<PromotionOutcome> {
        self.runner_ups().invoke_runner_up(ctx, winner_id, reason)
    }

    pub fn mark_winner_paid(
        &self,
        ctx: &CallContext,
        winner_id: u64,
    ) -> EngineResult<PayoutOutcome> {
        self.runner_ups().mark_paid(ctx, winner_id)
    }

    /// The pool a completed draw ran against, rebuilt from its recorded basis.
    fn replay_pool<'d>(
        &self,
        cancel: &CancelSignal,
        draw: &'d Draw,
    ) -> EngineResult<(EligibilityPool, &'d DrawBasis)> {
        let basis = draw.basis.as_ref().ok_or_else(|| {
            StdError::generic_err(format!("draw {} has no recorded basis", draw.id))
        })?;
        let aggregator =
            EligibilityAggregator::new(self.repos.events, self.repos.blacklist, basis.into());
        let pool = aggregator.aggregate(
            cancel,
            draw.draw_date,
            draw.prize_structure_id,
            basis.position,
        )?;
        Ok((pool, basis))
    }

    /// Replays a completed draw with the rules, tiers, log position and seed it
    /// was recorded with. Later ingestion and admin changes do not affect it.
    pub fn verify_draw(
        &self,
        cancel: &CancelSignal,
        draw_id: u64,
    ) -> EngineResult<DrawVerification> {
        let draw = self.completed_draw(cancel, draw_id)?;
        let (pool, basis) = self.replay_pool(cancel, &draw)?;
        let recomputed_root = pool.commitment();

        let seed_token = draw.seed_token.clone().unwrap_or_default();
        let seed = DrawSeed::from_token(&seed_token).ok_or_else(|| {
            StdError::generic_err(format!("draw {draw_id} has an unreadable seed token"))
        })?;

        let mut stored: Vec<(u64, String, u32)> = self
            .repos
            .draws
            .winners_for_draw(cancel, draw_id)?
            .into_iter()
            .map(|w| (w.prize_tier_id, w.msisdn, w.selection_rank))
            .collect();
        stored.sort();
        // An unreproducible selection is a mismatch, not an error.
        let selection_matches = select_winners(&pool, &basis.tiers, &seed)
            .map(|selection| selection.fingerprint() == stored)
            .unwrap_or(false);

        Ok(DrawVerification {
            draw_id,
            seed_token,
            pool_matches: draw.pool_root.as_deref() == Some(recomputed_root.as_str()),
            recorded_root: draw.pool_root,
            recomputed_root,
            selection_matches,
        })
    }

    /// Merkle inclusion proof of `msisdn`'s weight range in a completed draw's pool.
    pub fn prove_entry(
        &self,
        cancel: &CancelSignal,
        draw_id: u64,
        msisdn: &str,
    ) -> EngineResult<EntryProof> {
        let draw = self.completed_draw(cancel, draw_id)?;
        let (pool, _) = self.replay_pool(cancel, &draw)?;
        let msisdn = normalize_msisdn(msisdn).unwrap_or_else(|| msisdn.to_string());

        let leaves = pool_leaves(&pool.entries);
        let root = hex::encode(merkle_root(&leaves));
        let root_matches_draw = draw.pool_root.as_deref() == Some(root.as_str());

        let mut proof = EntryProof {
            draw_id,
            msisdn,
            included: false,
            weight: 0,
            range_start: Uint128::zero(),
            range_end: Uint128::zero(),
            proof: vec![],
            root,
            root_matches_draw,
        };
        if let Some(index) = pool.entries.iter().position(|e| e.msisdn == proof.msisdn) {
            let (start, end) = cumulative_ranges(&pool.entries)[index];
            proof.included = true;
            proof.weight = pool.entries[index].weight;
            proof.range_start = Uint128::new(start);
            proof.range_end = Uint128::new(end);
            proof.proof = merkle_proof(&leaves, index)
                .unwrap_or_default()
                .iter()
                .map(hex::encode)
                .collect();
        }
        Ok(proof)
    }
}

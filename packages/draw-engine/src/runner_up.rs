use cosmwasm_std::Event;
use sweepstakes_common::{AuditAction, AuditRecord, DrawStatus, Winner, WinnerStatus};

use crate::error::{EngineError, EngineResult};
use crate::repository::{CallContext, DrawRepository, Forfeiture};

#[derive(Clone, Debug, PartialEq)]
pub struct PromotionOutcome {
    pub forfeited: Winner,
    pub promoted: Winner,
    pub audit: AuditRecord,
    pub events: Vec<Event>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PayoutOutcome {
    pub winner: Winner,
    pub audit: AuditRecord,
    pub events: Vec<Event>,
}

/// Walks a tier's backup order when a primary winner forfeits.
///
/// Per tier, winners only move forward: a runner-up becomes primary, a
/// primary becomes Forfeited or Paid. Nothing moves back.
pub struct RunnerUpChain<'a> {
    draws: &'a dyn DrawRepository,
}

impl<'a> RunnerUpChain<'a> {
    pub fn new(draws: &'a dyn DrawRepository) -> Self {
        RunnerUpChain { draws }
    }

    /// Forfeits `winner_id` and promotes the tier's lowest-ranked pending runner-up.
    ///
    /// With no runner-up left the forfeiture is still recorded and
    /// `RunnerUpExhausted` is returned.
    pub fn promote(
        &self,
        ctx: &CallContext,
        draw_id: u64,
        winner_id: u64,
        reason: &str,
    ) -> EngineResult<PromotionOutcome> {
        let cancel = &ctx.cancel;
        let winner = self
            .draws
            .winner(cancel, winner_id)?
            .filter(|w| w.draw_id == draw_id)
            .ok_or(EngineError::WinnerNotFound { winner_id })?;
        self.draws
            .draw(cancel, draw_id)?
            .filter(|d| d.status == DrawStatus::Completed)
            .ok_or(EngineError::WinnerNotFound { winner_id })?;

        match winner.status {
            WinnerStatus::PendingNotification => {}
            WinnerStatus::Forfeited => return Err(EngineError::AlreadyForfeited { winner_id }),
            from => {
                return Err(EngineError::InvalidWinnerTransition {
                    winner_id,
                    from,
                    to: WinnerStatus::Forfeited,
                })
            }
        }
        if winner.is_runner_up {
            return Err(EngineError::NotPrimaryWinner { winner_id });
        }

        let next = self
            .draws
            .winners_for_draw(cancel, draw_id)?
            .into_iter()
            .filter(|w| {
                w.prize_tier_id == winner.prize_tier_id
                    && w.is_runner_up
                    && w.status == WinnerStatus::PendingNotification
            })
            .min_by_key(|w| w.runner_up_rank);

        let summary = match &next {
            Some(runner_up) => format!(
                "winner {} ({}) forfeited: {}; runner-up {} ({}) promoted",
                winner.id, winner.msisdn, reason, runner_up.id, runner_up.msisdn
            ),
            None => format!(
                "winner {} ({}) forfeited: {}; no runner-up left",
                winner.id, winner.msisdn, reason
            ),
        };
        let audit = AuditRecord {
            id: 0,
            draw_id,
            action: AuditAction::RunnerUpInvoked {
                prize_tier_id: winner.prize_tier_id,
                forfeited_winner_id: winner.id,
                forfeited_msisdn: winner.msisdn.clone(),
                promoted_winner_id: next.as_ref().map(|w| w.id),
                promoted_msisdn: next.as_ref().map(|w| w.msisdn.clone()),
                reason: reason.to_string(),
            },
            actor: ctx.actor.to_string(),
            timestamp: ctx.now,
            summary,
        };

        let result = self.draws.apply_forfeiture(
            cancel,
            Forfeiture {
                winner_id,
                reason: reason.to_string(),
                promote_winner_id: next.map(|w| w.id),
                audit,
                at: ctx.now,
            },
        )?;

        let Some(promoted) = result.promoted else {
            return Err(EngineError::RunnerUpExhausted {
                draw_id,
                prize_tier_id: result.forfeited.prize_tier_id,
                forfeited_winner_id: winner_id,
            });
        };

        let event = Event::new("sweepstakes_runner_up_promoted")
            .add_attribute("draw_id", draw_id.to_string())
            .add_attribute("prize_tier_id", promoted.prize_tier_id.to_string())
            .add_attribute("forfeited_winner_id", result.forfeited.id.to_string())
            .add_attribute("promoted_winner_id", promoted.id.to_string())
            .add_attribute("promoted_selection_rank", promoted.selection_rank.to_string())
            .add_attribute("actor", ctx.actor.to_string())
            .add_attribute("audit_id", result.audit.id.to_string());

        Ok(PromotionOutcome {
            forfeited: result.forfeited,
            promoted,
            audit: result.audit,
            events: vec![event],
        })
    }

    /// `promote` with the draw looked up from the winner.
    pub fn invoke_runner_up(
        &self,
        ctx: &CallContext,
        winner_id: u64,
        reason: &str,
    ) -> EngineResult<PromotionOutcome> {
        let winner = self
            .draws
            .winner(&ctx.cancel, winner_id)?
            .ok_or(EngineError::WinnerNotFound { winner_id })?;
        self.promote(ctx, winner.draw_id, winner_id, reason)
    }

    /// Records that a primary winner has been paid out.
    pub fn mark_paid(&self, ctx: &CallContext, winner_id: u64) -> EngineResult<PayoutOutcome> {
        let winner = self
            .draws
            .winner(&ctx.cancel, winner_id)?
            .ok_or(EngineError::WinnerNotFound { winner_id })?;
        let audit = AuditRecord {
            id: 0,
            draw_id: winner.draw_id,
            action: AuditAction::WinnerPaid {
                winner_id,
                msisdn: winner.msisdn.clone(),
            },
            actor: ctx.actor.to_string(),
            timestamp: ctx.now,
            summary: format!("winner {} ({}) paid", winner_id, winner.msisdn),
        };

        let (winner, audit) = self.draws.mark_paid(&ctx.cancel, winner_id, audit, ctx.now)?;
        let event = Event::new("sweepstakes_winner_paid")
            .add_attribute("draw_id", winner.draw_id.to_string())
            .add_attribute("winner_id", winner.id.to_string())
            .add_attribute("prize_tier_id", winner.prize_tier_id.to_string())
            .add_attribute("actor", ctx.actor.to_string());

        Ok(PayoutOutcome {
            winner,
            audit,
            events: vec![event],
        })
    }
}

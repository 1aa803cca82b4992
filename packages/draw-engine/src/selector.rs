use cosmwasm_schema::cw_serde;
use sweepstakes_common::{DrawSeed, EligibilityPool, PrizeTier, TierOutcome};

use crate::error::{EngineError, EngineResult};
use crate::repository::NewWinner;

/// One pick within a tier. Rank 0 is a primary winner; 1.. is the runner-up order.
#[cw_serde]
pub struct SelectionResult {
    pub msisdn: String,
    pub rank: u32,
}

#[cw_serde]
pub struct TierSelection {
    pub prize_tier_id: u64,
    pub quantity: u32,
    pub runner_ups_requested: u32,
    /// Primaries first, then runner-ups in rank order.
    pub picks: Vec<SelectionResult>,
}

impl TierSelection {
    pub fn outcome(&self) -> TierOutcome {
        let winners_selected = self.picks.iter().filter(|p| p.rank == 0).count() as u32;
        TierOutcome {
            prize_tier_id: self.prize_tier_id,
            quantity: self.quantity,
            winners_selected,
            runner_ups_requested: self.runner_ups_requested,
            runner_ups_selected: self.picks.len() as u32 - winners_selected,
        }
    }
}

/// Result of a full draw, tiers in the order they were drawn.
#[cw_serde]
pub struct Selection {
    pub tiers: Vec<TierSelection>,
}

impl Selection {
    pub fn outcomes(&self) -> Vec<TierOutcome> {
        self.tiers.iter().map(TierSelection::outcome).collect()
    }

    /// `(prize_tier_id, msisdn, rank)` for every pick, sorted.
    pub fn fingerprint(&self) -> Vec<(u64, String, u32)> {
        let mut rows: Vec<(u64, String, u32)> = self
            .tiers
            .iter()
            .flat_map(|tier| {
                tier.picks
                    .iter()
                    .map(move |p| (tier.prize_tier_id, p.msisdn.clone(), p.rank))
            })
            .collect();
        rows.sort();
        rows
    }

    pub fn into_new_winners(self) -> Vec<NewWinner> {
        self.tiers
            .into_iter()
            .flat_map(|tier| {
                let prize_tier_id = tier.prize_tier_id;
                tier.picks.into_iter().map(move |p| NewWinner {
                    msisdn: p.msisdn,
                    prize_tier_id,
                    runner_up_rank: p.rank,
                })
            })
            .collect()
    }
}

/// Prefix sums over entry weights with O(log n) removal and lookup.
struct FenwickTree {
    // 1-indexed; tree[0] unused
    tree: Vec<u64>,
}

impl FenwickTree {
    fn from_weights(weights: &[u64]) -> Self {
        let n = weights.len();
        let mut tree = vec![0u64; n + 1];
        for i in 1..=n {
            tree[i] += weights[i - 1];
            let parent = i + (i & i.wrapping_neg());
            if parent <= n {
                tree[parent] += tree[i];
            }
        }
        FenwickTree { tree }
    }

    fn len(&self) -> usize {
        self.tree.len() - 1
    }

    fn subtract(&mut self, index: usize, weight: u64) {
        let mut i = index + 1;
        while i <= self.len() {
            self.tree[i] -= weight;
            i += i & i.wrapping_neg();
        }
    }

    /// Smallest 0-based index whose inclusive prefix sum exceeds `target`.
    fn find(&self, target: u64) -> usize {
        let n = self.len();
        let mut pos = 0usize;
        let mut remaining = target;
        let mut step = if n == 0 { 0 } else { 1usize << (usize::BITS - 1 - n.leading_zeros()) };
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                pos = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        pos
    }
}

/// Weighted sampling without replacement across all tiers of a draw.
///
/// Tiers are drawn in `(rank, id)` order from one seed stream; a participant
/// picked in any tier is removed for the rest of the draw. Each pick lands on
/// an entry with probability proportional to its weight among those left.
pub fn select_winners(
    pool: &EligibilityPool,
    tiers: &[PrizeTier],
    seed: &DrawSeed,
) -> EngineResult<Selection> {
    let mut weights: Vec<u64> = pool.entries.iter().map(|e| e.weight).collect();
    let mut remaining_weight = pool.entries.iter().try_fold(0u64, |acc, entry| {
        acc.checked_add(entry.weight)
            .ok_or_else(|| EngineError::WeightOverflow {
                msisdn: entry.msisdn.clone(),
            })
    })?;
    let mut remaining_entries = weights.iter().filter(|w| **w > 0).count();
    let mut tree = FenwickTree::from_weights(&weights);
    let mut stream = seed.stream();

    let mut ordered: Vec<&PrizeTier> = tiers.iter().collect();
    ordered.sort_by_key(|t| (t.rank, t.id));

    let mut selection = Selection { tiers: Vec::with_capacity(ordered.len()) };
    for tier in ordered {
        if remaining_entries < tier.quantity as usize {
            return Err(EngineError::InsufficientEligiblePool {
                prize_tier_id: tier.id,
                required: tier.quantity,
                available: remaining_entries,
            });
        }

        let wanted = tier.picks_required();
        let mut picks = Vec::new();
        // A short runner-up list is fine; primaries were checked above.
        while (picks.len() as u64) < wanted && remaining_weight > 0 {
            let index = tree.find(stream.next_below(remaining_weight));
            let weight = weights[index];
            tree.subtract(index, weight);
            weights[index] = 0;
            remaining_weight -= weight;
            remaining_entries -= 1;

            let position = picks.len() as u32;
            let rank = if position < tier.quantity {
                0
            } else {
                position - tier.quantity + 1
            };
            picks.push(SelectionResult {
                msisdn: pool.entries[index].msisdn.clone(),
                rank,
            });
        }

        selection.tiers.push(TierSelection {
            prize_tier_id: tier.id,
            quantity: tier.quantity,
            runner_ups_requested: tier.number_of_runner_ups,
            picks,
        });
    }
    Ok(selection)
}

use derive_getters::Getters;
use derive_more::Constructor;
use eyre::{ensure, Result};
use stopmap_io_rs::reactivity::{MutationColumns, Row};

use crate::counters::Counters;
use crate::target::Target;

fn ratio(count: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| count as f64 / total as f64)
}

/// Mutation counts of one channel, both indexed by 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Constructor)]
pub struct MutationCounts {
    pub mutations: Vec<u64>,
    /// Mutations dropped for low base quality. Their pairs leave the depth at that position.
    pub removed: Vec<u64>,
}

/// Mutation rates on top of the stop-based profile.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct MutationProfile {
    /// Mutation counts by 1-based position, entry 0 is unused
    treated: Vec<u64>,
    untreated: Vec<u64>,
    mu: Vec<f64>,
    /// `beta + mu`
    r: Vec<f64>,
    /// Stop-based `c` plus the mutation term, 0 when any `mu` reaches 1
    c: f64,
}

/// Reactivities of one target for one reverse transcription start.
///
/// `treated[k]`/`untreated[k]` count the fragments starting at offset `k`. `beta[k]` is the
/// probability that a treated fragment stopped at `k` because of a modification, `theta[k]` the
/// normalized fraction of modifications at `k`, and `c` the mean number of modifications per
/// molecule.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Profile {
    target: usize,
    end: usize,
    treated: Vec<u64>,
    untreated: Vec<u64>,
    beta: Vec<f64>,
    theta: Vec<f64>,
    c: f64,
    mutations: Option<MutationProfile>,
}

impl Profile {
    pub fn new(target: usize, end: usize, treated: Vec<u64>, untreated: Vec<u64>) -> Result<Self> {
        ensure!(
            treated.len() == untreated.len(),
            "Treated and untreated counts must have the same length, got {} and {}",
            treated.len(),
            untreated.len()
        );

        let n = treated.len();
        let (mut beta, mut theta) = (vec![0.0; n], vec![0.0; n]);
        let (mut treated_sum, mut untreated_sum) = (0, 0);
        let mut c = 0.0;
        for k in 0..n {
            treated_sum += treated[k];
            untreated_sum += untreated[k];

            let (Some(xbit), Some(ybit)) = (
                ratio(treated[k], treated_sum),
                ratio(untreated[k], untreated_sum),
            ) else {
                continue;
            };
            // Every molecule stopped here, the logs are undefined
            if xbit >= 1.0 || ybit >= 1.0 {
                continue;
            }

            beta[k] = ((xbit - ybit) / (1.0 - ybit)).max(0.0);
            theta[k] = (1.0 - ybit).ln() - (1.0 - xbit).ln();
            if beta[k] > 0.0 {
                c -= (1.0 - beta[k]).ln();
            }
        }

        for x in theta.iter_mut() {
            *x = if c > 0.0 { (*x / c).max(0.0) } else { 0.0 };
        }

        Ok(Self {
            target,
            end,
            treated,
            untreated,
            beta,
            theta,
            c,
            mutations: None,
        })
    }

    /// Profile of the treated (mask 0) and untreated (mask 1) channels for the given start. It
    /// covers sites `0..end`.
    pub fn from_counters(counters: &Counters, target: &Target, end: usize) -> Result<Self> {
        ensure!(
            end <= target.len(),
            "RT start {end} is past the end of {}",
            target.name()
        );
        let id = *target.id();
        Self::new(
            id,
            end,
            counters.stops(id, 0, end, end),
            counters.stops(id, 1, end, end),
        )
    }

    /// Attach mutation rates of both channels.
    pub fn with_mutations(
        mut self,
        treated: MutationCounts,
        untreated: MutationCounts,
    ) -> Result<Self> {
        let n = self.treated.len();
        ensure!(
            [&treated, &untreated]
                .iter()
                .all(|x| x.mutations.len() == n && x.removed.len() == n),
            "Mutation counts must cover {n} positions"
        );

        let (mut mu, mut r) = (vec![0.0; n], vec![0.0; n]);
        let (mut treated_depth, mut untreated_depth) = (0, 0);
        let mut c = 0.0;
        let mut saturated = false;
        for k in 0..n {
            treated_depth += self.treated[k].saturating_sub(treated.removed[k]);
            untreated_depth += self.untreated[k].saturating_sub(untreated.removed[k]);

            if let (Some(tbit), Some(ubit)) = (
                ratio(treated.mutations[k], treated_depth),
                ratio(untreated.mutations[k], untreated_depth),
            ) {
                if ubit < 1.0 {
                    mu[k] = ((tbit - ubit) / (1.0 - ubit)).max(0.0);
                }
            }
            r[k] = self.beta[k] + mu[k];

            if mu[k] >= 1.0 {
                saturated = true;
            } else if mu[k] > 0.0 {
                c -= (1.0 - mu[k]).ln();
            }
        }

        self.mutations = Some(MutationProfile {
            treated: treated.mutations,
            untreated: untreated.mutations,
            mu,
            r,
            c: if saturated { 0.0 } else { self.c + c },
        });
        Ok(self)
    }

    /// `c` of the tables: the combined one when mutations are counted.
    pub fn reported_c(&self) -> f64 {
        self.mutations.as_ref().map_or(self.c, |x| x.c)
    }

    pub fn from_counters_with_mutations(
        counters: &Counters,
        target: &Target,
        end: usize,
    ) -> Result<Self> {
        let id = *target.id();
        let channel = |mask| {
            MutationCounts::new(
                counters.mutation_counts(id, mask, end, end),
                counters.removed_mutation_counts(id, mask, end, end),
            )
        };
        Self::from_counters(counters, target, end)?.with_mutations(channel(0), channel(1))
    }

    /// One table row per site. Row `k` describes the nucleotide preceding site `k`.
    pub fn rows(&self, target: &Target) -> Vec<Row> {
        let seq = target.seq();
        (0..self.treated.len())
            .map(|k| {
                let mutations = self.mutations.as_ref().map(|m| {
                    MutationColumns::new(m.treated[k], m.untreated[k], m.mu[k], m.r[k])
                });
                Row::new(
                    target.name().clone(),
                    self.end as u32,
                    k as u32,
                    k.checked_sub(1).map(|i| seq[i]),
                    self.treated[k],
                    self.untreated[k],
                    (k > 0).then_some(self.beta[k]),
                    (k > 0).then_some(self.theta[k]),
                    self.reported_c(),
                    mutations,
                )
            })
            .collect()
    }
}

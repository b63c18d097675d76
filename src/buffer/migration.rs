//! Tier-migration policy: on every tier miss, independently draw a uniform
//! random value against the relevant probability from `{Dr, Dw, Nr, Nw}`
//! and decide whether to copy the page one tier closer to DRAM.

use crate::common::Tier;
use crate::config::MigrationProbabilities;
use rand::Rng;

/// What the buffer manager should do after a miss, worked out from the
/// tier the page was found on and the access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationDecision {
    /// Copy the page up into NVM (only meaningful for an SSD-sourced miss).
    pub copy_to_nvm: bool,
    /// Copy the page up into DRAM.
    pub copy_to_dram: bool,
}

pub struct MigrationPolicy {
    probs: MigrationProbabilities,
}

impl MigrationPolicy {
    pub fn new(probs: MigrationProbabilities) -> Self {
        Self { probs }
    }

    fn draw(&self, probability: f64) -> bool {
        rand::rng().random::<f64>() < probability
    }

    /// Decide what to do after a miss that was ultimately serviced from
    /// `source_tier`, for the given access `is_write`.
    ///
    /// HyMem mode is handled by the caller: when `enable_hymem` is set, an
    /// SSD read/write only reaches this function's `copy_to_nvm` path after
    /// the admission set has already confirmed a second touch, and DRAM
    /// demotion is governed by the replacement policy rather than these
    /// probabilities — this function is only consulted for the upward
    /// (promotion) decisions in that mode, same as the non-HyMem case.
    pub fn decide(&self, source_tier: Tier, is_write: bool) -> MigrationDecision {
        match source_tier {
            Tier::Ssd => {
                let nvm_prob = if is_write {
                    self.probs.nvm_write_prob
                } else {
                    self.probs.nvm_read_prob
                };
                let copy_to_nvm = self.draw(nvm_prob);
                let dram_prob = if is_write {
                    self.probs.dram_write_prob
                } else {
                    self.probs.dram_read_prob
                };
                // Promotion to DRAM is only attempted once the page has a
                // copy in NVM to promote from, matching the SSD→NVM→DRAM
                // chain in the migration table.
                let copy_to_dram = copy_to_nvm && self.draw(dram_prob);
                MigrationDecision {
                    copy_to_nvm,
                    copy_to_dram,
                }
            }
            // `DramMid` is `DramDramSsd` mode's second DRAM tier acting as
            // the middle tier; it is promoted to the top tier exactly like
            // an NVM middle tier, by the same Dr/Dw draw.
            Tier::Nvm | Tier::DramMid => {
                let dram_prob = if is_write {
                    self.probs.dram_write_prob
                } else {
                    self.probs.dram_read_prob
                };
                MigrationDecision {
                    copy_to_nvm: false,
                    copy_to_dram: self.draw(dram_prob),
                }
            }
            Tier::Dram => MigrationDecision {
                copy_to_nvm: false,
                copy_to_dram: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_probabilities_never_migrate() {
        let policy = MigrationPolicy::new(MigrationProbabilities {
            dram_read_prob: 0.0,
            dram_write_prob: 0.0,
            nvm_read_prob: 0.0,
            nvm_write_prob: 0.0,
        });
        for _ in 0..50 {
            let d = policy.decide(Tier::Ssd, false);
            assert!(!d.copy_to_nvm && !d.copy_to_dram);
        }
    }

    #[test]
    fn certain_probabilities_always_migrate() {
        let policy = MigrationPolicy::new(MigrationProbabilities {
            dram_read_prob: 1.0,
            dram_write_prob: 1.0,
            nvm_read_prob: 1.0,
            nvm_write_prob: 1.0,
        });
        for _ in 0..50 {
            let d = policy.decide(Tier::Ssd, false);
            assert!(d.copy_to_nvm && d.copy_to_dram);
        }
    }

    #[test]
    fn dram_tier_never_migrates_further() {
        let policy = MigrationPolicy::new(MigrationProbabilities {
            dram_read_prob: 1.0,
            dram_write_prob: 1.0,
            nvm_read_prob: 1.0,
            nvm_write_prob: 1.0,
        });
        let d = policy.decide(Tier::Dram, false);
        assert!(!d.copy_to_nvm && !d.copy_to_dram);
    }
}

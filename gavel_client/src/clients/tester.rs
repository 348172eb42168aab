//! Scripted scenario client: bids against a fresh auction, pauses so the
//! primary can be killed by hand, then keeps bidding through failover.

use std::io::{self, Write};

use color_print::cprintln;

use serde::Deserialize;

use tokio::time::{self, Duration};

use gavel::{
    logged_err, parsed_config, pf_error, Amount, FailoverClient, GavelError,
    Outcome,
};

/// One scripted bid and the outcome it must get.
struct Step {
    bidder_id: &'static str,
    amount: Amount,
    expect: Outcome,
}

/// Bids issued while the primary is up.
const BEFORE_CRASH: &[Step] = &[
    Step { bidder_id: "Alice", amount: 100, expect: Outcome::Success },
    Step { bidder_id: "Bob", amount: 150, expect: Outcome::Success },
    Step { bidder_id: "Frank", amount: 0, expect: Outcome::Exception },
    Step { bidder_id: "David", amount: 150, expect: Outcome::Fail },
    Step { bidder_id: "Charlie", amount: 200, expect: Outcome::Success },
    Step { bidder_id: "Mallory", amount: -10, expect: Outcome::Exception },
    Step { bidder_id: "Bob", amount: 120, expect: Outcome::Fail },
    Step { bidder_id: "Charlie", amount: 210, expect: Outcome::Success },
];

/// Bids issued after the pause; served by whichever node is primary then.
const AFTER_CRASH: &[Step] = &[
    Step { bidder_id: "David", amount: 250, expect: Outcome::Success },
    Step { bidder_id: "Eve", amount: 300, expect: Outcome::Success },
    Step { bidder_id: "David", amount: 280, expect: Outcome::Fail },
];

/// Mode parameters struct.
#[derive(Debug, Deserialize)]
pub struct ModeParamsTester {
    /// Gap between consecutive bids in millisecs.
    pub step_gap_ms: u64,

    /// Seconds to pause before post-crash bids; 0 means wait for Enter.
    pub pause_secs: u64,

    /// Whether to continue upon a mismatched outcome.
    pub keep_going: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for ModeParamsTester {
    fn default() -> Self {
        ModeParamsTester {
            step_gap_ms: 500,
            pause_secs: 0,
            keep_going: false,
        }
    }
}

/// Scenario testing client struct.
pub struct ClientTester {
    /// Failover client to the auction service.
    client: FailoverClient,

    /// Mode parameters struct.
    params: ModeParamsTester,
}

impl ClientTester {
    /// Creates a new testing client.
    pub fn new(
        client: FailoverClient,
        params_str: Option<&str>,
    ) -> Result<Self, GavelError> {
        let params = parsed_config!(params_str => ModeParamsTester;
                                    step_gap_ms, pause_secs, keep_going)?;
        Ok(ClientTester { client, params })
    }

    /// Runs a list of steps, returning the number of mismatches.
    async fn run_steps(&mut self, steps: &[Step]) -> Result<usize, GavelError> {
        let mut mismatches = 0;
        for step in steps {
            let response = self
                .client
                .place_bid(step.bidder_id, step.amount)
                .await?;
            if response.outcome == step.expect {
                cprintln!(
                    "<bright-green>✓</> {} bid {}: {:?} ({})",
                    step.bidder_id,
                    step.amount,
                    response.outcome,
                    response.message
                );
            } else {
                cprintln!(
                    "<bright-red>✗</> {} bid {}: {:?} ({}), expected {:?}",
                    step.bidder_id,
                    step.amount,
                    response.outcome,
                    response.message,
                    step.expect
                );
                mismatches += 1;
                if !self.params.keep_going {
                    return Ok(mismatches);
                }
            }
            time::sleep(Duration::from_millis(self.params.step_gap_ms)).await;
        }
        Ok(mismatches)
    }

    /// Gives the operator time to kill the primary.
    async fn pause_for_crash(&self) -> Result<(), GavelError> {
        if self.params.pause_secs > 0 {
            println!(
                "\nKill the primary now, resuming in {} secs",
                self.params.pause_secs
            );
            time::sleep(Duration::from_secs(self.params.pause_secs)).await;
        } else {
            println!("\nKill the primary now, then press Enter");
            io::stdout().flush()?;
            let mut line = String::new();
            tokio::task::spawn_blocking(move || {
                io::stdin().read_line(&mut line)
            })
            .await??;
        }
        Ok(())
    }

    /// Runs the whole scenario.
    pub async fn run(&mut self) -> Result<(), GavelError> {
        let mut mismatches = self.run_steps(BEFORE_CRASH).await?;
        if mismatches > 0 && !self.params.keep_going {
            return logged_err!("scenario stopped before crash phase");
        }

        self.pause_for_crash().await?;
        mismatches += self.run_steps(AFTER_CRASH).await?;

        let result = self.client.get_result().await?;
        cprintln!(
            "<bright-blue>#</> winner {} with {} ({:?})",
            result.highest_bidder_id,
            result.highest_amount,
            result.status
        );
        if result.highest_bidder_id != "Eve" || result.highest_amount != 300 {
            pf_error!("unexpected final result {:?}", result);
            mismatches += 1;
        }

        if mismatches > 0 {
            logged_err!("{} step(s) did not match", mismatches)
        } else {
            cprintln!("<bright-green>✓</> scenario passed");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tester_tests {
    use super::*;

    #[test]
    fn scenario_consistent() {
        // accepted amounts are strictly increasing across the whole script
        let accepted: Vec<Amount> = BEFORE_CRASH
            .iter()
            .chain(AFTER_CRASH.iter())
            .filter(|s| s.expect == Outcome::Success)
            .map(|s| s.amount)
            .collect();
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(accepted.last(), Some(&300));
    }

    #[test]
    fn scenario_covers_edges() {
        let all = || BEFORE_CRASH.iter().chain(AFTER_CRASH.iter());
        // zero amount is malformed
        assert!(all().any(|s| s.amount == 0 && s.expect == Outcome::Exception));
        // tie with the current highest loses
        let mut highest = 0;
        let mut saw_tie = false;
        for step in all() {
            if step.amount == highest && step.expect == Outcome::Fail {
                saw_tie = true;
            }
            if step.expect == Outcome::Success {
                highest = step.amount;
            }
        }
        assert!(saw_tie);
    }
}

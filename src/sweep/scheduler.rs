//! Sweep scheduler: drives every angle set to completion on one thread of
//! control, overlapping communication of some sets with execution of others.
//!
//! Each pass over the rule list advances every unfinished set without
//! blocking and executes those that became ready. After all sets are done
//! the ranks synchronise, lagged data is received and committed, and the
//! sets are rearmed for the next sweep.

use std::time::Instant;

use itertools::Itertools;

use super::aggregation::AngleAggregation;
use super::angle_set::AngleSetStatus;
use super::boundary::BoundaryMap;
use super::kernel::SweepChunk;
use crate::algs::communicator::{Communicator, Wait};
use crate::config::{SchedulingAlgorithm, SweepOptions};
use crate::sweep_error::SweepError;
use crate::topology::SweepGrid;

/// Counters of one sweep on this rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub angle_sets_executed: usize,
    pub cells_solved: usize,
    pub messages_sent: usize,
    pub messages_received: usize,
}

/// Priority of one angle set under depth-of-graph scheduling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct RuleValues {
    set_id: usize,
    depth_of_graph: usize,
    sign_x: bool,
    sign_y: bool,
    sign_z: bool,
}

#[derive(Clone, Debug)]
pub struct SweepScheduler {
    algorithm: SchedulingAlgorithm,
    order: Vec<usize>,
    stall_timeout_ms: Option<u64>,
}

impl SweepScheduler {
    pub fn new(aggregation: &AngleAggregation, options: &SweepOptions) -> Self {
        let rules: Vec<RuleValues> = aggregation
            .angle_set_groups()
            .iter()
            .flat_map(|g| g.angle_sets())
            .map(|set| {
                let omega = set.omega();
                RuleValues {
                    set_id: set.id(),
                    depth_of_graph: set.plan().locations().depth_of_graph(),
                    sign_x: omega.x >= 0.0,
                    sign_y: omega.y >= 0.0,
                    sign_z: omega.z >= 0.0,
                }
            })
            .collect();

        let order = match options.scheduling {
            SchedulingAlgorithm::FirstIn => rules.iter().map(|r| r.set_id).sorted().collect(),
            // deepest first; ties by non-negative ωx, then ωy, then ωz first
            SchedulingAlgorithm::DepthOfGraph => rules
                .iter()
                .sorted_by_key(|r| {
                    (
                        std::cmp::Reverse(r.depth_of_graph),
                        !r.sign_x,
                        !r.sign_y,
                        !r.sign_z,
                    )
                })
                .map(|r| r.set_id)
                .collect(),
        };
        Self {
            algorithm: options.scheduling,
            order,
            stall_timeout_ms: options.stall_timeout_ms,
        }
    }

    pub fn algorithm(&self) -> SchedulingAlgorithm {
        self.algorithm
    }

    /// Angle set ids in the order they are offered execution.
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    fn check_stall(&self, since: Instant, pending: usize) -> Result<(), SweepError> {
        match self.stall_timeout_ms {
            Some(limit) if since.elapsed().as_millis() > u128::from(limit) => {
                let elapsed_ms = since.elapsed().as_millis();
                log::error!("sweep made no progress for {elapsed_ms} ms with {pending} angle set(s) pending");
                Err(SweepError::Stalled {
                    pending,
                    elapsed_ms,
                })
            }
            _ => Ok(()),
        }
    }

    /// Sweep every angle set once. Collective over `comm`.
    pub fn sweep<G, C, K>(
        &self,
        aggregation: &mut AngleAggregation,
        grid: &G,
        comm: &C,
        kernel: &mut K,
        boundaries: &BoundaryMap,
    ) -> Result<SweepReport, SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
        K: SweepChunk + ?Sized,
    {
        let start = Instant::now();
        let mut report = SweepReport::default();
        let mut sends = Vec::new();
        let result = self.execute_all(aggregation, grid, comm, kernel, boundaries, &mut report, &mut sends);

        // Sends are drained even when a set failed.
        let result = result.and_then(|()| {
            comm.barrier();
            self.receive_delayed(aggregation, comm, &mut report)
        });
        for s in sends {
            let _ = s.wait();
        }
        result?;

        for set in aggregation.angle_sets_mut() {
            set.finish_sweep();
        }
        boundaries.finish_sweep();
        log::info!(
            "[rank {}] sweep: {} angle sets, {} cell solves, {} sent / {} received messages in {:.3} s",
            comm.rank(),
            report.angle_sets_executed,
            report.cells_solved,
            report.messages_sent,
            report.messages_received,
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_all<G, C, K>(
        &self,
        aggregation: &mut AngleAggregation,
        grid: &G,
        comm: &C,
        kernel: &mut K,
        boundaries: &BoundaryMap,
        report: &mut SweepReport,
        sends: &mut Vec<C::SendHandle>,
    ) -> Result<(), SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
        K: SweepChunk + ?Sized,
    {
        let mut last_progress = Instant::now();
        loop {
            let mut pending = 0;
            let mut progressed = false;
            for &id in &self.order {
                let Some(set) = aggregation.angle_set_mut(id) else {
                    continue;
                };
                let (status, received) = set.advance(comm)?;
                report.messages_received += received;
                progressed |= received > 0;
                if status == AngleSetStatus::Ready {
                    let exec = set.execute(grid, comm, kernel, boundaries)?;
                    report.angle_sets_executed += 1;
                    report.cells_solved += exec.cells_solved;
                    report.messages_sent += exec.sends.len();
                    sends.extend(exec.sends);
                    progressed = true;
                }
                if set.status() != AngleSetStatus::Done {
                    pending += 1;
                }
            }
            if pending == 0 {
                return Ok(());
            }
            if progressed {
                last_progress = Instant::now();
            } else {
                self.check_stall(last_progress, pending)?;
                std::thread::yield_now();
            }
        }
    }

    fn receive_delayed<C: Communicator>(
        &self,
        aggregation: &mut AngleAggregation,
        comm: &C,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        let mut last_progress = Instant::now();
        loop {
            let mut pending = 0;
            for set in aggregation.angle_sets_mut() {
                let received = set.receive_delayed(comm)?;
                report.messages_received += received;
                if received > 0 {
                    last_progress = Instant::now();
                }
                if !set.delayed_complete() {
                    pending += 1;
                }
            }
            if pending == 0 {
                return Ok(());
            }
            self.check_stall(last_progress, pending)?;
            std::thread::yield_now();
        }
    }
}

//! Rank-level task dependency graph for one sweep ordering.
//!
//! Each rank knows which ranks it depends on for a direction. Those lists are
//! all-gathered so every rank builds the same global graph, breaks its
//! cycles the same way and derives the same levels. A removed edge `r → l`
//! turns into a delayed dependency on `l` and a delayed successor on `r`:
//! data still flows along it, but it is consumed one sweep late.

use std::collections::BTreeSet;

use super::ordering::SweepOrdering;
use crate::algs::communicator::{Communicator, ExchangeTags};
use crate::algs::digraph::DirectedGraph;
use crate::algs::exchange::all_gather_u32;
use crate::sweep_error::SweepError;

/// Where an upstream rank sits in this rank's predecessor lists.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predecessor {
    /// Index into `location_dependencies` (prelocI).
    Regular(usize),
    /// Index into `delayed_location_dependencies` (delayed prelocI).
    Delayed(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationGraph {
    rank: usize,
    location_dependencies: Vec<usize>,
    delayed_location_dependencies: Vec<usize>,
    location_successors: Vec<usize>,
    delayed_location_successors: Vec<usize>,
    levels: Vec<usize>,
    sweep_planes: Vec<Vec<usize>>,
}

impl LocationGraph {
    /// Graph of a single rank with no neighbours.
    pub fn serial(rank: usize) -> Self {
        Self {
            rank,
            location_dependencies: Vec::new(),
            delayed_location_dependencies: Vec::new(),
            location_successors: Vec::new(),
            delayed_location_successors: Vec::new(),
            levels: vec![0; rank + 1],
            sweep_planes: vec![vec![rank]],
        }
    }

    /// All-gather the location dependencies of `ordering` and build the graph.
    pub fn build<C: Communicator>(
        ordering: &SweepOrdering,
        comm: &C,
        tags: ExchangeTags,
        allow_cycles: bool,
    ) -> Result<Self, SweepError> {
        if comm.size() <= 1 {
            return Ok(Self::serial(comm.rank()));
        }
        let mine: Vec<u32> = ordering
            .location_dependencies()
            .iter()
            .map(|&r| r as u32)
            .collect();
        let global: Vec<Vec<usize>> = all_gather_u32(comm, tags, &mine)?
            .into_iter()
            .map(|deps| deps.into_iter().map(|r| r as usize).collect())
            .collect();
        let graph = Self::from_global_dependencies(comm.rank(), &global, allow_cycles)?;
        if graph.location_successors.as_slice() != ordering.location_successors() {
            log::warn!(
                "[rank {}] local successors {:?} disagree with the global graph {:?}",
                comm.rank(),
                ordering.location_successors(),
                graph.location_successors
            );
        }
        Ok(graph)
    }

    /// Build from every rank's dependency list (`global_deps[r]` = ranks `r`
    /// depends on). Pure and deterministic.
    pub fn from_global_dependencies(
        rank: usize,
        global_deps: &[Vec<usize>],
        allow_cycles: bool,
    ) -> Result<Self, SweepError> {
        let n = global_deps.len();
        if rank >= n {
            return Err(SweepError::UnknownPartition { rank, partition: rank });
        }
        let mut graph = DirectedGraph::new(n);
        for (loc, deps) in global_deps.iter().enumerate() {
            for &d in deps {
                if d >= n {
                    return Err(SweepError::UnknownPartition { rank: loc, partition: d });
                }
                graph.add_edge(d, loc);
            }
        }

        let removed = if graph.topological_order().is_some() {
            Vec::new()
        } else if allow_cycles {
            graph.remove_cycles()
        } else {
            let edges = graph.clone().remove_cycles().len();
            log::error!("[rank {rank}] rank-level sweep graph has cycles ({edges} edge(s))");
            return Err(SweepError::CyclesNotAllowed { edges });
        };

        let mut deps: BTreeSet<usize> = global_deps[rank].iter().copied().collect();
        let mut delayed_deps = BTreeSet::new();
        let mut delayed_succs = BTreeSet::new();
        for &(r, l) in &removed {
            if l == rank {
                deps.remove(&r);
                delayed_deps.insert(r);
            }
            if r == rank {
                delayed_succs.insert(l);
            }
        }
        let successors: Vec<usize> = (0..n)
            .filter(|&l| l != rank && global_deps[l].contains(&rank))
            .collect();

        let levels = graph
            .levels()
            .ok_or(SweepError::UnbreakableCycle { remaining: n })?;
        let num_levels = levels.iter().max().map_or(0, |m| m + 1);
        let mut sweep_planes = vec![Vec::new(); num_levels];
        for (loc, &lvl) in levels.iter().enumerate() {
            sweep_planes[lvl].push(loc);
        }
        if !removed.is_empty() {
            log::debug!("[rank {rank}] lagged rank-level dependencies: {removed:?}");
        }

        Ok(Self {
            rank,
            location_dependencies: deps.into_iter().collect(),
            delayed_location_dependencies: delayed_deps.into_iter().collect(),
            location_successors: successors,
            delayed_location_successors: delayed_succs.into_iter().collect(),
            levels,
            sweep_planes,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Non-delayed upstream ranks (prelocI order).
    pub fn location_dependencies(&self) -> &[usize] {
        &self.location_dependencies
    }

    /// Upstream ranks whose data is lagged one sweep (delayed prelocI order).
    pub fn delayed_location_dependencies(&self) -> &[usize] {
        &self.delayed_location_dependencies
    }

    /// Every downstream rank, delayed or not (deplocI order).
    pub fn location_successors(&self) -> &[usize] {
        &self.location_successors
    }

    /// Downstream ranks that receive this rank's data one sweep late.
    pub fn delayed_location_successors(&self) -> &[usize] {
        &self.delayed_location_successors
    }

    /// Ranks grouped by level of the acyclic global graph.
    pub fn sweep_planes(&self) -> &[Vec<usize>] {
        &self.sweep_planes
    }

    pub fn num_levels(&self) -> usize {
        self.sweep_planes.len()
    }

    /// Levels remaining below and including this rank.
    pub fn depth_of_graph(&self) -> usize {
        self.num_levels() - self.levels[self.rank]
    }

    pub fn map_predecessor(&self, rank: usize) -> Result<Predecessor, SweepError> {
        if let Some(i) = self.location_dependencies.iter().position(|&r| r == rank) {
            return Ok(Predecessor::Regular(i));
        }
        if let Some(i) = self
            .delayed_location_dependencies
            .iter()
            .position(|&r| r == rank)
        {
            return Ok(Predecessor::Delayed(i));
        }
        Err(SweepError::UnknownPartition {
            rank: self.rank,
            partition: rank,
        })
    }

    pub fn map_successor(&self, rank: usize) -> Result<usize, SweepError> {
        self.location_successors
            .iter()
            .position(|&r| r == rank)
            .ok_or(SweepError::UnknownPartition {
                rank: self.rank,
                partition: rank,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_of_three_ranks() {
        let global = vec![vec![], vec![0], vec![1]];
        let g = LocationGraph::from_global_dependencies(1, &global, false).unwrap();
        assert_eq!(g.location_dependencies(), &[0]);
        assert_eq!(g.location_successors(), &[2]);
        assert_eq!(g.sweep_planes(), &[vec![0], vec![1], vec![2]]);
        assert_eq!(g.depth_of_graph(), 2);
        assert_eq!(g.map_predecessor(0).unwrap(), Predecessor::Regular(0));
        assert!(g.map_predecessor(2).is_err());
    }

    #[test]
    fn two_rank_cycle_lagged_on_one_side() {
        let global = vec![vec![1], vec![0]];
        let g0 = LocationGraph::from_global_dependencies(0, &global, true).unwrap();
        let g1 = LocationGraph::from_global_dependencies(1, &global, true).unwrap();
        // edge 0 -> 1 is removed: rank 1 lags rank 0, rank 0 sends late
        assert_eq!(g1.delayed_location_dependencies(), &[0]);
        assert!(g1.location_dependencies().is_empty());
        assert_eq!(g0.delayed_location_successors(), &[1]);
        assert_eq!(g0.location_successors(), &[1]);
        assert_eq!(g0.location_dependencies(), &[1]);
        assert_eq!(g1.map_predecessor(0).unwrap(), Predecessor::Delayed(0));
        assert_eq!(g0.num_levels(), 2);
    }

    #[test]
    fn cycles_rejected_when_not_allowed() {
        let global = vec![vec![1], vec![0]];
        let err = LocationGraph::from_global_dependencies(0, &global, false).unwrap_err();
        assert!(matches!(err, SweepError::CyclesNotAllowed { edges: 1 }));
    }

    #[test]
    fn out_of_range_dependency_is_unknown_partition() {
        let global = vec![vec![5]];
        assert!(matches!(
            LocationGraph::from_global_dependencies(0, &global, true),
            Err(SweepError::UnknownPartition { partition: 5, .. })
        ));
    }

    #[test]
    fn serial_graph_has_one_plane() {
        let g = LocationGraph::serial(0);
        assert_eq!(g.depth_of_graph(), 1);
        assert!(g.location_successors().is_empty());
    }
}

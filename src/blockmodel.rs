//! Community labels for the author interaction graph from a nested block model fit.

use crate::consensus::PartitionSamples;
use crate::graph::{EdgeType, InteractionGraph, VertexType};
use crate::progress::{count_progress, finish};
use crate::sbm::{build_hierarchy, equilibrate, minimize_nested, BlockGraph, FitOptions, NestedState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How much effort goes into the fit beyond a single minimization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineMode {
    /// One minimization.
    #[default]
    None,
    /// `basic_runs` independent minimizations; the lowest description length wins.
    Basic,
    /// Metropolis equilibration from the minimized state, consensus of the sampled
    /// base partitions, hierarchy refit above the consensus.
    Marginals,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockModelOptions {
    pub refine: RefineMode,
    pub seed: u64,
    pub basic_runs: usize,
    pub marginal_iterations: usize,
    pub sweeps_per_iteration: usize,
    pub sweeps: usize,
    pub merge_candidates: usize,
    pub shrink_ratio: f64,
    /// Vertex type of the view that is modelled.
    pub vtype: VertexType,
}

impl Default for BlockModelOptions {
    fn default() -> Self {
        Self {
            refine: RefineMode::None,
            seed: 42,
            basic_runs: 10,
            marginal_iterations: 2000,
            sweeps_per_iteration: 10,
            sweeps: 10,
            merge_candidates: 10,
            shrink_ratio: 1.5,
            vtype: VertexType::Author,
        }
    }
}

impl BlockModelOptions {
    fn fit_options(&self) -> FitOptions {
        FitOptions { merge_candidates: self.merge_candidates, shrink_ratio: self.shrink_ratio, sweeps: self.sweeps }
    }
}

#[derive(Clone, Debug)]
pub struct BlockModelFit {
    pub state: NestedState,
    /// Description length of every minimization that was run, in seed order.
    pub candidates: Vec<f64>,
    /// Per-vertex agreement with the consensus block (marginals mode only).
    pub marginals: Option<Vec<f64>>,
    pub samples: Option<PartitionSamples>,
}

impl BlockModelFit {
    pub fn num_blocks(&self) -> usize {
        self.state.num_blocks()
    }

    /// All vertices ended up in one block. Reported, not an error.
    pub fn is_degenerate(&self) -> bool {
        self.num_blocks() <= 1
    }

    pub fn entropy(&self) -> f64 {
        self.state.entropy
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub name: String,
    #[serde(rename = "type")]
    pub vtype: VertexType,
    pub block_id: usize,
}

fn block_input(graph: &InteractionGraph) -> (BlockGraph, Vec<usize>) {
    let bg = BlockGraph::from_edges(graph.num_vertices(), graph.edges().iter().map(|e| (e.source, e.target)));
    let labels = graph.vertices().map(|(_, _, t)| u8::from(t) as usize).collect();
    (bg, labels)
}

/// Fit a nested block model to `graph`, using vertex types as a soft prior.
pub fn fit_blockmodel(graph: &InteractionGraph, opts: &BlockModelOptions, progress: bool) -> BlockModelFit {
    let (bg, labels) = block_input(graph);
    let fit_opts = opts.fit_options();

    let fit = match opts.refine {
        RefineMode::None => {
            let mut rng = StdRng::seed_from_u64(opts.seed);
            let state = minimize_nested(&bg, &labels, &mut rng, &fit_opts);
            BlockModelFit { candidates: vec![state.entropy], state, marginals: None, samples: None }
        }
        RefineMode::Basic => {
            let runs: Vec<NestedState> = (0..opts.basic_runs.max(1) as u64)
                .into_par_iter()
                .map(|i| {
                    let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(i));
                    minimize_nested(&bg, &labels, &mut rng, &fit_opts)
                })
                .collect();
            let candidates: Vec<f64> = runs.iter().map(|s| s.entropy).collect();
            let mut best = 0;
            for (i, s) in candidates.iter().enumerate() {
                if *s < candidates[best] {
                    best = i;
                }
            }
            tracing::debug!(runs = runs.len(), best, entropy = candidates[best], "basic refinement");
            let state = runs.into_iter().nth(best).unwrap_or_else(|| NestedState { levels: Vec::new(), entropy: 0.0 });
            BlockModelFit { state, candidates, marginals: None, samples: None }
        }
        RefineMode::Marginals => {
            let mut rng = StdRng::seed_from_u64(opts.seed);
            let start = minimize_nested(&bg, &labels, &mut rng, &fit_opts);
            let mut samples = PartitionSamples::new();
            let pb = count_progress(progress, opts.marginal_iterations as u64, "equilibrate");
            equilibrate(
                &bg,
                &labels,
                start.base(),
                opts.marginal_iterations,
                opts.sweeps_per_iteration,
                &mut rng,
                &mut samples,
                &pb,
            );
            finish(pb, "equilibrated");
            match samples.consensus() {
                Some(c) => {
                    let state = build_hierarchy(&bg, &labels, c.partition, &mut rng, &fit_opts);
                    BlockModelFit {
                        candidates: vec![start.entropy],
                        state,
                        marginals: Some(c.marginals),
                        samples: Some(samples),
                    }
                }
                None => BlockModelFit { candidates: vec![start.entropy], state: start, marginals: None, samples: None },
            }
        }
    };

    if fit.is_degenerate() && graph.num_vertices() > 1 {
        tracing::warn!(vertices = graph.num_vertices(), "block model collapsed to a single block");
    }
    tracing::info!(
        refine = ?opts.refine,
        blocks = fit.num_blocks(),
        levels = fit.state.levels.len(),
        entropy = fit.entropy(),
        "block model fitted"
    );
    fit
}

/// One row per vertex with its base-level block.
pub fn block_table(graph: &InteractionGraph, fit: &BlockModelFit) -> Vec<BlockRow> {
    let base = fit.state.base();
    graph
        .vertices()
        .zip(base)
        .map(|((_, name, t), &b)| BlockRow { name: name.to_string(), vtype: t, block_id: b })
        .collect()
}

/// Restrict to the view of `opts.vtype` (authors connected by replies, by default), fit it,
/// and tabulate the base partition.
pub fn extract_blockmodel(
    graph: &InteractionGraph,
    opts: &BlockModelOptions,
    progress: bool,
) -> (Vec<BlockRow>, BlockModelFit) {
    let etype = EdgeType::try_from(u8::from(opts.vtype)).ok();
    let view = graph.filtered(Some(opts.vtype), etype);
    let fit = fit_blockmodel(&view, opts, progress);
    (block_table(&view, &fit), fit)
}

//! Nested degree-corrected stochastic block model.
//!
//! Description length of a directed multigraph under a partition `b` with vertex labels `c`:
//!
//! * adjacency: `Σ_ij ln A_ij! - Σ_rs ln e_rs! + Σ_r ln e_r⁺! + Σ_s ln e_s⁻! - Σ_i (ln k_i⁺! + ln k_i⁻!)`
//! * degrees: `Σ_r ln((n_r, e_r⁺)) + ln((n_r, e_r⁻))` (multiset coefficients)
//! * partition: `ln C(N-1, B-1) + ln N! + ln N - Σ_r Σ_c ln n_rc!`
//! * block edge counts (flat fit only): `ln((B², E))`
//!
//! The label term is a soft prior: a block mixing labels pays a higher partition cost but
//! nothing forbids it. Upper levels of the hierarchy encode the block edge counts of the level
//! below with `Σ_rs ln((n_r n_s, e_rs))` and their own partition term.
//!
//! Fitting is agglomerative: singletons are merged in rounds, each followed by zero-temperature
//! node-move sweeps, and the lowest description length seen on the way down wins. Every random
//! choice draws from the caller's `StdRng` and every aggregate is kept in ordered maps, so a fit
//! is a pure function of graph, labels, options and seed.

use crate::consensus::PartitionSamples;
use crate::progress::tick;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

const EPS: f64 = 1e-10;
const MAX_LEVELS: usize = 64;
/// Share of proposals drawn uniformly from all blocks instead of from a neighbour's block.
const RANDOM_PROPOSAL: f64 = 0.1;
const FACTORIAL_TABLE: usize = 4096;

static LN_FACT: OnceLock<Vec<f64>> = OnceLock::new();

/// `ln n!`, exact up to the table size and a Stirling series beyond it.
pub fn ln_factorial(n: u64) -> f64 {
    let table = LN_FACT.get_or_init(|| {
        let mut t = Vec::with_capacity(FACTORIAL_TABLE);
        let mut acc = 0.0f64;
        t.push(0.0);
        for k in 1..FACTORIAL_TABLE {
            acc += (k as f64).ln();
            t.push(acc);
        }
        t
    });
    if (n as usize) < table.len() {
        return table[n as usize];
    }
    let x = n as f64;
    x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln() + 1.0 / (12.0 * x) - 1.0 / (360.0 * x * x * x)
}

fn ln_binom(n: u64, k: u64) -> f64 {
    if k > n {
        return f64::INFINITY;
    }
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// `ln((n, k))`: ways to place `k` indistinguishable items in `n` bins.
fn ln_multiset(n: u64, k: u64) -> f64 {
    if n == 0 {
        return if k == 0 { 0.0 } else { f64::INFINITY };
    }
    ln_binom(n + k - 1, k)
}

/// Renumber block labels `0..B` in order of first appearance over the vertices.
pub fn relabel_first_seen(b: &[usize]) -> Vec<usize> {
    let mut map: BTreeMap<usize, usize> = BTreeMap::new();
    b.iter()
        .map(|&r| {
            let next = map.len();
            *map.entry(r).or_insert(next)
        })
        .collect()
}

pub fn num_blocks(b: &[usize]) -> usize {
    b.iter().collect::<BTreeSet<_>>().len()
}

/// Directed multigraph in the shape the fitter needs: merged parallel edges with
/// multiplicities, self-loops kept apart, degrees including self-loops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGraph {
    n: usize,
    out_adj: Vec<Vec<(usize, u64)>>,
    in_adj: Vec<Vec<(usize, u64)>>,
    self_loops: Vec<u64>,
    out_deg: Vec<u64>,
    in_deg: Vec<u64>,
    total: u64,
}

impl BlockGraph {
    pub fn from_edges(n: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self::from_weighted(n, edges.into_iter().map(|(s, t)| (s, t, 1)))
    }

    pub fn from_weighted(n: usize, edges: impl IntoIterator<Item = (usize, usize, u64)>) -> Self {
        let mut acc: BTreeMap<(usize, usize), u64> = BTreeMap::new();
        for (s, t, w) in edges {
            if w > 0 {
                *acc.entry((s, t)).or_default() += w;
            }
        }
        let mut g = BlockGraph {
            n,
            out_adj: vec![Vec::new(); n],
            in_adj: vec![Vec::new(); n],
            self_loops: vec![0; n],
            out_deg: vec![0; n],
            in_deg: vec![0; n],
            total: 0,
        };
        for ((s, t), w) in acc {
            g.out_deg[s] += w;
            g.in_deg[t] += w;
            g.total += w;
            if s == t {
                g.self_loops[s] += w;
            } else {
                g.out_adj[s].push((t, w));
                g.in_adj[t].push((s, w));
            }
        }
        g
    }

    pub fn num_vertices(&self) -> usize {
        self.n
    }

    pub fn num_edges(&self) -> u64 {
        self.total
    }

    /// The multigraph between blocks of `part`, which must label vertices `0..nb`.
    pub fn block_graph(&self, part: &[usize], nb: usize) -> BlockGraph {
        let edges = (0..self.n).flat_map(move |v| {
            let loops = (self.self_loops[v] > 0).then(|| (part[v], part[v], self.self_loops[v]));
            self.out_adj[v].iter().map(move |&(u, w)| (part[v], part[u], w)).chain(loops)
        });
        BlockGraph::from_weighted(nb, edges)
    }

    /// Partition-independent part of the adjacency term.
    fn constant_term(&self) -> f64 {
        let mut s = 0.0;
        for v in 0..self.n {
            s += self.out_adj[v].iter().map(|&(_, w)| ln_factorial(w)).sum::<f64>();
            s += ln_factorial(self.self_loops[v]);
            s -= ln_factorial(self.out_deg[v]) + ln_factorial(self.in_deg[v]);
        }
        s
    }

    fn random_neighbour(&self, v: usize, rng: &mut StdRng) -> Option<usize> {
        let (o, i) = (&self.out_adj[v], &self.in_adj[v]);
        let deg = o.len() + i.len();
        if deg == 0 {
            return None;
        }
        let k = rng.gen_range(0..deg);
        Some(if k < o.len() { o[k].0 } else { i[k - o.len()].0 })
    }
}

/// Knobs for one level fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
    /// Merge proposals evaluated per block per round.
    pub merge_candidates: usize,
    /// Block count shrinks by this factor per merge round.
    pub shrink_ratio: f64,
    /// Upper bound on node-move sweeps after each merge round.
    pub sweeps: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self { merge_candidates: 10, shrink_ratio: 1.5, sweeps: 10 }
    }
}

fn partition_term(n: usize, nb: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let (n, nb) = (n as u64, nb as u64);
    ln_binom(n - 1, nb.saturating_sub(1)) + ln_factorial(n) + (n as f64).ln()
}

fn degree_terms(n_r: usize, e_out: u64, e_in: u64) -> f64 {
    if n_r == 0 {
        return 0.0;
    }
    let n = n_r as u64;
    ln_factorial(e_out) + ln_factorial(e_in) + ln_multiset(n, e_out) + ln_multiset(n, e_in)
}

type EdgeDelta = BTreeMap<(usize, usize), i64>;

/// Partition of one graph with the aggregates needed for incremental entropy updates.
/// Block ids live in `0..n`; emptied blocks stay allocated with zero size.
pub(crate) struct BlockState<'g> {
    g: &'g BlockGraph,
    labels: &'g [usize],
    b: Vec<usize>,
    n_r: Vec<usize>,
    n_rc: Vec<Vec<usize>>,
    e_out: Vec<u64>,
    e_in: Vec<u64>,
    mrs: Vec<BTreeMap<usize, u64>>,
    mrs_in: Vec<BTreeMap<usize, u64>>,
    nb: usize,
}

impl<'g> BlockState<'g> {
    pub(crate) fn new(g: &'g BlockGraph, labels: &'g [usize], b: Vec<usize>) -> Self {
        let n = g.n;
        let n_labels = labels.iter().max().map_or(1, |&c| c + 1);
        let mut st = BlockState {
            g,
            labels,
            b,
            n_r: vec![0; n],
            n_rc: vec![vec![0; n_labels]; n],
            e_out: vec![0; n],
            e_in: vec![0; n],
            mrs: vec![BTreeMap::new(); n],
            mrs_in: vec![BTreeMap::new(); n],
            nb: 0,
        };
        for v in 0..n {
            let r = st.b[v];
            st.n_r[r] += 1;
            st.n_rc[r][labels[v]] += 1;
            st.e_out[r] += g.out_deg[v];
            st.e_in[r] += g.in_deg[v];
            for &(u, w) in &g.out_adj[v] {
                st.add_edges(r, st.b[u], w as i64);
            }
            if g.self_loops[v] > 0 {
                st.add_edges(r, r, g.self_loops[v] as i64);
            }
        }
        st.nb = st.n_r.iter().filter(|&&c| c > 0).count();
        st
    }

    pub(crate) fn assignment(&self) -> &[usize] {
        &self.b
    }

    fn e_rs(&self, r: usize, s: usize) -> u64 {
        self.mrs[r].get(&s).copied().unwrap_or(0)
    }

    fn add_edges(&mut self, r: usize, s: usize, d: i64) {
        let cur = self.e_rs(r, s) as i64 + d;
        debug_assert!(cur >= 0);
        if cur == 0 {
            self.mrs[r].remove(&s);
            self.mrs_in[s].remove(&r);
        } else {
            self.mrs[r].insert(s, cur as u64);
            self.mrs_in[s].insert(r, cur as u64);
        }
    }

    fn global_terms(&self, nb: usize) -> f64 {
        let nb2 = (nb as u64) * (nb as u64);
        partition_term(self.g.n, nb) + ln_multiset(nb2, self.g.total)
    }

    fn label_term(&self, r: usize) -> f64 {
        self.n_rc[r].iter().map(|&c| ln_factorial(c as u64)).sum()
    }

    /// Flat description length, block edge count term included.
    pub(crate) fn entropy(&self) -> f64 {
        self.level_entropy() + ln_multiset((self.nb as u64) * (self.nb as u64), self.g.total)
    }

    /// Base-level contribution to a nested description length: everything except the
    /// block edge counts, which the level above encodes.
    fn level_entropy(&self) -> f64 {
        if self.g.n == 0 {
            return 0.0;
        }
        let mut s = self.g.constant_term() + partition_term(self.g.n, self.nb);
        for r in 0..self.g.n {
            s += degree_terms(self.n_r[r], self.e_out[r], self.e_in[r]) - self.label_term(r);
            s -= self.mrs[r].values().map(|&e| ln_factorial(e)).sum::<f64>();
        }
        s
    }

    fn edge_delta_sum(&self, d: &EdgeDelta) -> f64 {
        d.iter()
            .filter(|(_, dv)| **dv != 0)
            .map(|(&(x, y), &dv)| {
                let cur = self.e_rs(x, y);
                let new = (cur as i64 + dv) as u64;
                -(ln_factorial(new) - ln_factorial(cur))
            })
            .sum()
    }

    fn move_edge_delta(&self, v: usize, r: usize, s: usize) -> EdgeDelta {
        let mut d = EdgeDelta::new();
        for &(u, w) in &self.g.out_adj[v] {
            let t = self.b[u];
            *d.entry((r, t)).or_default() -= w as i64;
            *d.entry((s, t)).or_default() += w as i64;
        }
        for &(u, w) in &self.g.in_adj[v] {
            let t = self.b[u];
            *d.entry((t, r)).or_default() -= w as i64;
            *d.entry((t, s)).or_default() += w as i64;
        }
        let sl = self.g.self_loops[v] as i64;
        if sl > 0 {
            *d.entry((r, r)).or_default() -= sl;
            *d.entry((s, s)).or_default() += sl;
        }
        d
    }

    /// Change in flat description length if `v` moved to block `s`.
    pub(crate) fn move_delta(&self, v: usize, s: usize) -> f64 {
        let r = self.b[v];
        if r == s {
            return 0.0;
        }
        let (ko, ki) = (self.g.out_deg[v], self.g.in_deg[v]);
        let c = self.labels[v];

        let mut delta = self.edge_delta_sum(&self.move_edge_delta(v, r, s));
        delta += degree_terms(self.n_r[r] - 1, self.e_out[r] - ko, self.e_in[r] - ki)
            - degree_terms(self.n_r[r], self.e_out[r], self.e_in[r]);
        delta += degree_terms(self.n_r[s] + 1, self.e_out[s] + ko, self.e_in[s] + ki)
            - degree_terms(self.n_r[s], self.e_out[s], self.e_in[s]);
        let (nrc, nsc) = (self.n_rc[r][c] as u64, self.n_rc[s][c] as u64);
        delta -= ln_factorial(nrc - 1) - ln_factorial(nrc);
        delta -= ln_factorial(nsc + 1) - ln_factorial(nsc);

        let nb_new = self.nb - usize::from(self.n_r[r] == 1) + usize::from(self.n_r[s] == 0);
        delta + self.global_terms(nb_new) - self.global_terms(self.nb)
    }

    pub(crate) fn apply_move(&mut self, v: usize, s: usize) {
        let r = self.b[v];
        if r == s {
            return;
        }
        for ((x, y), dv) in self.move_edge_delta(v, r, s) {
            if dv != 0 {
                self.add_edges(x, y, dv);
            }
        }
        let (ko, ki) = (self.g.out_deg[v], self.g.in_deg[v]);
        let c = self.labels[v];
        self.e_out[r] -= ko;
        self.e_in[r] -= ki;
        self.e_out[s] += ko;
        self.e_in[s] += ki;
        if self.n_r[s] == 0 {
            self.nb += 1;
        }
        self.n_r[r] -= 1;
        self.n_r[s] += 1;
        if self.n_r[r] == 0 {
            self.nb -= 1;
        }
        self.n_rc[r][c] -= 1;
        self.n_rc[s][c] += 1;
        self.b[v] = s;
    }

    fn merge_edge_delta(&self, r: usize, s: usize) -> EdgeDelta {
        let mut d = EdgeDelta::new();
        for (&t, &c) in &self.mrs[r] {
            let to = if t == r { s } else { t };
            *d.entry((r, t)).or_default() -= c as i64;
            *d.entry((s, to)).or_default() += c as i64;
        }
        for (&t, &c) in &self.mrs_in[r] {
            if t == r {
                continue;
            }
            *d.entry((t, r)).or_default() -= c as i64;
            *d.entry((t, s)).or_default() += c as i64;
        }
        d
    }

    /// Change in flat description length if block `r` were folded into block `s`.
    pub(crate) fn merge_delta(&self, r: usize, s: usize) -> f64 {
        if r == s || self.n_r[r] == 0 || self.n_r[s] == 0 {
            return f64::INFINITY;
        }
        let mut delta = self.edge_delta_sum(&self.merge_edge_delta(r, s));
        delta += degree_terms(self.n_r[r] + self.n_r[s], self.e_out[r] + self.e_out[s], self.e_in[r] + self.e_in[s])
            - degree_terms(self.n_r[r], self.e_out[r], self.e_in[r])
            - degree_terms(self.n_r[s], self.e_out[s], self.e_in[s]);
        for (&a, &b) in self.n_rc[r].iter().zip(&self.n_rc[s]) {
            let (a, b) = (a as u64, b as u64);
            delta -= ln_factorial(a + b) - ln_factorial(a) - ln_factorial(b);
        }
        delta + self.global_terms(self.nb - 1) - self.global_terms(self.nb)
    }

    fn apply_merge(&mut self, r: usize, s: usize, members: &[usize]) {
        for ((x, y), dv) in self.merge_edge_delta(r, s) {
            if dv != 0 {
                self.add_edges(x, y, dv);
            }
        }
        let (eo, ei, nr) = (self.e_out[r], self.e_in[r], self.n_r[r]);
        self.e_out[s] += eo;
        self.e_in[s] += ei;
        self.n_r[s] += nr;
        self.e_out[r] = 0;
        self.e_in[r] = 0;
        self.n_r[r] = 0;
        let moved = std::mem::take(&mut self.n_rc[r]);
        for (c, k) in moved.iter().enumerate() {
            self.n_rc[s][c] += k;
        }
        self.n_rc[r] = vec![0; moved.len()];
        for &v in members {
            self.b[v] = s;
        }
        self.nb -= 1;
    }

    fn members(&self) -> Vec<Vec<usize>> {
        let mut m = vec![Vec::new(); self.g.n];
        for (v, &r) in self.b.iter().enumerate() {
            m[r].push(v);
        }
        m
    }

    fn nonempty_blocks(&self) -> Vec<usize> {
        (0..self.g.n).filter(|&r| self.n_r[r] > 0).collect()
    }

    fn propose_merge_target(&self, members: &[usize], blocks: &[usize], rng: &mut StdRng) -> usize {
        if !members.is_empty() && rng.gen::<f64>() >= RANDOM_PROPOSAL {
            let v = members[rng.gen_range(0..members.len())];
            if let Some(u) = self.g.random_neighbour(v, rng) {
                return self.b[u];
            }
        }
        blocks[rng.gen_range(0..blocks.len())]
    }

    /// One agglomerative round: every block proposes its best merge, then merges are applied
    /// cheapest first until `target` blocks remain. Returns false when nothing merged.
    fn merge_round(&mut self, target: usize, candidates: usize, rng: &mut StdRng) -> bool {
        let mut members = self.members();
        let blocks = self.nonempty_blocks();
        let mut proposals: Vec<(f64, usize, usize)> = Vec::new();
        for &r in &blocks {
            let mut best: Option<(f64, usize)> = None;
            for _ in 0..candidates.max(1) {
                let s = self.propose_merge_target(&members[r], &blocks, rng);
                if s == r {
                    continue;
                }
                let d = self.merge_delta(r, s);
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, s));
                }
            }
            if let Some((d, s)) = best {
                proposals.push((d, r, s));
            }
        }
        proposals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut parent: Vec<usize> = (0..self.g.n).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        let mut merged = false;
        for (_, r, s) in proposals {
            if self.nb <= target {
                break;
            }
            let (r, s) = (find(&mut parent, r), find(&mut parent, s));
            if r == s {
                continue;
            }
            let moving = std::mem::take(&mut members[r]);
            self.apply_merge(r, s, &moving);
            members[s].extend(moving);
            parent[r] = s;
            merged = true;
        }
        merged
    }

    fn candidate_blocks(&self, v: usize, blocks: &[usize], rng: &mut StdRng) -> BTreeSet<usize> {
        let mut cand: BTreeSet<usize> = self.g.out_adj[v]
            .iter()
            .chain(&self.g.in_adj[v])
            .map(|&(u, _)| self.b[u])
            .collect();
        if !blocks.is_empty() {
            cand.insert(blocks[rng.gen_range(0..blocks.len())]);
        }
        cand.remove(&self.b[v]);
        cand
    }

    /// Zero-temperature sweep: each vertex takes its best strictly improving move among its
    /// neighbours' blocks and one random block. Returns the number of moves.
    pub(crate) fn greedy_sweep(&mut self, rng: &mut StdRng) -> usize {
        let mut order: Vec<usize> = (0..self.g.n).collect();
        order.shuffle(rng);
        let blocks = self.nonempty_blocks();
        let mut moves = 0;
        for v in order {
            let mut best: Option<(f64, usize)> = None;
            for s in self.candidate_blocks(v, &blocks, rng) {
                if self.n_r[s] == 0 {
                    continue;
                }
                let d = self.move_delta(v, s);
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, s));
                }
            }
            if let Some((d, s)) = best {
                if d < -EPS {
                    self.apply_move(v, s);
                    moves += 1;
                }
            }
        }
        moves
    }

    /// Metropolis sweep at inverse temperature 1 over existing blocks.
    pub(crate) fn mcmc_sweep(&mut self, rng: &mut StdRng) -> usize {
        let mut order: Vec<usize> = (0..self.g.n).collect();
        order.shuffle(rng);
        let blocks = self.nonempty_blocks();
        if blocks.len() < 2 {
            return 0;
        }
        let mut moves = 0;
        for v in order {
            let s = if rng.gen::<f64>() >= RANDOM_PROPOSAL {
                match self.g.random_neighbour(v, rng) {
                    Some(u) => self.b[u],
                    None => blocks[rng.gen_range(0..blocks.len())],
                }
            } else {
                blocks[rng.gen_range(0..blocks.len())]
            };
            if s == self.b[v] || self.n_r[s] == 0 {
                continue;
            }
            let d = self.move_delta(v, s);
            if d <= 0.0 || rng.gen::<f64>() < (-d).exp() {
                self.apply_move(v, s);
                moves += 1;
            }
        }
        moves
    }
}

/// Best flat partition of `g` found by agglomerative merging, relabelled first-seen.
pub fn fit_level(g: &BlockGraph, labels: &[usize], rng: &mut StdRng, opts: &FitOptions) -> Vec<usize> {
    let n = g.n;
    if n == 0 {
        return Vec::new();
    }
    let mut st = BlockState::new(g, labels, (0..n).collect());
    let mut best = (st.entropy(), st.b.clone());
    let ratio = if opts.shrink_ratio > 1.0 { opts.shrink_ratio } else { 1.5 };

    while st.nb > 1 {
        let target = ((st.nb as f64 / ratio).floor() as usize).clamp(1, st.nb - 1);
        if !st.merge_round(target, opts.merge_candidates, rng) {
            break;
        }
        for _ in 0..opts.sweeps {
            if st.greedy_sweep(rng) == 0 {
                break;
            }
        }
        let s = st.entropy();
        if s < best.0 - EPS {
            best = (s, st.b.clone());
        }
    }
    relabel_first_seen(&best.1)
}

/// Per block, the most common member label; ties go to the smaller label.
pub fn majority_labels(part: &[usize], labels: &[usize], nb: usize) -> Vec<usize> {
    let mut counts: Vec<BTreeMap<usize, usize>> = vec![BTreeMap::new(); nb];
    for (&r, &c) in part.iter().zip(labels) {
        *counts[r].entry(c).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|m| {
            m.into_iter()
                .fold((0usize, 0usize), |(bc, bn), (c, k)| if k > bn { (c, k) } else { (bc, bn) })
                .0
        })
        .collect()
}

/// Hierarchy of partitions: `levels[0]` maps vertices to base blocks, `levels[l]` maps the
/// blocks of level `l-1` to blocks of level `l`. The last level has a single block.
#[derive(Clone, Debug, PartialEq)]
pub struct NestedState {
    pub levels: Vec<Vec<usize>>,
    pub entropy: f64,
}

impl NestedState {
    pub fn base(&self) -> &[usize] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_blocks(&self) -> usize {
        num_blocks(self.base())
    }
}

/// Nested description length of a hierarchy over `g`.
pub fn nested_entropy(g: &BlockGraph, labels: &[usize], levels: &[Vec<usize>]) -> f64 {
    let Some(base) = levels.first() else { return 0.0 };
    if g.n == 0 {
        return 0.0;
    }
    let base = relabel_first_seen(base);
    let st = BlockState::new(g, labels, base.clone());
    let mut s = st.level_entropy();

    let mut nb = num_blocks(&base);
    let mut cur = g.block_graph(&base, nb);
    let mut cur_labels = majority_labels(&base, labels, nb);
    for part in &levels[1..] {
        let groups = num_blocks(part);
        let mut sizes = vec![0u64; groups];
        let mut label_counts: BTreeMap<(usize, usize), u64> = BTreeMap::new();
        for (&r, &c) in part.iter().zip(&cur_labels) {
            sizes[r] += 1;
            *label_counts.entry((r, c)).or_default() += 1;
        }
        s += partition_term(nb, groups) - label_counts.values().map(|&k| ln_factorial(k)).sum::<f64>();
        let upper = cur.block_graph(part, groups);
        for r in 0..groups {
            for &(t, e) in &upper.out_adj[r] {
                s += ln_multiset(sizes[r] * sizes[t], e);
            }
            s += ln_multiset(sizes[r] * sizes[r], upper.self_loops[r]);
        }
        cur_labels = majority_labels(part, &cur_labels, groups);
        cur = upper;
        nb = groups;
    }
    s + ln_multiset((nb as u64) * (nb as u64), g.total)
}

/// Fit the levels above a fixed base partition until a single block remains.
pub fn build_hierarchy(
    g: &BlockGraph,
    labels: &[usize],
    base: Vec<usize>,
    rng: &mut StdRng,
    opts: &FitOptions,
) -> NestedState {
    if g.n == 0 {
        return NestedState { levels: Vec::new(), entropy: 0.0 };
    }
    let base = relabel_first_seen(&base);
    let mut levels = vec![base.clone()];
    let mut last = base;
    let mut cur: Option<BlockGraph> = None;
    let mut cur_labels = labels.to_vec();

    loop {
        let nb = num_blocks(&last);
        if nb <= 1 {
            break;
        }
        if levels.len() >= MAX_LEVELS {
            levels.push(vec![0; nb]);
            break;
        }
        let next_g = cur.as_ref().unwrap_or(g).block_graph(&last, nb);
        let next_labels = majority_labels(&last, &cur_labels, nb);
        let part = fit_level(&next_g, &next_labels, rng, opts);
        if num_blocks(&part) == nb {
            levels.push(vec![0; nb]);
            break;
        }
        levels.push(part.clone());
        last = part;
        cur = Some(next_g);
        cur_labels = next_labels;
    }

    let entropy = nested_entropy(g, labels, &levels);
    NestedState { levels, entropy }
}

/// Minimize the nested description length from scratch.
pub fn minimize_nested(g: &BlockGraph, labels: &[usize], rng: &mut StdRng, opts: &FitOptions) -> NestedState {
    let base = fit_level(g, labels, rng, opts);
    build_hierarchy(g, labels, base, rng, opts)
}

/// Run `iterations` rounds of `sweeps` Metropolis sweeps on the base level starting from
/// `base`, recording the base partition after every round.
#[allow(clippy::too_many_arguments)]
pub fn equilibrate(
    g: &BlockGraph,
    labels: &[usize],
    base: &[usize],
    iterations: usize,
    sweeps: usize,
    rng: &mut StdRng,
    samples: &mut PartitionSamples,
    progress: &Option<ProgressBar>,
) {
    if g.n == 0 {
        return;
    }
    let mut st = BlockState::new(g, labels, base.to_vec());
    for _ in 0..iterations {
        for _ in 0..sweeps {
            st.mcmc_sweep(rng);
        }
        samples.push(relabel_first_seen(st.assignment()));
        tick(progress, 1);
    }
}

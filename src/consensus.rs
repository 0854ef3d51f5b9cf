//! Accumulating sampled partitions and reducing them to a single consensus partition.

use crate::sbm::relabel_first_seen;
use std::collections::{BTreeMap, BTreeSet};

/// Base-level partitions collected during equilibration, in sampling order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionSamples {
    samples: Vec<Vec<usize>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Consensus {
    /// Per-vertex mode label, renumbered in first-seen order.
    pub partition: Vec<usize>,
    /// Share of samples that agree with the mode label, per vertex.
    pub marginals: Vec<f64>,
}

impl PartitionSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, partition: Vec<usize>) {
        self.samples.push(partition);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Vec<usize>] {
        &self.samples
    }

    /// Align every sample's labels to the running per-vertex mode by greedy maximum overlap,
    /// then take the per-vertex mode. Samples are canonicalized first, so relabelling a sample
    /// never changes the result. `None` without samples or when sample lengths disagree.
    pub fn consensus(&self) -> Option<Consensus> {
        let first = self.samples.first()?;
        let n = first.len();
        if self.samples.iter().any(|s| s.len() != n) {
            return None;
        }

        let mut counts: Vec<BTreeMap<usize, usize>> = vec![BTreeMap::new(); n];
        let mut next_label = 0usize;

        for sample in &self.samples {
            let sample = relabel_first_seen(sample);
            let mode: Vec<Option<usize>> = counts.iter().map(mode_of).collect();

            let mut overlap: BTreeMap<(usize, usize), usize> = BTreeMap::new();
            for (&a, m) in sample.iter().zip(&mode) {
                if let Some(m) = *m {
                    *overlap.entry((a, m)).or_default() += 1;
                }
            }
            let mut pairs: Vec<((usize, usize), usize)> = overlap.into_iter().collect();
            pairs.sort_by(|x, y| y.1.cmp(&x.1).then(x.0.cmp(&y.0)));

            let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
            let mut taken: BTreeSet<usize> = BTreeSet::new();
            for ((a, m), _) in pairs {
                if mapping.contains_key(&a) || taken.contains(&m) {
                    continue;
                }
                mapping.insert(a, m);
                taken.insert(m);
                next_label = next_label.max(m + 1);
            }

            for (v, &a) in sample.iter().enumerate() {
                let label = *mapping.entry(a).or_insert_with(|| {
                    let l = next_label;
                    next_label += 1;
                    l
                });
                *counts[v].entry(label).or_default() += 1;
            }
        }

        let total = self.samples.len() as f64;
        let mut raw = Vec::with_capacity(n);
        let mut marginals = Vec::with_capacity(n);
        for c in &counts {
            let (label, k) = c
                .iter()
                .fold((0usize, 0usize), |(bl, bk), (&l, &k)| if k > bk { (l, k) } else { (bl, bk) });
            raw.push(label);
            marginals.push(k as f64 / total);
        }
        Some(Consensus { partition: relabel_first_seen(&raw), marginals })
    }
}

fn mode_of(c: &BTreeMap<usize, usize>) -> Option<usize> {
    c.iter()
        .fold(None, |best: Option<(usize, usize)>, (&l, &k)| match best {
            Some((_, bk)) if bk >= k => best,
            _ => Some((l, k)),
        })
        .map(|(l, _)| l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permuted_samples_agree() {
        let mut a = PartitionSamples::new();
        a.push(vec![0, 0, 1, 1, 2]);
        a.push(vec![1, 1, 0, 0, 2]);
        a.push(vec![2, 2, 2, 0, 1]);
        let c = a.consensus().unwrap();
        assert_eq!(c.partition, vec![0, 0, 1, 1, 2]);
        assert!((c.marginals[0] - 1.0).abs() < 1e-12);
        assert!((c.marginals[2] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_has_no_consensus() {
        assert!(PartitionSamples::new().consensus().is_none());
    }
}

//! Ordered collections of experiments

use std::collections::BTreeMap;
use std::ops::Index;
use std::slice::SliceIndex;

use super::{Experiment, InfoMap, MetricGroups, MetricTable};
use crate::record::Fields;

/// Ordered collection of [`Experiment`]s.
///
/// `group_by`, `filter` and `slice` return new sequences and leave the
/// original untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentSequence {
    experiments: Vec<Experiment>,
}

impl ExperimentSequence {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self { experiments }
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Experiment> {
        self.experiments.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Experiment> {
        self.experiments.iter()
    }

    pub fn as_slice(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn push(&mut self, experiment: Experiment) {
        self.experiments.push(experiment);
    }

    pub fn into_vec(self) -> Vec<Experiment> {
        self.experiments
    }

    /// Partition by a caller-supplied key, keeping order within each group.
    pub fn group_by<F>(&self, mut key: F) -> BTreeMap<String, ExperimentSequence>
    where
        F: FnMut(&Experiment) -> String,
    {
        let mut groups: BTreeMap<String, ExperimentSequence> = BTreeMap::new();
        for experiment in &self.experiments {
            groups
                .entry(key(experiment))
                .or_default()
                .push(experiment.clone());
        }
        groups
    }

    pub fn filter<F>(&self, mut predicate: F) -> ExperimentSequence
    where
        F: FnMut(&Experiment) -> bool,
    {
        self.experiments
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Sub-sequence by range, or `None` when out of bounds.
    pub fn slice<R>(&self, range: R) -> Option<ExperimentSequence>
    where
        R: SliceIndex<[Experiment], Output = [Experiment]>,
    {
        self.experiments.get(range).map(|s| Self::new(s.to_vec()))
    }

    /// Reduce to one experiment with the default strategies.
    pub fn aggregate(&self) -> Experiment {
        self.aggregate_with(first_non_empty_configs, concat_metrics, first_non_empty_info)
    }

    /// Reduce to one experiment with custom strategies for each part.
    pub fn aggregate_with<C, M, I>(&self, configs: C, metrics: M, info: I) -> Experiment
    where
        C: FnOnce(&[Experiment]) -> Vec<Fields>,
        M: FnOnce(&[Experiment]) -> MetricGroups,
        I: FnOnce(&[Experiment]) -> InfoMap,
    {
        let experiments = self.as_slice();
        Experiment::new(configs(experiments), metrics(experiments), info(experiments))
    }
}

/// First experiment with any configs wins.
pub fn first_non_empty_configs(experiments: &[Experiment]) -> Vec<Fields> {
    experiments
        .iter()
        .find(|e| !e.configs.is_empty())
        .map(|e| e.configs.clone())
        .unwrap_or_default()
}

/// Row-wise union of each group's tables, in sequence order.
pub fn concat_metrics(experiments: &[Experiment]) -> MetricGroups {
    let mut merged = MetricGroups::new();
    for experiment in experiments {
        for (group, table) in &experiment.metrics {
            if table.is_empty() {
                continue;
            }
            merged
                .entry(group.clone())
                .or_insert_with(MetricTable::new)
                .append(table);
        }
    }
    merged
}

/// First experiment with any info wins.
pub fn first_non_empty_info(experiments: &[Experiment]) -> InfoMap {
    experiments
        .iter()
        .find(|e| !e.info.is_empty())
        .map(|e| e.info.clone())
        .unwrap_or_default()
}

impl Index<usize> for ExperimentSequence {
    type Output = Experiment;

    fn index(&self, i: usize) -> &Experiment {
        &self.experiments[i]
    }
}

impl FromIterator<Experiment> for ExperimentSequence {
    fn from_iter<T: IntoIterator<Item = Experiment>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ExperimentSequence {
    type Item = Experiment;
    type IntoIter = std::vec::IntoIter<Experiment>;

    fn into_iter(self) -> Self::IntoIter {
        self.experiments.into_iter()
    }
}

impl<'a> IntoIterator for &'a ExperimentSequence {
    type Item = &'a Experiment;
    type IntoIter = std::slice::Iter<'a, Experiment>;

    fn into_iter(self) -> Self::IntoIter {
        self.experiments.iter()
    }
}

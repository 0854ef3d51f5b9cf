//! Sentence-level annotation stages over pluggable NLP capabilities.
//!
//! Models are reached through small traits so the pipeline never depends on a particular
//! runtime. Per-record failures never abort a stage: they are collected next to the
//! successful rows in [`Annotated`] and logged.

use crate::error::AnnotationError;
use crate::sentences::SentenceRow;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One entity mention found by an [`EntityTagger`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub span: String,
    pub label: String,
    pub score: f64,
    pub char_start: usize,
    pub char_end: usize,
}

pub trait EntityTagger {
    fn predict(&self, text: &str) -> Result<Vec<EntitySpan>, AnnotationError>;
}

/// A model that scores a fixed, ordered label set (sentiment, emotion concepts).
pub trait TextClassifier {
    fn labels(&self) -> &[String];
    fn classify(&self, text: &str) -> Result<Vec<f64>, AnnotationError>;
}

/// Per-token tags, e.g. coarse part of speech.
pub trait TokenTagger {
    fn tag(&self, text: &str) -> Result<Vec<String>, AnnotationError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub topic: i64,
    pub count: usize,
    pub name: String,
    pub representation: Vec<String>,
}

/// Corpus-level topic assignment, one topic and probability per input text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopicAssignment {
    pub topics: Vec<i64>,
    pub probabilities: Vec<f64>,
    pub info: Vec<TopicInfo>,
}

pub trait TopicClusterer {
    fn cluster(&self, texts: &[&str]) -> Result<TopicAssignment>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationFailure {
    pub index: usize,
    pub key: String,
    pub text: String,
    pub error: AnnotationError,
}

/// Same shape persisted to `{corpus}_{stage}_failures`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRow {
    pub index: usize,
    pub key: String,
    pub text: String,
    pub error: String,
}

impl From<&AnnotationFailure> for FailureRow {
    fn from(f: &AnnotationFailure) -> Self {
        Self { index: f.index, key: f.key.clone(), text: f.text.clone(), error: f.error.to_string() }
    }
}

/// Successful rows in input order plus every failure with its input index.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotated<T> {
    pub rows: Vec<T>,
    pub failures: Vec<AnnotationFailure>,
}

impl<T> Default for Annotated<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), failures: Vec::new() }
    }
}

impl<T> Annotated<T> {
    pub fn failure_rows(&self) -> Vec<FailureRow> {
        self.failures.iter().map(FailureRow::from).collect()
    }
}

/// Run `f` on every sentence. Blank sentences fail with `EmptyText` without reaching `f`.
pub fn annotate_each<T>(
    stage: &str,
    sentences: &[SentenceRow],
    mut f: impl FnMut(&SentenceRow) -> Result<T, AnnotationError>,
) -> Annotated<T> {
    let mut out = Annotated::default();
    for (index, s) in sentences.iter().enumerate() {
        let res = if s.sentence.trim().is_empty() { Err(AnnotationError::EmptyText) } else { f(s) };
        match res {
            Ok(row) => out.rows.push(row),
            Err(error) => {
                tracing::warn!(stage, index, id = %s.id_sentence, text = %s.sentence, %error, "annotation failed");
                out.failures.push(AnnotationFailure {
                    index,
                    key: s.id_sentence.clone(),
                    text: s.sentence.clone(),
                    error,
                });
            }
        }
    }
    if !out.failures.is_empty() {
        tracing::info!(stage, ok = out.rows.len(), failed = out.failures.len(), "annotation finished with failures");
    }
    out
}

/// All entity spans of one sentence, in the long format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id_sentence: String,
    #[serde(flatten)]
    pub entity: EntitySpan,
}

/// Sentence id plus named numeric feature columns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id_sentence: String,
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}

pub fn tag_entities(sentences: &[SentenceRow], tagger: &dyn EntityTagger) -> Annotated<Vec<EntityRow>> {
    annotate_each("entities", sentences, |s| {
        let spans = tagger.predict(&s.sentence)?;
        Ok(spans.into_iter().map(|entity| EntityRow { id_sentence: s.id_sentence.clone(), entity }).collect())
    })
}

/// Per sentence with at least one entity, the number of entities per label whose score is
/// strictly above `threshold`. Columns are `entity_count_{label}` (lowercase) and every row
/// carries every column seen in the corpus, zero-filled.
pub fn count_entities(rows: &[EntityRow], threshold: f64) -> Vec<FeatureRow> {
    let mut order: Vec<&str> = Vec::new();
    let mut per_sentence: BTreeMap<&str, BTreeMap<String, f64>> = BTreeMap::new();
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for r in rows.iter().filter(|r| r.entity.score > threshold) {
        let col = format!("entity_count_{}", r.entity.label).to_lowercase();
        columns.insert(col.clone());
        let counts = per_sentence.entry(r.id_sentence.as_str()).or_insert_with(|| {
            order.push(r.id_sentence.as_str());
            BTreeMap::new()
        });
        *counts.entry(col).or_default() += 1.0;
    }
    order
        .into_iter()
        .map(|id| {
            let found = per_sentence.remove(id).unwrap_or_default();
            let features = columns.iter().map(|c| (c.clone(), found.get(c).copied().unwrap_or(0.0))).collect();
            FeatureRow { id_sentence: id.to_string(), features }
        })
        .collect()
}

/// Score every sentence with `clf`, one column per label named `{prefix}{label}`.
/// Texts longer than `max_chars` characters are truncated first.
pub fn classify_sentences(
    stage: &str,
    prefix: &str,
    sentences: &[SentenceRow],
    clf: &dyn TextClassifier,
    max_chars: Option<usize>,
) -> Annotated<FeatureRow> {
    let labels = clf.labels();
    annotate_each(stage, sentences, |s| {
        let text: String = match max_chars {
            Some(m) => s.sentence.chars().take(m).collect(),
            None => s.sentence.clone(),
        };
        let scores = clf.classify(&text)?;
        if scores.len() != labels.len() {
            return Err(AnnotationError::Labels(format!("{} scores for {} labels", scores.len(), labels.len())));
        }
        if let Some(bad) = scores.iter().find(|x| !x.is_finite()) {
            return Err(AnnotationError::Labels(format!("non-finite score {bad}")));
        }
        let features = labels.iter().map(|l| format!("{prefix}{l}")).zip(scores).collect();
        Ok(FeatureRow { id_sentence: s.id_sentence.clone(), features })
    })
}

/// Count tags per sentence as `{prefix}{tag}` columns, zero-filled across the corpus.
pub fn count_tags(sentences: &[SentenceRow], tagger: &dyn TokenTagger, prefix: &str) -> Annotated<FeatureRow> {
    let mut out = annotate_each("linguistic_features", sentences, |s| {
        let mut features: BTreeMap<String, f64> = BTreeMap::new();
        for t in tagger.tag(&s.sentence)? {
            *features.entry(format!("{prefix}{t}")).or_default() += 1.0;
        }
        Ok(FeatureRow { id_sentence: s.id_sentence.clone(), features })
    });
    let columns: BTreeSet<String> = out.rows.iter().flat_map(|r| r.features.keys().cloned()).collect();
    for r in &mut out.rows {
        for c in &columns {
            r.features.entry(c.clone()).or_insert(0.0);
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    pub id_sentence: String,
    pub topic: i64,
    pub topic_probability: f64,
}

/// Cluster the whole corpus at once. The clusterer must return exactly one topic and one
/// probability per sentence; anything else fails the stage.
pub fn label_topics(sentences: &[SentenceRow], clusterer: &dyn TopicClusterer) -> Result<(Vec<TopicRow>, Vec<TopicInfo>)> {
    let texts: Vec<&str> = sentences.iter().map(|s| s.sentence.as_str()).collect();
    let assignment = clusterer.cluster(&texts)?;
    if assignment.topics.len() != texts.len() || assignment.probabilities.len() != texts.len() {
        bail!(
            "topic clustering returned {} topics and {} probabilities for {} sentences",
            assignment.topics.len(),
            assignment.probabilities.len(),
            texts.len()
        );
    }
    let rows = sentences
        .iter()
        .zip(assignment.topics.iter().zip(&assignment.probabilities))
        .map(|(s, (&topic, &p))| TopicRow { id_sentence: s.id_sentence.clone(), topic, topic_probability: p })
        .collect();
    Ok((rows, assignment.info))
}

impl From<&TopicRow> for FeatureRow {
    fn from(t: &TopicRow) -> Self {
        let mut features = BTreeMap::new();
        features.insert("topic".to_string(), t.topic as f64);
        features.insert("topic_probability".to_string(), t.topic_probability);
        FeatureRow { id_sentence: t.id_sentence.clone(), features }
    }
}

/// Inner join on `id_sentence`. Row order follows the first table; a column present in
/// several tables takes the value of the last one.
pub fn merge_feature_tables(tables: &[Vec<FeatureRow>]) -> Vec<FeatureRow> {
    let Some((first, rest)) = tables.split_first() else { return Vec::new() };
    let indexed: Vec<BTreeMap<&str, &FeatureRow>> =
        rest.iter().map(|t| t.iter().map(|r| (r.id_sentence.as_str(), r)).collect()).collect();
    first
        .iter()
        .filter_map(|row| {
            let mut merged = row.clone();
            for idx in &indexed {
                let other = idx.get(row.id_sentence.as_str())?;
                for (k, v) in &other.features {
                    merged.features.insert(k.clone(), *v);
                }
            }
            Some(merged)
        })
        .collect()
}

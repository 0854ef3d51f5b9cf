//! Typed pipeline configuration, read from TOML and validated once at load.

use crate::blockmodel::BlockModelOptions;
use crate::error::ConfigError;
use crate::graph::{EdgeType, VertexType};
use crate::projection::EdgeDedup;
use crate::sentences::{SegmentOptions, SentenceIndexPolicy};
use crate::util::{corpus_name, normalize_str};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { input_dir: PathBuf::from("../input"), output_dir: PathBuf::from("../output") }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentenceConfig {
    /// Sentences with fewer tokens are dropped.
    pub min_tokens: usize,
    pub index_policy: SentenceIndexPolicy,
}

impl Default for SentenceConfig {
    fn default() -> Self {
        Self { min_tokens: 3, index_policy: SentenceIndexPolicy::Candidate }
    }
}

impl SentenceConfig {
    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions { min_tokens: self.min_tokens, policy: self.index_policy }
    }
}

/// Parameters handed to the topic clusterer (neighbourhood size and dimensionality of the
/// reduction, minimum cluster size, representation diversity, words per topic).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicConfig {
    pub n_neighbors: usize,
    pub n_components: usize,
    pub min_cluster_size: usize,
    pub diversity: f64,
    pub top_n_words: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self { n_neighbors: 15, n_components: 5, min_cluster_size: 15, diversity: 0.3, top_n_words: 10 }
    }
}

/// Which rows become interactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One interaction per post.
    #[default]
    Post,
    /// One interaction per retained sentence, so long posts weigh more.
    Sentence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub granularity: Granularity,
    /// Vertex type kept in the projected vertex/edge tables.
    pub vtype: VertexType,
    /// Edge type kept in the projected edge table.
    pub etype: EdgeType,
    pub dedup: EdgeDedup,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Post,
            vtype: VertexType::Author,
            etype: EdgeType::Reply,
            dedup: EdgeDedup::Exact,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimilarityConfig {
    /// Width of the hashing embedder.
    pub dimensions: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { dimensions: 512 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub analysis_id: String,
    /// Corpora to process; each is a subreddit name.
    pub subreddits: Vec<String>,
    pub entity_score_threshold: f64,
    /// Keep this many randomly chosen conversations per corpus (all when unset).
    pub sample_n_conversations: Option<usize>,
    pub paths: PathsConfig,
    pub sentences: SentenceConfig,
    pub topics: TopicConfig,
    pub network: NetworkConfig,
    pub blockmodel: BlockModelOptions,
    pub similarity: SimilarityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_id: String::from("analysis"),
            subreddits: Vec::new(),
            entity_score_threshold: 0.8,
            sample_n_conversations: None,
            paths: PathsConfig::default(),
            sentences: SentenceConfig::default(),
            topics: TopicConfig::default(),
            network: NetworkConfig::default(),
            blockmodel: BlockModelOptions::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_toml_str(&text).with_context(|| format!("load config {}", path.display()))?;
        tracing::debug!(path = %path.display(), corpora = cfg.subreddits.len(), "config loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(text)?;
        cfg.normalized().validated()
    }

    pub fn with_subreddits<I, S>(mut self, subs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subreddits = subs.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.normalized()
    }

    pub fn with_input_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.paths.input_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.paths.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Subreddit names without `r/`, duplicates dropped ignoring case (first spelling kept).
    fn normalized(mut self) -> Self {
        let mut seen = std::collections::BTreeSet::new();
        self.subreddits = self
            .subreddits
            .iter()
            .map(|s| corpus_name(s))
            .filter(|s| seen.insert(normalize_str(s)))
            .collect();
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subreddits.is_empty() {
            return Err(ConfigError::invalid("subreddits", "at least one subreddit is required"));
        }
        if let Some(bad) = self.subreddits.iter().find(|s| s.is_empty() || s.contains(['/', '\\'])) {
            return Err(ConfigError::invalid("subreddits", format!("`{bad}` is not a subreddit name")));
        }
        if !(0.0..=1.0).contains(&self.entity_score_threshold) {
            return Err(ConfigError::invalid("entity_score_threshold", "must be within 0..=1"));
        }
        if self.sample_n_conversations == Some(0) {
            return Err(ConfigError::invalid("sample_n_conversations", "must be at least 1 when set"));
        }
        if self.sentences.min_tokens == 0 {
            return Err(ConfigError::invalid("sentences.min_tokens", "must be at least 1"));
        }
        let t = &self.topics;
        if t.n_neighbors < 2 {
            return Err(ConfigError::invalid("topics.n_neighbors", "must be at least 2"));
        }
        if t.n_components == 0 {
            return Err(ConfigError::invalid("topics.n_components", "must be at least 1"));
        }
        if t.min_cluster_size < 2 {
            return Err(ConfigError::invalid("topics.min_cluster_size", "must be at least 2"));
        }
        if !(0.0..=1.0).contains(&t.diversity) {
            return Err(ConfigError::invalid("topics.diversity", "must be within 0..=1"));
        }
        if t.top_n_words == 0 {
            return Err(ConfigError::invalid("topics.top_n_words", "must be at least 1"));
        }
        let b = &self.blockmodel;
        if b.basic_runs == 0 {
            return Err(ConfigError::invalid("blockmodel.basic_runs", "must be at least 1"));
        }
        if b.merge_candidates == 0 {
            return Err(ConfigError::invalid("blockmodel.merge_candidates", "must be at least 1"));
        }
        if !(b.shrink_ratio > 1.0 && b.shrink_ratio.is_finite()) {
            return Err(ConfigError::invalid("blockmodel.shrink_ratio", "must be a finite number above 1"));
        }
        if b.sweeps_per_iteration == 0 {
            return Err(ConfigError::invalid("blockmodel.sweeps_per_iteration", "must be at least 1"));
        }
        if self.similarity.dimensions == 0 {
            return Err(ConfigError::invalid("similarity.dimensions", "must be at least 1"));
        }
        Ok(())
    }
}

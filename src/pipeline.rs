use crate::annotate::{
    classify_sentences, count_entities, count_tags, label_topics, merge_feature_tables, tag_entities, Annotated,
    EntityRow, EntityTagger, FeatureRow, TextClassifier, TokenTagger, TopicClusterer,
};
use crate::blockmodel::{extract_blockmodel, BlockModelFit};
use crate::builder::{build_interaction_graph, interaction_rows_from_sentences, InteractionRow};
use crate::config::{Granularity, PipelineConfig};
use crate::graph::InteractionGraph;
use crate::progress::{count_progress, finish, tick};
use crate::projection::{project, EdgeRow, VertexRow};
use crate::records::{load_corpus, sample_conversations, PostRow};
use crate::sentences::{split_posts, RuleSplitter, SentenceRow, SentenceSplitter};
use crate::similarity::{authored_sentences, ij_similarity, Embedder, HashingEmbedder};
use crate::table::{graph_path, read_table, table_path, write_table};
use crate::util::{corpus_name, normalize_str};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Seed for conversation sampling, so a sampled corpus is reproducible.
const SAMPLE_SEED: u64 = 42;
const SEGMENT_CHUNK: usize = 1024;
/// Emotion models take at most this many characters.
const EMOTION_MAX_CHARS: usize = 512;

/// Table names, one per stage output.
pub mod stage {
    pub const MERGED: &str = "merged";
    pub const SENTENCES: &str = "sentences";
    pub const ENTITIES: &str = "entities";
    pub const ENTITIES_LONG: &str = "entities_long";
    pub const SENTIMENT: &str = "sentiment";
    pub const EMOTION_CONCEPTS: &str = "emotion_concepts";
    pub const TOPICS: &str = "topics";
    pub const TOPIC_INFO: &str = "topic_info";
    pub const LINGUISTIC_FEATURES: &str = "linguistic_features";
    pub const FEATURES_MERGED: &str = "sentence_level_features_merged";
    pub const VERTICES: &str = "vertices";
    pub const EDGES: &str = "edges";
    pub const BLOCKMODEL: &str = "blockmodel";
    pub const IJ_SIMILARITY: &str = "ij_similarity";
}

/// Feature tables joined by `merge_sentence_features` when no task list is given.
pub const DEFAULT_FEATURE_TASKS: [&str; 5] =
    [stage::EMOTION_CONCEPTS, stage::ENTITIES, stage::SENTIMENT, stage::TOPICS, stage::LINGUISTIC_FEATURES];

/// Per-corpus stage runner. Every stage reads the tables of earlier stages from the output
/// directory and writes its own, so stages can be run one at a time.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub(crate) cfg: PipelineConfig,
    progress: bool,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg, progress: false }
    }

    // -------- Builder methods --------
    pub fn input_dir(mut self, dir: impl AsRef<Path>) -> Self { self.cfg = self.cfg.with_input_dir(dir); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.cfg = self.cfg.with_output_dir(dir); self }
    pub fn progress(mut self, yes: bool) -> Self { self.progress = yes; self }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn corpora(&self) -> &[String] {
        &self.cfg.subreddits
    }

    pub fn table(&self, corpus: &str, stage: &str) -> PathBuf {
        table_path(&self.cfg.paths.output_dir, &self.resolve(corpus), stage)
    }

    /// Configured spelling of `name`, matched ignoring case. Names that are not
    /// configured pass through without their `r/` prefix.
    fn resolve(&self, name: &str) -> String {
        let key = normalize_str(name);
        match self.cfg.subreddits.iter().find(|s| normalize_str(s) == key) {
            Some(s) => s.clone(),
            None => corpus_name(name),
        }
    }

    fn run_stage<T>(&self, corpus: &str, stage: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        tracing::info!(corpus, stage, "stage started");
        let out = f().with_context(|| format!("corpus `{corpus}`: stage `{stage}` failed"))?;
        tracing::info!(corpus, stage, secs = started.elapsed().as_secs_f64(), "stage finished");
        Ok(out)
    }

    fn write<T: Serialize>(&self, corpus: &str, stage: &str, rows: &[T]) -> Result<usize> {
        let n = write_table(&self.table(corpus, stage), rows)?;
        tracing::info!(corpus, table = stage, rows = n, "table written");
        Ok(n)
    }

    fn read<T: serde::de::DeserializeOwned>(&self, corpus: &str, stage: &str) -> Result<Vec<T>> {
        read_table(&self.table(corpus, stage))
    }

    fn write_annotated<T: Serialize>(&self, corpus: &str, stage: &str, out: &Annotated<T>) -> Result<usize> {
        self.write(corpus, &format!("{stage}_failures"), &out.failure_rows())?;
        self.write(corpus, stage, &out.rows)
    }

    // -------- Stages --------

    /// Raw pages → `{corpus}_merged`, optionally down-sampled to whole conversations.
    pub fn merge_submissions_and_comments(&self, corpus: &str) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::MERGED, || {
            let mut rows = load_corpus(&self.cfg.paths.input_dir, &corpus)?;
            if let Some(n) = self.cfg.sample_n_conversations {
                let before = rows.len();
                rows = sample_conversations(rows, n, SAMPLE_SEED);
                tracing::info!(corpus = %corpus, before, after = rows.len(), conversations = n, "corpus sampled");
            }
            self.write(&corpus, stage::MERGED, &rows)
        })
    }

    pub fn segment_sentences(&self, corpus: &str) -> Result<usize> {
        self.segment_sentences_with(corpus, &RuleSplitter)
    }

    pub fn segment_sentences_with(&self, corpus: &str, splitter: &dyn SentenceSplitter) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::SENTENCES, || {
            let posts: Vec<PostRow> = self.read(&corpus, stage::MERGED)?;
            let opts = self.cfg.sentences.segment_options();
            let pb = count_progress(self.progress, posts.len() as u64, "segment");
            let mut rows = Vec::new();
            for chunk in posts.chunks(SEGMENT_CHUNK) {
                rows.extend(split_posts(chunk, splitter, opts));
                tick(&pb, chunk.len() as u64);
            }
            finish(pb, "segmented");
            self.write(&corpus, stage::SENTENCES, &rows)
        })
    }

    /// Entity spans (`{corpus}_entities_long`) and per-sentence label counts above the
    /// configured score threshold (`{corpus}_entities`).
    pub fn label_entities(&self, corpus: &str, tagger: &dyn EntityTagger) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::ENTITIES, || {
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let tagged = tag_entities(&sentences, tagger);
            let long: Vec<EntityRow> = tagged.rows.iter().flatten().cloned().collect();
            self.write(&corpus, &format!("{}_failures", stage::ENTITIES), &tagged.failure_rows())?;
            self.write(&corpus, stage::ENTITIES_LONG, &long)?;
            let counts = count_entities(&long, self.cfg.entity_score_threshold);
            self.write(&corpus, stage::ENTITIES, &counts)
        })
    }

    pub fn label_sentiment(&self, corpus: &str, clf: &dyn TextClassifier) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::SENTIMENT, || {
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let out = classify_sentences(stage::SENTIMENT, "sentiment_", &sentences, clf, None);
            self.write_annotated(&corpus, stage::SENTIMENT, &out)
        })
    }

    pub fn label_emotion_concepts(&self, corpus: &str, clf: &dyn TextClassifier) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::EMOTION_CONCEPTS, || {
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let out = classify_sentences(stage::EMOTION_CONCEPTS, "", &sentences, clf, Some(EMOTION_MAX_CHARS));
            self.write_annotated(&corpus, stage::EMOTION_CONCEPTS, &out)
        })
    }

    pub fn compute_linguistic_features(&self, corpus: &str, tagger: &dyn TokenTagger) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::LINGUISTIC_FEATURES, || {
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let out = count_tags(&sentences, tagger, "pos_");
            self.write_annotated(&corpus, stage::LINGUISTIC_FEATURES, &out)
        })
    }

    /// Topic per sentence (`{corpus}_topics`) and the clusterer's topic summary
    /// (`{corpus}_topic_info`). The clusterer is configured from `[topics]`.
    pub fn label_topics(&self, corpus: &str, clusterer: &dyn TopicClusterer) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::TOPICS, || {
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let (rows, info) = label_topics(&sentences, clusterer)?;
            let features: Vec<FeatureRow> = rows.iter().map(FeatureRow::from).collect();
            self.write(&corpus, stage::TOPIC_INFO, &info)?;
            self.write(&corpus, stage::TOPICS, &features)
        })
    }

    /// Inner-join the feature tables of `tasks` on `id_sentence`.
    pub fn merge_sentence_features(&self, corpus: &str, tasks: &[String]) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::FEATURES_MERGED, || {
            let tables = tasks
                .iter()
                .map(|t| self.read::<FeatureRow>(&corpus, t).with_context(|| format!("feature table `{t}`")))
                .collect::<Result<Vec<_>>>()?;
            let merged = merge_feature_tables(&tables);
            self.write(&corpus, stage::FEATURES_MERGED, &merged)
        })
    }

    fn interaction_rows(&self, corpus: &str) -> Result<Vec<InteractionRow>> {
        let posts: Vec<PostRow> = self.read(corpus, stage::MERGED)?;
        Ok(match self.cfg.network.granularity {
            Granularity::Post => posts.iter().map(InteractionRow::from).collect(),
            Granularity::Sentence => {
                let sentences: Vec<SentenceRow> = self.read(corpus, stage::SENTENCES)?;
                interaction_rows_from_sentences(&sentences, &posts)
            }
        })
    }

    /// `{corpus}_author_network`.
    pub fn construct_network(&self, corpus: &str) -> Result<InteractionGraph> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, "author_network", || {
            let rows = self.interaction_rows(&corpus)?;
            let graph = build_interaction_graph(&rows)?;
            let path = graph_path(&self.cfg.paths.output_dir, &corpus);
            graph.save(&path)?;
            tracing::info!(
                corpus = %corpus,
                vertices = graph.num_vertices(),
                edges = graph.num_edges(),
                path = %path.display(),
                "graph written"
            );
            Ok(graph)
        })
    }

    fn load_graph(&self, corpus: &str) -> Result<InteractionGraph> {
        let path = graph_path(&self.cfg.paths.output_dir, corpus);
        InteractionGraph::load(&path).with_context(|| format!("load graph {}", path.display()))
    }

    /// `{corpus}_vertices` and `{corpus}_edges` for the configured typed view.
    pub fn construct_similarity_datasets(&self, corpus: &str) -> Result<(usize, usize)> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, "similarity_datasets", || {
            let graph = self.load_graph(&corpus)?;
            let net = &self.cfg.network;
            let p = project(&graph, Some(net.vtype), Some(net.etype), net.dedup)?;
            let nv = self.write::<VertexRow>(&corpus, stage::VERTICES, &p.vertices)?;
            let ne = self.write::<EdgeRow>(&corpus, stage::EDGES, &p.edges)?;
            Ok((nv, ne))
        })
    }

    /// `{corpus}_blockmodel`: base-level block of every vertex of the modelled view.
    pub fn blockmodel(&self, corpus: &str) -> Result<BlockModelFit> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::BLOCKMODEL, || {
            let graph = self.load_graph(&corpus)?;
            let (rows, fit) = extract_blockmodel(&graph, &self.cfg.blockmodel, self.progress);
            self.write(&corpus, stage::BLOCKMODEL, &rows)?;
            Ok(fit)
        })
    }

    pub fn ij_similarities(&self, corpus: &str) -> Result<usize> {
        let embedder = HashingEmbedder::new(self.cfg.similarity.dimensions);
        self.ij_similarities_with(corpus, &embedder)
    }

    /// `{corpus}_ij_similarity` over the projected edges, failures alongside.
    pub fn ij_similarities_with(&self, corpus: &str, embedder: &dyn Embedder) -> Result<usize> {
        let corpus = self.resolve(corpus);
        self.run_stage(&corpus, stage::IJ_SIMILARITY, || {
            let edges: Vec<EdgeRow> = self.read(&corpus, stage::EDGES)?;
            let sentences: Vec<SentenceRow> = self.read(&corpus, stage::SENTENCES)?;
            let posts: Vec<PostRow> = self.read(&corpus, stage::MERGED)?;
            let texts = authored_sentences(&sentences, &posts);
            let out = ij_similarity(&edges, &texts, embedder);
            self.write_annotated(&corpus, stage::IJ_SIMILARITY, &out)
        })
    }

    /// Every model-free stage for one corpus, in dependency order.
    pub fn run(&self, corpus: &str) -> Result<()> {
        self.merge_submissions_and_comments(corpus)?;
        self.segment_sentences(corpus)?;
        self.construct_network(corpus)?;
        self.construct_similarity_datasets(corpus)?;
        self.blockmodel(corpus)?;
        self.ij_similarities(corpus)?;
        Ok(())
    }

    /// [`Pipeline::run`] for every configured corpus, one after another.
    pub fn run_all(&self) -> Result<()> {
        for corpus in &self.cfg.subreddits {
            self.run(corpus)?;
        }
        Ok(())
    }
}

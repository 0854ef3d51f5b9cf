mod config;
mod date;
mod error;
mod progress;
mod table;
mod util;

mod records;
mod sentences;
mod graph;
mod builder;
mod projection;

mod sbm;
mod consensus;
mod blockmodel;

mod annotate;
mod similarity;
mod pipeline;

pub use crate::config::{
    Granularity, NetworkConfig, PathsConfig, PipelineConfig, SentenceConfig, SimilarityConfig, TopicConfig,
};
pub use crate::error::{AnnotationError, ConfigError, SchemaError, TimestampError};
pub use crate::pipeline::{stage, Pipeline, DEFAULT_FEATURE_TASKS};

pub use crate::records::{
    discover_raw_files, load_corpus, load_raw_records, merge_submissions_and_comments, normalize_comments,
    normalize_submissions, sample_conversations, PostKind, PostRow, RawFile, DELETED,
};
pub use crate::sentences::{
    parse_sentence_id, sentence_id, split_documents, split_posts, RuleSplitter, SegmentOptions, SentenceIndexPolicy,
    SentenceRow, SentenceSplitter, Span,
};
pub use crate::graph::{Edge, EdgeType, InteractionGraph, VertexType};
pub use crate::builder::{build_interaction_graph, interaction_rows_from_sentences, InteractionRow};
pub use crate::projection::{infer_vertex_types, project, EdgeDedup, EdgeRow, Projection, VertexRow};

// Block model engine and the extractor built on it.
pub use crate::sbm::{
    build_hierarchy, equilibrate, fit_level, ln_factorial, majority_labels, minimize_nested, nested_entropy, num_blocks,
    relabel_first_seen, BlockGraph, FitOptions, NestedState,
};
pub use crate::consensus::{Consensus, PartitionSamples};
pub use crate::blockmodel::{
    block_table, extract_blockmodel, fit_blockmodel, BlockModelFit, BlockModelOptions, BlockRow, RefineMode,
};

pub use crate::annotate::{
    annotate_each, classify_sentences, count_entities, count_tags, label_topics, merge_feature_tables, tag_entities,
    Annotated, AnnotationFailure, EntityRow, EntitySpan, EntityTagger, FailureRow, FeatureRow, TextClassifier,
    TokenTagger, TopicAssignment, TopicClusterer, TopicInfo, TopicRow,
};
pub use crate::similarity::{
    authored_sentences, cosine, ij_similarity, AuthoredSentence, Embedder, HashingEmbedder, SimilarityRow,
};

// Table I/O and logging setup for binaries and tests.
pub use crate::date::{created_utc_from_value, epoch_seconds_utc, format_rfc3339};
pub use crate::table::{graph_path, read_table, table_path, write_table};
pub use crate::util::{corpus_name, init_tracing_once, normalize_str};

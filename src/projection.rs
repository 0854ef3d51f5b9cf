//! Graph → vertex and edge tables.

use crate::date::{datetime_from_epoch, format_rfc3339};
use crate::error::TimestampError;
use crate::graph::{EdgeType, InteractionGraph, VertexType};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRow {
    pub vid: usize,
    pub vtype: VertexType,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: usize,
    pub target: usize,
    pub etype: EdgeType,
    pub etime: i64,
    /// RFC 3339, UTC.
    pub datetime: String,
    pub source_author: Option<String>,
    pub target_author: Option<String>,
}

/// Edge deduplication applied to the projected edge table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDedup {
    /// Every parallel edge is kept.
    Keep,
    /// Collapse edges identical in `(source, target, etype, etime)`.
    #[default]
    Exact,
    /// Collapse on `(source, target, etime)` only. Edges of different types between the
    /// same pair at the same second are conflated; kept for compatibility with older runs.
    SourceTargetTime,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub vertices: Vec<VertexRow>,
    pub edges: Vec<EdgeRow>,
}

/// Tabulate a typed view of `graph`. Vertex ids are the graph's own ids. Edge endpoint
/// names are resolved through the filtered vertex table and are `None` for endpoints the
/// vertex filter removed. The first occurrence of a duplicate edge wins.
pub fn project(
    graph: &InteractionGraph,
    vtype: Option<VertexType>,
    etype: Option<EdgeType>,
    dedup: EdgeDedup,
) -> Result<Projection, TimestampError> {
    let vertices: Vec<VertexRow> = graph
        .vertices()
        .filter(|&(_, _, t)| vtype.map_or(true, |want| want == t))
        .map(|(vid, name, t)| VertexRow { vid, vtype: t, name: name.to_string() })
        .collect();
    let names: AHashMap<usize, &str> = vertices.iter().map(|v| (v.vid, v.name.as_str())).collect();

    let mut seen: AHashSet<(usize, usize, Option<EdgeType>, i64)> = AHashSet::new();
    let mut edges = Vec::new();
    for e in graph.edges() {
        if etype.map_or(false, |want| want != e.etype) {
            continue;
        }
        let key = match dedup {
            EdgeDedup::Keep => None,
            EdgeDedup::Exact => Some((e.source, e.target, Some(e.etype), e.time)),
            EdgeDedup::SourceTargetTime => Some((e.source, e.target, None, e.time)),
        };
        if let Some(key) = key {
            if !seen.insert(key) {
                continue;
            }
        }
        let dt = datetime_from_epoch(e.time, &format!("edge {}->{}", e.source, e.target))?;
        edges.push(EdgeRow {
            source: e.source,
            target: e.target,
            etype: e.etype,
            etime: e.time,
            datetime: format_rfc3339(&dt),
            source_author: names.get(&e.source).map(|s| s.to_string()),
            target_author: names.get(&e.target).map(|s| s.to_string()),
        });
    }
    Ok(Projection { vertices, edges })
}

/// Rebuild vertex types from an edge table: reply endpoints are authors, membership
/// sources are authors and membership targets subreddits. Author wins on conflict.
/// Endpoints without a resolved name are skipped.
pub fn infer_vertex_types(edges: &[EdgeRow]) -> AHashMap<String, VertexType> {
    let mut out: AHashMap<String, VertexType> = AHashMap::new();
    let mut mark = |name: &Option<String>, t: VertexType| {
        if let Some(n) = name {
            out.entry(n.clone())
                .and_modify(|cur| {
                    if t == VertexType::Author {
                        *cur = VertexType::Author;
                    }
                })
                .or_insert(t);
        }
    };
    for e in edges {
        match e.etype {
            EdgeType::Reply => {
                mark(&e.source_author, VertexType::Author);
                mark(&e.target_author, VertexType::Author);
            }
            EdgeType::Membership => {
                mark(&e.source_author, VertexType::Author);
                mark(&e.target_author, VertexType::Subreddit);
            }
        }
    }
    out
}

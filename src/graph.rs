//! Typed, directed, attributed multigraph of authors and subreddits.
//!
//! Vertices are addressed by dense `usize` ids and carry their string identity and a
//! [`VertexType`]. Edges carry an [`EdgeType`] and an epoch-seconds timestamp. Parallel
//! edges are kept; self-loops are removed once construction is finished.

use crate::table::{read_json_zst, write_json_zst};
use ahash::AHashMap;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum VertexType {
    Author = 0,
    Subreddit = 1,
    /// Reserved for topic vertices; nothing in the builder emits it yet.
    Topic = 2,
}

impl From<VertexType> for u8 {
    fn from(v: VertexType) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for VertexType {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(VertexType::Author),
            1 => Ok(VertexType::Subreddit),
            2 => Ok(VertexType::Topic),
            other => Err(format!("unknown vertex type {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EdgeType {
    /// Author replied to author.
    Reply = 0,
    /// Author posted in subreddit.
    Membership = 1,
}

impl From<EdgeType> for u8 {
    fn from(e: EdgeType) -> u8 {
        e as u8
    }
}

impl TryFrom<u8> for EdgeType {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(EdgeType::Reply),
            1 => Ok(EdgeType::Membership),
            other => Err(format!("unknown edge type {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub etype: EdgeType,
    pub time: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InteractionGraph {
    ids: Vec<String>,
    vtype: Vec<VertexType>,
    edges: Vec<Edge>,
    #[serde(skip)]
    index: AHashMap<String, usize>,
}

impl PartialEq for InteractionGraph {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids && self.vtype == other.vtype && self.edges == other.edges
    }
}

impl InteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertex id for `name`, creating the vertex (typed as author) on first sight.
    pub fn add_vertex(&mut self, name: &str) -> usize {
        if let Some(&v) = self.index.get(name) {
            return v;
        }
        let v = self.ids.len();
        self.ids.push(name.to_string());
        self.vtype.push(VertexType::Author);
        self.index.insert(name.to_string(), v);
        v
    }

    pub fn set_vtype(&mut self, v: usize, t: VertexType) {
        self.vtype[v] = t;
    }

    pub fn add_edge(&mut self, source: usize, target: usize, etype: EdgeType, time: i64) {
        self.edges.push(Edge { source, target, etype, time });
    }

    pub fn vertex_id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, v: usize) -> &str {
        &self.ids[v]
    }

    pub fn vtype(&self, v: usize) -> VertexType {
        self.vtype[v]
    }

    pub fn num_vertices(&self) -> usize {
        self.ids.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn vertices(&self) -> impl Iterator<Item = (usize, &str, VertexType)> + '_ {
        self.ids.iter().zip(&self.vtype).enumerate().map(|(v, (n, &t))| (v, n.as_str(), t))
    }

    /// Drop edges whose endpoints coincide. Returns how many were removed.
    pub fn remove_self_loops(&mut self) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| e.source != e.target);
        before - self.edges.len()
    }

    /// A compacted copy keeping vertices of type `vtype` and edges of type `etype`
    /// whose endpoints both survive. `None` keeps everything along that axis.
    /// Vertex order and edge order are preserved; ids are renumbered densely.
    pub fn filtered(&self, vtype: Option<VertexType>, etype: Option<EdgeType>) -> InteractionGraph {
        let mut remap = vec![usize::MAX; self.ids.len()];
        let mut out = InteractionGraph::new();
        for (v, name, t) in self.vertices() {
            if vtype.map_or(true, |want| want == t) {
                let nv = out.add_vertex(name);
                out.set_vtype(nv, t);
                remap[v] = nv;
            }
        }
        for e in &self.edges {
            if etype.map_or(false, |want| want != e.etype) {
                continue;
            }
            let (s, t) = (remap[e.source], remap[e.target]);
            if s != usize::MAX && t != usize::MAX {
                out.add_edge(s, t, e.etype, e.time);
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_zst(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut g: InteractionGraph = read_json_zst(path)?;
        g.rebuild_index()?;
        Ok(g)
    }

    fn rebuild_index(&mut self) -> Result<()> {
        if self.ids.len() != self.vtype.len() {
            bail!("graph has {} ids but {} vertex types", self.ids.len(), self.vtype.len());
        }
        let n = self.ids.len();
        if let Some(e) = self.edges.iter().find(|e| e.source >= n || e.target >= n) {
            bail!("edge {}->{} references a vertex outside 0..{n}", e.source, e.target);
        }
        self.index = self.ids.iter().enumerate().map(|(v, n)| (n.clone(), v)).collect();
        if self.index.len() != n {
            bail!("graph vertex identities are not unique");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_renumbers_and_drops_dangling_edges() {
        let mut g = InteractionGraph::new();
        let a = g.add_vertex("a");
        let s = g.add_vertex("s");
        let b = g.add_vertex("b");
        g.set_vtype(s, VertexType::Subreddit);
        g.add_edge(a, b, EdgeType::Reply, 1);
        g.add_edge(a, s, EdgeType::Membership, 1);

        let f = g.filtered(Some(VertexType::Author), Some(EdgeType::Reply));
        assert_eq!(f.num_vertices(), 2);
        assert_eq!(f.name(1), "b");
        assert_eq!(f.edges(), &[Edge { source: 0, target: 1, etype: EdgeType::Reply, time: 1 }]);
    }

    #[test]
    fn add_vertex_is_idempotent() {
        let mut g = InteractionGraph::new();
        assert_eq!(g.add_vertex("x"), g.add_vertex("x"));
        assert_eq!(g.num_vertices(), 1);
    }
}

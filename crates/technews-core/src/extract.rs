//! Best-effort recovery of a report string from an arbitrarily shaped generation result.
//!
//! The walk is heuristic rather than schema-driven. It is only used when a caller holds
//! a raw generation result instead of the pipeline's typed output.
//!
//! Results are held in a [`ResultTree`], an arena of nodes addressed by index. Lists and
//! maps refer to children by [`NodeId`], so shared and cyclic structures are expressible,
//! and node identity is simply index equality.

use serde_json::Value;
use tracing::{debug, trace};

use crate::generation::Generation;
use crate::{Result, TechNewsError};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<NodeId>),
    /// Entries keep their insertion order.
    Map(Vec<(String, NodeId)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTree {
    nodes: Vec<Node>,
}

impl ResultTree {
    /// A tree whose root is `root`; further nodes are attached with [`ResultTree::add`].
    pub fn with_root(root: Node) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Append `key -> child` to the map at `map`. `child` may be any existing node,
    /// including an ancestor.
    pub fn insert(&mut self, map: NodeId, key: impl Into<String>, child: NodeId) -> Result<()> {
        self.check(child)?;
        match self.nodes.get_mut(map) {
            Some(Node::Map(entries)) => {
                entries.push((key.into(), child));
                Ok(())
            }
            _ => Err(TechNewsError::Other(anyhow::anyhow!(
                "node {map} is not a map"
            ))),
        }
    }

    /// Append `child` to the list at `list`.
    pub fn push(&mut self, list: NodeId, child: NodeId) -> Result<()> {
        self.check(child)?;
        match self.nodes.get_mut(list) {
            Some(Node::List(items)) => {
                items.push(child);
                Ok(())
            }
            _ => Err(TechNewsError::Other(anyhow::anyhow!(
                "node {list} is not a list"
            ))),
        }
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id < self.nodes.len() {
            Ok(())
        } else {
            Err(TechNewsError::Other(anyhow::anyhow!("node {id} does not exist")))
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.lower(value);
        tree
    }

    /// Root map of `text` then `response`. The walk is LIFO, so the structured response
    /// is searched before the plain text.
    pub fn from_generation(generation: &Generation) -> Self {
        let mut tree = Self::with_root(Node::Null);
        let text = tree.add(generation.text.clone().map_or(Node::Null, Node::String));
        let response = match &generation.structured {
            Some(value) => tree.lower(value),
            None => tree.add(Node::Null),
        };
        tree.nodes[0] = Node::Map(vec![
            ("text".to_string(), text),
            ("response".to_string(), response),
        ]);
        tree
    }

    fn lower(&mut self, value: &Value) -> NodeId {
        let id = self.add(Node::Null);
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(flag) => Node::Bool(*flag),
            Value::Number(number) => Node::Number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => Node::String(text.clone()),
            Value::Array(items) => Node::List(items.iter().map(|item| self.lower(item)).collect()),
            Value::Object(map) => Node::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.lower(item)))
                    .collect(),
            ),
        };
        self.nodes[id] = node;
        id
    }
}

/// Depth-first (LIFO) search for the first report-like string.
///
/// At each map, a key whose lowercased name contains `article` and holds a non-blank
/// string wins outright, whatever its length. Otherwise the map's values are pushed in
/// order, so the last value is examined first. A string node matches when its trimmed
/// form is longer than `min_length` characters, starts with `opening_marker`, or
/// contains `sources_marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultExtractor {
    pub opening_marker: String,
    pub sources_marker: String,
    pub min_length: usize,
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self {
            opening_marker: "**Báo cáo".to_string(),
            sources_marker: "Nguồn tham khảo".to_string(),
            min_length: 50,
        }
    }
}

impl ResultExtractor {
    pub fn extract(&self, tree: &ResultTree) -> Result<String> {
        if tree.is_empty() {
            return Err(TechNewsError::ExtractionNotFound);
        }

        let mut visited = vec![false; tree.len()];
        let mut stack = vec![tree.root()];
        let mut steps = 0usize;

        while let Some(id) = stack.pop() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            if visited[id] {
                continue;
            }
            visited[id] = true;
            steps += 1;

            match node {
                Node::Map(entries) => {
                    if let Some(found) = Self::article_field(tree, entries) {
                        trace!(node = id, "matched article key");
                        return Ok(found.to_string());
                    }
                    stack.extend(entries.iter().map(|(_, child)| *child));
                }
                Node::List(items) => stack.extend(items.iter().copied()),
                Node::String(text) => {
                    if let Some(found) = self.report_like(text) {
                        trace!(node = id, "matched report-like string");
                        return Ok(found.to_string());
                    }
                }
                Node::Null | Node::Bool(_) | Node::Number(_) => {}
            }
        }

        debug!(steps, "no report found in generation result");
        Err(TechNewsError::ExtractionNotFound)
    }

    fn article_field<'a>(tree: &'a ResultTree, entries: &[(String, NodeId)]) -> Option<&'a str> {
        entries
            .iter()
            .filter(|(key, _)| key.to_lowercase().contains("article"))
            .find_map(|(_, child)| match tree.node(*child) {
                Some(Node::String(text)) if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
    }

    fn report_like<'a>(&self, text: &'a str) -> Option<&'a str> {
        let trimmed = text.trim();
        let matches = trimmed.chars().count() > self.min_length
            || trimmed.starts_with(&self.opening_marker)
            || trimmed.contains(&self.sources_marker);
        matches.then_some(trimmed)
    }
}

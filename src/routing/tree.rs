//! Compressed prefix tree over route patterns.
//!
//! Patterns are made of literal text, `:name` segments that bind exactly one
//! path segment, and an optional trailing `*name` segment that binds the rest
//! of the path. Nodes are stored in an arena and addressed by index, which
//! keeps the tree cheap to clone for copy-on-write publication.

use serde::Serialize;
use std::fmt;

/// Error returned when a pattern cannot be added to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The pattern does not follow the pattern grammar.
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
    /// The pattern would make matching ambiguous with an existing route.
    Conflict { pattern: String, reason: String },
}

impl RouteError {
    fn invalid(pattern: &str, reason: &'static str) -> Self {
        RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        }
    }

    fn conflict(pattern: &str, reason: impl Into<String>) -> Self {
        RouteError::Conflict {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for [`RouteError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, RouteError::Conflict { .. })
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern '{}': {}", pattern, reason)
            }
            RouteError::Conflict { pattern, reason } => {
                write!(f, "route pattern '{}' conflicts: {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// A path parameter bound during lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Parameters bound by a match, in the order they appear in the pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Params(Vec<Param>);

impl Params {
    /// Get the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(key, value)| Param {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        )
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct Match<'t, T> {
    pub value: &'t T,
    /// The registered pattern that matched, e.g. `/users/:id`.
    pub pattern: &'t str,
    pub params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'p> {
    Static(&'p str),
    Param(&'p str),
    CatchAll(&'p str),
}

/// Split a pattern into literal runs and parameter pieces.
fn parse(pattern: &str) -> Result<Vec<Piece<'_>>, RouteError> {
    if !pattern.starts_with('/') {
        return Err(RouteError::invalid(pattern, "pattern must start with '/'"));
    }

    let mut pieces = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    let mut literal_start = 0;
    let mut pos = 1;
    let mut segments = pattern[1..].split('/').peekable();

    while let Some(segment) = segments.next() {
        let marker = segment.as_bytes().first().copied();
        if let Some(marker @ (b':' | b'*')) = marker {
            let name = &segment[1..];
            if name.is_empty() {
                return Err(RouteError::invalid(pattern, "parameter name must not be empty"));
            }
            if name.contains([':', '*']) {
                return Err(RouteError::invalid(pattern, "only one parameter per segment"));
            }
            if names.contains(&name) {
                return Err(RouteError::invalid(pattern, "duplicate parameter name"));
            }
            names.push(name);

            pieces.push(Piece::Static(&pattern[literal_start..pos]));
            if marker == b':' {
                pieces.push(Piece::Param(name));
                literal_start = pos + segment.len();
            } else {
                if segments.peek().is_some() {
                    return Err(RouteError::invalid(pattern, "wildcard must be the final segment"));
                }
                pieces.push(Piece::CatchAll(name));
                literal_start = pattern.len();
            }
        } else if segment.contains([':', '*']) {
            return Err(RouteError::invalid(pattern, "parameters must span a whole segment"));
        }
        pos += segment.len() + 1;
    }

    if literal_start < pattern.len() {
        pieces.push(Piece::Static(&pattern[literal_start..]));
    }
    Ok(pieces)
}

#[derive(Debug, Clone)]
enum NodeKind {
    Static,
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone)]
struct Leaf<T> {
    pattern: String,
    value: T,
}

#[derive(Debug, Clone)]
struct Node<T> {
    kind: NodeKind,
    /// Literal bytes consumed by this node. Empty for parameter nodes.
    prefix: Vec<u8>,
    /// First byte of each static child, parallel to `children`.
    indices: Vec<u8>,
    children: Vec<usize>,
    param: Option<usize>,
    wildcard: Option<usize>,
    leaf: Option<Leaf<T>>,
}

impl<T> Node<T> {
    fn new(kind: NodeKind, prefix: Vec<u8>) -> Self {
        Self {
            kind,
            prefix,
            indices: Vec::new(),
            children: Vec::new(),
            param: None,
            wildcard: None,
            leaf: None,
        }
    }

    fn child_for(&self, byte: u8) -> Option<usize> {
        self.indices
            .iter()
            .position(|&b| b == byte)
            .map(|i| self.children[i])
    }

    fn add_child(&mut self, byte: u8, id: usize) {
        self.indices.push(byte);
        self.children.push(id);
    }

    fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Param(name) | NodeKind::CatchAll(name) => name,
            NodeKind::Static => "",
        }
    }
}

/// Prefix-compressed route tree.
///
/// Invariant: no two static children of a node share a leading byte, so the
/// static branch taken at each node is decided by a single byte comparison.
#[derive(Debug, Clone)]
pub struct RouteTree<T> {
    nodes: Vec<Node<T>>,
    len: usize,
}

impl<T> Default for RouteTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouteTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Static, Vec::new())],
            len: 0,
        }
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add `pattern`, splitting nodes where it diverges from existing ones.
    ///
    /// The tree is left untouched when an error is returned.
    pub fn insert(&mut self, pattern: impl Into<String>, value: T) -> Result<(), RouteError> {
        let pattern = pattern.into();
        let pieces = parse(&pattern)?;
        self.check(&pattern, &pieces)?;
        let id = self.insert_pieces(&pieces);
        self.nodes[id].leaf = Some(Leaf { pattern, value });
        self.len += 1;
        Ok(())
    }

    /// Remove `pattern`, rebuilding the tree from the remaining routes.
    pub fn remove(&mut self, pattern: &str) -> Option<T> {
        let mut leaves: Vec<Leaf<T>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter_map(|node| node.leaf)
            .collect();
        let position = leaves.iter().position(|leaf| leaf.pattern == pattern);
        let removed = position.map(|i| leaves.swap_remove(i).value);

        *self = Self::new();
        for leaf in leaves {
            // A subset of conflict-free patterns is still conflict-free.
            let id = match parse(&leaf.pattern) {
                Ok(pieces) => self.insert_pieces(&pieces),
                Err(_) => continue,
            };
            self.nodes[id].leaf = Some(leaf);
            self.len += 1;
        }
        removed
    }

    /// Iterate over `(pattern, value)` pairs.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.nodes
            .iter()
            .filter_map(|node| node.leaf.as_ref())
            .map(|leaf| (leaf.pattern.as_str(), &leaf.value))
    }

    /// Value registered under exactly `pattern`, without matching.
    pub fn get(&self, pattern: &str) -> Option<&T> {
        self.routes()
            .find(|(registered, _)| *registered == pattern)
            .map(|(_, value)| value)
    }

    /// Resolve `path` to the most specific registered pattern.
    pub fn at<'t>(&'t self, path: &str) -> Option<Match<'t, T>> {
        let mut bound = Vec::new();
        let leaf = self.find(0, path, 0, &mut bound, &mut 0)?;
        Some(Match {
            value: &leaf.value,
            pattern: &leaf.pattern,
            params: bound.into_iter().collect(),
        })
    }

    /// Walk the existing tree along `pieces` without mutating it and report
    /// the first conflict.
    fn check(&self, pattern: &str, pieces: &[Piece<'_>]) -> Result<(), RouteError> {
        let mut cur = 0;
        for piece in pieces {
            match *piece {
                Piece::Static(literal) => {
                    let mut rest = literal.as_bytes();
                    while let Some(&first) = rest.first() {
                        let Some(child) = self.nodes[cur].child_for(first) else {
                            return Ok(());
                        };
                        let prefix = &self.nodes[child].prefix;
                        if !rest.starts_with(prefix) {
                            return Ok(());
                        }
                        rest = &rest[prefix.len()..];
                        cur = child;
                    }
                }
                Piece::Param(name) => match self.nodes[cur].param {
                    None => return Ok(()),
                    Some(param) if self.nodes[param].name() == name => cur = param,
                    Some(param) => {
                        return Err(RouteError::conflict(
                            pattern,
                            format!(
                                "parameter ':{}' already registered at this position as ':{}'",
                                name,
                                self.nodes[param].name()
                            ),
                        ));
                    }
                },
                Piece::CatchAll(_) => {
                    return match self.nodes[cur].wildcard {
                        Some(wild) => Err(RouteError::conflict(
                            pattern,
                            format!(
                                "wildcard '*{}' already registered at this position",
                                self.nodes[wild].name()
                            ),
                        )),
                        None => Ok(()),
                    };
                }
            }
        }

        if let Some(leaf) = &self.nodes[cur].leaf {
            return Err(RouteError::conflict(
                pattern,
                format!("'{}' is already registered", leaf.pattern),
            ));
        }
        Ok(())
    }

    /// Create the nodes for `pieces` and return the index of the final one.
    fn insert_pieces(&mut self, pieces: &[Piece<'_>]) -> usize {
        let mut cur = 0;
        for piece in pieces {
            cur = match *piece {
                Piece::Static(literal) => self.insert_static(cur, literal.as_bytes()),
                Piece::Param(name) => match self.nodes[cur].param {
                    Some(param) => param,
                    None => {
                        let id = self.push(Node::new(NodeKind::Param(name.to_string()), Vec::new()));
                        self.nodes[cur].param = Some(id);
                        id
                    }
                },
                Piece::CatchAll(name) => {
                    let id = self.push(Node::new(NodeKind::CatchAll(name.to_string()), Vec::new()));
                    self.nodes[cur].wildcard = Some(id);
                    id
                }
            };
        }
        cur
    }

    fn insert_static(&mut self, mut cur: usize, mut rest: &[u8]) -> usize {
        while let Some(&first) = rest.first() {
            let Some(child) = self.nodes[cur].child_for(first) else {
                let id = self.push(Node::new(NodeKind::Static, rest.to_vec()));
                self.nodes[cur].add_child(first, id);
                return id;
            };

            let common = self.nodes[child]
                .prefix
                .iter()
                .zip(rest)
                .take_while(|(a, b)| a == b)
                .count();
            if common < self.nodes[child].prefix.len() {
                self.split(child, common);
            }
            rest = &rest[common..];
            cur = child;
        }
        cur
    }

    /// Split node `id` so that it keeps the first `at` bytes of its prefix and
    /// a new child takes over the remainder with everything hanging off it.
    fn split(&mut self, id: usize, at: usize) {
        let node = &mut self.nodes[id];
        let tail = Node {
            kind: NodeKind::Static,
            prefix: node.prefix.split_off(at),
            indices: std::mem::take(&mut node.indices),
            children: std::mem::take(&mut node.children),
            param: node.param.take(),
            wildcard: node.wildcard.take(),
            leaf: node.leaf.take(),
        };
        let first = tail.prefix[0];
        let tail_id = self.push(tail);
        self.nodes[id].add_child(first, tail_id);
    }

    fn push(&mut self, node: Node<T>) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Match `path[pos..]` below node `id`. The node's own prefix has already
    /// been consumed. Parameter and wildcard children only hang off nodes whose
    /// consumed path ends in '/', so `pos` is always a char boundary there.
    fn find<'t, 'p>(
        &'t self,
        id: usize,
        path: &'p str,
        pos: usize,
        bound: &mut Vec<(&'t str, &'p str)>,
        visited: &mut usize,
    ) -> Option<&'t Leaf<T>> {
        *visited += 1;
        let node = &self.nodes[id];
        let rest = &path.as_bytes()[pos..];

        if let Some(&first) = rest.first() {
            if let Some(child) = node.child_for(first) {
                let prefix = &self.nodes[child].prefix;
                if rest.starts_with(prefix) {
                    if let Some(leaf) = self.find(child, path, pos + prefix.len(), bound, visited) {
                        return Some(leaf);
                    }
                }
            }

            if let Some(param) = node.param {
                let end = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
                if end > 0 {
                    bound.push((self.nodes[param].name(), &path[pos..pos + end]));
                    if let Some(leaf) = self.find(param, path, pos + end, bound, visited) {
                        return Some(leaf);
                    }
                    bound.pop();
                }
            }
        } else if let Some(leaf) = &node.leaf {
            return Some(leaf);
        }

        let wild = &self.nodes[node.wildcard?];
        let leaf = wild.leaf.as_ref()?;
        bound.push((wild.name(), &path[pos..]));
        Some(leaf)
    }
}

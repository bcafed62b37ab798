//! fresh-router: Zero-dependency path trie
//!
//! The matching core used by fresh-core. Every node owns one path segment,
//! the per-method payloads registered at that position, its literal
//! children and at most one parameter child.
//!
//! ## Path Syntax
//! - `literal` - matches exactly
//! - `{name}` - named parameter (captures one non-empty segment)
//!
//! ## Priority
//! 1. Exact literal match (highest)
//! 2. Parameter match
//!
//! With a single parameter child per node each level has one deterministic
//! choice, so lookup is O(depth) with no backtracking.
//!
//! ## Example
//! ```
//! use fresh_router::Tree;
//!
//! let mut tree = Tree::new();
//! tree.insert_with("GET", "/users", || 0).unwrap();
//! tree.insert_with("GET", "/users/{id}", || 1).unwrap();
//!
//! let found = tree.find("/users/123").unwrap();
//! assert_eq!(found.handler("GET"), Some(&1));
//! assert_eq!(found.params, vec![("id".to_string(), "123".to_string())]);
//! ```

pub mod path;

pub use path::Segment;

use std::collections::HashMap;
use std::fmt;

/// Registration failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// Empty segment inside a pattern (`/a//b`)
    EmptySegment,
    /// Malformed placeholder or stray brace
    InvalidSegment(String),
    /// Two different parameter names claimed at the same position
    ParamConflict {
        position: String,
        existing: String,
        requested: String,
    },
    /// One pattern binds the same name twice
    DuplicateParam(String),
    /// Empty method token
    EmptyMethod,
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::EmptySegment => f.write_str("empty path segment"),
            InsertError::InvalidSegment(s) => write!(f, "invalid path segment `{}`", s),
            InsertError::ParamConflict {
                position,
                existing,
                requested,
            } => write!(
                f,
                "parameter `{{{}}}` conflicts with `{{{}}}` already registered at `{}`",
                requested, existing, position
            ),
            InsertError::DuplicateParam(name) => {
                write!(f, "parameter `{{{}}}` bound twice in one pattern", name)
            }
            InsertError::EmptyMethod => f.write_str("empty method"),
        }
    }
}

impl std::error::Error for InsertError {}

/// Trie node
#[derive(Debug)]
pub struct Node<T> {
    segment: Segment,
    /// Method (upper-case) -> payload
    handlers: HashMap<String, T>,
    /// Literal children keyed by segment text
    children: HashMap<String, Node<T>>,
    /// The single parameter child, tried after literals
    param_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: Segment) -> Self {
        Self {
            segment,
            handlers: HashMap::new(),
            children: HashMap::new(),
            param_child: None,
        }
    }

    /// Segment owned by this node (the root owns an empty literal)
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Payload registered for a method
    pub fn handler(&self, method: &str) -> Option<&T> {
        self.handlers.get(&method.to_ascii_uppercase())
    }

    /// Whether any method is registered here
    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Registered methods, sorted
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Literal children followed by the parameter child
    pub fn children(&self) -> impl Iterator<Item = &Node<T>> {
        self.children.values().chain(self.param_child.as_deref())
    }

    fn count(&self) -> usize {
        1 + self.children().map(Node::count).sum::<usize>()
    }
}

/// Lookup result
#[derive(Debug)]
pub struct Found<'a, T> {
    /// Terminal node
    pub node: &'a Node<T>,
    /// Captured path parameters as (name, value) pairs, in path order
    pub params: Vec<(String, String)>,
}

impl<'a, T> Found<'a, T> {
    /// Payload for a method on the terminal node
    pub fn handler(&self, method: &str) -> Option<&'a T> {
        self.node.handler(method)
    }

    /// Get params as HashMap for convenient access
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }
}

/// One registered (method, pattern) pair
#[derive(Debug)]
pub struct RouteInfo<'a, T> {
    pub method: &'a str,
    pub pattern: String,
    pub value: &'a T,
}

/// Path trie with per-method payloads
#[derive(Debug)]
pub struct Tree<T> {
    root: Node<T>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            root: Node::new(Segment::Literal(String::new())),
        }
    }
}

impl<T> Tree<T> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or extend the path for `pattern` and return the payload slot
    /// for `method`
    ///
    /// `make` runs only when the slot is empty. An existing payload is
    /// returned as-is so callers can update it in place.
    ///
    /// # Example
    /// ```
    /// use fresh_router::Tree;
    ///
    /// let mut tree: Tree<Vec<&str>> = Tree::new();
    /// tree.insert_with("GET", "/todos/{id}", Vec::new).unwrap().push("a");
    /// tree.insert_with("GET", "/todos/{id}", Vec::new).unwrap().push("b");
    ///
    /// let found = tree.find("/todos/7").unwrap();
    /// assert_eq!(found.handler("GET"), Some(&vec!["a", "b"]));
    /// ```
    pub fn insert_with<F>(&mut self, method: &str, pattern: &str, make: F) -> Result<&mut T, InsertError>
    where
        F: FnOnce() -> T,
    {
        if method.is_empty() {
            return Err(InsertError::EmptyMethod);
        }
        let segments = path::split(pattern)
            .into_iter()
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if seen.contains(&name) {
                    return Err(InsertError::DuplicateParam(name.clone()));
                }
                seen.push(name);
            }
        }

        let mut node = &mut self.root;
        for (depth, segment) in segments.into_iter().enumerate() {
            node = match segment {
                Segment::Literal(text) => node
                    .children
                    .entry(text.clone())
                    .or_insert_with(|| Node::new(Segment::Literal(text))),
                Segment::Param(name) => {
                    let child = node
                        .param_child
                        .get_or_insert_with(|| Box::new(Node::new(Segment::Param(name.clone()))));
                    if child.segment.as_str() != name {
                        return Err(InsertError::ParamConflict {
                            position: position(pattern, depth),
                            existing: child.segment.as_str().to_string(),
                            requested: name,
                        });
                    }
                    &mut **child
                }
            };
        }

        Ok(node
            .handlers
            .entry(method.to_ascii_uppercase())
            .or_insert_with(make))
    }

    /// Walk the tree for a request path
    ///
    /// Returns the terminal node and captured params, or `None` if the path
    /// dead-ends. The node may have no payloads (an intermediate position);
    /// callers decide what that means.
    pub fn find(&self, path: &str) -> Option<Found<'_, T>> {
        let mut node = &self.root;
        let mut params = Vec::new();

        for segment in path::split(path) {
            // Priority 1: exact literal
            if let Some(child) = node.children.get(segment) {
                node = child;
                continue;
            }
            // Priority 2: the parameter fallback, never binding ""
            match node.param_child.as_deref() {
                Some(child) if !segment.is_empty() => {
                    params.push((child.segment.as_str().to_string(), segment.to_string()));
                    node = child;
                }
                _ => return None,
            }
        }

        Some(Found { node, params })
    }

    /// All registered routes, sorted by pattern then method
    pub fn routes(&self) -> Vec<RouteInfo<'_, T>> {
        fn walk<'a, T>(node: &'a Node<T>, prefix: &str, out: &mut Vec<RouteInfo<'a, T>>) {
            let pattern = if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
            for (method, value) in &node.handlers {
                out.push(RouteInfo {
                    method,
                    pattern: pattern.clone(),
                    value,
                });
            }
            for child in node.children() {
                walk(child, &format!("{}/{}", prefix, child.segment), out);
            }
        }

        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out.sort_by(|a, b| a.pattern.cmp(&b.pattern).then_with(|| a.method.cmp(b.method)));
        out
    }

    /// Number of nodes including the root
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Number of registered (method, pattern) slots
    pub fn len(&self) -> usize {
        fn slots<T>(node: &Node<T>) -> usize {
            node.handlers.len() + node.children().map(slots).sum::<usize>()
        }
        slots(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> &Node<T> {
        &self.root
    }
}

// `/a/{b}` prefix of `pattern` up to and including `depth`, for errors
fn position(pattern: &str, depth: usize) -> String {
    let mut out = String::new();
    for segment in path::split(pattern).into_iter().take(depth + 1) {
        out.push('/');
        out.push_str(segment);
    }
    out
}

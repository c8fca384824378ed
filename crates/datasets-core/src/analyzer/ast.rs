//! Read-only syntax tree consumed by the analyzers.
//!
//! Scripts are parsed with tree-sitter's Python grammar and lowered into a
//! small closed set of node kinds: the handful the dataset conventions are
//! written in (`Module`, `Block`, `Assign`, `Call`, `Attribute`, `Name`,
//! `Constant`) plus an `Other` catch-all that only keeps its children so
//! traversals still reach nested calls. Keyword arguments live on `Call` as
//! an ordered name -> value map.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::Serialize;

use crate::errors::{DatasetsError, DatasetsResult};

// ---------------------------------------------------------------------------
// Node types
// ---------------------------------------------------------------------------

/// Location of a node in the source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based.
    pub line: usize,
    /// 0-based, in bytes.
    pub column: usize,
}

/// A literal value.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Str(String),
    /// Integer or float literal, kept as written.
    Number(String),
    Bool(bool),
    None,
    Ellipsis,
}

impl Constant {
    /// Textual value of the literal; `None` and `...` have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Constant::Str(s) | Constant::Number(s) => Some(s.clone()),
            Constant::Bool(true) => Some("True".to_string()),
            Constant::Bool(false) => Some("False".to_string()),
            Constant::None | Constant::Ellipsis => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub func: Box<Node>,
    /// Positional arguments, including `*args` / `**kwargs` splats.
    pub args: Vec<Node>,
    /// Named arguments in source order. A repeated name keeps its first value.
    pub keywords: IndexMap<String, Node>,
}

impl Call {
    pub fn keyword(&self, name: &str) -> Option<&Node> {
        self.keywords.get(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Top-level statement list.
    Module(Vec<Node>),
    /// Nested statement list (function bodies, branches, loops).
    Block(Vec<Node>),
    Assign {
        targets: Vec<Node>,
        value: Box<Node>,
    },
    Call(Call),
    Attribute {
        value: Box<Node>,
        attr: String,
    },
    Name(String),
    Constant(Constant),
    Other {
        kind: String,
        children: Vec<Node>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            NodeKind::Module(_) => "module",
            NodeKind::Block(_) => "block",
            NodeKind::Assign { .. } => "assign",
            NodeKind::Call(_) => "call",
            NodeKind::Attribute { .. } => "attribute",
            NodeKind::Name(_) => "name",
            NodeKind::Constant(_) => "constant",
            NodeKind::Other { kind, .. } => kind,
        }
    }

    /// Direct children in field order (callee, positional args, keyword values).
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Module(stmts) | NodeKind::Block(stmts) => stmts.iter().collect(),
            NodeKind::Assign { targets, value } => {
                targets.iter().chain(std::iter::once(value.as_ref())).collect()
            }
            NodeKind::Call(call) => std::iter::once(call.func.as_ref())
                .chain(call.args.iter())
                .chain(call.keywords.values())
                .collect(),
            NodeKind::Attribute { value, .. } => vec![value.as_ref()],
            NodeKind::Other { children, .. } => children.iter().collect(),
            NodeKind::Name(_) | NodeKind::Constant(_) => Vec::new(),
        }
    }

    /// Statements of a `Module` or `Block`; empty for every other kind.
    /// A statement's position in this slice is its statement index.
    pub fn statements(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Module(stmts) | NodeKind::Block(stmts) => stmts,
            _ => &[],
        }
    }

    /// Breadth-first traversal starting at (and including) this node.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            queue: VecDeque::from([self]),
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            NodeKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Name(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<(&Node, &str)> {
        match &self.kind {
            NodeKind::Attribute { value, attr } => Some((value.as_ref(), attr.as_str())),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            NodeKind::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    pub fn as_assign(&self) -> Option<(&[Node], &Node)> {
        match &self.kind {
            NodeKind::Assign { targets, value } => Some((targets.as_slice(), value.as_ref())),
            _ => None,
        }
    }
}

/// Breadth-first iterator returned by [`Node::walk`].
pub struct Walk<'a> {
    queue: VecDeque<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;
        self.queue.extend(node.children());
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// tree-sitter front-end
// ---------------------------------------------------------------------------

/// Deepest syntax nesting the lowering pass accepts. Lowering is recursive,
/// so this bounds stack use on worker threads.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Parse Python source into a `Module` node.
///
/// Sources with syntax errors, or nested deeper than [`MAX_NESTING_DEPTH`],
/// are rejected rather than analyzed partially.
pub fn parse_module(source: &str) -> DatasetsResult<Node> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| DatasetsError::Parse(format!("Failed to set language: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| DatasetsError::Parse("Parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(root).unwrap_or(root);
        let pos = at.start_position();
        return Err(DatasetsError::Parse(format!(
            "Syntax error at line {}, column {}",
            pos.row + 1,
            pos.column
        )));
    }

    Lowerer { source, depth: 0 }.lower(root)
}

/// Leftmost error or missing node, found without recursion.
fn first_error(root: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    let mut node = root;
    loop {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let next = node
            .children(&mut cursor)
            .find(|child| child.has_error() || child.is_missing());
        node = next?;
    }
}

fn span_of(node: tree_sitter::Node<'_>) -> Span {
    let pos = node.start_position();
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        line: pos.row + 1,
        column: pos.column,
    }
}

/// Named children minus comments, which never count as statements.
fn named_children(node: tree_sitter::Node<'_>) -> Vec<tree_sitter::Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

struct Lowerer<'s> {
    source: &'s str,
    depth: usize,
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: tree_sitter::Node<'_>) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn lower(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<Node> {
        if self.depth >= MAX_NESTING_DEPTH {
            let pos = node.start_position();
            return Err(DatasetsError::Parse(format!(
                "Expression nesting too deep at line {}, column {} (limit {MAX_NESTING_DEPTH})",
                pos.row + 1,
                pos.column
            )));
        }
        self.depth += 1;
        let lowered = self.lower_node(node);
        self.depth -= 1;
        lowered
    }

    fn lower_node(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<Node> {
        let span = span_of(node);
        let kind = match node.kind() {
            "module" => NodeKind::Module(self.lower_all(node)?),
            "block" => NodeKind::Block(self.lower_all(node)?),
            "expression_statement" => return self.expression_statement(node),
            "parenthesized_expression" => {
                let inner = named_children(node);
                match inner.as_slice() {
                    [only] => return self.lower(*only),
                    _ => self.other(node)?,
                }
            }
            "identifier" => NodeKind::Name(self.text(node).to_string()),
            "attribute" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attr)) => NodeKind::Attribute {
                    value: Box::new(self.lower(object)?),
                    attr: self.text(attr).to_string(),
                },
                _ => self.other(node)?,
            },
            "call" => self.call(node)?,
            "string" => match self.string_value(node) {
                Some(value) => NodeKind::Constant(Constant::Str(value)),
                None => self.other(node)?,
            },
            "concatenated_string" => {
                let parts: Option<Vec<String>> = named_children(node)
                    .into_iter()
                    .map(|part| self.string_value(part))
                    .collect();
                match parts {
                    Some(parts) => NodeKind::Constant(Constant::Str(parts.concat())),
                    None => self.other(node)?,
                }
            }
            "integer" | "float" => NodeKind::Constant(Constant::Number(self.text(node).to_string())),
            "true" => NodeKind::Constant(Constant::Bool(true)),
            "false" => NodeKind::Constant(Constant::Bool(false)),
            "none" => NodeKind::Constant(Constant::None),
            "ellipsis" => NodeKind::Constant(Constant::Ellipsis),
            _ => self.other(node)?,
        };
        Ok(Node { kind, span })
    }

    fn lower_all(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<Vec<Node>> {
        named_children(node)
            .into_iter()
            .map(|child| self.lower(child))
            .collect()
    }

    fn other(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<NodeKind> {
        Ok(NodeKind::Other {
            kind: node.kind().to_string(),
            children: self.lower_all(node)?,
        })
    }

    /// `x = ...` becomes an `Assign` statement; any other expression
    /// statement keeps a wrapper so statement depth matches the host AST.
    fn expression_statement(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<Node> {
        let children = named_children(node);
        if let [only] = children.as_slice() {
            if only.kind() == "assignment" {
                if let Some(assign) = self.assignment(node, *only)? {
                    return Ok(assign);
                }
            }
        }
        Ok(Node {
            kind: self.other(node)?,
            span: span_of(node),
        })
    }

    /// Flatten `a = b = value` into one `Assign` with two targets.
    /// Annotated assignments (`x: T = v`) are not plain assignments.
    fn assignment(
        &mut self,
        statement: tree_sitter::Node<'_>,
        node: tree_sitter::Node<'_>,
    ) -> DatasetsResult<Option<Node>> {
        let mut targets = Vec::new();
        let mut current = node;
        loop {
            if current.child_by_field_name("type").is_some() {
                return Ok(None);
            }
            let (Some(left), Some(right)) = (
                current.child_by_field_name("left"),
                current.child_by_field_name("right"),
            ) else {
                return Ok(None);
            };
            targets.push(self.lower(left)?);
            if right.kind() == "assignment" {
                current = right;
                continue;
            }
            return Ok(Some(Node {
                kind: NodeKind::Assign {
                    targets,
                    value: Box::new(self.lower(right)?),
                },
                span: span_of(statement),
            }));
        }
    }

    fn call(&mut self, node: tree_sitter::Node<'_>) -> DatasetsResult<NodeKind> {
        let Some(function) = node.child_by_field_name("function") else {
            return self.other(node);
        };

        let mut args = Vec::new();
        let mut keywords = IndexMap::new();

        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() == "argument_list" {
                for arg in named_children(arguments) {
                    let named = if arg.kind() == "keyword_argument" {
                        arg.child_by_field_name("name")
                            .zip(arg.child_by_field_name("value"))
                    } else {
                        None
                    };
                    match named {
                        Some((name, value)) => {
                            let name = self.text(name).to_string();
                            if !keywords.contains_key(&name) {
                                let value = self.lower(value)?;
                                keywords.insert(name, value);
                            }
                        }
                        None => args.push(self.lower(arg)?),
                    }
                }
            } else {
                // Bare generator argument: `f(x for x in y)`.
                args.push(self.lower(arguments)?);
            }
        }

        Ok(NodeKind::Call(Call {
            func: Box::new(self.lower(function)?),
            args,
            keywords,
        }))
    }

    /// Literal value of a `string` node, or `None` for f-strings.
    fn string_value(&self, node: tree_sitter::Node<'_>) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }

        let mut raw = false;
        let mut value = String::new();
        for child in named_children(node) {
            match child.kind() {
                "string_start" => {
                    let prefix: String = self
                        .text(child)
                        .chars()
                        .take_while(|c| *c != '\'' && *c != '"')
                        .collect::<String>()
                        .to_ascii_lowercase();
                    if prefix.contains('f') {
                        return None;
                    }
                    raw = prefix.contains('r');
                }
                "string_content" => value.push_str(self.text(child)),
                "interpolation" => return None,
                _ => {}
            }
        }

        Some(if raw { value } else { unescape(&value) })
    }
}

/// Resolve the common backslash escapes of a non-raw string literal.
fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_statement(source: &str) -> Node {
        let module = parse_module(source).unwrap();
        module.statements()[0].clone()
    }

    #[test]
    fn test_module_statement_indices_skip_comments() {
        let module = parse_module("# header\nimport os\n\n# note\nx = 1\n").unwrap();
        let stmts = module.statements();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].kind_name(), "import_statement");
        assert!(stmts[1].as_assign().is_some());
    }

    #[test]
    fn test_assignment_lowering() {
        let stmt = first_statement("x = Datasets.R1C0.get(version='latest')\n");
        let (targets, value) = stmt.as_assign().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].as_name(), Some("x"));

        let call = value.as_call().unwrap();
        let (receiver, method) = call.func.as_attribute().unwrap();
        assert_eq!(method, "get");
        let (root, dataset) = receiver.as_attribute().unwrap();
        assert_eq!(dataset, "R1C0");
        assert_eq!(root.as_name(), Some("Datasets"));
        assert_eq!(
            call.keyword("version").and_then(Node::as_constant),
            Some(&Constant::Str("latest".to_string()))
        );
    }

    #[test]
    fn test_chained_assignment_has_two_targets() {
        let stmt = first_statement("a = b = f()\n");
        let (targets, value) = stmt.as_assign().unwrap();
        let names: Vec<_> = targets.iter().filter_map(Node::as_name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(value.as_call().is_some());
    }

    #[test]
    fn test_annotated_assignment_is_not_assign() {
        let stmt = first_statement("x: int = f()\n");
        assert!(stmt.as_assign().is_none());
        assert!(stmt.walk().any(|n| n.as_call().is_some()));
    }

    #[test]
    fn test_parentheses_are_transparent() {
        let stmt = first_statement("(Datasets\n    .R1C0\n    .get())\n");
        let call = stmt.walk().find_map(Node::as_call).unwrap();
        let (receiver, _) = call.func.as_attribute().unwrap();
        assert!(receiver.as_attribute().is_some());
    }

    #[test]
    fn test_constants() {
        let stmt = first_statement("f(a='x', b=1, c=True, d=None, e=..., g=f'{x}', h='a' 'b')\n");
        let call = stmt.walk().find_map(Node::as_call).unwrap();
        let constant = |name: &str| call.keyword(name).and_then(Node::as_constant).cloned();
        assert_eq!(constant("a"), Some(Constant::Str("x".to_string())));
        assert_eq!(constant("b"), Some(Constant::Number("1".to_string())));
        assert_eq!(constant("c"), Some(Constant::Bool(true)));
        assert_eq!(constant("d"), Some(Constant::None));
        assert_eq!(constant("e"), Some(Constant::Ellipsis));
        assert_eq!(constant("g"), None);
        assert_eq!(constant("h"), Some(Constant::Str("ab".to_string())));
    }

    #[test]
    fn test_splats_are_positional() {
        let stmt = first_statement("f(*args, k='one', **rest)\n");
        let call = stmt.walk().find_map(Node::as_call).unwrap();
        assert_eq!(call.keywords.len(), 1);
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn test_walk_reaches_nested_blocks() {
        let source = "def run():\n    if True:\n        Datasets.R1C0.get()\n";
        let module = parse_module(source).unwrap();
        assert_eq!(module.walk().filter(|n| n.as_call().is_some()).count(), 1);
        assert!(module.walk().any(|n| matches!(n.kind, NodeKind::Block(_))));
    }

    #[test]
    fn test_walk_is_breadth_first() {
        let module = parse_module("f(g())\nh()\n").unwrap();
        let callees: Vec<_> = module
            .walk()
            .filter_map(Node::as_call)
            .filter_map(|c| c.func.as_name())
            .collect();
        assert_eq!(callees, vec!["f", "h", "g"]);
    }

    #[test]
    fn test_span_is_one_based() {
        let module = parse_module("import os\nx = 1\n").unwrap();
        let span = module.statements()[1].span;
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 0);
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let err = parse_module("x = (\n").unwrap_err();
        assert!(matches!(err, DatasetsError::Parse(_)));
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let deep = format!("x = 1{}\n", " + 1".repeat(5000));
        let err = parse_module(&deep).unwrap_err();
        assert!(matches!(err, DatasetsError::Parse(_)));
        assert!(err.to_string().contains("nesting too deep"), "{err}");

        let shallow = format!("x = 1{}\n", " + 1".repeat(100));
        assert!(parse_module(&shallow).is_ok());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb"), "a\nb");
        assert_eq!(unescape(r"it\'s"), "it's");
        assert_eq!(unescape(r"\d"), r"\d");
    }
}

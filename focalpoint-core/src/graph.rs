//! Flow graph decoding.
//!
//! Peers describe the flow around a key as a Graphviz DOT digraph. Nodes
//! carry `label`, `pubkey`, `ranking`, `locale` and `fIndex` attributes;
//! edges carry a `weight`. [`decode_graph`] turns that text into typed
//! nodes and links and applies the ranking filter: nodes are filtered
//! first, then any link touching a dropped node is dropped too.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{FocalError, FocalResult};

/// A key in the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub pubkey: String,
    /// Fraction in `0..=1`. Zero when the peer sent none or sent something
    /// unparsable, so such a node only passes a zero threshold.
    pub ranking: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, rename = "localeIndex", skip_serializing_if = "Option::is_none")]
    pub locale_index: Option<u32>,
}

/// A weighted, directed link between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub value: f64,
}

/// Decoded graph, nodes in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl FlowGraph {
    /// Parse DOT text without filtering. Empty text is an empty graph.
    pub fn parse(text: &str) -> FocalResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let dot = Parser::new(tokenize(text)?).parse()?;

        let nodes = dot
            .nodes
            .into_iter()
            .map(|(id, attrs)| GraphNode {
                label: attrs.get("label").cloned().unwrap_or_default(),
                pubkey: attrs.get("pubkey").cloned().unwrap_or_default(),
                ranking: number(&attrs, "ranking").unwrap_or(0.0),
                locale: attrs.get("locale").cloned(),
                locale_index: attrs.get("fIndex").and_then(|v| v.trim().parse().ok()),
                id,
            })
            .collect();
        let links = dot
            .edges
            .into_iter()
            .map(|edge| GraphLink {
                value: number(&edge.attrs, "weight").unwrap_or(0.0),
                source: edge.from,
                target: edge.to,
            })
            .collect();

        Ok(Self { nodes, links })
    }

    /// Keep nodes that are the focal key or rank at least
    /// `threshold_percent / 100`, then links whose ends both survived.
    pub fn filtered(self, focal_key: &str, threshold_percent: f64) -> Self {
        let threshold = threshold_percent / 100.0;
        let nodes: Vec<GraphNode> = self
            .nodes
            .into_iter()
            .filter(|node| node.pubkey == focal_key || node.ranking >= threshold)
            .collect();

        let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let links = self
            .links
            .into_iter()
            .filter(|link| kept.contains(link.source.as_str()) && kept.contains(link.target.as_str()))
            .collect();

        Self { nodes, links }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Parse and filter a graph snapshot for display around `focal_key`.
pub fn decode_graph(text: &str, focal_key: &str, threshold_percent: f64) -> FocalResult<FlowGraph> {
    Ok(FlowGraph::parse(text)?.filtered(focal_key, threshold_percent))
}

fn number(attrs: &Attrs, key: &str) -> Option<f64> {
    attrs
        .get(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn malformed(msg: impl Into<String>) -> FocalError {
    FocalError::Protocol(format!("malformed graph: {}", msg.into()))
}

// DOT lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare identifier or numeral; may be a keyword.
    Id(String),
    /// Quoted or HTML string; never a keyword.
    Quoted(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Equals,
    Colon,
    EdgeOp,
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(text: &str) -> FocalResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                loop {
                    if i + 1 >= chars.len() {
                        return Err(malformed("unterminated comment"));
                    }
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '-' if matches!(next, Some('>') | Some('-')) => {
                tokens.push(Token::EdgeOp);
                i += 2;
            }
            '"' => {
                i += 1;
                let mut value = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(malformed("unterminated string")),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if chars.get(i + 1) == Some(&'"') => {
                            value.push('"');
                            i += 2;
                        }
                        Some('\\') if chars.get(i + 1) == Some(&'\n') => i += 2,
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            '<' => {
                let mut depth = 1;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(malformed("unterminated html string")),
                        Some('<') => depth += 1,
                        Some('>') => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    value.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Quoted(value));
            }
            c if is_id_char(c) || c == '-' => {
                let start = i;
                i += 1;
                while let Some(&ch) = chars.get(i) {
                    let edge_follows = ch == '-' && matches!(chars.get(i + 1), Some('>') | Some('-'));
                    if is_id_char(ch) || (ch == '-' && !edge_follows) {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Id(chars[start..i].iter().collect()));
            }
            other => return Err(malformed(format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

// DOT parser

type Attrs = HashMap<String, String>;

struct DotEdge {
    from: String,
    to: String,
    attrs: Attrs,
}

#[derive(Default)]
struct DotGraph {
    nodes: Vec<(String, Attrs)>,
    index: HashMap<String, usize>,
    edges: Vec<DotEdge>,
}

/// Default attributes in effect for a (sub)graph body.
#[derive(Clone, Default)]
struct Scope {
    node: Attrs,
    edge: Attrs,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    graph: DotGraph,
    /// Node ids mentioned inside each open subgraph.
    mentions: Vec<Vec<String>>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            graph: DotGraph::default(),
            mentions: Vec::new(),
        }
    }

    fn parse(mut self) -> FocalResult<DotGraph> {
        if self.at_keyword("strict") {
            self.pos += 1;
        }
        if self.at_keyword("digraph") || self.at_keyword("graph") {
            self.pos += 1;
        } else {
            return Err(malformed("expected graph or digraph"));
        }
        if matches!(self.peek(), Some(Token::Id(_) | Token::Quoted(_))) {
            self.pos += 1;
        }
        self.expect(&Token::LBrace)?;
        self.parse_statements(&mut Scope::default())?;
        self.expect(&Token::RBrace)?;
        if self.pos != self.tokens.len() {
            return Err(malformed("trailing input after graph"));
        }
        Ok(self.graph)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Id(id)) if id.eq_ignore_ascii_case(keyword))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> FocalResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(malformed(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn expect_id(&mut self) -> FocalResult<String> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Id(id) | Token::Quoted(id)) => {
                self.pos += 1;
                Ok(id)
            }
            other => Err(malformed(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_statements(&mut self, scope: &mut Scope) -> FocalResult<()> {
        loop {
            match self.peek() {
                None => return Err(malformed("unterminated graph body")),
                Some(Token::RBrace) => return Ok(()),
                Some(Token::Semi | Token::Comma) => self.pos += 1,
                Some(_) => self.parse_statement(scope)?,
            }
        }
    }

    fn parse_statement(&mut self, scope: &mut Scope) -> FocalResult<()> {
        let attr_list_follows = self.peek_at(1) == Some(&Token::LBracket);
        if attr_list_follows && self.at_keyword("graph") {
            self.pos += 1;
            self.parse_attr_lists()?;
            return Ok(());
        }
        if attr_list_follows && self.at_keyword("node") {
            self.pos += 1;
            let attrs = self.parse_attr_lists()?;
            scope.node.extend(attrs);
            return Ok(());
        }
        if attr_list_follows && self.at_keyword("edge") {
            self.pos += 1;
            let attrs = self.parse_attr_lists()?;
            scope.edge.extend(attrs);
            return Ok(());
        }
        // `id = value` at statement level sets a graph attribute.
        if matches!(self.peek(), Some(Token::Id(_) | Token::Quoted(_)))
            && self.peek_at(1) == Some(&Token::Equals)
        {
            self.pos += 2;
            self.expect_id()?;
            return Ok(());
        }

        let is_subgraph = self.at_keyword("subgraph") || self.peek() == Some(&Token::LBrace);
        let first = self.parse_operand(scope)?;

        if self.peek() == Some(&Token::EdgeOp) {
            let mut operands = vec![first];
            while self.eat(&Token::EdgeOp) {
                operands.push(self.parse_operand(scope)?);
            }
            let mut attrs = scope.edge.clone();
            attrs.extend(self.parse_attr_lists()?);
            for pair in operands.windows(2) {
                for from in &pair[0] {
                    for to in &pair[1] {
                        self.graph.edges.push(DotEdge {
                            from: from.clone(),
                            to: to.clone(),
                            attrs: attrs.clone(),
                        });
                    }
                }
            }
        } else if !is_subgraph {
            let attrs = self.parse_attr_lists()?;
            if let Some(id) = first.first() {
                let index = self.graph.index[id];
                self.graph.nodes[index].1.extend(attrs);
            }
        }
        Ok(())
    }

    /// A node id or a subgraph; returns the node ids it stands for.
    fn parse_operand(&mut self, scope: &Scope) -> FocalResult<Vec<String>> {
        if self.at_keyword("subgraph") || self.peek() == Some(&Token::LBrace) {
            return self.parse_subgraph(scope);
        }
        let id = self.expect_id()?;
        // Ports are accepted and ignored.
        if self.eat(&Token::Colon) {
            self.expect_id()?;
            if self.eat(&Token::Colon) {
                self.expect_id()?;
            }
        }
        self.touch_node(&id, &scope.node);
        Ok(vec![id])
    }

    fn parse_subgraph(&mut self, scope: &Scope) -> FocalResult<Vec<String>> {
        if self.at_keyword("subgraph") {
            self.pos += 1;
            if self.peek() != Some(&Token::LBrace) {
                self.expect_id()?;
            }
        }
        self.expect(&Token::LBrace)?;
        self.mentions.push(Vec::new());
        let mut inner = scope.clone();
        let body = self.parse_statements(&mut inner);
        let mentioned = self.mentions.pop().unwrap_or_default();
        body?;
        self.expect(&Token::RBrace)?;
        Ok(mentioned)
    }

    fn parse_attr_lists(&mut self) -> FocalResult<Attrs> {
        let mut attrs = Attrs::new();
        while self.eat(&Token::LBracket) {
            loop {
                match self.peek() {
                    Some(Token::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(Token::Semi | Token::Comma) => self.pos += 1,
                    _ => {
                        let key = self.expect_id()?;
                        self.expect(&Token::Equals)?;
                        let value = self.expect_id()?;
                        attrs.insert(key, value);
                    }
                }
            }
        }
        Ok(attrs)
    }

    fn touch_node(&mut self, id: &str, defaults: &Attrs) {
        if !self.graph.index.contains_key(id) {
            self.graph.index.insert(id.to_string(), self.graph.nodes.len());
            self.graph.nodes.push((id.to_string(), defaults.clone()));
        }
        for frame in &mut self.mentions {
            if !frame.iter().any(|m| m == id) {
                frame.push(id.to_string());
            }
        }
    }
}

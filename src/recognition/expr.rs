//! Expression languages used by `MultiRecognition`.
//!
//! Two small languages share one lexer:
//!
//! - logic: `$0 AND NOT ({Popup} OR $1)` decides pass/fail from which
//!   references produced a region
//! - ROI: `OFFSET(UNION($0, {Anchor}), -10, 0, 20, 0)` computes a region
//!
//! `$i` refers to the i-th node run in the current pass, `{Name}` to a node
//! that already ran earlier in the same task. Both are parsed into trees and
//! evaluated against `Bindings`; nothing is ever evaluated as text.

use regex::Regex;
use std::fmt;
use thiserror::Error;

use super::roi;
use crate::host::Rect;

/// One token: `$i`, `{Name}`, an identifier, an integer, or punctuation.
const TOKEN_PATTERN: &str =
    r"^(?:\$(\d+)|\{([^{}]+)\}|([A-Za-z_][A-Za-z0-9_]*)|([-+]?\d+)|([()\[\],]))";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character at {pos}: {rest:?}")]
    Lex { pos: usize, rest: String },
    #[error("unexpected {found}, expected {expected}")]
    Unexpected { found: String, expected: &'static str },
    #[error("unexpected end of expression, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("integer out of range: {0}")]
    Number(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{func} takes {expected} arguments, got {got}")]
    Arity {
        func: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("argument {index} of {func} must be {expected}")]
    ArgType {
        func: &'static str,
        index: usize,
        expected: &'static str,
    },
    #[error("${0} does not refer to a node of this pass")]
    IndexOutOfRange(usize),
    #[error("expression does not evaluate to a region")]
    NotARegion,
    #[error("lexer unavailable: {0}")]
    Pattern(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Index(usize),
    External(String),
    Ident(String),
    Int(i32),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Index(i) => write!(f, "${}", i),
            Token::External(name) => write!(f, "{{{}}}", name),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Int(n) => write!(f, "{}", n),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let pattern = Regex::new(TOKEN_PATTERN).map_err(|e| ExprError::Pattern(e.to_string()))?;
    let mut tokens = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &src[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return Ok(tokens);
        }

        let caps = pattern.captures(trimmed).ok_or_else(|| ExprError::Lex {
            pos,
            rest: trimmed.to_string(),
        })?;
        let token = if let Some(m) = caps.get(1) {
            let index = m
                .as_str()
                .parse()
                .map_err(|_| ExprError::Number(m.as_str().to_string()))?;
            Token::Index(index)
        } else if let Some(m) = caps.get(2) {
            Token::External(m.as_str().to_string())
        } else if let Some(m) = caps.get(3) {
            Token::Ident(m.as_str().to_string())
        } else if let Some(m) = caps.get(4) {
            let n = m
                .as_str()
                .parse()
                .map_err(|_| ExprError::Number(m.as_str().to_string()))?;
            Token::Int(n)
        } else {
            match &caps[5] {
                "(" => Token::LParen,
                ")" => Token::RParen,
                "[" => Token::LBracket,
                "]" => Token::RBracket,
                _ => Token::Comma,
            }
        };
        tokens.push(token);
        pos += caps[0].len();
    }
}

/// Values references resolve to during evaluation.
pub trait Bindings {
    /// Region of the i-th in-pass node: `None` if the index is out of
    /// range, `Some(None)` if that node found nothing.
    fn node(&self, index: usize) -> Option<Option<Rect>>;

    /// Region of an already-executed node, `None` if it found nothing or
    /// never ran.
    fn external(&mut self, name: &str) -> Option<Rect>;
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ExprError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ExprError> {
        let token = self.next(expected)?;
        if token == want {
            Ok(())
        } else {
            Err(ExprError::Unexpected {
                found: token.to_string(),
                expected,
            })
        }
    }

    fn finish(&self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExprError::Unexpected {
                found: token.to_string(),
                expected: "end of expression",
            }),
        }
    }

    fn peek_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if Keyword::of(name) == Some(keyword))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
    True,
    False,
}

impl Keyword {
    fn of(ident: &str) -> Option<Keyword> {
        match ident {
            "AND" | "and" => Some(Keyword::And),
            "OR" | "or" => Some(Keyword::Or),
            "NOT" | "not" => Some(Keyword::Not),
            "TRUE" | "True" | "true" => Some(Keyword::True),
            "FALSE" | "False" | "false" => Some(Keyword::False),
            _ => None,
        }
    }
}

/// Boolean expression over node references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogicExpr {
    Const(bool),
    Node(usize),
    External(String),
    Not(Box<LogicExpr>),
    And(Box<LogicExpr>, Box<LogicExpr>),
    Or(Box<LogicExpr>, Box<LogicExpr>),
}

/// Parses a logic expression. `NOT` binds tighter than `AND`, which binds
/// tighter than `OR`.
pub fn parse_logic(src: &str) -> Result<LogicExpr, ExprError> {
    let mut parser = Parser::new(tokenize(src)?);
    let expr = logic_or(&mut parser)?;
    parser.finish()?;
    Ok(expr)
}

fn logic_or(p: &mut Parser) -> Result<LogicExpr, ExprError> {
    let mut lhs = logic_and(p)?;
    while p.peek_keyword(Keyword::Or) {
        p.pos += 1;
        let rhs = logic_and(p)?;
        lhs = LogicExpr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn logic_and(p: &mut Parser) -> Result<LogicExpr, ExprError> {
    let mut lhs = logic_not(p)?;
    while p.peek_keyword(Keyword::And) {
        p.pos += 1;
        let rhs = logic_not(p)?;
        lhs = LogicExpr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn logic_not(p: &mut Parser) -> Result<LogicExpr, ExprError> {
    if p.peek_keyword(Keyword::Not) {
        p.pos += 1;
        return Ok(LogicExpr::Not(Box::new(logic_not(p)?)));
    }
    logic_atom(p)
}

fn logic_atom(p: &mut Parser) -> Result<LogicExpr, ExprError> {
    const EXPECTED: &str = "a node reference, TRUE, FALSE or '('";
    match p.next(EXPECTED)? {
        Token::Index(i) => Ok(LogicExpr::Node(i)),
        Token::External(name) => Ok(LogicExpr::External(name)),
        Token::LParen => {
            let inner = logic_or(p)?;
            p.expect(Token::RParen, "')'")?;
            Ok(inner)
        }
        Token::Ident(name) => match Keyword::of(&name) {
            Some(Keyword::True) => Ok(LogicExpr::Const(true)),
            Some(Keyword::False) => Ok(LogicExpr::Const(false)),
            _ => Err(ExprError::Unexpected {
                found: name,
                expected: EXPECTED,
            }),
        },
        token => Err(ExprError::Unexpected {
            found: token.to_string(),
            expected: EXPECTED,
        }),
    }
}

impl LogicExpr {
    /// Distinct `{Name}` references, in first-seen order.
    pub fn externals(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_externals(&mut names);
        names
    }

    fn collect_externals(&self, names: &mut Vec<String>) {
        match self {
            LogicExpr::External(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            LogicExpr::Not(inner) => inner.collect_externals(names),
            LogicExpr::And(a, b) | LogicExpr::Or(a, b) => {
                a.collect_externals(names);
                b.collect_externals(names);
            }
            LogicExpr::Const(_) | LogicExpr::Node(_) => {}
        }
    }

    /// Fails on the first `$i` with `i >= node_count`, wherever it sits in
    /// the tree.
    pub fn check_nodes(&self, node_count: usize) -> Result<(), ExprError> {
        match self {
            LogicExpr::Node(i) if *i >= node_count => Err(ExprError::IndexOutOfRange(*i)),
            LogicExpr::Not(inner) => inner.check_nodes(node_count),
            LogicExpr::And(a, b) | LogicExpr::Or(a, b) => {
                a.check_nodes(node_count)?;
                b.check_nodes(node_count)
            }
            LogicExpr::Const(_) | LogicExpr::Node(_) | LogicExpr::External(_) => Ok(()),
        }
    }

    /// A reference is true when it produced a region.
    pub fn eval(&self, bindings: &mut dyn Bindings) -> Result<bool, ExprError> {
        match self {
            LogicExpr::Const(value) => Ok(*value),
            LogicExpr::Node(i) => bindings
                .node(*i)
                .map(|rect| rect.is_some())
                .ok_or(ExprError::IndexOutOfRange(*i)),
            LogicExpr::External(name) => Ok(bindings.external(name).is_some()),
            LogicExpr::Not(inner) => Ok(!inner.eval(bindings)?),
            LogicExpr::And(a, b) => Ok(a.eval(bindings)? && b.eval(bindings)?),
            LogicExpr::Or(a, b) => Ok(a.eval(bindings)? || b.eval(bindings)?),
        }
    }
}

impl fmt::Display for LogicExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicExpr::Const(value) => write!(f, "{}", if *value { "TRUE" } else { "FALSE" }),
            LogicExpr::Node(i) => write!(f, "${}", i),
            LogicExpr::External(name) => write!(f, "{{{}}}", name),
            LogicExpr::Not(inner) => write!(f, "NOT {}", inner),
            LogicExpr::And(a, b) => write!(f, "({} AND {})", a, b),
            LogicExpr::Or(a, b) => write!(f, "({} OR {})", a, b),
        }
    }
}

/// Region functions available in ROI expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoiFunc {
    Union,
    Intersection,
    Offset,
}

impl RoiFunc {
    fn of(ident: &str) -> Option<RoiFunc> {
        match ident {
            "UNION" => Some(RoiFunc::Union),
            "INTERSECTION" => Some(RoiFunc::Intersection),
            "OFFSET" => Some(RoiFunc::Offset),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RoiFunc::Union => "UNION",
            RoiFunc::Intersection => "INTERSECTION",
            RoiFunc::Offset => "OFFSET",
        }
    }
}

/// Region-valued expression tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoiExpr {
    Node(usize),
    External(String),
    Literal(Rect),
    Int(i32),
    Call(RoiFunc, Vec<RoiExpr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RoiValue {
    Rect(Rect),
    Int(i32),
}

/// Parses an ROI expression.
pub fn parse_roi(src: &str) -> Result<RoiExpr, ExprError> {
    let mut parser = Parser::new(tokenize(src)?);
    let expr = roi_expr(&mut parser)?;
    parser.finish()?;
    Ok(expr)
}

fn roi_expr(p: &mut Parser) -> Result<RoiExpr, ExprError> {
    const EXPECTED: &str = "a node reference, [x,y,w,h], an integer or a function call";
    match p.next(EXPECTED)? {
        Token::Index(i) => Ok(RoiExpr::Node(i)),
        Token::External(name) => Ok(RoiExpr::External(name)),
        Token::Int(n) => Ok(RoiExpr::Int(n)),
        Token::LBracket => {
            let mut coords = [0i32; 4];
            for (i, coord) in coords.iter_mut().enumerate() {
                if i > 0 {
                    p.expect(Token::Comma, "','")?;
                }
                *coord = match p.next("an integer")? {
                    Token::Int(n) => n,
                    token => {
                        return Err(ExprError::Unexpected {
                            found: token.to_string(),
                            expected: "an integer",
                        });
                    }
                };
            }
            p.expect(Token::RBracket, "']'")?;
            Ok(RoiExpr::Literal(Rect::from(coords)))
        }
        Token::Ident(name) => {
            let func = RoiFunc::of(&name).ok_or(ExprError::UnknownFunction(name))?;
            p.expect(Token::LParen, "'('")?;
            let mut args = vec![roi_expr(p)?];
            while p.peek() == Some(&Token::Comma) {
                p.pos += 1;
                args.push(roi_expr(p)?);
            }
            p.expect(Token::RParen, "')'")?;
            Ok(RoiExpr::Call(func, args))
        }
        token => Err(ExprError::Unexpected {
            found: token.to_string(),
            expected: EXPECTED,
        }),
    }
}

impl RoiExpr {
    /// Distinct `{Name}` references, in first-seen order.
    pub fn externals(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_externals(&mut names);
        names
    }

    fn collect_externals(&self, names: &mut Vec<String>) {
        match self {
            RoiExpr::External(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            RoiExpr::Call(_, args) => args.iter().for_each(|arg| arg.collect_externals(names)),
            RoiExpr::Node(_) | RoiExpr::Literal(_) | RoiExpr::Int(_) => {}
        }
    }

    /// Evaluates to a region. References that found nothing read as
    /// `[0,0,0,0]`.
    pub fn eval(&self, bindings: &mut dyn Bindings) -> Result<Rect, ExprError> {
        match self.value(bindings)? {
            RoiValue::Rect(rect) => Ok(rect),
            RoiValue::Int(_) => Err(ExprError::NotARegion),
        }
    }

    fn value(&self, bindings: &mut dyn Bindings) -> Result<RoiValue, ExprError> {
        match self {
            RoiExpr::Node(i) => bindings
                .node(*i)
                .map(|rect| RoiValue::Rect(rect.unwrap_or(Rect::ZERO)))
                .ok_or(ExprError::IndexOutOfRange(*i)),
            RoiExpr::External(name) => {
                Ok(RoiValue::Rect(bindings.external(name).unwrap_or(Rect::ZERO)))
            }
            RoiExpr::Literal(rect) => Ok(RoiValue::Rect(*rect)),
            RoiExpr::Int(n) => Ok(RoiValue::Int(*n)),
            RoiExpr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.value(bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = apply(*func, &values)?;
                crate::debug(&format!(
                    "{}({}) -> {}",
                    func.name(),
                    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
                    result
                ));
                Ok(RoiValue::Rect(result))
            }
        }
    }
}

impl fmt::Display for RoiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoiValue::Rect(rect) => write!(f, "{}", rect),
            RoiValue::Int(n) => write!(f, "{}", n),
        }
    }
}

fn apply(func: RoiFunc, args: &[RoiValue]) -> Result<Rect, ExprError> {
    let name = func.name();
    let expected = match func {
        RoiFunc::Union | RoiFunc::Intersection => 2,
        RoiFunc::Offset => 5,
    };
    if args.len() != expected {
        return Err(ExprError::Arity {
            func: name,
            expected,
            got: args.len(),
        });
    }

    let rect_at = |index: usize| match args[index] {
        RoiValue::Rect(rect) => Ok(rect),
        RoiValue::Int(_) => Err(ExprError::ArgType {
            func: name,
            index,
            expected: "a region",
        }),
    };
    let int_at = |index: usize| match args[index] {
        RoiValue::Int(n) => Ok(n),
        RoiValue::Rect(_) => Err(ExprError::ArgType {
            func: name,
            index,
            expected: "an integer",
        }),
    };

    match func {
        RoiFunc::Union => Ok(roi::union(rect_at(0)?, rect_at(1)?)),
        RoiFunc::Intersection => Ok(roi::intersection(rect_at(0)?, rect_at(1)?)),
        RoiFunc::Offset => Ok(roi::offset(
            rect_at(0)?,
            int_at(1)?,
            int_at(2)?,
            int_at(3)?,
            int_at(4)?,
        )),
    }
}

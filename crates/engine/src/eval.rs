//! Expression evaluator (spec §4.10): the safe, side-effect-free language
//! condition/switch/assign/script/loop nodes evaluate against instance
//! state.
//!
//! The variable-lookup half (namespace prefixes, dotted-path access) is
//! grounded on the teacher's `crates/engine/src/vars.rs` (bare keys get
//! namespaced under a known prefix, prefixed keys pass through unchanged).
//! The teacher has no expression parser of its own — its workflow language
//! is an embedded HCL runbook — so the tokenizer/parser/AST here is new,
//! written as a plain recursive-descent evaluator: a pure function over a
//! value context, no global state, no I/O (spec §9 design note).

use std::collections::HashMap;

use oj_core::{NodeId, NodeState};
use serde_json::{json, Value};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("evaluation error: {0}")]
    Runtime(String),
}

/// Everything an expression can see (spec §4.10 "Variable namespaces").
pub struct EvalContext<'a> {
    /// Node outputs keyed by the node's human-readable name (hyphens as
    /// written; the `[...]` accessor form underscores them at parse time).
    pub outputs: HashMap<String, Value>,
    pub variables: &'a HashMap<String, Value>,
    pub inputs: HashMap<String, Value>,
    pub node_states: HashMap<String, NodeState>,
    pub loop_index: Option<i64>,
    pub loop_item: Option<Value>,
    pub loop_total: Option<i64>,
    pub now_ms: u64,
}

impl<'a> EvalContext<'a> {
    pub fn new(variables: &'a HashMap<String, Value>, now_ms: u64) -> Self {
        Self {
            outputs: HashMap::new(),
            variables,
            inputs: HashMap::new(),
            node_states: HashMap::new(),
            loop_index: None,
            loop_item: None,
            loop_total: None,
            now_ms,
        }
    }

    pub fn with_outputs(mut self, outputs: HashMap<String, Value>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_node_states(mut self, node_states: HashMap<String, NodeState>) -> Self {
        self.node_states = node_states;
        self
    }

    pub fn with_loop(mut self, index: i64, item: Value, total: i64) -> Self {
        self.loop_index = Some(index);
        self.loop_item = Some(item);
        self.loop_total = Some(total);
        self
    }
}

/// Build the `outputs.<name>` map from an instance's raw outputs, which
/// are keyed by [`NodeId`]; resolves each to its workflow node's name.
pub fn outputs_by_name(workflow: &oj_core::Workflow, outputs: &HashMap<NodeId, Value>) -> HashMap<String, Value> {
    workflow
        .nodes
        .iter()
        .map(|n| (n.name.clone(), outputs.get(&n.id).cloned().unwrap_or_else(|| json!({"_raw": ""}))))
        .collect()
}

pub fn node_states_by_name(
    workflow: &oj_core::Workflow,
    node_states: &HashMap<NodeId, NodeState>,
) -> HashMap<String, NodeState> {
    workflow
        .nodes
        .iter()
        .filter_map(|n| node_states.get(&n.id).map(|s| (n.name.clone(), s.clone())))
        .collect()
}

/// Parse and evaluate `src`, propagating every error (used by script/assign
/// nodes, for which a syntax error is fatal per spec §4.10).
pub fn evaluate(src: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    eval_expr(&expr, ctx)
}

/// Evaluate `src` as a boolean condition. Any syntax or runtime error is
/// logged and treated as `false` (spec §4.10 "runtime error -> logged and
/// treated as false in boolean contexts").
pub fn evaluate_bool(src: &str, ctx: &EvalContext) -> bool {
    match evaluate(src, ctx) {
        Ok(value) => to_bool(&value),
        Err(e) => {
            tracing::warn!(expression = src, error = %e, "expression evaluation failed, defaulting to false");
            false
        }
    }
}

// ---------------------------------------------------------------- lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Question,
    Colon,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    And,
    Or,
    Not,
    True,
    False,
}

fn lex(src: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
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
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Neq);
                } else {
                    return Err(EvalError::Syntax("unexpected '!'".into()));
                }
            }
            '<' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(EvalError::Syntax("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| EvalError::Syntax(format!("bad number {text:?}")))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(EvalError::Syntax(format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

// --------------------------------------------------------------- parser

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Path(Vec<String>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_end(&self) -> Result<(), EvalError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(EvalError::Syntax(format!("unexpected trailing token {:?}", self.tokens[self.pos])))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        let cond = self.parse_or()?;
        if matches!(self.peek(), Some(Token::Question)) {
            self.advance();
            let then_branch = self.parse_expr()?;
            match self.advance() {
                Some(Token::Colon) => {}
                other => return Err(EvalError::Syntax(format!("expected ':' in ternary, got {other:?}"))),
            }
            let else_branch = self.parse_expr()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then_branch), Box::new(else_branch)));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinOp::Eq),
            Some(Token::Neq) => Some(BinOp::Neq),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Ge) => Some(BinOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_additive()?;
                Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(EvalError::Syntax(format!("expected ')', got {other:?}"))),
                }
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    match self.advance() {
                        Some(Token::RParen) => {}
                        other => return Err(EvalError::Syntax(format!("expected ')', got {other:?}"))),
                    }
                    return Ok(Expr::Call(name, args));
                }
                self.parse_path_tail(vec![name])
            }
            other => Err(EvalError::Syntax(format!("unexpected token {other:?}"))),
        }
    }

    /// Continue a variable path: `.segment` or `['segment-with-hyphens']`,
    /// converting bracket segments' hyphens to underscores (spec §4.10
    /// preprocessor: `outputs['verify-consistency']` -> `outputs.verify_consistency`).
    fn parse_path_tail(&mut self, mut segments: Vec<String>) -> Result<Expr, EvalError> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => segments.push(seg),
                        other => return Err(EvalError::Syntax(format!("expected identifier after '.', got {other:?}"))),
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let seg = match self.advance() {
                        Some(Token::Str(s)) => s.replace('-', "_"),
                        other => return Err(EvalError::Syntax(format!("expected string in '[...]', got {other:?}"))),
                    };
                    match self.advance() {
                        Some(Token::RBracket) => {}
                        other => return Err(EvalError::Syntax(format!("expected ']', got {other:?}"))),
                    }
                    segments.push(seg);
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segments))
    }
}

// ------------------------------------------------------------- evaluate

fn eval_expr(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    Ok(match expr {
        Expr::Num(n) => json!(n),
        Expr::Str(s) => json!(s),
        Expr::Bool(b) => json!(b),
        Expr::Path(segments) => resolve_path(segments, ctx),
        Expr::Unary(UnOp::Neg, inner) => json!(-to_num(&eval_expr(inner, ctx)?)),
        Expr::Unary(UnOp::Not, inner) => json!(!to_bool(&eval_expr(inner, ctx)?)),
        Expr::Ternary(cond, then_branch, else_branch) => {
            if to_bool(&eval_expr(cond, ctx)?) {
                eval_expr(then_branch, ctx)?
            } else {
                eval_expr(else_branch, ctx)?
            }
        }
        Expr::Binary(BinOp::And, l, r) => {
            let lv = eval_expr(l, ctx)?;
            if !to_bool(&lv) {
                json!(false)
            } else {
                json!(to_bool(&eval_expr(r, ctx)?))
            }
        }
        Expr::Binary(BinOp::Or, l, r) => {
            let lv = eval_expr(l, ctx)?;
            if to_bool(&lv) {
                json!(true)
            } else {
                json!(to_bool(&eval_expr(r, ctx)?))
            }
        }
        Expr::Binary(op, l, r) => {
            let lv = eval_expr(l, ctx)?;
            let rv = eval_expr(r, ctx)?;
            eval_binary(*op, &lv, &rv)
        }
        Expr::Call(name, args) => {
            let values: Result<Vec<Value>, EvalError> = args.iter().map(|a| eval_expr(a, ctx)).collect();
            eval_call(name, &values?, ctx)?
        }
    })
}

fn eval_binary(op: BinOp, lv: &Value, rv: &Value) -> Value {
    match op {
        BinOp::Add => {
            if lv.is_string() || rv.is_string() {
                json!(format!("{}{}", to_str(lv), to_str(rv)))
            } else {
                json!(to_num(lv) + to_num(rv))
            }
        }
        BinOp::Sub => json!(to_num(lv) - to_num(rv)),
        BinOp::Mul => json!(to_num(lv) * to_num(rv)),
        BinOp::Div => {
            let divisor = to_num(rv);
            if divisor == 0.0 {
                json!(0.0)
            } else {
                json!(to_num(lv) / divisor)
            }
        }
        BinOp::Eq => json!(values_equal(lv, rv)),
        BinOp::Neq => json!(!values_equal(lv, rv)),
        BinOp::Lt => json!(to_num(lv) < to_num(rv)),
        BinOp::Le => json!(to_num(lv) <= to_num(rv)),
        BinOp::Gt => json!(to_num(lv) > to_num(rv)),
        BinOp::Ge => json!(to_num(lv) >= to_num(rv)),
        BinOp::And | BinOp::Or => unreachable!("short-circuited in eval_expr"),
    }
}

fn values_equal(lv: &Value, rv: &Value) -> bool {
    match (lv, rv) {
        (Value::Number(_), Value::Number(_)) => to_num(lv) == to_num(rv),
        (Value::String(a), Value::String(b)) => a == b,
        _ => lv == rv,
    }
}

fn resolve_path(segments: &[String], ctx: &EvalContext) -> Value {
    let Some(head) = segments.first() else { return Value::Null };
    match head.as_str() {
        "outputs" => {
            let Some(name) = segments.get(1) else { return Value::Null };
            let base = ctx.outputs.get(name).cloned().unwrap_or_else(|| json!({"_raw": ""}));
            get_path_in_value(&base, &segments[2..])
        }
        "variables" => {
            let Some(name) = segments.get(1) else { return Value::Null };
            let base = ctx.variables.get(name).cloned().unwrap_or(Value::Null);
            get_path_in_value(&base, &segments[2..])
        }
        "inputs" => {
            let Some(name) = segments.get(1) else { return Value::Null };
            let base = ctx.inputs.get(name).cloned().unwrap_or(Value::Null);
            get_path_in_value(&base, &segments[2..])
        }
        "nodeStates" => {
            let Some(name) = segments.get(1) else { return Value::Null };
            match ctx.node_states.get(name) {
                Some(state) => {
                    let base = json!({"status": state.status.to_string(), "attempts": state.attempts});
                    get_path_in_value(&base, &segments[2..])
                }
                None => Value::Null,
            }
        }
        "index" => ctx.loop_index.map(Value::from).unwrap_or(Value::Null),
        "total" => ctx.loop_total.map(Value::from).unwrap_or(Value::Null),
        "item" => ctx.loop_item.clone().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn get_path_in_value(value: &Value, rest: &[String]) -> Value {
    let mut current = value.clone();
    for segment in rest {
        current = current.get(segment).cloned().unwrap_or(Value::Null);
    }
    current
}

fn eval_call(name: &str, args: &[Value], ctx: &EvalContext) -> Result<Value, EvalError> {
    Ok(match name {
        "len" => json!(match args.first() {
            Some(Value::Array(a)) => a.len(),
            Some(Value::Object(o)) => o.len(),
            Some(Value::String(s)) => s.chars().count(),
            _ => 0,
        }),
        "has" => {
            let key = args.get(1).map(to_str).unwrap_or_default();
            json!(matches!(args.first(), Some(Value::Object(o)) if o.contains_key(&key)))
        }
        "get" => {
            let key = args.get(1).map(to_str).unwrap_or_default();
            let default = args.get(2).cloned().unwrap_or(Value::Null);
            match args.first() {
                Some(Value::Object(o)) => o.get(&key).cloned().unwrap_or(default),
                _ => default,
            }
        }
        "str" => json!(args.first().map(to_str).unwrap_or_default()),
        "num" => json!(args.first().map(to_num).unwrap_or(0.0)),
        "bool" => json!(args.first().map(to_bool).unwrap_or(false)),
        "now" => json!(ctx.now_ms),
        "floor" => json!(args.first().map(to_num).unwrap_or(0.0).floor()),
        "ceil" => json!(args.first().map(to_num).unwrap_or(0.0).ceil()),
        "round" => json!(args.first().map(to_num).unwrap_or(0.0).round()),
        "abs" => json!(args.first().map(to_num).unwrap_or(0.0).abs()),
        "min" => json!(args.iter().map(to_num).fold(f64::INFINITY, f64::min)),
        "max" => json!(args.iter().map(to_num).fold(f64::NEG_INFINITY, f64::max)),
        "includes" => json!(to_str(args.first().unwrap_or(&Value::Null)).contains(&to_str(args.get(1).unwrap_or(&Value::Null)))),
        "startsWith" => {
            json!(to_str(args.first().unwrap_or(&Value::Null)).starts_with(&to_str(args.get(1).unwrap_or(&Value::Null))))
        }
        "lower" => json!(to_str(args.first().unwrap_or(&Value::Null)).to_lowercase()),
        "upper" => json!(to_str(args.first().unwrap_or(&Value::Null)).to_uppercase()),
        other => return Err(EvalError::Runtime(format!("unknown function {other:?}"))),
    })
}

pub fn to_bool(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub fn to_num(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Bool(b) => if *b { 1.0 } else { 0.0 },
        _ => 0.0,
    }
}

pub fn to_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;

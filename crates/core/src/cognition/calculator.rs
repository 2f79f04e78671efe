//! In-process arithmetic: expression extraction, validation and evaluation.
//!
//! Only `+ - * /`, parentheses and decimal literals are accepted. Every
//! failure is terminal; nothing here is worth retrying.

use std::time::Duration;
use wren_tool::{BoxFuture, CalculatorBackend, ToolError};

const ALLOWED: &str = "0123456789+-*/.() ";
const MAX_DEPTH: usize = 64;

/// Leading phrases stripped before validation, lowercase.
const LEAD_PHRASES: &[&str] = &[
    "what is",
    "what's",
    "whats",
    "how much is",
    "calculate",
    "compute",
    "evaluate",
    "solve",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("Please provide a mathematical expression to calculate.")]
    Empty,
    #[error("Invalid character '{0}' in expression")]
    InvalidCharacter(char),
    #[error("Division by zero is not allowed")]
    DivisionByZero,
    #[error("Invalid expression: {0}")]
    Invalid(String),
    #[error("Expression is nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

/// Pull the arithmetic part out of an utterance.
///
/// "What is 5 plus 3?" → "5 + 3". The result is not validated.
pub fn extract_expression(text: &str) -> String {
    let mut rest = text.trim();
    loop {
        let lower = rest.to_ascii_lowercase();
        let Some(phrase) = LEAD_PHRASES.iter().find(|p| lower.starts_with(*p)) else {
            break;
        };
        rest = rest[phrase.len()..].trim_start_matches([' ', ':', ',']);
    }
    let rest = rest.trim_end_matches(['?', '!', '=', ' ']);
    let rest = match rest.to_ascii_lowercase().strip_suffix("please") {
        Some(head) => rest[..head.len()].trim_end_matches([' ', ',']),
        None => rest,
    };
    normalize_operators(rest)
}

/// Replace spelled-out operators with symbols.
fn normalize_operators(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let word = words[i].to_ascii_lowercase();
        let next_is_by = words
            .get(i + 1)
            .is_some_and(|w| w.eq_ignore_ascii_case("by"));
        let (symbol, consumed) = match word.as_str() {
            "plus" => (Some("+"), 1),
            "minus" => (Some("-"), 1),
            "times" => (Some("*"), 1),
            "multiplied" if next_is_by => (Some("*"), 2),
            "divided" if next_is_by => (Some("/"), 2),
            _ => (None, 1),
        };
        out.push(symbol.unwrap_or(words[i]));
        i += consumed;
    }
    out.join(" ")
}

fn tokenize(expr: &str) -> Result<Vec<Token>, CalcError> {
    if expr.trim().is_empty() {
        return Err(CalcError::Empty);
    }
    if let Some(bad) = expr.chars().find(|c| !ALLOWED.contains(*c)) {
        return Err(CalcError::InvalidCharacter(bad));
    }

    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' => i += 1,
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'+' | b'-' | b'*' | b'/' => {
                tokens.push(Token::Op(bytes[i] as char));
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let literal = &expr[start..i];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| CalcError::Invalid(format!("malformed number '{literal}'")))?;
                tokens.push(Token::Num(value));
            }
        }
    }
    Ok(tokens)
}

/// Check an expression without evaluating it. Catches bad characters,
/// empty input and division by a literal zero.
pub fn validate(expr: &str) -> Result<(), CalcError> {
    let tokens = tokenize(expr)?;
    check_literal_division(&tokens)
}

fn check_literal_division(tokens: &[Token]) -> Result<(), CalcError> {
    let divides_by_zero = tokens
        .windows(2)
        .any(|w| w[0] == Token::Op('/') && w[1] == Token::Num(0.0));
    if divides_by_zero {
        Err(CalcError::DivisionByZero)
    } else {
        Ok(())
    }
}

/// Evaluate a validated arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expr)?;
    check_literal_division(&tokens)?;

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(CalcError::Invalid(format!("unexpected {}", describe(tok))));
    }
    if !value.is_finite() {
        return Err(CalcError::Invalid("result is not a finite number".into()));
    }
    Ok(value)
}

/// Render a result, dropping the fraction for whole numbers.
pub fn format_result(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn describe(tok: Token) -> String {
    match tok {
        Token::Num(n) => format!("number {}", format_result(n)),
        Token::Op(c) => format!("operator '{c}'"),
        Token::Open => "'('".into(),
        Token::Close => "')'".into(),
    }
}

// ── Recursive descent ──

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '/' {
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                acc /= rhs;
            } else {
                acc *= rhs;
            }
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let value = match self.bump() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('-')) => self.factor().map(|v| -v),
            Some(Token::Op('+')) => self.factor(),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(CalcError::Invalid("unbalanced parentheses".into())),
                }
            }
            Some(tok) => Err(CalcError::Invalid(format!("unexpected {}", describe(tok)))),
            None => Err(CalcError::Invalid("unexpected end of expression".into())),
        };
        self.depth -= 1;
        value
    }
}

/// Calculator backend evaluated in-process. Always healthy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCalculator;

impl CalculatorBackend for LocalCalculator {
    fn name(&self) -> &str {
        "local"
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn compute<'a>(
        &'a self,
        expression: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<f64, ToolError>> {
        let result = evaluate(expression).map_err(|e| ToolError::Rejected(e.to_string()));
        Box::pin(async move { result })
    }
}

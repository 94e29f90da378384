use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("Invalid marker expression `{expression}`: {reason}")]
    Parse { expression: String, reason: String },
    #[error("Undefined environment marker variable `{0}`")]
    UndefinedVariable(String),
}

/// A parsed PEP 508 environment marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Comparison {
        lhs: MarkerValue,
        op: Operator,
        rhs: MarkerValue,
    },
    And(Vec<Marker>),
    Or(Vec<Marker>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    CompatibleRelease,
    In,
    NotIn,
}

impl Marker {
    pub fn parse(expression: &str) -> Result<Marker, MarkerError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            expression,
            tokens,
            position: 0,
        };
        let marker = parser.parse_or()?;
        if parser.position != parser.tokens.len() {
            return Err(parser.error("trailing tokens after expression"));
        }
        Ok(marker)
    }

    /// Removes every comparison that mentions the pseudo-variable `extra`,
    /// recursively. Packages reaching this point are already part of the
    /// active closure, so a prior extras selection has decided inclusion.
    ///
    /// `None` means the whole marker stripped away and the dependency is
    /// unconditionally applicable.
    pub fn strip_extra(self) -> Option<Marker> {
        match self {
            Marker::Comparison { ref lhs, ref rhs, .. } => {
                if lhs.is_variable("extra") || rhs.is_variable("extra") {
                    None
                } else {
                    Some(self)
                }
            }
            Marker::And(children) => {
                let children: Vec<Marker> =
                    children.into_iter().filter_map(Marker::strip_extra).collect();
                combinator(children, Marker::And)
            }
            Marker::Or(children) => {
                let children: Vec<Marker> =
                    children.into_iter().filter_map(Marker::strip_extra).collect();
                combinator(children, Marker::Or)
            }
        }
    }

    /// Evaluates the marker against a snapshot of environment bindings.
    pub fn evaluate(&self, env: &BTreeMap<String, String>) -> Result<bool, MarkerError> {
        match self {
            Marker::Comparison { lhs, op, rhs } => {
                let lhs = lhs.resolve(env)?;
                let rhs = rhs.resolve(env)?;
                Ok(compare(&lhs, *op, &rhs))
            }
            Marker::And(children) => {
                for child in children {
                    if !child.evaluate(env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Marker::Or(children) => {
                for child in children {
                    if child.evaluate(env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl MarkerValue {
    fn is_variable(&self, name: &str) -> bool {
        matches!(self, MarkerValue::Variable(v) if v == name)
    }

    fn resolve(&self, env: &BTreeMap<String, String>) -> Result<String, MarkerError> {
        match self {
            MarkerValue::Literal(value) => Ok(value.clone()),
            MarkerValue::Variable(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| MarkerError::UndefinedVariable(name.clone())),
        }
    }
}

fn combinator(children: Vec<Marker>, combine: fn(Vec<Marker>) -> Marker) -> Option<Marker> {
    match children.len() {
        0 => None,
        1 => children.into_iter().next(),
        _ => Some(combine(children)),
    }
}

fn compare(lhs: &str, op: Operator, rhs: &str) -> bool {
    // Dotted-numeric operands compare as versions, everything else as strings.
    let ordering = match (parse_version(lhs), parse_version(rhs)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => lhs.cmp(rhs),
    };
    match op {
        Operator::Equal => ordering.is_eq(),
        Operator::NotEqual => ordering.is_ne(),
        Operator::LessThan => ordering.is_lt(),
        Operator::LessEqual => ordering.is_le(),
        Operator::GreaterThan => ordering.is_gt(),
        Operator::GreaterEqual => ordering.is_ge(),
        Operator::CompatibleRelease => compatible_release(lhs, rhs),
        Operator::In => rhs.contains(lhs),
        Operator::NotIn => !rhs.contains(lhs),
    }
}

/// `lhs ~= rhs` is `lhs >= rhs` with the same release prefix once the last
/// component of `rhs` is dropped.
fn compatible_release(lhs: &str, rhs: &str) -> bool {
    let (Some(left), Some(right)) = (parse_version(lhs), parse_version(rhs)) else {
        return false;
    };
    if left < right || right.len() < 2 {
        return false;
    }
    let prefix = &right[..right.len() - 1];
    left.len() >= prefix.len() && &left[..prefix.len()] == prefix
}

fn parse_version(value: &str) -> Option<Vec<u64>> {
    value
        .split('.')
        .map(|segment| segment.parse::<u64>().ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Variable(String),
    Literal(String),
    Operator(Operator),
    And,
    Or,
    Not,
    OpenParen,
    CloseParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, MarkerError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            '"' | '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some((_, ch)) if ch == c => break,
                        Some((_, ch)) => literal.push(ch),
                        None => {
                            return Err(MarkerError::Parse {
                                expression: expression.to_owned(),
                                reason: "unterminated string literal".to_owned(),
                            })
                        }
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            '<' | '>' | '=' | '!' | '~' => {
                let mut op = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if matches!(ch, '<' | '>' | '=' | '!' | '~') {
                        op.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let op = match op.as_str() {
                    "==" | "===" => Operator::Equal,
                    "!=" => Operator::NotEqual,
                    "<" => Operator::LessThan,
                    "<=" => Operator::LessEqual,
                    ">" => Operator::GreaterThan,
                    ">=" => Operator::GreaterEqual,
                    "~=" => Operator::CompatibleRelease,
                    other => {
                        return Err(MarkerError::Parse {
                            expression: expression.to_owned(),
                            reason: format!("unknown operator `{other}`"),
                        })
                    }
                };
                tokens.push(Token::Operator(op));
            }
            _ if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &expression[start..end];
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::Operator(Operator::In),
                    _ => Token::Variable(word.to_owned()),
                });
            }
            other => {
                return Err(MarkerError::Parse {
                    expression: expression.to_owned(),
                    reason: format!("unexpected character `{other}`"),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> MarkerError {
        MarkerError::Parse {
            expression: self.expression.to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Marker, MarkerError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Marker::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<Marker, MarkerError> {
        let mut children = vec![self.parse_atom()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            children.push(self.parse_atom()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Marker::And(children)
        })
    }

    fn parse_atom(&mut self) -> Result<Marker, MarkerError> {
        if self.peek() == Some(&Token::OpenParen) {
            self.next();
            let marker = self.parse_or()?;
            if self.next() != Some(Token::CloseParen) {
                return Err(self.error("expected closing parenthesis"));
            }
            return Ok(marker);
        }

        let lhs = self.parse_value()?;
        let op = match self.next() {
            Some(Token::Operator(op)) => op,
            Some(Token::Not) => {
                // `not` only appears as part of `not in`
                match self.next() {
                    Some(Token::Operator(Operator::In)) => Operator::NotIn,
                    _ => return Err(self.error("expected `in` after `not`")),
                }
            }
            _ => return Err(self.error("expected comparison operator")),
        };
        let rhs = self.parse_value()?;
        Ok(Marker::Comparison { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerValue, MarkerError> {
        match self.next() {
            Some(Token::Variable(name)) => Ok(MarkerValue::Variable(name)),
            Some(Token::Literal(value)) => Ok(MarkerValue::Literal(value)),
            _ => Err(self.error("expected variable or string literal")),
        }
    }
}

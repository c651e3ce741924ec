//! Matcher expression language: tokenizer, AST, and recursive-descent parser.
//!
//! Supported syntax:
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=`
//! - Boolean operators: `&&`, `||`, `!`
//! - Binding paths: `Subject.role`, `Resource.owner.id`, `Action`, `Env.hour`
//! - Function calls: `has(Subject.roles, "admin")`
//! - Literals: numbers, `"double"`- or `'single'`-quoted strings, `true`, `false`
//! - Parentheses for grouping
//!
//! Grammar (precedence low to high):
//!
//! ```text
//! expr    = or
//! or      = and ( "||" and )*
//! and     = cmp ( "&&" cmp )*
//! cmp     = unary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") unary )?
//! unary   = "!" unary | primary
//! primary = literal | path | call | "(" expr ")"
//! ```
//!
//! Parsing is a pure function of the expression text, so compiled expressions
//! may be cached and evicted freely.

use crate::error::{EngineError, Result};

// ============================================================================
// AST
// ============================================================================

/// The four named bindings a path may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Subject attribute map.
    Subject,
    /// Resource attribute map (one instance per evaluation).
    Resource,
    /// The action string.
    Action,
    /// Environment attribute map.
    Env,
}

impl Binding {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "Subject" => Some(Binding::Subject),
            "Resource" => Some(Binding::Resource),
            "Action" => Some(Binding::Action),
            "Env" => Some(Binding::Env),
            _ => None,
        }
    }
}

/// A literal value appearing in an expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A parsed matcher expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    /// Attribute access rooted at a binding: `Subject.role` has root
    /// `Subject` and segments `["role"]`; a bare `Subject` has no segments.
    Path {
        root: Binding,
        segments: Vec<String>,
    },
    Not(Box<Expr>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Dot,
    Comma,
    LParen,
    RParen,
    Eq,  // ==
    Ne,  // !=
    Gt,  // >
    Lt,  // <
    Ge,  // >=
    Le,  // <=
    And, // &&
    Or,  // ||
    Not, // !
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
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
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            quote @ ('"' | '\'') => {
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            // Escape: the next character is taken literally.
                            match chars.get(i + 1) {
                                None => {
                                    return Err("unterminated string literal".to_string());
                                }
                                Some(escaped) => {
                                    s.push(*escaped);
                                    i += 2;
                                }
                            }
                        }
                        Some(c) => {
                            s.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let n: f64 = num_str
                    .parse()
                    .map_err(|_| format!("invalid number `{num_str}`"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            c => {
                return Err(format!("unexpected character `{c}`"));
            }
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

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

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// expr = or
    fn parse_expr(&mut self) -> std::result::Result<Expr, String> {
        self.parse_or()
    }

    /// or = and ( "||" and )*
    fn parse_or(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinOp {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// and = cmp ( "&&" cmp )*
    fn parse_and(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_cmp()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_cmp()?;
            left = Expr::BinOp {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// cmp = unary ( cmp_op unary )?   -- comparisons do not chain
    fn parse_cmp(&mut self) -> std::result::Result<Expr, String> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::Le) => BinOp::Le,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;
        Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// unary = "!" unary | primary
    fn parse_unary(&mut self) -> std::result::Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    /// primary = literal | path | call | "(" expr ")"
    fn parse_primary(&mut self) -> std::result::Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Literal::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.parse_call(name)
                } else {
                    self.parse_path(&name)
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                if self.advance() != Some(Token::RParen) {
                    return Err("expected closing parenthesis `)`".to_string());
                }
                Ok(expr)
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }

    /// call = ident "(" [ expr ( "," expr )* ] ")"
    fn parse_call(&mut self, name: String) -> std::result::Result<Expr, String> {
        self.advance(); // consume '('
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.parse_expr()?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => break,
                other => {
                    return Err(format!(
                        "expected `,` or `)` in arguments of `{name}`, got {other:?}"
                    ));
                }
            }
        }
        Ok(Expr::Call { name, args })
    }

    /// path = binding ( "." ident )*
    fn parse_path(&mut self, root_ident: &str) -> std::result::Result<Expr, String> {
        let root = Binding::from_ident(root_ident).ok_or_else(|| {
            format!(
                "unknown binding `{root_ident}` (expected Subject, Resource, Action, or Env)"
            )
        })?;
        let mut segments = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(seg)) => segments.push(seg),
                _ => return Err("expected identifier after `.`".to_string()),
            }
        }
        Ok(Expr::Path { root, segments })
    }
}

/// Parses a matcher expression into its AST.
///
/// Errors carry the full expression text so policy administrators see which
/// matcher was rejected.
pub(crate) fn parse(input: &str) -> Result<Expr> {
    let syntax_error = |message: String| EngineError::MatcherSyntax {
        expression: input.to_string(),
        message,
    };

    let tokens = tokenize(input).map_err(syntax_error)?;
    if tokens.is_empty() {
        return Err(syntax_error("empty expression".to_string()));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr().map_err(syntax_error)?;
    if parser.pos < parser.tokens.len() {
        return Err(syntax_error(format!(
            "unexpected trailing token: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

// ============================================================================
// Tests
// ============================================================================

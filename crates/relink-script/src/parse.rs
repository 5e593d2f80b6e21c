//! Parser for `.rls` script sources.
//!
//! A source is a sequence of lines:
//!
//! ```text
//! # comment
//! namespace lib.greetings
//! let hello = "Hello " + $1
//! let shout = relink.core.upper(hello("world"))
//! ```
//!
//! `let` defines a function in the current namespace. Names without a dot
//! refer to the current namespace; dotted names are absolute. `$1`, `$2`
//! and so on are the call arguments. `+` adds integers and concatenates
//! anything else.

use std::fmt;

/// Deepest expression tree a definition may have. Parentheses, call
/// arguments and each `+` in a chain count one level.
pub const MAX_NESTING: usize = 128;

/// Parsed expression. Symbol names are fully qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Int(i64),
    /// One-based argument reference.
    Arg(usize),
    /// A symbol used as a value (called with no arguments).
    Ref(String),
    Call(String, Vec<Expr>),
    Add(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Number of arguments the expression reads: its highest `$N`.
    pub fn arity(&self) -> usize {
        match self {
            Expr::Arg(n) => *n,
            Expr::Call(_, args) => args.iter().map(Expr::arity).max().unwrap_or(0),
            Expr::Add(l, r) => l.arity().max(r.arity()),
            Expr::Str(_) | Expr::Int(_) | Expr::Ref(_) => 0,
        }
    }

    /// Every symbol the expression refers to with the number of arguments
    /// passed to it, in source order.
    pub fn references(&self) -> Vec<(&str, usize)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(&'a str, usize)>) {
        match self {
            Expr::Ref(name) => out.push((name, 0)),
            Expr::Call(name, args) => {
                out.push((name, args.len()));
                for arg in args {
                    arg.collect_references(out);
                }
            }
            Expr::Add(l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
            Expr::Str(_) | Expr::Int(_) | Expr::Arg(_) => {}
        }
    }
}

/// One `let` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Fully qualified symbol name.
    pub name: String,
    pub body: Expr,
    /// One-based source line.
    pub line: usize,
}

/// A syntax error at a line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a whole source. `default_namespace` applies until the first
/// `namespace` line.
pub fn parse_source(source: &str, default_namespace: &str) -> Result<Vec<Definition>, ParseError> {
    let mut namespace = default_namespace.to_string();
    let mut definitions = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let err = |message: String| ParseError { line, message };
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let tokens = tokenize(text).map_err(err)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            namespace: &namespace,
        };
        match parser.next() {
            Some(Token::Ident(kw)) if kw == "namespace" => {
                let name = parser.expect_ident("namespace name").map_err(err)?;
                parser.expect_end().map_err(err)?;
                namespace = name;
            }
            Some(Token::Ident(kw)) if kw == "let" => {
                let name = parser.expect_ident("definition name").map_err(err)?;
                if name.contains('.') {
                    return Err(err(format!("definition name '{name}' must not contain '.'")));
                }
                parser.expect(&Token::Eq).map_err(err)?;
                let body = parser.expr().map_err(err)?;
                parser.expect_end().map_err(err)?;
                definitions.push(Definition {
                    name: format!("{namespace}.{name}"),
                    body,
                    line,
                });
            }
            Some(other) => return Err(err(format!("expected 'let' or 'namespace', found {other}"))),
            None => {}
        }
    }
    Ok(definitions)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Arg(usize),
    LParen,
    RParen,
    Comma,
    Plus,
    Eq,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{s}'"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Int(n) => write!(f, "integer {n}"),
            Token::Arg(n) => write!(f, "'${n}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Plus => f.write_str("'+'"),
            Token::Eq => f.write_str("'='"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '#' => break,
            '(' | ')' | ',' | '+' | '=' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '+' => Token::Plus,
                    _ => Token::Eq,
                });
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, '"')) => s.push('"'),
                            Some((_, '\\')) => s.push('\\'),
                            Some((_, other)) => return Err(format!("unknown escape '\\{other}'")),
                            None => break,
                        },
                        other => s.push(other),
                    }
                }
                if !closed {
                    return Err("unterminated string literal".into());
                }
                tokens.push(Token::Str(s));
            }
            '$' => {
                chars.next();
                let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                let n: usize = digits
                    .parse()
                    .map_err(|_| "expected argument number after '$'".to_string())?;
                if n == 0 {
                    return Err("argument numbers start at $1".into());
                }
                tokens.push(Token::Arg(n));
            }
            '-' | '0'..='9' => {
                chars.next();
                let rest = take_while(&mut chars, |c| c.is_ascii_digit());
                let literal = format!("{c}{rest}");
                let n: i64 = literal
                    .parse()
                    .map_err(|_| format!("invalid integer literal '{literal}'"))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = take_while(&mut chars, |c| {
                    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
                });
                if word.ends_with('.') || word.contains("..") {
                    return Err(format!("malformed name '{word}'"));
                }
                tokens.push(Token::Ident(word));
            }
            other => return Err(format!("unexpected character '{other}' at column {}", start + 1)),
        }
    }
    Ok(tokens)
}

fn take_while(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    keep: impl Fn(char) -> bool,
) -> String {
    let mut out = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !keep(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    namespace: &'a str,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn expect(&mut self, want: &Token) -> Result<(), String> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(format!("expected {want}, found {t}")),
            None => Err(format!("expected {want} at end of line")),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s.clone()),
            Some(t) => Err(format!("expected {what}, found {t}")),
            None => Err(format!("expected {what} at end of line")),
        }
    }

    fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected {t}")),
        }
    }

    fn qualify(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{name}", self.namespace)
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        self.descend()?;
        let outer = self.depth;
        let mut left = self.term()?;
        while self.peek() == Some(&Token::Plus) {
            self.pos += 1;
            self.descend()?;
            let right = self.term()?;
            left = Expr::Add(Box::new(left), Box::new(right));
        }
        self.depth = outer - 1;
        Ok(left)
    }

    /// One more level of tree depth. Parsing recurses per level, so the
    /// limit also bounds the parser's own stack.
    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nested too deeply (limit {MAX_NESTING})"));
        }
        Ok(())
    }

    fn term(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::Int(n)) => Ok(Expr::Int(*n)),
            Some(Token::Arg(n)) => Ok(Expr::Arg(*n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let name = self.qualify(name);
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Ref(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::Call(name, args));
                }
                loop {
                    args.push(self.expr()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RParen) => break,
                        Some(t) => return Err(format!("expected ',' or ')', found {t}")),
                        None => return Err("unclosed argument list".into()),
                    }
                }
                Ok(Expr::Call(name, args))
            }
            Some(t) => Err(format!("expected an expression, found {t}")),
            None => Err("expected an expression at end of line".into()),
        }
    }
}

use std::fmt;

use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Inner,
    Cross,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Inner => "&",
            BinaryOp::Cross => "^",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Ident(String),
    Component(Box<Expr>, String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expression(Precedence::Lowest)?;
        if parser.peek().is_some() {
            return Err(ExprError::InvalidExpression(input.to_string()));
        }
        Ok(expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Conditional,
    Or,
    And,
    Equality,
    Comparison,
    Sum,
    Product,
    Prefix,
    Postfix,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::Lowest => Precedence::Conditional,
            Precedence::Conditional => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Sum,
            Precedence::Sum => Precedence::Product,
            Precedence::Product => Precedence::Prefix,
            Precedence::Prefix => Precedence::Postfix,
            Precedence::Postfix => Precedence::Postfix,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Bool(bool),
    LParen,
    RParen,
    Dot,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Amp,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqualEqual,
    NotEqual,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{name}"),
            Token::Number(value) => write!(f, "{value}"),
            Token::Bool(value) => write!(f, "{value}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Amp => write!(f, "&"),
            Token::Less => write!(f, "<"),
            Token::LessEq => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEq => write!(f, ">="),
            Token::EqualEqual => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
        }
    }
}

struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    lookahead: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let lookahead = chars.next();
        Self { chars, lookahead }
    }

    fn next_char(&mut self) -> Option<char> {
        let current = self.lookahead;
        self.lookahead = self.chars.next();
        current
    }

    fn peek_char(&self) -> Option<char> {
        self.lookahead
    }

    fn consume_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut out = String::new();
        while let Some(ch) = self.peek_char() {
            if !predicate(ch) {
                break;
            }
            out.push(ch);
            self.next_char();
        }
        out
    }

    /// Consumes `second` if it follows, choosing between a one- and two-char token.
    fn pair(&mut self, second: char, two: Token, one: Token) -> Token {
        self.next_char();
        if self.peek_char() == Some(second) {
            self.next_char();
            two
        } else {
            one
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.next_char();
        token
    }

    fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        self.consume_while(char::is_whitespace);
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };
        let token = match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            ',' => self.single(Token::Comma),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '^' => self.single(Token::Caret),
            '?' => self.single(Token::Question),
            ':' => self.single(Token::Colon),
            '&' => self.pair('&', Token::AndAnd, Token::Amp),
            '!' => self.pair('=', Token::NotEqual, Token::Bang),
            '<' => self.pair('=', Token::LessEq, Token::Less),
            '>' => self.pair('=', Token::GreaterEq, Token::Greater),
            '|' => {
                self.next_char();
                if self.peek_char() != Some('|') {
                    return Err(ExprError::UnexpectedToken("|".to_string()));
                }
                self.single(Token::OrOr)
            }
            '=' => {
                self.next_char();
                if self.peek_char() != Some('=') {
                    return Err(ExprError::UnexpectedToken("=".to_string()));
                }
                self.single(Token::EqualEqual)
            }
            '.' => {
                self.next_char();
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.lex_number(String::from("."))?
                } else {
                    Token::Dot
                }
            }
            ch if ch.is_ascii_digit() => self.lex_number(String::new())?,
            ch if is_ident_start(ch) => {
                let ident = self.consume_while(is_ident_continue);
                match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(ident),
                }
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        };
        Ok(Some(token))
    }

    fn lex_number(&mut self, mut value: String) -> Result<Token, ExprError> {
        value.push_str(&self.consume_while(|c| c.is_ascii_digit()));
        if !value.starts_with('.') && self.peek_char() == Some('.') {
            value.push('.');
            self.next_char();
            value.push_str(&self.consume_while(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            value.push('e');
            self.next_char();
            if let Some(sign) = self.peek_char().filter(|c| *c == '+' || *c == '-') {
                value.push(sign);
                self.next_char();
            }
            value.push_str(&self.consume_while(|c| c.is_ascii_digit()));
        }
        value
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExprError::UnexpectedToken(value))
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    fn parse_expression(&mut self, min_prec: Precedence) -> Result<Expr, ExprError> {
        let mut expr = self.parse_prefix()?;
        loop {
            expr = match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let component = match self.next() {
                        Some(Token::Ident(name)) => name,
                        Some(token) => return Err(ExprError::UnexpectedToken(token.to_string())),
                        None => return Err(ExprError::UnexpectedEof),
                    };
                    Expr::Component(Box::new(expr), component)
                }
                Some(Token::Question) => {
                    if Precedence::Conditional < min_prec {
                        break;
                    }
                    self.next();
                    let then = self.parse_expression(Precedence::Lowest)?;
                    self.expect(Token::Colon)?;
                    let otherwise = self.parse_expression(Precedence::Conditional)?;
                    Expr::Conditional {
                        cond: Box::new(expr),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    }
                }
                Some(token) => {
                    if let Some((op, prec)) = binary_op(token) {
                        if prec < min_prec {
                            break;
                        }
                        self.next();
                        let right = self.parse_expression(prec.next())?;
                        Expr::Binary {
                            left: Box::new(expr),
                            op,
                            right: Box::new(right),
                        }
                    } else {
                        break;
                    }
                }
                None => break,
            };
        }
        Ok(expr)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Bool(value)) => Ok(Expr::Bool(value)),
            Some(Token::Minus) => {
                let expr = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Negate,
                    expr: Box::new(expr),
                })
            }
            Some(Token::Plus) => self.parse_expression(Precedence::Prefix),
            Some(Token::Bang) => {
                let expr = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                })
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(Precedence::Lowest)?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => return Err(ExprError::UnexpectedToken(token.to_string())),
                None => return Err(ExprError::UnexpectedEof),
            }
        }
        Ok(args)
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, Precedence)> {
    match token {
        Token::OrOr => Some((BinaryOp::Or, Precedence::Or)),
        Token::AndAnd => Some((BinaryOp::And, Precedence::And)),
        Token::EqualEqual => Some((BinaryOp::Equal, Precedence::Equality)),
        Token::NotEqual => Some((BinaryOp::NotEqual, Precedence::Equality)),
        Token::Less => Some((BinaryOp::Less, Precedence::Comparison)),
        Token::LessEq => Some((BinaryOp::LessEq, Precedence::Comparison)),
        Token::Greater => Some((BinaryOp::Greater, Precedence::Comparison)),
        Token::GreaterEq => Some((BinaryOp::GreaterEq, Precedence::Comparison)),
        Token::Plus => Some((BinaryOp::Add, Precedence::Sum)),
        Token::Minus => Some((BinaryOp::Sub, Precedence::Sum)),
        Token::Star => Some((BinaryOp::Mul, Precedence::Product)),
        Token::Slash => Some((BinaryOp::Div, Precedence::Product)),
        Token::Amp => Some((BinaryOp::Inner, Precedence::Product)),
        Token::Caret => Some((BinaryOp::Cross, Precedence::Product)),
        _ => None,
    }
}

//! Tokenizer and recursive-descent parser for `${ ... }` expressions.
//!
//! Template splitting happens first: literal text is kept verbatim and every
//! `${ ... }` block is parsed into a [`Node`] tree. Quotes are honoured while
//! searching for the closing brace so string literals may contain `}`.

use serde_json::{Number, Value};

use crate::error::ExpressionError;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(Value),
    List(Vec<Node>),
    Identifier(String),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Size(Box<Node>),
    Unary(UnaryOperator, Box<Node>),
    Binary(BinaryOperator, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOperator {
    Not,
    Negate,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

/// A compiled template: literal text, a single typed expression, or a mix.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Template {
    Literal(String),
    Single(Node),
    Composite(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Eval(Node),
}

const KEYWORDS: &[&str] = &[
    "true", "false", "null", "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "empty", "div", "mod",
];

/// Split `source` into literal and expression segments and parse each expression.
pub(crate) fn parse_template(source: &str) -> Result<Template, ExpressionError> {
    let mut segments = Vec::new();
    let mut remaining = source;
    let mut consumed = 0usize;

    while let Some(start) = remaining.find("${") {
        if start > 0 {
            segments.push(Segment::Text(remaining[..start].to_string()));
        }
        let body_start = start + 2;
        let Some(body_length) = find_closing_brace(&remaining[body_start..]) else {
            return Err(ExpressionError::Unterminated {
                expression: source.to_string(),
            });
        };
        let body = &remaining[body_start..body_start + body_length];
        let node = parse_expression(body).map_err(|issue| ExpressionError::Syntax {
            expression: source.to_string(),
            offset: consumed + body_start + issue.offset,
            message: issue.message,
        })?;
        segments.push(Segment::Eval(node));

        let advance = body_start + body_length + 1;
        consumed += advance;
        remaining = &remaining[advance..];
    }

    if !remaining.is_empty() {
        segments.push(Segment::Text(remaining.to_string()));
    }

    Ok(match segments.len() {
        0 => Template::Literal(String::new()),
        1 => match segments.pop() {
            Some(Segment::Eval(node)) => Template::Single(node),
            Some(Segment::Text(text)) => Template::Literal(text),
            None => Template::Literal(String::new()),
        },
        _ => Template::Composite(segments),
    })
}

fn find_closing_brace(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, character) in body.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == open {
                quote = None;
            }
            continue;
        }
        match character {
            '\'' | '"' => quote = Some(character),
            '}' => return Some(index),
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxIssue {
    pub offset: usize,
    pub message: String,
}

impl SyntaxIssue {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Text(String),
    Word(String),
    Symbol(&'static str),
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", ".", ",", "!", "<", ">", "+", "-", "*", "/", "%",
];

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SyntaxIssue> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut position = 0usize;

    while position < input.len() {
        let rest = &input[position..];
        let Some(character) = rest.chars().next() else {
            break;
        };

        if character.is_whitespace() {
            position += character.len_utf8();
            continue;
        }

        if character.is_ascii_digit() {
            let start = position;
            while position < input.len() && bytes[position].is_ascii_digit() {
                position += 1;
            }
            let is_fraction = position + 1 < input.len() && bytes[position] == b'.' && bytes[position + 1].is_ascii_digit();
            if is_fraction {
                position += 1;
                while position < input.len() && bytes[position].is_ascii_digit() {
                    position += 1;
                }
                let literal = &input[start..position];
                let value: f64 = literal
                    .parse()
                    .map_err(|_| SyntaxIssue::new(start, format!("invalid number '{}'", literal)))?;
                let number = Number::from_f64(value).ok_or_else(|| SyntaxIssue::new(start, "number is not finite"))?;
                tokens.push((start, Token::Number(number)));
            } else {
                let literal = &input[start..position];
                let value: i64 = literal
                    .parse()
                    .map_err(|_| SyntaxIssue::new(start, format!("integer '{}' is out of range", literal)))?;
                tokens.push((start, Token::Number(Number::from(value))));
            }
            continue;
        }

        if character == '\'' || character == '"' {
            let start = position;
            let (text, length) = read_string(rest, character).ok_or_else(|| SyntaxIssue::new(start, "unterminated string literal"))?;
            tokens.push((start, Token::Text(text)));
            position += length;
            continue;
        }

        if character.is_ascii_alphabetic() || character == '_' || character == '$' {
            let start = position;
            while position < input.len() && (bytes[position].is_ascii_alphanumeric() || bytes[position] == b'_' || bytes[position] == b'$') {
                position += 1;
            }
            tokens.push((start, Token::Word(input[start..position].to_string())));
            continue;
        }

        let Some(symbol) = SYMBOLS.iter().find(|symbol| rest.starts_with(**symbol)) else {
            return Err(SyntaxIssue::new(position, format!("unexpected character '{}'", character)));
        };
        tokens.push((position, Token::Symbol(*symbol)));
        position += symbol.len();
    }

    Ok(tokens)
}

fn read_string(rest: &str, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut characters = rest.char_indices().skip(1);
    while let Some((index, character)) = characters.next() {
        match character {
            '\\' => {
                let (_, escaped) = characters.next()?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            _ if character == quote => return Some((text, index + character.len_utf8())),
            _ => text.push(character),
        }
    }
    None
}

/// Parse the body of a single `${ ... }` block.
pub(crate) fn parse_expression(input: &str) -> Result<Node, SyntaxIssue> {
    if input.trim().is_empty() {
        return Err(SyntaxIssue::new(0, "expression cannot be empty"));
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };
    let node = parser.parse_or()?;
    if let Some((offset, token)) = parser.tokens.get(parser.cursor) {
        return Err(SyntaxIssue::new(*offset, format!("unexpected {}", describe(token))));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.cursor).map(|(offset, _)| *offset).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, token)| token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(found)) if *found == symbol) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(found)) if found == word) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), SyntaxIssue> {
        if self.eat_symbol(symbol) {
            return Ok(());
        }
        let found = self.peek().map(describe).unwrap_or_else(|| "end of expression".to_string());
        Err(SyntaxIssue::new(self.offset(), format!("expected '{}' but found {}", symbol, found)))
    }

    fn parse_or(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_and()?;
        while self.eat_symbol("||") || self.eat_word("or") {
            let right = self.parse_and()?;
            left = Node::Binary(BinaryOperator::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_equality()?;
        while self.eat_symbol("&&") || self.eat_word("and") {
            let right = self.parse_equality()?;
            left = Node::Binary(BinaryOperator::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_relational()?;
        loop {
            let operator = if self.eat_symbol("==") || self.eat_word("eq") {
                BinaryOperator::Equal
            } else if self.eat_symbol("!=") || self.eat_word("ne") {
                BinaryOperator::NotEqual
            } else {
                return Ok(left);
            };
            let right = self.parse_relational()?;
            left = Node::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = if self.eat_symbol("<=") || self.eat_word("le") {
                BinaryOperator::LessOrEqual
            } else if self.eat_symbol(">=") || self.eat_word("ge") {
                BinaryOperator::GreaterOrEqual
            } else if self.eat_symbol("<") || self.eat_word("lt") {
                BinaryOperator::Less
            } else if self.eat_symbol(">") || self.eat_word("gt") {
                BinaryOperator::Greater
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = Node::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = if self.eat_symbol("+") {
                BinaryOperator::Add
            } else if self.eat_symbol("-") {
                BinaryOperator::Subtract
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Node::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Node, SyntaxIssue> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = if self.eat_symbol("*") {
                BinaryOperator::Multiply
            } else if self.eat_symbol("/") || self.eat_word("div") {
                BinaryOperator::Divide
            } else if self.eat_symbol("%") || self.eat_word("mod") {
                BinaryOperator::Remainder
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Node::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Node, SyntaxIssue> {
        if self.eat_symbol("!") || self.eat_word("not") {
            return Ok(Node::Unary(UnaryOperator::Not, Box::new(self.parse_unary()?)));
        }
        if self.eat_symbol("-") {
            return Ok(Node::Unary(UnaryOperator::Negate, Box::new(self.parse_unary()?)));
        }
        if self.eat_word("empty") {
            return Ok(Node::Unary(UnaryOperator::Empty, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Node, SyntaxIssue> {
        let mut node = self.parse_primary()?;
        loop {
            if self.eat_symbol(".") {
                let offset = self.offset();
                let Some(Token::Word(name)) = self.advance() else {
                    return Err(SyntaxIssue::new(offset, "expected a property name after '.'"));
                };
                if self.eat_symbol("(") {
                    if name != "size" {
                        return Err(SyntaxIssue::new(offset, format!("unsupported method '{}'", name)));
                    }
                    self.expect_symbol(")")?;
                    node = Node::Size(Box::new(node));
                } else {
                    node = Node::Member(Box::new(node), name);
                }
            } else if self.eat_symbol("[") {
                let index = self.parse_or()?;
                self.expect_symbol("]")?;
                node = Node::Index(Box::new(node), Box::new(index));
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Node, SyntaxIssue> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Number(number)) => Ok(Node::Literal(Value::Number(number))),
            Some(Token::Text(text)) => Ok(Node::Literal(Value::String(text))),
            Some(Token::Word(word)) => match word.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                keyword if KEYWORDS.contains(&keyword) => Err(SyntaxIssue::new(offset, format!("unexpected keyword '{}'", keyword))),
                _ => Ok(Node::Identifier(word)),
            },
            Some(Token::Symbol("(")) => {
                let node = self.parse_or()?;
                self.expect_symbol(")")?;
                Ok(node)
            }
            Some(Token::Symbol("[")) => {
                let mut items = Vec::new();
                if !self.eat_symbol("]") {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat_symbol("]") {
                            break;
                        }
                        self.expect_symbol(",")?;
                    }
                }
                Ok(Node::List(items))
            }
            Some(token) => Err(SyntaxIssue::new(offset, format!("unexpected {}", describe(&token)))),
            None => Err(SyntaxIssue::new(offset, "unexpected end of expression")),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(number) => format!("number {}", number),
        Token::Text(text) => format!("string '{}'", text),
        Token::Word(word) => format!("'{}'", word),
        Token::Symbol(symbol) => format!("'{}'", symbol),
    }
}

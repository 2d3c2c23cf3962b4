//! Recursive-descent parser for JSTP values
//!
//! ```text
//! value    := object | array | string | number | true | false | null | undefined
//! object   := '{' (pair (',' pair)* ','?)? '}'
//! pair     := (key | string) ':' value
//! array    := '[' element (',' element)* ']'
//! element  := value | ε        -- ε yields undefined, except before ']'
//! ```
//!
//! A [`Parser`] can be pointed at new input with [`Parser::set_input`] and can
//! read several whitespace-separated values from one input by calling
//! [`Parser::parse`] repeatedly.

use std::str::FromStr;

use crate::token::{Token, Tokenizer};
use crate::value::{Number, Object, Value};
use crate::{Error, Result};

/// Deepest array/object nesting accepted before parsing fails
pub const MAX_DEPTH: usize = 128;

/// Reusable JSTP parser
#[derive(Debug, Clone, Default)]
pub struct Parser<'a> {
    tokens: Tokenizer<'a>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: Tokenizer::new(input),
            depth: 0,
        }
    }

    /// Reset the cursor onto a new input
    pub fn set_input(&mut self, input: &'a str) {
        self.tokens.reset(input);
        self.depth = 0;
    }

    /// True once only whitespace remains
    pub fn is_at_end(&self) -> bool {
        self.tokens.peek() == Token::None
    }

    /// Fail unless the input has been fully consumed
    pub fn finish(&mut self) -> Result<()> {
        match self.tokens.next() {
            Token::None => Ok(()),
            other => Err(self.unexpected("end of input", other)),
        }
    }

    /// Parse the next value of any kind
    pub fn parse(&mut self) -> Result<Value> {
        let token = self.tokens.next();
        self.parse_value(token)
    }

    /// Parse the next value, which must be an object
    pub fn parse_object(&mut self) -> Result<Object> {
        match self.tokens.next() {
            Token::CurlyOpen => self.parse_object_body(),
            Token::None => Err(Error::UnexpectedEnd { expected: "'{'" }),
            token => {
                let found = self.parse_value(token)?;
                Err(Error::ExpectedObject(found.type_name()))
            }
        }
    }

    /// Parse the next value, which must be an array
    pub fn parse_array(&mut self) -> Result<Vec<Value>> {
        match self.tokens.next() {
            Token::SqOpen => self.parse_array_body(),
            Token::None => Err(Error::UnexpectedEnd { expected: "'['" }),
            token => Err(self.unexpected("'['", token)),
        }
    }

    /// Parse a bare `key: value` pair
    pub fn parse_key_value_pair(&mut self) -> Result<(String, Value)> {
        let token = self.tokens.next();
        self.parse_pair(token)
    }

    fn unexpected(&self, expected: &'static str, found: Token) -> Error {
        if found == Token::None {
            return Error::UnexpectedEnd { expected };
        }
        Error::UnexpectedToken {
            expected,
            found: format!("{} `{}`", found, self.tokens.lexeme()),
            offset: self.tokens.token_start(),
        }
    }

    fn parse_value(&mut self, token: Token) -> Result<Value> {
        match token {
            Token::CurlyOpen => self.parse_object_body().map(Value::Object),
            Token::SqOpen => self.parse_array_body().map(Value::Array),
            Token::QuotesOpen => self.parse_string_body().map(Value::String),
            Token::Number => parse_number(self.tokens.lexeme()).map(Value::Number),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Null => Ok(Value::Null),
            Token::Undefined => Ok(Value::Undefined),
            Token::Key => match self.tokens.lexeme() {
                "NaN" => Ok(Value::Number(Number::Float(f64::NAN))),
                "Infinity" => Ok(Value::Number(Number::Float(f64::INFINITY))),
                "-Infinity" => Ok(Value::Number(Number::Float(f64::NEG_INFINITY))),
                _ => Err(self.unexpected("value", token)),
            },
            _ => Err(self.unexpected("value", token)),
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::NestingTooDeep { depth: MAX_DEPTH });
        }
        self.depth += 1;
        Ok(())
    }

    /// Object contents; the opening brace is already consumed
    fn parse_object_body(&mut self) -> Result<Object> {
        self.enter()?;
        let object = self.parse_object_members();
        self.depth -= 1;
        object
    }

    fn parse_object_members(&mut self) -> Result<Object> {
        let mut object = Object::new();
        let mut token = self.tokens.next();
        if token == Token::CurlyClose {
            return Ok(object);
        }

        loop {
            let (key, value) = self.parse_pair(token)?;
            object.insert(key, value);

            match self.tokens.next() {
                Token::CurlyClose => return Ok(object),
                Token::Comma => {
                    token = self.tokens.next();
                    if token == Token::CurlyClose {
                        return Ok(object);
                    }
                }
                Token::Colon => return Err(Error::DuplicateSeparator(self.tokens.token_start())),
                other => return Err(self.unexpected("',' or '}'", other)),
            }
        }
    }

    fn parse_pair(&mut self, token: Token) -> Result<(String, Value)> {
        let key = match token {
            Token::QuotesOpen => self.parse_string_body()?,
            Token::Key | Token::Number | Token::True | Token::False | Token::Null | Token::Undefined => {
                self.tokens.lexeme().to_string()
            }
            other => return Err(self.unexpected("key", other)),
        };

        match self.tokens.next() {
            Token::Colon => {}
            other => return Err(self.unexpected("':'", other)),
        }

        let token = self.tokens.next();
        // `{a : b : 1}` reads as one pair with two separators
        if token == Token::Colon || (token == Token::Key && self.tokens.peek() == Token::Colon) {
            return Err(Error::DuplicateSeparator(self.tokens.token_start()));
        }
        let value = self.parse_value(token)?;
        Ok((key, value))
    }

    /// Array contents; the opening bracket is already consumed
    fn parse_array_body(&mut self) -> Result<Vec<Value>> {
        self.enter()?;
        let items = self.parse_array_items();
        self.depth -= 1;
        items
    }

    fn parse_array_items(&mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        // true at the start and right after a comma
        let mut expect_element = true;

        loop {
            match self.tokens.next() {
                Token::SqClose => return Ok(items),
                Token::Comma => {
                    if expect_element {
                        items.push(Value::Undefined);
                    }
                    expect_element = true;
                }
                token if expect_element => {
                    items.push(self.parse_value(token)?);
                    expect_element = false;
                }
                other => return Err(self.unexpected("',' or ']'", other)),
            }
        }
    }

    /// String contents; the opening quote is already consumed
    fn parse_string_body(&mut self) -> Result<String> {
        let open = self.tokens.token_start();
        if self.tokens.next() != Token::String {
            return Err(Error::UnterminatedString(open));
        }
        let text = unescape(self.tokens.lexeme(), self.tokens.token_start())?;
        match self.tokens.next() {
            Token::QuotesClose => Ok(text),
            _ => Err(Error::UnterminatedString(open)),
        }
    }
}

/// Convert a number lexeme to the narrowest exact representation
pub fn parse_number(lexeme: &str) -> Result<Number> {
    if !lexeme.contains(['.', 'e', 'E']) {
        if let Ok(int) = lexeme.parse::<i64>() {
            return Ok(Number::Int(int));
        }
    }
    lexeme
        .parse::<f64>()
        .map(Number::Float)
        .map_err(|_| Error::InvalidNumber(lexeme.to_string()))
}

fn invalid_escape(offset: usize, reason: &str) -> Error {
    Error::InvalidEscape {
        offset,
        reason: reason.to_string(),
    }
}

/// Exactly `count` hex digits from the front of `s`
fn take_hex(s: &str, count: usize) -> Option<(u32, &str)> {
    let digits = s.get(..count)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(digits, 16).ok()?;
    Some((code, &s[count..]))
}

/// Decode the tail of a `\u` escape: `HHHH` (with surrogate pairing) or `{H+}`
fn unescape_unicode(s: &str, offset: usize) -> Result<(char, &str)> {
    if let Some(braced) = s.strip_prefix('{') {
        let end = braced
            .find('}')
            .ok_or_else(|| invalid_escape(offset, "unterminated \\u{...}"))?;
        let digits = &braced[..end];
        let (code, _) = take_hex(digits, digits.len())
            .filter(|_| (1..=6).contains(&digits.len()))
            .ok_or_else(|| invalid_escape(offset, "expected 1 to 6 hex digits"))?;
        let ch = char::from_u32(code)
            .ok_or_else(|| invalid_escape(offset, "code point out of range"))?;
        return Ok((ch, &braced[end + 1..]));
    }

    let (unit, rest) =
        take_hex(s, 4).ok_or_else(|| invalid_escape(offset, "expected 4 hex digits"))?;
    if (0xD800..0xDC00).contains(&unit) {
        let low = rest.strip_prefix("\\u").and_then(|r| take_hex(r, 4));
        if let Some((low, after)) = low.filter(|(low, _)| (0xDC00..0xE000).contains(low)) {
            let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            if let Some(ch) = char::from_u32(code) {
                return Ok((ch, after));
            }
        }
    }
    char::from_u32(unit)
        .map(|ch| (ch, rest))
        .ok_or_else(|| invalid_escape(offset, "unpaired surrogate"))
}

/// Resolve escape sequences in a raw string body starting at byte `base`
fn unescape(raw: &str, base: usize) -> Result<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let offset = base + (raw.len() - rest.len()) + pos;
        let mut tail = rest[pos + 1..].chars();
        let escape = tail
            .next()
            .ok_or_else(|| invalid_escape(offset, "dangling backslash"))?;
        rest = tail.as_str();

        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'x' => {
                let (code, after) = take_hex(rest, 2)
                    .ok_or_else(|| invalid_escape(offset, "expected 2 hex digits"))?;
                // two hex digits are always a valid scalar value
                out.extend(char::from_u32(code));
                rest = after;
            }
            'u' => {
                let (ch, after) = unescape_unicode(rest, offset)?;
                out.push(ch);
                rest = after;
            }
            // `\\`, `\'`, `\"` and any other escaped character pass through
            other => out.push(other),
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse exactly one value from `text`
pub fn parse(text: &str) -> Result<Value> {
    let mut parser = Parser::new(text);
    let value = parser.parse()?;
    parser.finish()?;
    Ok(value)
}

/// Parse exactly one object from `text`
pub fn parse_object(text: &str) -> Result<Object> {
    let mut parser = Parser::new(text);
    let object = parser.parse_object()?;
    parser.finish()?;
    Ok(object)
}

/// Check that `text` holds exactly one well-formed value
pub fn validate(text: &str) -> Result<()> {
    parse(text).map(|_| ())
}

impl FromStr for Value {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

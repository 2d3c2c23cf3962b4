//! Lexical tokens and the tokenizer
//!
//! The tokenizer classifies lexemes only. String bodies are handed to the
//! parser raw (escapes untouched) and numbers are handed over as text, so all
//! conversion rules live in [`crate::parser`].

use std::fmt;

/// Lexical category of the next lexeme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    True,
    False,
    Null,
    Undefined,
    Number,
    /// Unquoted identifier
    Key,
    /// Raw string body between a pair of quotes
    String,
    QuotesOpen,
    QuotesClose,
    CurlyOpen,
    CurlyClose,
    SqOpen,
    SqClose,
    Colon,
    Comma,
    /// End of input, or a string that never closes
    None,
}

impl Token {
    /// Literal character of a punctuation token
    pub fn ch(&self) -> Option<char> {
        match self {
            Token::CurlyOpen => Some('{'),
            Token::CurlyClose => Some('}'),
            Token::SqOpen => Some('['),
            Token::SqClose => Some(']'),
            Token::Colon => Some(':'),
            Token::Comma => Some(','),
            _ => None,
        }
    }

    /// Punctuation table lookup; quotes are not punctuation
    pub fn from_char(ch: char) -> Option<Token> {
        match ch {
            '{' => Some(Token::CurlyOpen),
            '}' => Some(Token::CurlyClose),
            '[' => Some(Token::SqOpen),
            ']' => Some(Token::SqClose),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ch) = self.ch() {
            return write!(f, "'{}'", ch);
        }
        let name = match self {
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            Token::Number => "number",
            Token::Key => "identifier",
            Token::String => "string",
            Token::QuotesOpen => "opening quote",
            Token::QuotesClose => "closing quote",
            _ => "end of input",
        };
        f.write_str(name)
    }
}

/// Characters that end an identifier
pub fn is_delimiter(ch: char) -> bool {
    matches!(ch, '{' | '}' | '[' | ']' | ':' | ',' | '\'' | '"') || ch.is_whitespace()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringMode {
    Outside,
    /// Quote opened, body not read yet
    Body(char),
    /// Body read, closing quote pending
    Close,
}

/// Cursor over a JSTP text
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
    end: usize,
    mode: StringMode,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
            end: 0,
            mode: StringMode::Outside,
        }
    }

    /// Point at a new input and reset all state
    pub fn reset(&mut self, input: &'a str) {
        *self = Self::new(input);
    }

    /// Next token without advancing
    pub fn peek(&self) -> Token {
        self.clone().next()
    }

    /// Text of the most recently consumed token
    pub fn lexeme(&self) -> &'a str {
        &self.input[self.start..self.end]
    }

    /// Byte offset where the most recently consumed token starts
    pub fn token_start(&self) -> usize {
        self.start
    }

    /// Current byte offset
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn consume(&mut self, len: usize, token: Token) -> Token {
        self.start = self.pos;
        self.pos += len;
        self.end = self.pos;
        token
    }

    /// Consume and return the next token
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Token {
        match self.mode {
            StringMode::Body(quote) => return self.next_string_body(quote),
            StringMode::Close => {
                self.mode = StringMode::Outside;
                return self.consume(1, Token::QuotesClose);
            }
            StringMode::Outside => {}
        }

        self.skip_whitespace();
        let Some(ch) = self.rest().chars().next() else {
            return self.consume(0, Token::None);
        };

        if ch == '\'' || ch == '"' {
            self.mode = StringMode::Body(ch);
            return self.consume(1, Token::QuotesOpen);
        }
        if let Some(token) = Token::from_char(ch) {
            return self.consume(1, token);
        }
        if ch == '-' || ch.is_ascii_digit() {
            if let Some(len) = scan_number(self.rest()) {
                let followed_by = self.rest()[len..].chars().next();
                if followed_by.map_or(true, is_delimiter) {
                    return self.consume(len, Token::Number);
                }
            }
        }

        let len = self
            .rest()
            .find(is_delimiter)
            .unwrap_or_else(|| self.rest().len());
        let token = match &self.rest()[..len] {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            _ => Token::Key,
        };
        self.consume(len, token)
    }

    fn next_string_body(&mut self, quote: char) -> Token {
        let rest = self.rest();
        let mut escaped = false;
        for (i, ch) in rest.char_indices() {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                self.mode = StringMode::Close;
                return self.consume(i, Token::String);
            }
        }
        // no closing quote: swallow the rest so the input stays exhausted
        self.mode = StringMode::Outside;
        let len = rest.len();
        self.consume(len, Token::None)
    }
}

impl Default for Tokenizer<'_> {
    fn default() -> Self {
        Self::new("")
    }
}

/// Length of the number literal at the start of `s`, if there is one
fn scan_number(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut i = usize::from(bytes.first() == Some(&b'-'));
    let int_len = digits(i);
    if int_len == 0 {
        return None;
    }
    i += int_len;

    if bytes.get(i) == Some(&b'.') {
        let frac_len = digits(i + 1);
        if frac_len > 0 {
            i += 1 + frac_len;
        }
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_len = digits(j.min(bytes.len()));
        if exp_len > 0 {
            i = j + exp_len;
        }
    }

    Some(i)
}

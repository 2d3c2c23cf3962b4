//! Rendering values back into wire text
//!
//! Output is compact (`{a:1,b:[2,3]}`), keeps object key order and quotes
//! strings with `'` unless asked otherwise. Control characters are written as
//! `\u00HH`; everything else printable, non-ASCII included, is written as is.

use std::fmt::{self, Write};

use crate::value::{Number, Object, Value};

/// String delimiter used when rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    #[default]
    Single,
    Double,
}

impl Quote {
    pub fn as_char(self) -> char {
        match self {
            Quote::Single => '\'',
            Quote::Double => '"',
        }
    }
}

/// 2^53, the end of the range where every integer is an exact f64
const MAX_SAFE_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Write `value` into any formatter-like sink
pub fn write_value<W: Write>(out: &mut W, value: &Value, quote: Quote) -> fmt::Result {
    match value {
        Value::Null => out.write_str("null"),
        Value::Undefined => out.write_str("undefined"),
        Value::Bool(b) => out.write_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s, quote),
        Value::Array(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_char(',')?;
                }
                write_value(out, item, quote)?;
            }
            out.write_char(']')
        }
        Value::Object(obj) => write_object(out, obj, quote),
    }
}

pub fn write_object<W: Write>(out: &mut W, obj: &Object, quote: Quote) -> fmt::Result {
    out.write_char('{')?;
    for (i, (key, value)) in obj.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        if is_bare_key(key) {
            out.write_str(key)?;
        } else {
            write_string(out, key, quote)?;
        }
        out.write_char(':')?;
        write_value(out, value, quote)?;
    }
    out.write_char('}')
}

fn write_number<W: Write>(out: &mut W, n: &Number) -> fmt::Result {
    match n {
        Number::Int(i) => write!(out, "{}", i),
        Number::Float(f) if f.is_nan() => out.write_str("NaN"),
        Number::Float(f) if f.is_infinite() => {
            out.write_str(if *f > 0.0 { "Infinity" } else { "-Infinity" })
        }
        // whole floats past 2^53 would read back as a different integer
        Number::Float(f) if f.fract() == 0.0 && f.abs() >= MAX_SAFE_FLOAT => write!(out, "{:e}", f),
        // Display for f64 is the shortest text that parses back to the same bits
        Number::Float(f) => write!(out, "{}", f),
    }
}

/// Quote and escape a string
pub fn write_string<W: Write>(out: &mut W, s: &str, quote: Quote) -> fmt::Result {
    let q = quote.as_char();
    out.write_char(q)?;
    for ch in s.chars() {
        match ch {
            '\\' => out.write_str("\\\\")?,
            c if c == q => {
                out.write_char('\\')?;
                out.write_char(c)?;
            }
            c if (c as u32) < 0x20 || c == '\u{7f}' => write!(out, "\\u{:04X}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char(q)
}

/// Keys that read back unchanged without quotes
fn is_bare_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        None => false,
        Some(c) if c.is_ascii_digit() => key.bytes().all(|b| b.is_ascii_digit()),
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        Some(_) => false,
    }
}

impl Value {
    /// Render with an explicit string delimiter
    pub fn to_string_with_quote(&self, quote: Quote) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = write_value(&mut out, self, quote);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, Quote::default())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_object(f, self, Quote::default())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_number(f, self)
    }
}

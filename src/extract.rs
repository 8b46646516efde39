//! Turning the model's function-call answer into geocoding query parameters.
//!
//! The main path reads the structured `functionCall` part of a
//! [`GenerationResponse`]. [`ToolCallDirective::parse_text`] is a fallback for
//! callers that only have the protobuf text rendering of a call, e.g.
//!
//! ```text
//! name: "getAddress"
//! args {
//!   fields {
//!     key: "latlng"
//!     value { string_value: "40.714224,-73.961452" }
//!   }
//! }
//! ```

use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::{
    generation::GenerationResponse,
    tools::{FunctionCall, FunctionCallError, FunctionDeclaration},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("model declined to call the requested function '{expected}'"))]
    NoFunctionCall {
        expected: String,
        /// Free text the model answered with instead
        text: Option<String>,
    },

    #[snafu(display("model called '{actual}' instead of '{expected}'"))]
    UnexpectedFunction { expected: String, actual: String },

    #[snafu(display("arguments of '{name}' should be an object; actual: {actual}"))]
    ArgumentsNotObject { name: String, actual: String },

    #[snafu(display("required argument of '{name}' is unusable"))]
    MissingArgument {
        source: FunctionCallError,
        name: String,
    },

    #[snafu(display("argument '{key}' of '{name}' is not a flat value: {value}"))]
    NonScalarArgument {
        name: String,
        key: String,
        value: Value,
    },

    #[snafu(display("malformed function call text at offset {offset}: {reason}"))]
    MalformedText { offset: usize, reason: String },
}

impl Error {
    /// Whether the model simply did not ask for the function (as opposed to asking badly)
    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            Error::NoFunctionCall { .. } | Error::UnexpectedFunction { .. }
        )
    }
}

/// The function the model asked for, with its flattened arguments.
///
/// Consumed by [`ToolCallDirective::into_query`]; a directive drives exactly
/// one geocoding request.
#[derive(Debug, PartialEq, Eq)]
pub struct ToolCallDirective {
    name: String,
    args: Vec<(String, String)>,
}

/// Query parameters derived from a directive, ready to append to the geocoding URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery {
    /// Name of the function the query answers
    pub function_name: String,
    /// `&key=value` segments, values exactly as the model produced them
    pub params: String,
}

impl ToolCallDirective {
    pub fn new(name: impl Into<String>, args: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Extract the call to `declaration` from the first candidate of `response`
    pub fn from_response(
        response: &GenerationResponse,
        declaration: &FunctionDeclaration,
    ) -> Result<Self, Error> {
        let Some(call) = response.function_calls().into_iter().next() else {
            let text = response.text();
            return NoFunctionCallSnafu {
                expected: declaration.name.clone(),
                text: (!text.is_empty()).then_some(text),
            }
            .fail();
        };
        Self::from_function_call(call, declaration)
    }

    /// Validate `call` against `declaration` and flatten its arguments
    pub fn from_function_call(
        call: &FunctionCall,
        declaration: &FunctionDeclaration,
    ) -> Result<Self, Error> {
        if call.name != declaration.name {
            return UnexpectedFunctionSnafu {
                expected: declaration.name.clone(),
                actual: call.name.clone(),
            }
            .fail();
        }

        for key in declaration.required() {
            call.get::<Value>(key).context(MissingArgumentSnafu {
                name: call.name.clone(),
            })?;
        }

        let args = match &call.args {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| {
                    flatten(value)
                        .map(|flat| (key.clone(), flat))
                        .ok_or_else(|| {
                            NonScalarArgumentSnafu {
                                name: call.name.clone(),
                                key: key.clone(),
                                value: value.clone(),
                            }
                            .build()
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Null => Vec::new(),
            other => {
                return ArgumentsNotObjectSnafu {
                    name: call.name.clone(),
                    actual: other.to_string(),
                }
                .fail()
            }
        };

        Ok(Self::new(call.name.clone(), args))
    }

    /// Rebuild a directive from the protobuf text rendering of a function call.
    ///
    /// Every `fields { key: ... value { *_value: ... } }` entry becomes one
    /// argument, in the order it appears. Anything that does not parse cleanly
    /// is an error; this never yields a directive without arguments.
    pub fn parse_text(text: &str) -> Result<Self, Error> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: text.len(),
        };
        let fields = parser.parse_fields(false)?;

        let name = find_scalar(&fields, "name").ok_or_else(|| malformed(0, "no function name"))?;

        let mut args = Vec::new();
        collect_pairs(&fields, &mut args)?;
        if args.is_empty() {
            return MalformedTextSnafu {
                offset: text.len(),
                reason: "no key/value pairs found",
            }
            .fail();
        }

        Ok(Self::new(name, args))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Consume the directive, producing the geocoding query segments
    pub fn into_query(self) -> GeocodeQuery {
        let params = self
            .args
            .iter()
            .map(|(key, value)| format!("&{key}={value}"))
            .collect();
        GeocodeQuery {
            function_name: self.name,
            params,
        }
    }
}

fn flatten(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn malformed(offset: usize, reason: impl Into<String>) -> Error {
    MalformedTextSnafu {
        offset,
        reason: reason.into(),
    }
    .build()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Colon,
    Open,
    Close,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'+')
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, Error> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        match bytes[pos] {
            b if b.is_ascii_whitespace() || b == b',' || b == b';' => pos += 1,
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b':' => {
                tokens.push((start, Token::Colon));
                pos += 1;
            }
            b'{' => {
                tokens.push((start, Token::Open));
                pos += 1;
            }
            b'}' => {
                tokens.push((start, Token::Close));
                pos += 1;
            }
            quote @ (b'"' | b'\'') => {
                let (value, next) = read_string(bytes, pos + 1, quote)?;
                tokens.push((start, Token::Str(value)));
                pos = next;
            }
            b if is_ident_byte(b) => {
                while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(text[start..pos].to_string())));
            }
            other => {
                return Err(malformed(
                    start,
                    format!("unexpected character '{}'", other as char),
                ))
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted string starting right after the opening quote.
///
/// Handles C-style escapes, including the octal byte escapes protobuf uses
/// for non-ASCII text.
fn read_string(bytes: &[u8], mut pos: usize, quote: u8) -> Result<(String, usize), Error> {
    let opening = pos - 1;
    let mut out = Vec::new();

    loop {
        let Some(&b) = bytes.get(pos) else {
            return Err(malformed(opening, "unterminated string"));
        };
        pos += 1;
        match b {
            b if b == quote => break,
            b'\n' => return Err(malformed(pos - 1, "newline inside string")),
            b'\\' => {
                let Some(&escaped) = bytes.get(pos) else {
                    return Err(malformed(opening, "unterminated string"));
                };
                pos += 1;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'\\' | b'"' | b'\'' | b'?' => out.push(escaped),
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        for _ in 0..2 {
                            match bytes.get(pos) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    pos += 1;
                                }
                                _ => break,
                            }
                        }
                        let byte = u8::try_from(value)
                            .map_err(|_| malformed(pos, "octal escape out of range"))?;
                        out.push(byte);
                    }
                    b'x' => {
                        let digits = bytes
                            .get(pos..pos + 2)
                            .and_then(|d| std::str::from_utf8(d).ok())
                            .and_then(|d| u8::from_str_radix(d, 16).ok())
                            .ok_or_else(|| malformed(pos, "bad hex escape"))?;
                        out.push(digits);
                        pos += 2;
                    }
                    other => {
                        return Err(malformed(
                            pos - 1,
                            format!("unknown escape '\\{}'", other as char),
                        ))
                    }
                }
            }
            b => out.push(b),
        }
    }

    let value = String::from_utf8(out).map_err(|_| malformed(opening, "string is not UTF-8"))?;
    Ok((value, pos))
}

#[derive(Debug)]
enum Node {
    Scalar(String),
    Message(Vec<(String, Node)>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_colon(&mut self) -> bool {
        if matches!(self.tokens.get(self.pos), Some((_, Token::Colon))) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_fields(&mut self, nested: bool) -> Result<Vec<(String, Node)>, Error> {
        let mut fields = Vec::new();
        loop {
            match self.next() {
                None if nested => return Err(malformed(self.end, "missing closing brace")),
                None => return Ok(fields),
                Some((_, Token::Close)) if nested => return Ok(fields),
                Some((offset, Token::Close)) => return Err(malformed(offset, "unbalanced '}'")),
                Some((offset, Token::Ident(name))) => {
                    let has_colon = self.eat_colon();
                    let node = match self.next() {
                        Some((_, Token::Open)) => Node::Message(self.parse_fields(true)?),
                        Some((_, Token::Str(value) | Token::Ident(value))) if has_colon => {
                            Node::Scalar(value)
                        }
                        Some((offset, _)) => {
                            return Err(malformed(offset, format!("expected value for '{name}'")))
                        }
                        None => {
                            return Err(malformed(offset, format!("field '{name}' has no value")))
                        }
                    };
                    fields.push((name, node));
                }
                Some((offset, _)) => return Err(malformed(offset, "expected field name")),
            }
        }
    }
}

/// Depth-first search for a scalar field, not descending into argument entries
fn find_scalar<'a>(fields: &'a [(String, Node)], wanted: &str) -> Option<&'a str> {
    fields.iter().find_map(|(name, node)| match node {
        Node::Scalar(value) if name == wanted => Some(value.as_str()),
        Node::Message(inner) if name != "fields" => find_scalar(inner, wanted),
        _ => None,
    })
}

fn collect_pairs(fields: &[(String, Node)], out: &mut Vec<(String, String)>) -> Result<(), Error> {
    for (name, node) in fields {
        let Node::Message(inner) = node else {
            continue;
        };
        if name != "fields" {
            collect_pairs(inner, out)?;
            continue;
        }

        let key = inner
            .iter()
            .find_map(|(field, node)| match node {
                Node::Scalar(key) if field == "key" => Some(key.clone()),
                _ => None,
            })
            .ok_or_else(|| malformed(0, "argument entry without a key"))?;

        let value = inner
            .iter()
            .find_map(|(field, node)| match node {
                Node::Message(value) if field == "value" => Some(value),
                _ => None,
            })
            .and_then(|value| {
                value.iter().find_map(|(kind, node)| match node {
                    Node::Scalar(v) if kind.ends_with("_value") && kind != "null_value" => {
                        Some(v.clone())
                    }
                    _ => None,
                })
            })
            .ok_or_else(|| malformed(0, format!("argument '{key}' has no scalar value")))?;

        out.push((key, value));
    }
    Ok(())
}

//! Intrinsic function tokens.
//!
//! A [`Token`] is a value that is either a literal or an expression the
//! provisioning engine resolves at deploy time (`Ref`, `Fn::GetAtt`, ...).
//! Constructs hand tokens to each other to wire resources together; the
//! template only ever sees their JSON rendering.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Pseudo parameters the engine supplies for every stack.
pub mod pseudo {
    /// `AWS::AccountId`
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    /// `AWS::Region`
    pub const REGION: &str = "AWS::Region";
    /// `AWS::Partition`
    pub const PARTITION: &str = "AWS::Partition";
    /// `AWS::StackName`
    pub const STACK_NAME: &str = "AWS::StackName";
    /// `AWS::URLSuffix`
    pub const URL_SUFFIX: &str = "AWS::URLSuffix";
    /// `AWS::NoValue`
    pub const NO_VALUE: &str = "AWS::NoValue";

    /// Whether `name` is a pseudo parameter rather than a logical id.
    pub fn is_pseudo(name: &str) -> bool {
        name.starts_with("AWS::")
    }
}

/// A literal or deploy-time expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A plain string
    Literal(String),
    /// `{"Ref": id}`
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::Join": [delimiter, [parts...]]}`
    Join(String, Vec<Token>),
    /// `{"Fn::Select": [index, list]}`
    Select(usize, Box<Token>),
    /// `{"Fn::GetAZs": region}`
    GetAzs(Box<Token>),
}

impl Token {
    /// A literal string token.
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    /// `Ref` to a logical id or pseudo parameter.
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    /// `Fn::GetAtt` on a logical id.
    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::GetAtt(logical_id.into(), attribute.into())
    }

    /// `Fn::Join` of the given parts.
    ///
    /// Adjacent literals are merged and a join made of a single literal
    /// collapses to that literal, so the rendered template stays minimal.
    pub fn join(delimiter: impl Into<String>, parts: Vec<Token>) -> Self {
        let delimiter = delimiter.into();
        let mut merged: Vec<Token> = Vec::with_capacity(parts.len());
        for part in parts {
            if delimiter.is_empty() {
                if let (Some(Token::Literal(prev)), Token::Literal(next)) =
                    (merged.last_mut(), &part)
                {
                    prev.push_str(next);
                    continue;
                }
            }
            merged.push(part);
        }

        if merged.iter().all(|t| matches!(t, Token::Literal(_))) {
            let literals: Vec<String> = merged
                .into_iter()
                .filter_map(|t| match t {
                    Token::Literal(s) => Some(s),
                    _ => None,
                })
                .collect();
            return Token::Literal(literals.join(&delimiter));
        }

        Token::Join(delimiter, merged)
    }

    /// `Fn::Select` of `index` from a list-valued token.
    pub fn select(index: usize, list: Token) -> Self {
        Token::Select(index, Box::new(list))
    }

    /// `Fn::GetAZs` for a region (an empty literal means the stack's region).
    pub fn get_azs(region: Token) -> Self {
        Token::GetAzs(Box::new(region))
    }

    /// The literal value, if any.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Token::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Render the token as template JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Token::Literal(s) => Value::String(s.clone()),
            Token::Ref(id) => json!({ "Ref": id }),
            Token::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id, attr] }),
            Token::Join(delim, parts) => {
                let parts: Vec<Value> = parts.iter().map(Token::to_value).collect();
                json!({ "Fn::Join": [delim, parts] })
            }
            Token::Select(index, list) => json!({ "Fn::Select": [index, list.to_value()] }),
            Token::GetAzs(region) => json!({ "Fn::GetAZs": region.to_value() }),
        }
    }

    /// Logical ids this token refers to (pseudo parameters excluded).
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_references(&self.to_value(), &mut out);
        out
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl From<Token> for Value {
    fn from(token: Token) -> Self {
        token.to_value()
    }
}

impl From<&Token> for Value {
    fn from(token: &Token) -> Self {
        token.to_value()
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Literal(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::Literal(s)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => write!(f, "{}", s),
            Token::Ref(id) => write!(f, "${{{}}}", id),
            Token::GetAtt(id, attr) => write!(f, "${{{}.{}}}", id, attr),
            Token::Join(delim, parts) => {
                let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
                write!(f, "{}", rendered.join(delim))
            }
            Token::Select(index, list) => write!(f, "{}[{}]", list, index),
            Token::GetAzs(region) => match region.as_literal() {
                Some("") => write!(f, "${{AZs}}"),
                _ => write!(f, "${{AZs:{}}}", region),
            },
        }
    }
}

/// Collect every logical id referenced anywhere inside `value`.
///
/// Recognizes `Ref`, `Fn::GetAtt` (array and dotted string forms) and the
/// `${Name}` / `${Name.Attr}` placeholders of `Fn::Sub`. Pseudo parameters
/// and `${!Literal}` escapes are skipped.
pub fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(target)) = map.get("Ref") {
                if !pseudo::is_pseudo(target) {
                    out.insert(target.clone());
                }
                return;
            }
            if let Some(att) = map.get("Fn::GetAtt") {
                match att {
                    Value::Array(items) => {
                        if let Some(Value::String(target)) = items.first() {
                            out.insert(target.clone());
                        }
                    }
                    Value::String(dotted) => {
                        if let Some((target, _)) = dotted.split_once('.') {
                            out.insert(target.to_string());
                        }
                    }
                    _ => {}
                }
                return;
            }
            if let Some(sub) = map.get("Fn::Sub") {
                let (template, vars) = match sub {
                    Value::String(s) => (s.as_str(), None),
                    Value::Array(items) => match items.first() {
                        Some(Value::String(s)) => (s.as_str(), items.get(1)),
                        _ => ("", None),
                    },
                    _ => ("", None),
                };
                let locals: BTreeSet<String> = vars
                    .and_then(Value::as_object)
                    .map(|m| m.keys().cloned().collect())
                    .unwrap_or_default();
                for name in sub_placeholders(template) {
                    let base = name.split('.').next().unwrap_or(&name).to_string();
                    if !pseudo::is_pseudo(&base) && !locals.contains(&base) {
                        out.insert(base);
                    }
                }
                if let Some(vars) = vars {
                    collect_references(vars, out);
                }
                return;
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

fn sub_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') && !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

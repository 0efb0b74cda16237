use std::fmt;

use crate::passes::constants::Constant;

/// Library functions the reference VM provides as globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    ToString,
    Type,
    ToNumber,
}

impl Builtin {
    pub const ALL: [(&'static str, Builtin); 4] = [
        ("print", Builtin::Print),
        ("tostring", Builtin::ToString),
        ("type", Builtin::Type),
        ("tonumber", Builtin::ToNumber),
    ];
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(Vec<u8>),
    Builtin(Builtin),
    /// The VM's private empty function, pushed by `LOADSTUB`.
    Stub,
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        match c {
            Constant::Integer(v) => Value::Integer(v),
            Constant::Float(v) => Value::Float(v),
            Constant::String(s) => Value::Str(s),
            Constant::Boolean(b) => Value::Boolean(b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Builtin(_) | Value::Stub => "function",
        }
    }

    /// Raw equality: numbers compare by value across subtypes, everything
    /// else by content or identity.
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Stub, Value::Stub) => true,
            _ => false,
        }
    }

    /// Number view with string coercion, as arithmetic sees it.
    pub fn to_number(&self) -> Option<Value> {
        match self {
            Value::Integer(_) | Value::Float(_) => Some(self.clone()),
            Value::Str(s) => parse_number(&String::from_utf8_lossy(s)),
            _ => None,
        }
    }

    /// `tostring` rendering.
    pub fn to_display_bytes(&self) -> Vec<u8> {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string().into_bytes(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Value::Builtin(b) => write!(f, "builtin: {:?}", b),
            Value::Stub => write!(f, "function: stub"),
        }
    }
}

/// `%.14g`, plus a trailing `.0` when the result reads like an integer.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return if v.is_sign_negative() { "-nan".into() } else { "nan".into() };
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }
    let sci = format!("{:.13e}", v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };
    let text = if !(-4..14).contains(&exp) {
        let mantissa = trim_fraction(&mantissa);
        format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let decimals = (13 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, v))
    };
    if text.contains(['.', 'e', 'n', 'i']) { text } else { format!("{}.0", text) }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Lua numeral conversion used by `tonumber` and string coercion.
pub fn parse_number(text: &str) -> Option<Value> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let (negative, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let mut acc: u64 = 0;
        if hex.is_empty() {
            return None;
        }
        for c in hex.chars() {
            acc = acc.wrapping_mul(16).wrapping_add(c.to_digit(16)? as u64);
        }
        let v = acc as i64;
        return Some(Value::Integer(if negative { v.wrapping_neg() } else { v }));
    }
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if let Ok(v) = t.parse::<i64>() {
        return Some(Value::Integer(v));
    }
    // Fractions, exponents and integers too wide for i64.
    t.parse::<f64>().ok().map(Value::Float)
}

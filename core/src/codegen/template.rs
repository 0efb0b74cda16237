//! Template expansion and Lua literal formatting.
//!
//! Runtime templates spell every name the generator introduces as `$name`.
//! `expand` swaps each one for its alias from the build's identifier
//! obfuscator, so the same `$name` always yields the same alias within one
//! program and never a keyword or a name the source reads.

use std::collections::HashMap;

use crate::{passes::identifiers::IdentifierObfuscator, rng::ShroudRng};

/// Prefix keeping runtime names apart from source names in the alias map.
const NAMESPACE: &str = "vm.";

pub struct Names<'a> {
    identifiers: &'a mut IdentifierObfuscator,
    rng: &'a mut ShroudRng,
    cache: HashMap<String, String>,
}

impl<'a> Names<'a> {
    pub fn new(identifiers: &'a mut IdentifierObfuscator, rng: &'a mut ShroudRng) -> Self {
        Names { identifiers, rng, cache: HashMap::new() }
    }

    pub fn get(&mut self, name: &str) -> String {
        if let Some(alias) = self.cache.get(name) {
            return alias.clone();
        }
        let alias = self.identifiers.alias(&format!("{}{}", NAMESPACE, name), &mut *self.rng);
        self.cache.insert(name.to_string(), alias.clone());
        alias
    }

    pub fn rng(&mut self) -> &mut ShroudRng {
        &mut *self.rng
    }

    /// Replace every `$name` in `template`.
    pub fn expand(&mut self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos + 1..];
            let len = tail.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(tail.len());
            if len == 0 {
                out.push('$');
            } else {
                out.push_str(&self.get(&tail[..len]));
            }
            rest = &tail[len..];
        }
        out.push_str(rest);
        out
    }
}

/// Quoted Lua string literal. Anything outside printable ASCII becomes a
/// three digit decimal escape so a following digit can never extend it.
pub fn lua_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(*b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
    out.push('"');
    out
}

/// Integer literal that every dialect reads back as the same value.
pub fn lua_integer(v: i64) -> String {
    if v == i64::MIN {
        // The positive half does not fit, so the literal would turn float.
        return format!("({} - 1)", i64::MIN + 1);
    }
    v.to_string()
}

/// Float literal that stays a float on Lua 5.3. Non-finite values have no
/// literal form and are written as arithmetic.
pub fn lua_float(v: f64) -> String {
    if v.is_nan() {
        "(0/0)".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "(1/0)".to_string() } else { "(-1/0)".to_string() }
    } else {
        format!("{:?}", v)
    }
}

/// Comma-separated byte list, wrapped every `per_line` values.
pub fn byte_list(bytes: &[u8], per_line: usize) -> String {
    bytes
        .chunks(per_line.max(1))
        .map(|line| line.iter().map(u8::to_string).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join(",\n")
}

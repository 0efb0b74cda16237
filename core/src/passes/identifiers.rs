//! Identifier obfuscator.
//!
//! Hands out aliases for every name the code generator introduces and for
//! declared source locals. Aliases are drawn from the confusable alphabet
//! `l`, `I`, `1` and are checked against Lua keywords, the environment
//! binding and every reserved name (source globals, runtime library names).

use std::collections::{HashMap, HashSet};

use crate::rng::ShroudRng;

pub const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    // Luau soft keywords.
    "continue", "export", "type", "typeof",
];

/// Name of the environment upvalue on Lua 5.2+.
pub const ENV_BINDING: &str = "_ENV";

/// Library globals the generated runtime reads before user code runs.
pub const RUNTIME_GLOBALS: &[&str] = &[
    "_G", "assert", "bit32", "debug", "error", "getfenv", "ipairs", "load", "loadstring", "math",
    "next", "pairs", "pcall", "print", "rawget", "rawset", "select", "setfenv", "setmetatable",
    "getmetatable", "string", "table", "tonumber", "tostring", "unpack", "xpcall", "os", "coroutine",
];

#[derive(Debug, Clone)]
pub struct IdentifierObfuscator {
    enabled: bool,
    aliases: HashMap<String, String>,
    taken: HashSet<String>,
    reserved: HashSet<String>,
    renamed: usize,
}

impl IdentifierObfuscator {
    pub fn new(enabled: bool) -> Self {
        let reserved = LUA_KEYWORDS
            .iter()
            .chain(RUNTIME_GLOBALS)
            .chain(std::iter::once(&ENV_BINDING))
            .map(|s| s.to_string())
            .collect();
        IdentifierObfuscator {
            enabled,
            aliases: HashMap::new(),
            taken: HashSet::new(),
            reserved,
            renamed: 0,
        }
    }

    /// Names that aliases must never shadow, such as globals the program reads.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_protected(name: &str) -> bool {
        name == ENV_BINDING || LUA_KEYWORDS.contains(&name)
    }

    /// Alias for `name`, created on first use. Keywords and `_ENV` map to
    /// themselves. With renaming disabled names stay readable but still get
    /// a prefix so they never shadow a reserved name.
    pub fn alias(&mut self, name: &str, rng: &mut ShroudRng) -> String {
        if Self::is_protected(name) {
            return name.to_string();
        }
        if let Some(alias) = self.aliases.get(name) {
            return alias.clone();
        }
        let alias = if self.enabled {
            self.fresh_alias(rng)
        } else {
            self.readable(name)
        };
        self.taken.insert(alias.clone());
        self.aliases.insert(name.to_string(), alias.clone());
        if self.enabled {
            self.renamed += 1;
        }
        alias
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn renamed(&self) -> usize {
        self.renamed
    }

    fn readable(&self, name: &str) -> String {
        let base: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let mut candidate = format!("shroud_{}", base);
        let mut n = 1;
        while self.taken.contains(&candidate) || self.reserved.contains(&candidate) {
            n += 1;
            candidate = format!("shroud_{}{}", base, n);
        }
        candidate
    }

    fn fresh_alias(&self, rng: &mut ShroudRng) -> String {
        const HEAD: &[u8] = b"lI";
        const TAIL: &[u8] = b"lI1";
        let mut len = 6;
        loop {
            for _ in 0..32 {
                let mut alias = String::with_capacity(len);
                alias.push(*rng.pick(HEAD).unwrap_or(&b'l') as char);
                for _ in 1..len {
                    alias.push(*rng.pick(TAIL).unwrap_or(&b'I') as char);
                }
                if !self.taken.contains(&alias) && !self.reserved.contains(&alias) {
                    return alias;
                }
            }
            // The space at this length is getting crowded.
            len += 1;
        }
    }
}

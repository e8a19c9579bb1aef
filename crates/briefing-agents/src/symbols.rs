use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use briefing_models::{Query, Symbol, SymbolsConfig};
use regex::Regex;

static SUFFIXED_TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{1,6}\.[A-Z]{1,3}\b").expect("valid ticker pattern"));

static BARE_TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{1,5}\b").expect("valid ticker pattern"));

/// Resolves ticker symbols from a query.
///
/// Explicit symbols come first, followed by anything found in the text in
/// order of appearance: exchange-suffixed tickers, bare uppercase tokens and
/// configured company-name aliases. Stop tokens are skipped and duplicates
/// collapse to their first occurrence.
pub struct SymbolExtractor {
    /// Lowercase alias -> symbol.
    aliases: BTreeMap<String, Symbol>,
    stop_tokens: HashSet<String>,
    names: BTreeMap<Symbol, String>,
}

impl SymbolExtractor {
    pub fn new(config: &SymbolsConfig) -> Self {
        let aliases: BTreeMap<String, Symbol> = config
            .aliases
            .iter()
            .filter_map(|(name, ticker)| {
                Symbol::parse(ticker).map(|s| (name.trim().to_ascii_lowercase(), s))
            })
            .filter(|(name, _)| !name.is_empty())
            .collect();

        let mut names = BTreeMap::new();
        for (alias, symbol) in &aliases {
            names
                .entry(symbol.clone())
                .or_insert_with(|| title_case(alias));
        }

        Self {
            aliases,
            stop_tokens: config
                .stop_tokens
                .iter()
                .map(|t| t.trim().to_ascii_uppercase())
                .collect(),
            names,
        }
    }

    pub fn extract(&self, query: &Query) -> Vec<Symbol> {
        let mut resolved: Vec<Symbol> = query
            .symbols
            .iter()
            .filter_map(|raw| Symbol::parse(raw))
            .collect();

        let mut found = self.scan(&query.text);
        found.sort_by_key(|(pos, _)| *pos);
        resolved.extend(found.into_iter().map(|(_, s)| s));

        let mut seen = HashSet::new();
        resolved.retain(|s| seen.insert(s.clone()));
        resolved
    }

    /// Human-readable company name, falling back to the ticker itself.
    pub fn display_name(&self, symbol: &Symbol) -> String {
        self.names
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }

    pub fn display_names<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> BTreeMap<Symbol, String> {
        symbols
            .into_iter()
            .map(|s| (s.clone(), self.display_name(s)))
            .collect()
    }

    /// Candidate symbols in `text` with their byte offsets.
    fn scan(&self, text: &str) -> Vec<(usize, Symbol)> {
        let mut found = Vec::new();
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for m in SUFFIXED_TICKER.find_iter(text) {
            claimed.push((m.start(), m.end()));
            if let Some(symbol) = self.accept_token(m.as_str()) {
                found.push((m.start(), symbol));
            }
        }

        for m in BARE_TICKER.find_iter(text) {
            if claimed.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            if let Some(symbol) = self.accept_token(m.as_str()) {
                found.push((m.start(), symbol));
            }
        }

        // Byte offsets must line up with the ticker matches on `text`
        let lowered = text.to_ascii_lowercase();
        for (alias, symbol) in &self.aliases {
            if let Some(pos) = find_word(&lowered, alias) {
                found.push((pos, symbol.clone()));
            }
        }

        found
    }

    /// An uppercase token that is a known alias (e.g. `TSMC`) resolves to
    /// its ticker; stop tokens are dropped.
    fn accept_token(&self, token: &str) -> Option<Symbol> {
        if self.stop_tokens.contains(token) {
            return None;
        }
        if let Some(symbol) = self.aliases.get(&token.to_ascii_lowercase()) {
            return Some(symbol.clone());
        }
        Symbol::parse(token)
    }
}

/// First offset of `needle` in `haystack` bounded by non-alphanumerics.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

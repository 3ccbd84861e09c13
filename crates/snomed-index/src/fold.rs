//! Term folding and tokenization for text search.
//!
//! Terms run through a tantivy analyzer: split on anything that is not a
//! letter or digit, lowercased, then ASCII-folded except for characters a
//! language marks as "not folded" (for Swedish, `å`, `ä` and `ö` are letters
//! in their own right). The same analyzer runs at index time with the
//! description's language and at query time with the display language.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, SimpleTokenizer, TextAnalyzer, Token, TokenFilter,
    TokenStream, Tokenizer,
};

/// First private-use code point; exempt characters hide here while folding.
const SHIELD_BASE: u32 = 0xE000;

/// Per-language characters excluded from ASCII folding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermFolder {
    not_folded: HashMap<String, String>,
}

impl TermFolder {
    /// A folder that folds everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a folder from `language -> characters` pairs.
    pub fn from_table<I, K, V>(table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut folder = Self::new();
        for (language, chars) in table {
            folder = folder.with_language(language, chars);
        }
        folder
    }

    /// Adds (or replaces) the characters kept unfolded for a language.
    pub fn with_language(mut self, language: impl Into<String>, chars: impl Into<String>) -> Self {
        let chars: String = chars.into().to_lowercase();
        self.not_folded.insert(language.into().to_lowercase(), chars);
        self
    }

    /// Characters kept for a language code; `sv-SE` falls back to `sv`.
    pub fn exemptions(&self, language: &str) -> &str {
        let language = language.to_lowercase();
        if let Some(chars) = self.not_folded.get(language.as_str()) {
            return chars;
        }
        language
            .split(['-', '_'])
            .next()
            .and_then(|primary| self.not_folded.get(primary))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The search analyzer for a language.
    pub fn analyzer(&self, language: &str) -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(LanguageFolding::new(self.exemptions(language)))
            .build()
    }

    /// Splits `text` into folded search tokens.
    pub fn tokens(&self, text: &str, language: &str) -> Vec<String> {
        let mut analyzer = self.analyzer(language);
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

// =============================================================================
// Filters
// =============================================================================

/// ASCII folding that leaves a language's own letters alone.
///
/// Exempt characters are swapped for private-use code points, which
/// [`AsciiFoldingFilter`] passes through, and swapped back afterwards.
#[derive(Clone)]
pub struct LanguageFolding {
    shield: SubstituteChars,
    restore: SubstituteChars,
}

impl LanguageFolding {
    /// Folds everything except the characters in `keep`.
    pub fn new(keep: &str) -> Self {
        let pairs: Vec<(char, char)> = keep
            .chars()
            .filter(|c| !c.is_ascii())
            .enumerate()
            .filter_map(|(i, c)| {
                let hidden = char::from_u32(SHIELD_BASE + i as u32)?;
                Some((c, hidden))
            })
            .collect();
        Self {
            restore: SubstituteChars::new(pairs.iter().map(|&(c, hidden)| (hidden, c)).collect()),
            shield: SubstituteChars::new(pairs),
        }
    }
}

impl TokenFilter for LanguageFolding {
    type Tokenizer<T: Tokenizer> = SubstituteCharsFilter<
        <AsciiFoldingFilter as TokenFilter>::Tokenizer<SubstituteCharsFilter<T>>,
    >;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        let shielded = self.shield.transform(tokenizer);
        self.restore.transform(AsciiFoldingFilter.transform(shielded))
    }
}

/// Replaces single characters in every token.
#[derive(Clone)]
pub struct SubstituteChars {
    pairs: Arc<[(char, char)]>,
}

impl SubstituteChars {
    fn new(pairs: Vec<(char, char)>) -> Self {
        Self {
            pairs: pairs.into(),
        }
    }
}

impl TokenFilter for SubstituteChars {
    type Tokenizer<T: Tokenizer> = SubstituteCharsFilter<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> SubstituteCharsFilter<T> {
        SubstituteCharsFilter {
            tokenizer,
            pairs: self.pairs,
        }
    }
}

#[derive(Clone)]
pub struct SubstituteCharsFilter<T> {
    tokenizer: T,
    pairs: Arc<[(char, char)]>,
}

impl<T: Tokenizer> Tokenizer for SubstituteCharsFilter<T> {
    type TokenStream<'a> = SubstituteCharsStream<'a, T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        SubstituteCharsStream {
            tail: self.tokenizer.token_stream(text),
            pairs: &self.pairs,
        }
    }
}

pub struct SubstituteCharsStream<'a, T> {
    tail: T,
    pairs: &'a [(char, char)],
}

impl<T: TokenStream> TokenStream for SubstituteCharsStream<'_, T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        let pairs = self.pairs;
        if pairs.is_empty() {
            return true;
        }
        let token = self.tail.token_mut();
        let substitute = |c: char| pairs.iter().find(|&&(from, _)| from == c).map(|&(_, to)| to);
        if token.text.chars().any(|c| substitute(c).is_some()) {
            token.text = token
                .text
                .chars()
                .map(|c| substitute(c).unwrap_or(c))
                .collect();
        }
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}

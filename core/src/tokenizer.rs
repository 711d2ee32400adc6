use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // `\w` keeps combining marks and joiners; diacritics and ZWNJ/ZWJ go too.
    static ref PUNCT: Regex = Regex::new(r"[^\w\s]|\p{M}|[\x{200C}\x{200D}]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Left over from `&nbsp;` once punctuation is stripped.
const ENTITY_RESIDUE: &str = "ampnbsp";

/// Turns raw text into normalized terms. Index time and query time must use
/// the same implementation, or lookups miss.
pub trait Tokenizer: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Fold Arabic letter and digit variants onto their Persian forms.
    pub fold_characters: bool,
    pub strip_digits: bool,
    /// Terms shorter than this (in chars) are dropped.
    pub min_term_len: usize,
    pub remove_stopwords: bool,
    pub stem: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { fold_characters: true, strip_digits: true, min_term_len: 2, remove_stopwords: false, stem: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StandardTokenizer {
    config: TokenizerConfig,
}

impl StandardTokenizer {
    pub fn new(config: TokenizerConfig) -> Self { Self { config } }

    pub fn config(&self) -> &TokenizerConfig { &self.config }

    fn normalize_word(&self, word: &str) -> Option<String> {
        let mut w: String = if self.config.fold_characters { word.chars().map(fold_char).collect() } else { word.to_owned() };
        w = PUNCT.replace_all(&w, "").into_owned();
        if w.contains(ENTITY_RESIDUE) {
            w = w.replace(ENTITY_RESIDUE, "");
        }
        if self.config.strip_digits {
            w.retain(|c| !c.is_numeric());
        }
        if w.chars().count() < self.config.min_term_len.max(1) {
            return None;
        }
        if self.config.remove_stopwords && STOPWORDS.contains(w.as_str()) {
            return None;
        }
        if self.config.stem {
            w = STEMMER.stem(&w).into_owned();
        }
        Some(w)
    }
}

impl Tokenizer for StandardTokenizer {
    /// NFKC, lowercase, fold, strip punctuation and digits, then filter by length.
    fn normalize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        normalized.split_whitespace().filter_map(|w| self.normalize_word(w)).collect()
    }
}

fn fold_char(c: char) -> char {
    match c {
        'ك' => 'ک',
        'ى' | 'ي' => 'ی',
        '٠'..='٩' => char::from_u32(c as u32 - '٠' as u32 + '۰' as u32).unwrap_or(c),
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_normalize() {
        let t = StandardTokenizer::default().normalize("Cat, DOG! a bird42");
        assert_eq!(t, vec!["cat", "dog", "bird"]);
    }

    #[test]
    fn folds_arabic_variants() {
        assert_eq!(fold_char('ي'), 'ی');
        assert_eq!(fold_char('٣'), '۳');
        let t = StandardTokenizer::default().normalize("كتاب");
        assert_eq!(t, vec!["کتاب"]);
    }

    #[test]
    fn strips_diacritics_and_joiners() {
        let t = StandardTokenizer::default();
        assert_eq!(t.normalize("کتابِ"), vec!["کتاب"]);
        assert_eq!(t.normalize("می\u{200c}خواهم"), vec!["میخواهم"]);
        assert_eq!(t.normalize("a\u{200d}b"), vec!["ab"]);
    }
}

//! Token segmentation for the lexical signals.
//!
//! Latin words and digits are kept whole; runs of CJK ideographs, kana and
//! hangul are split into overlapping character bigrams, which approximates
//! word segmentation for languages without spaces.

use std::collections::HashSet;

/// Splits raw text into tokens. Implementations must be deterministic.
pub trait Tokenizer: Send + Sync {
    /// Ordered tokens, repeats kept.
    fn tokens(&self, text: &str) -> Vec<String>;

    /// Distinct tokens of `text`.
    fn segment(&self, text: &str) -> HashSet<String> {
        self.tokens(text).into_iter().collect()
    }
}

/// Default tokenizer for mixed Latin/CJK text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MixedScriptTokenizer;

impl Tokenizer for MixedScriptTokenizer {
    fn tokens(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut word = String::new();
        let mut ideographs: Vec<char> = Vec::new();

        for ch in text.chars() {
            if is_cjk(ch) {
                flush_word(&mut word, &mut tokens);
                ideographs.push(ch);
            } else if ch.is_alphanumeric() {
                flush_ideographs(&mut ideographs, &mut tokens);
                word.extend(ch.to_lowercase());
            } else {
                flush_word(&mut word, &mut tokens);
                flush_ideographs(&mut ideographs, &mut tokens);
            }
        }
        flush_word(&mut word, &mut tokens);
        flush_ideographs(&mut ideographs, &mut tokens);

        tokens
    }
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_ideographs(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => tokens.push(run[0].to_string()),
        _ => tokens.extend(run.windows(2).map(|pair| pair.iter().collect::<String>())),
    }
    run.clear();
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3040..=0x30FF      // hiragana, katakana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0x20000..=0x2A6DF  // CJK extension B
    )
}

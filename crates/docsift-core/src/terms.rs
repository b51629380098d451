//! Language-aware term extraction.
//!
//! Turns raw text into the normalized term stream that feeds both the index
//! and the query processor. Latin text is split into words; CJK text has no
//! word boundaries, so each CJK run is expanded into overlapping character
//! n-grams instead.
//!
//! # Algorithm
//!
//! 1. Lower-case the input.
//! 2. Replace everything that is not a CJK ideograph, an ASCII letter, an
//!    ASCII digit, or whitespace with a space.
//! 3. Walk the result as runs of one character class:
//!    - letter runs of length ≥ 2 that are not stop words become words,
//!    - digit runs not glued to a letter are kept verbatim,
//!    - CJK runs emit unigrams and bigrams (stop-word filtered), trigrams
//!      (unfiltered), and the whole run when it is 4–8 characters long.
//!
//! # Example
//!
//! ```rust
//! use docsift_core::terms::extract_terms;
//!
//! let terms = extract_terms("标准流程 for the Q3 2024 audit");
//! assert!(terms.contains("标准"));
//! assert!(terms.contains("标准流程"));
//! assert!(terms.contains("audit"));
//! assert!(terms.contains("2024"));
//! assert!(!terms.contains("the"));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

/// Shortest CJK run emitted verbatim as a compound term.
const CJK_COMPOUND_MIN: usize = 4;
/// Longest CJK run emitted verbatim as a compound term.
const CJK_COMPOUND_MAX: usize = 8;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "our", "such",
        "that", "the", "their", "then", "there", "these", "they", "this", "to", "was", "we",
        "were", "will", "with", "you", "your",
        // Chinese single characters
        "的", "了", "是", "在", "和", "与", "或", "及", "等", "对", "为", "以", "于", "之",
        "其", "而", "也", "就", "都", "这", "那", "有", "我", "你", "他", "她", "它", "个",
        "着", "被", "把", "从", "向", "让", "给",
        // Chinese function bigrams
        "我们", "你们", "他们", "一个", "可以", "进行", "以及", "通过", "如果", "因为",
        "所以", "但是", "这个", "那个", "或者", "并且", "已经", "没有",
    ]
    .into_iter()
    .collect()
});

/// Whether `c` is a CJK unified ideograph in the basic block.
///
/// The token estimator counts exactly this range, so chunk-size decisions
/// stay comparable across implementations.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Whether `term` is filtered as a stop word.
pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(term)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    Letter,
    Digit,
    Cjk,
    Space,
}

fn classify(c: char) -> Class {
    if c.is_ascii_lowercase() {
        Class::Letter
    } else if c.is_ascii_digit() {
        Class::Digit
    } else if is_cjk(c) {
        Class::Cjk
    } else {
        Class::Space
    }
}

/// Lower-case and strip everything outside CJK/letters/digits/whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match classify(c) {
            Class::Space => ' ',
            _ => c,
        })
        .collect()
}

/// The ordered, non-deduplicated term stream for `text`.
///
/// Frequency counting and phrase sequences are computed over this stream;
/// [`extract_terms`] is its deduplicated set.
pub fn term_stream(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let class = classify(chars[i]);
        let start = i;
        while i < chars.len() && classify(chars[i]) == class {
            i += 1;
        }
        let run = &chars[start..i];
        match class {
            Class::Letter => {
                if run.len() >= 2 {
                    let word: String = run.iter().collect();
                    if !is_stop_word(&word) {
                        out.push(word);
                    }
                }
            }
            Class::Digit => {
                let glued_before = start > 0 && classify(chars[start - 1]) == Class::Letter;
                let glued_after = i < chars.len() && classify(chars[i]) == Class::Letter;
                if !glued_before && !glued_after {
                    out.push(run.iter().collect());
                }
            }
            Class::Cjk => push_cjk_ngrams(run, &mut out),
            Class::Space => {}
        }
    }
    out
}

fn push_cjk_ngrams(run: &[char], out: &mut Vec<String>) {
    for width in 1..=3 {
        if run.len() < width {
            break;
        }
        for window in run.windows(width) {
            let gram: String = window.iter().collect();
            // Trigrams skip the stop list: three-character technical
            // compounds are common and filtering them loses recall.
            if width == 3 || !is_stop_word(&gram) {
                out.push(gram);
            }
        }
    }
    if (CJK_COMPOUND_MIN..=CJK_COMPOUND_MAX).contains(&run.len()) {
        out.push(run.iter().collect());
    }
}

/// Deduplicated set of terms in `text`.
pub fn extract_terms(text: &str) -> BTreeSet<String> {
    term_stream(text).into_iter().collect()
}

/// Count occurrences over a (non-deduplicated) term stream.
pub fn term_frequencies<S: AsRef<str>>(terms: &[S]) -> BTreeMap<String, u32> {
    let mut freqs = BTreeMap::new();
    for t in terms {
        *freqs.entry(t.as_ref().to_string()).or_insert(0) += 1;
    }
    freqs
}

/// Positions of each term in a term stream.
pub fn term_positions<S: AsRef<str>>(terms: &[S]) -> BTreeMap<String, Vec<u32>> {
    let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (i, t) in terms.iter().enumerate() {
        positions
            .entry(t.as_ref().to_string())
            .or_default()
            .push(i as u32);
    }
    positions
}

//! Token-budgeted, overlapping text segmenter.
//!
//! Splits document text into [`Chunk`]s whose estimated token counts stay
//! within `[min_tokens, max_tokens]`, carrying a tail of each chunk into the
//! head of the next so context is not lost across a boundary.
//!
//! Chunks are byte spans of the source: every chunk's `text` is exactly
//! `source[start_offset..end_offset]`, offsets strictly increase, and adjacent
//! chunks overlap by at most the carried tail.
//!
//! # Algorithm
//!
//! 1. Split the text into paragraphs on blank lines.
//! 2. Paragraphs above `max_tokens` are replaced by their sentences; a single
//!    sentence above `max_tokens` is hard-split at a char boundary.
//! 3. Accumulate units into a running span until the next unit would push the
//!    estimate past `max_tokens`. If the span is still under `min_tokens`,
//!    the offending paragraph is broken into sentences first.
//! 4. Close the span as a chunk and seed the next one with trailing sentences
//!    worth at most `overlap_ratio × tokens`.
//!
//! # Example
//!
//! ```rust
//! use docsift_core::chunk::{segment, ChunkingConfig};
//!
//! let chunks = segment("doc-123", "Hello world.\n\nSecond paragraph.", &ChunkingConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! assert_eq!(chunks[0].start_offset, 0);
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chunk;
use crate::terms::{is_cjk, term_frequencies, term_stream};

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';', '\n'];

/// Upper bound on `overlap_ratio`.
const MAX_OVERLAP_RATIO: f64 = 0.5;

/// Chunk-size policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunks below this size absorb sentences of the next paragraph.
    pub min_tokens: u64,
    /// Hard upper bound on a chunk's estimated token count.
    pub max_tokens: u64,
    /// Share of a closed chunk carried into the next one.
    pub overlap_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: 400,
            max_tokens: 800,
            overlap_ratio: 0.15,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfiguration(
                "chunking.max_tokens must be > 0".into(),
            ));
        }
        if self.min_tokens > self.max_tokens {
            return Err(Error::InvalidConfiguration(format!(
                "chunking.min_tokens ({}) must be <= max_tokens ({})",
                self.min_tokens, self.max_tokens
            )));
        }
        if !(0.0..=MAX_OVERLAP_RATIO).contains(&self.overlap_ratio) {
            return Err(Error::InvalidConfiguration(format!(
                "chunking.overlap_ratio must be in [0.0, {MAX_OVERLAP_RATIO}]"
            )));
        }
        Ok(())
    }
}

/// Estimated token count: `ceil(cjk / 1.5 + other / 4)`.
///
/// A heuristic, not a tokenizer. Chunk-size decisions depend on it being
/// reproduced exactly.
pub fn estimate_tokens(text: &str) -> u64 {
    let (cjk, other) = text.chars().fold((0u64, 0u64), |(c, o), ch| {
        if is_cjk(ch) {
            (c + 1, o)
        } else {
            (c, o + 1)
        }
    });
    tokens_for(cjk, other)
}

fn tokens_for(cjk: u64, other: u64) -> u64 {
    (cjk as f64 / 1.5 + other as f64 / 4.0).ceil() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Paragraph,
    Sentence,
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    kind: UnitKind,
}

/// Segment `text` into chunks owned by `document_id`.
///
/// Whitespace-only text yields no chunks. Chunk indices are contiguous from 0.
pub fn segment(document_id: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let max = config.max_tokens.max(1);
    let mut units: VecDeque<Unit> = VecDeque::new();
    for (start, end) in paragraph_spans(text) {
        if estimate_tokens(&text[start..end]) > max {
            units.extend(sentence_units(text, start, end, max));
        } else {
            units.push_back(Unit {
                start,
                end,
                kind: UnitKind::Paragraph,
            });
        }
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    while let Some(unit) = units.pop_front() {
        let Some((cur_start, cur_end)) = current else {
            current = Some((unit.start, unit.end));
            continue;
        };
        if estimate_tokens(&text[cur_start..unit.end]) <= max {
            current = Some((cur_start, unit.end));
            continue;
        }

        let cur_tokens = estimate_tokens(&text[cur_start..cur_end]);
        if unit.kind == UnitKind::Paragraph && cur_tokens < config.min_tokens {
            for sentence in sentence_units(text, unit.start, unit.end, max).into_iter().rev() {
                units.push_front(sentence);
            }
            continue;
        }

        spans.push((cur_start, cur_end));
        current = match overlap_start(text, cur_start, cur_end, cur_tokens, config.overlap_ratio) {
            Some(seed) if estimate_tokens(&text[seed..unit.end]) <= max => Some((seed, unit.end)),
            _ => Some((unit.start, unit.end)),
        };
    }
    if let Some(span) = current {
        spans.push(span);
    }

    let has_pages = text.contains('\u{c}');
    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let page = has_pages.then(|| 1 + text[..start].matches('\u{c}').count() as u32);
            make_chunk(document_id, index, text, start, end, page)
        })
        .collect()
}

/// Trim `text[start..end]`, returning the narrowed span or `None` if blank.
fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

/// Blank-line-delimited paragraph spans, trimmed.
fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = para_start.take() {
                spans.extend(trim_span(text, s, line_start));
            }
        } else if para_start.is_none() {
            para_start = Some(line_start);
        }
    }
    if let Some(s) = para_start {
        spans.extend(trim_span(text, s, text.len()));
    }
    spans
}

/// Sentence spans within `text[start..end]`, trimmed. Terminators stay with
/// the sentence they close.
fn sentence_spans(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut sentence_start = start;
    for (i, c) in text[start..end].char_indices() {
        if SENTENCE_TERMINATORS.contains(&c) {
            let sentence_end = start + i + c.len_utf8();
            spans.extend(trim_span(text, sentence_start, sentence_end));
            sentence_start = sentence_end;
        }
    }
    if sentence_start < end {
        spans.extend(trim_span(text, sentence_start, end));
    }
    spans
}

fn sentence_units(text: &str, start: usize, end: usize, max: u64) -> Vec<Unit> {
    let mut units = Vec::new();
    for (s, e) in sentence_spans(text, start, end) {
        if estimate_tokens(&text[s..e]) > max {
            units.extend(hard_split(text, s, e, max).into_iter().map(|(s, e)| Unit {
                start: s,
                end: e,
                kind: UnitKind::Sentence,
            }));
        } else {
            units.push(Unit {
                start: s,
                end: e,
                kind: UnitKind::Sentence,
            });
        }
    }
    units
}

/// Cut `text[start..end]` into pieces of at most `max` estimated tokens.
fn hard_split(text: &str, start: usize, end: usize, max: u64) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut piece_start = start;
    let (mut cjk, mut other) = (0u64, 0u64);
    for (i, c) in text[start..end].char_indices() {
        let pos = start + i;
        let (next_cjk, next_other) = if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        };
        if tokens_for(next_cjk, next_other) > max && pos > piece_start {
            pieces.push((piece_start, pos));
            piece_start = pos;
            (cjk, other) = if is_cjk(c) { (1, 0) } else { (0, 1) };
        } else {
            (cjk, other) = (next_cjk, next_other);
        }
    }
    pieces.push((piece_start, end));
    pieces
        .into_iter()
        .filter_map(|(s, e)| trim_span(text, s, e))
        .collect()
}

/// Start offset of the trailing sentences carried into the next chunk.
///
/// `None` when nothing fits the budget or the whole chunk would be carried.
fn overlap_start(text: &str, start: usize, end: usize, tokens: u64, ratio: f64) -> Option<usize> {
    let budget = (ratio * tokens as f64).floor() as u64;
    if budget == 0 {
        return None;
    }
    let sentences = sentence_spans(text, start, end);
    let mut seed = None;
    for &(s, _) in sentences.iter().skip(1).rev() {
        if estimate_tokens(&text[s..end]) > budget {
            break;
        }
        seed = Some(s);
    }
    seed
}

fn ends_with_terminator(line: &str) -> bool {
    line.chars()
        .last()
        .is_some_and(|c| SENTENCE_TERMINATORS.contains(&c))
}

/// Short first line, at most three lines, no closing terminator.
fn detect_title(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let first = lines.next()?.trim();
    let line_count = 1 + lines.count();
    let len = first.chars().count();
    if len > 2 && len < 100 && line_count <= 3 && !ends_with_terminator(first) {
        Some(first.to_string())
    } else {
        None
    }
}

/// A single line carrying a pipe column separator.
fn detect_table_header(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.contains('\n') && trimmed.contains('|')
}

/// Heuristic quality in `[0, 1]`: rewards 100–2000 chars and 10–100 chars
/// per sentence.
pub fn quality_score(content: &str) -> f64 {
    let len = content.chars().count() as f64;
    if len == 0.0 {
        return 0.0;
    }
    let length_score = if len < 100.0 {
        len / 100.0
    } else if len > 2000.0 {
        2000.0 / len
    } else {
        1.0
    };
    let sentences = sentence_spans(content, 0, content.len()).len().max(1) as f64;
    let avg_sentence = len / sentences;
    let sentence_score = if avg_sentence < 10.0 {
        avg_sentence / 10.0
    } else if avg_sentence > 100.0 {
        100.0 / avg_sentence
    } else {
        1.0
    };
    (0.5 * length_score + 0.5 * sentence_score).clamp(0.0, 1.0)
}

/// Deterministic chunk id derived from the document id and index.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{index}").as_bytes(),
    )
    .to_string()
}

fn make_chunk(
    document_id: &str,
    index: usize,
    source: &str,
    start: usize,
    end: usize,
    page_number: Option<u32>,
) -> Chunk {
    let text = &source[start..end];
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let content = text.trim();
    let section_title = detect_title(content);
    let stream = term_stream(content);

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        token_count: estimate_tokens(text),
        start_offset: start,
        end_offset: end,
        is_title: section_title.is_some(),
        is_table_header: detect_table_header(content),
        section_title,
        page_number,
        term_frequencies: term_frequencies(&stream),
        hash,
        quality: quality_score(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ChunkingConfig {
        ChunkingConfig {
            min_tokens: 5,
            max_tokens: 12,
            overlap_ratio: 0.3,
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // 3 CJK chars = 2 tokens
        assert_eq!(estimate_tokens("标准化"), 2);
        // 4 / 1.5 + 1 / 4 = 2.92
        assert_eq!(estimate_tokens("标准流程。"), 3);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = segment("doc1", "Hello, world!", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].end_offset, 13);
    }

    #[test]
    fn test_empty_text() {
        assert!(segment("doc1", "", &ChunkingConfig::default()).is_empty());
        assert!(segment("doc1", " \n\n \t", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_text_matches_offsets() {
        let text = "  Intro line.\n\nFirst paragraph has words.\n\nSecond one too.  ";
        let chunks = segment("doc1", text, &small());
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(c.text, &text[c.start_offset..c.end_offset]);
        }
    }

    #[test]
    fn test_offsets_monotonic_and_cover() {
        let text = (0..40)
            .map(|i| format!("Sentence number {i} talks about budgets."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = segment("doc1", &text, &small());
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].end_offset > pair[0].end_offset);
            // no gaps beyond whitespace
            assert!(text[pair[0].end_offset..pair[1].start_offset.max(pair[0].end_offset)]
                .trim()
                .is_empty());
        }
    }

    #[test]
    fn test_chunks_respect_max_tokens() {
        let text = "标准流程。".repeat(600);
        let config = ChunkingConfig::default();
        let chunks = segment("doc1", &text, &config);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.token_count <= config.max_tokens, "chunk too big: {}", c.token_count);
        }
    }

    #[test]
    fn test_overlap_carried() {
        let text = "标准流程。".repeat(600);
        let chunks = segment("doc1", &text, &ChunkingConfig::default());
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_offset < pair[0].end_offset,
                "expected overlapping adjacent chunks"
            );
            let overlap = estimate_tokens(&text[pair[1].start_offset..pair[0].end_offset]);
            assert!(overlap as f64 <= 0.15 * pair[0].token_count as f64);
        }
    }

    #[test]
    fn test_zero_overlap_ratio() {
        let config = ChunkingConfig {
            overlap_ratio: 0.0,
            ..small()
        };
        let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta.\n\nIota kappa lambda mu.";
        let chunks = segment("doc1", text, &config);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset >= pair[0].end_offset);
        }
    }

    #[test]
    fn test_hard_split_long_sentence() {
        let text = "x".repeat(500);
        let config = ChunkingConfig {
            min_tokens: 10,
            max_tokens: 20,
            overlap_ratio: 0.0,
        };
        let chunks = segment("doc1", &text, &config);
        assert!(chunks.len() >= 6);
        for c in &chunks {
            assert!(c.token_count <= 20);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = segment("doc1", text, &small());
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_title_detection() {
        let chunks = segment("doc1", "Expense Policy\nApplies to all staff", &ChunkingConfig::default());
        assert!(chunks[0].is_title);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Expense Policy"));

        let chunks = segment("doc1", "This is a sentence.", &ChunkingConfig::default());
        assert!(!chunks[0].is_title);
    }

    #[test]
    fn test_table_header_detection() {
        let chunks = segment("doc1", "name | amount | date", &ChunkingConfig::default());
        assert!(chunks[0].is_table_header);

        let chunks = segment("doc1", "a | b\nc | d", &ChunkingConfig::default());
        assert!(!chunks[0].is_table_header);
    }

    #[test]
    fn test_page_numbers_from_form_feeds() {
        let config = ChunkingConfig {
            min_tokens: 1,
            max_tokens: 6,
            overlap_ratio: 0.0,
        };
        let text = "First page text here.\n\u{c}\nSecond page text here.";
        let chunks = segment("doc1", text, &config);
        assert_eq!(chunks.first().unwrap().page_number, Some(1));
        assert_eq!(chunks.last().unwrap().page_number, Some(2));

        let chunks = segment("doc1", "No pages.", &config);
        assert_eq!(chunks[0].page_number, None);
    }

    #[test]
    fn test_term_frequencies_populated() {
        let chunks = segment("doc1", "合同审批。合同归档。", &ChunkingConfig::default());
        assert_eq!(chunks[0].term_frequencies.get("合同"), Some(&2));
    }

    #[test]
    fn test_quality_score_range() {
        assert_eq!(quality_score(""), 0.0);
        let medium = "This sentence is of a perfectly reasonable length. ".repeat(5);
        assert!((quality_score(&medium) - 1.0).abs() < 1e-9);
        assert!(quality_score("tiny") < 0.5);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = segment("doc1", text, &small());
        let c2 = segment("doc1", text, &small());
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_validate() {
        assert!(ChunkingConfig::default().validate().is_ok());
        let bad = ChunkingConfig {
            min_tokens: 900,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfiguration(_))));
        let bad = ChunkingConfig {
            max_tokens: 0,
            min_tokens: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = ChunkingConfig {
            overlap_ratio: 0.9,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}

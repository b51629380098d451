//! Query normalization, synonym expansion, and phrase detection.
//!
//! A raw query string becomes a [`ProcessedQuery`]:
//!
//! - `terms`: the extracted terms of the query,
//! - `expanded_terms`: synonym-group members of any query term that is a key
//!   in the [`SynonymMap`], minus terms already present,
//! - `phrases`: the term sequence of each double-quoted substring that yields
//!   more than one term.
//!
//! Expansion only adds; the original terms are always kept. Phrases are
//! carried for callers but do not filter matches.

use std::collections::{BTreeMap, BTreeSet};

use crate::terms::{extract_terms, term_stream};

/// Built-in business-domain synonym groups.
const DEFAULT_GROUPS: &[&[&str]] = &[
    &["合同", "协议", "契约"],
    &["员工", "职员", "雇员"],
    &["客户", "顾客"],
    &["发票", "票据"],
    &["薪资", "工资", "薪酬"],
    &["contract", "agreement"],
    &["employee", "staff", "personnel"],
    &["invoice", "bill"],
    &["revenue", "income"],
    &["customer", "client"],
];

/// Term → synonym group lookup.
#[derive(Debug, Clone)]
pub struct SynonymMap {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl Default for SynonymMap {
    fn default() -> Self {
        let mut map = Self::empty();
        for group in DEFAULT_GROUPS {
            map.add_group(group.iter().copied());
        }
        map
    }
}

impl SynonymMap {
    /// A map with no groups; expansion becomes a no-op.
    pub fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    /// Register a group. Every member becomes a key mapping to the others.
    /// Members are normalized to lower case.
    pub fn add_group<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members: BTreeSet<String> = members
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        for member in &members {
            self.groups
                .entry(member.clone())
                .or_default()
                .extend(members.iter().filter(|m| *m != member).cloned());
        }
    }

    /// Synonyms of `term`, excluding `term` itself.
    pub fn synonyms(&self, term: &str) -> impl Iterator<Item = &str> {
        self.groups
            .get(term)
            .into_iter()
            .flat_map(|group| group.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Output of [`QueryProcessor::process`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedQuery {
    pub terms: Vec<String>,
    pub expanded_terms: Vec<String>,
    pub phrases: Vec<Vec<String>>,
}

impl ProcessedQuery {
    /// Original terms followed by expansions, deduplicated.
    pub fn all_terms(&self) -> Vec<String> {
        let mut out = self.terms.clone();
        for t in &self.expanded_terms {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.expanded_terms.is_empty()
    }
}

/// Normalizes query strings into scorable term sets.
#[derive(Debug, Clone, Default)]
pub struct QueryProcessor {
    synonyms: SynonymMap,
}

impl QueryProcessor {
    pub fn new(synonyms: SynonymMap) -> Self {
        Self { synonyms }
    }

    pub fn synonyms(&self) -> &SynonymMap {
        &self.synonyms
    }

    pub fn process(&self, query: &str) -> ProcessedQuery {
        let terms: Vec<String> = extract_terms(query).into_iter().collect();

        let mut expanded: BTreeSet<String> = BTreeSet::new();
        for term in &terms {
            expanded.extend(self.synonyms.synonyms(term).map(str::to_string));
        }
        let expanded_terms = expanded
            .into_iter()
            .filter(|t| !terms.contains(t))
            .collect();

        let phrases = quoted_spans(query)
            .into_iter()
            .map(term_stream)
            .filter(|seq| seq.len() > 1)
            .collect();

        ProcessedQuery {
            terms,
            expanded_terms,
            phrases,
        }
    }
}

/// Substrings enclosed by ASCII `"` or CJK `“ ”` quotes. An unmatched
/// opening quote is ignored.
fn quoted_spans(query: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, char)> = None;
    for (i, c) in query.char_indices() {
        match (open, c) {
            (None, '"') => open = Some((i + 1, '"')),
            (None, '“') => open = Some((i + c.len_utf8(), '”')),
            (Some((start, close)), c) if c == close => {
                spans.push(&query[start..i]);
                open = None;
            }
            _ => {}
        }
    }
    spans
}

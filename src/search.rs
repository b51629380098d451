//! `sift search` and `sift context`.
//!
//! Both commands load the index, run a query through the engine, and print
//! to stdout. `--json` emits the full hit list (document, chunk, score, and
//! explanation when requested) for scripting.

use anyhow::Result;

use docsift_core::engine::assemble_context;
use docsift_core::search::{ScoreExplanation, SearchHit, SearchOptions, TermOrigin};

use crate::config::Config;
use crate::snapshot::open_engine;

/// Per-invocation overrides of the `[search]` config section.
#[derive(Debug, Default, Clone)]
pub struct SearchOverrides {
    pub top_k: Option<usize>,
    pub top_n: Option<usize>,
    pub min_score: Option<f64>,
    pub flat: bool,
    pub prf: bool,
    pub explain: bool,
}

impl SearchOverrides {
    pub fn apply(&self, base: &SearchOptions) -> SearchOptions {
        let mut options = base.clone();
        if let Some(k) = self.top_k {
            options.top_k = k;
        }
        if let Some(n) = self.top_n {
            options.top_n = n;
        }
        if let Some(s) = self.min_score {
            options.min_score = s;
        }
        if self.flat {
            options.use_hierarchical_search = false;
        }
        if self.prf {
            options.use_prf = true;
        }
        if self.explain {
            options.explain = true;
        }
        options
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    overrides: &SearchOverrides,
    json: bool,
) -> Result<()> {
    let options = overrides.apply(&config.search);
    let engine = open_engine(config).await?;
    let hits = engine.search(query, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    let title = hit.document.title.as_deref().unwrap_or("(untitled)");
    println!(
        "{}. [{:.2}] {} / {}",
        rank, hit.score, hit.document.name, title
    );
    if let Some(section) = &hit.chunk.section_title {
        println!("    section: {}", section);
    }
    println!("    chunk: {} ({} tokens)", hit.chunk.chunk_index, hit.chunk.token_count);
    println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 200));
    println!("    id: {}", hit.document.id);
    if let Some(explanation) = &hit.explanation {
        print_explanation(explanation);
    }
    println!();
}

fn print_explanation(e: &ScoreExplanation) {
    print!("    explain: {:?}, {} candidate documents", e.mode, e.candidate_documents);
    match e.document_score {
        Some(s) => println!(", document score {:.3}", s),
        None => println!(),
    }
    for t in &e.terms {
        let origin = match t.origin {
            TermOrigin::Query => "query",
            TermOrigin::Synonym => "synonym",
            TermOrigin::Feedback => "feedback",
        };
        println!(
            "      {:<16} {:<8} tf={} df={} idf={:.3} w={:.2} => {:.3}",
            t.term, origin, t.tf, t.df, t.idf, t.field_weight, t.contribution
        );
    }
    if !e.prf_terms.is_empty() {
        println!("      feedback terms: {}", e.prf_terms.join(", "));
    }
}

/// First `max_chars` characters on one line.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

pub async fn run_context(config: &Config, query: &str, budget: u64) -> Result<()> {
    let engine = open_engine(config).await?;
    let hits = engine.search(query, &config.search).await?;
    let context = assemble_context(&hits, budget);
    if context.is_empty() {
        eprintln!("No context within budget.");
    } else {
        println!("{}", context);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let base = SearchOptions::default();
        let opts = SearchOverrides {
            top_n: Some(2),
            flat: true,
            prf: true,
            ..Default::default()
        }
        .apply(&base);
        assert_eq!(opts.top_n, 2);
        assert_eq!(opts.top_k, base.top_k);
        assert!(!opts.use_hierarchical_search);
        assert!(opts.use_prf);
        assert!(!opts.explain);
    }

    #[test]
    fn test_excerpt_truncates() {
        assert_eq!(excerpt("a\n b   c", 10), "a b c");
        assert_eq!(excerpt("报销流程说明", 4), "报销流程…");
    }
}

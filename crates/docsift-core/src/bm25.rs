//! BM25 Okapi scoring.
//!
//! A pure function over the statistics of one (term, unit) pair. The same
//! scorer serves both tiers: documents (coarse stage) and chunks (fine
//! stage); only the statistics fed in differ.
//!
//! ```text
//! idf   = ln((N - df + 0.5) / (df + 0.5))
//! tf'   = tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len))
//! score = idf * tf' * w
//! ```
//!
//! `idf` goes negative for terms in more than half the units. That is left
//! as is; it is not clamped.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Chunk, FieldWeights};

/// BM25 tuning parameters and field weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Length normalization strength, `0.0..=1.0`.
    pub b: f64,
    pub title_weight: f64,
    pub content_weight: f64,
    pub table_header_weight: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            title_weight: 2.0,
            content_weight: 1.0,
            table_header_weight: 1.5,
        }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(Error::InvalidConfiguration("bm25.k1 must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::InvalidConfiguration(
                "bm25.b must be in [0.0, 1.0]".into(),
            ));
        }
        for (name, w) in [
            ("title_weight", self.title_weight),
            ("content_weight", self.content_weight),
            ("table_header_weight", self.table_header_weight),
        ] {
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "bm25.{name} must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// Field weights recorded on postings of `chunk`.
    ///
    /// Fields that do not apply fall back to the content weight so that
    /// [`FieldWeights::effective`] resolves to
    /// `max(content, title if title, table_header if table header)`.
    pub fn field_weights_for(&self, chunk: &Chunk) -> FieldWeights {
        FieldWeights {
            title: if chunk.is_title {
                self.title_weight
            } else {
                self.content_weight
            },
            content: self.content_weight,
            table_header: if chunk.is_table_header {
                self.table_header_weight
            } else {
                self.content_weight
            },
        }
    }
}

/// Inputs for scoring one term against one unit.
#[derive(Debug, Clone, Copy)]
pub struct TermStats {
    /// Term frequency in the unit.
    pub tf: f64,
    /// Unit length in tokens.
    pub length: f64,
    /// Average unit length in this tier.
    pub avg_length: f64,
    /// Units containing the term.
    pub df: f64,
    /// Total units in this tier.
    pub n: f64,
    /// Field weight multiplier.
    pub weight: f64,
}

/// Inverse document frequency. Negative when `df > n / 2`.
pub fn idf(df: f64, n: f64) -> f64 {
    ((n - df + 0.5) / (df + 0.5)).ln()
}

/// Saturated, length-normalized term frequency.
pub fn tf_component(tf: f64, length: f64, avg_length: f64, k1: f64, b: f64) -> f64 {
    // An empty tier has no meaningful average; treat every unit as average.
    let ratio = if avg_length > 0.0 {
        length / avg_length
    } else {
        1.0
    };
    tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * ratio))
}

/// BM25 contribution of one term to one unit. Zero when `tf == 0`.
pub fn score(stats: &TermStats, params: &Bm25Params) -> f64 {
    if stats.tf <= 0.0 {
        return 0.0;
    }
    idf(stats.df, stats.n)
        * tf_component(stats.tf, stats.length, stats.avg_length, params.k1, params.b)
        * stats.weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{segment, ChunkingConfig};

    fn base() -> TermStats {
        TermStats {
            tf: 2.0,
            length: 100.0,
            avg_length: 100.0,
            df: 2.0,
            n: 20.0,
            weight: 1.0,
        }
    }

    #[test]
    fn test_known_value() {
        let p = Bm25Params::default();
        let s = score(&base(), &p);
        let expected_idf = (18.5f64 / 2.5).ln();
        let expected_tf = 2.0 * 2.2 / (2.0 + 1.2);
        assert!((s - expected_idf * expected_tf).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_in_tf() {
        let p = Bm25Params::default();
        let mut prev = f64::NEG_INFINITY;
        for tf in 1..50 {
            let s = score(
                &TermStats {
                    tf: tf as f64,
                    ..base()
                },
                &p,
            );
            assert!(s >= prev, "score decreased at tf={tf}");
            prev = s;
        }
    }

    #[test]
    fn test_decreasing_in_df() {
        let p = Bm25Params::default();
        let mut prev = f64::INFINITY;
        for df in 1..20 {
            let s = score(
                &TermStats {
                    df: df as f64,
                    ..base()
                },
                &p,
            );
            assert!(s < prev, "score did not decrease at df={df}");
            prev = s;
        }
    }

    #[test]
    fn test_negative_idf_not_clamped() {
        assert!(idf(15.0, 20.0) < 0.0);
        let s = score(
            &TermStats {
                df: 15.0,
                ..base()
            },
            &Bm25Params::default(),
        );
        assert!(s < 0.0);
    }

    #[test]
    fn test_absent_term_is_zero() {
        let s = score(&TermStats { tf: 0.0, ..base() }, &Bm25Params::default());
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_field_weight_scales() {
        let p = Bm25Params::default();
        let plain = score(&base(), &p);
        let titled = score(
            &TermStats {
                weight: 2.0,
                ..base()
            },
            &p,
        );
        assert!((titled - 2.0 * plain).abs() < 1e-12);
    }

    const WIDE_HEADER: &str = "employee name | claim amount | submission date | approving manager | cost center | settlement currency";

    fn only_chunk(text: &str) -> Chunk {
        let mut chunks = segment("d1", text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        chunks.remove(0)
    }

    #[test]
    fn test_table_header_weight() {
        let chunk = only_chunk(WIDE_HEADER);
        assert!(chunk.is_table_header);
        assert!(!chunk.is_title);
        let weights = Bm25Params::default().field_weights_for(&chunk);
        assert_eq!(weights.effective(), 1.5);
    }

    #[test]
    fn test_title_and_table_header_takes_max() {
        let chunk = only_chunk("name | amount | date");
        assert!(chunk.is_table_header);
        assert!(chunk.is_title);
        assert_eq!(Bm25Params::default().field_weights_for(&chunk).effective(), 2.0);

        let heavy_header = Bm25Params {
            table_header_weight: 3.0,
            ..Default::default()
        };
        assert_eq!(heavy_header.field_weights_for(&chunk).effective(), 3.0);
    }

    #[test]
    fn test_plain_content_weight() {
        let chunk = only_chunk(
            "Claims are reviewed weekly.\nLate claims need a manager sign-off.\nReceipts are mandatory.\nKeep copies.",
        );
        assert!(!chunk.is_title && !chunk.is_table_header);
        assert_eq!(Bm25Params::default().field_weights_for(&chunk).effective(), 1.0);
    }

    #[test]
    fn test_longer_units_score_lower() {
        let p = Bm25Params::default();
        let short = score(&TermStats { length: 50.0, ..base() }, &p);
        let long = score(&TermStats { length: 400.0, ..base() }, &p);
        assert!(short > long);
    }

    #[test]
    fn test_zero_avg_length_is_finite() {
        let s = score(
            &TermStats {
                avg_length: 0.0,
                ..base()
            },
            &Bm25Params::default(),
        );
        assert!(s.is_finite());
    }

    #[test]
    fn test_validate() {
        assert!(Bm25Params::default().validate().is_ok());
        assert!(Bm25Params { b: 1.5, ..Default::default() }.validate().is_err());
        assert!(Bm25Params { k1: -1.0, ..Default::default() }.validate().is_err());
        assert!(Bm25Params { title_weight: 0.0, ..Default::default() }.validate().is_err());
    }
}

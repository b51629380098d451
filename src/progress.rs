//! Ingest progress on stderr, so stdout stays parseable for scripts.

use std::io::Write;

use clap::ValueEnum;
use serde::Serialize;

/// One step of `sift ingest`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum IngestEvent<'a> {
    /// Walking `path` for matching files.
    Discovering { path: &'a str },
    /// `n` of `total` files processed; `file` is the latest.
    Ingesting { file: &'a str, n: u64, total: u64 },
}

impl IngestEvent<'_> {
    fn human(&self) -> String {
        match self {
            IngestEvent::Discovering { path } => format!("ingest  discovering {path}"),
            IngestEvent::Ingesting { file, n, total } => format!("ingest  {n}/{total}  {file}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    #[value(alias = "none")]
    Off,
    Human,
    /// One JSON object per line.
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// The stderr line for `event`, or `None` when progress is off.
    pub fn render(&self, event: &IngestEvent<'_>) -> Option<String> {
        match self {
            ProgressMode::Off => None,
            ProgressMode::Human => Some(event.human()),
            ProgressMode::Json => {
                #[derive(Serialize)]
                struct Line<'e, 'a> {
                    event: &'static str,
                    #[serde(flatten)]
                    inner: &'e IngestEvent<'a>,
                }
                serde_json::to_string(&Line {
                    event: "progress",
                    inner: event,
                })
                .ok()
            }
        }
    }

    pub fn report(&self, event: IngestEvent<'_>) {
        if let Some(line) = self.render(&event) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{line}");
            let _ = err.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_carry_phase() {
        let event = IngestEvent::Ingesting {
            file: "docs/a.md",
            n: 2,
            total: 5,
        };
        let line = ProgressMode::Json.render(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "progress");
        assert_eq!(value["phase"], "ingesting");
        assert_eq!(value["n"], 2);
        assert_eq!(value["file"], "docs/a.md");
    }

    #[test]
    fn human_and_off() {
        let event = IngestEvent::Discovering { path: "docs" };
        assert_eq!(
            ProgressMode::Human.render(&event).as_deref(),
            Some("ingest  discovering docs")
        );
        assert_eq!(ProgressMode::Off.render(&event), None);
    }

    #[test]
    fn parse_progress_mode() {
        assert_eq!(ProgressMode::from_str("json", true), Ok(ProgressMode::Json));
        assert_eq!(ProgressMode::from_str("none", true), Ok(ProgressMode::Off));
        assert!(ProgressMode::from_str("loud", true).is_err());
    }
}

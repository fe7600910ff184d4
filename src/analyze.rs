use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::matcher::PhraseMatcher;
use crate::source::transcript::parse_export;

/// Totals from running the phrase matcher over an exported chat
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub checked: usize,
    pub matched: usize,
}

impl AnalysisReport {
    pub fn unmatched(&self) -> usize {
        self.checked - self.matched
    }
}

/// Score every message of an export against the configured phrases.
pub fn analyze(content: &str, matcher: &PhraseMatcher) -> AnalysisReport {
    let mut report = AnalysisReport::default();

    for entry in parse_export(content) {
        report.checked += 1;

        let results = matcher.evaluate(&entry.text);
        for r in &results {
            debug!(phrase = %r.phrase, score = r.score, "Compared message");
        }

        let best = results.iter().filter(|r| r.matched).max_by_key(|r| r.score);
        match best {
            Some(hit) => {
                report.matched += 1;
                info!(
                    sender = %entry.sender,
                    phrase = %hit.phrase,
                    score = hit.score,
                    "Match: {}",
                    entry.text
                );
            }
            None => debug!(sender = %entry.sender, "No match: {}", entry.text),
        }
    }

    report
}

pub fn analyze_file(path: &Path, matcher: &PhraseMatcher) -> Result<AnalysisReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chat export: {}", path.display()))?;
    Ok(analyze(&content, matcher))
}

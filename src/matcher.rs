use tracing::debug;

/// Score of one message against one trigger phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub phrase: String,
    pub score: u8,
    pub matched: bool,
}

/// Length of the longest common subsequence of `a` and `b`.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Indel-normalized similarity in [0, 1].
fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Ties round to even, so 12.5 scores 12 and 37.5 scores 38.
fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round_ties_even() as u8
}

/// Substring-tolerant similarity score in [0, 100].
///
/// The shorter string is compared against every same-length window of the
/// longer one, and against every shorter tail of it, and the best window
/// wins. A phrase embedded in a longer message scores 100, and a phrase cut
/// off at the end of the message is scored against what is there. Empty
/// input on either side scores 0.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let n = short.len();

    let tails = (long.len() - n + 1..long.len()).map(move |start| &long[start..]);

    let mut best = 0.0f64;
    for window in long.windows(n).chain(tails) {
        best = best.max(similarity(short, window));
        if best >= 1.0 {
            break;
        }
    }
    to_score(best)
}

/// True when any phrase scores at least `threshold` against `text`.
/// Stops at the first matching phrase. No phrases means no match.
pub fn is_relevant(text: &str, phrases: &[String], threshold: u8) -> bool {
    phrases.iter().any(|phrase| {
        let score = partial_ratio(text, phrase);
        debug!("Comparing with '{}' -> score {}", phrase, score);
        score >= threshold
    })
}

/// The configured trigger phrases and their threshold.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: Vec<String>,
    threshold: u8,
}

impl PhraseMatcher {
    pub fn new(phrases: Vec<String>, threshold: u8) -> Self {
        Self { phrases, threshold }
    }

    /// Alerting is off when no phrases are configured.
    pub fn is_enabled(&self) -> bool {
        !self.phrases.is_empty()
    }

    pub fn is_relevant(&self, text: &str) -> bool {
        is_relevant(text, &self.phrases, self.threshold)
    }

    /// Score `text` against every phrase, without short-circuiting.
    pub fn evaluate(&self, text: &str) -> Vec<MatchResult> {
        self.phrases
            .iter()
            .map(|phrase| {
                let score = partial_ratio(text, phrase);
                MatchResult {
                    phrase: phrase.clone(),
                    score,
                    matched: score >= self.threshold,
                }
            })
            .collect()
    }
}

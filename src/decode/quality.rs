//! Heuristic quality gate for decoded text.

use crate::config::Mode;

/// Punctuation that shows up in ordinary prose and is never counted as noise.
const PLAIN_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '-', '(', ')'];

/// Thresholds deciding whether a decode attempt looks usable.
///
/// The defaults are hand-tuned rather than derived from engine confidence;
/// both are configurable through
/// [`PipelineConfigBuilder::quality`](crate::PipelineConfigBuilder::quality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    /// Text shorter than this many characters is rejected (default: 20)
    pub min_chars: usize,
    /// Print text with this many noise-symbol clusters or more is rejected (default: 5)
    pub max_symbols: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_chars: 20,
            max_symbols: 5,
        }
    }
}

/// Outcome of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Text passed both checks
    Accepted,
    /// Fewer characters than the floor
    TooShort {
        /// Characters found
        chars: usize,
    },
    /// Too many clusters of implausible symbols (print mode only)
    TooNoisy {
        /// Clusters found
        clusters: usize,
    },
}

impl Verdict {
    /// Whether the text passed the gate.
    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }
}

impl QualityGate {
    /// Judge `text` decoded in `mode`.
    ///
    /// The symbol cap only applies to print: handwriting decoders routinely
    /// emit stray marks and are always retried anyway.
    pub fn evaluate(&self, text: &str, mode: Mode) -> Verdict {
        let chars = text.chars().count();
        if chars < self.min_chars {
            return Verdict::TooShort { chars };
        }

        if !mode.is_handwriting() {
            let clusters = count_noise_clusters(text);
            if clusters >= self.max_symbols {
                return Verdict::TooNoisy { clusters };
            }
        }

        Verdict::Accepted
    }
}

/// Count runs of consecutive noise symbols.
///
/// A noise symbol is neither alphanumeric, whitespace nor plain punctuation,
/// e.g. `|`, `~`, `#`, `}` left behind by scan noise. A smudge read as
/// `|~#}` is one cluster.
pub fn count_noise_clusters(text: &str) -> usize {
    let mut clusters = 0;
    let mut in_cluster = false;
    for c in text.chars() {
        let noise = !c.is_alphanumeric() && !c.is_whitespace() && !PLAIN_PUNCTUATION.contains(&c);
        if noise && !in_cluster {
            clusters += 1;
        }
        in_cluster = noise;
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_rejected() {
        let gate = QualityGate::default();
        assert_eq!(gate.evaluate("only ten c", Mode::Print), Verdict::TooShort { chars: 10 });
        assert_eq!(gate.evaluate("", Mode::Handwriting), Verdict::TooShort { chars: 0 });
    }

    #[test]
    fn test_plain_prose_accepted() {
        let gate = QualityGate::default();
        let text = "Estimado cliente, su factura (No. 42) vence el martes!";
        assert!(gate.evaluate(text, Mode::Print).is_accepted());
    }

    #[test]
    fn test_noisy_print_rejected() {
        let gate = QualityGate::default();
        let text = "Th|s ~is a #scan} with |noise| everywhere";
        assert_eq!(gate.evaluate(text, Mode::Print), Verdict::TooNoisy { clusters: 6 });
    }

    #[test]
    fn test_symbol_cap_ignored_for_handwriting() {
        let gate = QualityGate::default();
        let text = "Th|s ~is a #scan} with |noise| everywhere";
        assert!(gate.evaluate(text, Mode::Handwriting).is_accepted());
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let gate = QualityGate {
            min_chars: 5,
            max_symbols: 5,
        };
        // Five characters, ten bytes
        assert!(gate.evaluate("ñáéíó", Mode::Print).is_accepted());
        assert!(!gate.evaluate("ñáéí", Mode::Print).is_accepted());
    }

    #[test]
    fn test_count_noise_clusters() {
        assert_eq!(count_noise_clusters("Hello, world. (ok?) \"quote\" - yes!"), 0);
        assert_eq!(count_noise_clusters("a|b~c#d"), 3);
        assert_eq!(count_noise_clusters("|~#}"), 1);
        assert_eq!(count_noise_clusters("=== ### a.b ~~"), 3);
    }

    #[test]
    fn test_single_smudge_does_not_reject_print() {
        let gate = QualityGate::default();
        let text = "Total due |~#}{ on the first of March";
        assert!(gate.evaluate(text, Mode::Print).is_accepted());
    }
}

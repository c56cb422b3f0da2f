//! Encoding and delimiter detection over a leading byte sample.

use encoding_rs::{
    BIG5, EUC_KR, Encoding, GBK, ISO_8859_2, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252,
};
use log::{debug, warn};

/// Legacy encodings tried, in order, when the sample is not valid UTF-8.
const LEGACY_CANDIDATES: &[&Encoding] = &[WINDOWS_1252, SHIFT_JIS, GBK, EUC_KR, BIG5, ISO_8859_2];

const DELIMITER_CANDIDATES: &[u8] = b",;\t|";

#[derive(Debug, Clone)]
pub struct Detection {
    pub encoding: &'static Encoding,
    pub confidence: f64,
    pub warning: Option<String>,
}

impl Detection {
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }
}

pub struct EncodingDetector {
    threshold: f64,
}

impl EncodingDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn detect(&self, sample: &[u8]) -> Detection {
        if let Some((encoding, _)) = Encoding::for_bom(sample) {
            debug!("Byte-order mark selects {}", encoding.name());
            return Detection {
                encoding,
                confidence: 1.0,
                warning: None,
            };
        }
        if let Some(confidence) = utf8_confidence(sample) {
            return Detection {
                encoding: UTF_8,
                confidence,
                warning: None,
            };
        }

        let best = LEGACY_CANDIDATES
            .iter()
            .filter_map(|encoding| score_legacy(encoding, sample).map(|score| (*encoding, score)))
            .fold(None::<(&'static Encoding, f64)>, |best, candidate| match best {
                Some((_, score)) if score >= candidate.1 => best,
                _ => Some(candidate),
            });

        match best {
            Some((encoding, confidence)) if confidence >= self.threshold => {
                debug!(
                    "Detected {} with confidence {confidence:.2}",
                    encoding.name()
                );
                Detection {
                    encoding,
                    confidence,
                    warning: None,
                }
            }
            other => {
                let confidence = other.map_or(0.0, |(_, score)| score);
                let message = format!(
                    "Encoding detection confidence {confidence:.2} is below {:.2}; decoding as UTF-8 with replacement characters",
                    self.threshold
                );
                warn!("{message}");
                Detection {
                    encoding: UTF_8,
                    confidence,
                    warning: Some(message),
                }
            }
        }
    }
}

/// `Some(1.0)` for ASCII, `Some(0.99)` for other valid UTF-8. A multi-byte
/// sequence cut by the sample boundary still counts as valid.
fn utf8_confidence(sample: &[u8]) -> Option<f64> {
    let valid = match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none() && sample.len() - err.valid_up_to() < 4,
    };
    if !valid {
        return None;
    }
    if sample.is_ascii() {
        Some(1.0)
    } else {
        Some(0.99)
    }
}

/// Share of plausible characters after decoding, or `None` if decoding fails.
fn score_legacy(encoding: &'static Encoding, sample: &[u8]) -> Option<f64> {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        return None;
    }
    let (text, had_errors) = encoding.decode_without_bom_handling(sample);
    if had_errors {
        return None;
    }
    let mut total = 0usize;
    let mut plausible = 0usize;
    for ch in text.chars() {
        total += 1;
        if ch.is_ascii_graphic()
            || ch == ' '
            || ch == '\t'
            || ch == '\n'
            || ch == '\r'
            || (ch.is_alphanumeric() && !ch.is_ascii())
            || matches!(ch, '€' | '£' | '°' | '·' | '–' | '—' | '’' | '“' | '”')
        {
            plausible += 1;
        }
    }
    if total == 0 {
        return None;
    }
    let ascii_ratio = sample.iter().filter(|b| b.is_ascii()).count() as f64 / sample.len() as f64;
    let char_ratio = plausible as f64 / total as f64;
    // CJK decoders accept most high-byte pairs; mostly-ASCII text is rarely CJK.
    let penalty = if encoding == WINDOWS_1252 || encoding == ISO_8859_2 || ascii_ratio <= 0.9 {
        0.0
    } else {
        0.15
    };
    Some((char_ratio - penalty).clamp(0.0, 1.0))
}

/// Picks the delimiter with the most consistent non-zero per-line count.
pub fn sniff_delimiter(text: &str, fallback: u8) -> u8 {
    let lines = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(50)
        .collect::<Vec<_>>();
    // The last line of a byte sample is usually cut short.
    let lines = if lines.len() > 2 {
        &lines[..lines.len() - 1]
    } else {
        &lines[..]
    };
    if lines.is_empty() {
        return fallback;
    }

    let mut best: Option<(u8, usize, usize)> = None;
    for &candidate in DELIMITER_CANDIDATES {
        let counts = lines
            .iter()
            .map(|line| count_outside_quotes(line, candidate))
            .collect::<Vec<_>>();
        let first = counts[0];
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let total = counts.iter().sum::<usize>();
        let better = match best {
            None => true,
            Some((_, best_consistent, best_total)) => {
                consistent > best_consistent
                    || (consistent == best_consistent && total > best_total)
            }
        };
        if better {
            best = Some((candidate, consistent, total));
        }
    }
    best.map_or(fallback, |(delimiter, _, _)| delimiter)
}

fn count_outside_quotes(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_certain_utf8() {
        let detection = EncodingDetector::new(0.7).detect(b"a,b\n1,2\n");
        assert_eq!(detection.encoding, UTF_8);
        assert_eq!(detection.confidence, 1.0);
        assert!(detection.warning.is_none());
    }

    #[test]
    fn bom_wins() {
        let detection = EncodingDetector::new(0.7).detect(b"\xff\xfea\x00");
        assert_eq!(detection.encoding, UTF_16LE);
        assert_eq!(detection.confidence, 1.0);
    }

    #[test]
    fn utf8_with_accents_scores_slightly_lower() {
        let detection = EncodingDetector::new(0.7).detect("name\ncafé\n".as_bytes());
        assert_eq!(detection.encoding, UTF_8);
        assert!((detection.confidence - 0.99).abs() < f64::EPSILON);
    }

    #[test]
    fn truncated_utf8_sequence_at_sample_end_is_tolerated() {
        let bytes = "ab€".as_bytes();
        let cut = &bytes[..bytes.len() - 1];
        assert_eq!(utf8_confidence(cut), Some(0.99));
    }

    #[test]
    fn latin1_text_detects_windows_1252() {
        let detection = EncodingDetector::new(0.7).detect(b"city\nM\xfcnchen\nZ\xfcrich\n");
        assert_eq!(detection.encoding, WINDOWS_1252);
        assert!(detection.confidence >= 0.7);
    }

    #[test]
    fn low_confidence_falls_back_with_warning() {
        let detection = EncodingDetector::new(1.01).detect(b"caf\xe9");
        assert_eq!(detection.encoding, UTF_8);
        assert!(detection.warning.is_some());
    }

    #[test]
    fn sniffs_semicolons_and_ignores_quoted_commas() {
        let text = "a;b;c\n\"1,5\";2;3\n4;5;6\n";
        assert_eq!(sniff_delimiter(text, b','), b';');
    }

    #[test]
    fn sniff_falls_back_for_single_column() {
        assert_eq!(sniff_delimiter("value\n1\n2\n", b'\t'), b'\t');
    }
}

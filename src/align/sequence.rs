use similar::{Algorithm, DiffTag, capture_diff_slices};
use tracing::info;

use crate::lyric::{Normalizer, TokenizedLine};
use crate::recognition::Recognition;
use super::{MatchStats, TimeMatcher};

/// Global sequence alignment over the whole document.
///
/// Reference tokens are expanded into their normalized characters so they
/// compare at the same granularity as the recognized character stream. A
/// token takes the time of its first character that lands in an `equal`
/// run; every other opcode leaves holes for the reconciler.
pub struct GlobalMatcher;

/// Position of one reference character: (line, token)
type CharOwner = (usize, usize);

impl TimeMatcher for GlobalMatcher {
    fn assign_times(
        &mut self,
        lines: &mut [TokenizedLine],
        recognition: &Recognition,
        normalizer: &mut Normalizer,
    ) -> MatchStats {
        let mut owners: Vec<CharOwner> = Vec::new();
        let mut reference: Vec<String> = Vec::new();
        for (line_pos, line) in lines.iter().enumerate() {
            for (token_pos, token) in line.tokens.iter().enumerate() {
                for c in token.normalized.chars() {
                    owners.push((line_pos, token_pos));
                    reference.push(c.to_string());
                }
            }
        }

        let ai_chars = recognition.chars(normalizer);
        let recognized: Vec<String> = ai_chars.iter().map(|c| c.text.to_string()).collect();
        info!(
            "Aligning {} reference characters against {} recognized characters",
            reference.len(),
            recognized.len()
        );

        let mut stats = MatchStats::default();
        let mut last_valid_time = 0.0_f64;

        for op in capture_diff_slices(Algorithm::Myers, &reference, &recognized) {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => {
                    stats.equal += old_range.len();
                    for (ref_idx, ai_idx) in old_range.zip(new_range) {
                        let (line_pos, token_pos) = owners[ref_idx];
                        let token = &mut lines[line_pos].tokens[token_pos];
                        if token.time.is_some() {
                            continue;
                        }
                        let matched_time = ai_chars[ai_idx].start.max(last_valid_time);
                        token.time = Some(matched_time);
                        last_valid_time = matched_time;
                    }
                }
                // Misaligned: left as holes for interpolation
                DiffTag::Replace => stats.replace += old_range.len(),
                // Missed by the recognizer
                DiffTag::Delete => stats.delete += old_range.len(),
                // Recognizer-only material is dropped
                DiffTag::Insert => stats.insert += new_range.len(),
            }
        }

        stats.ratio = match reference.len() + recognized.len() {
            0 => 0.0,
            total => 2.0 * stats.equal as f64 / total as f64,
        };
        info!("Sequence matching ratio: {:.4}, stats: {:?}", stats.ratio, stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyric::tokenize_line;
    use crate::recognition::{AiSegment, AiWord};

    fn recognition(words: &[(&str, f64, f64)]) -> Recognition {
        Recognition {
            segments: vec![AiSegment {
                start: words.first().map_or(0.0, |w| w.1),
                end: words.last().map_or(0.0, |w| w.2),
                text: String::new(),
                words: words
                    .iter()
                    .map(|(text, start, end)| AiWord { start: *start, end: *end, text: text.to_string() })
                    .collect(),
            }],
            language: None,
        }
    }

    fn tokenize(texts: &[&str], normalizer: &mut Normalizer) -> Vec<TokenizedLine> {
        texts.iter().enumerate().map(|(i, t)| tokenize_line(i, t, normalizer)).collect()
    }

    fn times(line: &TokenizedLine) -> Vec<Option<f64>> {
        line.tokens.iter().map(|t| t.time).collect()
    }

    #[test]
    fn test_equal_runs_assign_times_and_deletes_stay_holes() {
        let mut normalizer = Normalizer::new();
        let mut lines = tokenize(&["你好世界", "再见"], &mut normalizer);
        let rec = recognition(&[("你", 10.2, 10.5), ("好", 10.5, 10.9), ("世", 10.9, 11.3), ("界", 11.3, 11.6)]);

        let stats = GlobalMatcher.assign_times(&mut lines, &rec, &mut normalizer);

        assert_eq!(times(&lines[0]), vec![Some(10.2), Some(10.5), Some(10.9), Some(11.3)]);
        assert_eq!(times(&lines[1]), vec![None, None]);
        assert_eq!(stats.equal, 4);
        assert_eq!(stats.delete + stats.replace, 2);
    }

    #[test]
    fn test_inserted_recognition_is_ignored() {
        let mut normalizer = Normalizer::new();
        let mut lines = tokenize(&["ab"], &mut normalizer);
        let rec = recognition(&[("x", 1.0, 1.1), ("a", 2.0, 2.1), ("y", 3.0, 3.1), ("b", 4.0, 4.1)]);

        let stats = GlobalMatcher.assign_times(&mut lines, &rec, &mut normalizer);

        // "ab" is one Latin token; it takes the time of its first matched character
        assert_eq!(times(&lines[0]), vec![Some(2.0)]);
        assert_eq!(stats.insert, 2);
    }

    #[test]
    fn test_latin_words_match_by_characters() {
        let mut normalizer = Normalizer::new();
        let mut lines = tokenize(&["Hello, world!"], &mut normalizer);
        let rec = recognition(&[(" hello", 1.0, 1.5), (" world", 2.0, 2.5)]);

        GlobalMatcher.assign_times(&mut lines, &rec, &mut normalizer);

        assert_eq!(times(&lines[0]), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_times_never_move_backwards() {
        let mut normalizer = Normalizer::new();
        let mut lines = tokenize(&["你好"], &mut normalizer);
        // Overlapping words put 好 before 你
        let rec = recognition(&[("你", 5.0, 5.2), ("好", 4.0, 4.2)]);

        GlobalMatcher.assign_times(&mut lines, &rec, &mut normalizer);

        assert_eq!(times(&lines[0]), vec![Some(5.0), Some(5.0)]);
    }

    #[test]
    fn test_empty_recognition() {
        let mut normalizer = Normalizer::new();
        let mut lines = tokenize(&["你好"], &mut normalizer);

        let stats = GlobalMatcher.assign_times(&mut lines, &Recognition::default(), &mut normalizer);

        assert_eq!(times(&lines[0]), vec![None, None]);
        assert_eq!(stats.ratio, 0.0);
    }
}

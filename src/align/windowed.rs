use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::AlignConfig;
use crate::lyric::{Normalizer, TokenizedLine};
use crate::recognition::{AiWord, Recognition};
use super::{MatchStats, TimeMatcher};

/// Tolerance around a mapped segment's bounds for accepting a word (seconds)
const SEGMENT_SLACK: f64 = 1.0;

/// How far a word may start before the last matched time (seconds)
const BACKTRACK_SLACK: f64 = 0.5;

/// Consecutive matches after which the search window is halved
const STREAK_FOR_NARROW_WINDOW: usize = 3;

/// Bounded look-ahead matcher.
///
/// Each reference line is first mapped to a recognizer segment; its tokens are
/// then matched against words ahead of a pool cursor, constrained to that
/// segment's time range. Cheaper than the global diff but drifts when the
/// recognizer's segmentation is unreliable.
pub struct WindowedMatcher {
    search_window: usize,
    segment_lookahead: usize,
    segment_match_ratio: f64,
    pool_cursor: usize,
}

impl WindowedMatcher {
    pub fn new(config: &AlignConfig) -> Self {
        Self {
            search_window: config.search_window.max(1),
            segment_lookahead: config.segment_lookahead.max(1),
            segment_match_ratio: config.segment_match_ratio,
            pool_cursor: 0,
        }
    }

    /// Greedy line → segment mapping within a small forward window
    pub fn map_lines_to_segments(
        &self,
        lines: &[TokenizedLine],
        recognition: &Recognition,
        normalizer: &mut Normalizer,
    ) -> HashMap<usize, usize> {
        let segment_texts: Vec<String> = recognition
            .segments
            .iter()
            .map(|segment| normalizer.normalize(&segment.text))
            .collect();

        let mut mapping = HashMap::new();
        let mut segment_cursor = 0;

        for (line_pos, line) in lines.iter().enumerate() {
            let line_text = normalizer.normalize(&line.text);
            let mut best: Option<(usize, f64)> = None;

            for candidate in segment_cursor..(segment_cursor + self.segment_lookahead).min(segment_texts.len()) {
                let ratio = strsim::normalized_levenshtein(&line_text, &segment_texts[candidate]);
                if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
                    best = Some((candidate, ratio));
                }
            }

            match best {
                Some((segment, ratio)) if ratio > self.segment_match_ratio => {
                    mapping.insert(line_pos, segment);
                    // Several lines may share one segment, so the cursor stays on it
                    segment_cursor = segment;
                }
                _ => debug!("Line {} has no matching segment", line_pos + 1),
            }
        }

        mapping
    }

    fn match_line(
        &mut self,
        line: &mut TokenizedLine,
        words: &[(&AiWord, String)],
        bounds: (f64, f64),
        mut last_valid_time: f64,
        stats: &mut MatchStats,
    ) -> f64 {
        let (segment_start, segment_end) = bounds;
        let mut streak = 0;

        for token in line.tokens.iter_mut() {
            let window = if streak > STREAK_FOR_NARROW_WINDOW {
                (self.search_window / 2).max(5)
            } else {
                self.search_window
            };

            let mut matched = None;
            for offset in 0..window {
                let index = self.pool_cursor + offset;
                let Some((word, clean)) = words.get(index) else {
                    break;
                };

                let in_time = word.start >= last_valid_time - BACKTRACK_SLACK
                    && word.start <= segment_end + SEGMENT_SLACK
                    && word.start >= segment_start - SEGMENT_SLACK;
                if !in_time || token.normalized.is_empty() || clean.is_empty() {
                    continue;
                }

                if clean.contains(token.normalized.as_str()) || token.normalized.contains(clean.as_str()) {
                    matched = Some(word.start);
                    self.pool_cursor = index + 1;
                    break;
                }
            }

            match matched {
                Some(time) => {
                    streak += 1;
                    stats.equal += 1;
                    last_valid_time = last_valid_time.max(time);
                }
                None => {
                    streak = 0;
                    stats.delete += 1;
                }
            }
            token.time = matched;
        }

        last_valid_time
    }
}

impl TimeMatcher for WindowedMatcher {
    fn assign_times(
        &mut self,
        lines: &mut [TokenizedLine],
        recognition: &Recognition,
        normalizer: &mut Normalizer,
    ) -> MatchStats {
        let words: Vec<(&AiWord, String)> = recognition
            .words()
            .map(|word| (word, normalizer.normalize(&word.text)))
            .collect();
        let mapping = self.map_lines_to_segments(lines, recognition, normalizer);
        info!("Mapped {}/{} lines to recognizer segments", mapping.len(), lines.len());

        self.pool_cursor = 0;
        let mut stats = MatchStats::default();
        let mut last_valid_time = 0.0;

        for (line_pos, line) in lines.iter_mut().enumerate() {
            let bounds = mapping
                .get(&line_pos)
                .and_then(|&segment| recognition.segments.get(segment))
                .map_or((f64::NEG_INFINITY, f64::INFINITY), |segment| (segment.start, segment.end));
            last_valid_time = self.match_line(line, &words, bounds, last_valid_time, &mut stats);
        }

        let total_tokens = stats.equal + stats.delete;
        stats.insert = words.len().saturating_sub(stats.equal);
        stats.ratio = match total_tokens + words.len() {
            0 => 0.0,
            total => 2.0 * stats.equal as f64 / total as f64,
        };
        info!("Windowed matching ratio: {:.4}, stats: {:?}", stats.ratio, stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyric::tokenize_line;
    use crate::recognition::AiSegment;

    fn segment(start: f64, end: f64, words: &[(&str, f64)]) -> AiSegment {
        AiSegment {
            start,
            end,
            text: words.iter().map(|w| w.0).collect::<Vec<_>>().join(" "),
            words: words
                .iter()
                .map(|(text, start)| AiWord { start: *start, end: start + 0.2, text: text.to_string() })
                .collect(),
        }
    }

    fn lines(texts: &[&str], normalizer: &mut Normalizer) -> Vec<TokenizedLine> {
        texts.iter().enumerate().map(|(i, t)| tokenize_line(i, t, normalizer)).collect()
    }

    #[test]
    fn test_lines_map_to_similar_segments() {
        let mut normalizer = Normalizer::new();
        let lines = lines(&["hello there", "general kenobi"], &mut normalizer);
        let recognition = Recognition {
            segments: vec![
                segment(1.0, 2.0, &[("hello", 1.0), ("there", 1.5)]),
                segment(5.0, 6.0, &[("general", 5.0), ("kenobi", 5.5)]),
            ],
            language: None,
        };

        let matcher = WindowedMatcher::new(&AlignConfig::default());
        let mapping = matcher.map_lines_to_segments(&lines, &recognition, &mut normalizer);

        assert_eq!(mapping.get(&0), Some(&0));
        assert_eq!(mapping.get(&1), Some(&1));
    }

    #[test]
    fn test_words_outside_segment_are_rejected() {
        let mut normalizer = Normalizer::new();
        let mut lines = lines(&["hello there", "there again"], &mut normalizer);
        let recognition = Recognition {
            segments: vec![
                segment(1.0, 2.0, &[("hello", 1.0), ("there", 1.5)]),
                segment(10.0, 11.0, &[("there", 10.0), ("again", 10.5)]),
            ],
            language: None,
        };

        let mut matcher = WindowedMatcher::new(&AlignConfig::default());
        let stats = matcher.assign_times(&mut lines, &recognition, &mut normalizer);

        let first: Vec<_> = lines[0].tokens.iter().map(|t| t.time).collect();
        let second: Vec<_> = lines[1].tokens.iter().map(|t| t.time).collect();
        assert_eq!(first, vec![Some(1.0), Some(1.5)]);
        assert_eq!(second, vec![Some(10.0), Some(10.5)]);
        assert_eq!(stats.equal, 4);
        assert_eq!(stats.insert, 0);
    }

    #[test]
    fn test_unmatched_tokens_stay_holes() {
        let mut normalizer = Normalizer::new();
        let mut lines = lines(&["alpha beta"], &mut normalizer);
        let recognition = Recognition {
            segments: vec![segment(0.0, 1.0, &[("gamma", 0.2)])],
            language: None,
        };

        let mut matcher = WindowedMatcher::new(&AlignConfig::default());
        let stats = matcher.assign_times(&mut lines, &recognition, &mut normalizer);

        assert!(lines[0].tokens.iter().all(|t| t.time.is_none()));
        assert_eq!(stats.delete, 2);
    }
}

// Lyric-to-speech alignment
//
// Pipeline: tokenize reference lines -> assign raw times with a TimeMatcher
// -> reconcile each line in document order -> format as enhanced LRC.
// Reconciled lines are strictly increasing, both within a line and from one
// line to the next, and end before the next line's timestamp.
// - sequence: global diff over the whole document (default)
// - windowed: segment-constrained look-ahead matcher
// - reconcile: per-line correction passes
// - format: LRC rendering and the raw-transcript fallback

pub mod format;
pub mod reconcile;
pub mod sequence;
pub mod windowed;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::config::{AlignConfig, AlignStrategy};
use crate::lyric::{LyricDocument, Normalizer, TokenizedLine, tokenize_line};
use crate::recognition::Recognition;
pub use format::{FormattedLine, LineFormatter};
pub use reconcile::{LineContext, Reconciler};
pub use sequence::GlobalMatcher;
pub use windowed::WindowedMatcher;

/// Token counts per opcode kind and the overall similarity ratio
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStats {
    pub equal: usize,
    pub replace: usize,
    pub delete: usize,
    pub insert: usize,
    pub ratio: f64,
}

/// Assigns raw times to reference tokens; unmatched tokens stay `None`
pub trait TimeMatcher {
    fn assign_times(
        &mut self,
        lines: &mut [TokenizedLine],
        recognition: &Recognition,
        normalizer: &mut Normalizer,
    ) -> MatchStats;
}

/// Factory for creating matcher instances
pub struct MatcherFactory;

impl MatcherFactory {
    pub fn create_matcher(config: &AlignConfig) -> Box<dyn TimeMatcher> {
        match config.strategy {
            AlignStrategy::Global => Box::new(GlobalMatcher),
            AlignStrategy::Windowed => Box::new(WindowedMatcher::new(config)),
        }
    }
}

/// Cooperative cancellation flag, polled between lines
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one alignment run. An aborted run carries no partial output.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignOutcome {
    Completed(String),
    Aborted,
}

/// Aligns one lyric document against one recognition result
pub struct Aligner {
    config: AlignConfig,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, document: &LyricDocument, recognition: &Recognition, stop: &StopFlag) -> AlignOutcome {
        info!(
            "Aligning {} lines ({} with timestamps) against {} words",
            document.len(),
            document.anchored_count(),
            recognition.word_count()
        );

        let formatter = LineFormatter::new(self.config.time_offset);
        let mut output: Vec<String> = document.headers.clone();
        if !output.is_empty() {
            output.push(String::new());
        }

        if document.is_empty() {
            info!("No reference text provided, emitting recognized segments");
            return match formatter.format_raw(recognition, stop) {
                Some(lines) => {
                    output.extend(lines);
                    AlignOutcome::Completed(output.join("\n"))
                }
                None => AlignOutcome::Aborted,
            };
        }

        let mut normalizer = Normalizer::new();
        let mut lines: Vec<TokenizedLine> = document
            .lines
            .iter()
            .map(|line| tokenize_line(line.index, &line.text, &mut normalizer))
            .collect();

        let mut matcher = MatcherFactory::create_matcher(&self.config);
        matcher.assign_times(&mut lines, recognition, &mut normalizer);

        let reconciler = Reconciler::new(&self.config);
        let mut cursor = 0.0;

        for line in lines.iter_mut() {
            if stop.is_stopped() {
                info!("Alignment stopped before line {}", line.index + 1);
                return AlignOutcome::Aborted;
            }

            let ctx = LineContext {
                line_no: line.index + 1,
                anchor: document.anchor(line.index),
                next_anchor: document.next_anchor(line.index),
                cursor,
            };
            let mut times: Vec<Option<f64>> = line.tokens.iter().map(|t| t.time).collect();
            cursor = reconciler.reconcile_line(&mut times, ctx);
            for (token, time) in line.tokens.iter_mut().zip(times) {
                token.time = time;
            }

            let formatted = formatter.format_line(line);
            output.push(formatted.text);

            let translations = document.translations_for(line.index);
            if !translations.is_empty() {
                let start = formatted.effective_start.unwrap_or(cursor);
                output.extend(formatter.format_translations(translations, start));
            }
        }

        info!("Alignment completed: {} output lines", output.len());
        AlignOutcome::Completed(output.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyric::{LyricFormat, LyricParser};
    use crate::recognition::{AiSegment, AiWord};
    use crate::timecode::{TIME_TAG, parse_time_tag};

    fn recognition(words: &[(&str, f64, f64)]) -> Recognition {
        Recognition {
            segments: vec![AiSegment {
                start: words.first().map_or(0.0, |w| w.1),
                end: words.last().map_or(0.0, |w| w.2),
                text: words.iter().map(|w| w.0).collect(),
                words: words
                    .iter()
                    .map(|(text, start, end)| AiWord { start: *start, end: *end, text: text.to_string() })
                    .collect(),
            }],
            language: None,
        }
    }

    fn parse(content: &str) -> LyricDocument {
        LyricParser::new().parse(content, LyricFormat::Lrc)
    }

    fn completed(outcome: AlignOutcome) -> String {
        match outcome {
            AlignOutcome::Completed(text) => text,
            AlignOutcome::Aborted => panic!("alignment was aborted"),
        }
    }

    /// Every time tag of a rendered line, in seconds
    fn tag_times(line: &str) -> Vec<f64> {
        TIME_TAG
            .find_iter(line)
            .filter_map(|m| parse_time_tag(m.as_str()))
            .collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.002, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn test_matched_line_and_synthesized_line() {
        let doc = parse("[00:10.00]你好世界\n[00:15.00]再见");
        let rec = recognition(&[("你", 10.2, 10.5), ("好", 10.5, 10.9), ("世", 10.9, 11.3), ("界", 11.3, 11.6)]);

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &rec, &StopFlag::new()));
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_close(&tag_times(lines[0]), &[10.2, 10.5, 10.9, 11.3]);
        assert_close(&tag_times(lines[1]), &[15.0, 15.25]);
        assert!(tag_times(lines[0]).iter().all(|&t| t <= 15.0 - 0.05));
    }

    #[test]
    fn test_headers_and_translations_are_emitted() {
        let doc = parse("[ti:Song]\n[00:01.00]你好\n[00:01.00]hello\n[00:03.00]再见");
        let rec = recognition(&[("你", 1.1, 1.3), ("好", 1.3, 1.6), ("再", 3.0, 3.2), ("见", 3.2, 3.5)]);

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &rec, &StopFlag::new()));
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "[ti:Song]");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "[00:01.100]你[00:01.300]好");
        assert_eq!(lines[3], "[00:01.100]hello");
        assert_eq!(lines[4], "[00:03.000]再[00:03.200]见");
    }

    #[test]
    fn test_empty_reference_falls_back_to_segments() {
        let doc = parse("");
        let rec = Recognition {
            segments: vec![
                AiSegment { start: 1.0, end: 2.0, text: "one".to_string(), words: vec![] },
                AiSegment { start: 47.0, end: 48.0, text: "two".to_string(), words: vec![] },
            ],
            language: None,
        };

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &rec, &StopFlag::new()));

        assert_eq!(output, "[00:01.000]one\n[00:47.000]two");
    }

    #[test]
    fn test_average_distribution_spreads_calibrated_line() {
        let config = AlignConfig { average_distribution: true, ..AlignConfig::default() };
        let doc = parse("[00:20.00]一二三四\n[00:22.00]五");
        let rec = recognition(&[("一", 25.0, 25.3), ("二", 25.3, 25.6), ("三", 25.6, 25.9), ("四", 25.9, 26.2)]);

        let output = completed(Aligner::new(config).run(&doc, &rec, &StopFlag::new()));
        let first = output.lines().next().unwrap();

        assert_close(&tag_times(first), &[20.0, 20.475, 20.95, 21.425]);
    }

    #[test]
    fn test_lines_increase_and_end_before_next_anchor() {
        let doc = parse("[00:10.00]一二三\n[00:11.00]四五六\n[00:12.00]七八");
        let words: Vec<(String, f64, f64)> = "一二三四五六七八"
            .chars()
            .enumerate()
            .map(|(i, c)| (c.to_string(), 10.0 + i as f64 * 0.5, 10.5 + i as f64 * 0.5))
            .collect();
        let words: Vec<(&str, f64, f64)> = words.iter().map(|(t, s, e)| (t.as_str(), *s, *e)).collect();

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &recognition(&words), &StopFlag::new()));
        let lines: Vec<Vec<f64>> = output.lines().map(tag_times).collect();

        assert_eq!(lines.len(), 3);
        for (i, times) in lines.iter().enumerate() {
            assert!(times.windows(2).all(|w| w[1] > w[0]), "line {} not increasing: {:?}", i, times);
            if let Some(next_anchor) = doc.next_anchor(i) {
                assert!(times.iter().all(|&t| t <= next_anchor - 0.05), "line {} crosses {}", i, next_anchor);
            }
        }
        assert_close(&lines[0], &[10.0, 10.3, 10.6]);
    }

    #[test]
    fn test_repeated_word_starts_respect_next_line() {
        let doc = parse("[00:10.50]你好\n[00:12.00]再");
        let rec = recognition(&[("你", 11.9, 11.9), ("好", 11.9, 11.9), ("再", 12.0, 12.3)]);

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &rec, &StopFlag::new()));
        let first = tag_times(output.lines().next().unwrap());

        assert_eq!(first.len(), 2);
        assert!(first[1] > first[0], "{:?}", first);
        assert!(first.iter().all(|&t| t <= 11.95), "{:?}", first);
    }

    #[test]
    fn test_lines_with_equal_matches_reparse_as_separate_lines() {
        let doc = parse("你\n好");
        // Overlapping words clamp both lines to the same matched time
        let rec = recognition(&[("你", 5.0, 5.2), ("好", 4.0, 4.2)]);

        let output = completed(Aligner::new(AlignConfig::default()).run(&doc, &rec, &StopFlag::new()));
        let reparsed = parse(&output);

        assert_eq!(output, "[00:05.000]你\n[00:05.060]好");
        assert_eq!(reparsed.texts(), vec!["你", "好"]);
        assert!(reparsed.translations.is_empty());
    }

    #[test]
    fn test_stopped_run_is_aborted() {
        let doc = parse("[00:10.00]你好");
        let rec = recognition(&[("你", 10.0, 10.2)]);
        let stop = StopFlag::new();
        stop.stop();

        assert_eq!(Aligner::new(AlignConfig::default()).run(&doc, &rec, &stop), AlignOutcome::Aborted);

        stop.reset();
        assert!(matches!(
            Aligner::new(AlignConfig::default()).run(&doc, &rec, &stop),
            AlignOutcome::Completed(_)
        ));
    }

    #[test]
    fn test_windowed_strategy_runs_end_to_end() {
        let config = AlignConfig { strategy: AlignStrategy::Windowed, ..AlignConfig::default() };
        let doc = parse("hello world");
        let rec = recognition(&[("hello", 1.0, 1.4), ("world", 1.5, 2.0)]);

        let output = completed(Aligner::new(config).run(&doc, &rec, &StopFlag::new()));

        assert_eq!(output, "[00:01.000]hello [00:01.500]world");
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::timecode::{parse_time_tag, strip_time_tags};
use super::{LyricDocument, LyricFormat, LyricLine};

static LEADING_TIME_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\[\d+:\d{1,2}(?:[.:]\d{1,3})?\])(.*)$").expect("valid leading tag pattern")
});

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("valid markup pattern"));

/// Production credits such as "作词：..." or "Composer - ..."
static CREDITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(作|编|词|曲|演|唱|混|录|母|制|监|统|出|绘|调|和|吉|贝|鼓|弦|管|Lyr|Com|Arr|Sin|Voc|Mix|Mas|Pro|Art|Cov|Gui|Bas|Dru|Str).{0,40}([:：]|\s|-)",
    )
    .expect("valid credits pattern")
});

/// Parses timestamped or plain lyric text. Parsing never fails: malformed
/// tags degrade to an unknown timestamp.
#[derive(Debug, Default)]
pub struct LyricParser;

impl LyricParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str, format: LyricFormat) -> LyricDocument {
        debug!("Parsing lyrics as {:?} ({} bytes)", format, content.len());

        let mut headers = Vec::new();
        let mut lines: Vec<LyricLine> = Vec::new();
        let mut translations: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut last_time_tag: Option<String> = None;

        for raw in content.lines() {
            let line = raw.trim_start_matches('\u{feff}').trim();
            if line.is_empty() {
                continue;
            }

            // [ti:Title], [ar:Artist] and friends
            if line.starts_with('[') && !LEADING_TIME_TAG.is_match(line) {
                headers.push(line.to_string());
                continue;
            }

            let (time_tag, body) = match LEADING_TIME_TAG.captures(line) {
                Some(caps) => (
                    caps.get(1).map(|m| m.as_str().to_string()),
                    caps.get(2).map_or("", |m| m.as_str()).trim(),
                ),
                None => (None, line),
            };
            let text = clean_text(body);
            if text.is_empty() {
                continue;
            }

            if CREDITS.is_match(&text) {
                headers.push(line.to_string());
                continue;
            }

            let is_translation = time_tag.is_some() && time_tag == last_time_tag && !lines.is_empty();
            if is_translation {
                translations.entry(lines.len() - 1).or_default().push(text);
                continue;
            }

            let timestamp = time_tag.as_deref().and_then(parse_time_tag);
            lines.push(LyricLine { index: lines.len(), text, timestamp });
            last_time_tag = time_tag;
        }

        debug!(
            "Parsed {} lyric lines, {} headers, {} translated lines",
            lines.len(),
            headers.len(),
            translations.len()
        );

        LyricDocument { headers, lines, translations }
    }
}

/// Strip inline time tags and markup, then surrounding whitespace
fn clean_text(text: &str) -> String {
    let without_tags = strip_time_tags(text);
    MARKUP.replace_all(&without_tags, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> LyricDocument {
        LyricParser::new().parse(content, LyricFormat::Lrc)
    }

    #[test]
    fn test_headers_and_lines() {
        let doc = parse("\u{feff}[ti:Song]\n[ar:Singer]\n\n[00:10.00]你好世界\n[00:15.50]再见\n");

        assert_eq!(doc.headers, vec!["[ti:Song]", "[ar:Singer]"]);
        assert_eq!(doc.texts(), vec!["你好世界", "再见"]);
        assert_eq!(doc.lines[0].timestamp, Some(10.0));
        assert_eq!(doc.lines[1].timestamp, Some(15.5));
        assert_eq!(doc.lines[1].index, 1);
    }

    #[test]
    fn test_plain_text_has_unknown_timestamps() {
        let doc = parse("first line\nsecond line");

        assert_eq!(doc.len(), 2);
        assert!(doc.lines.iter().all(|line| line.timestamp.is_none()));
        assert!(doc.translations.is_empty());
    }

    #[test]
    fn test_translation_shares_previous_tag() {
        let doc = parse("[00:10.00]君の名は\n[00:10.00]你的名字\n[00:10.00]Your name\n[00:12.00]次");

        assert_eq!(doc.texts(), vec!["君の名は", "次"]);
        assert_eq!(doc.translations_for(0), ["你的名字".to_string(), "Your name".to_string()]);
        assert!(doc.translations_for(1).is_empty());
    }

    #[test]
    fn test_untagged_lines_are_never_translations() {
        let doc = parse("one\ntwo");
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_credits_become_headers() {
        let doc = parse("[00:00.00]作词：某人\n[00:01.00]Composer: Someone\n[00:05.00]歌词");

        assert_eq!(doc.headers.len(), 2);
        assert_eq!(doc.headers[0], "[00:00.00]作词：某人");
        assert_eq!(doc.texts(), vec!["歌词"]);
    }

    #[test]
    fn test_inline_tags_and_markup_are_stripped() {
        let doc = parse("[00:01.000]你[00:01.250]好<b>世</b>[00:01.900]界");

        assert_eq!(doc.texts(), vec!["你好世界"]);
        assert_eq!(doc.lines[0].timestamp, Some(1.0));
    }

    #[test]
    fn test_colon_fraction_and_empty_lines() {
        let doc = parse("[00:02:500]hello\n[00:03.00]\n[00:04.00]<i></i>");

        assert_eq!(doc.len(), 1);
        assert_eq!(doc.lines[0].timestamp, Some(2.5));
    }

    #[test]
    fn test_overflowing_tag_degrades_to_unknown() {
        let doc = parse("[18446744073709551615:00]hello\n[00:05.00]world");

        assert_eq!(doc.texts(), vec!["hello", "world"]);
        assert_eq!(doc.lines[0].timestamp, None);
        assert_eq!(doc.lines[1].timestamp, Some(5.0));
    }
}

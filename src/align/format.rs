use crate::lyric::TokenizedLine;
use crate::recognition::Recognition;
use crate::timecode::format_time;
use super::StopFlag;

/// Renders corrected tokens back into enhanced LRC text.
///
/// Times are rendered as given; ordering and the next-line boundary are the
/// reconciler's job.
pub struct LineFormatter {
    time_offset: f64,
}

/// A rendered lyric line and the time its first token is tagged with
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedLine {
    pub text: String,
    pub effective_start: Option<f64>,
}

impl LineFormatter {
    pub fn new(time_offset: f64) -> Self {
        Self { time_offset }
    }

    pub fn tag(&self, seconds: f64) -> String {
        format!("[{}]", format_time(seconds, self.time_offset))
    }

    /// Render one line with a tag before every token. A token without a time
    /// reuses the previous token's tag.
    pub fn format_line(&self, line: &TokenizedLine) -> FormattedLine {
        if line.tokens.is_empty() {
            return FormattedLine { text: line.text.clone(), effective_start: None };
        }

        let mut rendered = String::new();
        let effective_start = line.tokens.iter().find_map(|t| t.time);
        let mut last_time = effective_start.unwrap_or(0.0);

        for (k, token) in line.tokens.iter().enumerate() {
            if let Some(time) = token.time {
                last_time = time;
            }

            let tag = self.tag(last_time);
            if k == 0 && !token.pre.trim().is_empty() {
                // Leading punctuation such as 「 stays inside the line's first tag
                rendered.push_str(&tag);
                rendered.push_str(&token.pre);
            } else {
                rendered.push_str(&token.pre);
                rendered.push_str(&tag);
            }
            rendered.push_str(&token.text);
        }
        rendered.push_str(line.tail());

        FormattedLine { text: rendered, effective_start }
    }

    /// Translation lines stamped with the source line's start
    pub fn format_translations(&self, translations: &[String], start: f64) -> Vec<String> {
        let tag = self.tag(start);
        translations.iter().map(|text| format!("{}{}", tag, text)).collect()
    }

    /// Fallback without reference text: one line per recognized segment.
    /// Returns `None` when stopped.
    pub fn format_raw(&self, recognition: &Recognition, stop: &StopFlag) -> Option<Vec<String>> {
        let mut lines = Vec::with_capacity(recognition.segments.len());
        for segment in &recognition.segments {
            if stop.is_stopped() {
                return None;
            }
            let text = segment.text.trim();
            if !text.is_empty() {
                lines.push(format!("{}{}", self.tag(segment.start), text));
            }
        }
        Some(lines)
    }
}

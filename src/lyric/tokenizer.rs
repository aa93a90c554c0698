use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// A run of Latin letters, digits and apostrophes, or one Han/kana character
static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9']+|[\x{4e00}-\x{9fa5}\x{3040}-\x{309f}\x{30a0}-\x{30ff}]")
        .expect("valid token pattern")
});

static NON_COMPARABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\x{4e00}-\x{9fa5}\x{3040}-\x{309f}\x{30a0}-\x{30ff}]")
        .expect("valid normalization pattern")
});

static CJK_CHAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\x{4e00}-\x{9fa5}\x{3040}-\x{309f}\x{30a0}-\x{30ff}])").expect("valid CJK pattern")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// One alignable unit of a reference line
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Separator text between the previous token (or line start) and this one
    pub pre: String,
    pub time: Option<f64>,
    pub line_index: usize,
    /// Comparison form; the only thing the aligner looks at
    pub normalized: String,
    /// Byte offset just past this token in the line
    pub end_offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedLine {
    pub index: usize,
    pub text: String,
    pub tokens: Vec<Token>,
}

impl TokenizedLine {
    /// Text after the last token, kept verbatim for reconstruction
    pub fn tail(&self) -> &str {
        match self.tokens.last() {
            Some(last) => &self.text[last.end_offset..],
            None => &self.text,
        }
    }
}

/// Memoizing normalizer. Owned by one alignment run.
#[derive(Debug, Default)]
pub struct Normalizer {
    cache: HashMap<String, String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower-cased text with everything but word and CJK characters removed
    pub fn normalize(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        if let Some(cached) = self.cache.get(text) {
            return cached.clone();
        }

        let normalized = NON_COMPARABLE.replace_all(text, "").to_lowercase();
        self.cache.insert(text.to_string(), normalized.clone());
        normalized
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

/// Split `text` into tokens owned by line `line_index`
pub fn tokenize_line(line_index: usize, text: &str, normalizer: &mut Normalizer) -> TokenizedLine {
    let mut tokens = Vec::new();
    let mut last_end = 0;

    for found in TOKEN.find_iter(text) {
        let pre = text[last_end..found.start()].replace('\n', "");
        last_end = found.end();
        tokens.push(Token {
            text: found.as_str().to_string(),
            pre,
            time: None,
            line_index,
            normalized: normalizer.normalize(found.as_str()),
            end_offset: found.end(),
        });
    }

    TokenizedLine {
        index: line_index,
        text: text.to_string(),
        tokens,
    }
}

/// Surround every CJK character with spaces so recognizers treat each as a word
pub fn space_cjk(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let spaced = CJK_CHAR.replace_all(text, " $1 ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &TokenizedLine) -> Vec<&str> {
        line.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_cjk_characters_are_single_tokens() {
        let mut normalizer = Normalizer::new();
        let line = tokenize_line(0, "你好，世界！", &mut normalizer);

        assert_eq!(texts(&line), vec!["你", "好", "世", "界"]);
        assert_eq!(line.tokens[2].pre, "，");
        assert_eq!(line.tail(), "！");
    }

    #[test]
    fn test_latin_runs_keep_apostrophes() {
        let mut normalizer = Normalizer::new();
        let line = tokenize_line(3, "  Don't stop me now...", &mut normalizer);

        assert_eq!(texts(&line), vec!["Don't", "stop", "me", "now"]);
        assert_eq!(line.tokens[0].pre, "  ");
        assert_eq!(line.tokens[0].normalized, "dont");
        assert_eq!(line.tokens[1].pre, " ");
        assert!(line.tokens.iter().all(|t| t.line_index == 3 && t.time.is_none()));
        assert_eq!(line.tail(), "...");
    }

    #[test]
    fn test_mixed_kana_and_latin() {
        let mut normalizer = Normalizer::new();
        let line = tokenize_line(0, "キミとLove", &mut normalizer);

        assert_eq!(texts(&line), vec!["キ", "ミ", "と", "Love"]);
        assert_eq!(line.tokens[3].normalized, "love");
    }

    #[test]
    fn test_reconstruction_from_pre_and_tail() {
        let mut normalizer = Normalizer::new();
        let original = "「Hello」, 世界 ok?";
        let line = tokenize_line(0, original, &mut normalizer);

        let mut rebuilt: String = line.tokens.iter().map(|t| format!("{}{}", t.pre, t.text)).collect();
        rebuilt.push_str(line.tail());
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_line_without_tokens() {
        let mut normalizer = Normalizer::new();
        let line = tokenize_line(0, "……", &mut normalizer);

        assert!(line.tokens.is_empty());
        assert_eq!(line.tail(), "……");
    }

    #[test]
    fn test_normalizer_caches_results() {
        let mut normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize("Hello,"), "hello");
        assert_eq!(normalizer.normalize("Hello,"), "hello");
        assert_eq!(normalizer.normalize("世界!"), "世界");
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.cached_entries(), 2);
    }

    #[test]
    fn test_space_cjk() {
        assert_eq!(space_cjk("你好 world"), "你 好 world");
        assert_eq!(space_cjk("  a\n\nb "), "a b");
        assert_eq!(space_cjk(""), "");
    }
}

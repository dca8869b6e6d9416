//! 练习短语切分。
//!
//! 按词边界把源文本切成接近目标长度的短语，永远不会在单词内部断开；
//! 目标长度附近若有句末标点则优先在标点处收束。

use serde::Serialize;

/// 一个不可变的练习单元。
#[derive(Debug, Clone, Serialize)]
pub struct Phrase {
    /// 在短语序列中的序号。
    pub index: usize,
    /// 保留原始标点的词序列。
    pub words: Vec<String>,
    /// 在源文本中的字节区间 [start, end)。
    pub span: (usize, usize),
}

impl Phrase {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', ']', '»'])
        .ends_with(['.', '!', '?'])
}

/// 把源文本切分为目标长度的短语。
///
/// 容差为目标长度的三分之一（至少 1）：当短语已达到
/// `target_len - tolerance` 个词且当前词以句末标点结束时提前收束。
pub fn segment_phrases(text: &str, target_len: usize) -> Vec<Phrase> {
    let target_len = target_len.max(1);
    let tolerance = ((target_len + 2) / 3).max(1);

    let mut word_spans: Vec<(usize, usize)> = Vec::new();
    let mut start = None;
    for (offset, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                word_spans.push((begin, offset));
            }
        } else if start.is_none() {
            start = Some(offset);
        }
    }
    if let Some(begin) = start {
        word_spans.push((begin, text.len()));
    }

    let mut phrases = Vec::new();
    let mut current: Vec<(usize, usize)> = Vec::new();

    let flush = |current: &mut Vec<(usize, usize)>, phrases: &mut Vec<Phrase>| {
        if current.is_empty() {
            return;
        }
        let words = current
            .iter()
            .map(|&(begin, end)| text[begin..end].to_string())
            .collect::<Vec<_>>();
        let span = (current[0].0, current[current.len() - 1].1);
        phrases.push(Phrase {
            index: phrases.len(),
            words,
            span,
        });
        current.clear();
    };

    for &(begin, end) in &word_spans {
        current.push((begin, end));
        let len = current.len();
        let at_sentence_end = ends_sentence(&text[begin..end]);

        if len >= target_len || (at_sentence_end && len + tolerance >= target_len) {
            flush(&mut current, &mut phrases);
        }
    }
    flush(&mut current, &mut phrases);

    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_yields_single_phrase() {
        let phrases = segment_phrases("one two three four five", 5);
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].words.len(), 5);
        assert_eq!(phrases[0].text(), "one two three four five");
    }

    #[test]
    fn phrases_never_split_words() {
        let text = "The quick brown fox jumps over the lazy dog near the river bank today";
        for target in 5..=20 {
            let phrases = segment_phrases(text, target);
            for phrase in &phrases {
                let (start, end) = phrase.span;
                // Boundaries land on whitespace or text edges.
                assert!(start == 0 || text.as_bytes()[start - 1].is_ascii_whitespace());
                assert!(end == text.len() || text.as_bytes()[end].is_ascii_whitespace());
                for word in &phrase.words {
                    assert!(!word.contains(char::is_whitespace));
                }
            }
            let rebuilt: Vec<String> = phrases
                .iter()
                .flat_map(|phrase| phrase.words.clone())
                .collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            assert_eq!(rebuilt, original);
        }
    }

    #[test]
    fn sentence_end_within_tolerance_cuts_early() {
        let text = "I came home. Then we ate dinner together quietly";
        let phrases = segment_phrases(text, 5);
        assert_eq!(phrases[0].text(), "I came home.");
        assert_eq!(phrases[1].words[0], "Then");
    }

    #[test]
    fn sentence_end_outside_tolerance_is_ignored() {
        let text = "No. Then we ate dinner together quietly at home";
        let phrases = segment_phrases(text, 6);
        // "No." ends a sentence after a single word, far from the target.
        assert_eq!(phrases[0].word_count(), 6);
    }

    #[test]
    fn spans_index_into_source_text() {
        let text = "alpha beta gamma delta";
        let phrases = segment_phrases(text, 2);
        assert_eq!(&text[phrases[0].span.0..phrases[0].span.1], "alpha beta");
        assert_eq!(&text[phrases[1].span.0..phrases[1].span.1], "gamma delta");
    }

    #[test]
    fn indices_are_sequential() {
        let phrases = segment_phrases("a b c d e f g h i j", 3);
        for (expected_index, phrase) in phrases.iter().enumerate() {
            assert_eq!(phrase.index, expected_index);
        }
    }

    #[test]
    fn empty_text_yields_no_phrases() {
        assert!(segment_phrases("", 8).is_empty());
        assert!(segment_phrases("   \n\t ", 8).is_empty());
    }

    #[test]
    fn trailing_quote_does_not_hide_sentence_end() {
        assert!(ends_sentence("done.\""));
        assert!(ends_sentence("done!"));
        assert!(!ends_sentence("done,"));
    }
}

//! Paragraph merge pass run before segmentation.
//!
//! Extraction breaks text at layout line boundaries, which do not respect
//! sentences: words get hyphenated across lines, references such as `Fig.`
//! end up separated from their number, and a sentence can be cut at a block
//! boundary. This pass rebuilds paragraphs and guarantees that none exceeds
//! the hard per-chunk cap.
//!
//! Oversized paragraphs are split at sentence boundaries. A boundary is
//! sentence-ending punctuation followed by whitespace and a capital letter or
//! digit, where the word before the punctuation is not a protected
//! abbreviation. `regex` has no look-around, so the pattern only finds
//! candidates and both directions are checked by hand. When no legal boundary
//! exists the simpler `". "`/whitespace rule applies, and as a last resort the
//! text is hard-cut at the cap.

use std::sync::LazyLock;

use regex::Regex;

/// Words after which a period never ends a sentence.
const PROTECTED_ABBREVIATIONS: &[&str] = &[
    "al", "fig", "figs", "eq", "eqs", "tab", "sec", "secs", "ref", "refs", "no", "nos", "vol",
    "pp", "cf", "e.g", "i.e", "vs", "approx", "resp", "dr", "prof", "mr", "mrs", "ms", "st", "ch",
    "app", "thm", "def", "lem", "prop", "eqn", "ca",
];

/// Punctuation a finished paragraph ends with.
const TERMINALS: &[char] = &['.', '?', '!', ':', ';', '。', '？', '！', '：', '；'];

/// Trailing words that expect a number or continuation on the next line.
const HANGING_REFERENCES: &[&str] = &[
    "fig", "figs", "figure", "figures", "eq", "eqs", "eqn", "equation", "equations", "tab",
    "table", "tables", "sec", "section", "sections", "ref", "refs", "no", "al",
];

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("blank line pattern"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["'”’)\]]*\s+"#).expect("sentence end pattern"));

/// Rebuild paragraphs from raw extracted text and bound their size by `hard_cap` chars.
pub fn merge_paragraphs(text: &str, hard_cap: usize) -> Vec<String> {
    let hard_cap = hard_cap.max(1);
    let blocks: Vec<String> = BLANK_LINES
        .split(text)
        .map(join_lines)
        .filter(|b| !b.is_empty())
        .collect();

    let mut paragraphs: Vec<String> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match paragraphs.last_mut() {
            Some(prev) if ends_with_broken_word(prev) && starts_lowercase(&block) => {
                prev.pop();
                prev.push_str(&block);
            }
            Some(prev) if ends_with_hanging_reference(prev) && continues_reference(&block) => {
                prev.push(' ');
                prev.push_str(&block);
            }
            Some(prev) if continues_sentence(prev, &block) => {
                prev.push(' ');
                prev.push_str(&block);
            }
            _ => paragraphs.push(block),
        }
    }

    paragraphs
        .into_iter()
        .flat_map(|p| {
            if char_len(&p) > hard_cap {
                split_oversized(&p, hard_cap)
            } else {
                vec![p]
            }
        })
        .collect()
}

/// Join the wrapped lines of one block.
fn join_lines(block: &str) -> String {
    let mut out = String::with_capacity(block.len());
    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if out.is_empty() {
            out.push_str(line);
        } else if ends_with_broken_word(&out) && starts_lowercase(line) {
            out.pop();
            out.push_str(line);
        } else if out.ends_with('-') {
            // compound split at its own hyphen, e.g. "COVID-" / "19"
            out.push_str(line);
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

fn ends_with_broken_word(text: &str) -> bool {
    let mut rev = text.chars().rev();
    matches!((rev.next(), rev.next()), (Some('-'), Some(c)) if c.is_alphabetic())
}

fn starts_lowercase(text: &str) -> bool {
    text.chars().next().map_or(false, |c| c.is_lowercase())
}

fn ends_with_hanging_reference(text: &str) -> bool {
    let Some(word) = text.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_end_matches('.').to_lowercase();
    HANGING_REFERENCES.contains(&word.as_str())
}

fn continues_reference(text: &str) -> bool {
    text.chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit() || c.is_lowercase() || c == '(' || c == '[')
}

/// Whether `next` carries on a sentence left open at the end of `prev`.
///
/// Standalone marker blocks (`[[...]]`) never join across a block boundary.
fn continues_sentence(prev: &str, next: &str) -> bool {
    if prev.starts_with("[[") || next.starts_with("[[") {
        return false;
    }
    let unfinished = !prev
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | '”' | '’' | ')'))
        .ends_with(TERMINALS);
    unfinished || starts_lowercase(next)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `n`th char, or the end of `text`.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// Split a paragraph longer than `cap` into pieces of at most `cap` chars.
fn split_oversized(paragraph: &str, cap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(paragraph) {
        let len = char_len(sentence);
        if len > cap {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pieces.extend(split_at_simple_boundary(sentence, cap));
            continue;
        }
        let joined_len = if current.is_empty() { len } else { current_len + 1 + len };
        if joined_len > cap {
            pieces.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_len = joined_len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Split `text` into sentences at legal boundaries only.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        let next = text[m.end()..].chars().next();
        let opens_sentence = next.map_or(false, |c| c.is_uppercase() || c.is_ascii_digit());
        if !opens_sentence || is_protected(&text[start..m.start()]) {
            continue;
        }
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Whether the word ending `before` (right before a period) is an abbreviation or initial.
fn is_protected(before: &str) -> bool {
    let word = before
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == '[')
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    if word.is_empty() {
        return false;
    }
    let mut chars = word.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_alphabetic() {
            return true;
        }
    }
    PROTECTED_ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

/// Cut `text` into pieces of at most `cap` chars, preferring `". "` then whitespace.
///
/// Every piece holds at least one char, so a zero cap still terminates.
fn split_at_simple_boundary(text: &str, cap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    let cap = cap.max(1);

    while char_len(rest) > cap {
        let window_end = byte_offset(rest, cap);
        let window = &rest[..window_end];
        let cut = window
            .rfind(". ")
            .map(|i| i + 1)
            .or_else(|| window.rfind(char::is_whitespace))
            .filter(|&i| i > 0)
            .unwrap_or(window_end);
        let (head, tail) = rest.split_at(cut);
        pieces.push(head.trim_end().to_string());
        rest = tail.trim_start();
    }

    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_become_paragraphs() {
        let text = "First line\nwraps here.\n\n\nSecond paragraph.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["First line wraps here.", "Second paragraph."]
        );
    }

    #[test]
    fn test_dehyphenates_wrapped_words() {
        let text = "The experi-\nments show a clear trend. COVID-\n19 cases rose.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["The experiments show a clear trend. COVID-19 cases rose."]
        );
    }

    #[test]
    fn test_hanging_abbreviation_merges_with_next_block() {
        let text = "The architecture is shown in Fig\n\n3 and discussed below.\n\nNext paragraph.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec![
                "The architecture is shown in Fig 3 and discussed below.",
                "Next paragraph."
            ]
        );
    }

    #[test]
    fn test_lowercase_block_continues_sentence() {
        let text = "The results show that\n\nthe model converges quickly.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["The results show that the model converges quickly."]
        );

        // terminal present, but the next block still opens in lowercase
        let text = "We use the Adam optimizer, i.e.\n\nan adaptive method.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["We use the Adam optimizer, i.e. an adaptive method."]
        );
    }

    #[test]
    fn test_missing_terminal_joins_next_block() {
        let text = "Training took three days on\n\nEight GPUs in total.\n\nEvaluation follows.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["Training took three days on Eight GPUs in total.", "Evaluation follows."]
        );

        let text = "综上所述：\n\n模型收敛。\n\n下一段。";
        assert_eq!(merge_paragraphs(text, 1000), vec!["综上所述：", "模型收敛。", "下一段。"]);
    }

    #[test]
    fn test_marker_blocks_stay_apart() {
        let text = "[[ASSET_REF: Table 2]]\n\nwhich lists the results.";
        assert_eq!(
            merge_paragraphs(text, 1000),
            vec!["[[ASSET_REF: Table 2]]", "which lists the results."]
        );
    }

    #[test]
    fn test_zero_cap_still_terminates() {
        assert_eq!(merge_paragraphs("abc", 0), vec!["a", "b", "c"]);
        assert_eq!(split_at_simple_boundary("ab cd", 0), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_broken_word_across_blocks() {
        let text = "a long experi-\n\nment follows.";
        assert_eq!(merge_paragraphs(text, 1000), vec!["a long experiment follows."]);
    }

    #[test]
    fn test_sentences_respect_abbreviations() {
        let text = "As in Fig. 3 the loss drops. Smith et al. Proposed it. See e.g. Table 1. Done.";
        assert_eq!(
            split_sentences(text),
            vec![
                "As in Fig. 3 the loss drops.",
                "Smith et al. Proposed it.",
                "See e.g. Table 1.",
                "Done."
            ]
        );
    }

    #[test]
    fn test_initials_are_protected() {
        let text = "Work by J. Smith is cited. It helps.";
        assert_eq!(
            split_sentences(text),
            vec!["Work by J. Smith is cited.", "It helps."]
        );
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let sentence = "The model converges quickly in Fig. 2 across runs. ";
        let text = sentence.repeat(20);
        let pieces = merge_paragraphs(&text, 200);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 200, "piece too long: {}", piece.len());
            assert!(!piece.ends_with("Fig."));
        }
        let rejoined: String = pieces.join(" ");
        assert_eq!(rejoined, text.trim());
    }

    #[test]
    fn test_unsplittable_text_is_hard_cut() {
        let text = "x".repeat(25);
        let pieces = merge_paragraphs(&text, 10);
        assert_eq!(pieces, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_hard_cut_is_char_safe() {
        let text = "翻".repeat(7);
        let pieces = merge_paragraphs(&text, 3);
        assert_eq!(pieces, vec!["翻翻翻", "翻翻翻", "翻"]);
    }

    #[test]
    fn test_long_sentence_falls_back_to_whitespace() {
        let text = "word ".repeat(10);
        let pieces = merge_paragraphs(&text, 12);
        for piece in &pieces {
            assert!(piece.chars().count() <= 12);
            assert!(!piece.starts_with(' ') && !piece.ends_with(' '));
        }
        assert_eq!(pieces.join(" "), text.trim());
    }
}

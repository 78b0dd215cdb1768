use unicode_normalization::UnicodeNormalization;

/// Normalize chapter text to NFC form with LF line endings and no
/// trailing whitespace on any line.
///
/// Chapters exported from word processors mix precomposed and combining
/// accents (e.g. "Schwann cell", "naïve T cell") and CRLF line endings.
/// Lines that hold only whitespace become empty, so they act as paragraph
/// breaks.
pub fn normalize_text(input: &str) -> String {
    let nfc: String = input.nfc().collect();

    nfc.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split normalized text into paragraphs on blank lines.
///
/// Returns `(paragraph_id, text)` pairs. Ids are 1-based positions among
/// the raw pieces, so an empty piece is skipped but still consumes an id.
pub fn split_paragraphs(text: &str) -> Vec<(u32, &str)> {
    text.trim()
        .split("\n\n")
        .enumerate()
        .filter_map(|(i, para)| {
            let para = para.trim();
            (!para.is_empty()).then_some((i as u32 + 1, para))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_nfc() {
        // i + combining diaeresis -> ï (precomposed)
        let decomposed = "nai\u{0308}ve";
        let result = normalize_text(decomposed);
        assert_eq!(result, "na\u{00ef}ve");
    }

    #[test]
    fn test_crlf_and_trailing_whitespace() {
        let input = "hello   \r\nworld  \r\n";
        let result = normalize_text(input);
        assert_eq!(result, "hello\nworld");
    }

    #[test]
    fn test_split_paragraphs() {
        let text = "First para\nstill first.\n\nSecond.\n\nThird.";
        let paras = split_paragraphs(text);
        assert_eq!(
            paras,
            vec![(1, "First para\nstill first."), (2, "Second."), (3, "Third.")]
        );
    }

    #[test]
    fn test_empty_pieces_consume_ids() {
        let text = "One.\n\n\n\nTwo.";
        let paras = split_paragraphs(text);
        assert_eq!(paras, vec![(1, "One."), (3, "Two.")]);
    }

    #[test]
    fn test_whitespace_only_line_breaks_paragraph() {
        let text = normalize_text("Alpha\n   \nBeta");
        assert_eq!(split_paragraphs(&text), vec![(1, "Alpha"), (2, "Beta")]);
    }
}

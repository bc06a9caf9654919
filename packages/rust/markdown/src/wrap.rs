//! Fixed-width word wrapping for monospaced page output.

/// Tab stops used when expanding tabs.
const TAB_WIDTH: usize = 4;

/// Wrap one source line into chunks of at most `width` characters.
///
/// Leading indentation is kept on the first chunk only; interior runs of
/// whitespace collapse to one space; words longer than `width` are split.
/// A blank line yields a single empty chunk so vertical spacing survives.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let expanded = line.replace('\t', &" ".repeat(TAB_WIDTH));

    if expanded.trim().is_empty() {
        return vec![String::new()];
    }

    let indent_len = expanded.chars().take_while(|c| c.is_whitespace()).count();
    let indent: String = " ".repeat(indent_len.min(width.saturating_sub(1)));

    let mut chunks = Vec::new();
    let mut current = indent;
    let mut current_len = current.chars().count();
    let mut has_word = false;

    for word in expanded.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        loop {
            let sep = usize::from(has_word);
            if current_len + sep + word.len() <= width {
                if has_word {
                    current.push(' ');
                }
                current.extend(word.iter());
                current_len += sep + word.len();
                has_word = true;
                break;
            }

            if has_word {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                has_word = false;
                continue;
            }

            // Word does not fit even on an empty line: hard-split it.
            let room = width - current_len;
            let rest = word.split_off(room);
            current.extend(word.iter());
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
            word = rest;
            if word.is_empty() {
                break;
            }
        }
    }

    if has_word || chunks.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_line_untouched() {
        assert_eq!(wrap_line("- **Prompt 1**: hi", 100), vec!["- **Prompt 1**: hi"]);
    }

    #[test]
    fn blank_line_kept() {
        assert_eq!(wrap_line("   ", 100), vec![""]);
        assert_eq!(wrap_line("", 100), vec![""]);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let chunks = wrap_line("aaa bbb ccc ddd", 7);
        assert_eq!(chunks, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn first_chunk_keeps_indent() {
        let chunks = wrap_line("  - *Example input:* product", 12);
        assert_eq!(chunks[0], "  - *Example");
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert!(!chunks[1].starts_with(' '));
    }

    #[test]
    fn long_words_are_split() {
        let chunks = wrap_line("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn every_chunk_within_width() {
        let line = "word ".repeat(60) + &"x".repeat(250);
        for chunk in wrap_line(&line, 100) {
            assert!(chunk.chars().count() <= 100, "{chunk}");
        }
    }
}

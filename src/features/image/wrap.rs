/// 单张图片最多保留的文本行数，超出部分直接丢弃。
pub const MAX_LINES: usize = 6;

/// 按字符数贪心折行。
///
/// 以空白切分单词，逐词尝试放入当前行：若 `当前行单词总长 + 已有单词数（即空格数）+ 新词长度`
/// 超过 `max_chars`，则先输出当前行再另起一行。长度按 Unicode 标量值计数。
///
/// 注意：
/// - 首个单词本身就超长时，会先输出一个空行（比较发生在空行上），这是既有行为，保持不变；
/// - 结果最多 [`MAX_LINES`] 行，其余内容静默截断。
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut line: Vec<&str> = Vec::new();
    let mut line_chars = 0usize;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if line_chars + line.len() + word_chars > max_chars {
            lines.push(line.join(" "));
            line.clear();
            line_chars = 0;
        }
        line.push(word);
        line_chars += word_chars;
    }
    if !line.is_empty() {
        lines.push(line.join(" "));
    }

    lines.truncate(MAX_LINES);
    lines
}

#[cfg(test)]
mod tests {
    use super::{MAX_LINES, wrap_text};

    #[test]
    fn empty_or_blank_input_yields_no_lines() {
        assert!(wrap_text("", 32).is_empty());
        assert!(wrap_text("   \t\n ", 32).is_empty());
    }

    #[test]
    fn packs_words_greedily_counting_spaces() {
        // "aaa bbb" = 7 字符，正好不超过 7
        assert_eq!(wrap_text("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap_text("aaa bbb ccc", 6), vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(wrap_text("  A \n  cat  ", 32), vec!["A cat"]);
    }

    #[test]
    fn overflow_beyond_six_lines_is_dropped() {
        let text = (0..20).map(|i| format!("word{i:02}")).collect::<Vec<_>>().join(" ");
        let lines = wrap_text(&text, 6);
        assert_eq!(lines.len(), MAX_LINES);
        assert_eq!(lines[0], "word00");
        assert_eq!(lines[5], "word05");
    }

    #[test]
    fn overlong_first_word_emits_leading_empty_line() {
        let lines = wrap_text("abcdefghij k", 4);
        assert_eq!(lines, vec!["", "abcdefghij", "k"]);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 每个汉字 3 字节，但按 1 个字符计
        assert_eq!(wrap_text("你好 世界", 5), vec!["你好 世界"]);
    }
}

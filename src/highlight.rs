use pointer_history_protocol::Range;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A highlighted span confined to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightedRange {
    pub line: usize,
    pub character: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightedString {
    pub value: String,
    pub highlights: Vec<HighlightedRange>,
}

/// Splits bytes into lines on `\n`, dropping a `\r` right before it.
///
/// A trailing newline does not produce a final empty line.
struct LineScanner<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for LineScanner<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        let line = match self.rest.iter().position(|b| *b == b'\n') {
            Some(idx) => {
                let line = &self.rest[..idx];
                self.rest = &self.rest[idx + 1..];
                line
            }
            None => std::mem::take(&mut self.rest),
        };
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

/// Converts a range, which may cross lines, into one highlight per line of
/// `text` that it covers. Empty highlights are omitted.
pub fn range_to_highlights(text: &str, range: &Range) -> Vec<HighlightedRange> {
    let Some(slice) = text.as_bytes().get(range.start.offset..range.end.offset) else {
        debug!(
            start = range.start.offset,
            end = range.end.offset,
            text_len = text.len(),
            "match range outside of text"
        );
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut line_num = range.start.line;
    for line in (LineScanner { rest: slice }) {
        let character = if line_num == range.start.line {
            range.start.column
        } else {
            0
        };

        let length = if line_num == range.end.line {
            range.end.column.saturating_sub(character)
        } else {
            line.len()
        };

        if length > 0 {
            out.push(HighlightedRange {
                line: line_num,
                character,
                length,
            });
        }
        line_num += 1;
    }
    out
}

pub fn ranges_to_highlights(text: &str, ranges: &[Range]) -> Vec<HighlightedRange> {
    ranges
        .iter()
        .flat_map(|r| range_to_highlights(text, r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointer_history_protocol::Location;
    use pretty_assertions::assert_eq;

    fn hl(line: usize, character: usize, length: usize) -> HighlightedRange {
        HighlightedRange {
            line,
            character,
            length,
        }
    }

    #[test]
    fn multi_line_range_in_fenced_diff() {
        let text = "```diff\nfoo\nbar\n```";
        let range = Range::new(Location::new(8, 1, 0), Location::new(15, 2, 3));
        assert_eq!(&text[8..15], "foo\nbar");
        assert_eq!(range_to_highlights(text, &range), vec![hl(1, 0, 3), hl(2, 0, 3)]);
    }

    #[test]
    fn single_line_range_starts_at_column() {
        let text = "hello world";
        let range = Range::new(Location::new(6, 0, 6), Location::new(11, 0, 11));
        assert_eq!(range_to_highlights(text, &range), vec![hl(0, 6, 5)]);
    }

    #[test]
    fn range_starting_mid_line_spans_to_end_line() {
        let text = "ab cd\nefgh\nij kl";
        let range = Range::new(Location::new(3, 0, 3), Location::new(13, 2, 2));
        assert_eq!(
            range_to_highlights(text, &range),
            vec![hl(0, 3, 2), hl(1, 0, 4), hl(2, 0, 2)]
        );
    }

    #[test]
    fn carriage_returns_are_not_highlighted() {
        let text = "foo\r\nbar";
        let range = Range::new(Location::new(0, 0, 0), Location::new(8, 1, 3));
        assert_eq!(range_to_highlights(text, &range), vec![hl(0, 0, 3), hl(1, 0, 3)]);
    }

    #[test]
    fn empty_lines_and_ranges_are_dropped() {
        let text = "foo\n\nbar";
        let range = Range::new(Location::new(0, 0, 0), Location::new(8, 2, 3));
        assert_eq!(range_to_highlights(text, &range), vec![hl(0, 0, 3), hl(2, 0, 3)]);

        let empty = Range::new(Location::new(4, 1, 0), Location::new(4, 1, 0));
        assert!(range_to_highlights(text, &empty).is_empty());
    }

    #[test]
    fn out_of_bounds_range_yields_nothing() {
        let range = Range::new(Location::new(2, 0, 2), Location::new(40, 0, 40));
        assert!(range_to_highlights("short", &range).is_empty());
    }

    #[test]
    fn many_ranges_are_concatenated() {
        let text = "one two three";
        let ranges = [
            Range::new(Location::new(0, 0, 0), Location::new(3, 0, 3)),
            Range::new(Location::new(8, 0, 8), Location::new(13, 0, 13)),
        ];
        assert_eq!(ranges_to_highlights(text, &ranges), vec![hl(0, 0, 3), hl(0, 8, 5)]);
    }
}

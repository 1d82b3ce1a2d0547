//! §4.B Front-matter splitter.

use serde_yaml::Value;

/// Result of splitting a spec file's raw text into its optional
/// structured header and the command body.
pub struct Split {
    pub frontmatter: Value,
    pub body: String,
    /// Number of lines consumed by the front-matter block (0 if absent).
    /// The body parser enumerates body lines starting at
    /// `body_first_line_number + 1` so diagnostics point at the original
    /// file.
    pub body_first_line_number: usize,
}

/// Split `content` into `(frontmatter, body, body_first_line_number)`.
///
/// A front-matter block is three hyphens alone on the first line, a YAML
/// document, then three hyphens alone on a line by themselves. If the
/// first line isn't exactly `---`, or no closing `---` is ever found, the
/// entire stream is treated as the body with an empty front-matter map.
pub fn split(content: &str) -> Split {
    let mut lines: Vec<&str> = content.split('\n').collect();
    // `split('\n')` on "a\nb\n" yields a trailing "", drop it so line
    // counting matches the file's actual line count.
    if lines.last() == Some(&"") {
        lines.pop();
    }

    if lines.first().map(|l| l.trim_end_matches('\r')) != Some("---") {
        return Split {
            frontmatter: Value::Null,
            body: content.to_string(),
            body_first_line_number: 0,
        };
    }

    let closing = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| l.trim_end_matches('\r') == "---")
        .map(|(idx, _)| idx);

    let Some(closing_idx) = closing else {
        return Split {
            frontmatter: Value::Null,
            body: content.to_string(),
            body_first_line_number: 0,
        };
    };

    let frontmatter_text = lines[1..closing_idx].join("\n");
    let frontmatter: Value = if frontmatter_text.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(&frontmatter_text).unwrap_or(Value::Null)
    };

    let body = lines[closing_idx + 1..].join("\n");

    Split {
        frontmatter,
        body,
        body_first_line_number: closing_idx + 1,
    }
}

//! Parsing of RFC822-style control paragraphs.

use crate::{AptRepositoryError, Result};

/// The fields of one control paragraph, in file order.
///
/// Multi-line values keep their continuation lines joined by `\n`, each with
/// the single leading space of the continuation marker removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    fields: Vec<(String, String)>,
}

impl Paragraph {
    /// Parse a single paragraph.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(AptRepositoryError::invalid_package(format!(
                        "Continuation line without a field: {}",
                        line
                    )));
                };
                value.push('\n');
                value.push_str(line[1..].trim_end());
            } else if let Some((field, value)) = line.split_once(':') {
                fields.push((field.trim().to_string(), value.trim().to_string()));
            } else {
                return Err(AptRepositoryError::invalid_package(format!(
                    "Invalid line format: {}",
                    line
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Look up a field, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a file of paragraphs on blank lines.
pub fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Expand a multi-line value for rendering: continuation lines get a single
/// leading space and blank lines become ` .`.
pub fn format_multiline(value: &str) -> String {
    let mut lines = value.split('\n');
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        if line.is_empty() {
            out.push_str(" .");
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let paragraph = Paragraph::parse("Package: foo\nVersion:1.0\n").unwrap();
        assert_eq!(paragraph.get("package"), Some("foo"));
        assert_eq!(paragraph.get("Version"), Some("1.0"));
        assert_eq!(paragraph.get("Missing"), None);
    }

    #[test]
    fn test_parse_continuation() {
        let paragraph = Paragraph::parse(
            "Description: short\n first line\n .\n  indented\nSection: misc\n",
        )
        .unwrap();
        assert_eq!(
            paragraph.get("Description"),
            Some("short\nfirst line\n.\n indented")
        );
        assert_eq!(paragraph.get("Section"), Some("misc"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Paragraph::parse("Package: foo\nnot a field\n").is_err());
        assert!(Paragraph::parse(" leading continuation\n").is_err());
    }

    #[test]
    fn test_split_paragraphs() {
        let paragraphs = split_paragraphs("A: 1\n\n\nB: 2\nC: 3\n\n");
        assert_eq!(paragraphs, vec!["A: 1\n", "B: 2\nC: 3\n"]);
        assert!(split_paragraphs("").is_empty());
    }

    #[test]
    fn test_format_multiline() {
        assert_eq!(format_multiline("short"), "short");
        assert_eq!(
            format_multiline("short\nfirst\n\n indented"),
            "short\n first\n .\n  indented"
        );
    }
}

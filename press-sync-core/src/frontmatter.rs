//! YAML metadata block at the head of a markdown file.
//!
//! The block sits between a first line of `---` and the next `---` line. A file that
//! does not start with `---` has no metadata and its whole text is the body.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, WpError};

const DELIMITER: &str = "---";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub metadata: Map<String, Value>,
    pub body: String,
}

pub fn read(path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path)?;
    split(&text).map_err(|e| match e {
        WpError::Frontmatter(msg) => WpError::Frontmatter(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn split(text: &str) -> Result<Document> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');
    let opening = match lines.next() {
        Some(line) if line.trim_end() == DELIMITER => line,
        _ => {
            return Ok(Document {
                metadata: Map::new(),
                body: text.to_string(),
            })
        }
    };

    let start = opening.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let metadata = parse_block(&text[start..offset])?;
            let body = text[offset + line.len()..].to_string();
            return Ok(Document { metadata, body });
        }
        offset += line.len();
    }
    Err(WpError::Frontmatter("metadata block is not closed".into()))
}

fn parse_block(yaml: &str) -> Result<Map<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value =
        serde_yaml::from_str(yaml).map_err(|e| WpError::Frontmatter(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(WpError::Frontmatter(format!(
            "metadata must be a mapping, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_metadata_from_body() {
        let doc = split("---\ntitle: Hello\ntags: [a, b]\n---\n# Heading\n\nText\n").unwrap();
        assert_eq!(doc.metadata["title"], json!("Hello"));
        assert_eq!(doc.metadata["tags"], json!(["a", "b"]));
        assert_eq!(doc.body, "# Heading\n\nText\n");
    }

    #[test]
    fn dates_stay_strings() {
        let doc = split("---\ndate: 2021-03-04 05:06:07\n---\nbody").unwrap();
        assert_eq!(doc.metadata["date"], json!("2021-03-04 05:06:07"));
    }

    #[test]
    fn no_block_means_whole_text_is_body() {
        let doc = split("Just text\n---\nmore\n").unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, "Just text\n---\nmore\n");
    }

    #[test]
    fn crlf_and_empty_block() {
        let doc = split("---\r\n---\r\nbody\r\n").unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, "body\r\n");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        assert!(matches!(
            split("---\ntitle: x\nbody"),
            Err(WpError::Frontmatter(_))
        ));
    }

    #[test]
    fn non_mapping_block_is_an_error() {
        assert!(matches!(
            split("---\n- a\n- b\n---\n"),
            Err(WpError::Frontmatter(_))
        ));
    }
}

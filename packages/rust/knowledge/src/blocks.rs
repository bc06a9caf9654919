//! Property values and content blocks, and their API JSON shapes.

use serde_json::{Value, json};

use crate::schema::FieldKind;

/// Longest text a single rich-text run may carry.
pub const MAX_TEXT_CHARS: usize = 1900;

/// Most children a single create or append call accepts.
pub const MAX_CHILDREN: usize = 100;

/// A value written to a record property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Select(String),
    Number(i64),
}

impl PropertyValue {
    /// Text shaped for a field of `kind`, or `None` when that kind cannot hold free text.
    pub fn text_for(kind: &FieldKind, text: &str) -> Option<Self> {
        match kind {
            FieldKind::Title => Some(Self::Title(text.to_string())),
            FieldKind::RichText => Some(Self::RichText(text.to_string())),
            FieldKind::Select => Some(Self::Select(text.to_string())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Title(text) => json!({ "title": [{ "type": "text", "text": { "content": text } }] }),
            Self::RichText(text) => {
                json!({ "rich_text": [{ "type": "text", "text": { "content": text } }] })
            }
            Self::Select(name) => json!({ "select": { "name": name } }),
            Self::Number(n) => json!({ "number": n }),
        }
    }
}

/// Named property values in write order.
pub type Properties = Vec<(String, PropertyValue)>;

pub(crate) fn properties_json(properties: &[(String, PropertyValue)]) -> Value {
    let map = properties
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}

/// A page content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading2(String),
    /// Bulleted item linking to `url`; a plain item when `url` is empty.
    BulletedLink { text: String, url: String },
    Paragraph(String),
}

impl Block {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Heading2(text) => block("heading_2", rich_text(text, None)),
            Self::BulletedLink { text, url } => {
                let link = (!url.is_empty()).then_some(url.as_str());
                block("bulleted_list_item", rich_text(text, link))
            }
            Self::Paragraph(text) => block("paragraph", rich_text(text, None)),
        }
    }
}

fn rich_text(content: &str, link: Option<&str>) -> Value {
    let text = match link {
        Some(url) => json!({ "content": content, "link": { "url": url } }),
        None => json!({ "content": content }),
    };
    json!([{ "type": "text", "text": text }])
}

fn block(kind: &str, rich_text: Value) -> Value {
    json!({
        "object": "block",
        "type": kind,
        kind: { "rich_text": rich_text },
    })
}

pub(crate) fn blocks_json(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(Block::to_json).collect())
}

/// Split text into paragraph blocks of at most [`MAX_TEXT_CHARS`] characters,
/// keeping at most [`MAX_CHILDREN`] blocks. Breaks at a newline when one
/// falls in the second half of a chunk.
pub fn paragraphs(text: &str) -> Vec<Block> {
    let chars: Vec<char> = text.trim().chars().collect();
    let mut blocks = Vec::new();
    let mut start = 0;

    while start < chars.len() && blocks.len() < MAX_CHILDREN {
        let mut end = (start + MAX_TEXT_CHARS).min(chars.len());
        if end < chars.len() {
            if let Some(nl) = chars[start..end].iter().rposition(|c| *c == '\n') {
                if nl >= MAX_TEXT_CHARS / 2 {
                    end = start + nl + 1;
                }
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim_end_matches('\n');
        if !chunk.is_empty() {
            blocks.push(Block::Paragraph(chunk.to_string()));
        }
        start = end;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_follows_field_kind() {
        assert_eq!(
            PropertyValue::text_for(&FieldKind::RichText, "Week 7").map(|v| v.to_json()),
            Some(json!({ "rich_text": [{ "type": "text", "text": { "content": "Week 7" } }] }))
        );
        assert_eq!(
            PropertyValue::text_for(&FieldKind::Title, "Week 7"),
            Some(PropertyValue::Title("Week 7".into()))
        );
        assert!(PropertyValue::text_for(&FieldKind::Number, "Week 7").is_none());
        assert!(PropertyValue::text_for(&FieldKind::Date, "Week 7").is_none());
    }

    #[test]
    fn property_shapes() {
        assert_eq!(
            PropertyValue::Select("Published".into()).to_json(),
            json!({ "select": { "name": "Published" } })
        );
        assert_eq!(PropertyValue::Number(39).to_json(), json!({ "number": 39 }));
        assert_eq!(
            PropertyValue::Title("T".into()).to_json()["title"][0]["text"]["content"],
            "T"
        );
    }

    #[test]
    fn link_items_carry_urls_only_when_present() {
        let linked = Block::BulletedLink {
            text: "PDF pack".into(),
            url: "https://example.com/a.pdf".into(),
        }
        .to_json();
        assert_eq!(linked["type"], "bulleted_list_item");
        assert_eq!(
            linked["bulleted_list_item"]["rich_text"][0]["text"]["link"]["url"],
            "https://example.com/a.pdf"
        );

        let plain = Block::BulletedLink {
            text: "PDF pack".into(),
            url: String::new(),
        }
        .to_json();
        assert!(plain["bulleted_list_item"]["rich_text"][0]["text"].get("link").is_none());
    }

    #[test]
    fn heading_shape() {
        let h = Block::Heading2("Week 07 (2025)".into()).to_json();
        assert_eq!(h["object"], "block");
        assert_eq!(h["heading_2"]["rich_text"][0]["text"]["content"], "Week 07 (2025)");
    }

    #[test]
    fn short_text_is_one_paragraph() {
        assert_eq!(paragraphs("# Hi\n\nBody"), vec![Block::Paragraph("# Hi\n\nBody".into())]);
        assert!(paragraphs("   ").is_empty());
    }

    #[test]
    fn long_text_is_chunked_within_limits() {
        let text = "lorem ipsum dolor\n".repeat(400);
        let blocks = paragraphs(&text);
        assert!(blocks.len() > 1);
        for b in &blocks {
            let Block::Paragraph(p) = b else { panic!("not a paragraph") };
            assert!(p.chars().count() <= MAX_TEXT_CHARS);
        }
    }

    #[test]
    fn block_count_is_capped() {
        let text = "x".repeat(MAX_TEXT_CHARS * (MAX_CHILDREN + 5));
        assert_eq!(paragraphs(&text).len(), MAX_CHILDREN);
    }
}

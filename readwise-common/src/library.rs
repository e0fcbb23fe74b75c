use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default)]
    pub num_highlights: i64,
    pub last_highlight_at: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub cover_image_url: Option<String>,
    pub highlights_url: Option<String>,
    pub source_url: Option<String>,
    pub asin: Option<String>,
    #[serde(default)]
    pub tags: Vec<crate::Tag>,
}

impl Book {
    /// The author as displayed in object names and templates; empty when unknown.
    pub fn author_or_empty(&self) -> &str {
        self.author.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
    pub location: Option<i64>,
    pub location_type: Option<String>,
    pub highlighted_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    pub updated: Option<DateTime<Utc>>,
    pub book_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<crate::Tag>,
}

impl Highlight {
    pub fn has_note(&self) -> bool {
        !self.note.is_empty()
    }
}

/// Readwise sends `null` for some string fields it documents as text.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_book_with_nulls() {
        let book: Book = serde_json::from_value(serde_json::json!({
            "id": 7,
            "title": "Thinking in Systems",
            "author": null,
            "category": "books",
            "source": "kindle",
            "num_highlights": 3,
            "last_highlight_at": "2024-03-01T10:00:00Z",
            "updated": null,
            "cover_image_url": null,
            "highlights_url": "https://readwise.io/bookreview/7",
            "source_url": null,
            "asin": "B005VSRFEA",
            "tags": [{"id": 1, "name": "systems"}]
        }))
        .unwrap();

        assert_eq!(book.id, 7);
        assert_eq!(book.author_or_empty(), "");
        assert_eq!(book.tags[0].name, "systems");
        assert!(book.last_highlight_at.is_some());
    }

    #[test]
    fn empty_note_is_absent() {
        let highlight: Highlight = serde_json::from_value(serde_json::json!({
            "id": 1,
            "text": "A stock is the foundation of any system.",
            "note": "",
            "location": 12,
            "location_type": "location",
            "color": "yellow",
            "book_id": 7
        }))
        .unwrap();

        assert!(!highlight.has_note());
        assert!(highlight.tags.is_empty());
    }

    #[test]
    fn null_strings_decode_as_empty() {
        let book: Book = serde_json::from_value(serde_json::json!({
            "id": 8,
            "title": "Untitled clipping",
            "author": null,
            "category": null,
            "source": null,
            "num_highlights": 1
        }))
        .unwrap();

        assert_eq!(book.category, "");
        assert_eq!(book.source, "");

        let highlight: Highlight = serde_json::from_value(serde_json::json!({
            "id": 2,
            "text": "Flows change stocks.",
            "note": null,
            "location": null,
            "color": null,
            "book_id": 8
        }))
        .unwrap();

        assert!(!highlight.has_note());
        assert_eq!(highlight.color, "");
    }
}

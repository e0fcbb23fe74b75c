pub mod api;
pub mod library;
pub mod readwise;

// Re-export commonly used types
pub use api::ApiError;
pub use library::{Book, Highlight};
pub use readwise::{BookSource, Readwise};

// Tag definition shared by books and highlights
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

//! Inbound publish payload types.
//!
//! Shape of the "post published" webhook body as the publishing platform
//! delivers it: the post proper nested under `post.current`. Everything
//! except the id and the primary author is optional on the wire.

use serde::{Deserialize, Serialize};

/// Top-level publish webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishPayload {
    pub post: PostEnvelope,
}

/// Wrapper holding the current revision of the published post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEnvelope {
    pub current: PostContent,
}

/// The published post as the platform reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostContent {
    /// Stable post identifier
    pub id: String,
    /// Public URL of the article
    #[serde(default)]
    pub url: String,
    /// Publication timestamp, passed through as the platform's string
    #[serde(default)]
    pub published_at: String,
    /// Article title
    #[serde(default)]
    pub title: String,
    /// Rendered HTML body
    #[serde(default)]
    pub html: String,
    /// Excerpt written by the author, if any
    #[serde(default)]
    pub custom_excerpt: Option<String>,
    /// Excerpt generated by the platform, if any
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Plaintext rendition of the body
    #[serde(default)]
    pub plaintext: String,
    /// Feature image URL
    #[serde(default)]
    pub feature_image: Option<String>,
    /// Feature image caption
    #[serde(default)]
    pub feature_image_caption: Option<String>,
    /// The post's primary author
    pub primary_author: Author,
    /// All authors, primary included
    #[serde(default)]
    pub authors: Vec<Author>,
}

/// Author identity as reported by the publishing platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_payload() {
        let json = r#"{
            "post": {
                "current": {
                    "id": "5f3c2b1a9d8e7f6a5b4c3d2e",
                    "url": "https://blog.example.com/hello-world/",
                    "published_at": "2024-03-01T09:30:00.000Z",
                    "title": "Hello World",
                    "html": "<p>First post.</p>",
                    "custom_excerpt": "A short hello.",
                    "excerpt": "First post.",
                    "plaintext": "First post.",
                    "feature_image": "https://blog.example.com/content/images/hello.jpg",
                    "feature_image_caption": "Sunrise",
                    "primary_author": {"id": "a1", "name": "Alice"},
                    "authors": [
                        {"id": "a1", "name": "Alice"},
                        {"id": "a2", "name": "Bob"}
                    ]
                }
            }
        }"#;

        let payload: PublishPayload = serde_json::from_str(json).unwrap();
        let post = &payload.post.current;

        assert_eq!(post.id, "5f3c2b1a9d8e7f6a5b4c3d2e");
        assert_eq!(post.title, "Hello World");
        assert_eq!(post.custom_excerpt.as_deref(), Some("A short hello."));
        assert_eq!(post.primary_author.name, "Alice");
        assert_eq!(post.authors.len(), 2);
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let json = r#"{
            "post": {
                "current": {
                    "id": "abc123",
                    "primary_author": {"id": "a1", "name": "Alice"}
                }
            }
        }"#;

        let payload: PublishPayload = serde_json::from_str(json).unwrap();
        let post = &payload.post.current;

        assert_eq!(post.id, "abc123");
        assert_eq!(post.url, "");
        assert_eq!(post.custom_excerpt, None);
        assert!(post.authors.is_empty());
    }

    #[test]
    fn test_author_name_defaults_empty() {
        let author: Author = serde_json::from_str(r#"{"id": "a9"}"#).unwrap();
        assert_eq!(author.id, "a9");
        assert_eq!(author.name, "");
    }
}

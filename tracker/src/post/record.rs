//! Post records: the in-flight draft and the persisted projection.
//!
//! A published post arrives with its full body, but only identity and
//! tracking aggregates survive a send. [`PostDraft`] carries the complete
//! field set the send pipeline renders from; [`PostRecord`] is the minimal
//! projection written to storage. Keeping them as two types means a
//! reloaded record can never masquerade as a sendable draft.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stats::DeliveryStats;
use crate::store::Store;

use super::payload::{Author, PublishPayload};

/// Characters of plaintext used when no excerpt is provided.
const EXCERPT_FALLBACK_CHARS: usize = 75;

/// Full in-flight post built from a publish payload.
///
/// Everything the send pipeline needs to render and dispatch the
/// newsletter; none of the body fields are persisted.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub id: String,
    pub url: String,
    pub date: String,
    pub title: String,
    pub html: String,
    pub excerpt: String,
    pub feature_image: Option<String>,
    pub feature_image_caption: Option<String>,
    pub primary_author: String,
    pub co_authors: String,
}

impl PostDraft {
    /// Build a draft from an inbound publish payload.
    pub fn make(payload: &PublishPayload) -> Self {
        let post = &payload.post.current;

        let excerpt = derive_excerpt(
            post.custom_excerpt.as_deref(),
            post.excerpt.as_deref(),
            &post.plaintext,
        );
        let co_authors = join_co_authors(&post.authors, &post.primary_author.id);

        info!(
            post_id = %post.id,
            title = %post.title,
            excerpt_length = excerpt.len(),
            has_co_authors = !co_authors.is_empty(),
            "post_draft_built"
        );

        Self {
            id: post.id.clone(),
            url: post.url.clone(),
            date: post.published_at.clone(),
            title: post.title.clone(),
            html: post.html.clone(),
            excerpt,
            feature_image: post.feature_image.clone(),
            feature_image_caption: post.feature_image_caption.clone(),
            primary_author: post.primary_author.name.clone(),
            co_authors,
        }
    }

    /// Project to the persisted subset, seeding stats for a send to
    /// `emails_sent` recipients.
    pub fn into_record(self, emails_sent: u64) -> PostRecord {
        PostRecord {
            id: self.id,
            url: self.url,
            date: self.date,
            title: self.title,
            author: self.primary_author,
            stats: DeliveryStats::new(emails_sent),
        }
    }
}

/// Excerpt fallback order: author's custom excerpt, then the platform's
/// excerpt, then the leading characters of the plaintext body.
fn derive_excerpt(custom: Option<&str>, provided: Option<&str>, plaintext: &str) -> String {
    if let Some(custom) = custom.filter(|s| !s.is_empty()) {
        return custom.to_string();
    }
    if let Some(provided) = provided.filter(|s| !s.is_empty()) {
        return provided.to_string();
    }
    plaintext.chars().take(EXCERPT_FALLBACK_CHARS).collect()
}

/// Join display names of every author except the primary.
///
/// Exclusion is by author id, not display name, so a co-author who happens
/// to share the primary's name is kept.
fn join_co_authors(authors: &[Author], primary_id: &str) -> String {
    authors
        .iter()
        .filter(|author| author.id != primary_id)
        .map(|author| author.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persisted projection of a post: identity plus tracking aggregates.
///
/// This is the exact shape at rest. Body fields from the draft are gone
/// once the send completes; a record reloaded from storage carries only
/// what is listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub url: String,
    pub date: String,
    pub title: String,
    pub author: String,
    pub stats: DeliveryStats,
}

impl PostRecord {
    /// Persist the record for the first time.
    ///
    /// Returns `false`, without panicking, when the store already holds
    /// this id or the write fails; the publish pipeline decides whether to
    /// retry the whole send.
    pub fn save<S: Store>(&self, store: &S) -> bool {
        match store.create(self, false) {
            Ok(true) => {
                info!(
                    post_id = %self.id,
                    emails_sent = self.stats.emails_sent,
                    "post_record_saved"
                );
                true
            }
            Ok(false) => {
                warn!(post_id = %self.id, "post_record_duplicate_id");
                false
            }
            Err(e) => {
                warn!(post_id = %self.id, error = %e, "post_record_save_failed");
                false
            }
        }
    }

    /// Persist an overwrite of an existing record.
    ///
    /// Used both for content corrections and for stats writes.
    pub fn update<S: Store>(&self, store: &S) -> bool {
        match store.create(self, true) {
            Ok(_) => {
                info!(post_id = %self.id, "post_record_updated");
                true
            }
            Err(e) => {
                warn!(post_id = %self.id, error = %e, "post_record_update_failed");
                false
            }
        }
    }
}

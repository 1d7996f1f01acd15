//! Post payloads and records.
//!
//! ## Processing Flow
//!
//! ```text
//! PublishPayload → PostDraft::make() → into_record() → Store
//! ```

pub mod payload;
pub mod record;

pub use payload::{Author, PostContent, PostEnvelope, PublishPayload};
pub use record::{PostDraft, PostRecord};

//! Collaborators at the system boundary.

use crate::{ContentItem, DraftReply, GenerationRequest};
use async_trait::async_trait;
use vigil_error::{FeedError, GeneratorError};

/// Upstream social feed.
///
/// Implementations own authentication and transport; Vigil only consumes
/// the returned items. Rate-limit refusals must be reported as
/// [`vigil_error::FeedErrorKind::RateLimited`] so the admission layer can
/// back off.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Most recent posts of an account.
    async fn user_timeline(
        &self,
        account: &str,
        max_results: u32,
    ) -> Result<Vec<ContentItem>, FeedError>;

    /// Recent posts matching a keyword.
    async fn search(&self, keyword: &str, max_results: u32)
    -> Result<Vec<ContentItem>, FeedError>;
}

/// Downstream reply drafting.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Draft a reply for the given post.
    async fn generate(&self, request: &GenerationRequest) -> Result<DraftReply, GeneratorError>;
}

//! Content delivered by the upstream feed.

use serde::{Deserialize, Serialize};

/// Engagement counters of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Engagement {
    /// Repost count
    #[serde(default)]
    pub retweets: u64,
    /// Like count
    #[serde(default)]
    pub likes: u64,
    /// Reply count
    #[serde(default)]
    pub replies: u64,
}

impl Engagement {
    /// Reposts plus likes.
    pub fn reactions(&self) -> u64 {
        self.retweets.saturating_add(self.likes)
    }
}

/// A post as returned by the feed.
///
/// `created_at` is kept as the raw string the feed produced; interpretation
/// happens at evaluation time.
///
/// # Examples
///
/// ```
/// use vigil_core::{ContentItem, Engagement};
///
/// let item = ContentItem {
///     id: "1790000000000000001".to_string(),
///     text: "Uniswap v4 hooks are live".to_string(),
///     author: "dabit3".to_string(),
///     created_at: "2024-05-13T10:00:00Z".to_string(),
///     engagement: Engagement { retweets: 12, likes: 40, replies: 3 },
/// };
///
/// assert_eq!(item.engagement.reactions(), 52);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Platform identifier
    pub id: String,
    /// Post body
    pub text: String,
    /// Author handle
    pub author: String,
    /// Creation timestamp as delivered
    #[serde(default)]
    pub created_at: String,
    /// Engagement counters
    #[serde(default)]
    pub engagement: Engagement,
}

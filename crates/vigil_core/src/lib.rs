//! Core data types for the Vigil admission and monitoring library.
//!
//! This crate provides the types shared by every Vigil component: endpoint
//! identifiers, feed content, opportunity records, the injectable clock and
//! the traits implemented by the collaborators at the system boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod clock;
mod content;
mod endpoint;
mod generation;
mod opportunity;
mod traits;
mod zone;

pub use account::{AccountTier, AccountTierMap};
pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{ContentItem, Engagement};
pub use endpoint::{EndpointClass, EndpointId};
pub use generation::{DraftReply, GenerationRequest};
pub use opportunity::{EnrichedOpportunity, OpportunityRecord, OpportunityRecordBuilder};
pub use traits::{FeedClient, ReplyGenerator};
pub use zone::{LocalZone, add_duration, remaining_secs};

//! Priority ordering of deferred requests.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use vigil_cache::RequestParams;
use vigil_core::EndpointId;

/// Most urgent priority.
pub const HIGHEST_PRIORITY: u8 = 1;
/// Least urgent priority.
pub const LOWEST_PRIORITY: u8 = 5;

/// A request waiting for admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct PriorityRequest {
    /// Queue-assigned identifier
    id: u64,
    /// Target endpoint
    endpoint: EndpointId,
    /// Request parameters
    params: RequestParams,
    /// 1 (most urgent) to 5
    priority: u8,
    /// Earliest time to try
    scheduled_at: DateTime<Utc>,
    /// Failed attempts so far
    retry_count: u32,
}

impl PriorityRequest {
    fn sort_key(&self) -> (u8, DateTime<Utc>, u64) {
        (self.priority, self.scheduled_at, self.id)
    }

    /// Due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

/// Deferred requests ordered by (priority, scheduled time).
///
/// Arrival order breaks ties.
///
/// # Examples
///
/// ```
/// use vigil_rate_limit::PendingQueue;
/// use vigil_core::EndpointId;
/// use std::collections::HashMap;
///
/// let now = chrono::Utc::now();
/// let mut queue = PendingQueue::new();
/// let endpoint = EndpointId::from("search_tweets");
/// let later = queue.push(endpoint.clone(), HashMap::new(), 4, now);
/// let urgent = queue.push(endpoint.clone(), HashMap::new(), 1, now);
///
/// assert!(queue.is_next_due(urgent, now));
/// assert!(!queue.is_next_due(later, now));
/// ```
#[derive(Debug, Default)]
pub struct PendingQueue {
    requests: Vec<PriorityRequest>,
    next_id: u64,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request and return its id.
    ///
    /// Priorities outside 1..=5 are clamped.
    pub fn push(
        &mut self,
        endpoint: EndpointId,
        params: RequestParams,
        priority: u8,
        scheduled_at: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.insert(PriorityRequest {
            id,
            endpoint,
            params,
            priority: priority.clamp(HIGHEST_PRIORITY, LOWEST_PRIORITY),
            scheduled_at,
            retry_count: 0,
        });
        id
    }

    fn insert(&mut self, request: PriorityRequest) {
        let key = request.sort_key();
        let at = self
            .requests
            .partition_point(|existing| existing.sort_key() < key);
        self.requests.insert(at, request);
    }

    /// Request with `id`.
    pub fn get(&self, id: u64) -> Option<&PriorityRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Take the request with `id` out of the queue.
    pub fn remove(&mut self, id: u64) -> Option<PriorityRequest> {
        let index = self.requests.iter().position(|r| r.id == id)?;
        Some(self.requests.remove(index))
    }

    /// Move a request to a new time with a new retry count.
    ///
    /// Returns `false` when no such request is queued.
    pub fn reschedule(&mut self, id: u64, scheduled_at: DateTime<Utc>, retry_count: u32) -> bool {
        let Some(mut request) = self.remove(id) else {
            return false;
        };
        request.scheduled_at = scheduled_at;
        request.retry_count = retry_count;
        self.insert(request);
        true
    }

    /// True when request `id` is due and no other due request for the same
    /// endpoint sorts ahead of it.
    pub fn is_next_due(&self, id: u64, now: DateTime<Utc>) -> bool {
        let Some(request) = self.get(id) else {
            return false;
        };
        if !request.is_due(now) {
            return false;
        }
        self.requests
            .iter()
            .filter(|other| other.endpoint == request.endpoint && other.is_due(now))
            .map(PriorityRequest::sort_key)
            .min()
            .is_some_and(|head| head == request.sort_key())
    }

    /// Requests in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &PriorityRequest> {
        self.requests.iter()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_715_594_400 + secs, 0).unwrap()
    }

    #[test]
    fn orders_by_priority_then_time() {
        let mut queue = PendingQueue::new();
        let endpoint = EndpointId::from("user_timeline");
        let a = queue.push(endpoint.clone(), HashMap::new(), 3, at(60));
        let b = queue.push(endpoint.clone(), HashMap::new(), 3, at(0));
        let c = queue.push(endpoint.clone(), HashMap::new(), 1, at(120));
        let order: Vec<u64> = queue.iter().map(|r| *r.id()).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn priority_is_clamped() {
        let mut queue = PendingQueue::new();
        let id = queue.push(EndpointId::from("x"), HashMap::new(), 9, at(0));
        assert_eq!(*queue.get(id).unwrap().priority(), LOWEST_PRIORITY);
        let id = queue.push(EndpointId::from("x"), HashMap::new(), 0, at(0));
        assert_eq!(*queue.get(id).unwrap().priority(), HIGHEST_PRIORITY);
    }

    #[test]
    fn not_yet_due_request_does_not_block_others() {
        let mut queue = PendingQueue::new();
        let endpoint = EndpointId::from("search_tweets");
        let urgent_later = queue.push(endpoint.clone(), HashMap::new(), 1, at(300));
        let relaxed_now = queue.push(endpoint.clone(), HashMap::new(), 5, at(0));
        assert!(queue.is_next_due(relaxed_now, at(10)));
        assert!(!queue.is_next_due(urgent_later, at(10)));
        assert!(queue.is_next_due(urgent_later, at(300)));
        assert!(!queue.is_next_due(relaxed_now, at(300)));
    }

    #[test]
    fn other_endpoints_do_not_compete() {
        let mut queue = PendingQueue::new();
        queue.push(EndpointId::from("a"), HashMap::new(), 1, at(0));
        let b = queue.push(EndpointId::from("b"), HashMap::new(), 5, at(0));
        assert!(queue.is_next_due(b, at(0)));
    }

    #[test]
    fn reschedule_updates_retry_and_position() {
        let mut queue = PendingQueue::new();
        let endpoint = EndpointId::from("a");
        let first = queue.push(endpoint.clone(), HashMap::new(), 2, at(0));
        let second = queue.push(endpoint.clone(), HashMap::new(), 2, at(10));
        assert!(queue.reschedule(first, at(120), 1));
        assert_eq!(*queue.get(first).unwrap().retry_count(), 1);
        assert!(queue.is_next_due(second, at(60)));
        assert!(!queue.reschedule(99, at(0), 0));
        assert_eq!(queue.remove(first).map(|r| r.retry_count), Some(1));
        assert_eq!(queue.len(), 1);
    }
}

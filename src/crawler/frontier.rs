//! Frontier queue
//!
//! Holds every URL that is Pending or InFlight. Completed and Failed URLs
//! belong to the tracker; the frontier consults it on every insertion so a
//! URL never sits in both places.

use crate::state::TrackedState;
use crate::storage::{CandidateFile, UrlTracker};
use crate::url::CanonicalUrl;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// FIFO queue of pending URLs plus the set currently being fetched
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CanonicalUrl>,
    pending: HashSet<CanonicalUrl>,
    in_flight: HashSet<CanonicalUrl>,
    candidates: Option<CandidateFile>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frontier from stored candidates, keeping their order
    ///
    /// Tracked URLs and duplicates are dropped.
    pub fn seeded<I>(candidates: I, tracker: &UrlTracker) -> Self
    where
        I: IntoIterator<Item = CanonicalUrl>,
    {
        let mut frontier = Self::new();
        for url in candidates {
            if tracker.is_tracked(&url) || frontier.pending.contains(&url) {
                continue;
            }
            frontier.pending.insert(url.clone());
            frontier.queue.push_back(url);
        }
        frontier
    }

    /// Persists every newly accepted URL to `file`
    pub fn with_candidate_file(mut self, file: CandidateFile) -> Self {
        self.candidates = Some(file);
        self
    }

    /// Adds URLs that are not already pending, in flight or tracked
    ///
    /// New URLs join the back of the queue in sorted order. Returns how
    /// many were added.
    pub fn enqueue<I>(&mut self, urls: I, tracker: &UrlTracker) -> usize
    where
        I: IntoIterator<Item = CanonicalUrl>,
    {
        let fresh: BTreeSet<CanonicalUrl> = urls
            .into_iter()
            .filter(|url| {
                !self.pending.contains(url)
                    && !self.in_flight.contains(url)
                    && !tracker.is_tracked(url)
            })
            .collect();

        if fresh.is_empty() {
            return 0;
        }

        let added: Vec<CanonicalUrl> = fresh.into_iter().collect();
        for url in &added {
            self.pending.insert(url.clone());
            self.queue.push_back(url.clone());
        }

        if let Some(file) = &self.candidates {
            if let Err(e) = file.append(&added) {
                tracing::warn!(
                    "Failed to record {} new candidates in {}: {}",
                    added.len(),
                    file.path().display(),
                    e
                );
            }
        }

        tracing::debug!("Enqueued {} new URLs ({} pending)", added.len(), self.len());
        added.len()
    }

    /// Removes up to `n` URLs from the front and marks them in flight
    pub fn dequeue_batch(&mut self, n: usize) -> Vec<CanonicalUrl> {
        let take = n.min(self.queue.len());
        let batch: Vec<CanonicalUrl> = self.queue.drain(..take).collect();
        for url in &batch {
            self.pending.remove(url);
            self.in_flight.insert(url.clone());
        }
        batch
    }

    /// Releases an in-flight URL whose worker reached `outcome`
    pub fn settle(&mut self, url: &CanonicalUrl, outcome: TrackedState) -> crate::Result<()> {
        let from = self.state_of(url).unwrap_or(outcome);
        from.transition(outcome)?;
        self.in_flight.remove(url);
        Ok(())
    }

    /// Drops an in-flight URL without a terminal state
    ///
    /// Used when its worker died. The URL stays in the candidate file, so
    /// the next run picks it up again.
    pub fn release(&mut self, url: &CanonicalUrl) -> bool {
        self.in_flight.remove(url)
    }

    /// Returns true if no URL is waiting for dispatch
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of pending URLs
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Pending or InFlight, or None if the frontier does not hold the URL
    pub fn state_of(&self, url: &CanonicalUrl) -> Option<TrackedState> {
        if self.in_flight.contains(url) {
            Some(TrackedState::InFlight)
        } else if self.pending.contains(url) {
            Some(TrackedState::Pending)
        } else {
            None
        }
    }
}

//! URL handling module for Quill-Harvest
//!
//! This module provides URL canonicalization (the dedup key used by the
//! tracker and the frontier), host wildcard matching and the site link
//! predicate that decides which discovered links become candidates.

mod matcher;
mod normalize;

pub use matcher::{matches_wildcard, LinkPattern};
pub use normalize::{canonicalize, CanonicalUrl};

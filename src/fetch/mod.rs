//! Outbound URL fetching with server-side request forgery protection.
//!
//! [`UrlGuard`] decides whether a URL may be requested at all, including the
//! addresses its host resolves to. [`GuardedFetcher`] issues the request
//! pinned to those vetted addresses, re-vets every redirect hop, caps the
//! body, and optionally strips active content from HTML.

pub mod client;
pub mod guard;
pub mod sanitize;

pub use client::{FetchOutcome, GuardedFetcher};
pub use guard::{Resolver, SystemResolver, UrlGuard, VettedTarget, is_public_ip};
pub use sanitize::strip_active_content;

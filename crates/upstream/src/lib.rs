//! Upstream HTTP execution for the Marketplace gateway.
//!
//! This crate knows nothing about tenants, resources or tools. It takes a fully-resolved
//! [`UpstreamRequestDescriptor`] and executes it over a shared connection pool, applying:
//! - outbound safety checks ([`safety`])
//! - per-attempt timeouts and a bounded retry policy ([`retry`])
//! - response size limits and JSON decoding
//! - pagination metadata extraction ([`pagination`])

pub mod client;
pub mod error;
pub mod pagination;
pub mod retry;
pub mod safety;

pub use client::{UpstreamClient, UpstreamRequestDescriptor, UpstreamResponse};
pub use error::{Result, UpstreamError};
pub use pagination::PaginationMeta;
pub use retry::RetryPolicy;
pub use safety::OutboundHttpSafety;

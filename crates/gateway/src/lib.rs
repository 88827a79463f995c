//! Multi-tenant MCP gateway for the Marketplace API.
//!
//! Each tool call carries its own tenant credential and endpoint in request metadata. The
//! gateway resolves them, translates an abstract `resource + filter + pagination` request
//! into an upstream call, executes it with retry/backoff, and serves a process-wide
//! documentation cache next to the tenant-scoped data queries.

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod docs;
pub mod error;
pub mod gateway;
pub mod http;
pub mod quick_queries;
pub mod telemetry;
pub mod tenant;
pub mod tools;
pub mod translator;

pub use catalog::{Catalog, ResourceDefinition};
pub use docs::{DocsCache, DocsFilter};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{Gateway, QueryResult};
pub use tenant::{RequestMetadata, TenantContext, TenantResolver};
pub use translator::QueryRequest;

/// Client SDK for the modelgate gateway.
///
/// Provides a generic HTTP client with retry-with-backoff, concurrent bulk
/// operations, infinite-scroll cursoring, typed per-entity conveniences and
/// a deterministic mock mode for offline development.
pub mod client;
/// Typed veneers for well-known entity families.
pub mod entities;
/// Offline mock backend.
pub mod mock;
/// Retry-with-backoff policy.
pub mod retry;

pub use client::{BulkFailure, BulkReport, Client, ClientConfig, ScrollPage};
pub use entities::{Employee, EmployeeApi, Lead, LeadApi};
pub use mock::MockConfig;
pub use retry::RetryPolicy;

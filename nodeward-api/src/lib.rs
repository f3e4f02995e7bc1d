// nodeward API Library
//
// HTTP surface over the cluster health checks

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};

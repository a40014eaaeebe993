//! HTTP API handlers
//!
//! Everything except the service descriptor and the docs page is mounted
//! under `/api`.

pub mod docs;
pub mod health;
pub mod root;
pub mod tasks;
pub mod upload;

pub use docs::docs_routes;
pub use health::health_routes;
pub use root::root_routes;
pub use tasks::task_routes;
pub use upload::upload_routes;

pub mod builder;
pub mod handler;
pub mod lifecycle;
pub mod listener;

pub use builder::{HttpTimeouts, ServerBuilder};
pub use handler::{HandlerError, HealthHandler};
pub use lifecycle::HealthServer;

//! HTTP surface and background expiry sweeper for the Convo memory service.

mod api;
mod bootstrap;
mod error;
mod router;
mod server;
mod sweeper;

pub use bootstrap::{limits_from_config, manager_from_config};
pub use error::ApiError;
pub use router::build_router;
pub use server::MemoryServer;
pub use sweeper::spawn_sweeper;

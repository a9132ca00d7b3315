mod backoff;
pub mod expiry;
mod scheduler;
mod session_manager;
mod session_registry;
mod token_store_fake;

pub use backoff::*;
pub use scheduler::*;
pub use session_manager::*;
pub use session_registry::*;
pub use token_store_fake::*;

mod client;
mod session;
mod user;

pub use client::*;
pub use session::*;
pub use user::*;

mod gotrue_token_store;
mod provider_session;

pub use gotrue_token_store::*;
pub use provider_session::*;

//! Settings are read from a TOML file chosen by `--settings`, or the
//! per-profile default. See `bin/settings_demo.rs` for a quick check.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

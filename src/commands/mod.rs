//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `create` - Build a Raspberry Pi image
//! - `customize` - Post-boot cleanup on a running device
//! - `preflight` - Run preflight checks
//! - `show` - Display configuration and build status
//! - `clean` - Release and remove build leftovers

pub mod clean;
pub mod create;
pub mod customize;
mod preflight;
pub mod show;

pub use clean::cmd_clean;
pub use create::cmd_create;
pub use customize::cmd_customize;
pub use preflight::cmd_preflight;
pub use show::cmd_show;

//! rpi-imgbuild library exports.
//!
//! The binary is a thin clap front-end over these modules; they are public
//! so integration tests can exercise them.

pub mod clean;
pub mod commands;
pub mod config;
pub mod debootstrap;
pub mod disk;
pub mod preflight;
pub mod process;
pub mod status;
pub mod system;
pub mod timing;

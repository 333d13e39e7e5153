//! ffkit - command-line front-end for the ffkit-av library
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod transcode;

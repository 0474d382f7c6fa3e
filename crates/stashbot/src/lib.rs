//! stashbot: a personal file-management bot.
//!
//! Commands arrive as one-line text (the chat transport in front is
//! interchangeable), files are stored under a sandboxed storage root and
//! tracked in a JSON catalog, and URLs are streamed to disk with a byte
//! ceiling and host-specific direct-link resolution.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod fileops;
pub mod utils;
pub mod web;

#![forbid(unsafe_code)]

//! Shared library for the chat-replay command-line tools: watch-page
//! scraping, manifest handling, chat statistics, and chart rendering.

pub mod analysis;
pub mod chart;
pub mod chat;
pub mod config;
pub mod manifest;
pub mod process;
pub mod replay;

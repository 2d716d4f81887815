//! CLI Commands

pub mod config;
pub mod discover;
pub mod info;

//! Last.fm API integration
//!
//! The scrobble backend, used as an alternate import source: album search
//! and album detail with tracklist and tags.

pub mod dto;
mod adapter;
mod client;

pub use client::LastFmClient;

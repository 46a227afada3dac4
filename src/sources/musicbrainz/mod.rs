//! MusicBrainz API integration
//!
//! The structured-metadata backend: release search and lookup, the
//! controlled genre vocabulary, and front covers through the Cover Art
//! Archive.
//!
//! API docs: https://musicbrainz.org/doc/MusicBrainz_API

pub mod dto;
mod adapter;
mod client;

pub use client::MusicBrainzClient;

#![doc = "press-sync-core: WordPress REST client and content synchronisation."]

//! This crate holds the API session, resource proxies, the media sync engine and the
//! markdown directory sync used by the `press-sync` CLI.
//!
//! # Usage
//! Build a [`client::WordPressApi`] from a [`config::SiteConfig`], then go through its
//! proxies (`posts()`, `media()`, `categories()`, `tags()`) or hand it to
//! [`synchronise::synchronise_directory`]. Tests construct the session over a
//! `MockTransport` instead of HTTP.

pub mod client;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod frontmatter;
pub mod hash;
pub mod markdown;
pub mod media;
pub mod posts;
pub mod preprocess;
pub mod synchronise;
pub mod taxonomy;
pub mod timestamp;
pub mod transport;

pub use client::WordPressApi;
pub use error::{Result, WpError};

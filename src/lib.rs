//! Media link resolver library.
//!
//! Maps URLs of photo and video pages on hosting services to the direct URLs
//! of the media they show, and serves the mapping over a small HTTP API.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod image;
pub mod legacy;
pub mod og_extractor;
pub mod resolvers;
pub mod web;

pub use error::{ErrorKind, ResolveError};
pub use image::ImageInfo;
pub use resolvers::{Registry, ResolutionOutcome};

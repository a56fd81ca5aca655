//! # Media Store
//!
//! A content-addressed media store. Clients upload blobs under a key of their
//! choosing (conventionally a SHA-256 of the contents) and read them back over
//! HTTP, either untouched or transformed on the fly: resized, colour-adjusted,
//! glitched, re-encoded.
//!
//! # Request Flow
//!
//! ```text
//! GET /abc123.jpg:80?size=800&sat=120
//!        │
//!        ▼
//!   query      "abc123" + {jpg, 80, [size=800, sat=120]}
//!        │
//!        ▼
//!   media      metadata (cache → sidecar) ── binary? ──► raw bytes
//!        │
//!        ▼
//!   negotiate  plain ──────────────────────────────────► raw bytes
//!        │ transcode
//!        ▼
//!   cache      derived hit? ───────────────────────────► cached bytes
//!        │ miss
//!        ▼
//!   imaging    decode → size → sat → encode ──► cache ─► new bytes
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`store`] | Blob + JSON sidecar per key on disk; create-once `put` |
//! | [`cache`] | Adaptive replacement (ARC) cache of raw, metadata and derived entries |
//! | [`query`] | Parses `key.ext:modifier` and query parameters into a [`query::TransformRequest`] |
//! | [`imaging`] | Operation registry, the operations themselves, and codecs |
//! | [`negotiate`] | Decides plain vs transcode and picks the encoder |
//! | [`media`] | Cache-or-store facade that ties the above together |
//! | [`server`] | axum routes, auth gate, error bodies |
//! | [`config`] | TOML config loading, validation and merging |
//! | [`types`] | Shared types: `ObjectMeta`, `CacheEntry` |
//! | [`error`] | `MediaError` and the error-kind taxonomy used on the wire |
//!
//! # Design Decisions
//!
//! ## One Cache, Three Kinds of Entry
//!
//! Raw blobs, metadata records and derived images share one bounded cache.
//! Entries are a tagged enum, so a lookup that finds the wrong kind is a miss
//! (and the entry is purged) rather than a bad cast. Capacity counts entries:
//! a large derived image and a small metadata record each take one slot.
//!
//! ## Create-Once Objects
//!
//! There is no update path. A key is written once and can only be replaced by
//! deleting it first. This keeps derived outputs valid for as long as their
//! source exists, so the only invalidation needed is on delete.
//!
//! ## Operations Own Their Arguments
//!
//! Each operation parses its own argument string. The query interpreter only
//! knows operation names (from the registry), and the negotiator does not know
//! operations at all. Adding an operation means implementing
//! [`imaging::Operation`] and registering it.
//!
//! ## Encoders Are Explicit
//!
//! Some formats decode but do not encode (WebP, BMP), and AVIF encodes but
//! does not decode. A request that needs a missing direction fails with
//! `Unsupported` instead of silently falling back to another format.

pub mod cache;
pub mod config;
pub mod error;
pub mod imaging;
pub mod media;
pub mod negotiate;
pub mod query;
pub mod server;
pub mod store;
pub mod types;

pub use error::{ErrorKind, MediaError, Result};
pub use media::MediaService;

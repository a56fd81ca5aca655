//! Cache-or-store facade tying the store, cache, negotiator and pipeline
//! together.
//!
//! ```text
//! fetch(resource, query)
//!   ├── interpret  → (key, TransformRequest)
//!   ├── get_meta   → cache "<key>.json" or sidecar
//!   ├── binary?    → raw bytes
//!   └── plan
//!         ├── Plain      → raw bytes (cache "<key>" or blob)
//!         └── Transcode  → cache "<key>:<mime>:<mod>:<query>"
//!                          or decode → pipeline → encode, then cache
//! ```
//!
//! Nothing here holds the cache lock across decode, pipeline or encode work.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::cache::{CacheStats, MediaCache, meta_key};
use crate::error::Result;
use crate::imaging::{self, Registry};
use crate::negotiate::{self, Plan};
use crate::query::{self, TransformRequest};
use crate::store::{LocalStore, ObjectStore};
use crate::types::{CacheEntry, NewObject, ObjectKind, ObjectMeta};

/// How a response body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Stored bytes, untouched.
    Plain,
    /// A previously computed derived output.
    Cached,
    /// Freshly decoded, transformed and encoded.
    Pipeline,
}

/// A response body plus its content type.
#[derive(Debug, Clone)]
pub struct Served {
    pub data: Bytes,
    pub mime: String,
    pub origin: Origin,
}

/// Point-in-time summary of service activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub pipeline_runs: u64,
}

impl fmt::Display for ServiceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache: {}, pipeline runs: {}", self.cache, self.pipeline_runs)
    }
}

pub struct MediaService<S = LocalStore> {
    store: S,
    cache: MediaCache,
    registry: Registry,
    pipeline_runs: AtomicU64,
}

impl<S: ObjectStore> MediaService<S> {
    pub fn new(store: S, cache: MediaCache, registry: Registry) -> Self {
        Self {
            store,
            cache,
            registry,
            pipeline_runs: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Store a new object and prime its metadata cache entry.
    ///
    /// A fetch that raced an earlier `rem` may have written entries for the
    /// old object back into the cache; they are dropped before priming.
    pub fn put(&self, key: &str, object: NewObject, data: &[u8]) -> Result<ObjectMeta> {
        let meta = self.store.put(key, object, data)?;
        self.cache.invalidate(key);
        self.cache
            .put(meta_key(key), CacheEntry::Metadata(meta.clone()));
        Ok(meta)
    }

    pub fn get_meta(&self, key: &str) -> Result<ObjectMeta> {
        if let Some(meta) = self.cache.get_meta(key) {
            return Ok(meta);
        }
        let meta = self.store.get_meta(key)?;
        self.cache
            .put(meta_key(key), CacheEntry::Metadata(meta.clone()));
        Ok(meta)
    }

    /// Raw stored bytes, via the cache.
    pub fn get_raw(&self, key: &str) -> Result<Bytes> {
        if let Some(data) = self.cache.get_raw(key) {
            return Ok(data);
        }
        let data = self.store.get(key)?;
        self.cache.put(key, CacheEntry::RawBlob(data.clone()));
        Ok(data)
    }

    /// Resolve a resource name and query pairs and serve the result.
    pub fn fetch(&self, resource: &str, params: &[(String, String)]) -> Result<Served> {
        let (key, request) = query::interpret(resource, params, &self.registry)?;
        self.get(&key, &request)
    }

    /// Serve `key` as described by `request`.
    pub fn get(&self, key: &str, request: &TransformRequest) -> Result<Served> {
        let meta = self.get_meta(key)?;
        if meta.kind != ObjectKind::Image {
            return self.plain(key, meta);
        }

        let target = match negotiate::plan(&meta.mime, request)? {
            Plan::Plain => return self.plain(key, meta),
            Plan::Transcode(target) => target,
        };

        let derived = negotiate::derived_key(key, &target, request);
        if let Some(data) = self.cache.get_derived(&derived) {
            tracing::debug!(key, derived = %derived, "derived output cache hit");
            return Ok(Served {
                data,
                mime: target.mime,
                origin: Origin::Cached,
            });
        }
        tracing::debug!(key, derived = %derived, "derived output cache miss");

        let start = Instant::now();
        let source = self.get_raw(key)?;
        let image = imaging::decode(&source, &meta.mime)?;
        let image = self.registry.apply(&request.steps, image)?;
        let encoded = Bytes::from(imaging::encode(&image, target.encoder, target.quality)?);
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key,
            mime = %target.mime,
            steps = request.steps.len(),
            bytes = encoded.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rendered derived output"
        );

        self.cache
            .put(derived, CacheEntry::DerivedBlob(encoded.clone()));
        Ok(Served {
            data: encoded,
            mime: target.mime,
            origin: Origin::Pipeline,
        })
    }

    /// Delete an object. Cached entries for the key are dropped whatever the
    /// store reports.
    pub fn rem(&self, key: &str) -> Result<()> {
        let result = self.store.rem(key);
        self.cache.invalidate(key);
        result
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            pipeline_runs: self.pipeline_runs.load(Ordering::Relaxed),
        }
    }

    fn plain(&self, key: &str, meta: ObjectMeta) -> Result<Served> {
        Ok(Served {
            data: self.get_raw(key)?,
            mime: meta.mime,
            origin: Origin::Plain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::imaging::{Encoder, Quality};
    use crate::store::tests::MemoryStore;
    use image::{DynamicImage, Rgb, RgbImage};

    fn service() -> MediaService<MemoryStore> {
        MediaService::new(
            MemoryStore::new(),
            MediaCache::new(64).unwrap(),
            Registry::with_defaults(),
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        }));
        imaging::encode(&img, Encoder::Png, Quality::default()).unwrap()
    }

    fn params(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // =========================================================================
    // put / get_meta / rem
    // =========================================================================

    #[test]
    fn put_primes_meta_cache() {
        let svc = service();
        svc.put("a", NewObject::new("text/plain"), b"hi").unwrap();
        let meta = svc.get_meta("a").unwrap();
        assert_eq!(meta.kind, ObjectKind::Binary);
        assert_eq!(svc.store().meta_reads(), 0);
    }

    #[test]
    fn get_meta_populates_cache_once() {
        let store = MemoryStore::new();
        store.put("a", NewObject::new("text/plain"), b"hi").unwrap();
        let svc = MediaService::new(store, MediaCache::new(8).unwrap(), Registry::with_defaults());

        svc.get_meta("a").unwrap();
        svc.get_meta("a").unwrap();
        assert_eq!(svc.store().meta_reads(), 1);
    }

    #[test]
    fn conflict_passes_through() {
        let svc = service();
        svc.put("a", NewObject::new("text/plain"), b"1").unwrap();
        let err = svc.put("a", NewObject::new("text/plain"), b"2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn rem_invalidates_everything_for_key() {
        let svc = service();
        svc.put("img", NewObject::new("image/png"), &png(8, 8)).unwrap();
        svc.fetch("img.jpg", &params(&[("size", "4")])).unwrap();
        svc.fetch("img", &[]).unwrap();

        svc.rem("img").unwrap();
        assert_eq!(svc.get_meta("img").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            svc.fetch("img.jpg", &params(&[("size", "4")]))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn put_drops_entries_left_from_a_previous_object() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(8, 8)).unwrap();
        svc.fetch("p.jpg", &params(&[("size", "4")])).unwrap();
        svc.fetch("p", &[]).unwrap();

        // Removed behind the cache's back, as when a fetch re-caches after rem.
        svc.store().rem("p").unwrap();
        let replacement = png(20, 10);
        svc.put("p", NewObject::new("image/png"), &replacement).unwrap();

        let plain = svc.fetch("p", &[]).unwrap();
        assert_eq!(&plain.data[..], &replacement[..]);
        let derived = svc.fetch("p.jpg", &params(&[("size", "4")])).unwrap();
        assert_eq!(derived.origin, Origin::Pipeline);
        let out = imaging::decode(&derived.data, &derived.mime).unwrap();
        assert_eq!((out.width(), out.height()), (4, 2));
    }

    #[test]
    fn rem_missing_is_not_found() {
        let err = service().rem("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // =========================================================================
    // Plain path
    // =========================================================================

    #[test]
    fn binary_ignores_transformations() {
        let svc = service();
        svc.put("doc", NewObject::new("application/pdf"), b"%PDF").unwrap();
        let served = svc.fetch("doc.png", &params(&[("size", "10")])).unwrap();
        assert_eq!(served.origin, Origin::Plain);
        assert_eq!(served.mime, "application/pdf");
        assert_eq!(&served.data[..], b"%PDF");
    }

    #[test]
    fn same_format_returns_original_bytes() {
        let svc = service();
        let data = png(10, 10);
        svc.put("p", NewObject::new("image/png"), &data).unwrap();
        let served = svc.fetch("p.png", &[]).unwrap();
        assert_eq!(served.origin, Origin::Plain);
        assert_eq!(&served.data[..], &data[..]);
        assert_eq!(svc.stats().pipeline_runs, 0);
    }

    #[test]
    fn webp_to_webp_is_plain_even_if_undecodable() {
        let svc = service();
        svc.put("w", NewObject::new("image/webp"), b"RIFF....WEBP")
            .unwrap();
        let served = svc.fetch("w.webp", &[]).unwrap();
        assert_eq!(&served.data[..], b"RIFF....WEBP");
    }

    #[test]
    fn raw_bytes_are_cached_after_first_read() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(4, 4)).unwrap();
        let first = svc.fetch("p", &[]).unwrap();
        let second = svc.fetch("p", &[]).unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(svc.store().blob_reads(), 1);
    }

    // =========================================================================
    // Transcode path
    // =========================================================================

    #[test]
    fn png_to_webp_is_unsupported() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(4, 4)).unwrap();
        let err = svc.fetch("p.webp", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn size_preserves_aspect() {
        let svc = service();
        svc.put("big", NewObject::new("image/png"), &png(1600, 800))
            .unwrap();
        let served = svc.fetch("big", &params(&[("size", "800")])).unwrap();
        assert_eq!(served.origin, Origin::Pipeline);
        assert_eq!(served.mime, "image/png");
        let out = imaging::decode(&served.data, &served.mime).unwrap();
        assert_eq!((out.width(), out.height()), (800, 400));
    }

    #[test]
    fn second_identical_request_skips_pipeline() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(32, 32)).unwrap();

        let q = params(&[("size", "16"), ("blur", "1")]);
        let first = svc.fetch("p.jpg:60", &q).unwrap();
        assert_eq!(first.origin, Origin::Pipeline);
        assert_eq!(svc.stats().pipeline_runs, 1);

        // Same request, parameters reordered.
        let q = params(&[("blur", "1"), ("size", "16")]);
        let second = svc.fetch("p.jpg:60", &q).unwrap();
        assert_eq!(second.origin, Origin::Cached);
        assert_eq!(second.data, first.data);
        assert_eq!(svc.stats().pipeline_runs, 1);
    }

    #[test]
    fn different_quality_is_a_different_output() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(16, 16)).unwrap();
        svc.fetch("p.jpg:20", &[]).unwrap();
        svc.fetch("p.jpg:90", &[]).unwrap();
        assert_eq!(svc.stats().pipeline_runs, 2);
    }

    #[test]
    fn bad_argument_is_invalid_input() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(4, 4)).unwrap();
        let err = svc.fetch("p", &params(&[("size", "huge")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn malformed_order_is_invalid_input() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(4, 4)).unwrap();
        let err = svc
            .fetch("p", &params(&[("size", "2"), ("order", "size")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn corrupt_image_is_internal_error() {
        let svc = service();
        svc.put("bad", NewObject::new("image/png"), b"not a png")
            .unwrap();
        let err = svc.fetch("bad.jpg", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Error);
        assert_eq!(err.kind().status(), 500);
    }

    #[test]
    fn unknown_key_is_not_found() {
        let err = service().fetch("nope.png", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stats_display() {
        let svc = service();
        svc.put("p", NewObject::new("image/png"), &png(4, 4)).unwrap();
        svc.fetch("p.jpg", &[]).unwrap();
        let text = svc.stats().to_string();
        assert!(text.contains("pipeline runs: 1"), "{text}");
    }
}

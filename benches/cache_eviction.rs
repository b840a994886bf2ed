use criterion::{criterion_group, criterion_main, Criterion};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use ting_sdk::cache::{CacheError, HttpClient, HttpResponse, ImageCache, Validators};
use ting_sdk::clock::ManualClock;

struct NoNetwork;

impl HttpClient for NoNetwork {
    fn get(&self, url: &str) -> Result<HttpResponse, CacheError> {
        Err(CacheError::Http {
            url: url.to_string(),
            status: 503,
        })
    }

    fn head(&self, url: &str, _validators: &Validators) -> Result<HttpResponse, CacheError> {
        self.get(url)
    }
}

fn bench_eviction(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<String> = (0..64)
        .map(|i| {
            let path = dir.path().join(format!("{i}.png"));
            DynamicImage::ImageRgba8(RgbaImage::new(16, 16)).save(&path).unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect();

    // Room for 16 of the 64 images, so most lookups load and evict.
    let clock = Arc::new(ManualClock::new(0.0));
    let cache = ImageCache::new(16 * 16 * 16 * 4, Arc::new(NoNetwork), clock.clone());
    let mut i = 0usize;
    c.bench_function("load_and_evict_cycle", |b| {
        b.iter(|| {
            clock.advance(1.0);
            cache.get_image(&paths[i % paths.len()]).unwrap();
            i += 1;
        })
    });

    let hot = &paths[0];
    cache.get_image(hot).unwrap();
    c.bench_function("fresh_file_hit", |b| {
        b.iter(|| cache.get_image(hot).unwrap())
    });
}

criterion_group!(benches, bench_eviction);
criterion_main!(benches);

#![no_main]

use libfuzzer_sys::fuzz_target;
use muestreo::SampleCache;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let path = dir.path().join("cache.json");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    // Any file content must load (possibly as empty) without panicking
    let cache = SampleCache::new(&path, 5, 4);
    for name in cache.function_names() {
        if let Some(record) = cache.get(name) {
            assert!(record.param_data.values().all(|s| s.len() <= 5));
        }
    }
});

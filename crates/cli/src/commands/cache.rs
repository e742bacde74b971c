use lumen_cache::{canonical_form, derive_key, DiskStore, TieredCache};
use lumen_core::{LoaderConfig, Locator};

pub async fn invalidate(config: &LoaderConfig, locators: &[String]) -> eyre::Result<()> {
    let cache = TieredCache::open(config).await?;

    for raw in locators {
        let key = derive_key(&Locator::new(raw.as_str()));
        if key.is_invalid() {
            println!("{raw}: invalid locator");
            continue;
        }
        if cache.invalidate(&key).await? {
            println!("{raw}: removed");
        } else {
            println!("{raw}: not cached");
        }
    }
    Ok(())
}

pub async fn stats(config: &LoaderConfig) -> eyre::Result<()> {
    let store = DiskStore::from_config(config).await?;
    let usage = store.usage().await?;

    println!("Cache directory: {}", store.root().display());
    println!("  Durable entries: {}", usage.entries);
    println!("  Durable size: {:.2} MB", usage.bytes as f64 / 1_048_576.0);
    println!("  Memory budget: {:.2} MB", config.memory_budget_bytes as f64 / 1_048_576.0);
    println!("  Workers: {}", config.worker_count);
    println!(
        "  Compression: {}",
        if config.compress_durable {
            format!("zstd level {}", config.compression_level)
        } else {
            "off".to_string()
        }
    );
    Ok(())
}

pub fn key(raw: &str, verbose: bool) {
    let key = derive_key(&Locator::new(raw));
    if verbose {
        let canonical = canonical_form(raw).unwrap_or_else(|| "-".to_string());
        println!("{key}\t{canonical}");
    } else {
        println!("{key}");
    }
}

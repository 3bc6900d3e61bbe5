//! Integration tests for cache freshness against real file timestamps.
//!
//! The gate is driven through `prepare()` with source files whose
//! modification time has been pushed into the past.

use sectormap_core::data::{
    CacheGate, DataError, FreshnessPolicy, SourceDownloader, SourceLayout, SourceOrigin,
};
use std::fs::{self, File};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(86_400);

struct CountingDownloader(AtomicUsize);

impl SourceDownloader for CountingDownloader {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, target: &Path) -> Result<(), DataError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        write_sources(target, 0);
        Ok(())
    }
}

/// Write a merged-layout source pair whose mtime is `age_days` in the past.
fn write_sources(dir: &Path, age_days: u32) {
    fs::create_dir_all(dir).unwrap();
    let assignments = dir.join("StockClassifyUse_stock.csv");
    fs::write(&assignments, "股票代码,计入日期,行业代码\n600000,2021-07-30,480301\n").unwrap();
    fs::write(
        dir.join("SwClassCode_2021.csv"),
        "行业代码,一级行业名称,二级行业名称\n480301,银行,\n",
    )
    .unwrap();

    let mtime = SystemTime::now() - DAY * age_days;
    File::options()
        .write(true)
        .open(&assignments)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

fn run(age_days: u32) -> usize {
    let root = tempfile::tempdir().unwrap();
    let cache = root.path().join("cache");
    write_sources(&cache, age_days);

    let downloader = CountingDownloader(AtomicUsize::new(0));
    let gate = CacheGate::new(&cache, None, FreshnessPolicy::default(), &downloader);
    let outcome = gate.prepare().unwrap();
    assert_eq!(outcome.origin, SourceOrigin::Cache);
    downloader.0.load(Ordering::SeqCst)
}

#[test]
fn ninety_one_days_triggers_refresh() {
    assert_eq!(run(91), 1);
}

#[test]
fn eighty_nine_days_does_not() {
    assert_eq!(run(89), 0);
}

#[test]
fn stale_bundled_snapshot_is_still_used_offline() {
    let root = tempfile::tempdir().unwrap();
    let bundled = root.path().join("bundled");
    write_sources(&bundled, 400);

    let downloader = CountingDownloader(AtomicUsize::new(0));
    let gate = CacheGate::new(
        root.path().join("cache"),
        Some(bundled.clone()),
        FreshnessPolicy::default(),
        &downloader,
    );
    let outcome = gate.prepare().unwrap();
    assert_eq!(outcome.origin, SourceOrigin::Bundled);
    assert_eq!(outcome.dir, bundled);
    assert_eq!(downloader.0.load(Ordering::SeqCst), 0);
}

#[test]
fn published_workbooks_count_as_present() {
    let root = tempfile::tempdir().unwrap();
    let cache = root.path().join("cache");
    fs::create_dir_all(&cache).unwrap();
    for name in [
        "StockClassifyUse_stock.xls",
        "SwClassCode_2021.xls",
        "最新个股申万行业分类.xlsx",
    ] {
        fs::write(cache.join(name), b"").unwrap();
    }

    let downloader = CountingDownloader(AtomicUsize::new(0));
    let policy = FreshnessPolicy {
        auto_download: false,
        ..FreshnessPolicy::default()
    };
    let outcome = CacheGate::new(&cache, None, policy, &downloader)
        .prepare()
        .unwrap();

    assert_eq!(outcome.origin, SourceOrigin::Cache);
    assert!(outcome.layout.primary().ends_with("StockClassifyUse_stock.xls"));
    assert!(matches!(outcome.layout, SourceLayout::Merged { .. }));
    assert_eq!(downloader.0.load(Ordering::SeqCst), 0);
}

use super::*;
use chrono::NaiveDate;
use tempfile::TempDir;

fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> Watermark {
    Watermark::Timestamp(
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap(),
    )
}

// ============================================================================
// Watermark tests
// ============================================================================

#[test]
fn test_int_watermark_roundtrip() {
    let w = Watermark::parse(WatermarkKind::Int, " 42\n").unwrap();
    assert_eq!(w, Watermark::Int(42));
    assert_eq!(w.to_bookmark_string(), "42");
    assert_eq!(w.to_sql_literal(), "42");
}

#[test]
fn test_timestamp_watermark_format() {
    let w = ts(2024, 1, 1, 0, 0, 0);
    assert_eq!(w.to_bookmark_string(), "2024-01-01 00:00:00");
    assert_eq!(w.to_sql_literal(), "'2024-01-01 00:00:00'");
}

#[test]
fn test_timestamp_keeps_fraction() {
    let w = Watermark::parse(WatermarkKind::Timestamp, "2024-03-05 10:11:12.250").unwrap();
    assert_eq!(w.to_bookmark_string(), "2024-03-05 10:11:12.250");
}

#[test]
fn test_parse_timestamp_variants() {
    let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    assert_eq!(parse_timestamp("2024-01-02 03:04:05").unwrap(), expected);
    assert_eq!(parse_timestamp("2024-01-02T03:04:05").unwrap(), expected);
    assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00").unwrap(), expected);
    assert_eq!(
        parse_timestamp("2024-01-02").unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    );
    assert!(parse_timestamp("yesterday").is_err());
}

#[test]
fn test_invalid_int_watermark() {
    assert!(Watermark::parse(WatermarkKind::Int, "12a").is_err());
}

#[test]
fn test_watermark_ordering() {
    assert!(Watermark::Int(9) > Watermark::Int(7));
    assert!(ts(2024, 1, 2, 0, 0, 0) > ts(2024, 1, 1, 23, 59, 59));
}

#[test]
fn test_kind_from_str_and_serde() {
    assert_eq!("INT".parse::<WatermarkKind>().unwrap(), WatermarkKind::Int);
    assert_eq!(
        "timestamp".parse::<WatermarkKind>().unwrap(),
        WatermarkKind::Timestamp
    );
    assert!("date".parse::<WatermarkKind>().is_err());
    let kind: WatermarkKind = serde_json::from_str("\"timestamp\"").unwrap();
    assert_eq!(kind, WatermarkKind::Timestamp);
}

// ============================================================================
// Store tests
// ============================================================================

#[test]
fn test_validate_stream_id() {
    assert!(validate_stream_id("orders_v2").is_ok());
    assert!(validate_stream_id("db.orders-1").is_ok());
    assert!(validate_stream_id("").is_err());
    assert!(validate_stream_id(".hidden").is_err());
    assert!(validate_stream_id("../etc").is_err());
    assert!(validate_stream_id("a/b").is_err());
}

#[tokio::test]
async fn test_filesystem_store_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path().join("nested"));
    assert_eq!(store.read_bookmark("orders").await.unwrap(), None);
}

#[tokio::test]
async fn test_filesystem_store_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());

    store.store_bookmark("orders", "17").await.unwrap();
    assert_eq!(
        store.read_bookmark("orders").await.unwrap().as_deref(),
        Some("17")
    );

    store.store_bookmark("orders", "18").await.unwrap();
    assert_eq!(
        store.read_bookmark("orders").await.unwrap().as_deref(),
        Some("18")
    );

    // Temp file is renamed away
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["orders.bookmark".to_string()]);
}

#[tokio::test]
async fn test_filesystem_store_rejects_bad_stream_id() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());
    assert!(store.store_bookmark("../escape", "1").await.is_err());
}

#[tokio::test]
async fn test_memory_store_fail_writes() {
    let store = MemoryStore::new();
    store.set_fail_writes(true);
    assert!(store.store_bookmark("s", "1").await.is_err());
    store.set_fail_writes(false);
    store.store_bookmark("s", "1").await.unwrap();
    assert_eq!(store.read_bookmark("s").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_s3_store_key_layout() {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new("us-east-1"))
        .build();
    let store = S3Store::new(
        aws_sdk_s3::Client::from_conf(config),
        "bucket",
        "bookmarks/",
    );
    assert_eq!(store.key_for("orders").unwrap(), "bookmarks/orders");
    assert!(store.key_for("a/b").is_err());
}

// ============================================================================
// Bookmarks facade tests
// ============================================================================

#[tokio::test]
async fn test_current_absent() {
    let bookmarks = Bookmarks::new(MemoryStore::new(), WatermarkKind::Int);
    assert_eq!(bookmarks.current("orders").await.unwrap(), None);
}

#[tokio::test]
async fn test_current_parses_stored_value() {
    let store = MemoryStore::new();
    store.insert("events", "2024-01-01 00:00:00").await;
    let bookmarks = Bookmarks::new(store, WatermarkKind::Timestamp);
    assert_eq!(
        bookmarks.current("events").await.unwrap(),
        Some(ts(2024, 1, 1, 0, 0, 0))
    );
}

#[tokio::test]
async fn test_current_corrupt_value_is_error() {
    let store = MemoryStore::new();
    store.insert("orders", "not-a-number").await;
    let bookmarks = Bookmarks::new(store, WatermarkKind::Int);
    let err = bookmarks.current("orders").await.unwrap_err();
    assert!(format!("{err:#}").contains("orders"));
}

#[tokio::test]
async fn test_advance_writes_then_unchanged() {
    let bookmarks = Bookmarks::new(MemoryStore::new(), WatermarkKind::Int);
    let first = bookmarks
        .advance("orders", None, &Watermark::Int(9))
        .await
        .unwrap();
    assert_eq!(first, Advance::Written);

    let again = bookmarks
        .advance("orders", Some(&Watermark::Int(9)), &Watermark::Int(9))
        .await
        .unwrap();
    assert_eq!(again, Advance::Unchanged);
    assert_eq!(
        bookmarks.current("orders").await.unwrap(),
        Some(Watermark::Int(9))
    );
}

#[tokio::test]
async fn test_advance_refuses_regression() {
    let bookmarks = Bookmarks::new(MemoryStore::new(), WatermarkKind::Int);
    bookmarks
        .advance("orders", None, &Watermark::Int(10))
        .await
        .unwrap();
    let result = bookmarks
        .advance("orders", Some(&Watermark::Int(10)), &Watermark::Int(3))
        .await
        .unwrap();
    assert_eq!(result, Advance::Refused);
    assert_eq!(
        bookmarks.current("orders").await.unwrap(),
        Some(Watermark::Int(10))
    );
}

#[tokio::test]
async fn test_advance_rejects_kind_mismatch() {
    let bookmarks = Bookmarks::new(MemoryStore::new(), WatermarkKind::Int);
    assert!(bookmarks
        .advance("orders", None, &ts(2024, 1, 1, 0, 0, 0))
        .await
        .is_err());
}

#[tokio::test]
async fn test_overwrite_allows_rewind() {
    let dir = TempDir::new().unwrap();
    let bookmarks = Bookmarks::new(FilesystemStore::new(dir.path()), WatermarkKind::Int);
    bookmarks
        .advance("orders", None, &Watermark::Int(50))
        .await
        .unwrap();
    bookmarks.overwrite("orders", &Watermark::Int(5)).await.unwrap();
    assert_eq!(
        bookmarks.current("orders").await.unwrap(),
        Some(Watermark::Int(5))
    );
}

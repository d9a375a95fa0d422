//! Runs against the real Stitch API.
//!
//! Requires `STITCH_CLIENT_ID`, `STITCH_TOKEN` and `STITCH_SOURCE_ID`.
//! Run with `cargo test -p warehouse-sync-stitch -- --ignored`.

use job_monitor::{JobApi, JobStatus};
use stitch::{StitchClient, StitchConfig};

fn client_from_env() -> StitchClient {
    let client_id = std::env::var("STITCH_CLIENT_ID").expect("STITCH_CLIENT_ID");
    let token = std::env::var("STITCH_TOKEN").expect("STITCH_TOKEN");
    StitchClient::new(StitchConfig::new(client_id, token)).unwrap()
}

#[tokio::test]
#[ignore]
async fn test_trigger_and_poll_live_source() {
    let source_id = std::env::var("STITCH_SOURCE_ID").expect("STITCH_SOURCE_ID");
    let client = client_from_env();

    let handle = client.trigger(&source_id).await.unwrap();
    assert_eq!(handle.source_id, source_id);

    let status = client.fetch_status(&handle).await.unwrap();
    assert!(matches!(
        status,
        JobStatus::Pending | JobStatus::Running | JobStatus::Succeeded | JobStatus::Failed
    ));
}

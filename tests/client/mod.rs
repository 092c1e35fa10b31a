use crate::helpers::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    ops::Range,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use uptime_indexer::{
    client::{ChainClientError, ChainSource},
    constants::DEFAULT_VALIDATORS_PATH,
};

fn validators_page(addresses: Range<u32>, total: u32) -> String {
    let validators: Vec<_> = addresses
        .map(|i| json!({ "address": format!("{i:040X}"), "voting_power": "1" }))
        .collect();
    let count = validators.len().to_string();
    json!({
        "jsonrpc": "2.0", "id": -1,
        "result": {
            "block_height": "5",
            "validators": validators,
            "count": count,
            "total": total.to_string()
        }
    })
    .to_string()
}

fn block(height: u64) -> String {
    json!({
        "result": { "block": {
            "header": { "height": height.to_string(), "time": "2024-05-01T10:00:00Z", "proposer_address": "AA" },
            "data": { "txs": ["payload"] }
        } }
    })
    .to_string()
}

fn status() -> String {
    json!({
        "result": {
            "node_info": { "network": CHAIN_ID, "other": { "tx_index": "on" } },
            "sync_info": { "latest_block_height": "5000", "latest_block_time": "2024-05-03T00:00:01Z", "catching_up": false }
        }
    })
    .to_string()
}

#[tokio::test]
async fn validator_set_pages_are_merged() -> anyhow::Result<()> {
    let server = TestServer::start(|target| match (path_of(target), query_param(target, "page")) {
        ("/validators", Some("1")) => Reply::ok(validators_page(0..100, 102)),
        ("/validators", Some("2")) => Reply::ok(validators_page(100..102, 102)),
        _ => Reply::status(404, ""),
    })
    .await?;

    let snapshot = server.client().get_validator_set(5).await?;

    assert_eq!(snapshot.height, 5);
    assert_eq!(snapshot.len(), 102);
    assert!(snapshot.member_hexes.contains(&format!("{:040X}", 101)));
    assert_eq!(server.hits("/validators"), 2);
    assert!(server
        .requests()
        .iter()
        .all(|target| query_param(target, "height") == Some("5")
            && query_param(target, "per_page") == Some("100")));
    Ok(())
}

#[tokio::test]
async fn empty_validator_page_before_total_is_malformed() -> anyhow::Result<()> {
    let server = TestServer::start(|target| match query_param(target, "page") {
        Some("1") => Reply::ok(validators_page(0..1, 5)),
        _ => Reply::ok(validators_page(0..0, 5)),
    })
    .await?;

    let result = server.client().get_validator_set(7).await;

    assert!(matches!(result, Err(ChainClientError::Malformed { .. })));
    assert_eq!(server.hits("/validators"), 2);
    Ok(())
}

#[tokio::test]
async fn pruned_node_reports_its_lowest_height() -> anyhow::Result<()> {
    let server = TestServer::start(|target| {
        if path_of(target) == "/block" && query_param(target, "height") == Some("1") {
            Reply::status(
                500,
                json!({
                    "jsonrpc": "2.0", "id": -1,
                    "error": {
                        "code": -32603,
                        "message": "Internal error",
                        "data": "height 1 is not available, lowest height is 4047001"
                    }
                })
                .to_string(),
            )
        } else {
            Reply::status(500, "")
        }
    })
    .await?;

    assert_eq!(server.client().get_lowest_height().await?, 4047001);
    assert_eq!(server.hits("/block"), 1);

    // a 500 anywhere else is a failed request
    let result = server.client().get_raw_extension_tx(4047001).await;
    assert!(matches!(
        result,
        Err(ChainClientError::Status { status: 500, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn archive_node_serves_height_one() -> anyhow::Result<()> {
    let server = TestServer::start(|_| Reply::ok(block(1))).await?;
    assert_eq!(server.client().get_lowest_height().await?, 1);
    Ok(())
}

#[tokio::test]
async fn empty_body_is_retried() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = TestServer::start(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Reply::ok("")
        } else {
            Reply::ok(status())
        }
    })
    .await?;

    let status = server.client().get_status().await?;

    assert_eq!(status.chain_id, CHAIN_ID);
    assert_eq!(status.latest_height, 5000);
    assert_eq!(server.hits("/status"), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn empty_bodies_exhaust_the_attempts() -> anyhow::Result<()> {
    let server = TestServer::start(|_| Reply::ok("")).await?;

    let result = server.client().get_status().await;

    assert!(matches!(result, Err(ChainClientError::EmptyResponse { .. })));
    assert_eq!(server.hits("/status"), 3);
    Ok(())
}

#[tokio::test]
async fn not_found_is_not_retried() -> anyhow::Result<()> {
    let server = TestServer::start(|_| Reply::status(404, "")).await?;

    let result = server.client().get_block_commit(5).await;

    assert!(matches!(
        result,
        Err(ChainClientError::Status { status: 404, .. })
    ));
    assert_eq!(server.hits("/commit"), 1);
    Ok(())
}

#[tokio::test]
async fn roster_follows_the_cursor() -> anyhow::Result<()> {
    let roster = MockChain::new().roster;
    let entry = |i: usize| {
        json!({
            "operator_address": roster[i].valoper,
            "consensus_pubkey": { "@type": "/cosmos.crypto.ed25519.PubKey", "key": roster[i].consensus_pubkey },
            "description": { "moniker": roster[i].moniker }
        })
    };
    let pages = [
        json!({ "validators": [entry(0)], "pagination": { "next_key": "k1" } }).to_string(),
        json!({ "validators": [entry(1)], "pagination": { "next_key": "k2" } }).to_string(),
        json!({ "validators": [entry(2)], "pagination": { "next_key": null } }).to_string(),
    ];
    let server = TestServer::start(move |target| {
        if path_of(target) != DEFAULT_VALIDATORS_PATH {
            return Reply::status(404, "");
        }
        match query_param(target, "pagination.key") {
            None => Reply::ok(pages[0].clone()),
            Some("k1") => Reply::ok(pages[1].clone()),
            Some("k2") => Reply::ok(pages[2].clone()),
            Some(_) => Reply::status(404, ""),
        }
    })
    .await?;

    let fetched = server.client().fetch_validator_roster(1).await?;

    assert_eq!(fetched, MockChain::new().roster);
    assert_eq!(server.hits(DEFAULT_VALIDATORS_PATH), 3);
    assert!(server
        .requests()
        .iter()
        .all(|target| query_param(target, "pagination.limit") == Some("1")));
    Ok(())
}

use crate::helpers::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use uptime_indexer::{
    constants::GOV_PROPOSALS_PATH,
    governance::{
        refresh_governance, store::GovernanceStore, GovernanceError, ProposalVote, VoteOption,
    },
    store::IndexerStore,
    validator::Validator,
};

fn roster() -> Vec<Validator> {
    MockChain::new()
        .roster
        .into_iter()
        .map(|entry| Validator::from_roster_entry(entry, "init").unwrap())
        .collect()
}

fn vote_tx(height: u64, code: u32, option: u8) -> Value {
    json!({
        "hash": format!("TX{height}"),
        "height": height.to_string(),
        "index": 0,
        "tx_result": {
            "code": code,
            "events": [
                { "type": "message", "attributes": [ { "key": "action", "value": "/cosmos.gov.v1.MsgVote", "index": true } ] },
                { "type": "proposal_vote", "attributes": [
                    { "key": "option", "value": format!(r#"[{{"option":{option},"weight":"1.000000000000000000"}}]"#), "index": true },
                    { "key": "proposal_id", "value": "1", "index": true }
                ] }
            ]
        }
    })
}

fn tx_search(txs: &[Value], total: usize) -> String {
    json!({ "jsonrpc": "2.0", "id": -1, "result": { "txs": txs, "total_count": total.to_string() } })
        .to_string()
}

fn proposals(entries: &[(u64, &str)], next_key: Option<&str>) -> String {
    let proposals: Vec<Value> = entries
        .iter()
        .map(|(id, status)| json!({ "id": id.to_string(), "status": status }))
        .collect();
    json!({ "proposals": proposals, "pagination": { "next_key": next_key, "total": "0" } })
        .to_string()
}

/// Two pages of proposals; only 1 and 3 are finished.
/// On proposal 1 alpha changed its vote and later failed to veto, beta
/// abstained and gamma never voted. Alpha's search spans two pages.
fn governance_chain(alpha: &str, beta: &str) -> impl Fn(&str) -> Reply + Send + Sync + 'static {
    let alpha = alpha.to_string();
    let beta = beta.to_string();
    move |target| {
        let path = path_of(target);
        if path == GOV_PROPOSALS_PATH {
            return match query_param(target, "pagination.key") {
                None => Reply::ok(proposals(
                    &[(1, "PROPOSAL_STATUS_PASSED"), (2, "PROPOSAL_STATUS_VOTING_PERIOD")],
                    Some("p2"),
                )),
                Some(_) => Reply::ok(proposals(&[(3, "PROPOSAL_STATUS_REJECTED")], None)),
            };
        }
        if path != "/tx_search" {
            return Reply::status(404, "");
        }

        let query = decoded(target);
        let voter = |wallet: &str| query.contains(&format!("proposal_vote.voter='{wallet}'"));
        let proposal = |id: u64| query.contains(&format!("proposal_vote.proposal_id='{id}'"));
        let page = query_param(target, "page").unwrap_or("1");

        if voter(&alpha) && proposal(1) {
            return match page {
                "1" => Reply::ok(tx_search(&[vote_tx(100, 0, 1), vote_tx(150, 0, 3)], 3)),
                _ => Reply::ok(tx_search(&[vote_tx(200, 13, 4)], 3)),
            };
        }
        if voter(&beta) && proposal(1) {
            return Reply::ok(tx_search(&[vote_tx(120, 0, 2)], 1));
        }
        if voter(&alpha) && proposal(3) {
            return Reply::ok(tx_search(&[vote_tx(300, 0, 1)], 1));
        }
        Reply::ok(tx_search(&[], 0))
    }
}

#[tokio::test]
async fn records_votes_on_finished_proposals() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("governance-refresh")?;
    let store = IndexerStore::new(store_dir.path())?;
    let validators = roster();
    let (alpha, beta, gamma) = (&validators[0], &validators[1], &validators[2]);

    let server = TestServer::start(governance_chain(&alpha.wallet, &beta.wallet)).await?;
    let client = server.client();

    assert_eq!(refresh_governance(&client, &store, &validators).await?, 2);
    assert_eq!(store.get_processed_proposals()?, BTreeSet::from([1, 3]));

    let first = store.get_proposal_votes(1)?.unwrap();
    assert_eq!(first.status, "PROPOSAL_STATUS_PASSED");
    assert_eq!(
        first.votes,
        BTreeMap::from([
            (
                alpha.valoper.clone(),
                ProposalVote {
                    option: VoteOption::No,
                    tx_height: 150,
                    tx_hash: "TX150".into(),
                }
            ),
            (
                beta.valoper.clone(),
                ProposalVote {
                    option: VoteOption::Abstain,
                    tx_height: 120,
                    tx_hash: "TX120".into(),
                }
            ),
        ])
    );
    assert!(!first.has_voted(&gamma.valoper));
    assert_eq!(store.get_proposal_votes(2)?, None);

    let third = store.get_proposal_votes(3)?.unwrap();
    assert_eq!(third.votes.len(), 1);
    assert_eq!(third.votes[&alpha.valoper].option, VoteOption::Yes);

    // the voting period proposal is never searched
    assert!(server
        .requests()
        .iter()
        .all(|target| !decoded(target).contains("proposal_id='2'")));
    Ok(())
}

#[tokio::test]
async fn stored_proposals_are_skipped() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("governance-skip")?;
    let store = IndexerStore::new(store_dir.path())?;
    let validators = roster();

    let server =
        TestServer::start(governance_chain(&validators[0].wallet, &validators[1].wallet)).await?;
    let client = server.client();

    refresh_governance(&client, &store, &validators).await?;
    let searches = server.hits("/tx_search");

    assert_eq!(refresh_governance(&client, &store, &validators).await?, 0);
    assert_eq!(server.hits("/tx_search"), searches);
    assert_eq!(server.hits(GOV_PROPOSALS_PATH), 4);
    Ok(())
}

#[tokio::test]
async fn malformed_vote_stores_nothing() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("governance-malformed")?;
    let store = IndexerStore::new(store_dir.path())?;
    let validators = roster();

    let server = TestServer::start(|target| {
        if path_of(target) == GOV_PROPOSALS_PATH {
            return Reply::ok(proposals(&[(1, "PROPOSAL_STATUS_PASSED")], None));
        }
        let mut tx = vote_tx(100, 0, 1);
        tx["tx_result"]["events"][1]["attributes"][0]["value"] = json!("not a vote option");
        Reply::ok(tx_search(&[tx], 1))
    })
    .await?;

    let result = refresh_governance(&server.client(), &store, &validators).await;

    assert!(matches!(
        result,
        Err(GovernanceError::MalformedVote { proposal_id: 1, .. })
    ));
    assert!(store.get_processed_proposals()?.is_empty());
    Ok(())
}

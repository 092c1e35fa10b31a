use crate::helpers::*;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};
use uptime_indexer::{
    checkpoint::{store::CheckpointStore, Checkpoint},
    client::responses::SlashEvent,
    governance::{store::GovernanceStore, ProposalVote, ProposalVotes, VoteOption},
    slashing::{record_slash_events, store::SlashStore, SlashRecord},
    stats::{store::DailyStatsStore, DailyStatDocument, ValidatorDayStats},
    store::{IndexerStore, StoreError},
    validator::{store::ValidatorStore, Validator},
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

fn document(day: u32, start: u64, end: u64) -> DailyStatDocument {
    DailyStatDocument {
        date: date(day),
        date_start_height: start,
        date_end_height: end,
        validators: BTreeMap::from([(
            hex(1),
            ValidatorDayStats {
                proposed: 1,
                signed: end + 1 - start,
                ..Default::default()
            },
        )]),
    }
}

fn checkpoint(height: u64) -> Checkpoint {
    Checkpoint::new(height, time(1, 23), CHAIN_ID)
}

fn validator(id: u8, moniker: &str) -> Validator {
    Validator {
        hex: hex(id),
        valoper: format!("initvaloper{id}"),
        valcons: format!("initvalcons{id}"),
        wallet: format!("init{id}"),
        moniker: moniker.into(),
        consensus_pubkey: String::new(),
    }
}

#[test]
fn checkpoint_only_advances() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("checkpoint-store")?;
    let store = IndexerStore::new(store_dir.path())?;

    assert_eq!(store.get_checkpoint()?, None);
    store.set_checkpoint(&checkpoint(10))?;

    assert!(matches!(
        store.set_checkpoint(&checkpoint(10)),
        Err(StoreError::CheckpointRegression {
            attempted: 10,
            current: 10
        })
    ));
    assert!(matches!(
        store.set_checkpoint(&checkpoint(5)),
        Err(StoreError::CheckpointRegression { .. })
    ));
    assert!(matches!(
        store.set_checkpoint(&Checkpoint::new(11, time(2, 0), "other-chain")),
        Err(StoreError::ChainIdMismatch { .. })
    ));
    assert_eq!(store.get_checkpoint()?, Some(checkpoint(10)));

    store.set_checkpoint(&checkpoint(11))?;
    assert_eq!(store.get_checkpoint()?.map(|c| c.latest_processed_height), Some(11));
    Ok(())
}

#[test]
fn daily_stats_are_written_once_and_listed_by_date() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("daily-stats-store")?;
    let store = IndexerStore::new(store_dir.path())?;

    store.append_daily_stats(&document(3, 30, 39))?;
    store.append_daily_stats(&document(1, 10, 19))?;
    assert!(matches!(
        store.append_daily_stats(&document(3, 40, 49)),
        Err(StoreError::DuplicateDay(d)) if d == date(3)
    ));

    let dates: Vec<NaiveDate> = store.list_daily_stats()?.iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![date(1), date(3)]);
    assert_eq!(store.get_daily_stats(date(3))?, Some(document(3, 30, 39)));
    assert_eq!(store.get_daily_stats(date(2))?, None);
    Ok(())
}

#[test]
fn commit_day_is_all_or_nothing() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("commit-day-store")?;
    let store = IndexerStore::new(store_dir.path())?;

    store.commit_day(&document(1, 10, 19), &checkpoint(19))?;
    assert_eq!(store.get_checkpoint()?, Some(checkpoint(19)));

    // regressed checkpoint: the document must not land
    assert!(store.commit_day(&document(2, 20, 29), &checkpoint(19)).is_err());
    assert_eq!(store.get_daily_stats(date(2))?, None);

    // duplicate day: the checkpoint must not move
    assert!(matches!(
        store.commit_day(&document(1, 10, 19), &checkpoint(29)),
        Err(StoreError::DuplicateDay(_))
    ));
    assert_eq!(store.get_checkpoint()?, Some(checkpoint(19)));

    store.commit_day(&document(2, 20, 29), &checkpoint(29))?;
    assert_eq!(store.list_daily_stats()?.len(), 2);
    Ok(())
}

#[test]
fn roster_is_replaced() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("validator-store")?;
    let store = IndexerStore::new(store_dir.path())?;

    store.set_validators(&[validator(1, "alpha"), validator(2, "beta")])?;
    assert_eq!(store.get_validators()?.len(), 2);

    store.set_validators(&[validator(2, "beta v2")])?;
    assert_eq!(store.get_validators()?, vec![validator(2, "beta v2")]);
    Ok(())
}

#[test]
fn slashes_are_deduplicated_per_height() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("slash-store")?;
    let store = IndexerStore::new(store_dir.path())?;
    let slash = |height| SlashRecord {
        height,
        time: time(1, 0),
    };

    assert!(store.add_slash("initvaloper1", &slash(200))?);
    assert!(store.add_slash("initvaloper1", &slash(9))?);
    assert!(!store.add_slash("initvaloper1", &slash(200))?);
    assert!(store.add_slash("initvaloper2", &slash(50))?);

    assert_eq!(store.get_slashes("initvaloper1")?, vec![slash(9), slash(200)]);
    assert!(store.get_slashes("initvaloper")?.is_empty());

    let added = record_slash_events(
        &store,
        "initvaloper2",
        [50, 51].map(|height| SlashEvent {
            height,
            time: time(1, 0),
        }),
    )?;
    assert_eq!(added, 1);

    let all = store.list_slashes()?;
    assert_eq!(all.len(), 2);
    assert_eq!(all["initvaloper2"], vec![slash(50), slash(51)]);
    Ok(())
}

fn proposal(id: u64, votes: &[(&str, VoteOption)]) -> ProposalVotes {
    ProposalVotes {
        proposal_id: id,
        status: "PROPOSAL_STATUS_PASSED".into(),
        votes: votes
            .iter()
            .map(|(valoper, option)| {
                (
                    valoper.to_string(),
                    ProposalVote {
                        option: *option,
                        tx_height: id * 10,
                        tx_hash: format!("TX{id}"),
                    },
                )
            })
            .collect(),
    }
}

#[test]
fn proposals_are_stored_once() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("governance-store")?;
    let store = IndexerStore::new(store_dir.path())?;

    assert!(store.get_processed_proposals()?.is_empty());
    assert!(store.add_proposal_votes(&proposal(10, &[("initvaloper1", VoteOption::Yes)]))?);
    assert!(store.add_proposal_votes(&proposal(2, &[]))?);

    // a second write never replaces the recorded votes
    assert!(!store.add_proposal_votes(&proposal(10, &[("initvaloper1", VoteOption::No)]))?);
    assert_eq!(
        store.get_proposal_votes(10)?,
        Some(proposal(10, &[("initvaloper1", VoteOption::Yes)]))
    );
    assert_eq!(store.get_proposal_votes(3)?, None);

    assert_eq!(store.get_processed_proposals()?, BTreeSet::from([2, 10]));
    let ids: Vec<u64> = store
        .list_proposal_votes()?
        .iter()
        .map(|p| p.proposal_id)
        .collect();
    assert_eq!(ids, vec![2, 10]);
    Ok(())
}

#[test]
fn read_only_store_sees_committed_days() -> anyhow::Result<()> {
    let store_dir = setup_new_db_dir("read-only-store")?;
    {
        let store = IndexerStore::new(store_dir.path())?;
        store.commit_day(&document(1, 10, 19), &checkpoint(19))?;
        store.add_proposal_votes(&proposal(1, &[("initvaloper1", VoteOption::Abstain)]))?;
    }

    let store = IndexerStore::new_read_only(store_dir.path())?;
    assert_eq!(store.get_checkpoint()?, Some(checkpoint(19)));
    assert_eq!(store.list_daily_stats()?, vec![document(1, 10, 19)]);
    assert_eq!(store.get_processed_proposals()?, BTreeSet::from([1]));
    Ok(())
}

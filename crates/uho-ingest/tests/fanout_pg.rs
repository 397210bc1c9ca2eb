//! Fan-out writer integration tests.
//!
//! Require a running PostgreSQL (15+) instance. Set DATABASE_URL to enable:
//! `DATABASE_URL=postgresql://localhost/uho_test cargo test -- --ignored`

use indexmap::IndexMap;
use serde_json::json;
use sqlx::{PgPool, Row};

use uho_decode::{DecodedEvent, NormalizedValue};
use uho_idl::ProgramSpec;
use uho_ingest::{FanoutWriter, Subscriber, TxLogRecord};

fn swap_spec() -> ProgramSpec {
    ProgramSpec::from_value(
        &json!({
            "name": "myAmm",
            "metadata": {"address": "Amm111111111111111111111111111111111111111"},
            "events": [{
                "name": "SwapEvent",
                "fields": [
                    {"name": "amm", "type": "publicKey"},
                    {"name": "inputAmount", "type": "u64"},
                    {"name": "outputAmount", "type": "u64"},
                    {"name": "fee", "type": "u64"},
                    {"name": "timestamp", "type": "i64"}
                ]
            }]
        }),
        None,
    )
    .unwrap()
}

fn swap_event(signature: &str, slot: u64) -> DecodedEvent {
    let mut data = IndexMap::new();
    data.insert("amm".into(), NormalizedValue::Pubkey("AmmPool111".into()));
    data.insert("input_amount".into(), NormalizedValue::ULong(1_000_000));
    data.insert("output_amount".into(), NormalizedValue::ULong(500_000));
    data.insert("fee".into(), NormalizedValue::ULong(1_000));
    data.insert("timestamp".into(), NormalizedValue::Long(1_720_000_000));
    DecodedEvent {
        event_name: "SwapEvent".into(),
        program_id: "Amm111111111111111111111111111111111111111".into(),
        slot,
        block_time: Some(1_720_000_000),
        tx_signature: signature.into(),
        ix_index: 0,
        inner_ix_index: None,
        data,
    }
}

fn subscriber(user_id: &str, schema: &str) -> Subscriber {
    serde_json::from_value(json!({
        "user_id": user_id,
        "schema": schema,
        "enabled_events": ["SwapEvent"],
        "enabled_instructions": [],
        "index_token_transfers": false
    }))
    .unwrap()
}

/// Provision a tenant schema the way the (out-of-scope) schema layer does:
/// one table per event, `_tx_logs`, `_uho_state`, and the NULLS NOT DISTINCT
/// unique triple the writer's upsert relies on.
async fn provision(pool: &PgPool, schema: &str, with_event_table: bool) {
    sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(pool)
        .await
        .unwrap();
    if with_event_table {
        sqlx::query(&format!(
            "CREATE TABLE \"{schema}\".my_amm_swap_event (
                id             BIGSERIAL PRIMARY KEY,
                slot           BIGINT NOT NULL,
                block_time     TIMESTAMPTZ,
                tx_signature   TEXT NOT NULL,
                ix_index       INTEGER NOT NULL,
                inner_ix_index INTEGER,
                \"amm\"           TEXT,
                \"input_amount\"  BIGINT,
                \"output_amount\" BIGINT,
                \"fee\"           BIGINT,
                \"timestamp\"     BIGINT,
                indexed_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE NULLS NOT DISTINCT (tx_signature, ix_index, inner_ix_index)
            )"
        ))
        .execute(pool)
        .await
        .unwrap();
    }
    sqlx::query(&format!(
        "CREATE TABLE \"{schema}\"._tx_logs (
            tx_signature TEXT PRIMARY KEY,
            slot         BIGINT NOT NULL,
            logs         TEXT[] NOT NULL,
            indexed_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    ))
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE \"{schema}\"._uho_state (
            program_id     TEXT PRIMARY KEY,
            last_slot      BIGINT,
            last_signature TEXT,
            events_indexed BIGINT DEFAULT 0,
            last_poll_at   TIMESTAMPTZ,
            status         TEXT,
            error          TEXT
        )"
    ))
    .execute(pool)
    .await
    .unwrap();
}

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    PgPool::connect(&url).await.unwrap()
}

async fn count_rows(pool: &PgPool, schema: &str) -> i64 {
    sqlx::query(&format!(
        "SELECT COUNT(*) AS n FROM \"{schema}\".my_amm_swap_event"
    ))
    .fetch_one(pool)
    .await
    .unwrap()
    .get("n")
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
async fn idempotent_fanout_across_two_subscribers() {
    let pool = connect().await;
    provision(&pool, "uho_test_s1", true).await;
    provision(&pool, "uho_test_s2", true).await;

    let spec = swap_spec();
    let writer = FanoutWriter::new(pool.clone(), "uho_events_test", 7500);
    let subscribers = vec![
        subscriber("u1", "uho_test_s1"),
        subscriber("u2", "uho_test_s2"),
    ];
    let events = vec![swap_event("SwapSig1", 100)];
    let logs = vec![TxLogRecord {
        tx_signature: "SwapSig1".into(),
        slot: 100,
        logs: vec!["Program data: ...".into()],
    }];

    // Write the same batch twice: one row per subscriber, counted once.
    for _ in 0..2 {
        let outcomes = writer
            .write(&spec, &events, &[], &logs, &[], &subscribers, Some("SwapSig1"))
            .await;
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    for schema in ["uho_test_s1", "uho_test_s2"] {
        assert_eq!(count_rows(&pool, schema).await, 1, "schema {schema}");

        let state = sqlx::query(&format!(
            "SELECT last_slot, last_signature, events_indexed, status
             FROM \"{schema}\"._uho_state WHERE program_id = $1"
        ))
        .bind(&spec.program_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(state.get::<Option<i64>, _>("last_slot"), Some(100));
        assert_eq!(
            state.get::<Option<String>, _>("last_signature").as_deref(),
            Some("SwapSig1")
        );
        assert_eq!(state.get::<Option<i64>, _>("events_indexed"), Some(1));
        assert_eq!(state.get::<Option<String>, _>("status").as_deref(), Some("running"));

        let log_count: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM \"{schema}\"._tx_logs"
        ))
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
        assert_eq!(log_count, 1);
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
async fn subscriber_failure_is_contained() {
    let pool = connect().await;
    provision(&pool, "uho_test_ok", true).await;
    // Missing event table makes this subscriber's write fail.
    provision(&pool, "uho_test_broken", false).await;

    let spec = swap_spec();
    let writer = FanoutWriter::new(pool.clone(), "uho_events_test", 7500);
    let subscribers = vec![
        subscriber("broken", "uho_test_broken"),
        subscriber("ok", "uho_test_ok"),
    ];
    let events = vec![swap_event("IsoSig1", 200)];

    let outcomes = writer
        .write(&spec, &events, &[], &[], &[], &subscribers, Some("IsoSig1"))
        .await;

    assert!(outcomes[0].result.is_err());
    let counts = outcomes[1].result.as_ref().unwrap();
    assert_eq!(counts.events, 1);
    assert_eq!(count_rows(&pool, "uho_test_ok").await, 1);

    // The failing subscriber's cursor row records the error.
    let status: Option<String> = sqlx::query(
        "SELECT status FROM \"uho_test_broken\"._uho_state WHERE program_id = $1",
    )
    .bind(&spec.program_id)
    .fetch_optional(&pool)
    .await
    .unwrap()
    .and_then(|row| row.get("status"));
    assert_eq!(status.as_deref(), Some("error"));
}

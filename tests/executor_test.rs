//! Resilient executor: retry policy, parameter validation, DDL convention.

mod common;

use std::sync::Arc;

use common::{single_row, MockDriver, MockHub, Planned, DEFAULT_AFFECTED};
use pg_adapter::db::{ConnectionPool, ResilientExecutor};
use pg_adapter::error::AdapterError;
use pg_adapter::models::ParamValue;

fn setup(capacity: usize) -> (Arc<MockHub>, ConnectionPool, ResilientExecutor) {
    let hub = MockHub::new();
    let pool = ConnectionPool::new(MockDriver::new(Arc::clone(&hub)), "mock://", capacity);
    (hub, pool, ResilientExecutor::new())
}

#[test]
fn query_returns_planned_rows() {
    let (hub, pool, executor) = setup(2);
    hub.plan(Planned::Rows(single_row(&[("a", "1")])));

    let rows = executor.execute_query(&pool, "SELECT 1 AS a", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("a"), Some("1"));
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn broken_connection_triggers_exactly_one_retry() {
    let (hub, pool, executor) = setup(2);
    hub.plan(Planned::Broken);
    hub.plan(Planned::Rows(single_row(&[("x", "ok")])));

    let rows = executor
        .execute_query(&pool, "SELECT x FROM t", &[])
        .unwrap();
    assert_eq!(rows[0].get("x"), Some("ok"));

    // Two attempts on two different connections; the broken one destroyed.
    let ids = hub.executed_connection_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(hub.dropped_count(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn stale_idle_connection_is_discarded_and_consumes_one_attempt() {
    let (hub, pool, executor) = setup(2);
    // The first pooled connection goes stale while idle; the executor's
    // pre-check must catch it before anything is sent.
    hub.closed_ids.lock().push(0);
    hub.plan(Planned::Rows(single_row(&[("x", "ok")])));

    let rows = executor
        .execute_query(&pool, "SELECT x FROM t", &[])
        .unwrap();
    assert_eq!(rows[0].get("x"), Some("ok"));

    // The stale handle never executed anything and was destroyed.
    assert_eq!(hub.executed_connection_ids(), vec![1]);
    assert_eq!(hub.dropped_count(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn two_stale_connections_exhaust_the_attempt_budget() {
    let (hub, pool, executor) = setup(3);
    hub.closed_ids.lock().extend([0, 1]);

    let err = executor
        .execute_query(&pool, "SELECT 1", &[])
        .unwrap_err();
    assert!(matches!(err, AdapterError::BrokenConnection { .. }));

    // Two pre-check failures consume the whole budget; the third idle
    // connection is never tried.
    assert_eq!(hub.executed_count(), 0);
    assert_eq!(hub.dropped_count(), 2);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn second_broken_connection_is_terminal() {
    let (hub, pool, executor) = setup(3);
    hub.plan(Planned::Broken);
    hub.plan(Planned::Broken);

    let err = executor
        .execute_query(&pool, "SELECT 1", &[])
        .unwrap_err();
    assert!(matches!(err, AdapterError::BrokenConnection { .. }));

    // No third attempt, both broken connections destroyed.
    assert_eq!(hub.executed_count(), 2);
    assert_eq!(hub.dropped_count(), 2);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn statement_errors_are_never_retried() {
    let (hub, pool, executor) = setup(2);
    hub.plan(Planned::Reject("syntax error at or near \"SELEC\""));

    let err = executor.execute_query(&pool, "SELEC 1", &[]).unwrap_err();
    match err {
        AdapterError::Statement { sql_state, .. } => {
            assert_eq!(sql_state.as_deref(), Some("42601"));
        }
        other => panic!("expected Statement, got {other:?}"),
    }

    // Single attempt, connection released back intact.
    assert_eq!(hub.executed_count(), 1);
    assert_eq!(hub.dropped_count(), 0);
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn oversized_parameter_list_rejected_before_pool_is_touched() {
    let (hub, pool, executor) = setup(2);
    let params = vec![ParamValue::Int(1); 6];

    let err = executor
        .execute_query(&pool, "SELECT $1", &params)
        .unwrap_err();
    assert!(matches!(err, AdapterError::UnsupportedParameter { .. }));

    let err = executor
        .execute_non_query(&pool, "INSERT INTO t VALUES ($1)", &params)
        .unwrap_err();
    assert!(matches!(err, AdapterError::UnsupportedParameter { .. }));

    assert_eq!(hub.executed_count(), 0);
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn params_are_encoded_positionally() {
    let (hub, pool, executor) = setup(1);
    let params = vec![
        ParamValue::Int(7),
        ParamValue::Bool(false),
        ParamValue::Null,
        ParamValue::Vec2(1.0, 2.0),
    ];
    executor
        .execute_non_query(&pool, "INSERT INTO t VALUES ($1,$2,$3,$4)", &params)
        .unwrap();

    let log = hub.exec_log.lock();
    assert_eq!(log[0].2, vec!["7", "false", "", "(1,2)"]);
}

#[test]
fn ddl_statements_report_zero_affected_rows() {
    let (hub, pool, executor) = setup(1);

    // The mock driver reports a nonzero count; the convention overrides it.
    for sql in [
        "CREATE TABLE t(x int)",
        "  drop table t",
        "ALTER TABLE t ADD y int",
        "\ttruncate t",
    ] {
        let affected = executor.execute_non_query(&pool, sql, &[]).unwrap();
        assert_eq!(affected, 0, "expected 0 affected for {sql:?}");
    }
    assert_eq!(hub.executed_count(), 4);
}

#[test]
fn data_statements_report_driver_count() {
    let (_hub, pool, executor) = setup(1);
    let affected = executor
        .execute_non_query(&pool, "UPDATE t SET x = 1", &[])
        .unwrap();
    assert_eq!(affected, DEFAULT_AFFECTED);
}

#[test]
fn exhausted_pool_fails_fast_after_shutdown() {
    let (_hub, pool, executor) = setup(1);
    pool.shutdown();

    let err = executor.execute_query(&pool, "SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, AdapterError::PoolExhausted { .. }));
}

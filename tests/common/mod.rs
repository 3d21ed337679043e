//! Scriptable in-memory driver for exercising the pool, executor and
//! transaction manager without a live database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pg_adapter::db::driver::{BoxedConnection, Connection, Driver, DriverError};
use pg_adapter::models::Row;

/// Affected-row count reported when no outcome is planned.
pub const DEFAULT_AFFECTED: u64 = 3;

/// A scripted outcome for the next statement execution, consumed front
/// first across all connections.
pub enum Planned {
    /// Query succeeds with these rows.
    Rows(Vec<Row>),
    /// Non-query succeeds with this driver-reported count.
    Affected(u64),
    /// The connection breaks: it reports closed from now on and the
    /// statement fails with a broken-connection error.
    Broken,
    /// The statement is rejected; the connection stays usable.
    Reject(&'static str),
}

/// One executed statement: connection id, sql, encoded params.
pub type ExecRecord = (usize, String, Vec<String>);

#[derive(Default)]
pub struct MockHub {
    plans: Mutex<VecDeque<Planned>>,
    pub exec_log: Mutex<Vec<ExecRecord>>,
    /// Connections currently inside an execution; used to detect a handle
    /// reaching two borrowers at once.
    active: Mutex<Vec<usize>>,
    next_id: AtomicUsize,
    /// The first N connect calls fail.
    pub connect_failures: AtomicUsize,
    /// Freshly opened connections report closed immediately.
    pub connect_closed: AtomicBool,
    /// Connections (by id) that report closed after being pooled; simulates
    /// a session dropped while idle.
    pub closed_ids: Mutex<Vec<usize>>,
    /// Connections destroyed so far.
    pub dropped: AtomicUsize,
    /// Fail the next COMMIT with a statement error.
    pub fail_next_commit: AtomicBool,
    /// Fail the next ROLLBACK with a statement error.
    pub fail_next_rollback: AtomicBool,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, outcome: Planned) {
        self.plans.lock().push_back(outcome);
    }

    pub fn executed_count(&self) -> usize {
        self.exec_log.lock().len()
    }

    pub fn executed_connection_ids(&self) -> Vec<usize> {
        self.exec_log.lock().iter().map(|(id, _, _)| *id).collect()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn enter(&self, id: usize) {
        let mut active = self.active.lock();
        assert!(
            !active.contains(&id),
            "connection {id} handed to two borrowers"
        );
        active.push(id);
    }

    fn exit(&self, id: usize) {
        self.active.lock().retain(|&a| a != id);
    }
}

pub struct MockConnection {
    id: usize,
    open: bool,
    hub: Arc<MockHub>,
}

impl MockConnection {
    fn record(&self, sql: &str, params: &[String]) {
        self.hub
            .exec_log
            .lock()
            .push((self.id, sql.to_string(), params.to_vec()));
    }

    fn run(&mut self, sql: &str, params: &[String]) -> Result<Planned, DriverError> {
        self.hub.enter(self.id);
        // Keep the handle observably "in use" long enough for concurrent
        // borrowers to collide if the pool ever duplicated it.
        thread::sleep(Duration::from_millis(1));
        self.record(sql, params);
        let planned = self.hub.plans.lock().pop_front();
        self.hub.exit(self.id);

        match planned {
            Some(Planned::Broken) => {
                self.open = false;
                Err(DriverError::broken("mock connection lost"))
            }
            Some(Planned::Reject(msg)) => {
                Err(DriverError::statement(msg, Some("42601".to_string())))
            }
            Some(other) => Ok(other),
            None => Ok(Planned::Affected(DEFAULT_AFFECTED)),
        }
    }
}

impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.open && !self.hub.closed_ids.lock().contains(&self.id)
    }

    fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>, DriverError> {
        match self.run(sql, params)? {
            Planned::Rows(rows) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }

    fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64, DriverError> {
        match self.run(sql, params)? {
            Planned::Affected(n) => Ok(n),
            _ => Ok(DEFAULT_AFFECTED),
        }
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.record("BEGIN", &[]);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.record("COMMIT", &[]);
        if self.hub.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DriverError::statement("mock commit failure", None));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.record("ROLLBACK", &[]);
        if self.hub.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(DriverError::statement("mock rollback failure", None));
        }
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.hub.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockDriver {
    hub: Arc<MockHub>,
}

impl MockDriver {
    pub fn new(hub: Arc<MockHub>) -> Arc<Self> {
        Arc::new(Self { hub })
    }
}

impl Driver for MockDriver {
    fn connect(&self, _target: &str) -> Result<BoxedConnection, DriverError> {
        let budget = &self.hub.connect_failures;
        if budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DriverError::broken("mock connect refused"));
        }
        let id = self.hub.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            id,
            open: !self.hub.connect_closed.load(Ordering::SeqCst),
            hub: Arc::clone(&self.hub),
        }))
    }
}

/// Convenience: a one-row result set.
pub fn single_row(columns: &[(&str, &str)]) -> Vec<Row> {
    let mut row = Row::new();
    for (name, value) in columns {
        row.push(*name, *value);
    }
    vec![row]
}

//! In-memory control store
//!
//! Implements the same transactional contract as the DuckDB backend: the
//! closure works on a copy of the state, which replaces the live state only
//! when the closure succeeds.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ControlStore, ControlTransaction, DatabaseError, DatabaseResult};
use crate::models::{ControlRecord, RowSet, Value};
use crate::period::Period;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    initialized: bool,
    last_id: i64,
    records: Vec<ControlRecord>,
    tables: HashMap<String, RowSet>,
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DatabaseResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Snapshot of every control record, ordered by id
    pub fn records(&self) -> DatabaseResult<Vec<ControlRecord>> {
        Ok(self.lock()?.records.clone())
    }

    /// Snapshot of a destination table
    pub fn table(&self, name: &str) -> DatabaseResult<Option<RowSet>> {
        Ok(self.lock()?.tables.get(name).cloned())
    }
}

impl ControlStore for MemoryStore {
    fn initialize(&self) -> DatabaseResult<()> {
        self.lock()?.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> DatabaseResult<bool> {
        Ok(self.lock()?.initialized)
    }

    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn ControlTransaction) -> DatabaseResult<()>,
    ) -> DatabaseResult<()> {
        let mut live = self.lock()?;
        let mut working = live.clone();
        body(&mut MemoryTransaction {
            state: &mut working,
        })?;
        *live = working;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut MemoryState,
}

impl ControlTransaction for MemoryTransaction<'_> {
    fn latest_record(&mut self, period: Period) -> DatabaseResult<Option<ControlRecord>> {
        Ok(self
            .state
            .records
            .iter()
            .filter(|r| r.period == period)
            .max_by_key(|r| r.id)
            .cloned())
    }

    fn insert_record(
        &mut self,
        period: Period,
        started_at: NaiveDateTime,
    ) -> DatabaseResult<ControlRecord> {
        self.state.last_id += 1;
        let record = ControlRecord {
            id: self.state.last_id,
            period,
            started_at,
            finished_at: None,
        };
        self.state.records.push(record.clone());
        Ok(record)
    }

    fn finish_record(&mut self, id: i64, finished_at: NaiveDateTime) -> DatabaseResult<()> {
        let record = self
            .state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DatabaseError::InvalidInput(format!("Control record {} not found", id)))?;
        record.finished_at = Some(finished_at);
        Ok(())
    }

    fn records_between(
        &mut self,
        start: Period,
        end: Period,
    ) -> DatabaseResult<Vec<ControlRecord>> {
        Ok(self
            .state
            .records
            .iter()
            .filter(|r| r.period >= start && r.period <= end)
            .cloned()
            .collect())
    }

    fn delete_period_rows(
        &mut self,
        table: &str,
        period_column: &str,
        period: Period,
    ) -> DatabaseResult<usize> {
        let Some(existing) = self.state.tables.get(table) else {
            return Ok(0);
        };
        let idx = existing.column_index(period_column).ok_or_else(|| {
            DatabaseError::InvalidInput(format!(
                "Table {} has no column {}",
                table, period_column
            ))
        })?;
        let stamp = Value::Int(period.as_int());
        let kept: Vec<Vec<Value>> = existing
            .rows()
            .iter()
            .filter(|row| row[idx] != stamp)
            .cloned()
            .collect();
        let removed = existing.len() - kept.len();
        let rebuilt = RowSet::from_rows(existing.columns().to_vec(), kept)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.state.tables.insert(table.to_string(), rebuilt);
        Ok(removed)
    }

    fn append_rows(&mut self, table: &str, rows: &RowSet) -> DatabaseResult<usize> {
        match self.state.tables.get_mut(table) {
            Some(existing) => existing
                .extend(rows)
                .map_err(|e| DatabaseError::QueryFailed(format!("Append to {}: {}", table, e)))?,
            None => {
                self.state.tables.insert(table.to_string(), rows.clone());
            }
        }
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::transaction;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn period() -> Period {
        "20240101".parse().unwrap()
    }

    #[test]
    fn test_ids_increase_and_latest_wins() {
        let store = MemoryStore::new();
        let (a, b) = transaction(&store, |tx| {
            let a = tx.insert_record(period(), at(1))?;
            let b = tx.insert_record(period(), at(2))?;
            Ok((a, b))
        })
        .unwrap();
        assert!(b.id > a.id);

        let latest = transaction(&store, |tx| tx.latest_record(period())).unwrap();
        assert_eq!(latest.unwrap().id, b.id);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = MemoryStore::new();
        let result: DatabaseResult<()> = transaction(&store, |tx| {
            tx.insert_record(period(), at(1))?;
            Err(DatabaseError::QueryFailed("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_delete_scoped_by_period() {
        let store = MemoryStore::new();
        let rows = |day: i64| {
            RowSet::from_rows(
                vec!["id".to_string(), "data_carga".to_string()],
                vec![vec![Value::Int(1), Value::Int(day)]],
            )
            .unwrap()
        };
        transaction(&store, |tx| {
            tx.append_rows("itens", &rows(20240101))?;
            tx.append_rows("itens", &rows(20240102))?;
            Ok(())
        })
        .unwrap();

        let removed = transaction(&store, |tx| {
            tx.delete_period_rows("itens", "data_carga", period())
        })
        .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.table("itens").unwrap().unwrap().len(), 1);

        let missing =
            transaction(&store, |tx| tx.delete_period_rows("ghost", "data_carga", period()))
                .unwrap();
        assert_eq!(missing, 0);
    }

    #[test]
    fn test_finish_unknown_record_fails() {
        let store = MemoryStore::new();
        let err = transaction(&store, |tx| tx.finish_record(99, at(1))).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }
}

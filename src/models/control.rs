//! Control records
//!
//! One record is written per load attempt of a period. Records are never
//! deleted; the one with the greatest id is authoritative for its period.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// Bookkeeping row for one load attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Store-assigned, strictly increasing
    pub id: i64,
    pub period: Period,
    pub started_at: NaiveDateTime,
    /// `None` while the load is running, or if it was abandoned
    pub finished_at: Option<NaiveDateTime>,
}

impl ControlRecord {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Short status label used by `status` listings
    pub fn status_label(&self) -> &'static str {
        if self.is_finished() {
            "finished"
        } else {
            "unfinished"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_finished_flag() {
        let started = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        let mut record = ControlRecord {
            id: 1,
            period: "20240101".parse().unwrap(),
            started_at: started,
            finished_at: None,
        };
        assert!(!record.is_finished());
        assert_eq!(record.status_label(), "unfinished");

        record.finished_at = Some(started);
        assert!(record.is_finished());
    }
}

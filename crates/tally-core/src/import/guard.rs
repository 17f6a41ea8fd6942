//! Batch persistence behind the duplicate-submission guard
//!
//! A client tags each import with a session id. While the import runs, the
//! session carries `processing:<percent>`; once it succeeds, `finished:<count>`.
//! A second submission under the same id replays the count instead of importing
//! again, or is rejected while the first is still running.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::models::NewTransaction;
use crate::store::TransactionStore;

/// Short-lived per-session import markers, keyed by (uid, client session id)
pub trait SubmissionRemarks: Send + Sync {
    fn get(&self, uid: i64, session_id: &str) -> Option<String>;
    fn set(&self, uid: i64, session_id: &str, remark: String);
    fn remove(&self, uid: i64, session_id: &str);

    /// Check and claim a session in one step
    ///
    /// Stores `remark` unless the session already holds a readable one, and
    /// returns whatever was there before.
    fn try_begin(&self, uid: i64, session_id: &str, remark: String) -> Option<String>;
}

/// Process-local remark store with per-entry expiry
pub struct InMemorySubmissionRemarks {
    ttl: Duration,
    entries: Mutex<HashMap<(i64, String), (String, Instant)>>,
}

impl InMemorySubmissionRemarks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl SubmissionRemarks for InMemorySubmissionRemarks {
    fn get(&self, uid: i64, session_id: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        entries
            .get(&(uid, session_id.to_string()))
            .map(|(remark, _)| remark.clone())
    }

    fn set(&self, uid: i64, session_id: &str, remark: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (uid, session_id.to_string()),
                (remark, Instant::now() + self.ttl),
            );
        }
    }

    fn remove(&self, uid: i64, session_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(uid, session_id.to_string()));
        }
    }

    fn try_begin(&self, uid: i64, session_id: &str, remark: String) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);

        let key = (uid, session_id.to_string());
        let previous = entries.get(&key).map(|(existing, _)| existing.clone());
        if previous.as_deref().and_then(SubmissionState::parse).is_none() {
            entries.insert(key, (remark, now + self.ttl));
        }
        previous
    }
}

/// Parsed session remark
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmissionState {
    /// Percentage complete, when readable
    Processing(Option<f64>),
    Finished(usize),
}

impl SubmissionState {
    pub fn parse(remark: &str) -> Option<Self> {
        let mut parts = remark.splitn(2, ':');
        let state = parts.next()?;
        let value = parts.next().unwrap_or("");

        match state {
            "processing" => Some(Self::Processing(value.parse().ok())),
            "finished" => value.parse().ok().map(Self::Finished),
            _ => None,
        }
    }

    pub fn remark(&self) -> String {
        match self {
            Self::Processing(Some(p)) => format!("processing:{:.2}", p),
            Self::Processing(None) => "processing".to_string(),
            Self::Finished(count) => format!("finished:{}", count),
        }
    }
}

/// What an import call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(usize),
    /// An earlier submission with the same session id already imported this many
    Replayed(usize),
}

impl ImportOutcome {
    pub fn count(&self) -> usize {
        match self {
            Self::Imported(n) | Self::Replayed(n) => *n,
        }
    }
}

/// Persist a resolved batch, guarded by the session marker
///
/// Without a remark store, or with an empty session id, the guard is skipped.
pub fn import_transactions<S, R>(
    store: &S,
    remarks: Option<&R>,
    uid: i64,
    session_id: &str,
    transactions: &[NewTransaction],
) -> Result<ImportOutcome>
where
    S: TransactionStore + ?Sized,
    R: SubmissionRemarks + ?Sized,
{
    let guard = remarks.filter(|_| !session_id.is_empty());

    if let Some(remarks) = guard {
        let claim = SubmissionState::Processing(Some(0.0)).remark();
        if let Some(remark) = remarks.try_begin(uid, session_id, claim) {
            match SubmissionState::parse(&remark) {
                Some(SubmissionState::Finished(count)) => {
                    info!(
                        "Import session \"{}\" already finished with {} transactions",
                        session_id, count
                    );
                    return Ok(ImportOutcome::Replayed(count));
                }
                Some(SubmissionState::Processing(_)) => return Err(Error::RepeatedRequest),
                None => warn!(
                    "Replaced unreadable remark \"{}\" for import session \"{}\"",
                    remark, session_id
                ),
            }
        }
    }

    let mut on_progress = |fraction: f64| {
        if let Some(remarks) = guard {
            remarks.set(
                uid,
                session_id,
                SubmissionState::Processing(Some(fraction * 100.0)).remark(),
            );
        }
    };

    match store.batch_create_transactions(uid, transactions, &mut on_progress) {
        Ok(count) => {
            if let Some(remarks) = guard {
                remarks.set(uid, session_id, SubmissionState::Finished(count).remark());
            }
            info!("Imported {} transactions for uid {}", count, uid);
            Ok(ImportOutcome::Imported(count))
        }
        Err(e) => {
            if let Some(remarks) = guard {
                remarks.remove(uid, session_id);
            }
            error!("Failed to import transactions for uid {}: {}", uid, e);
            Err(e)
        }
    }
}

/// Import progress for a session: a percentage, `100` once finished, `None` when unknown
pub fn import_progress<R>(remarks: &R, uid: i64, session_id: &str) -> Option<f64>
where
    R: SubmissionRemarks + ?Sized,
{
    let remark = remarks.get(uid, session_id)?;
    match SubmissionState::parse(&remark)? {
        SubmissionState::Finished(_) => Some(100.0),
        SubmissionState::Processing(Some(p)) if p >= 0.0 => Some(p.min(100.0)),
        SubmissionState::Processing(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use std::cell::Cell;

    struct CountingStore {
        calls: Cell<usize>,
        fail: bool,
    }

    impl CountingStore {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
            }
        }
    }

    impl TransactionStore for CountingStore {
        fn batch_create_transactions(
            &self,
            _uid: i64,
            transactions: &[NewTransaction],
            progress: &mut dyn FnMut(f64),
        ) -> Result<usize> {
            self.calls.set(self.calls.get() + 1);
            progress(0.5);
            if self.fail {
                return Err(Error::InvalidData("disk full".into()));
            }
            Ok(transactions.len())
        }
    }

    fn batch(n: usize) -> Vec<NewTransaction> {
        (0..n)
            .map(|_| NewTransaction {
                transaction_type: TransactionType::Expense,
                time: chrono::NaiveDate::from_ymd_opt(2026, 2, 9)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .unwrap(),
                utc_offset_minutes: 0,
                category_id: None,
                account_id: 1,
                amount: 100,
                related_account_id: None,
                related_amount: 0,
                counterparty_id: None,
                description: String::new(),
                geo_location: None,
                planned: false,
                tag_ids: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_second_submission_replays_count() {
        let store = CountingStore::new(false);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

        let first = import_transactions(&store, Some(&remarks), 1, "s1", &batch(3)).unwrap();
        assert_eq!(first, ImportOutcome::Imported(3));

        let second = import_transactions(&store, Some(&remarks), 1, "s1", &batch(3)).unwrap();
        assert_eq!(second, ImportOutcome::Replayed(3));
        assert_eq!(store.calls.get(), 1);
        assert_eq!(import_progress(&remarks, 1, "s1"), Some(100.0));
    }

    #[test]
    fn test_sessions_are_scoped_per_user() {
        let store = CountingStore::new(false);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

        import_transactions(&store, Some(&remarks), 1, "s1", &batch(1)).unwrap();
        let other = import_transactions(&store, Some(&remarks), 2, "s1", &batch(2)).unwrap();
        assert_eq!(other, ImportOutcome::Imported(2));
    }

    #[test]
    fn test_processing_session_is_rejected() {
        let store = CountingStore::new(false);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));
        remarks.set(1, "s1", "processing:42.00".to_string());

        let result = import_transactions(&store, Some(&remarks), 1, "s1", &batch(1));
        assert!(matches!(result, Err(Error::RepeatedRequest)));
        assert_eq!(store.calls.get(), 0);
        assert_eq!(import_progress(&remarks, 1, "s1"), Some(42.0));
    }

    #[test]
    fn test_failure_clears_marker() {
        let store = CountingStore::new(true);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

        assert!(import_transactions(&store, Some(&remarks), 1, "s1", &batch(1)).is_err());
        assert_eq!(remarks.get(1, "s1"), None);
    }

    #[test]
    fn test_unreadable_remark_is_ignored() {
        let store = CountingStore::new(false);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));
        remarks.set(1, "s1", "garbage".to_string());

        let outcome = import_transactions(&store, Some(&remarks), 1, "s1", &batch(2)).unwrap();
        assert_eq!(outcome, ImportOutcome::Imported(2));
    }

    #[test]
    fn test_empty_session_skips_guard() {
        let store = CountingStore::new(false);
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

        import_transactions(&store, Some(&remarks), 1, "", &batch(1)).unwrap();
        import_transactions(&store, Some(&remarks), 1, "", &batch(1)).unwrap();
        assert_eq!(store.calls.get(), 2);

        let none: Option<&InMemorySubmissionRemarks> = None;
        import_transactions(&store, none, 1, "s1", &batch(1)).unwrap();
        assert_eq!(store.calls.get(), 3);
    }

    #[test]
    fn test_concurrent_claims_admit_one_submission() {
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

        let claimed = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        remarks
                            .try_begin(1, "s1", "processing:0.00".to_string())
                            .is_none()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(claimed, 1);
        assert_eq!(remarks.get(1, "s1").as_deref(), Some("processing:0.00"));
    }

    #[test]
    fn test_try_begin_keeps_readable_remark() {
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));
        remarks.set(1, "s1", "finished:4".to_string());
        remarks.set(1, "s2", "garbage".to_string());

        let previous = remarks.try_begin(1, "s1", "processing:0.00".to_string());
        assert_eq!(previous.as_deref(), Some("finished:4"));
        assert_eq!(remarks.get(1, "s1").as_deref(), Some("finished:4"));

        let previous = remarks.try_begin(1, "s2", "processing:0.00".to_string());
        assert_eq!(previous.as_deref(), Some("garbage"));
        assert_eq!(remarks.get(1, "s2").as_deref(), Some("processing:0.00"));
    }

    #[test]
    fn test_expired_remarks_disappear() {
        let remarks = InMemorySubmissionRemarks::new(Duration::from_millis(0));
        remarks.set(1, "s1", "finished:3".to_string());
        assert_eq!(remarks.get(1, "s1"), None);
    }

    #[test]
    fn test_progress_values() {
        let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));
        assert_eq!(import_progress(&remarks, 1, "none"), None);

        remarks.set(1, "a", "processing:150".to_string());
        assert_eq!(import_progress(&remarks, 1, "a"), Some(100.0));

        remarks.set(1, "b", "processing:-1".to_string());
        assert_eq!(import_progress(&remarks, 1, "b"), None);

        remarks.set(1, "c", "processing:abc".to_string());
        assert_eq!(import_progress(&remarks, 1, "c"), None);

        remarks.set(1, "d", "something:else".to_string());
        assert_eq!(import_progress(&remarks, 1, "d"), None);
    }

    #[test]
    fn test_state_round_trip() {
        assert_eq!(SubmissionState::Processing(Some(12.345)).remark(), "processing:12.35");
        assert_eq!(
            SubmissionState::parse("finished:7"),
            Some(SubmissionState::Finished(7))
        );
        assert_eq!(
            SubmissionState::parse("processing"),
            Some(SubmissionState::Processing(None))
        );
        assert_eq!(SubmissionState::parse("finished:x"), None);
    }
}

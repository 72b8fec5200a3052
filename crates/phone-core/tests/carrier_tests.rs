//! Carrier support probe against an in-memory provider

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mms_phone_core::{is_supported, CarrierSupportProbe, ContentProvider, Cursor, PhoneError, Result};
use url::Url;

type Row = HashMap<&'static str, i64>;

struct RowCursor {
    rows: Vec<Row>,
    position: Option<usize>,
    closed: Arc<AtomicUsize>,
}

impl Cursor for RowCursor {
    fn move_to_first(&mut self) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        self.position = Some(0);
        true
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        // Every row of a result shares the same columns
        let mut columns: Vec<_> = self.rows.first()?.keys().collect();
        columns.sort();
        columns.iter().position(|c| **c == name)
    }

    fn get_int(&self, column: usize) -> Option<i64> {
        let row = &self.rows[self.position?];
        let mut columns: Vec<_> = row.keys().collect();
        columns.sort();
        row.get(*columns.get(column)?).copied()
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryProvider {
    rows: Vec<Row>,
    fail: bool,
    no_cursor: bool,
    closed: Arc<AtomicUsize>,
    queried: Mutex<Vec<Url>>,
}

impl MemoryProvider {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ContentProvider for MemoryProvider {
    fn query(&self, uri: &Url) -> Result<Option<Box<dyn Cursor>>> {
        self.queried.lock().unwrap().push(uri.clone());
        if self.fail {
            return Err(PhoneError::provider("provider went away"));
        }
        if self.no_cursor {
            return Ok(None);
        }
        Ok(Some(Box::new(RowCursor {
            rows: self.rows.clone(),
            position: None,
            closed: self.closed.clone(),
        })))
    }
}

fn row(pairs: &[(&'static str, i64)]) -> Row {
    pairs.iter().cloned().collect()
}

#[test]
fn supported_only_when_first_row_says_one() {
    let provider = MemoryProvider::with_rows(vec![row(&[("mmsSupport", 1), ("volteSupport", 0)])]);
    assert!(is_supported(&provider, 4));
    assert_eq!(provider.closed(), 1);
    assert_eq!(
        provider.queried.lock().unwrap()[0].as_str(),
        "content://com.spreadtrum.vowifi.accountsettings/message?subId=4"
    );

    let provider = MemoryProvider::with_rows(vec![row(&[("mmsSupport", 2)])]);
    assert!(!is_supported(&provider, 4));

    let provider = MemoryProvider::with_rows(vec![row(&[("mmsSupport", 0)]), row(&[("mmsSupport", 1)])]);
    assert!(!is_supported(&provider, 4));
    assert_eq!(provider.closed(), 1);
}

#[test]
fn no_rows_means_unsupported() {
    let provider = MemoryProvider::with_rows(vec![]);
    assert!(!is_supported(&provider, 1));
    assert_eq!(provider.closed(), 1);
}

#[test]
fn missing_column_means_unsupported() {
    let provider = MemoryProvider::with_rows(vec![row(&[("volteSupport", 1)])]);
    assert!(!is_supported(&provider, 1));
    assert_eq!(provider.closed(), 1);
}

#[test]
fn query_failures_mean_unsupported() {
    let provider = MemoryProvider {
        fail: true,
        ..Default::default()
    };
    assert!(!is_supported(&provider, 1));

    let provider = MemoryProvider {
        no_cursor: true,
        ..Default::default()
    };
    assert!(!is_supported(&provider, 1));
    assert_eq!(provider.closed(), 0);
}

#[test]
fn probe_wraps_a_shared_provider() {
    let provider = Arc::new(MemoryProvider::with_rows(vec![row(&[("mmsSupport", 1)])]));
    let probe = CarrierSupportProbe::new(provider.clone());
    assert!(probe.is_supported(1));
    assert!(probe.is_supported(2));
    assert_eq!(provider.closed(), 2);
}

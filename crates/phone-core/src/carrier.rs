//! Carrier MMS-over-VoWiFi support probe
//!
//! The carrier settings provider answers a query on
//! `content://com.spreadtrum.vowifi.accountsettings/message?subId=<id>` with
//! an integer `mmsSupport` column. Only the first row matters.

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;

/// Authority of the VoWiFi account settings provider
pub const ACCOUNT_SETTINGS_AUTHORITY: &str = "com.spreadtrum.vowifi.accountsettings";

/// Path of the message settings table
pub const MESSAGE_PATH: &str = "message";

/// Column holding 1 when the carrier supports MMS over VoWiFi
pub const MMS_SUPPORT_COLUMN: &str = "mmsSupport";

static MESSAGE_URI: Lazy<Url> = Lazy::new(|| {
    Url::parse(&format!("content://{}/{}", ACCOUNT_SETTINGS_AUTHORITY, MESSAGE_PATH)).unwrap()
});

/// Result rows of a provider query
pub trait Cursor {
    /// Move to the first row; false when there are no rows
    fn move_to_first(&mut self) -> bool;

    /// Index of `name`, if the result has such a column
    fn column_index(&self, name: &str) -> Option<usize>;

    /// Integer value of `column` in the current row
    fn get_int(&self, column: usize) -> Option<i64>;

    /// Release the cursor
    fn close(&mut self);
}

/// Content provider queried by URI
pub trait ContentProvider: Send + Sync {
    /// Run a query; `None` means the provider returned no cursor
    fn query(&self, uri: &Url) -> Result<Option<Box<dyn Cursor>>>;
}

/// Closes the wrapped cursor however the probe returns
struct CursorGuard(Box<dyn Cursor>);

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// `content://<authority>/message?subId=<sub_id>`
pub fn message_uri(sub_id: i32) -> Url {
    let mut uri = MESSAGE_URI.clone();
    uri.query_pairs_mut().append_pair("subId", &sub_id.to_string());
    uri
}

/// Whether the carrier behind `sub_id` supports MMS over VoWiFi
///
/// False on no rows, a missing column or any query failure.
pub fn is_supported(provider: &dyn ContentProvider, sub_id: i32) -> bool {
    let uri = message_uri(sub_id);

    let cursor = match provider.query(&uri) {
        Ok(Some(cursor)) => cursor,
        Ok(None) => {
            debug!("No cursor for {}", uri);
            return false;
        }
        Err(e) => {
            warn!("Query of {} failed: {}", uri, e);
            return false;
        }
    };

    let mut cursor = CursorGuard(cursor);
    if !cursor.0.move_to_first() {
        debug!("No carrier settings row for sub {}", sub_id);
        return false;
    }

    let Some(index) = cursor.0.column_index(MMS_SUPPORT_COLUMN) else {
        warn!("Carrier settings for sub {} have no {} column", sub_id, MMS_SUPPORT_COLUMN);
        return false;
    };

    let supported = cursor.0.get_int(index) == Some(1);
    debug!("Carrier MMS over VoWiFi support for sub {}: {}", sub_id, supported);
    supported
}

/// Probe bound to one provider
#[derive(Clone)]
pub struct CarrierSupportProbe {
    provider: Arc<dyn ContentProvider>,
}

impl CarrierSupportProbe {
    pub fn new(provider: Arc<dyn ContentProvider>) -> Self {
        Self { provider }
    }

    pub fn is_supported(&self, sub_id: i32) -> bool {
        is_supported(self.provider.as_ref(), sub_id)
    }
}

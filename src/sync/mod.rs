/// Long-poll synchronization: the cursor, poll outcomes and backoff

pub mod retry;
pub mod sync_key;

pub use retry::{should_retry, RetryPolicy};
pub use sync_key::{SyncKey, SyncKeyPair, SyncKeyPayload};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one sync-check poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncCheckOutcome {
    /// Nothing new
    Normal,
    /// The poll itself failed; back off before trying again
    Fail,
    /// New messages are waiting
    NewMessage,
    /// Contact or group membership changed
    NewJoin,
    /// A selector this client does not know about
    Unknown,
}

impl SyncCheckOutcome {
    /// Map the wire `selector` value
    pub fn from_selector(selector: i64) -> Self {
        match selector {
            0 => SyncCheckOutcome::Normal,
            1 => SyncCheckOutcome::Fail,
            2 => SyncCheckOutcome::NewMessage,
            3 => SyncCheckOutcome::NewJoin,
            _ => SyncCheckOutcome::Unknown,
        }
    }

    /// Whether a sync-detail fetch should follow this outcome
    pub fn has_updates(&self) -> bool {
        matches!(
            self,
            SyncCheckOutcome::NewMessage | SyncCheckOutcome::NewJoin | SyncCheckOutcome::Unknown
        )
    }
}

impl fmt::Display for SyncCheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncCheckOutcome::Normal => "normal",
            SyncCheckOutcome::Fail => "fail",
            SyncCheckOutcome::NewMessage => "new_message",
            SyncCheckOutcome::NewJoin => "new_join",
            SyncCheckOutcome::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The decoded `{retcode, selector}` fragment of a sync-check response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCheckReply {
    pub retcode: i64,
    pub selector: i64,
}

impl SyncCheckReply {
    /// A non-zero retcode means the server refused the poll outright
    pub fn outcome(&self) -> SyncCheckOutcome {
        if self.retcode != 0 {
            return SyncCheckOutcome::Fail;
        }
        SyncCheckOutcome::from_selector(self.selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_mapping() {
        assert_eq!(SyncCheckOutcome::from_selector(0), SyncCheckOutcome::Normal);
        assert_eq!(SyncCheckOutcome::from_selector(1), SyncCheckOutcome::Fail);
        assert_eq!(SyncCheckOutcome::from_selector(2), SyncCheckOutcome::NewMessage);
        assert_eq!(SyncCheckOutcome::from_selector(3), SyncCheckOutcome::NewJoin);
        assert_eq!(SyncCheckOutcome::from_selector(4), SyncCheckOutcome::Unknown);
        assert_eq!(SyncCheckOutcome::from_selector(7), SyncCheckOutcome::Unknown);
        assert_eq!(SyncCheckOutcome::from_selector(-1), SyncCheckOutcome::Unknown);
    }

    #[test]
    fn test_retcode_overrides_selector() {
        let ok = SyncCheckReply { retcode: 0, selector: 2 };
        assert_eq!(ok.outcome(), SyncCheckOutcome::NewMessage);

        let logged_out = SyncCheckReply { retcode: 1101, selector: 2 };
        assert_eq!(logged_out.outcome(), SyncCheckOutcome::Fail);
    }

    #[test]
    fn test_has_updates() {
        assert!(!SyncCheckOutcome::Normal.has_updates());
        assert!(!SyncCheckOutcome::Fail.has_updates());
        assert!(SyncCheckOutcome::NewMessage.has_updates());
        assert!(SyncCheckOutcome::NewJoin.has_updates());
        assert!(SyncCheckOutcome::Unknown.has_updates());
    }
}

use crate::sync::SyncCheckOutcome;
use serde_json::Value;

/// Event handler function type. Returning `false` stops the handler chain,
/// and inside the sync loop also stops the loop.
pub type EventHandler = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// Everything the client reports while logging in and syncing
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A login ticket was issued; show this URL as a QR code
    QrCode { url: String },
    /// The phone scanned the code and awaits confirmation
    Scanned,
    /// Login confirmed and a session was issued
    LoggedIn { uin: String },
    /// Session initialized; `payload` is the raw init response
    Initialized { payload: Value },
    /// A sync-check poll completed
    SyncCheck(SyncCheckOutcome),
    /// A sync-detail fetch completed; `payload` is the raw response
    Synced { payload: Value },
    /// The session was discarded or declared dead
    SessionLost { reason: String },
}

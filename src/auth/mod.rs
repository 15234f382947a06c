/// QR login handshake state and session identity

pub mod qr;
pub mod session;

pub use qr::{qr_code_url, LoginPoll, LoginTicket};
pub use session::{BaseRequest, LoginSession};

use std::fmt;

/// Where a [`ProtocolClient`](crate::client::ProtocolClient) is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No ticket, no session
    Unauthenticated,
    /// A login ticket was issued; the QR code can be shown
    TicketObtained { ticket: LoginTicket },
    /// Long-polling for the phone to scan and confirm
    AwaitingScan { ticket: LoginTicket },
    /// The phone confirmed; the redirect must be followed to collect the session
    AwaitingConfirm { redirect_uri: String },
    /// A session exists but has not been initialized
    SessionEstablished,
    /// Initialized; the sync cursor is live
    Syncing,
    /// The handshake or the session died. Restart from a new ticket.
    Failed(String),
}

impl AuthState {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::TicketObtained { .. } => "ticket_obtained",
            AuthState::AwaitingScan { .. } => "awaiting_scan",
            AuthState::AwaitingConfirm { .. } => "awaiting_confirm",
            AuthState::SessionEstablished => "session_established",
            AuthState::Syncing => "syncing",
            AuthState::Failed(_) => "failed",
        }
    }

    /// Ticket of the handshake in progress, if any
    pub fn ticket(&self) -> Option<&LoginTicket> {
        match self {
            AuthState::TicketObtained { ticket } | AuthState::AwaitingScan { ticket } => Some(ticket),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuthState::Failed(_))
    }

    /// True once a login session is held
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SessionEstablished | AuthState::Syncing)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

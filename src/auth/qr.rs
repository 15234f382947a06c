/// QR login ticket and scan polling results

use std::fmt;

/// Poll code the server returns once the phone has scanned but not yet confirmed
pub const CODE_SCANNED: u16 = 201;
/// Poll code for a confirmed login
pub const CODE_CONFIRMED: u16 = 200;
/// Poll code for a long-poll that expired with nothing to report
pub const CODE_WAITING: u16 = 408;
/// Poll code for an expired ticket
pub const CODE_EXPIRED: u16 = 400;

/// Opaque login ticket (`uuid`) handed out by the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoginTicket(String);

impl LoginTicket {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL of the scannable QR image for this ticket
    pub fn qr_code_url(&self, qr_base: &str) -> String {
        qr_code_url(qr_base, &self.0)
    }
}

impl fmt::Display for LoginTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoginTicket {
    fn from(uuid: &str) -> Self {
        Self::new(uuid)
    }
}

/// Join the QR host and a ticket into the image URL
pub fn qr_code_url(qr_base: &str, uuid: &str) -> String {
    format!("{}/qrcode/{}", qr_base.trim_end_matches('/'), uuid)
}

/// Result of one login long-poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPoll {
    /// Nothing confirmed yet. `code` is the server's status if one was present.
    Pending { code: Option<u16> },
    /// The user confirmed on the phone; follow this URI to collect the session
    Confirmed { redirect_uri: String },
}

impl LoginPoll {
    pub fn is_pending(&self) -> bool {
        matches!(self, LoginPoll::Pending { .. })
    }

    /// The phone scanned the code and is waiting for the user to tap confirm
    pub fn is_scanned(&self) -> bool {
        matches!(self, LoginPoll::Pending { code: Some(CODE_SCANNED) })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, LoginPoll::Pending { code: Some(CODE_EXPIRED) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_code_url() {
        let ticket = LoginTicket::new("abcDEF123");
        assert_eq!(
            ticket.qr_code_url("https://login.weixin.qq.com"),
            "https://login.weixin.qq.com/qrcode/abcDEF123"
        );
        assert_eq!(
            qr_code_url("https://login.weixin.qq.com/", "xyz=="),
            "https://login.weixin.qq.com/qrcode/xyz=="
        );
    }

    #[test]
    fn test_poll_predicates() {
        assert!(LoginPoll::Pending { code: None }.is_pending());
        assert!(LoginPoll::Pending { code: Some(201) }.is_scanned());
        assert!(!LoginPoll::Pending { code: Some(408) }.is_scanned());
        assert!(LoginPoll::Pending { code: Some(400) }.is_expired());

        let confirmed = LoginPoll::Confirmed { redirect_uri: "https://x/y".into() };
        assert!(!confirmed.is_pending());
        assert!(!confirmed.is_scanned());
    }
}

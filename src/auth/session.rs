/// The authenticated session identity and the request envelope derived from it

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Identity issued by a confirmed QR login.
///
/// All four fields are non-empty or the value does not exist. There are no
/// setters; a new login produces a new session.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginSession {
    session_key: String,
    session_id: String,
    user_id: String,
    pass_ticket: String,
}

impl LoginSession {
    pub fn new(
        session_key: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        pass_ticket: impl Into<String>,
    ) -> Result<Self> {
        let session = Self {
            session_key: session_key.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            pass_ticket: pass_ticket.into(),
        };

        for (name, value) in [
            ("skey", &session.session_key),
            ("wxsid", &session.session_id),
            ("wxuin", &session.user_id),
            ("pass_ticket", &session.pass_ticket),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidState(format!("login session field {} is empty", name)));
            }
        }

        Ok(session)
    }

    /// `skey`
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// `wxsid`
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `wxuin`
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn pass_ticket(&self) -> &str {
        &self.pass_ticket
    }

    /// Build the `BaseRequest` envelope for one request
    pub fn base_request(&self, device_id: String) -> BaseRequest {
        BaseRequest {
            device_id,
            sid: self.session_id.clone(),
            skey: self.session_key.clone(),
            uin: Uin(self.user_id.clone()),
        }
    }

    /// `skey`, `sid` and `uin` query parameters shared by authenticated calls
    pub fn auth_query(&self) -> Vec<(String, String)> {
        vec![
            ("skey".to_string(), self.session_key.clone()),
            ("sid".to_string(), self.session_id.clone()),
            ("uin".to_string(), self.user_id.clone()),
        ]
    }
}

// Keep skey and pass_ticket out of logs
impl fmt::Debug for LoginSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginSession")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("session_key", &"<redacted>")
            .field("pass_ticket", &"<redacted>")
            .finish()
    }
}

/// User id as sent in `BaseRequest`: a JSON number when numeric, else a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uin(pub String);

impl Serialize for Uin {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

/// The `BaseRequest` envelope carried in every authenticated JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRequest {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "Sid")]
    pub sid: String,
    #[serde(rename = "Skey")]
    pub skey: String,
    #[serde(rename = "Uin")]
    pub uin: Uin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> LoginSession {
        LoginSession::new("@crypt_abc", "sid123", "2000001", "ticket%2B1").unwrap()
    }

    #[test]
    fn test_session_requires_all_fields() {
        assert!(LoginSession::new("", "sid", "1", "pt").is_err());
        assert!(LoginSession::new("k", "", "1", "pt").is_err());
        assert!(LoginSession::new("k", "sid", " ", "pt").is_err());
        assert!(matches!(
            LoginSession::new("k", "sid", "1", ""),
            Err(Error::InvalidState(_))
        ));
        assert!(LoginSession::new("k", "sid", "1", "pt").is_ok());
    }

    #[test]
    fn test_base_request_json() {
        let body = serde_json::to_value(session().base_request("e123456789012345".into())).unwrap();
        assert_eq!(
            body,
            json!({
                "DeviceID": "e123456789012345",
                "Sid": "sid123",
                "Skey": "@crypt_abc",
                "Uin": 2000001
            })
        );
    }

    #[test]
    fn test_non_numeric_uin_stays_string() {
        let s = LoginSession::new("k", "sid", "wx_user", "pt").unwrap();
        let body = serde_json::to_value(s.base_request("e1".into())).unwrap();
        assert_eq!(body["Uin"], json!("wx_user"));
    }

    #[test]
    fn test_auth_query() {
        let query = session().auth_query();
        assert_eq!(query[0], ("skey".to_string(), "@crypt_abc".to_string()));
        assert_eq!(query[1], ("sid".to_string(), "sid123".to_string()));
        assert_eq!(query[2], ("uin".to_string(), "2000001".to_string()));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", session());
        assert!(rendered.contains("sid123"));
        assert!(!rendered.contains("@crypt_abc"));
        assert!(!rendered.contains("ticket%2B1"));
    }
}

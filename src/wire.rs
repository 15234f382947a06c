/// Extraction of tokens from the semi-structured response bodies.
///
/// The login endpoints answer with JavaScript assignments, confirmation with a
/// small XML document, and the sync endpoints with JSON. Everything that knows
/// about those text shapes lives here; the client only sees typed results.

use crate::{
    auth::{qr::CODE_CONFIRMED, LoginPoll, LoginSession, LoginTicket},
    error::{Error, Result},
    sync::SyncCheckReply,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

type Pattern = Lazy<std::result::Result<Regex, regex::Error>>;

static TICKET_RE: Pattern = Lazy::new(|| {
    Regex::new(r#"window\.QRLogin\.code\s*=\s*(\d+);\s*window\.QRLogin\.uuid\s*=\s*"(\S+?)";"#)
});
static POLL_CODE_RE: Pattern = Lazy::new(|| Regex::new(r"window\.code\s*=\s*(\d+);"));
static REDIRECT_RE: Pattern = Lazy::new(|| Regex::new(r#"window\.redirect_uri\s*=\s*"(\S+?)";"#));
static XML_FIELD_RE: Pattern = Lazy::new(|| {
    Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>(?:<!\[CDATA\[(.*?)\]\]>|([^<]*))</([A-Za-z_][A-Za-z0-9_]*)>")
});
static XML_ENTITY_RE: Pattern = Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|apos);"));
static SYNC_CHECK_RE: Pattern = Lazy::new(|| Regex::new(r"window\.synccheck\s*=\s*(.*)"));
static LOOSE_RETCODE_RE: Pattern = Lazy::new(|| Regex::new(r#"retcode\W*?(-?\d+)"#));
static LOOSE_SELECTOR_RE: Pattern = Lazy::new(|| Regex::new(r#"selector\W*?(-?\d+)"#));

fn compiled(pattern: &'static Pattern) -> Result<&'static Regex> {
    Lazy::force(pattern)
        .as_ref()
        .map_err(|e| Error::Pattern(e.to_string()))
}

/// Parse the ticket response: `window.QRLogin.code = 200; window.QRLogin.uuid = "...";`
pub fn parse_login_ticket(body: &str) -> Result<LoginTicket> {
    let caps = compiled(&TICKET_RE)?
        .captures(body)
        .ok_or_else(|| Error::Protocol("login ticket response did not match".to_string()))?;

    let code: u32 = caps[1]
        .parse()
        .map_err(|_| Error::Protocol(format!("login ticket code {} is not a number", &caps[1])))?;
    if code != 200 {
        return Err(Error::Protocol(format!("login ticket request returned code {}", code)));
    }

    Ok(LoginTicket::new(&caps[2]))
}

/// Parse a login poll response.
///
/// Anything short of code 200 is "not yet", including a body with no code.
/// Code 200 without a redirect target is a contract violation.
pub fn parse_login_poll(body: &str) -> Result<LoginPoll> {
    let code = compiled(&POLL_CODE_RE)?
        .captures(body)
        .and_then(|caps| caps[1].parse::<u16>().ok());

    match code {
        Some(CODE_CONFIRMED) => {
            let redirect_uri = compiled(&REDIRECT_RE)?
                .captures(body)
                .map(|caps| caps[1].to_string())
                .ok_or_else(|| {
                    Error::Protocol("login confirmed but redirect_uri is missing".to_string())
                })?;
            Ok(LoginPoll::Confirmed { redirect_uri })
        }
        code => Ok(LoginPoll::Pending { code }),
    }
}

/// Outcome of following the login redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Session(LoginSession),
    /// The server answered but refused to issue a session
    Rejected { ret: i64, message: String },
}

/// Decode the five predefined XML entities in one pass
fn unescape_xml(text: &str) -> Result<String> {
    let decoded = compiled(&XML_ENTITY_RE)?.replace_all(text, |caps: &regex::Captures| {
        match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        }
    });
    Ok(decoded.into_owned())
}

/// Collect the leaf elements of a flat XML document into a map.
/// CDATA sections are taken verbatim; plain text has its entities decoded.
fn xml_fields(body: &str) -> Result<HashMap<String, String>> {
    let re = compiled(&XML_FIELD_RE)?;
    let mut fields = HashMap::new();
    for caps in re.captures_iter(body) {
        if caps[1] != caps[4] {
            continue;
        }
        let value = match (caps.get(2), caps.get(3)) {
            (Some(cdata), _) => cdata.as_str().trim().to_string(),
            (None, Some(text)) => unescape_xml(text.as_str().trim())?,
            (None, None) => String::new(),
        };
        fields.insert(caps[1].to_string(), value);
    }
    Ok(fields)
}

/// Parse the confirmation document:
/// `<error><ret>0</ret><skey>..</skey><wxsid>..</wxsid><wxuin>..</wxuin><pass_ticket>..</pass_ticket></error>`
pub fn parse_confirmation(body: &str) -> Result<Confirmation> {
    let fields = xml_fields(body)?;

    let ret_text = fields
        .get("ret")
        .ok_or_else(|| Error::Protocol("login confirmation has no ret field".to_string()))?;
    let ret: i64 = ret_text
        .parse()
        .map_err(|_| Error::Protocol(format!("login confirmation ret {} is not a number", ret_text)))?;

    if ret != 0 {
        return Ok(Confirmation::Rejected {
            ret,
            message: fields.get("message").cloned().unwrap_or_default(),
        });
    }

    let field = |name: &str| -> Result<String> {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("login confirmation is missing {}", name)))
    };

    let session = LoginSession::new(
        field("skey")?,
        field("wxsid")?,
        field("wxuin")?,
        field("pass_ticket")?,
    )
    .map_err(|e| Error::Protocol(format!("login confirmation rejected: {}", e)))?;

    Ok(Confirmation::Session(session))
}

/// Read an integer that may be encoded as a JSON number or a numeric string
pub fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `window.synccheck=...` into its retcode and selector.
///
/// The value may be a quoted JSON document (with or without escaped inner
/// quotes) or a bare object literal with unquoted keys.
pub fn parse_sync_check(body: &str) -> Result<SyncCheckReply> {
    let raw = compiled(&SYNC_CHECK_RE)?
        .captures(body)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::Protocol("sync check response has no synccheck token".to_string()))?;

    let fragment = raw.trim().trim_end_matches(';').trim();
    let unquoted = if fragment.len() >= 2 && fragment.starts_with('"') && fragment.ends_with('"') {
        serde_json::from_str::<String>(fragment)
            .unwrap_or_else(|_| fragment[1..fragment.len() - 1].to_string())
    } else {
        fragment.to_string()
    };

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&unquoted) {
        let retcode = map.get("retcode").and_then(json_int);
        let selector = map.get("selector").and_then(json_int);
        return match (retcode, selector) {
            (Some(retcode), Some(selector)) => Ok(SyncCheckReply { retcode, selector }),
            _ => Err(Error::Protocol(format!(
                "sync check fragment lacks retcode or selector: {}",
                unquoted
            ))),
        };
    }

    let loose = |pattern: &'static Pattern| -> Result<Option<i64>> {
        Ok(compiled(pattern)?
            .captures(&unquoted)
            .and_then(|caps| caps[1].parse().ok()))
    };
    match (loose(&LOOSE_RETCODE_RE)?, loose(&LOOSE_SELECTOR_RE)?) {
        (Some(retcode), Some(selector)) => Ok(SyncCheckReply { retcode, selector }),
        _ => Err(Error::Protocol(format!("sync check fragment is unparsable: {}", unquoted))),
    }
}

/// Decode a JSON response body
pub fn parse_json(body: &str) -> Result<Value> {
    Ok(serde_json::from_str(body)?)
}

/// Require `BaseResponse.Ret == 0`
pub fn check_base_response(payload: &Value) -> Result<()> {
    let base = payload
        .get("BaseResponse")
        .ok_or_else(|| Error::Protocol("response has no BaseResponse".to_string()))?;
    let ret = base
        .get("Ret")
        .and_then(json_int)
        .ok_or_else(|| Error::Protocol("BaseResponse has no numeric Ret".to_string()))?;

    if ret != 0 {
        let message = base.get("ErrMsg").and_then(Value::as_str).unwrap_or("");
        return Err(Error::Protocol(format!("BaseResponse.Ret = {} ({})", ret, message)));
    }
    Ok(())
}

/// The `SyncKey` object of an init or sync-detail payload
pub fn sync_key_value(payload: &Value) -> Result<&Value> {
    payload
        .get("SyncKey")
        .ok_or_else(|| Error::Protocol("response has no SyncKey".to_string()))
}

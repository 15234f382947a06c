use crate::{
    auth::{qr::{CODE_SCANNED, CODE_WAITING}, AuthState, LoginPoll, LoginSession, LoginTicket},
    error::{Error, Result},
    sync::{retry::should_retry, sync_key::pairs_from_value, RetryPolicy, SyncCheckOutcome, SyncKey, SyncKeyPair},
    transport::{
        reqwest_transport::TransportConfig, HttpRequest, HttpTransport, ReqwestTransport,
        DEFAULT_USER_AGENT,
    },
    types::{Event, EventHandler},
    util::SignedRequestBuilder,
    wire::{self, Confirmation},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Hosts and fixed identifiers of the web protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Issues tickets and serves QR images
    pub login_base: String,
    /// Login long-poll host
    pub poll_base: String,
    /// Init and sync-detail host
    pub api_base: String,
    /// Sync-check long-poll host
    pub push_base: String,
    pub app_id: String,
    pub lang: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_base: "https://login.weixin.qq.com".to_string(),
            poll_base: "https://login.wx2.qq.com".to_string(),
            api_base: "https://wx2.qq.com".to_string(),
            push_base: "https://webpush.wx2.qq.com".to_string(),
            app_id: "wx782c26e4c19acffb".to_string(),
            lang: "zh_CN".to_string(),
        }
    }
}

impl Endpoints {
    pub fn ticket_url(&self) -> String {
        format!("{}/jslogin", self.login_base)
    }

    pub fn login_poll_url(&self) -> String {
        format!("{}/cgi-bin/mmwebwx-bin/login", self.poll_base)
    }

    pub fn init_url(&self) -> String {
        format!("{}/cgi-bin/mmwebwx-bin/webwxinit", self.api_base)
    }

    pub fn sync_check_url(&self) -> String {
        format!("{}/cgi-bin/mmwebwx-bin/synccheck", self.push_base)
    }

    pub fn sync_url(&self) -> String {
        format!("{}/cgi-bin/mmwebwx-bin/webwxsync", self.api_base)
    }
}

/// Configuration for the protocol client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub user_agent: String,
    /// Transport-level bound for ordinary requests
    pub request_timeout: Duration,
    /// Client-side bound for one long poll; must exceed the server's hold time
    pub long_poll_timeout: Duration,
    /// Pause between login polls that came back pending
    pub login_poll_interval: Duration,
    /// Give up waiting for a scan after this long
    pub login_timeout: Duration,
    /// Backoff for failed sync checks in [`ProtocolClient::run_sync_loop`]
    pub sync_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(60),
            long_poll_timeout: Duration::from_secs(35),
            login_poll_interval: Duration::from_secs(1),
            login_timeout: Duration::from_secs(300),
            sync_retry: RetryPolicy::default(),
        }
    }
}

/// Client for one login session of the web protocol.
///
/// Operations that touch the session take `&mut self`, so only one of them
/// can be in flight per client. The sync cursor is replaced only after a
/// response has been fully validated; dropping a pending future leaves it as
/// it was.
pub struct ProtocolClient {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    signer: SignedRequestBuilder,
    state: AuthState,
    session: Option<LoginSession>,
    sync_key: SyncKey,
    event_handlers: Vec<EventHandler>,
}

impl ProtocolClient {
    /// Create a client with its own reqwest transport and cookie store
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_config(TransportConfig {
            user_agent: config.user_agent.clone(),
            timeout: config.request_timeout.max(config.long_poll_timeout),
        })?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            signer: SignedRequestBuilder::new(),
            state: AuthState::Unauthenticated,
            session: None,
            sync_key: SyncKey::new(),
            event_handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn session(&self) -> Option<&LoginSession> {
        self.session.as_ref()
    }

    pub fn sync_key(&self) -> &SyncKey {
        &self.sync_key
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Add an event handler
    pub fn add_event_handler(&mut self, handler: EventHandler) {
        self.event_handlers.push(handler);
    }

    /// Emit an event to all handlers. Returns false if one asked to stop.
    fn emit_event(&self, event: Event) -> bool {
        for handler in &self.event_handlers {
            if !handler(&event) {
                return false;
            }
        }
        true
    }

    fn mark_failed(&mut self, reason: String) {
        warn!("Client failed in state {}: {}", self.state.name(), reason);
        self.state = AuthState::Failed(reason);
    }

    /// Login-phase shape errors end the handshake
    fn fail_on_protocol(&mut self, err: Error) -> Error {
        if matches!(err, Error::Protocol(_)) {
            self.mark_failed(err.to_string());
        }
        err
    }

    fn invalid_state(&self, operation: &str) -> Error {
        Error::InvalidState(format!("{} is not allowed in state {}", operation, self.state.name()))
    }

    /// Send a request and return the body text, rejecting unaccepted statuses
    async fn send(&self, request: HttpRequest) -> Result<String> {
        let request = request.header("User-Agent", self.config.user_agent.clone());
        debug!("{} {}", request.method, request.url);

        let response = self.transport.execute(request).await?;
        if !response.is_accepted() {
            return Err(Error::HttpStatus(response.status));
        }
        Ok(response.text())
    }

    /// Like [`send`](Self::send), bounded by the long-poll timeout
    async fn send_long_poll(&self, request: HttpRequest) -> Result<String> {
        timeout(self.config.long_poll_timeout, self.send(request)).await?
    }

    // ===== LOGIN HANDSHAKE =====

    /// Obtain a fresh login ticket. Allowed whenever no session is held.
    pub async fn request_login_ticket(&mut self) -> Result<LoginTicket> {
        if self.state.is_authenticated() {
            return Err(self.invalid_state("request_login_ticket"));
        }

        let request = HttpRequest::get(self.config.endpoints.ticket_url())
            .query("appid", &self.config.endpoints.app_id)
            .query("fun", "new")
            .query("lang", &self.config.endpoints.lang)
            .query("_", self.signer.current_timestamp_millis());

        let body = self.send(request).await?;
        let ticket = wire::parse_login_ticket(&body).map_err(|e| self.fail_on_protocol(e))?;

        info!("Obtained login ticket {}", ticket);
        self.session = None;
        self.sync_key.clear();
        self.state = AuthState::TicketObtained { ticket: ticket.clone() };
        self.emit_event(Event::QrCode { url: self.qr_code_url(&ticket) });

        Ok(ticket)
    }

    /// URL of the scannable QR image for a ticket
    pub fn qr_code_url(&self, ticket: &LoginTicket) -> String {
        ticket.qr_code_url(&self.config.endpoints.login_base)
    }

    /// One login long-poll.
    ///
    /// The first poll on a ticket enters `AwaitingScan`. Pending results are
    /// not errors and leave the state where it is.
    pub async fn poll_login(&mut self, ticket: &LoginTicket) -> Result<LoginPoll> {
        if self.state.ticket() != Some(ticket) {
            return Err(self.invalid_state("poll_login"));
        }
        if matches!(self.state, AuthState::TicketObtained { .. }) {
            self.state = AuthState::AwaitingScan { ticket: ticket.clone() };
        }

        let request = HttpRequest::get(self.config.endpoints.login_poll_url())
            .query("uuid", ticket.as_str())
            .query("tip", 0)
            .query("_", self.signer.current_timestamp_millis());

        let body = self.send_long_poll(request).await?;
        let poll = wire::parse_login_poll(&body).map_err(|e| self.fail_on_protocol(e))?;

        match &poll {
            LoginPoll::Confirmed { redirect_uri } => {
                info!("Login confirmed on phone");
                self.state = AuthState::AwaitingConfirm { redirect_uri: redirect_uri.clone() };
            }
            LoginPoll::Pending { code: Some(CODE_SCANNED) } => {
                debug!("QR code scanned, waiting for confirmation");
                self.emit_event(Event::Scanned);
            }
            LoginPoll::Pending { code: Some(CODE_WAITING) } => {
                debug!("Login poll held with nothing to report");
            }
            LoginPoll::Pending { code } => {
                debug!("Login poll pending (code {:?})", code);
            }
        }

        Ok(poll)
    }

    /// Follow the login redirect and collect the session.
    ///
    /// Returns `Ok(None)` when the server answers with a non-zero `ret`; the
    /// handshake is then over and must restart from a new ticket.
    pub async fn confirm_login(&mut self, redirect_uri: &str) -> Result<Option<LoginSession>> {
        if !matches!(self.state, AuthState::AwaitingConfirm { .. }) {
            return Err(self.invalid_state("confirm_login"));
        }

        let url = url::Url::parse(redirect_uri).map_err(|e| self.fail_on_protocol(e.into()))?;

        let body = self.send(HttpRequest::get(url.as_str())).await?;
        let confirmation = wire::parse_confirmation(&body).map_err(|e| self.fail_on_protocol(e))?;

        match confirmation {
            Confirmation::Session(session) => {
                info!("Login session established for uin {}", session.user_id());
                self.state = AuthState::SessionEstablished;
                self.session = Some(session.clone());
                self.emit_event(Event::LoggedIn { uin: session.user_id().to_string() });
                Ok(Some(session))
            }
            Confirmation::Rejected { ret, message } => {
                self.mark_failed(format!("login confirmation refused: ret={} {}", ret, message));
                Ok(None)
            }
        }
    }

    /// Poll once and, if confirmed, collect the session right away
    pub async fn listen_for_login(&mut self, ticket: &LoginTicket) -> Result<Option<LoginSession>> {
        match self.poll_login(ticket).await? {
            LoginPoll::Confirmed { redirect_uri } => self.confirm_login(&redirect_uri).await,
            LoginPoll::Pending { .. } => Ok(None),
        }
    }

    /// Poll until the user confirms, the ticket expires, or the login timeout passes
    pub async fn wait_for_login(&mut self, ticket: &LoginTicket) -> Result<LoginSession> {
        let deadline = Instant::now() + self.config.login_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout("no login confirmation before deadline".to_string()));
            }

            let poll = match self.poll_login(ticket).await {
                Ok(poll) => poll,
                Err(err) if should_retry(&err) => {
                    debug!("Login poll timed out, polling again");
                    continue;
                }
                Err(err) => return Err(err),
            };

            match poll {
                LoginPoll::Confirmed { redirect_uri } => {
                    return match self.confirm_login(&redirect_uri).await? {
                        Some(session) => Ok(session),
                        None => Err(Error::Protocol(self.state.to_string())),
                    };
                }
                pending if pending.is_expired() => {
                    self.mark_failed("login ticket expired".to_string());
                    return Err(Error::Protocol("login ticket expired".to_string()));
                }
                LoginPoll::Pending { .. } => sleep(self.config.login_poll_interval).await,
            }
        }
    }

    // ===== SESSION & SYNC =====

    fn base_request(&self, session: &LoginSession) -> Result<Value> {
        Ok(serde_json::to_value(session.base_request(self.signer.new_device_id()))?)
    }

    /// Validate the `SyncKey` of a payload without touching the current cursor
    fn next_sync_key(payload: &Value) -> Result<Vec<SyncKeyPair>> {
        let pairs = pairs_from_value(wire::sync_key_value(payload)?)
            .map_err(|e| Error::Protocol(format!("malformed SyncKey: {}", e)))?;
        if pairs.is_empty() {
            return Err(Error::Protocol("response carried an empty SyncKey".to_string()));
        }
        Ok(pairs)
    }

    /// Discard the session after an unrecoverable failure. The cursor stays
    /// as of the last successful sync.
    fn lose_session(&mut self, reason: String) {
        self.session = None;
        self.mark_failed(reason.clone());
        self.emit_event(Event::SessionLost { reason });
    }

    /// A non-zero status envelope during the session means it is dead
    fn session_died(&mut self, err: Error) -> Error {
        if matches!(err, Error::Protocol(_)) {
            self.lose_session(err.to_string());
        }
        err
    }

    /// Initialize the confirmed session and seed the sync cursor.
    /// Returns the raw init payload.
    pub async fn init_session(&mut self) -> Result<Value> {
        let session = match (&self.state, &self.session) {
            (AuthState::SessionEstablished, Some(session)) => session.clone(),
            _ => return Err(self.invalid_state("init_session")),
        };

        let base_request = self.base_request(&session)?;
        let request = HttpRequest::post(self.config.endpoints.init_url())
            .query("r", self.signer.reverse_timestamp())
            .queries(session.auth_query())
            .query("pass_ticket", session.pass_ticket())
            .json_body(&json!({ "BaseRequest": base_request }))?;

        let body = self.send(request).await?;
        let payload = wire::parse_json(&body)
            .and_then(|payload| wire::check_base_response(&payload).map(|_| payload))
            .map_err(|e| self.session_died(e))?;
        let pairs = Self::next_sync_key(&payload).map_err(|e| self.session_died(e))?;

        self.sync_key.refresh(pairs)?;
        self.state = AuthState::Syncing;
        info!("Session initialized with {} sync key pairs", self.sync_key.raw_pairs().len());

        self.emit_event(Event::Initialized { payload: payload.clone() });
        Ok(payload)
    }

    fn syncing_session(&self, operation: &str) -> Result<LoginSession> {
        match (&self.state, &self.session) {
            (AuthState::Syncing, Some(session)) => Ok(session.clone()),
            _ => Err(self.invalid_state(operation)),
        }
    }

    /// Long-poll for pending changes. Never touches the sync cursor.
    pub async fn check_for_updates(&mut self) -> Result<SyncCheckOutcome> {
        let outcome = self.sync_check().await?;
        self.emit_event(Event::SyncCheck(outcome));
        Ok(outcome)
    }

    async fn sync_check(&self) -> Result<SyncCheckOutcome> {
        let session = self.syncing_session("check_for_updates")?;
        let now = self.signer.current_timestamp_millis();

        let request = HttpRequest::get(self.config.endpoints.sync_check_url())
            .query("r", now)
            .queries(session.auth_query())
            .query("deviceid", self.signer.new_device_id())
            .query("synckey", self.sync_key.serialize()?)
            .query("_", now);

        let body = self.send_long_poll(request).await?;
        let reply = wire::parse_sync_check(&body)?;
        let outcome = reply.outcome();

        if reply.retcode != 0 {
            warn!("Sync check refused with retcode {}", reply.retcode);
        } else {
            debug!("Sync check selector {} -> {}", reply.selector, outcome);
        }
        Ok(outcome)
    }

    /// Fetch pending changes and advance the sync cursor. Returns the raw payload.
    pub async fn fetch_updates(&mut self) -> Result<Value> {
        let payload = self.sync_detail().await?;
        self.emit_event(Event::Synced { payload: payload.clone() });
        Ok(payload)
    }

    async fn sync_detail(&mut self) -> Result<Value> {
        let session = self.syncing_session("fetch_updates")?;
        let base_request = self.base_request(&session)?;
        let sync_key = self.sync_key.to_payload()?;

        let request = HttpRequest::post(self.config.endpoints.sync_url())
            .queries(session.auth_query())
            .query("lang", &self.config.endpoints.lang)
            .query("pass_ticket", session.pass_ticket())
            .json_body(&json!({
                "BaseRequest": base_request,
                "SyncKey": sync_key,
                "rr": self.signer.sync_nonce(),
            }))?;

        let body = self.send(request).await?;
        let payload = wire::parse_json(&body)
            .and_then(|payload| wire::check_base_response(&payload).map(|_| payload))
            .map_err(|e| self.session_died(e))?;
        let pairs = Self::next_sync_key(&payload).map_err(|e| self.session_died(e))?;

        self.sync_key.refresh(pairs)?;
        debug!("Sync key advanced to {} pairs", self.sync_key.raw_pairs().len());
        Ok(payload)
    }

    /// Run the long-poll loop until a handler returns `false` or the session dies.
    ///
    /// Client-side timeouts poll again at once. `Fail` outcomes back off per
    /// [`ClientConfig::sync_retry`]; once the policy is exhausted the loop
    /// drops the session and gives up with a protocol error so the caller
    /// can log in again.
    pub async fn run_sync_loop(&mut self) -> Result<()> {
        let policy = self.config.sync_retry.clone();
        let mut failures: u32 = 0;

        loop {
            let outcome = match self.sync_check().await {
                Ok(outcome) => outcome,
                Err(err) if should_retry(&err) => {
                    // Nothing was mutated; poll again with the same cursor
                    debug!("Sync check timed out: {}", err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !self.emit_event(Event::SyncCheck(outcome)) {
                return Ok(());
            }

            if outcome == SyncCheckOutcome::Fail {
                failures += 1;
                if policy.is_exhausted(failures) {
                    let reason = format!("sync check failed {} times in a row", failures);
                    self.lose_session(reason.clone());
                    return Err(Error::Protocol(reason));
                }
                let delay = policy.calculate_delay(failures);
                warn!("Sync check failed ({}), backing off {:?}", failures, delay);
                sleep(delay).await;
                continue;
            }
            failures = 0;

            if outcome.has_updates() {
                let payload = self.sync_detail().await?;
                if !self.emit_event(Event::Synced { payload }) {
                    return Ok(());
                }
            }
        }
    }

    /// Full login: ticket, QR event, wait for confirmation, init
    pub async fn login(&mut self) -> Result<LoginSession> {
        let ticket = self.request_login_ticket().await?;
        let session = self.wait_for_login(&ticket).await?;
        self.init_session().await?;
        Ok(session)
    }

    /// Discard the session and cursor locally
    pub fn logout(&mut self) {
        if self.session.take().is_some() {
            self.emit_event(Event::SessionLost { reason: "logged out".to_string() });
        }
        self.sync_key.clear();
        self.state = AuthState::Unauthenticated;
        info!("Logged out");
    }
}

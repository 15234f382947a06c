/// In-memory transport that replays scripted responses and records requests

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

struct Scripted {
    delay: Option<Duration>,
    result: Result<HttpResponse>,
}

/// Transport for tests and offline use: answers requests in order from a script
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Queue a 200 response with this body
    pub fn push_body(&self, body: impl Into<String>) {
        self.push_response(200, body);
    }

    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.push(Scripted {
            delay: None,
            result: Ok(HttpResponse::new(status, body.into())),
        });
    }

    /// Queue a response that arrives only after `delay`
    pub fn push_delayed(&self, delay: Duration, body: impl Into<String>) {
        self.push(Scripted {
            delay: Some(delay),
            result: Ok(HttpResponse::new(200, body.into())),
        });
    }

    pub fn push_error(&self, error: Error) {
        self.push(Scripted {
            delay: None,
            result: Err(error),
        });
    }

    /// Every request executed so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|requests| requests.len()).unwrap_or(0)
    }

    /// Number of scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|script| script.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .map_err(|_| Error::Transport("request log poisoned".to_string()))?
            .push(request.clone());

        let next = self
            .script
            .lock()
            .map_err(|_| Error::Transport("script poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Scripted { delay, result }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(Error::Transport(format!(
                "no scripted response for {} {}",
                request.method, request.url
            ))),
        }
    }
}

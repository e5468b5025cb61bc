//! Scripted in-memory provider shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::persistence::Token;
use crate::provider::{CloudProvider, ProviderId, RefreshedToken, RemoteFile, TimePrecision, TokenGrant};

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Authorize,
    GetAccessToken(String),
    Refresh(String),
    Revoke(String),
    Find(String),
    Create {
        access_token: String,
        content: String,
        modified_time: DateTime<Utc>,
    },
    Read(String, String),
    Write {
        access_token: String,
        id: String,
        content: String,
        modified_time: DateTime<Utc>,
    },
}

#[derive(Default)]
struct State {
    remote: Option<(RemoteFile, String)>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<SyncError>>,
    refreshes: u32,
}

pub struct FakeProvider {
    id: ProviderId,
    precision: TimePrecision,
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            precision: TimePrecision::Millisecond,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_remote(self, content: &str, modified_time: DateTime<Utc>) -> Self {
        self.state.lock().unwrap().remote = Some((
            RemoteFile {
                id: "file-1".to_string(),
                modified_time,
            },
            content.to_string(),
        ));
        self
    }

    /// Make the next call to `op` fail with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: &'static str, error: SyncError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn remote(&self) -> Option<(RemoteFile, String)> {
        self.state.lock().unwrap().remote.clone()
    }

    fn record(&self, op: &'static str, call: Call) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn modified_time_precision(&self) -> TimePrecision {
        self.precision
    }

    async fn authorize(&self) -> Result<String> {
        self.record("authorize", Call::Authorize)?;
        Ok("code-1".to_string())
    }

    async fn get_access_token(&self, authorization_code: &str) -> Result<TokenGrant> {
        self.record(
            "get_access_token",
            Call::GetAccessToken(authorization_code.to_string()),
        )?;
        Ok(TokenGrant {
            access_token: "at-0".to_string(),
            expires_in: 3600,
            refresh_token: "rt".to_string(),
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        self.record("refresh", Call::Refresh(refresh_token.to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.refreshes += 1;
        Ok(RefreshedToken {
            access_token: format!("at-{}", state.refreshes),
            expires_in: 3600,
            refresh_token: None,
        })
    }

    async fn revoke_token(&self, token: &Token) -> Result<()> {
        self.record("revoke", Call::Revoke(token.refresh_token.clone()))
    }

    async fn find_file(&self, access_token: &str) -> Result<Option<RemoteFile>> {
        self.record("find", Call::Find(access_token.to_string()))?;
        Ok(self.remote().map(|(file, _)| file))
    }

    async fn create_file(
        &self,
        access_token: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        self.record(
            "create",
            Call::Create {
                access_token: access_token.to_string(),
                content: content.to_string(),
                modified_time,
            },
        )?;
        self.state.lock().unwrap().remote = Some((
            RemoteFile {
                id: "file-1".to_string(),
                modified_time,
            },
            content.to_string(),
        ));
        Ok(())
    }

    async fn read_file(&self, access_token: &str, id: &str) -> Result<String> {
        self.record("read", Call::Read(access_token.to_string(), id.to_string()))?;
        self.remote()
            .map(|(_, content)| content)
            .ok_or_else(|| SyncError::http(404, "Not Found"))
    }

    async fn write_file(
        &self,
        access_token: &str,
        id: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        self.record(
            "write",
            Call::Write {
                access_token: access_token.to_string(),
                id: id.to_string(),
                content: content.to_string(),
                modified_time,
            },
        )?;
        self.state.lock().unwrap().remote = Some((
            RemoteFile {
                id: id.to_string(),
                modified_time,
            },
            content.to_string(),
        ));
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use checkin_model::{Participant, ParticipantId};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{RemoteError, RemoteResult, RosterAuthority};

pub const DEFAULT_ROSTER_PATH: &str = "admin/participants";
pub const DEFAULT_MARK_ATTENDED_PATH: &str = "admin/participant/mark-attended";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP verb used for the mark-attended call.
///
/// Deployments differ here: the current authority expects a body-less `PUT`,
/// older ones took a `POST` carrying the id and a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkAttendedMethod {
    #[default]
    Put,
    Post,
}

impl std::str::FromStr for MarkAttendedMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "put" => Ok(Self::Put),
            "post" => Ok(Self::Post),
            other => Err(format!("unsupported mark-attended method: {other}")),
        }
    }
}

/// Where the roster authority lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct RemoteEndpoints {
    pub base_url: Url,
    pub roster_path: String,
    pub mark_attended_path: String,
    pub mark_attended_method: MarkAttendedMethod,
    pub request_timeout: Duration,
}

impl RemoteEndpoints {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            roster_path: DEFAULT_ROSTER_PATH.to_string(),
            mark_attended_path: DEFAULT_MARK_ATTENDED_PATH.to_string(),
            mark_attended_method: MarkAttendedMethod::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Join `path` under the base URL, keeping any path prefix the base
    /// already carries (`https://host/dev` + `admin/x` -> `https://host/dev/admin/x`).
    fn join(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn roster_url(&self) -> String {
        self.join(&self.roster_path)
    }

    pub fn mark_attended_url(&self, id: ParticipantId) -> String {
        let prefix = self.mark_attended_path.trim_end_matches('/');
        self.join(&format!("{prefix}/{id}"))
    }
}

/// Roster payloads come back either as a bare array or wrapped in an
/// envelope object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RosterResponse {
    Bare(Vec<Participant>),
    Envelope {
        #[serde(alias = "participants")]
        data: Vec<Participant>,
    },
}

impl RosterResponse {
    fn into_participants(self) -> Vec<Participant> {
        match self {
            RosterResponse::Bare(participants) => participants,
            RosterResponse::Envelope { data } => data,
        }
    }
}

#[derive(Debug, Serialize)]
struct MarkAttendedBody {
    id: ParticipantId,
    timestamp: DateTime<Utc>,
}

/// [`RosterAuthority`] backed by the authority's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRosterAuthority {
    client: Client,
    endpoints: RemoteEndpoints,
}

impl HttpRosterAuthority {
    pub fn new(endpoints: RemoteEndpoints) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(endpoints.request_timeout)
            .connect_timeout(endpoints.request_timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to build HTTP client: {e}")))?;

        info!(
            base_url = %endpoints.base_url,
            method = ?endpoints.mark_attended_method,
            "roster authority client ready"
        );

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &RemoteEndpoints {
        &self.endpoints
    }

    fn request_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::TimedOut(self.endpoints.request_timeout)
        } else if err.is_decode() {
            RemoteError::Malformed(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RosterAuthority for HttpRosterAuthority {
    async fn fetch_roster(&self) -> RemoteResult<Vec<Participant>> {
        let url = self.endpoints.roster_url();
        debug!(%url, "fetching roster");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body: RosterResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::TimedOut(self.endpoints.request_timeout)
            } else {
                RemoteError::Malformed(e.to_string())
            }
        })?;

        let participants = body.into_participants();
        if participants.is_empty() {
            return Err(RemoteError::EmptyRoster);
        }

        debug!(count = participants.len(), "roster fetched");
        Ok(participants)
    }

    async fn mark_attended(&self, id: ParticipantId) -> RemoteResult<()> {
        let url = self.endpoints.mark_attended_url(id);

        let request = match self.endpoints.mark_attended_method {
            MarkAttendedMethod::Put => self
                .client
                .put(&url)
                .header(header::CONTENT_TYPE, "application/json"),
            MarkAttendedMethod::Post => self.client.post(&url).json(&MarkAttendedBody {
                id,
                timestamp: Utc::now(),
            }),
        };

        let response = request.send().await.map_err(|e| self.request_error(e))?;

        match response.status() {
            status if status.is_success() => {
                debug!(%id, status = status.as_u16(), "mark-attended acknowledged");
                Ok(())
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(RemoteError::TimedOut(self.endpoints.request_timeout))
            }
            status => Err(RemoteError::Status(status.as_u16())),
        }
    }

    async fn probe(&self) -> bool {
        // Any HTTP answer at all means the authority is reachable.
        self.client
            .get(self.endpoints.base_url.as_str())
            .send()
            .await
            .is_ok()
    }
}

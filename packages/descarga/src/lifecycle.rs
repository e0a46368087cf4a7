//! Download request state.
//!
//! A request is created by one submission and then advanced only by
//! explicit verification polls:
//!
//! ```text
//! Submitted -> Accepted | Rejected
//! Accepted  -> InProgress
//! InProgress -> Completed | Errored | Expired
//! ```
//!
//! Polls may skip intermediate states (a request first seen as `Completed`
//! is fine) but never move backwards or leave a terminal state.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::validate_rfc;
use crate::error::{DescargaError, Result};

/// Status of a download request as reported by `EstadoSolicitud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    /// Created locally; not yet polled.
    Submitted,
    Accepted,
    InProgress,
    Completed,
    Errored,
    Rejected,
    Expired,

    /// A code outside the documented table. Never terminal.
    Unknown(u32),
}

impl RequestStatus {
    /// Map an `EstadoSolicitud` code.
    ///
    /// # Examples
    /// ```
    /// use sat_descarga::RequestStatus;
    ///
    /// assert_eq!(RequestStatus::from_code(3), RequestStatus::Completed);
    /// assert_eq!(RequestStatus::from_code(9).label(), "Unknown");
    /// assert!(!RequestStatus::from_code(9).is_terminal());
    /// ```
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Accepted,
            2 => Self::InProgress,
            3 => Self::Completed,
            4 => Self::Errored,
            5 => Self::Rejected,
            6 => Self::Expired,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Accepted => "Accepted",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Errored => "Errored",
            Self::Rejected => "Rejected",
            Self::Expired => "Expired",
            Self::Unknown(_) => "Unknown",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Errored | Self::Rejected | Self::Expired
        )
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Submitted | Self::Unknown(_) => 0,
            Self::Accepted => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Errored | Self::Rejected | Self::Expired => 3,
        }
    }

    /// Whether a poll may move a request from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Submitted => false,
            Self::Unknown(_) => true,
            Self::Rejected => matches!(self, Self::Submitted | Self::Accepted),
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code})"),
            other => f.write_str(other.label()),
        }
    }
}

/// What the service should package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentKind {
    /// Full CFDI XML files.
    #[serde(rename = "CFDI")]
    Cfdi,

    /// Metadata listing only.
    Metadata,
}

impl DocumentKind {
    /// Value of the `TipoSolicitud` attribute.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cfdi => "CFDI",
            Self::Metadata => "Metadata",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cfdi" => Ok(Self::Cfdi),
            "metadata" => Ok(Self::Metadata),
            other => Err(format!("unknown document kind '{other}' (expected cfdi or metadata)")),
        }
    }
}

/// Parameters of a download request submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: DocumentKind,

    /// Only documents issued by this RFC.
    pub issuer: Option<String>,

    /// Only documents received by this RFC.
    pub receiver: Option<String>,
}

impl RequestParams {
    pub fn new(start: NaiveDate, end: NaiveDate, kind: DocumentKind) -> Self {
        Self {
            start,
            end,
            kind,
            issuer: None,
            receiver: None,
        }
    }

    pub fn with_issuer(mut self, rfc: impl Into<String>) -> Self {
        self.issuer = Some(rfc.into());
        self
    }

    pub fn with_receiver(mut self, rfc: impl Into<String>) -> Self {
        self.receiver = Some(rfc.into());
        self
    }

    /// Check the date order and the RFC filters.
    ///
    /// No maximum window is enforced; the service applies its own limits.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(DescargaError::InvalidDateRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        for rfc in self.issuer.iter().chain(self.receiver.iter()) {
            validate_rfc(rfc)?;
        }
        Ok(())
    }
}

/// Result of one verification poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub status: RequestStatus,

    /// `CodigoEstadoSolicitud` (e.g. `5000` accepted, `5004` no data).
    pub status_code: String,
    pub message: String,
    pub cfdi_count: u32,
    pub package_ids: Vec<String>,
}

/// A submitted download request and what polling has learned about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub id: String,
    pub params: RequestParams,
    pub status: RequestStatus,
    pub status_code: String,
    pub message: String,
    pub cfdi_count: u32,
    pub package_ids: Vec<String>,
}

impl DownloadRequest {
    /// A request the service has just acknowledged.
    pub fn submitted(id: impl Into<String>, params: RequestParams) -> Self {
        Self {
            id: id.into(),
            params,
            status: RequestStatus::Submitted,
            status_code: String::new(),
            message: String::new(),
            cfdi_count: 0,
            package_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completed with packages to download.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == RequestStatus::Completed
    }

    /// Record a poll result.
    ///
    /// An `Unknown` status updates code and message but keeps the previous
    /// status.
    ///
    /// # Errors
    /// `InvalidStateTransition` when the poll would move backwards or out
    /// of a terminal state; the request is left unchanged.
    pub fn apply(&mut self, verification: Verification) -> Result<()> {
        if !self.status.can_transition_to(verification.status) {
            return Err(DescargaError::InvalidStateTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: verification.status.to_string(),
            });
        }

        if let RequestStatus::Unknown(code) = verification.status {
            tracing::warn!(
                request_id = %self.id,
                code,
                "unknown request status, keeping {}",
                self.status
            );
        } else {
            self.status = verification.status;
        }

        self.status_code = verification.status_code;
        self.message = verification.message;
        self.cfdi_count = verification.cfdi_count;
        if !verification.package_ids.is_empty() {
            self.package_ids = verification.package_ids;
        }
        Ok(())
    }
}

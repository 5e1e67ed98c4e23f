use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

/// The two failure feeds sharing the generic tracker: scan-pipeline errors
/// (subject = file id) and referral imports that failed to land (subject =
/// the external system's referral identifier).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FailureFeed {
    ScanPipeline,
    ReferralImport,
}

impl FailureFeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureFeed::ScanPipeline => "scan_pipeline",
            FailureFeed::ReferralImport => "referral_import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scan_pipeline" => Some(FailureFeed::ScanPipeline),
            "referral_import" => Some(FailureFeed::ReferralImport),
            _ => None,
        }
    }
}

impl Display for FailureFeed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Closed error-kind enumeration for one failure feed.
///
/// The tracker stores kinds as text; each feed supplies its own enumeration
/// and the feed it belongs to, so one table and one set of queries serve
/// both concerns.
pub trait FailureKind: Sized + Copy {
    fn feed() -> FailureFeed;
    fn as_str(&self) -> &'static str;
    fn parse(s: &str) -> Option<Self>;
}

/// Why a file could not be scanned or sanitized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanFailureKind {
    ScannerUnavailable,
    ScanTimeout,
    ScanProtocol,
    StorageRead,
    Sanitize,
}

impl FailureKind for ScanFailureKind {
    fn feed() -> FailureFeed {
        FailureFeed::ScanPipeline
    }

    fn as_str(&self) -> &'static str {
        match self {
            ScanFailureKind::ScannerUnavailable => "scanner_unavailable",
            ScanFailureKind::ScanTimeout => "scan_timeout",
            ScanFailureKind::ScanProtocol => "scan_protocol",
            ScanFailureKind::StorageRead => "storage_read",
            ScanFailureKind::Sanitize => "sanitize",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "scanner_unavailable" => Some(ScanFailureKind::ScannerUnavailable),
            "scan_timeout" => Some(ScanFailureKind::ScanTimeout),
            "scan_protocol" => Some(ScanFailureKind::ScanProtocol),
            "storage_read" => Some(ScanFailureKind::StorageRead),
            "sanitize" => Some(ScanFailureKind::Sanitize),
            _ => None,
        }
    }
}

impl Display for ScanFailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Why a referral from the external intake system could not be imported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferralImportFailureKind {
    Validation,
    Mapping,
    Persistence,
    Upstream,
}

impl FailureKind for ReferralImportFailureKind {
    fn feed() -> FailureFeed {
        FailureFeed::ReferralImport
    }

    fn as_str(&self) -> &'static str {
        match self {
            ReferralImportFailureKind::Validation => "validation",
            ReferralImportFailureKind::Mapping => "mapping",
            ReferralImportFailureKind::Persistence => "persistence",
            ReferralImportFailureKind::Upstream => "upstream",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(ReferralImportFailureKind::Validation),
            "mapping" => Some(ReferralImportFailureKind::Mapping),
            "persistence" => Some(ReferralImportFailureKind::Persistence),
            "upstream" => Some(ReferralImportFailureKind::Upstream),
            _ => None,
        }
    }
}

impl Display for ReferralImportFailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked failure. At most one unresolved record exists per
/// `(feed, subject_id)`; re-failures update the row in place, incrementing
/// `retry_count`. Records are resolved exactly once and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FailureRecord {
    pub id: Uuid,
    pub feed: FailureFeed,
    pub subject_id: String,
    pub kind: String,
    pub message: String,
    pub context: serde_json::Value,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Aggregate row for the operational dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct KindCount {
    pub kind: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_round_trips() {
        assert_eq!(
            FailureFeed::parse(FailureFeed::ScanPipeline.as_str()),
            Some(FailureFeed::ScanPipeline)
        );
        assert_eq!(
            FailureFeed::parse(FailureFeed::ReferralImport.as_str()),
            Some(FailureFeed::ReferralImport)
        );
        assert_eq!(FailureFeed::parse("webhooks"), None);
    }

    #[test]
    fn scan_kind_round_trips() {
        for kind in [
            ScanFailureKind::ScannerUnavailable,
            ScanFailureKind::ScanTimeout,
            ScanFailureKind::ScanProtocol,
            ScanFailureKind::StorageRead,
            ScanFailureKind::Sanitize,
        ] {
            assert_eq!(ScanFailureKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn kinds_know_their_feed() {
        assert_eq!(ScanFailureKind::feed(), FailureFeed::ScanPipeline);
        assert_eq!(
            ReferralImportFailureKind::feed(),
            FailureFeed::ReferralImport
        );
    }
}

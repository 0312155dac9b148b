//! Plan-tiered upload limits.
//!
//! Used space is recomputed from the bucket listing on every decision; there
//! is no persisted counter. Two uploads racing for the same owner may both be
//! accepted against the same stale total.

use std::fmt;

use common::storage::BlobStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::keys::owner_prefix;

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Subscription tier, ordered from least to most generous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Premium,
    Pro,
}

impl Plan {
    /// Parse a plan name as issued by the users service.
    ///
    /// `BASIC` and `ADVANCED` are legacy names for `FREE` and `PREMIUM`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "FREE" | "BASIC" => Some(Self::Free),
            "PREMIUM" | "ADVANCED" => Some(Self::Premium),
            "PRO" => Some(Self::Pro),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Premium => "PREMIUM",
            Self::Pro => "PRO",
        }
    }
}

/// Which limit table applies to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ClassVideo,
    MaterialDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub per_file: u64,
    pub total: u64,
}

pub fn limits(plan: Plan, kind: ResourceKind) -> Limits {
    let (per_file, total) = match (kind, plan) {
        (ResourceKind::MaterialDocument, Plan::Free) => (5 * MB, 5 * GB),
        (ResourceKind::MaterialDocument, Plan::Premium) => (10 * MB, 12 * GB),
        (ResourceKind::MaterialDocument, Plan::Pro) => (20 * MB, 25 * GB),
        (ResourceKind::ClassVideo, Plan::Free) => (350 * MB, 900 * MB),
        (ResourceKind::ClassVideo, Plan::Premium) => (2 * GB, 38 * GB),
        (ResourceKind::ClassVideo, Plan::Pro) => (5 * GB, 75 * GB),
    };
    Limits { per_file, total }
}

/// Why an upload was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaViolation {
    FileTooLarge { limit: u64 },
    StorageExceeded { limit: u64 },
    UnknownPlan,
}

impl fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileTooLarge { limit } => {
                write!(f, "Your file exceeds the maximum file size ({} MB)", limit / MB)
            }
            Self::StorageExceeded { limit } => write!(
                f,
                "You have exceeded your storage limit ({} GB)",
                format_gb(*limit)
            ),
            Self::UnknownPlan => f.write_str("Unknown subscription plan"),
        }
    }
}

fn format_gb(bytes: u64) -> String {
    if bytes % GB == 0 {
        (bytes / GB).to_string()
    } else {
        format!("{:.2}", bytes as f64 / GB as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Accepted,
    Rejected(QuotaViolation),
}

impl QuotaDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn into_result(self) -> Result<(), QuotaViolation> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected(violation) => Err(violation),
        }
    }
}

/// Total size of every object stored under the owner's prefix.
///
/// A listing failure counts as zero usage.
pub async fn used_space(store: &dyn BlobStore, owner: &str) -> u64 {
    match store.list(&owner_prefix(owner)).await {
        Ok(objects) => objects.iter().map(|o| o.size).sum(),
        Err(e) => {
            warn!(
                owner,
                bucket = store.bucket(),
                error = %e,
                "Failed to list owner objects, assuming no usage"
            );
            0
        }
    }
}

/// Decide whether `owner` may store `size` more bytes of `kind`.
///
/// An unknown plan is always rejected. The per-file limit is checked before
/// the bucket is listed.
pub async fn evaluate(
    store: &dyn BlobStore,
    owner: &str,
    plan: Option<Plan>,
    size: u64,
    kind: ResourceKind,
) -> QuotaDecision {
    let Some(plan) = plan else {
        return QuotaDecision::Rejected(QuotaViolation::UnknownPlan);
    };
    let limits = limits(plan, kind);

    if size > limits.per_file {
        return QuotaDecision::Rejected(QuotaViolation::FileTooLarge {
            limit: limits.per_file,
        });
    }

    let used = used_space(store, owner).await;
    if used.saturating_add(size) > limits.total {
        return QuotaDecision::Rejected(QuotaViolation::StorageExceeded {
            limit: limits.total,
        });
    }

    QuotaDecision::Accepted
}

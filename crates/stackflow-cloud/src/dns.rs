//! DNS zone reconciliation
//!
//! Converges a live zone towards a desired record list. The diff is keyed by
//! normalized `(name, type)`; live records missing from the desired list are
//! only ever deleted when they carry the managed marker in their comment.

use crate::clock::Clock;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One DNS record, as listed by or sent to a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider record id (absent for records not created yet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(rename = "type")]
    pub record_type: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,

    #[serde(default)]
    pub proxied: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl DnsRecord {
    pub fn new(
        name: impl Into<String>,
        record_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            record_type: record_type.into(),
            content: content.into(),
            ttl: None,
            proxied: false,
            comment: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: normalize_name(&self.name),
            record_type: self.record_type.trim().to_ascii_uppercase(),
        }
    }

    /// Content compared without provider quoting and case differences
    pub fn normalized_content(&self) -> String {
        normalize_content(&self.record_type, &self.content)
    }

    fn is_managed(&self, marker: &str) -> bool {
        self.comment.as_deref().is_some_and(|c| c.contains(marker))
    }

    fn stamped(&self, marker: &str) -> Self {
        let mut record = self.clone();
        record.comment = match &self.comment {
            Some(comment) if comment.contains(marker) => Some(comment.clone()),
            Some(comment) if !comment.is_empty() => Some(format!("{} ({})", comment, marker)),
            _ => Some(marker.to_string()),
        };
        record
    }
}

impl std::fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.name, self.record_type, self.content)
    }
}

/// Normalized `(name, type)` identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub name: String,
    pub record_type: String,
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn normalize_content(record_type: &str, content: &str) -> String {
    let content = content.trim();
    match record_type.trim().to_ascii_uppercase().as_str() {
        // Route 53 returns TXT values quoted and split into 255-byte chunks
        "TXT" | "SPF" => {
            if content.len() >= 2 && content.starts_with('"') && content.ends_with('"') {
                content[1..content.len() - 1].replace("\" \"", "")
            } else {
                content.to_string()
            }
        }
        "CNAME" | "NS" | "MX" | "PTR" => content.trim_end_matches('.').to_ascii_lowercase(),
        _ => content.to_string(),
    }
}

/// Record operations of one hosted zone
#[async_trait]
pub trait ZoneClient: Send + Sync {
    /// Returns the provider name (e.g., "cloudflare", "route53")
    fn name(&self) -> &str;

    async fn list_records(&self) -> Result<Vec<DnsRecord>>;

    async fn create_record(&self, record: &DnsRecord) -> Result<DnsRecord>;

    async fn update_record(&self, current: &DnsRecord, desired: &DnsRecord) -> Result<DnsRecord>;

    async fn delete_record(&self, record: &DnsRecord) -> Result<()>;
}

/// Replace `current` by `desired`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub current: DnsRecord,
    pub desired: DnsRecord,
}

/// Why a live record outside the desired set is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Comment does not carry the managed marker
    Unmanaged,
    /// Managed, but does not match the target filter
    OutsideFilter,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unmanaged => write!(f, "unmanaged"),
            SkipReason::OutsideFilter => write!(f, "outside filter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub record: DnsRecord,
    pub reason: SkipReason,
}

/// Mutations needed to converge a zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub create: Vec<DnsRecord>,
    pub update: Vec<RecordUpdate>,
    pub delete: Vec<DnsRecord>,
    pub unmanaged_skipped: Vec<SkippedRecord>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} kept, {} unchanged",
            self.create.len(),
            self.update.len(),
            self.delete.len(),
            self.unmanaged_skipped.len(),
            self.unchanged
        )
    }
}

/// Result of applying a change set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied changes
    pub succeeded: Vec<ActionResult>,

    /// Failed changes
    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            success: true,
            message,
            error: None,
        });
    }

    fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            action_id,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }
}

/// Result of a single change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// e.g. "delete:_dmarc.example.com:TXT"
    pub action_id: String,

    pub success: bool,

    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Computes and applies [`ChangeSet`]s
#[derive(Debug, Clone)]
pub struct ZoneReconciler {
    managed_marker: String,
    target_filter: Option<String>,
    delete_pause: Duration,
}

impl ZoneReconciler {
    pub fn new(managed_marker: impl Into<String>) -> Self {
        Self {
            managed_marker: managed_marker.into(),
            target_filter: None,
            delete_pause: Duration::from_millis(100),
        }
    }

    /// Restrict deletions to records whose name or content contains `filter`
    pub fn with_target_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.target_filter = (!filter.is_empty()).then_some(filter);
        self
    }

    pub fn with_delete_pause(mut self, pause: Duration) -> Self {
        self.delete_pause = pause;
        self
    }

    pub fn managed_marker(&self) -> &str {
        &self.managed_marker
    }

    fn matches_filter(&self, record: &DnsRecord) -> bool {
        match &self.target_filter {
            None => true,
            Some(filter) => {
                let filter = filter.to_ascii_lowercase();
                record.name.to_ascii_lowercase().contains(&filter)
                    || record.content.to_ascii_lowercase().contains(&filter)
            }
        }
    }

    /// Diff `desired` against `live`
    ///
    /// A single live record is updated in place only when it could also be
    /// deleted. Otherwise the desired record is created next to it and the
    /// live one is reported in `unmanaged_skipped`.
    pub fn plan(&self, desired: &[DnsRecord], live: &[DnsRecord]) -> ChangeSet {
        let mut groups: BTreeMap<RecordKey, (Vec<&DnsRecord>, Vec<&DnsRecord>)> = BTreeMap::new();
        for record in desired {
            groups.entry(record.key()).or_default().0.push(record);
        }
        for record in live {
            groups.entry(record.key()).or_default().1.push(record);
        }

        let mut changes = ChangeSet::default();
        for (_, (wanted, existing)) in groups {
            if let ([want], [have]) = (wanted.as_slice(), existing.as_slice()) {
                let same_content = want.normalized_content() == have.normalized_content();
                let same_ttl = want.ttl.is_none() || want.ttl == have.ttl;
                if same_content && same_ttl && want.proxied == have.proxied {
                    changes.unchanged += 1;
                    continue;
                }
                // Replacing content discards the old value, so it needs the same
                // ownership as a delete
                if have.is_managed(&self.managed_marker) && self.matches_filter(have) {
                    changes.update.push(RecordUpdate {
                        current: (*have).clone(),
                        desired: want.stamped(&self.managed_marker),
                    });
                    continue;
                }
            }

            for want in &wanted {
                let content = want.normalized_content();
                if existing.iter().any(|have| have.normalized_content() == content) {
                    changes.unchanged += 1;
                } else {
                    changes.create.push(want.stamped(&self.managed_marker));
                }
            }

            for have in &existing {
                let content = have.normalized_content();
                if wanted.iter().any(|want| want.normalized_content() == content) {
                    continue;
                }
                if !have.is_managed(&self.managed_marker) {
                    changes.unmanaged_skipped.push(SkippedRecord {
                        record: (*have).clone(),
                        reason: SkipReason::Unmanaged,
                    });
                } else if !self.matches_filter(have) {
                    changes.unmanaged_skipped.push(SkippedRecord {
                        record: (*have).clone(),
                        reason: SkipReason::OutsideFilter,
                    });
                } else {
                    changes.delete.push((*have).clone());
                }
            }
        }
        changes
    }

    /// Apply creates, then updates, then deletes, one at a time.
    ///
    /// Failures are collected and do not stop the remaining changes.
    pub async fn apply(&self, zone: &dyn ZoneClient, changes: &ChangeSet, clock: &dyn Clock) -> ApplyResult {
        let start = clock.now();
        let mut result = ApplyResult::default();

        for record in &changes.create {
            let action_id = format!("create:{}:{}", record.name, record.record_type);
            tracing::info!("Creating DNS record: {}", record);
            match zone.create_record(record).await {
                Ok(_) => result.add_success(action_id, format!("created {}", record)),
                Err(e) => result.add_failure(action_id, e.to_string()),
            }
        }

        for change in &changes.update {
            let action_id = format!("update:{}:{}", change.desired.name, change.desired.record_type);
            tracing::info!(
                "Updating DNS record {} from {} to {}",
                change.current.name,
                change.current.content,
                change.desired.content
            );
            match zone.update_record(&change.current, &change.desired).await {
                Ok(_) => result.add_success(action_id, format!("updated {}", change.desired)),
                Err(e) => result.add_failure(action_id, e.to_string()),
            }
        }

        for (index, record) in changes.delete.iter().enumerate() {
            if index > 0 && !self.delete_pause.is_zero() {
                clock.sleep(self.delete_pause).await;
            }
            let action_id = format!("delete:{}:{}", record.name, record.record_type);
            tracing::info!("Deleting DNS record: {}", record);
            match zone.delete_record(record).await {
                Ok(()) => result.add_success(action_id, format!("deleted {}", record)),
                Err(e) if e.is_not_found() => {
                    tracing::debug!("DNS record already gone: {}", record);
                    result.add_success(action_id, format!("already absent {}", record));
                }
                Err(e) => result.add_failure(action_id, e.to_string()),
            }
        }

        result.duration_ms = (clock.now() - start).num_milliseconds().max(0) as u64;
        result
    }
}

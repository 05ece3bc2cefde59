#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use stackflow_cloud::dns::{DnsRecord, ZoneClient};
use stackflow_cloud::payload::Payload;
use stackflow_cloud::status::raw;
use stackflow_cloud::{
    ClientError, ExternalActionHandler, ExternalActionRequest, ExternalActionResponse, HandleKey,
    LifecycleClient, OperationResult, ProviderContext, ResourceHandle, ResourceKind,
    ResourceStatus, Result,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

pub const ACCOUNT: &str = "123456789012";

/// One resource held by [`FakeCloud`]
#[derive(Debug, Clone)]
pub struct FakeResource {
    pub id: String,
    pub status: ResourceStatus,
    /// Status reached once `settle_in` more describes have happened
    pub target: ResourceStatus,
    pub settle_in: u32,
    pub version: u32,
    pub enabled: bool,
    pub has_objects: bool,
    pub policy: Option<serde_json::Value>,
    pub revision: Option<String>,
    /// Name of the origin access control a distribution uses
    pub oac: Option<String>,
    pub validated: bool,
}

impl FakeResource {
    fn new(id: String, status: ResourceStatus) -> Self {
        Self {
            id,
            status,
            target: status,
            settle_in: 0,
            version: 1,
            enabled: false,
            has_objects: false,
            policy: None,
            revision: None,
            oac: None,
            validated: false,
        }
    }

    fn converging(mut self, target: ResourceStatus, polls: u32) -> Self {
        self.target = target;
        self.settle_in = polls;
        if polls == 0 {
            self.status = target;
        }
        self
    }
}

#[derive(Default)]
struct State {
    resources: BTreeMap<HandleKey, FakeResource>,
    next_id: u32,
    calls: Vec<String>,
    injected: VecDeque<(&'static str, ClientError)>,
    settle_polls: u32,
}

/// In-memory provider whose state survives across plan runs.
///
/// Enforces the dependency rules of the real services: a distribution must
/// be disabled before deletion, an origin access control cannot be deleted
/// while a distribution uses it, and a bucket must be empty to be deleted.
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::with_settle_polls(2)
    }

    /// Asynchronous changes become visible after `polls` describes
    pub fn with_settle_polls(polls: u32) -> Self {
        Self {
            state: Mutex::new(State {
                settle_polls: polls,
                ..State::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every create/update/delete call so far
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("describe"))
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(op)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn resource(&self, kind: ResourceKind, name: &str) -> Option<FakeResource> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&HandleKey::new(kind, name))
            .cloned()
    }

    pub fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.resource(kind, name).is_some()
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    /// Stand-in for the operator adding the validation record
    pub fn validate_certificate(&self, domain: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(cert) = state
            .resources
            .get_mut(&HandleKey::new(ResourceKind::Certificate, domain))
        {
            cert.validated = true;
        }
    }

    /// Fail the next `op` ("create", "describe", "update", "delete") with `err`
    pub fn fail_next(&self, op: &'static str, err: ClientError) {
        self.state.lock().unwrap().injected.push_back((op, err));
    }

    /// Keep a distribution converging for `polls` more describes
    pub fn stall(&self, kind: ResourceKind, name: &str, polls: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(res) = state.resources.get_mut(&HandleKey::new(kind, name)) {
            res.settle_in = polls;
            res.status = ResourceStatus::InProgress;
        }
    }

    fn enter(&self, op: &'static str, handle: &ResourceHandle) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", op, handle.key()));
        if state.injected.front().is_some_and(|(o, _)| *o == op) {
            if let Some((_, err)) = state.injected.pop_front() {
                return Err(err);
            }
        }
        Ok(state)
    }
}

fn result_of(kind: ResourceKind, name: &str, res: &FakeResource) -> OperationResult {
    let raw = match kind {
        ResourceKind::Distribution => json!({
            raw::ARN: format!("arn:aws:cloudfront::{}:distribution/{}", ACCOUNT, res.id),
            raw::ENABLED: res.enabled,
            raw::DOMAIN_NAME: format!("{}.cloudfront.net", res.id.to_lowercase()),
        }),
        ResourceKind::Bucket => {
            let tags = match &res.revision {
                Some(rev) => json!({ raw::REVISION_TAG: rev }),
                None => json!({}),
            };
            json!({
                raw::POLICY: res.policy.clone().unwrap_or(serde_json::Value::Null),
                raw::TAGS: tags,
                raw::HAS_OBJECTS: res.has_objects,
            })
        }
        ResourceKind::Certificate => json!({
            raw::ARN: format!("arn:aws:acm:us-east-1:{}:certificate/{}", ACCOUNT, res.id),
            raw::VALIDATION_RECORD: {
                "name": format!("_a79865eb.{}.", name),
                "type": "CNAME",
                "value": "_424c7224.acm-validations.aws.",
            },
        }),
        _ => json!({}),
    };
    OperationResult::new(res.status)
        .with_id(res.id.clone())
        .with_version(format!("v{}", res.version))
        .with_raw(raw)
}

#[async_trait]
impl LifecycleClient for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports(&self, _kind: ResourceKind) -> bool {
        true
    }

    async fn create(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let mut state = self.enter("create", handle)?;
        let key = handle.key();
        if let Some(existing) = state.resources.get(&key) {
            return Ok(result_of(key.kind, &key.name, existing));
        }

        state.next_id += 1;
        let serial = state.next_id;
        let settle = state.settle_polls;
        let resource = match payload {
            Payload::Bucket(_) => FakeResource::new(handle.name().to_string(), ResourceStatus::Ready),
            Payload::OriginAccessControl(_) => {
                FakeResource::new(format!("E{:04}OAC", serial), ResourceStatus::Ready)
            }
            Payload::Distribution(spec) => {
                let mut oac_name = None;
                if let Some(oac) = &spec.origin_access_control {
                    let known = state
                        .resources
                        .get(&HandleKey::new(ResourceKind::OriginAccessControl, &oac.name))
                        .map(|r| r.id.clone());
                    if oac.id.is_none() || oac.id != known {
                        return Err(ClientError::InvalidArgument(format!(
                            "unknown origin access control {}",
                            oac.name
                        )));
                    }
                    oac_name = Some(oac.name.clone());
                }
                let mut res = FakeResource::new(format!("E{:04}DIST", serial), ResourceStatus::InProgress)
                    .converging(ResourceStatus::Ready, settle);
                res.enabled = true;
                res.oac = oac_name;
                res
            }
            Payload::Invalidation(spec) => {
                if handle.parent_id().is_none() || spec.distribution.id.is_none() {
                    return Err(ClientError::InvalidArgument(
                        "invalidation without distribution id".to_string(),
                    ));
                }
                FakeResource::new(format!("I{:04}", serial), ResourceStatus::InProgress)
                    .converging(ResourceStatus::Ready, settle)
            }
            Payload::Certificate(_) => {
                FakeResource::new(format!("cert-{:04}", serial), ResourceStatus::Pending)
            }
            Payload::Table(_) => FakeResource::new(handle.name().to_string(), ResourceStatus::InProgress)
                .converging(ResourceStatus::Ready, settle),
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "cannot create with {}",
                    other.name()
                )));
            }
        };

        let result = result_of(key.kind, &key.name, &resource);
        state.resources.insert(key, resource);
        Ok(result)
    }

    async fn describe(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let mut state = self.enter("describe", handle)?;
        let key = handle.key();
        let Some(res) = state.resources.get_mut(&key) else {
            return Err(ClientError::NotFound(format!("{} does not exist", key)));
        };

        if key.kind == ResourceKind::Certificate && res.validated {
            res.status = ResourceStatus::Ready;
        }
        if res.settle_in > 0 {
            res.settle_in -= 1;
            if res.settle_in == 0 {
                res.status = res.target;
            }
        }
        if res.status == ResourceStatus::NotFound {
            state.resources.remove(&key);
            return Err(ClientError::NotFound(format!("{} does not exist", key)));
        }
        Ok(result_of(key.kind, &key.name, res))
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult> {
        let mut state = self.enter("update", handle)?;
        let settle = state.settle_polls;
        let key = handle.key();
        let Some(res) = state.resources.get_mut(&key) else {
            return Err(ClientError::NotFound(format!("{} does not exist", key)));
        };

        let current = format!("v{}", res.version);
        if if_match.is_some_and(|v| v != current) {
            return Err(ClientError::Conflict {
                expected_version: Some(current),
                message: "PreconditionFailed".to_string(),
            });
        }

        match payload {
            Payload::BucketPolicy(policy) => {
                let document = policy.render(handle.name()).ok_or_else(|| {
                    ClientError::InvalidArgument("policy references an unknown distribution".into())
                })?;
                res.policy = Some(document);
            }
            Payload::SyncObjects(spec) => {
                res.has_objects = true;
                res.revision = spec.revision.clone();
            }
            Payload::EmptyBucket => res.has_objects = false,
            Payload::DistributionEnabled(enabled) => {
                res.enabled = *enabled;
                res.status = ResourceStatus::InProgress;
                let target = if *enabled {
                    ResourceStatus::Ready
                } else {
                    ResourceStatus::Disabled
                };
                *res = res.clone().converging(target, settle);
            }
            Payload::Record(_) => {}
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "cannot update with {}",
                    other.name()
                )));
            }
        }
        res.version += 1;
        Ok(result_of(key.kind, &key.name, res))
    }

    async fn delete(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let mut state = self.enter("delete", handle)?;
        let settle = state.settle_polls;
        let key = handle.key();
        let Some(res) = state.resources.get(&key).cloned() else {
            return Err(ClientError::NotFound(format!("{} does not exist", key)));
        };

        match key.kind {
            ResourceKind::Distribution if res.enabled || res.status != ResourceStatus::Disabled => {
                return Err(ClientError::InUse(format!(
                    "DistributionNotDisabled: {} is still enabled or deploying",
                    res.id
                )));
            }
            ResourceKind::OriginAccessControl => {
                let users: Vec<&FakeResource> = state
                    .resources
                    .iter()
                    .filter(|(k, r)| {
                        k.kind == ResourceKind::Distribution && r.oac.as_deref() == Some(&key.name)
                    })
                    .map(|(_, r)| r)
                    .collect();
                if let Some(user) = users.first() {
                    return Err(ClientError::InUse(format!(
                        "OriginAccessControlInUse: used by {}",
                        user.id
                    )));
                }
            }
            ResourceKind::Bucket if res.has_objects => {
                return Err(ClientError::InUse(format!("BucketNotEmpty: {}", res.id)));
            }
            ResourceKind::Table => {
                let mut deleting = res.converging(ResourceStatus::NotFound, settle.max(1));
                deleting.status = ResourceStatus::InProgress;
                let result = result_of(key.kind, &key.name, &deleting);
                state.resources.insert(key, deleting);
                return Ok(result);
            }
            _ => {}
        }

        state.resources.remove(&key);
        Ok(OperationResult::not_found().with_id(res.id))
    }
}

/// Answers every checkpoint the same way and remembers what it was shown
pub struct ScriptedOperator {
    answer: ExternalActionResponse,
    seen: Mutex<Vec<ExternalActionRequest>>,
}

impl ScriptedOperator {
    pub fn confirming() -> Self {
        Self::new(ExternalActionResponse::Confirmed)
    }

    pub fn deferring() -> Self {
        Self::new(ExternalActionResponse::Deferred)
    }

    fn new(answer: ExternalActionResponse) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExternalActionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl ExternalActionHandler for ScriptedOperator {
    fn request(&self, request: &ExternalActionRequest) -> ExternalActionResponse {
        self.seen.lock().unwrap().push(request.clone());
        self.answer
    }
}

/// In-memory DNS zone
pub struct FakeZone {
    records: Mutex<Vec<DnsRecord>>,
    next_id: Mutex<u32>,
    pub deleted: Mutex<Vec<DnsRecord>>,
}

impl FakeZone {
    pub fn new(records: Vec<DnsRecord>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.id = Some(format!("rec-{}", i));
                r
            })
            .collect::<Vec<_>>();
        let next = records.len() as u32;
        Self {
            records: Mutex::new(records),
            next_id: Mutex::new(next),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZoneClient for FakeZone {
    fn name(&self) -> &str {
        "fake-zone"
    }

    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        Ok(self.records())
    }

    async fn create_record(&self, record: &DnsRecord) -> Result<DnsRecord> {
        let mut next = self.next_id.lock().unwrap();
        let mut created = record.clone();
        created.id = Some(format!("rec-{}", *next));
        *next += 1;
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_record(&self, current: &DnsRecord, desired: &DnsRecord) -> Result<DnsRecord> {
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id == current.id)
            .ok_or_else(|| ClientError::NotFound(current.to_string()))?;
        let mut updated = desired.clone();
        updated.id = current.id.clone();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != record.id);
        if records.len() == before {
            return Err(ClientError::NotFound(record.to_string()));
        }
        self.deleted.lock().unwrap().push(record.clone());
        Ok(())
    }
}

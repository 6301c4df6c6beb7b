//! Status conditions of a VirtualServer
//!
//! Tracks independent readiness signals (services, virtual machine, secret,
//! started) alongside the top-level `Ready` condition. Conditions are kept
//! in insertion order keyed by type, so upserts never reorder them and the
//! serialized list is stable.
//!
//! Aggregation into `Ready` is driven by the caller: a failing sub-condition
//! is written with `propagate_to_ready` so `Ready` is demoted in the same
//! call, and [`VirtualServerStatus::aggregate_ready`] computes the verdict
//! for a full pass.

use crate::error::StatusError;
use crate::virtual_server::{VirtualServer, VirtualServerStatus};
use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// Condition type, the closed set of signals a VirtualServer reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// Overall readiness of the VirtualServer
    Ready,
    /// Services created for the VirtualServer are ready
    ServicesReady,
    /// The underlying virtual machine is ready
    #[serde(rename = "VirtualMachineReady")]
    VmReady,
    /// The VirtualServer has been started
    #[serde(rename = "VirtualServerStarted")]
    Started,
    /// The cloud-init secret is ready
    SecretReady,
}

impl ConditionType {
    /// Wire name of the condition type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::ServicesReady => "ServicesReady",
            Self::VmReady => "VirtualMachineReady",
            Self::Started => "VirtualServerStarted",
            Self::SecretReady => "SecretReady",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Machine-readable reason attached to a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionReason {
    /// First reconcile has not completed
    Initializing,
    /// Waiting on a spec update to be applied
    Pending,
    /// The VirtualServer is being deleted
    Terminating,
    /// Creation or start failed
    Failed,
    /// Created and ready for use
    #[serde(rename = "VirtualServerReady")]
    Ready,
    /// Started
    #[serde(rename = "VirtualServerStarted")]
    Started,
    /// Stopped
    #[serde(rename = "VirtualServerStopped")]
    Stopped,
    /// The virtual machine instance shut down
    #[serde(rename = "VirtualMachineInstanceShutdown")]
    VmiShutdown,
    /// The configured definition is deprecated and needs a manual update
    DefinitionDeprecated,
    /// Services were created
    ServicesCreated,
    /// Waiting for services to become ready
    WaitingForServices,
    /// Services are ready
    ServicesReady,
    /// The virtual machine name is owned by something else
    #[serde(rename = "VirtualMachineNameTaken")]
    VmNameTaken,
    /// The virtual machine is ready
    #[serde(rename = "VirtualMachineReady")]
    VmReady,
    /// The secret was created
    SecretCreated,
    /// Waiting for the secret to become ready
    #[serde(rename = "WaitingForSecret")]
    WaitingForSecrets,
    /// The root disk is being resized
    #[serde(rename = "RootDiskResizeinProgress")]
    ResizeInProgress,
}

impl ConditionReason {
    /// Wire name of the reason, also the default message
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Pending => "Pending",
            Self::Terminating => "Terminating",
            Self::Failed => "Failed",
            Self::Ready => "VirtualServerReady",
            Self::Started => "VirtualServerStarted",
            Self::Stopped => "VirtualServerStopped",
            Self::VmiShutdown => "VirtualMachineInstanceShutdown",
            Self::DefinitionDeprecated => "DefinitionDeprecated",
            Self::ServicesCreated => "ServicesCreated",
            Self::WaitingForServices => "WaitingForServices",
            Self::ServicesReady => "ServicesReady",
            Self::VmNameTaken => "VirtualMachineNameTaken",
            Self::VmReady => "VirtualMachineReady",
            Self::SecretCreated => "SecretCreated",
            Self::WaitingForSecrets => "WaitingForSecret",
            Self::ResizeInProgress => "RootDiskResizeinProgress",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kubernetes-style condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: ConditionReason,

    /// Human-readable message
    pub message: String,

    /// Last time the status changed
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the current time.
    /// A missing message defaults to the reason.
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: Option<&str>,
    ) -> Self {
        Self {
            type_,
            status,
            reason,
            message: message.unwrap_or(reason.as_str()).to_string(),
            last_transition_time: now(),
        }
    }

    /// Whether the status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Transition times are stored at second precision, like metav1.Time
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Ordered set of conditions keyed by type.
///
/// Serialized as a plain list; on decode a repeated type replaces the
/// earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(IndexMap<ConditionType, Condition>);

impl Conditions {
    /// Whether no condition has been recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Look up a condition by type
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.get(&type_)
    }

    /// Conditions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    /// Insert or update a condition in place, preserving its position.
    ///
    /// Reason and message are always overwritten; the transition time only
    /// moves when the status changes. Returns whether the status changed
    /// (always true for a new condition).
    fn upsert(&mut self, condition: Condition) -> bool {
        match self.0.get_mut(&condition.type_) {
            Some(existing) => {
                let transitioned = existing.status != condition.status;
                if transitioned {
                    existing.status = condition.status;
                    existing.last_transition_time = condition.last_transition_time;
                }
                existing.reason = condition.reason;
                existing.message = condition.message;
                transitioned
            }
            None => {
                self.0.insert(condition.type_, condition);
                true
            }
        }
    }
}

impl Serialize for Conditions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Condition>::deserialize(deserializer)?;
        let mut map = IndexMap::with_capacity(list.len());
        for condition in list {
            map.insert(condition.type_, condition);
        }
        Ok(Self(map))
    }
}

impl JsonSchema for Conditions {
    fn schema_name() -> Cow<'static, str> {
        "Conditions".into()
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        Vec::<Condition>::json_schema(generator)
    }
}

/// Outcome of [`VirtualServerStatus::set_condition`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionUpdate {
    /// The written condition's status changed (or it was newly added)
    pub transitioned: bool,

    /// Snapshot of `Ready` after propagation, when propagation was requested
    pub ready: Option<Condition>,
}

impl VirtualServerStatus {
    /// Set a condition, inserting it or updating it in place.
    ///
    /// A missing message defaults to the reason. With `propagate_to_ready`
    /// the status and message are mirrored onto the `Ready` condition, which
    /// must already exist; otherwise nothing is written.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: Option<&str>,
        propagate_to_ready: bool,
    ) -> Result<ConditionUpdate, StatusError> {
        if propagate_to_ready
            && type_ != ConditionType::Ready
            && self.conditions.get(ConditionType::Ready).is_none()
        {
            return Err(StatusError::ReadyConditionMissing(type_));
        }

        let condition = Condition::new(type_, status, reason, message);
        let message = condition.message.clone();
        let stamp = condition.last_transition_time;
        let transitioned = self.record(condition);

        let ready = if propagate_to_ready {
            self.conditions.0.get_mut(&ConditionType::Ready).map(|ready| {
                if ready.status != status {
                    debug!(from = %type_, status = %status, "Propagating condition to Ready");
                    ready.status = status;
                    ready.last_transition_time = stamp;
                }
                ready.message = message;
                ready.clone()
            })
        } else {
            None
        };

        Ok(ConditionUpdate {
            transitioned,
            ready,
        })
    }

    /// Seed the initial conditions, all Unknown/Initializing, and reset the
    /// floating IP map. `with_secret` adds `SecretReady`.
    pub fn initialize_status(&mut self, with_secret: bool) {
        self.network.floating_ips.clear();

        let mut types = vec![
            ConditionType::Ready,
            ConditionType::ServicesReady,
            ConditionType::VmReady,
            ConditionType::Started,
        ];
        if with_secret {
            types.push(ConditionType::SecretReady);
        }
        for type_ in types {
            self.conditions.upsert(Condition::new(
                type_,
                ConditionStatus::Unknown,
                ConditionReason::Initializing,
                None,
            ));
        }
    }

    /// Derive `Started` from whether the machine is running.
    ///
    /// Running is `True/Started`. Not running is ambiguous until the server
    /// has been ready: `Unknown/Pending` while `Ready` is not `True` (or
    /// absent), `False/Stopped` afterwards.
    pub fn update_virtual_machine_started_condition(&mut self, running: bool) {
        let ready = self
            .conditions
            .get(ConditionType::Ready)
            .is_some_and(Condition::is_true);

        let (status, reason) = if running {
            (ConditionStatus::True, ConditionReason::Started)
        } else if !ready {
            (ConditionStatus::Unknown, ConditionReason::Pending)
        } else {
            (ConditionStatus::False, ConditionReason::Stopped)
        };

        self.record(Condition::new(ConditionType::Started, status, reason, None));
    }

    /// Upsert a condition, logging a status transition
    fn record(&mut self, condition: Condition) -> bool {
        let (type_, status, reason) = (condition.type_, condition.status, condition.reason);
        let transitioned = self.conditions.upsert(condition);
        if transitioned {
            debug!(
                condition = %type_,
                status = %status,
                reason = %reason,
                "Condition transitioned"
            );
        }
        transitioned
    }

    /// Copy of a condition, `None` if it has never been set
    pub fn condition(&self, type_: ConditionType) -> Option<Condition> {
        self.conditions.get(type_).cloned()
    }

    /// Copy of the `Ready` condition
    pub fn ready_status(&self) -> Option<Condition> {
        self.condition(ConditionType::Ready)
    }

    /// Copy of the `VirtualMachineReady` condition
    pub fn vm_ready_status(&self) -> Option<Condition> {
        self.condition(ConditionType::VmReady)
    }

    /// Whether the status has never been initialized
    pub fn has_no_conditions(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Readiness verdict from the sub-conditions.
    ///
    /// `True` when services, virtual machine and (if tracked) secret are all
    /// `True`; `False` as soon as one of them is `False`; `Unknown` otherwise.
    /// Nothing is written.
    pub fn aggregate_ready(&self) -> ConditionStatus {
        let mut required = vec![ConditionType::ServicesReady, ConditionType::VmReady];
        if self.conditions.get(ConditionType::SecretReady).is_some() {
            required.push(ConditionType::SecretReady);
        }

        let statuses: Vec<ConditionStatus> = required
            .into_iter()
            .map(|t| self.conditions.get(t).map_or(ConditionStatus::Unknown, |c| c.status))
            .collect();

        if statuses.contains(&ConditionStatus::False) {
            ConditionStatus::False
        } else if statuses.iter().all(|s| *s == ConditionStatus::True) {
            ConditionStatus::True
        } else {
            ConditionStatus::Unknown
        }
    }
}

impl VirtualServer {
    /// Status, created empty on first access
    pub fn status_mut(&mut self) -> &mut VirtualServerStatus {
        self.status.get_or_insert_with(VirtualServerStatus::default)
    }

    /// See [`VirtualServerStatus::set_condition`]
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: Option<&str>,
        propagate_to_ready: bool,
    ) -> Result<ConditionUpdate, StatusError> {
        self.status_mut()
            .set_condition(type_, status, reason, message, propagate_to_ready)
    }

    /// See [`VirtualServerStatus::initialize_status`]
    pub fn initialize_status(&mut self, with_secret: bool) {
        self.status_mut().initialize_status(with_secret);
    }

    /// See [`VirtualServerStatus::update_virtual_machine_started_condition`]
    pub fn update_virtual_machine_started_condition(&mut self, running: bool) {
        self.status_mut()
            .update_virtual_machine_started_condition(running);
    }

    /// Whether the status has never been initialized
    pub fn has_no_conditions(&self) -> bool {
        self.status
            .as_ref()
            .is_none_or(VirtualServerStatus::has_no_conditions)
    }

    /// Copy of the `Ready` condition
    pub fn ready_status(&self) -> Option<Condition> {
        self.status.as_ref().and_then(VirtualServerStatus::ready_status)
    }

    /// Copy of the `VirtualMachineReady` condition
    pub fn vm_ready_status(&self) -> Option<Condition> {
        self.status.as_ref().and_then(VirtualServerStatus::vm_ready_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn initialized() -> VirtualServerStatus {
        let mut status = VirtualServerStatus::default();
        status.initialize_status(false);
        status
    }

    fn status_of(status: &VirtualServerStatus, type_: ConditionType) -> ConditionStatus {
        status.condition(type_).map(|c| c.status).unwrap()
    }

    #[test]
    fn test_initialize_status_seeds_four_conditions() {
        let mut vs = VirtualServer::namespaced("vs", "default");
        assert!(vs.has_no_conditions());

        vs.initialize_status(false);
        assert!(!vs.has_no_conditions());

        let status = vs.status.as_ref().unwrap();
        let types: Vec<ConditionType> = status.conditions.iter().map(|c| c.type_).collect();
        assert_eq!(
            types,
            vec![
                ConditionType::Ready,
                ConditionType::ServicesReady,
                ConditionType::VmReady,
                ConditionType::Started,
            ]
        );
        for c in status.conditions.iter() {
            assert_eq!(c.status, ConditionStatus::Unknown);
            assert_eq!(c.reason, ConditionReason::Initializing);
            assert_eq!(c.message, "Initializing");
        }
    }

    #[test]
    fn test_initialize_status_with_secret() {
        let mut status = VirtualServerStatus::default();
        status.initialize_status(true);
        assert_eq!(status.conditions.len(), 5);
        assert_eq!(
            status_of(&status, ConditionType::SecretReady),
            ConditionStatus::Unknown
        );
    }

    #[test]
    fn test_initialize_status_resets_floating_ips() {
        let mut status = VirtualServerStatus::default();
        status
            .network
            .floating_ips
            .insert("lb".to_string(), "1.2.3.4".to_string());
        status.initialize_status(false);
        assert!(status.floating_ips().is_empty());
    }

    #[test]
    fn test_set_condition_upserts_in_place() {
        let mut status = initialized();
        let update = status
            .set_condition(
                ConditionType::ServicesReady,
                ConditionStatus::True,
                ConditionReason::ServicesReady,
                None,
                false,
            )
            .unwrap();
        assert!(update.transitioned);
        assert!(update.ready.is_none());

        assert_eq!(status.conditions.len(), 4);
        let second = status.conditions.iter().nth(1).unwrap();
        assert_eq!(second.type_, ConditionType::ServicesReady);
        assert_eq!(second.status, ConditionStatus::True);
        assert_eq!(second.message, "ServicesReady");
    }

    #[test]
    fn test_same_status_keeps_transition_time_but_updates_reason() {
        let mut status = initialized();
        status
            .set_condition(
                ConditionType::VmReady,
                ConditionStatus::False,
                ConditionReason::Pending,
                None,
                false,
            )
            .unwrap();

        let old = Utc::now() - Duration::hours(1);
        status.conditions.0.get_mut(&ConditionType::VmReady).unwrap().last_transition_time = old;

        let update = status
            .set_condition(
                ConditionType::VmReady,
                ConditionStatus::False,
                ConditionReason::VmNameTaken,
                Some("name owned by another VirtualServer"),
                false,
            )
            .unwrap();
        assert!(!update.transitioned);

        let vm = status.vm_ready_status().unwrap();
        assert_eq!(vm.reason, ConditionReason::VmNameTaken);
        assert_eq!(vm.message, "name owned by another VirtualServer");
        assert_eq!(vm.last_transition_time, old);
    }

    #[test]
    fn test_status_change_moves_transition_time() {
        let mut status = initialized();
        let old = Utc::now() - Duration::hours(1);
        status.conditions.0.get_mut(&ConditionType::VmReady).unwrap().last_transition_time = old;

        status
            .set_condition(
                ConditionType::VmReady,
                ConditionStatus::True,
                ConditionReason::VmReady,
                None,
                false,
            )
            .unwrap();
        assert!(status.vm_ready_status().unwrap().last_transition_time > old);
    }

    #[test]
    fn test_propagate_to_ready() {
        let mut status = initialized();
        let update = status
            .set_condition(
                ConditionType::ServicesReady,
                ConditionStatus::False,
                ConditionReason::WaitingForServices,
                Some("waiting for load balancer"),
                true,
            )
            .unwrap();

        let ready = update.ready.unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.message, "waiting for load balancer");
        // reason of Ready is left alone
        assert_eq!(ready.reason, ConditionReason::Initializing);
        assert_eq!(status.ready_status().unwrap(), ready);
    }

    #[test]
    fn test_propagate_without_ready_is_rejected() {
        let mut status = VirtualServerStatus::default();
        let err = status
            .set_condition(
                ConditionType::ServicesReady,
                ConditionStatus::False,
                ConditionReason::Failed,
                None,
                true,
            )
            .unwrap_err();
        assert_eq!(err, StatusError::ReadyConditionMissing(ConditionType::ServicesReady));
        assert!(status.has_no_conditions());
    }

    #[test]
    fn test_started_when_running() {
        for ready in [ConditionStatus::Unknown, ConditionStatus::True, ConditionStatus::False] {
            let mut status = initialized();
            status
                .set_condition(ConditionType::Ready, ready, ConditionReason::Pending, None, false)
                .unwrap();
            status.update_virtual_machine_started_condition(true);

            let started = status.condition(ConditionType::Started).unwrap();
            assert_eq!(started.status, ConditionStatus::True);
            assert_eq!(started.reason, ConditionReason::Started);
        }
    }

    #[test]
    fn test_not_running_before_ready_is_pending() {
        let mut status = initialized();
        status.update_virtual_machine_started_condition(false);

        let started = status.condition(ConditionType::Started).unwrap();
        assert_eq!(started.status, ConditionStatus::Unknown);
        assert_eq!(started.reason, ConditionReason::Pending);
    }

    #[test]
    fn test_not_running_after_ready_is_stopped() {
        let mut status = initialized();
        status
            .set_condition(
                ConditionType::Ready,
                ConditionStatus::True,
                ConditionReason::Ready,
                None,
                false,
            )
            .unwrap();
        status.update_virtual_machine_started_condition(false);

        let started = status.condition(ConditionType::Started).unwrap();
        assert_eq!(started.status, ConditionStatus::False);
        assert_eq!(started.reason, ConditionReason::Stopped);
    }

    #[test]
    fn test_started_transition_time_moves_only_on_change() {
        let mut status = initialized();
        let old = Utc::now() - Duration::hours(1);
        status.conditions.0.get_mut(&ConditionType::Started).unwrap().last_transition_time = old;

        status.update_virtual_machine_started_condition(true);
        let started = status.condition(ConditionType::Started).unwrap();
        assert!(started.last_transition_time > old);

        status.update_virtual_machine_started_condition(true);
        let again = status.condition(ConditionType::Started).unwrap();
        assert_eq!(again.last_transition_time, started.last_transition_time);
        assert_eq!(again.status, ConditionStatus::True);
    }

    #[test]
    fn test_not_running_without_status_is_pending() {
        let mut vs = VirtualServer::namespaced("vs", "default");
        vs.update_virtual_machine_started_condition(false);
        let started = vs.status.unwrap().condition(ConditionType::Started).unwrap();
        assert_eq!(started.status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_lookups_distinguish_absent_from_unknown() {
        let vs = VirtualServer::namespaced("vs", "default");
        assert!(vs.ready_status().is_none());
        assert!(vs.vm_ready_status().is_none());

        let mut vs = vs;
        vs.initialize_status(false);
        assert_eq!(vs.ready_status().unwrap().status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_ready_snapshot_does_not_alias() {
        let status = initialized();
        let mut snapshot = status.ready_status().unwrap();
        snapshot.status = ConditionStatus::True;
        assert_eq!(status_of(&status, ConditionType::Ready), ConditionStatus::Unknown);
    }

    #[test]
    fn test_aggregate_ready() {
        let mut status = initialized();
        assert_eq!(status.aggregate_ready(), ConditionStatus::Unknown);

        status
            .set_condition(
                ConditionType::ServicesReady,
                ConditionStatus::True,
                ConditionReason::ServicesReady,
                None,
                false,
            )
            .unwrap();
        assert_eq!(status.aggregate_ready(), ConditionStatus::Unknown);

        status
            .set_condition(
                ConditionType::VmReady,
                ConditionStatus::True,
                ConditionReason::VmReady,
                None,
                false,
            )
            .unwrap();
        assert_eq!(status.aggregate_ready(), ConditionStatus::True);

        status
            .set_condition(
                ConditionType::SecretReady,
                ConditionStatus::Unknown,
                ConditionReason::WaitingForSecrets,
                None,
                false,
            )
            .unwrap();
        assert_eq!(status.aggregate_ready(), ConditionStatus::Unknown);

        status
            .set_condition(
                ConditionType::ServicesReady,
                ConditionStatus::False,
                ConditionReason::Failed,
                None,
                false,
            )
            .unwrap();
        assert_eq!(status.aggregate_ready(), ConditionStatus::False);
    }

    #[test]
    fn test_conditions_serialize_as_list() {
        let status = initialized();
        let json = serde_json::to_value(&status).unwrap();
        let list = json["conditions"].as_array().unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[2]["type"], "VirtualMachineReady");
        assert_eq!(list[3]["type"], "VirtualServerStarted");
        assert_eq!(list[0]["status"], "Unknown");
        assert!(list[0]["lastTransitionTime"].is_string());

        let back: VirtualServerStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_duplicate_types_collapse_on_decode() {
        let json = serde_json::json!({
            "conditions": [
                {"type": "Ready", "status": "Unknown", "reason": "Initializing", "message": "Initializing", "lastTransitionTime": "2024-01-01T00:00:00Z"},
                {"type": "VirtualServerStarted", "status": "True", "reason": "VirtualServerStarted", "message": "VirtualServerStarted", "lastTransitionTime": "2024-01-01T00:00:00Z"},
                {"type": "Ready", "status": "True", "reason": "VirtualServerReady", "message": "VirtualServerReady", "lastTransitionTime": "2024-01-02T00:00:00Z"}
            ]
        });
        let status: VirtualServerStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status.conditions.len(), 2);
        let first = status.conditions.iter().next().unwrap();
        assert_eq!(first.type_, ConditionType::Ready);
        assert_eq!(first.status, ConditionStatus::True);
    }
}

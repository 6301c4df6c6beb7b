//! VirtualServer CRD
//!
//! Describes a virtual machine workload: its requested resources, storage,
//! network exposure and login users, plus the observed status written back
//! by the reconciler. Spec mutators live in `spec_builder`, the status
//! condition engine in `conditions`.

use crate::conditions::Conditions;
use crate::quantity::Quantity;
use k8s_openapi::api::core::v1::Affinity;
use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// VirtualServerSpec defines the desired state of a VirtualServer
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "virtualservers.coreweave.com",
    version = "v1alpha1",
    kind = "VirtualServer",
    namespaced,
    status = "VirtualServerStatus",
    derive = "PartialEq",
    shortname = "vs",
    shortname = "vserver",
    printcolumn = r#"{"name":"status", "type":"string", "jsonPath":".status.conditions[0].reason"}"#,
    printcolumn = r#"{"name":"reason", "type":"string", "jsonPath":".status.conditions[0].message"}"#,
    printcolumn = r#"{"name":"started", "type":"string", "jsonPath":".status.conditions[3].status"}"#,
    printcolumn = r#"{"name":"Internal IP", "type":"string", "jsonPath":".status.network.internalIP"}"#,
    printcolumn = r#"{"name":"External IP", "type":"string", "jsonPath":".status.network.externalIP"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    /// Region the VirtualServer is scheduled in (e.g. "ord1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Operating system
    #[serde(default)]
    pub os: VirtualServerOs,

    /// Requested compute resources
    #[serde(default)]
    pub resources: VirtualServerResources,

    /// Root filesystem, additional disks, filesystems and swap
    #[serde(default)]
    pub storage: VirtualServerStorage,

    /// Login users configured through cloud-init
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<VirtualServerUser>,

    /// Network exposure
    #[serde(default)]
    pub network: VirtualServerNetwork,

    /// Start the VirtualServer as soon as it is created
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initialize_running: bool,

    /// Custom cloud-init user data (YAML)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud_init: String,

    /// Run strategy of the underlying virtual machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_run_strategy_schema")]
    pub run_strategy: Option<RunStrategy>,

    /// SMBIOS firmware identity
    #[serde(default, skip_serializing_if = "Firmware::is_empty")]
    pub firmware: Firmware,

    /// Use virtio-transitional devices for older guests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_virtio_transitional: Option<bool>,

    /// Grace period before a stopping VirtualServer is killed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,

    /// Scheduling constraints of the underlying pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Liveness probe of the underlying virtual machine, kept as written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserved_object_schema")]
    pub liveness_probe: Option<serde_json::Value>,

    /// Readiness probe of the underlying virtual machine, kept as written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserved_object_schema")]
    pub readiness_probe: Option<serde_json::Value>,
}

/// Resource class of a VirtualServer, derived from which type is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SystemPresetClass {
    /// CPU-only server
    Cpu,
    /// GPU server
    Gpu,
}

impl fmt::Display for SystemPresetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// VirtualServerOs defines the operating system of the VirtualServer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerOs {
    /// Operating system family
    #[serde(rename = "type")]
    pub type_: OsType,

    /// Operating system configuration definition, defaults to "a"
    #[serde(default = "default_definition")]
    pub definition: String,

    /// Boot with a UEFI bootloader
    #[serde(default, rename = "enableUEFIBoot", skip_serializing_if = "std::ops::Not::not")]
    pub enable_uefi_boot: bool,
}

impl Default for VirtualServerOs {
    fn default() -> Self {
        Self {
            type_: OsType::default(),
            definition: default_definition(),
            enable_uefi_boot: false,
        }
    }
}

/// Operating system family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    /// Linux guest
    #[default]
    Linux,
    /// Windows guest
    Windows,
}

/// VirtualServerResources defines the resources requested for the VirtualServer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerResources {
    /// Resource configuration definition, defaults to "a"
    #[serde(default = "default_definition")]
    pub definition: String,

    /// GPU request
    #[serde(default)]
    pub gpu: VirtualServerResourceGpu,

    /// CPU request
    #[serde(default)]
    pub cpu: VirtualServerResourceCpu,

    /// Memory request (e.g. "16Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::quantity::optional_quantity_schema")]
    pub memory: Option<Quantity>,
}

impl Default for VirtualServerResources {
    fn default() -> Self {
        Self {
            definition: default_definition(),
            gpu: VirtualServerResourceGpu::default(),
            cpu: VirtualServerResourceCpu::default(),
            memory: None,
        }
    }
}

/// CPU request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerResourceCpu {
    /// CPU type, mutually exclusive with the GPU type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Number of cores, defaults to 2
    #[serde(default = "default_cpu_count")]
    #[schemars(range(min = 1))]
    pub count: u32,
}

impl Default for VirtualServerResourceCpu {
    fn default() -> Self {
        Self {
            type_: None,
            count: default_cpu_count(),
        }
    }
}

/// GPU request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerResourceGpu {
    /// GPU type, mutually exclusive with the CPU type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Number of GPUs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub count: Option<u32>,
}

/// VirtualServerStorage describes the storage of the VirtualServer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerStorage {
    /// Root filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<VirtualServerStorageRoot>,

    /// Disk devices attached to the VirtualServer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_disks: Vec<VirtualServerDisk>,

    /// Filesystems mounted into the VirtualServer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystems: Vec<VirtualServerFilesystem>,

    /// Size of an empty disk used as swap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::quantity::optional_quantity_schema")]
    pub swap: Option<Quantity>,
}

/// Root filesystem volume, cloned from a source into a new DataVolume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerStorageRoot {
    /// Volume size
    pub size: Quantity,

    /// Where the root image comes from
    pub source: DataVolumeSource,

    /// Storage class of the root PVC
    pub storage_class_name: String,

    /// Volume mode of the root PVC, defaults to Block
    #[serde(default)]
    pub volume_mode: PersistentVolumeMode,

    /// Access mode of the root PVC, defaults to ReadWriteOnce
    #[serde(default)]
    pub access_mode: PersistentVolumeAccessMode,

    /// Discard writes when the VirtualServer stops. Only valid with a PVC source.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,

    /// Disk serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// Root image source (structural schema compliant)
///
/// Optional fields instead of an enum keep the CRD schema structural.
/// Exactly one field is set by the builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSource {
    /// Clone an existing PVC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<DataVolumeSourcePvc>,

    /// Import an image over HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<DataVolumeSourceHttp>,
}

impl DataVolumeSource {
    /// Number of configured variants
    pub fn variant_count(&self) -> usize {
        usize::from(self.pvc.is_some()) + usize::from(self.http.is_some())
    }
}

/// PVC clone source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSourcePvc {
    /// Source PVC name
    pub name: String,
    /// Source PVC namespace
    pub namespace: String,
}

/// HTTP import source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSourceHttp {
    /// Image URL
    pub url: String,
}

/// PVC volume mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PersistentVolumeMode {
    /// Raw block device
    #[default]
    Block,
    /// Formatted filesystem
    Filesystem,
}

/// PVC access mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PersistentVolumeAccessMode {
    /// Read-write by a single node
    #[default]
    ReadWriteOnce,
    /// Read-only by many nodes
    ReadOnlyMany,
    /// Read-write by many nodes
    ReadWriteMany,
    /// Read-write by a single pod
    ReadWriteOncePod,
}

/// Volume source for additional disks and filesystems
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSource {
    /// Existing PVC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,

    /// Ephemeral empty disk of a fixed capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_disk: Option<EmptyDiskSource>,
}

/// PVC reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimVolumeSource {
    /// PVC name in the VirtualServer's namespace
    pub claim_name: String,
    /// Mount read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

/// Empty disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmptyDiskSource {
    /// Disk capacity
    pub capacity: Quantity,
}

/// Additional disk device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerDisk {
    /// Volume name, unique among disks
    pub name: String,

    /// Volume source
    pub spec: VolumeSource,

    /// Attach read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,

    /// Disk serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// Filesystem shared into the guest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerFilesystem {
    /// Volume name, unique among filesystems
    pub name: String,

    /// Volume source
    pub spec: VolumeSource,

    /// Mount point inside the guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
}

/// Login user rendered into cloud-init
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerUser {
    /// Login name, unique per VirtualServer
    pub username: String,

    /// Password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Authorized SSH public key
    #[serde(default, rename = "sshpublickey", skip_serializing_if = "String::is_empty")]
    pub ssh_public_key: String,
}

impl VirtualServerUser {
    /// Create a user with a password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ssh_public_key: String::new(),
        }
    }

    /// Bytes this user contributes to the cloud-init secret
    pub fn size(&self) -> usize {
        self.username.len() + self.password.len()
    }
}

/// VirtualServerNetwork defines the network configuration of the VirtualServer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerNetwork {
    /// Attach a dynamically created load balancer IP directly to the VirtualServer.
    /// May not be set while TCP or UDP ports are exposed.
    #[serde(
        default,
        rename = "directAttachLoadBalancerIP",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub direct_attach_load_balancer_ip: bool,

    /// Existing LoadBalancer services whose IPs float to this VirtualServer
    #[serde(default, rename = "floatingIPs", skip_serializing_if = "Vec::is_empty")]
    pub floating_ips: Vec<VirtualServerFloatingIp>,

    /// Exposed TCP ports
    #[serde(default, skip_serializing_if = "ServiceTemplate::is_empty")]
    pub tcp: ServiceTemplate,

    /// Exposed UDP ports
    #[serde(default, skip_serializing_if = "ServiceTemplate::is_empty")]
    pub udp: ServiceTemplate,

    /// Assign public IPs to created services, defaults to true
    #[serde(default = "default_public")]
    pub public: bool,

    /// DNS parameters in addition to those generated from the DNS policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<DnsConfig>,

    /// DNS policy, defaults to ClusterFirst on the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_dns_policy_schema")]
    pub dns_policy: Option<DnsPolicy>,

    /// Locally administered unicast MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// Create a headless service when no ports are exposed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub headless: bool,

    /// VPC networks to join
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vpcs: Vec<VirtualServerVpc>,

    /// Disable the pod network inside the VirtualServer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_k8s_networking: bool,
}

impl Default for VirtualServerNetwork {
    fn default() -> Self {
        Self {
            direct_attach_load_balancer_ip: false,
            floating_ips: Vec::new(),
            tcp: ServiceTemplate::default(),
            udp: ServiceTemplate::default(),
            public: default_public(),
            dns_config: None,
            dns_policy: None,
            mac_address: None,
            headless: false,
            vpcs: Vec::new(),
            disable_k8s_networking: false,
        }
    }
}

impl VirtualServerNetwork {
    /// Whether any TCP or UDP port is exposed
    pub fn has_exposed_ports(&self) -> bool {
        !self.tcp.ports.is_empty() || !self.udp.ports.is_empty()
    }

    /// Ports for a protocol
    pub fn ports(&self, protocol: PortProtocol) -> &[u16] {
        match protocol {
            PortProtocol::Tcp => &self.tcp.ports,
            PortProtocol::Udp => &self.udp.ports,
        }
    }

    pub(crate) fn ports_mut(&mut self, protocol: PortProtocol) -> &mut Vec<u16> {
        match protocol {
            PortProtocol::Tcp => &mut self.tcp.ports,
            PortProtocol::Udp => &mut self.udp.ports,
        }
    }
}

/// Ports backing a dynamically created service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Port numbers, at most 10
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(length(max = 10))]
    pub ports: Vec<u16>,
}

impl ServiceTemplate {
    /// Whether no port is exposed
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// Transport protocol of an exposed port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortProtocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// Existing LoadBalancer service used as a floating IP source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerFloatingIp {
    /// Service name
    pub service_name: String,
}

/// VPC network membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerVpc {
    /// VPC name
    pub name: String,
}

/// DNS configuration of the guest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    /// Nameserver IP addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    /// DNS search domains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub searches: Vec<String>,

    /// Resolver options
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<DnsConfigOption>,
}

/// Resolver option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfigOption {
    /// Option name
    pub name: String,
    /// Option value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// DNS policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DnsPolicy {
    /// Cluster DNS first, with host networking
    ClusterFirstWithHostNet,
    /// Cluster DNS first
    ClusterFirst,
    /// Inherit from the node
    Default,
    /// Only use `dnsConfig`
    None,
}

impl DnsPolicy {
    /// Every policy, in declaration order
    pub const ALL: [Self; 4] = [
        Self::ClusterFirstWithHostNet,
        Self::ClusterFirst,
        Self::Default,
        Self::None,
    ];
}

/// Run strategy of the underlying virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RunStrategy {
    /// Always running
    Always,
    /// Restarted only after a failure
    RerunOnFailure,
    /// Started and stopped by the user
    Manual,
    /// Never running
    Halted,
}

impl RunStrategy {
    /// Every strategy, in declaration order
    pub const ALL: [Self; 4] = [Self::Always, Self::RerunOnFailure, Self::Manual, Self::Halted];
}

// Optional enums and opaque objects need hand-written schemas: the derived
// `Option` wrapping puts `type` and `nullable` under `anyOf`, which the API
// server rejects as non-structural.

fn nullable_string_enum<T: Serialize>(variants: &[T]) -> Schema {
    let values: Vec<serde_json::Value> = variants
        .iter()
        .filter_map(|variant| serde_json::to_value(variant).ok())
        .collect();
    schemars::json_schema!({
        "type": "string",
        "enum": values,
        "nullable": true
    })
}

fn optional_dns_policy_schema(_generator: &mut SchemaGenerator) -> Schema {
    nullable_string_enum(&DnsPolicy::ALL)
}

fn optional_run_strategy_schema(_generator: &mut SchemaGenerator) -> Schema {
    nullable_string_enum(&RunStrategy::ALL)
}

fn preserved_object_schema(_generator: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
        "nullable": true
    })
}

/// SMBIOS firmware identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    /// UUID reported by the BIOS, random when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<uuid::Uuid>,

    /// System serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl Firmware {
    /// Whether neither field is set
    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.serial.is_none()
    }
}

/// VirtualServerStatus defines the observed state of a VirtualServer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerStatus {
    /// Named readiness conditions, in insertion order
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// Addresses reported by the reconciler
    #[serde(default)]
    pub network: VirtualServerNetworkStatus,
}

/// Network addresses of a running VirtualServer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualServerNetworkStatus {
    /// Pod network IP
    #[serde(default, rename = "internalIP", skip_serializing_if = "Option::is_none")]
    pub internal_ip: Option<String>,

    /// Public or load balancer IP
    #[serde(default, rename = "externalIP", skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,

    /// Cluster IP of the created service
    #[serde(default, rename = "serviceIP", skip_serializing_if = "Option::is_none")]
    pub service_ip: Option<String>,

    /// Floating IPs keyed by service name
    #[serde(default, rename = "floatingIPs", skip_serializing_if = "BTreeMap::is_empty")]
    pub floating_ips: BTreeMap<String, String>,
}

impl VirtualServerStatus {
    /// Internal IP, or "" when not yet assigned
    pub fn internal_ip(&self) -> &str {
        self.network.internal_ip.as_deref().unwrap_or_default()
    }

    /// External IP, or "" when not yet assigned
    pub fn external_ip(&self) -> &str {
        self.network.external_ip.as_deref().unwrap_or_default()
    }

    /// Floating IPs keyed by service name
    pub fn floating_ips(&self) -> &BTreeMap<String, String> {
        &self.network.floating_ips
    }
}

impl VirtualServer {
    /// Empty VirtualServer with the given name and namespace
    pub fn namespaced(name: &str, namespace: &str) -> Self {
        let mut vs = Self::new(name, VirtualServerSpec::default());
        vs.metadata.namespace = Some(namespace.to_string());
        vs
    }

    /// Whether the VirtualServer requests a GPU
    pub fn is_gpu_server(&self) -> bool {
        self.spec.is_gpu_server()
    }

    /// Resource class derived from the requested type
    pub fn system_class(&self) -> SystemPresetClass {
        self.spec.system_class()
    }

    /// The requested GPU type for GPU servers, otherwise the CPU type
    pub fn system_type(&self) -> Option<&str> {
        self.spec.system_type()
    }
}

fn default_definition() -> String {
    "a".to_string()
}

fn default_cpu_count() -> u32 {
    2
}

fn default_public() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_sets_identity() {
        let vs = VirtualServer::namespaced("my-virtual-server", "default");
        assert_eq!(vs.metadata.name.as_deref(), Some("my-virtual-server"));
        assert_eq!(vs.metadata.namespace.as_deref(), Some("default"));
        assert!(vs.status.is_none());
    }

    #[test]
    fn test_crd_names() {
        use kube::CustomResourceExt;

        let crd = VirtualServer::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("virtualservers.virtualservers.coreweave.com")
        );
        assert_eq!(crd.spec.names.kind, "VirtualServer");
        assert_eq!(
            crd.spec.names.short_names,
            Some(vec!["vs".to_string(), "vserver".to_string()])
        );
        assert_eq!(VirtualServer::api_resource().version, "v1alpha1");
    }

    /// Walk an OpenAPI v3 schema and record every node that breaks the
    /// structural schema rules enforced by the API server
    fn structural_violations(node: &serde_json::Value, path: &str, found: &mut Vec<String>) {
        let Some(map) = node.as_object() else {
            return;
        };
        let int_or_string =
            map.get("x-kubernetes-int-or-string") == Some(&serde_json::Value::Bool(true));
        if !int_or_string && !map.contains_key("type") {
            found.push(format!("{path}: no type"));
        }

        for combinator in ["anyOf", "oneOf", "allOf"] {
            let Some(branches) = map.get(combinator).and_then(serde_json::Value::as_array) else {
                continue;
            };
            for (i, branch) in branches.iter().enumerate() {
                for key in ["type", "nullable", "description", "default", "additionalProperties"] {
                    let int_or_string_pair =
                        int_or_string && combinator == "anyOf" && key == "type";
                    if branch.get(key).is_some() && !int_or_string_pair {
                        found.push(format!("{path}.{combinator}[{i}].{key}"));
                    }
                }
            }
        }

        if let Some(properties) = map.get("properties").and_then(serde_json::Value::as_object) {
            for (name, child) in properties {
                structural_violations(child, &format!("{path}.{name}"), found);
            }
        }
        if let Some(items) = map.get("items") {
            structural_violations(items, &format!("{path}[]"), found);
        }
        if let Some(additional) = map.get("additionalProperties").filter(|a| a.is_object()) {
            structural_violations(additional, &format!("{path}{{}}"), found);
        }
    }

    fn crd_schema() -> serde_json::Value {
        use kube::CustomResourceExt;

        let crd = VirtualServer::crd();
        let schema = crd.spec.versions[0]
            .schema
            .as_ref()
            .and_then(|validation| validation.open_api_v3_schema.as_ref())
            .unwrap();
        serde_json::to_value(schema).unwrap()
    }

    #[test]
    fn test_crd_schema_is_structural() {
        let mut found = Vec::new();
        structural_violations(&crd_schema(), "", &mut found);
        assert!(found.is_empty(), "non-structural schema nodes: {found:#?}");
    }

    #[test]
    fn test_crd_schema_optional_fields() {
        let schema = crd_schema();
        let spec = &schema["properties"]["spec"]["properties"];

        let memory = &spec["resources"]["properties"]["memory"];
        assert_eq!(memory["x-kubernetes-int-or-string"], true);
        assert_eq!(memory["nullable"], true);
        assert_eq!(spec["storage"]["properties"]["swap"]["x-kubernetes-int-or-string"], true);

        let dns_policy = &spec["network"]["properties"]["dnsPolicy"];
        assert_eq!(dns_policy["type"], "string");
        assert_eq!(dns_policy["nullable"], true);
        assert_eq!(
            dns_policy["enum"],
            serde_json::json!(["ClusterFirstWithHostNet", "ClusterFirst", "Default", "None"])
        );
        assert_eq!(
            spec["runStrategy"]["enum"],
            serde_json::json!(["Always", "RerunOnFailure", "Manual", "Halted"])
        );

        assert_eq!(spec["readinessProbe"]["x-kubernetes-preserve-unknown-fields"], true);
        assert_eq!(spec["affinity"]["type"], "object");
    }

    #[test]
    fn test_passthrough_fields_survive_rewrite() {
        let record = serde_json::json!({
            "apiVersion": "virtualservers.coreweave.com/v1alpha1",
            "kind": "VirtualServer",
            "metadata": { "name": "vs-a", "namespace": "default" },
            "spec": {
                "affinity": {
                    "nodeAffinity": {
                        "requiredDuringSchedulingIgnoredDuringExecution": {
                            "nodeSelectorTerms": [{
                                "matchExpressions": [{
                                    "key": "topology.kubernetes.io/region",
                                    "operator": "In",
                                    "values": ["ORD1"]
                                }]
                            }]
                        }
                    }
                },
                "livenessProbe": { "httpGet": { "path": "/healthz", "port": 8080 } },
                "readinessProbe": { "tcpSocket": { "port": 22 }, "initialDelaySeconds": 30 }
            }
        });

        let mut vs: VirtualServer = serde_json::from_value(record.clone()).unwrap();
        vs.spec.expose_tcp_port(22).unwrap();
        let written = serde_json::to_value(&vs).unwrap();

        assert_eq!(written["spec"]["affinity"], record["spec"]["affinity"]);
        assert_eq!(written["spec"]["livenessProbe"], record["spec"]["livenessProbe"]);
        assert_eq!(written["spec"]["readinessProbe"], record["spec"]["readinessProbe"]);
        assert_eq!(written["spec"]["network"]["tcp"]["ports"], serde_json::json!([22]));
    }

    #[test]
    fn test_defaults_follow_platform_defaults() {
        let spec = VirtualServerSpec::default();
        assert_eq!(spec.resources.cpu.count, 2);
        assert_eq!(spec.resources.definition, "a");
        assert_eq!(spec.os.definition, "a");
        assert!(spec.network.public);
        assert_eq!(spec.system_class(), SystemPresetClass::Cpu);
    }

    #[test]
    fn test_minimal_document_deserializes_with_defaults() {
        let spec: VirtualServerSpec = serde_json::from_str(r#"{"os":{"type":"windows"}}"#).unwrap();
        assert_eq!(spec.os.type_, OsType::Windows);
        assert_eq!(spec.os.definition, "a");
        assert_eq!(spec.resources.cpu.count, 2);
        assert!(spec.network.public);
    }

    #[test]
    fn test_wire_field_names() {
        let mut spec = VirtualServerSpec::default();
        spec.network.direct_attach_load_balancer_ip = true;
        spec.network.disable_k8s_networking = true;
        spec.network.floating_ips.push(VirtualServerFloatingIp {
            service_name: "lb".to_string(),
        });
        spec.users.push(VirtualServerUser {
            username: "u".to_string(),
            password: String::new(),
            ssh_public_key: "ssh-ed25519 AAAA".to_string(),
        });
        spec.os.enable_uefi_boot = true;

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["network"]["directAttachLoadBalancerIP"], true);
        assert_eq!(json["network"]["disableK8sNetworking"], true);
        assert_eq!(json["network"]["floatingIPs"][0]["serviceName"], "lb");
        assert_eq!(json["users"][0]["sshpublickey"], "ssh-ed25519 AAAA");
        assert_eq!(json["os"]["enableUEFIBoot"], true);
        assert!(json["users"][0].get("password").is_none());
    }

    #[test]
    fn test_status_ip_accessors() {
        let mut status = VirtualServerStatus::default();
        assert_eq!(status.internal_ip(), "");
        assert_eq!(status.external_ip(), "");

        status.network.internal_ip = Some("10.0.0.4".to_string());
        status.network.external_ip = Some("203.0.113.7".to_string());
        status
            .network
            .floating_ips
            .insert("lb".to_string(), "203.0.113.8".to_string());

        assert_eq!(status.internal_ip(), "10.0.0.4");
        assert_eq!(status.external_ip(), "203.0.113.7");
        assert_eq!(status.floating_ips().get("lb").map(String::as_str), Some("203.0.113.8"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["network"]["internalIP"], "10.0.0.4");
        assert_eq!(json["network"]["floatingIPs"]["lb"], "203.0.113.8");
    }
}

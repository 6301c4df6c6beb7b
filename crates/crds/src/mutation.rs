//! Spec mutations as values
//!
//! [`SpecMutation`] names one builder operation together with its
//! arguments. `apply` is pure: it returns a new spec and never touches the
//! input, which is what the client retry loop needs to replay a change on
//! a freshly fetched copy.

use crate::error::SpecError;
use crate::spec_builder::{StorageRootHttpSource, StorageRootPvcSource};
use crate::virtual_server::{
    DnsConfig, DnsPolicy, OsType, PortProtocol, RunStrategy, VirtualServerSpec, VirtualServerUser,
};
use tracing::debug;

/// One builder operation with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum SpecMutation {
    /// `set_region`
    SetRegion(String),
    /// `set_os`
    SetOs(OsType),
    /// `enable_uefi_boot`
    EnableUefiBoot(bool),
    /// `set_resource_definition`
    SetResourceDefinition(String),
    /// `set_cpu_type`, rejected on a GPU server
    SetCpuType(String),
    /// `set_cpu_count`
    SetCpuCount(u32),
    /// `set_gpu_type`, rejected on a CPU server
    SetGpuType(String),
    /// `set_gpu_count`
    SetGpuCount(u32),
    /// `set_memory`, the argument is a quantity string
    SetMemory(String),
    /// `add_user`, upserted by username
    AddUser(VirtualServerUser),
    /// `add_cloud_init`
    AddCloudInit(String),
    /// `set_dns_config`, `None` clears it
    SetDnsConfig(Option<DnsConfig>),
    /// `set_dns_policy`, `None` clears it
    SetDnsPolicy(Option<DnsPolicy>),
    /// `set_mac_address`
    SetMacAddress(String),
    /// `set_firmware_serial`
    SetFirmwareSerial(String),
    /// `set_firmware_uuid`
    SetFirmwareUuid(uuid::Uuid),
    /// `initialize_running`
    InitializeRunning(bool),
    /// `set_headless`
    SetHeadless(bool),
    /// `set_run_strategy`
    SetRunStrategy(RunStrategy),
    /// `use_virtio_transitional`
    UseVirtioTransitional(bool),
    /// `set_termination_grace_period_seconds`
    SetTerminationGracePeriodSeconds(i64),
    /// Expose ports of one protocol, all or none
    ExposePorts {
        /// TCP or UDP
        protocol: PortProtocol,
        /// Ports to expose
        ports: Vec<u16>,
    },
    /// `enable_public_ip`
    EnablePublicIp(bool),
    /// `set_direct_attach_load_balancer_ip`
    SetDirectAttachLoadBalancerIp(bool),
    /// `add_floating_ip`
    AddFloatingIp(String),
    /// `add_vpc`
    AddVpc(String),
    /// `disable_k8s_networking`
    DisableK8sNetworking(bool),
    /// `configure_storage_root_with_pvc_source`
    StorageRootFromPvc(StorageRootPvcSource),
    /// `configure_storage_root_with_http_source`
    StorageRootFromHttp(StorageRootHttpSource),
    /// `set_root_ephemeral`
    SetRootEphemeral(bool),
    /// `add_pvc_disk`
    AddPvcDisk {
        /// Disk name
        name: String,
        /// Claim backing the disk
        pvc_name: String,
        /// Attach read-only
        read_only: bool,
    },
    /// `add_empty_disk`
    AddEmptyDisk {
        /// Disk name
        name: String,
        /// Quantity string
        size: String,
    },
    /// `add_pvc_filesystem`
    AddPvcFilesystem {
        /// Filesystem name
        name: String,
        /// Claim backing the filesystem
        pvc_name: String,
        /// Mount read-only
        read_only: bool,
    },
    /// `add_swap`, the argument is a quantity string
    AddSwap(String),
}


impl SpecMutation {
    /// Apply to a copy of `spec`
    pub fn apply(&self, spec: &VirtualServerSpec) -> Result<VirtualServerSpec, SpecError> {
        let mut next = spec.clone();
        self.apply_in_place(&mut next).inspect_err(|e| {
            debug!(mutation = ?self, error = %e, "Rejected spec mutation");
        })?;
        Ok(next)
    }

    fn apply_in_place(&self, spec: &mut VirtualServerSpec) -> Result<(), SpecError> {
        match self {
            Self::SetRegion(region) => spec.set_region(region.as_str()),
            Self::SetOs(os) => spec.set_os(*os),
            Self::EnableUefiBoot(enable) => spec.enable_uefi_boot(*enable),
            Self::SetResourceDefinition(definition) => {
                spec.set_resource_definition(definition.as_str())
            }
            Self::SetCpuType(cpu_type) => spec.set_cpu_type(cpu_type.as_str())?,
            Self::SetCpuCount(count) => spec.set_cpu_count(*count)?,
            Self::SetGpuType(gpu_type) => spec.set_gpu_type(gpu_type.as_str())?,
            Self::SetGpuCount(count) => spec.set_gpu_count(*count)?,
            Self::SetMemory(memory) => spec.set_memory(memory)?,
            Self::AddUser(user) => spec.add_user(user.clone())?,
            Self::AddCloudInit(cloud_init) => spec.add_cloud_init(cloud_init.as_str())?,
            Self::SetDnsConfig(config) => spec.set_dns_config(config.clone()),
            Self::SetDnsPolicy(policy) => spec.set_dns_policy(*policy),
            Self::SetMacAddress(mac) => spec.set_mac_address(mac)?,
            Self::SetFirmwareSerial(serial) => spec.set_firmware_serial(serial)?,
            Self::SetFirmwareUuid(uuid) => spec.set_firmware_uuid(*uuid),
            Self::InitializeRunning(running) => spec.initialize_running(*running),
            Self::SetHeadless(headless) => spec.set_headless(*headless),
            Self::SetRunStrategy(strategy) => spec.set_run_strategy(*strategy),
            Self::UseVirtioTransitional(enable) => spec.use_virtio_transitional(*enable),
            Self::SetTerminationGracePeriodSeconds(seconds) => {
                spec.set_termination_grace_period_seconds(*seconds)
            }
            Self::ExposePorts { protocol, ports } => match protocol {
                PortProtocol::Tcp => spec.expose_tcp_ports(ports)?,
                PortProtocol::Udp => spec.expose_udp_ports(ports)?,
            },
            Self::EnablePublicIp(enable) => spec.enable_public_ip(*enable),
            Self::SetDirectAttachLoadBalancerIp(attach) => {
                spec.set_direct_attach_load_balancer_ip(*attach)?
            }
            Self::AddFloatingIp(service_name) => spec.add_floating_ip(service_name.as_str()),
            Self::AddVpc(name) => spec.add_vpc(name.as_str()),
            Self::DisableK8sNetworking(disable) => spec.disable_k8s_networking(*disable),
            Self::StorageRootFromPvc(source) => {
                spec.configure_storage_root_with_pvc_source(source.clone())?
            }
            Self::StorageRootFromHttp(source) => {
                spec.configure_storage_root_with_http_source(source.clone())?
            }
            Self::SetRootEphemeral(ephemeral) => spec.set_root_ephemeral(*ephemeral)?,
            Self::AddPvcDisk {
                name,
                pvc_name,
                read_only,
            } => spec.add_pvc_disk(name, pvc_name, *read_only),
            Self::AddEmptyDisk { name, size } => spec.add_empty_disk(name, size)?,
            Self::AddPvcFilesystem {
                name,
                pvc_name,
                read_only,
            } => spec.add_pvc_filesystem(name, pvc_name, *read_only),
            Self::AddSwap(size) => spec.add_swap(size)?,
        }
        Ok(())
    }
}

/// Apply mutations in order, stopping at the first failure
pub fn apply_all<'a>(
    spec: &VirtualServerSpec,
    mutations: impl IntoIterator<Item = &'a SpecMutation>,
) -> Result<VirtualServerSpec, SpecError> {
    let mut next = spec.clone();
    for mutation in mutations {
        next = mutation.apply(&next)?;
    }
    Ok(next)
}

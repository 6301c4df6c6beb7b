//! Validated construction of a `VirtualServerSpec`
//!
//! Every fallible mutator checks its input and the cross-field invariants
//! before touching the spec, so a rejected call leaves the spec exactly as
//! it was. Upserts (users, disks, filesystems) are keyed by name and are
//! last-write-wins; everything else is independent of call order.

use crate::error::SpecError;
use crate::validation::{
    MAX_EXPOSED_PORTS, check_cloud_init_size, parse_quantity, validate_cloud_init,
    validate_firmware_serial, validate_mac_address,
};
use crate::virtual_server::{
    DataVolumeSource, DataVolumeSourceHttp, DataVolumeSourcePvc, DnsConfig, DnsPolicy,
    EmptyDiskSource, OsType, PersistentVolumeAccessMode, PersistentVolumeClaimVolumeSource,
    PersistentVolumeMode, PortProtocol, RunStrategy, SystemPresetClass, VirtualServerDisk,
    VirtualServerFilesystem, VirtualServerFloatingIp, VirtualServerNetwork, VirtualServerSpec,
    VirtualServerStorageRoot, VirtualServerUser, VirtualServerVpc, VolumeSource,
};
use std::collections::HashSet;

/// Root filesystem cloned from an existing PVC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageRootPvcSource {
    /// Root volume size (e.g. "40Gi")
    pub size: String,
    /// Source PVC name
    pub pvc_name: String,
    /// Source PVC namespace
    pub pvc_namespace: String,
    /// Storage class of the new root PVC
    pub storage_class_name: String,
    /// Volume mode of the new root PVC
    pub volume_mode: PersistentVolumeMode,
    /// Access mode of the new root PVC
    pub access_mode: PersistentVolumeAccessMode,
}

/// Root filesystem imported from an image URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageRootHttpSource {
    /// Root volume size (e.g. "40Gi")
    pub size: String,
    /// Image URL
    pub image_url: String,
    /// Storage class of the new root PVC
    pub storage_class_name: String,
    /// Volume mode of the new root PVC
    pub volume_mode: PersistentVolumeMode,
    /// Access mode of the new root PVC
    pub access_mode: PersistentVolumeAccessMode,
}

/// Named volume stored in an upsert-by-name list
trait NamedVolume {
    fn name(&self) -> &str;
    fn set_source(&mut self, source: VolumeSource);
}

impl NamedVolume for VirtualServerDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_source(&mut self, source: VolumeSource) {
        self.spec = source;
    }
}

impl NamedVolume for VirtualServerFilesystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_source(&mut self, source: VolumeSource) {
        self.spec = source;
    }
}

/// Replace the source of the volume with the same name, or append
fn upsert_volume<V: NamedVolume>(volumes: &mut Vec<V>, volume: V, source: VolumeSource) {
    match volumes.iter_mut().find(|v| v.name() == volume.name()) {
        Some(existing) => existing.set_source(source),
        None => {
            let mut volume = volume;
            volume.set_source(source);
            volumes.push(volume);
        }
    }
}

fn pvc_volume_source(pvc_name: &str, read_only: bool) -> VolumeSource {
    VolumeSource {
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: pvc_name.to_string(),
            read_only,
        }),
        empty_disk: None,
    }
}

impl VirtualServerNetwork {
    fn expose_port(&mut self, protocol: PortProtocol, port: u16) -> Result<(), SpecError> {
        if self.direct_attach_load_balancer_ip {
            return Err(SpecError::DirectAttachConflict);
        }
        if port == 0 {
            return Err(SpecError::InvalidPort(port));
        }

        let ports = self.ports_mut(protocol);
        if ports.contains(&port) {
            return Ok(());
        }
        if ports.len() >= MAX_EXPOSED_PORTS {
            return Err(SpecError::PortLimitExceeded {
                protocol,
                max: MAX_EXPOSED_PORTS,
            });
        }
        ports.push(port);
        Ok(())
    }
}

impl VirtualServerSpec {
    /// Whether a GPU type is requested
    pub fn is_gpu_server(&self) -> bool {
        self.resources.gpu.type_.is_some()
    }

    /// `gpu` when a GPU type is requested, otherwise `cpu`
    pub fn system_class(&self) -> SystemPresetClass {
        if self.is_gpu_server() {
            SystemPresetClass::Gpu
        } else {
            SystemPresetClass::Cpu
        }
    }

    /// The GPU type for GPU servers, otherwise the CPU type
    pub fn system_type(&self) -> Option<&str> {
        match self.system_class() {
            SystemPresetClass::Gpu => self.resources.gpu.type_.as_deref(),
            SystemPresetClass::Cpu => self.resources.cpu.type_.as_deref(),
        }
    }

    /// Set the region
    pub fn set_region(&mut self, region: impl Into<String>) {
        self.region = Some(region.into());
    }

    /// Set the operating system family
    pub fn set_os(&mut self, os: OsType) {
        self.os.type_ = os;
    }

    /// Boot with a UEFI bootloader
    pub fn enable_uefi_boot(&mut self, enable: bool) {
        self.os.enable_uefi_boot = enable;
    }

    /// Set the resource configuration definition
    pub fn set_resource_definition(&mut self, definition: impl Into<String>) {
        self.resources.definition = definition.into();
    }

    /// Request a CPU type. Fails if a GPU type is already set.
    pub fn set_cpu_type(&mut self, cpu_type: impl Into<String>) -> Result<(), SpecError> {
        if self.resources.gpu.type_.is_some() {
            return Err(SpecError::ResourceClassConflict {
                requested: SystemPresetClass::Cpu,
                existing: SystemPresetClass::Gpu,
            });
        }
        self.resources.cpu.type_ = Some(cpu_type.into());
        Ok(())
    }

    /// Set the number of CPU cores
    pub fn set_cpu_count(&mut self, count: u32) -> Result<(), SpecError> {
        if count == 0 {
            return Err(SpecError::InvalidCount("CPU count"));
        }
        self.resources.cpu.count = count;
        Ok(())
    }

    /// Request a GPU type. Fails if a CPU type is already set.
    pub fn set_gpu_type(&mut self, gpu_type: impl Into<String>) -> Result<(), SpecError> {
        self.ensure_no_cpu_type()?;
        self.resources.gpu.type_ = Some(gpu_type.into());
        Ok(())
    }

    /// Set the number of GPUs. Fails if a CPU type is already set.
    pub fn set_gpu_count(&mut self, count: u32) -> Result<(), SpecError> {
        self.ensure_no_cpu_type()?;
        if count == 0 {
            return Err(SpecError::InvalidCount("GPU count"));
        }
        self.resources.gpu.count = Some(count);
        Ok(())
    }

    fn ensure_no_cpu_type(&self) -> Result<(), SpecError> {
        if self.resources.cpu.type_.is_some() {
            return Err(SpecError::ResourceClassConflict {
                requested: SystemPresetClass::Gpu,
                existing: SystemPresetClass::Cpu,
            });
        }
        Ok(())
    }

    /// Set the memory request from a size string (e.g. "16Gi")
    pub fn set_memory(&mut self, memory: &str) -> Result<(), SpecError> {
        self.resources.memory = Some(parse_quantity("memory", memory)?);
        Ok(())
    }

    /// Add a user, or update the password and key of an existing username.
    /// Fails if the credentials would no longer fit beside the cloud-init script.
    pub fn add_user(&mut self, user: VirtualServerUser) -> Result<(), SpecError> {
        let replaced = self
            .users
            .iter()
            .find(|u| u.username == user.username)
            .map_or(0, VirtualServerUser::size);
        let users_size = self.users_size() - replaced + user.size();
        check_cloud_init_size(&self.cloud_init, users_size)?;

        match self.users.iter_mut().find(|u| u.username == user.username) {
            Some(existing) => {
                existing.password = user.password;
                existing.ssh_public_key = user.ssh_public_key;
            }
            None => self.users.push(user),
        }
        Ok(())
    }

    /// Bytes of user credentials rendered into the cloud-init secret
    pub fn users_size(&self) -> usize {
        self.users.iter().map(VirtualServerUser::size).sum()
    }

    /// Set the custom cloud-init script. Fails if it does not fit in the
    /// secret next to the configured users.
    pub fn add_cloud_init(&mut self, cloud_init: impl Into<String>) -> Result<(), SpecError> {
        let cloud_init = cloud_init.into();
        check_cloud_init_size(&cloud_init, self.users_size())?;
        self.cloud_init = cloud_init;
        Ok(())
    }

    /// Check that the stored cloud-init script is a YAML mapping
    pub fn is_valid_cloud_init(&self) -> Result<(), SpecError> {
        validate_cloud_init(&self.cloud_init)
    }

    /// Set the DNS configuration
    pub fn set_dns_config(&mut self, dns_config: Option<DnsConfig>) {
        self.network.dns_config = dns_config;
    }

    /// Set the DNS policy
    pub fn set_dns_policy(&mut self, dns_policy: Option<DnsPolicy>) {
        self.network.dns_policy = dns_policy;
    }

    /// Set a locally administered MAC address
    pub fn set_mac_address(&mut self, mac: &str) -> Result<(), SpecError> {
        validate_mac_address(mac)?;
        self.network.mac_address = Some(mac.to_string());
        Ok(())
    }

    /// Set the SMBIOS serial number
    pub fn set_firmware_serial(&mut self, serial: &str) -> Result<(), SpecError> {
        validate_firmware_serial(serial)?;
        self.firmware.serial = Some(serial.to_string());
        Ok(())
    }

    /// Set the UUID reported by the BIOS
    pub fn set_firmware_uuid(&mut self, uuid: uuid::Uuid) {
        self.firmware.uuid = Some(uuid);
    }

    /// Start the VirtualServer as soon as it is created
    pub fn initialize_running(&mut self, running: bool) {
        self.initialize_running = running;
    }

    /// Create a headless service when no ports are exposed
    pub fn set_headless(&mut self, headless: bool) {
        self.network.headless = headless;
    }

    /// Set the run strategy
    pub fn set_run_strategy(&mut self, run_strategy: RunStrategy) {
        self.run_strategy = Some(run_strategy);
    }

    /// Use virtio-transitional devices
    pub fn use_virtio_transitional(&mut self, enable: bool) {
        self.use_virtio_transitional = Some(enable);
    }

    /// Set the termination grace period
    pub fn set_termination_grace_period_seconds(&mut self, seconds: i64) {
        self.termination_grace_period_seconds = Some(seconds);
    }

    /// Expose a TCP port
    pub fn expose_tcp_port(&mut self, port: u16) -> Result<(), SpecError> {
        self.network.expose_port(PortProtocol::Tcp, port)
    }

    /// Expose several TCP ports, all or none
    pub fn expose_tcp_ports(&mut self, ports: &[u16]) -> Result<(), SpecError> {
        self.expose_ports(PortProtocol::Tcp, ports)
    }

    /// Expose a UDP port
    pub fn expose_udp_port(&mut self, port: u16) -> Result<(), SpecError> {
        self.network.expose_port(PortProtocol::Udp, port)
    }

    /// Expose several UDP ports, all or none
    pub fn expose_udp_ports(&mut self, ports: &[u16]) -> Result<(), SpecError> {
        self.expose_ports(PortProtocol::Udp, ports)
    }

    /// Expose a port. Exposing an already exposed port is a no-op.
    pub fn expose_port(&mut self, protocol: PortProtocol, port: u16) -> Result<(), SpecError> {
        self.network.expose_port(protocol, port)
    }

    fn expose_ports(&mut self, protocol: PortProtocol, ports: &[u16]) -> Result<(), SpecError> {
        let mut staged = self.network.clone();
        for port in ports {
            staged.expose_port(protocol, *port)?;
        }
        self.network = staged;
        Ok(())
    }

    /// Assign public IPs to created services
    pub fn enable_public_ip(&mut self, enable: bool) {
        self.network.public = enable;
    }

    /// Attach a load balancer IP directly. Enabling fails while ports are exposed.
    pub fn set_direct_attach_load_balancer_ip(&mut self, attach: bool) -> Result<(), SpecError> {
        if attach && self.network.has_exposed_ports() {
            return Err(SpecError::DirectAttachConflict);
        }
        self.network.direct_attach_load_balancer_ip = attach;
        Ok(())
    }

    /// Use the IP of an existing LoadBalancer service as a floating IP
    pub fn add_floating_ip(&mut self, service_name: impl Into<String>) {
        let service_name = service_name.into();
        if self
            .network
            .floating_ips
            .iter()
            .any(|ip| ip.service_name == service_name)
        {
            return;
        }
        self.network
            .floating_ips
            .push(VirtualServerFloatingIp { service_name });
    }

    /// Join a VPC network
    pub fn add_vpc(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.network.vpcs.iter().any(|vpc| vpc.name == name) {
            return;
        }
        self.network.vpcs.push(VirtualServerVpc { name });
    }

    /// Disable the pod network inside the VirtualServer
    pub fn disable_k8s_networking(&mut self, disable: bool) {
        self.network.disable_k8s_networking = disable;
    }

    /// Clone the root filesystem from a PVC, replacing any previous root
    pub fn configure_storage_root_with_pvc_source(
        &mut self,
        source: StorageRootPvcSource,
    ) -> Result<(), SpecError> {
        let size = parse_quantity("root size", &source.size)?;
        self.storage.root = Some(VirtualServerStorageRoot {
            size,
            source: DataVolumeSource {
                pvc: Some(DataVolumeSourcePvc {
                    name: source.pvc_name,
                    namespace: source.pvc_namespace,
                }),
                http: None,
            },
            storage_class_name: source.storage_class_name,
            volume_mode: source.volume_mode,
            access_mode: source.access_mode,
            ephemeral: false,
            serial: None,
        });
        Ok(())
    }

    /// Import the root filesystem from an image URL, replacing any previous root
    pub fn configure_storage_root_with_http_source(
        &mut self,
        source: StorageRootHttpSource,
    ) -> Result<(), SpecError> {
        let size = parse_quantity("root size", &source.size)?;
        self.storage.root = Some(VirtualServerStorageRoot {
            size,
            source: DataVolumeSource {
                pvc: None,
                http: Some(DataVolumeSourceHttp {
                    url: source.image_url,
                }),
            },
            storage_class_name: source.storage_class_name,
            volume_mode: source.volume_mode,
            access_mode: source.access_mode,
            ephemeral: false,
            serial: None,
        });
        Ok(())
    }

    /// Discard root filesystem writes on stop. Requires a PVC root source.
    pub fn set_root_ephemeral(&mut self, ephemeral: bool) -> Result<(), SpecError> {
        let Some(root) = self.storage.root.as_mut() else {
            return Err(SpecError::InvalidRootSource(0));
        };
        if ephemeral && root.source.pvc.is_none() {
            return Err(SpecError::EphemeralRootRequiresPvc);
        }
        root.ephemeral = ephemeral;
        Ok(())
    }

    /// Attach a PVC as a disk, replacing the source of a disk with the same name
    pub fn add_pvc_disk(&mut self, name: &str, pvc_name: &str, read_only: bool) {
        let disk = VirtualServerDisk {
            name: name.to_string(),
            spec: VolumeSource::default(),
            read_only: false,
            serial: None,
        };
        upsert_volume(
            &mut self.storage.additional_disks,
            disk,
            pvc_volume_source(pvc_name, read_only),
        );
    }

    /// Attach an empty disk of the given size
    pub fn add_empty_disk(&mut self, name: &str, size: &str) -> Result<(), SpecError> {
        let capacity = parse_quantity("disk size", size)?;
        let disk = VirtualServerDisk {
            name: name.to_string(),
            spec: VolumeSource::default(),
            read_only: false,
            serial: None,
        };
        let source = VolumeSource {
            persistent_volume_claim: None,
            empty_disk: Some(EmptyDiskSource { capacity }),
        };
        upsert_volume(&mut self.storage.additional_disks, disk, source);
        Ok(())
    }

    /// Mount a PVC as a filesystem, replacing the source of a filesystem with the same name
    pub fn add_pvc_filesystem(&mut self, name: &str, pvc_name: &str, read_only: bool) {
        let filesystem = VirtualServerFilesystem {
            name: name.to_string(),
            spec: VolumeSource::default(),
            mount_point: None,
        };
        upsert_volume(
            &mut self.storage.filesystems,
            filesystem,
            pvc_volume_source(pvc_name, read_only),
        );
    }

    /// Add a swap disk of the given size
    pub fn add_swap(&mut self, size: &str) -> Result<(), SpecError> {
        self.storage.swap = Some(parse_quantity("swap size", size)?);
        Ok(())
    }

    /// Check every invariant the mutators enforce. Used for specs that were
    /// decoded rather than built.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.resources.cpu.type_.is_some()
            && (self.resources.gpu.type_.is_some() || self.resources.gpu.count.is_some())
        {
            return Err(SpecError::ResourceClassConflict {
                requested: SystemPresetClass::Gpu,
                existing: SystemPresetClass::Cpu,
            });
        }
        if self.resources.cpu.count == 0 {
            return Err(SpecError::InvalidCount("CPU count"));
        }
        if self.resources.gpu.count == Some(0) {
            return Err(SpecError::InvalidCount("GPU count"));
        }

        self.validate_network()?;
        self.validate_storage()?;

        let mut usernames = HashSet::new();
        for user in &self.users {
            if !usernames.insert(user.username.as_str()) {
                return Err(SpecError::DuplicateUser(user.username.clone()));
            }
        }
        check_cloud_init_size(&self.cloud_init, self.users_size())?;
        self.is_valid_cloud_init()?;

        if let Some(serial) = &self.firmware.serial {
            validate_firmware_serial(serial)?;
        }
        Ok(())
    }

    fn validate_network(&self) -> Result<(), SpecError> {
        let network = &self.network;
        if network.direct_attach_load_balancer_ip && network.has_exposed_ports() {
            return Err(SpecError::DirectAttachConflict);
        }
        for protocol in [PortProtocol::Tcp, PortProtocol::Udp] {
            let ports = network.ports(protocol);
            if ports.len() > MAX_EXPOSED_PORTS {
                return Err(SpecError::PortLimitExceeded {
                    protocol,
                    max: MAX_EXPOSED_PORTS,
                });
            }
            let mut seen = HashSet::new();
            for port in ports {
                if *port == 0 {
                    return Err(SpecError::InvalidPort(*port));
                }
                if !seen.insert(*port) {
                    return Err(SpecError::DuplicatePort {
                        protocol,
                        port: *port,
                    });
                }
            }
        }
        if let Some(mac) = &network.mac_address {
            validate_mac_address(mac)?;
        }
        Ok(())
    }

    fn validate_storage(&self) -> Result<(), SpecError> {
        if let Some(root) = &self.storage.root {
            let count = root.source.variant_count();
            if count != 1 {
                return Err(SpecError::InvalidRootSource(count));
            }
            if root.ephemeral && root.source.pvc.is_none() {
                return Err(SpecError::EphemeralRootRequiresPvc);
            }
        }

        let disks = self.storage.additional_disks.iter().map(|d| (&d.name, &d.spec));
        let filesystems = self.storage.filesystems.iter().map(|f| (&f.name, &f.spec));
        validate_volumes(disks)?;
        validate_volumes(filesystems)
    }
}

fn validate_volumes<'a>(
    volumes: impl Iterator<Item = (&'a String, &'a VolumeSource)>,
) -> Result<(), SpecError> {
    let mut names = HashSet::new();
    for (name, source) in volumes {
        if !names.insert(name.as_str()) {
            return Err(SpecError::DuplicateVolume(name.clone()));
        }
        let count = usize::from(source.persistent_volume_claim.is_some())
            + usize::from(source.empty_disk.is_some());
        if count != 1 {
            return Err(SpecError::InvalidVolumeSource {
                name: name.clone(),
                count,
            });
        }
    }
    Ok(())
}

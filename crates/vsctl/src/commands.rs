//! Subcommand handlers
//!
//! Handlers take any [`VirtualServerStore`] and return the text to print.

use crate::config::Config;
use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{info, warn};
use virtual_server_client::{VirtualServerStore, update_status_with_retry, update_with_retry};
use virtual_server_crds::{
    OsType, PortProtocol, SpecMutation, StorageRootHttpSource, StorageRootPvcSource,
    VirtualServer, VirtualServerSpec, VirtualServerUser, apply_all,
};

/// Flags of `vsctl create`
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// VirtualServer name
    pub name: String,
    /// Region (e.g. ORD1)
    #[arg(long)]
    pub region: Option<String>,
    /// Operating system family
    #[arg(long, value_enum, default_value_t = OsArg::Linux)]
    pub os: OsArg,
    /// Boot with UEFI
    #[arg(long)]
    pub uefi: bool,
    /// CPU type, excludes --gpu-type
    #[arg(long, conflicts_with = "gpu_type")]
    pub cpu_type: Option<String>,
    /// Number of CPU cores
    #[arg(long)]
    pub cpu_count: Option<u32>,
    /// GPU type
    #[arg(long)]
    pub gpu_type: Option<String>,
    /// Number of GPUs
    #[arg(long)]
    pub gpu_count: Option<u32>,
    /// Memory (e.g. 16Gi)
    #[arg(long)]
    pub memory: Option<String>,
    /// Clone the root disk from this PVC
    #[arg(long, conflicts_with = "root_image")]
    pub root_pvc: Option<String>,
    /// Namespace of --root-pvc
    #[arg(long, default_value = "vd-images")]
    pub root_pvc_namespace: String,
    /// Import the root disk from this image URL
    #[arg(long)]
    pub root_image: Option<String>,
    /// Root disk size
    #[arg(long, default_value = "40Gi")]
    pub root_size: String,
    /// Storage class of the root disk
    #[arg(long, default_value = "")]
    pub storage_class: String,
    /// Discard root disk writes when stopped
    #[arg(long)]
    pub ephemeral_root: bool,
    /// Login user as NAME:PASSWORD, repeatable
    #[arg(long = "user", value_parser = parse_user)]
    pub users: Vec<VirtualServerUser>,
    /// Cloud-init user data file
    #[arg(long)]
    pub cloud_init: Option<PathBuf>,
    /// TCP port to expose, repeatable
    #[arg(long)]
    pub tcp: Vec<u16>,
    /// UDP port to expose, repeatable
    #[arg(long)]
    pub udp: Vec<u16>,
    /// Attach a load balancer IP directly instead of exposing ports
    #[arg(long)]
    pub direct_attach: bool,
    /// Do not assign public IPs
    #[arg(long)]
    pub private: bool,
    /// Existing LoadBalancer service to use as a floating IP, repeatable
    #[arg(long)]
    pub floating_ip: Vec<String>,
    /// Start as soon as it is created
    #[arg(long)]
    pub start: bool,
}

/// Flags of `vsctl apply`
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Manifest file (YAML or JSON)
    #[arg(short = 'f', long = "filename")]
    pub file: PathBuf,
}

/// Flags of `vsctl get`
#[derive(Args, Debug)]
pub struct GetArgs {
    /// VirtualServer name
    pub name: String,
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

/// A single VirtualServer name
#[derive(Args, Debug)]
pub struct NameArgs {
    /// VirtualServer name
    pub name: String,
}

/// Flags of `vsctl expose`
#[derive(Args, Debug)]
pub struct ExposeArgs {
    /// VirtualServer name
    pub name: String,
    /// TCP port to expose, repeatable
    #[arg(long)]
    pub tcp: Vec<u16>,
    /// UDP port to expose, repeatable
    #[arg(long)]
    pub udp: Vec<u16>,
}

/// Operating system family accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsArg {
    /// Linux guest
    Linux,
    /// Windows guest
    Windows,
}

impl From<OsArg> for OsType {
    fn from(os: OsArg) -> Self {
        match os {
            OsArg::Linux => OsType::Linux,
            OsArg::Windows => OsType::Windows,
        }
    }
}

/// Output format of `vsctl get`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// YAML document
    Yaml,
    /// Pretty-printed JSON
    Json,
}

fn parse_user(value: &str) -> Result<VirtualServerUser, String> {
    match value.split_once(':') {
        Some((username, password)) if !username.is_empty() => {
            Ok(VirtualServerUser::new(username, password))
        }
        _ => Err(format!("expected NAME:PASSWORD, got '{value}'")),
    }
}

/// Translate create flags into builder operations
pub fn create_mutations(
    args: &CreateArgs,
    cloud_init: Option<String>,
) -> anyhow::Result<Vec<SpecMutation>> {
    let mut mutations = vec![SpecMutation::SetOs(args.os.into())];

    if let Some(region) = &args.region {
        mutations.push(SpecMutation::SetRegion(region.clone()));
    }
    if args.uefi {
        mutations.push(SpecMutation::EnableUefiBoot(true));
    }
    if let Some(cpu_type) = &args.cpu_type {
        mutations.push(SpecMutation::SetCpuType(cpu_type.clone()));
    }
    if let Some(count) = args.cpu_count {
        mutations.push(SpecMutation::SetCpuCount(count));
    }
    if let Some(gpu_type) = &args.gpu_type {
        mutations.push(SpecMutation::SetGpuType(gpu_type.clone()));
    }
    if let Some(count) = args.gpu_count {
        mutations.push(SpecMutation::SetGpuCount(count));
    }
    if let Some(memory) = &args.memory {
        mutations.push(SpecMutation::SetMemory(memory.clone()));
    }

    match (&args.root_pvc, &args.root_image) {
        (Some(pvc_name), None) => {
            mutations.push(SpecMutation::StorageRootFromPvc(StorageRootPvcSource {
                size: args.root_size.clone(),
                pvc_name: pvc_name.clone(),
                pvc_namespace: args.root_pvc_namespace.clone(),
                storage_class_name: args.storage_class.clone(),
                ..Default::default()
            }));
        }
        (None, Some(image_url)) => {
            mutations.push(SpecMutation::StorageRootFromHttp(StorageRootHttpSource {
                size: args.root_size.clone(),
                image_url: image_url.clone(),
                storage_class_name: args.storage_class.clone(),
                ..Default::default()
            }));
        }
        (Some(_), Some(_)) => bail!("--root-pvc and --root-image are mutually exclusive"),
        (None, None) if args.ephemeral_root => bail!("--ephemeral-root requires --root-pvc"),
        (None, None) => {}
    }
    if args.ephemeral_root {
        mutations.push(SpecMutation::SetRootEphemeral(true));
    }

    for user in &args.users {
        mutations.push(SpecMutation::AddUser(user.clone()));
    }
    if let Some(cloud_init) = cloud_init {
        mutations.push(SpecMutation::AddCloudInit(cloud_init));
    }

    if !args.tcp.is_empty() {
        mutations.push(SpecMutation::ExposePorts {
            protocol: PortProtocol::Tcp,
            ports: args.tcp.clone(),
        });
    }
    if !args.udp.is_empty() {
        mutations.push(SpecMutation::ExposePorts {
            protocol: PortProtocol::Udp,
            ports: args.udp.clone(),
        });
    }
    if args.direct_attach {
        mutations.push(SpecMutation::SetDirectAttachLoadBalancerIp(true));
    }
    if args.private {
        mutations.push(SpecMutation::EnablePublicIp(false));
    }
    for service_name in &args.floating_ip {
        mutations.push(SpecMutation::AddFloatingIp(service_name.clone()));
    }
    if args.start {
        mutations.push(SpecMutation::InitializeRunning(true));
    }

    Ok(mutations)
}

/// Create a record and seed its conditions
async fn create_record<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    vs: &VirtualServer,
) -> anyhow::Result<VirtualServer> {
    let created = store.create(vs).await?;
    let name = created.metadata.name.clone().unwrap_or_default();
    let with_secret = !created.spec.users.is_empty() || !created.spec.cloud_init.is_empty();

    let initialized = update_status_with_retry(
        store,
        &config.namespace,
        &name,
        &config.retry(),
        |vs| {
            vs.initialize_status(with_secret);
            Ok(())
        },
    )
    .await
    .inspect_err(|e| {
        warn!(
            namespace = %config.namespace,
            name = %name,
            error = %e,
            "VirtualServer created without initial status"
        );
    })
    .with_context(|| {
        format!("virtualserver/{name} was created but its status could not be initialized")
    })?;
    info!(namespace = %config.namespace, name = %name, "VirtualServer created");
    Ok(initialized)
}

/// Build a spec from flags and create the record
pub async fn create<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    args: &CreateArgs,
) -> anyhow::Result<String> {
    let cloud_init = match &args.cloud_init {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        None => None,
    };

    let spec = apply_all(&VirtualServerSpec::default(), &create_mutations(args, cloud_init)?)?;
    spec.is_valid_cloud_init()?;

    let mut vs = VirtualServer::namespaced(&args.name, &config.namespace);
    vs.spec = spec;
    create_record(store, config, &vs).await?;
    Ok(format!("virtualserver/{} created", args.name))
}

/// Apply a manifest file
pub async fn apply<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    args: &ApplyArgs,
) -> anyhow::Result<String> {
    let manifest = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    apply_manifest(store, config, &manifest).await
}

/// Create the record described by `manifest`, or replace the spec of the
/// existing one
pub async fn apply_manifest<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    manifest: &str,
) -> anyhow::Result<String> {
    let mut desired: VirtualServer =
        serde_yaml::from_str(manifest).context("parsing VirtualServer manifest")?;
    desired.spec.validate()?;

    let Some(name) = desired.metadata.name.clone() else {
        bail!("manifest has no metadata.name");
    };
    let namespace = desired
        .metadata
        .namespace
        .get_or_insert_with(|| config.namespace.clone())
        .clone();
    let config = Config {
        namespace,
        ..config.clone()
    };

    if store.get(&config.namespace, &name).await?.is_none() {
        desired.status = None;
        desired.metadata.resource_version = None;
        create_record(store, &config, &desired).await?;
        return Ok(format!("virtualserver/{name} created"));
    }

    let spec = desired.spec;
    update_with_retry(store, &config.namespace, &name, &config.retry(), |vs| {
        vs.spec = spec.clone();
        Ok(())
    })
    .await?;
    Ok(format!("virtualserver/{name} configured"))
}

async fn fetch<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    name: &str,
) -> anyhow::Result<VirtualServer> {
    match store.get(&config.namespace, name).await? {
        Some(vs) => Ok(vs),
        None => bail!("virtualserver {}/{name} not found", config.namespace),
    }
}

/// Print a record as YAML or JSON
pub async fn get<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    args: &GetArgs,
) -> anyhow::Result<String> {
    let vs = fetch(store, config, &args.name).await?;
    Ok(match args.output {
        OutputFormat::Yaml => serde_yaml::to_string(&vs)?,
        OutputFormat::Json => serde_json::to_string_pretty(&vs)?,
    })
}

/// Print the condition table of a record
pub async fn status<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    args: &NameArgs,
) -> anyhow::Result<String> {
    let vs = fetch(store, config, &args.name).await?;
    Ok(render_status(&vs))
}

/// Condition table followed by the readiness verdict and addresses
pub fn render_status(vs: &VirtualServer) -> String {
    let Some(status) = vs.status.as_ref().filter(|s| !s.has_no_conditions()) else {
        return "No conditions reported".to_string();
    };

    let mut out = format!("{:<22} {:<8} {:<28} {}\n", "TYPE", "STATUS", "REASON", "MESSAGE");
    for condition in status.conditions.iter() {
        let _ = writeln!(
            out,
            "{:<22} {:<8} {:<28} {}",
            condition.type_.as_str(),
            condition.status.to_string(),
            condition.reason.as_str(),
            condition.message
        );
    }
    let _ = writeln!(out, "\nAggregate readiness: {}", status.aggregate_ready());
    let _ = writeln!(out, "Internal IP: {}", status.internal_ip());
    let _ = write!(out, "External IP: {}", status.external_ip());
    for (service, ip) in status.floating_ips() {
        let _ = write!(out, "\nFloating IP {service}: {ip}");
    }
    out
}

/// Expose ports on an existing record, retrying on conflicts
pub async fn expose<S: VirtualServerStore + ?Sized>(
    store: &S,
    config: &Config,
    args: &ExposeArgs,
) -> anyhow::Result<String> {
    if args.tcp.is_empty() && args.udp.is_empty() {
        bail!("nothing to expose, pass --tcp or --udp");
    }

    let mutations = [
        SpecMutation::ExposePorts {
            protocol: PortProtocol::Tcp,
            ports: args.tcp.clone(),
        },
        SpecMutation::ExposePorts {
            protocol: PortProtocol::Udp,
            ports: args.udp.clone(),
        },
    ];
    let updated = update_with_retry(store, &config.namespace, &args.name, &config.retry(), |vs| {
        vs.spec = apply_all(&vs.spec, &mutations)?;
        Ok(())
    })
    .await?;

    Ok(format!(
        "virtualserver/{} exposed TCP {:?} UDP {:?}",
        args.name, updated.spec.network.tcp.ports, updated.spec.network.udp.ports
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;
    use virtual_server_client::MockVirtualServerStore;
    use virtual_server_crds::{ConditionStatus, ConditionType, SystemPresetClass};

    fn config() -> Config {
        Config {
            namespace: "default".to_string(),
            max_retries: 3,
        }
    }

    fn create_args(argv: &[&str]) -> CreateArgs {
        let mut full = vec!["vsctl", "create"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            crate::Commands::Create(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    const MANIFEST: &str = r#"
apiVersion: virtualservers.coreweave.com/v1alpha1
kind: VirtualServer
metadata:
  name: vs-manifest
spec:
  region: ORD1
  os:
    type: linux
  resources:
    gpu:
      type: Quadro_RTX_4000
      count: 1
    cpu:
      count: 4
    memory: 16Gi
  storage:
    root:
      size: 40Gi
      storageClassName: block-nvme-ord1
      source:
        pvc:
          namespace: vd-images
          name: ubuntu2204-docker-master-20230221-ord1
  users:
    - username: myuser
      password: zzzzzzzz
  network:
    tcp:
      ports: [22, 443]
"#;

    #[test]
    fn test_parse_user() {
        let user = parse_user("myuser:pa:ss").unwrap();
        assert_eq!(user.username, "myuser");
        assert_eq!(user.password, "pa:ss");
        assert!(parse_user("nopassword").is_err());
        assert!(parse_user(":secret").is_err());
    }

    #[test]
    fn test_cpu_and_gpu_flags_conflict() {
        let result = Cli::try_parse_from([
            "vsctl", "create", "vs", "--cpu-type", "amd-epyc-rome", "--gpu-type", "A40",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ephemeral_root_needs_pvc() {
        let args = create_args(&["vs", "--ephemeral-root"]);
        assert!(create_mutations(&args, None).is_err());
    }

    #[tokio::test]
    async fn test_create_builds_and_initializes() {
        let store = MockVirtualServerStore::new();
        let args = create_args(&[
            "vs-a",
            "--gpu-type",
            "Quadro_RTX_4000",
            "--gpu-count",
            "1",
            "--memory",
            "16Gi",
            "--root-pvc",
            "ubuntu2204",
            "--user",
            "myuser:secret",
            "--tcp",
            "22",
            "--tcp",
            "443",
        ]);

        let out = create(&store, &config(), &args).await.unwrap();
        assert_eq!(out, "virtualserver/vs-a created");

        let vs = store.get("default", "vs-a").await.unwrap().unwrap();
        assert_eq!(vs.system_class(), SystemPresetClass::Gpu);
        assert_eq!(vs.spec.network.tcp.ports, vec![22, 443]);
        let status = vs.status.as_ref().unwrap();
        assert_eq!(status.conditions.len(), 5);
        assert_eq!(
            status.condition(ConditionType::SecretReady).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );
    }

    #[tokio::test]
    async fn test_create_rejects_direct_attach_with_ports() {
        let store = MockVirtualServerStore::new();
        let args = create_args(&["vs-a", "--tcp", "22", "--direct-attach"]);

        assert!(create(&store, &config(), &args).await.is_err());
        assert!(store.get("default", "vs-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_reports_record_left_without_status() {
        let store = MockVirtualServerStore::new();
        store.inject_conflicts(10);
        let args = create_args(&["vs-a"]);

        let err = create(&store, &config(), &args).await.unwrap_err();
        assert!(err.to_string().contains("virtualserver/vs-a was created"));

        let vs = store.get("default", "vs-a").await.unwrap().unwrap();
        assert!(vs.has_no_conditions());
    }

    #[tokio::test]
    async fn test_apply_creates_then_configures() {
        let store = MockVirtualServerStore::new();

        let out = apply_manifest(&store, &config(), MANIFEST).await.unwrap();
        assert_eq!(out, "virtualserver/vs-manifest created");
        let created = store.get("default", "vs-manifest").await.unwrap().unwrap();
        assert_eq!(created.spec.resources.memory.as_ref().map(|m| m.as_str()), Some("16Gi"));
        assert!(!created.has_no_conditions());

        let updated_manifest = MANIFEST.replace("count: 4", "count: 8");
        let out = apply_manifest(&store, &config(), &updated_manifest).await.unwrap();
        assert_eq!(out, "virtualserver/vs-manifest configured");

        let updated = store.get("default", "vs-manifest").await.unwrap().unwrap();
        assert_eq!(updated.spec.resources.cpu.count, 8);
        assert_eq!(updated.status, created.status);
    }

    #[tokio::test]
    async fn test_apply_rejects_invalid_manifest() {
        let store = MockVirtualServerStore::new();
        let manifest = MANIFEST.replace("    cpu:\n", "    cpu:\n      type: amd-epyc-rome\n");

        assert!(apply_manifest(&store, &config(), &manifest).await.is_err());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_expose_is_all_or_nothing() {
        let store = MockVirtualServerStore::new();
        let args = create_args(&["vs-a", "--tcp", "22"]);
        create(&store, &config(), &args).await.unwrap();

        let expose_args = ExposeArgs {
            name: "vs-a".to_string(),
            tcp: vec![443],
            udp: vec![0],
        };
        assert!(expose(&store, &config(), &expose_args).await.is_err());

        let expose_args = ExposeArgs {
            name: "vs-a".to_string(),
            tcp: vec![443],
            udp: vec![4172],
        };
        let out = expose(&store, &config(), &expose_args).await.unwrap();
        assert_eq!(out, "virtualserver/vs-a exposed TCP [22, 443] UDP [4172]");
    }

    #[tokio::test]
    async fn test_get_and_status() {
        let store = MockVirtualServerStore::new();
        apply_manifest(&store, &config(), MANIFEST).await.unwrap();

        let get_args = GetArgs {
            name: "vs-manifest".to_string(),
            output: OutputFormat::Json,
        };
        let json = get(&store, &config(), &get_args).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spec"]["network"]["tcp"]["ports"][1], 443);

        let rendered = status(
            &store,
            &config(),
            &NameArgs {
                name: "vs-manifest".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(rendered.starts_with("TYPE"));
        assert!(rendered.contains("VirtualMachineReady"));
        assert!(rendered.contains("Aggregate readiness: Unknown"));

        let missing = NameArgs {
            name: "nope".to_string(),
        };
        assert!(status(&store, &config(), &missing).await.is_err());
    }

    #[test]
    fn test_render_status_without_conditions() {
        let vs = VirtualServer::namespaced("vs", "default");
        assert_eq!(render_status(&vs), "No conditions reported");
    }
}

//! Print the VirtualServer CRD manifest as YAML
//!
//! `cargo run --bin crdgen > config/crd/virtualservers.yaml`

use kube::CustomResourceExt;
use virtual_server_crds::VirtualServer;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&VirtualServer::crd())?);
    Ok(())
}

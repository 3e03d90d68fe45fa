//! Prints every CRD as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases/ipam.yaml`

use crds::{
    NetBoxIpAddress, NetBoxIpAddressClaim, NetBoxIpRange, NetBoxIpRangeClaim, NetBoxPrefix,
    NetBoxPrefixClaim, NetBoxVlan, NetBoxVlanClaim,
};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        NetBoxPrefixClaim::crd(),
        NetBoxPrefix::crd(),
        NetBoxIpAddressClaim::crd(),
        NetBoxIpAddress::crd(),
        NetBoxIpRangeClaim::crd(),
        NetBoxIpRange::crd(),
        NetBoxVlanClaim::crd(),
        NetBoxVlan::crd(),
    ];

    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}

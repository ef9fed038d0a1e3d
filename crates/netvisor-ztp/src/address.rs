//! Deterministic address planning.
//!
//! Every allocation is a pure function of the configured blocks and a
//! position index, so re-runs against an existing fabric compute exactly the
//! addresses the previous run configured.
//!
//! Link blocks are walked in `/supernet` strides. Each stride gives its first
//! two usable hosts to one spine-leaf link; the rest of the stride is left
//! unused so every link stays aligned on its own subnet.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{ZtpError, ZtpResult};

/// Usable host count of a link subnet, for the supported sizes.
pub const fn usable_hosts(supernet: u8) -> Option<u32> {
    match supernet {
        30 => Some(2),
        29 => Some(6),
        28 => Some(14),
        27 => Some(30),
        _ => None,
    }
}

/// Prefix length of a link subnet. IPv6 blocks use the same host bits as
/// the IPv4 size (`/30` becomes `/126`).
pub const fn link_prefix(supernet: u8, ipv6: bool) -> u8 {
    if ipv6 {
        supernet + 96
    } else {
        supernet
    }
}

/// Addresses for the two ends of one link, both carrying the link prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPair {
    /// Spine end.
    pub first: IpNet,
    /// Leaf end.
    pub second: IpNet,
}

impl LinkPair {
    /// The link subnet.
    pub fn network(&self) -> IpNet {
        self.first.trunc()
    }
}

/// `n`-th address of `net` with its prefix; errors outside the subnet.
pub fn nth_host(net: IpNet, n: u32) -> ZtpResult<IpNet> {
    let result = match net {
        IpNet::V4(v4) => {
            let addr = u32::from(v4.network()).checked_add(n);
            addr.and_then(|a| Ipv4Net::new(Ipv4Addr::from(a), v4.prefix_len()).ok())
                .map(IpNet::V4)
        }
        IpNet::V6(v6) => {
            let addr = u128::from(v6.network()).checked_add(u128::from(n));
            addr.and_then(|a| Ipv6Net::new(Ipv6Addr::from(a), v6.prefix_len()).ok())
                .map(IpNet::V6)
        }
    };
    result
        .filter(|candidate| net.contains(&candidate.addr()))
        .ok_or_else(|| ZtpError::AddressExhausted {
            block: net.to_string(),
            index: n,
        })
}

/// Link address pairs of `base/cidr` in stride order.
///
/// The iterator is lazy; large IPv6 blocks are never materialised.
pub fn plan_link_ips(
    base: IpAddr,
    cidr: u8,
    supernet: u8,
) -> ZtpResult<impl Iterator<Item = LinkPair>> {
    if usable_hosts(supernet).is_none() {
        return Err(ZtpError::invalid_config(
            "supernet",
            format!("{} is not one of 27, 28, 29, 30", supernet),
        ));
    }
    let prefix = link_prefix(supernet, base.is_ipv6());
    let block = IpNet::new(base, cidr)
        .map_err(|e| ZtpError::invalid_config("cidr", e.to_string()))?
        .trunc();
    let strides = block
        .subnets(prefix)
        .map_err(|e| ZtpError::invalid_config("supernet", e.to_string()))?;
    Ok(strides.filter_map(|stride| {
        Some(LinkPair {
            first: nth_host(stride, 1).ok()?,
            second: nth_host(stride, 2).ok()?,
        })
    }))
}

/// The first `required` link pairs, or `InsufficientLinkIps`.
pub fn allocate_links(
    pairs: impl Iterator<Item = LinkPair>,
    required: usize,
) -> ZtpResult<Vec<LinkPair>> {
    let allocated: Vec<LinkPair> = pairs.take(required).collect();
    if allocated.len() < required {
        return Err(ZtpError::InsufficientLinkIps {
            required,
            available: allocated.len(),
        });
    }
    Ok(allocated)
}

fn host_v4(block: Ipv4Net, index: u32) -> ZtpResult<Ipv4Addr> {
    let exhausted = || ZtpError::AddressExhausted {
        block: block.to_string(),
        index,
    };
    let addr = u32::from(block.network())
        .checked_add(index)
        .map(Ipv4Addr::from)
        .ok_or_else(exhausted)?;
    if !block.contains(&addr) {
        return Err(exhausted());
    }
    Ok(addr)
}

/// Loopback of the vRouter at `index`; also its router-id.
pub fn loopback(block: Ipv4Net, index: u32) -> ZtpResult<Ipv4Addr> {
    host_v4(block.trunc(), index)
}

/// In-band address of the switch at 1-based `global_index`, with the block's
/// prefix length.
pub fn inband(block: Ipv4Net, global_index: u32) -> ZtpResult<Ipv4Net> {
    let addr = host_v4(block.trunc(), global_index)?;
    Ipv4Net::new(addr, block.prefix_len()).map_err(|e| ZtpError::internal(e.to_string()))
}

/// `offset`-th address of `net`, keeping its prefix (`.1` is the gateway).
pub fn host(net: Ipv4Net, offset: u32) -> ZtpResult<Ipv4Net> {
    let addr = host_v4(net.trunc(), offset)?;
    Ipv4Net::new(addr, net.prefix_len()).map_err(|e| ZtpError::internal(e.to_string()))
}

/// Addresses of one cluster's iBGP/iOSPF link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPair {
    pub network: Ipv4Net,
    /// Address of the cluster's first member.
    pub first: Ipv4Net,
    pub second: Ipv4Net,
}

/// `/30` number `k` (0-based) of the overlay block.
pub fn overlay_pair(block: Ipv4Net, k: usize) -> ZtpResult<OverlayPair> {
    let network = block
        .trunc()
        .subnets(30)
        .map_err(|e| ZtpError::invalid_config("overlay range", e.to_string()))?
        .nth(k)
        .ok_or_else(|| ZtpError::AddressExhausted {
            block: block.to_string(),
            index: k as u32,
        })?;
    Ok(OverlayPair {
        network,
        first: host(network, 1)?,
        second: host(network, 2)?,
    })
}

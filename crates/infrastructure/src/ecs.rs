//! EDNS Client Subnet stamping (RFC 7871).

use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use std::net::IpAddr;

const ECS_PAYLOAD_SIZE: u16 = 4096;
const ECS_V4_PREFIX: u8 = 24;
const ECS_V6_PREFIX: u8 = 56;

/// Ensures `msg` carries exactly one client-subnet option for `ecs_ip`.
///
/// Creates the OPT pseudo-record (payload 4096, DO off) when absent, drops
/// any existing subnet option and appends a fresh one. Empty or unparseable
/// `ecs_ip` leaves the message untouched. Mutates in place; racing callers
/// must operate on per-attempt clones.
pub fn ensure_ecs(msg: &mut Message, ecs_ip: &str) {
    if ecs_ip.is_empty() {
        return;
    }
    let Ok(ip) = ecs_ip.parse::<IpAddr>() else {
        return;
    };

    let edns = msg.extensions_mut().get_or_insert_with(|| {
        let mut edns = Edns::new();
        edns.set_max_payload(ECS_PAYLOAD_SIZE);
        edns.set_dnssec_ok(false);
        edns.set_version(0);
        edns
    });

    let options = edns.options_mut();
    options.remove(EdnsCode::Subnet);
    options.insert(EdnsOption::Unknown(
        u16::from(EdnsCode::Subnet),
        subnet_payload(ip),
    ));
}

/// RFC 7871 §6 option payload: family, source prefix, scope prefix, address.
/// The full 4/16 address bytes are carried, scope is always zero.
fn subnet_payload(ip: IpAddr) -> Vec<u8> {
    let (family, prefix, addr): (u16, u8, Vec<u8>) = match ip {
        IpAddr::V4(v4) => (1, ECS_V4_PREFIX, v4.octets().to_vec()),
        IpAddr::V6(v6) => (2, ECS_V6_PREFIX, v6.octets().to_vec()),
    };
    let mut payload = Vec::with_capacity(4 + addr.len());
    payload.extend_from_slice(&family.to_be_bytes());
    payload.push(prefix);
    payload.push(0);
    payload.extend_from_slice(&addr);
    payload
}

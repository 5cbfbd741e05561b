//! Builds the ICMP messages a router originates: echo replies and the
//! destination-unreachable / time-exceeded errors.

use crate::interface::Interface;
use nexthop_packets::{
    EthernetFrame, IcmpPacket, IcmpType, IpProtocol, Ipv4Packet, IPV4_ETHER_TYPE,
};
use std::cmp;
use std::convert::TryFrom;

/// TTL for router-originated datagrams.
const RESPONSE_TTL: u8 = 64;

/// Builds the complete response frame for `msg_type`/`code` triggered by
/// the inbound frame `trigger`, ready to transmit on `iface` (the interface
/// the trigger arrived on). The response swaps the trigger's addressing:
/// destination MAC/IP are the trigger's sources, sources are `iface`'s own.
///
/// An echo reply carries the triggering message's identifier, sequence
/// number and opaque payload. An error message carries four zeroed bytes,
/// the offending datagram's IP header, and up to 8 bytes of its payload,
/// per RFC 792. Both checksums are computed here.
pub fn icmp_response(
    iface: &Interface,
    trigger: &[u8],
    msg_type: IcmpType,
    code: u8,
) -> Result<Vec<u8>, &'static str> {
    let trigger_eth = EthernetFrame::from_buffer(trigger.to_vec())?;
    let requester_mac = trigger_eth.src_mac();
    let trigger_ip = Ipv4Packet::try_from(trigger_eth)?;

    let body = match msg_type {
        IcmpType::EchoReply | IcmpType::EchoRequest => {
            // Reuse the triggering message wholesale; only type, code and
            // checksum change, so identifier, sequence and payload survive.
            let trigger_icmp = IcmpPacket::try_from(trigger_ip.clone())?;
            let mut body = trigger_icmp.body().into_owned();
            body[0] = msg_type as u8;
            body[1] = code;
            body[2] = 0;
            body[3] = 0;
            body
        }
        IcmpType::DestUnreachable | IcmpType::TimeExceeded => {
            let header_len = trigger_ip.ihl() as usize * 4;
            let datagram_end = trigger_ip.layer3_offset + trigger_ip.total_len() as usize;
            let datagram = &trigger_ip.data[trigger_ip.layer3_offset..datagram_end];
            let copied = cmp::min(datagram.len(), header_len + 8);

            let mut body = vec![0; 8];
            body[0] = msg_type as u8;
            body[1] = code;
            body.extend_from_slice(&datagram[..copied]);
            body
        }
    };

    let mut response_ip = Ipv4Packet::empty();
    response_ip.set_ttl(RESPONSE_TTL);
    response_ip.set_protocol(IpProtocol::ICMP);
    response_ip.set_src_addr(iface.ip);
    response_ip.set_dest_addr(trigger_ip.src_addr());
    response_ip.set_payload(&body);

    let mut response_icmp = IcmpPacket::try_from(response_ip)?;
    response_icmp.set_checksum();
    let mut response_ip = response_icmp.packet();
    response_ip.set_checksum();

    let mut response_eth = EthernetFrame::empty();
    response_eth.set_dest_mac(requester_mac);
    response_eth.set_src_mac(iface.mac);
    response_eth.set_ether_type(IPV4_ETHER_TYPE);
    response_eth.set_payload(&response_ip.data);
    Ok(response_eth.data)
}

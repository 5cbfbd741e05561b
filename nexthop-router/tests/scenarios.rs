//! End-to-end exercises of the frame classifier, the forwarding path, and
//! the ARP retry worker, against a small two-port router. Time-dependent
//! behavior is driven through `arp_tick_at` with synthetic instants.

use crossbeam::channel::{unbounded, Receiver};
use nexthop_packets::{
    ArpFrame, ArpOp, EthernetFrame, IcmpPacket, IcmpType, IpProtocol, Ipv4Packet, MacAddr,
    ARP_ETHER_TYPE, ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE,
    ICMP_CODE_PORT_UNREACHABLE, ICMP_CODE_PROTOCOL_UNREACHABLE, IPV4_ETHER_TYPE,
};
use nexthop_router::config::RouterConfig;
use nexthop_router::router::Router;
use nexthop_router::sink::ChannelSink;
use rand::RngCore;
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

const ROUTER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);
const UPSTREAM_IP: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 5);

fn router_mac() -> MacAddr {
    MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
}

fn host_mac() -> MacAddr {
    MacAddr::new([0x02, 0xaa, 0x00, 0x00, 0x00, 0x01])
}

fn gateway_mac() -> MacAddr {
    MacAddr::new([0x02, 0xbb, 0x00, 0x00, 0x00, 0x01])
}

/// eth0 10.0.0.1/24, eth1 192.168.1.1/24, upstream default route via the
/// gateway on eth0.
fn standard_router() -> (Router<ChannelSink>, Receiver<(String, Vec<u8>)>) {
    let (sender, receiver) = unbounded();
    let config = RouterConfig::from_toml_str(
        r#"
        [[interfaces]]
        name = "eth0"
        mac = "02:00:00:00:00:01"
        ip = "10.0.0.1"

        [[interfaces]]
        name = "eth1"
        mac = "02:00:00:00:00:02"
        ip = "192.168.1.1"

        [[routes]]
        dest = "10.0.0.0"
        mask = "255.255.255.0"
        interface = "eth0"

        [[routes]]
        dest = "192.168.1.0"
        mask = "255.255.255.0"
        interface = "eth1"

        [[routes]]
        dest = "0.0.0.0"
        mask = "0.0.0.0"
        gateway = "10.0.0.254"
        interface = "eth0"
        "#,
    )
    .unwrap();
    (config.build(ChannelSink::new(sender)).unwrap(), receiver)
}

fn ipv4_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut ip = Ipv4Packet::empty();
    ip.set_ttl(ttl);
    ip.set_protocol(protocol);
    ip.set_src_addr(src_ip);
    ip.set_dest_addr(dst_ip);
    ip.set_payload(payload);
    ip.set_checksum();

    let mut eth = EthernetFrame::empty();
    eth.set_src_mac(src_mac);
    eth.set_dest_mac(dst_mac);
    eth.set_ether_type(IPV4_ETHER_TYPE);
    eth.set_payload(&ip.data);
    eth.data
}

fn echo_request(identifier: u16, sequence: u16, payload: &[u8], ttl: u8) -> Vec<u8> {
    let mut body = vec![IcmpType::EchoRequest as u8, 0, 0, 0];
    body.extend_from_slice(&identifier.to_be_bytes());
    body.extend_from_slice(&sequence.to_be_bytes());
    body.extend_from_slice(payload);
    let checksum = nexthop_packets::internet_checksum(&body);
    body[2..4].copy_from_slice(&checksum.to_be_bytes());

    ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::ICMP,
        ttl,
        &body,
    )
}

fn arp_reply_from_gateway() -> Vec<u8> {
    let mut reply = ArpFrame::new();
    reply
        .set_opcode(ArpOp::Reply as u16)
        .set_sender_mac_addr(gateway_mac())
        .set_sender_ipv4_addr(GATEWAY_IP)
        .set_target_mac_addr(router_mac())
        .set_target_ipv4_addr(ROUTER_IP);
    let mut eth = reply.frame();
    eth.set_src_mac(gateway_mac());
    eth.set_dest_mac(router_mac());
    eth.data
}

fn parse_icmp(frame: Vec<u8>) -> (Ipv4Packet, IcmpPacket) {
    let eth = EthernetFrame::from_buffer(frame).unwrap();
    assert_eq!(eth.ether_type(), IPV4_ETHER_TYPE);
    let ip = Ipv4Packet::try_from(eth).unwrap();
    assert!(ip.validate_checksum());
    let icmp = IcmpPacket::try_from(ip.clone()).unwrap();
    assert!(icmp.validate_checksum());
    (ip, icmp)
}

// Scenario 1: an echo request addressed to the router comes straight back
// as an echo reply with identifier, sequence and payload intact.
#[test]
fn echo_to_self() {
    let (router, receiver) = standard_router();
    let request = echo_request(1, 2, b"abcd", 64);
    router.process_frame(0, &request).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    assert_eq!(frame.len(), request.len());

    let eth = EthernetFrame::from_buffer(frame).unwrap();
    assert_eq!(eth.dest_mac(), host_mac());
    assert_eq!(eth.src_mac(), router_mac());

    let ip = Ipv4Packet::try_from(eth).unwrap();
    assert_eq!(ip.src_addr(), ROUTER_IP);
    assert_eq!(ip.dest_addr(), HOST_IP);
    assert_eq!(ip.ttl(), 64);
    assert!(ip.validate_checksum());

    let icmp = IcmpPacket::try_from(ip).unwrap();
    assert_eq!(icmp.msg_type(), IcmpType::EchoReply as u8);
    assert_eq!(icmp.msg_code(), 0);
    assert_eq!(icmp.identifier(), 1);
    assert_eq!(icmp.sequence_number(), 2);
    assert_eq!(icmp.payload().as_ref(), b"abcd");
    assert!(icmp.validate_checksum());
    assert!(receiver.try_recv().is_err());
}

#[test]
fn echo_with_opaque_payload() {
    let (router, receiver) = standard_router();
    let mut payload = vec![0u8; 100];
    rand::thread_rng().fill_bytes(&mut payload);

    router.process_frame(0, &echo_request(77, 3, &payload, 64)).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.identifier(), 77);
    assert_eq!(icmp.payload().as_ref(), payload.as_slice());
}

// Scenario 2: a UDP datagram addressed to the router gets destination
// unreachable, code port unreachable, quoting the header plus 8 bytes.
#[test]
fn port_unreachable_for_udp_to_self() {
    let (router, receiver) = standard_router();
    let udp_payload = [0, 53, 0, 53, 0, 12, 0, 0, 0xde, 0xad];
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::UDP,
        64,
        &udp_payload,
    );
    router.process_frame(0, &datagram).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    let (ip, icmp) = parse_icmp(frame);
    assert_eq!(ip.dest_addr(), HOST_IP);
    assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
    assert_eq!(icmp.msg_code(), ICMP_CODE_PORT_UNREACHABLE);

    // The embedded datagram: original header and exactly 8 payload bytes.
    let embedded = icmp.payload().into_owned();
    assert_eq!(embedded.len(), 28);
    assert_eq!(&embedded[..20], &datagram[14..34]);
    assert_eq!(&embedded[20..], &udp_payload[..8]);
}

#[test]
fn tcp_beats_ttl_check() {
    // Per the classification order, TCP/UDP to the router answers port
    // unreachable even when the TTL is already 1.
    let (router, receiver) = standard_router();
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::TCP,
        1,
        &[0; 20],
    );
    router.process_frame(0, &datagram).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
    assert_eq!(icmp.msg_code(), ICMP_CODE_PORT_UNREACHABLE);
}

#[test]
fn ttl_one_echo_to_self_is_time_exceeded() {
    // The TTL check comes before the echo handler.
    let (router, receiver) = standard_router();
    router.process_frame(0, &echo_request(1, 1, b"x", 1)).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_type(), IcmpType::TimeExceeded as u8);
    assert_eq!(icmp.msg_code(), 0);
}

#[test]
fn protocol_unreachable_for_unhandled_protocol() {
    let (router, receiver) = standard_router();
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::Unknown(89),
        64,
        &[0; 16],
    );
    router.process_frame(0, &datagram).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
    assert_eq!(icmp.msg_code(), ICMP_CODE_PROTOCOL_UNREACHABLE);
}

#[test]
fn host_unreachable_for_other_interface_address() {
    // Addressed to eth1's IP but arriving on eth0: this router does not
    // cross-deliver between its own ports.
    let (router, receiver) = standard_router();
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        Ipv4Addr::new(192, 168, 1, 1),
        IpProtocol::UDP,
        64,
        &[0; 12],
    );
    router.process_frame(0, &datagram).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
    assert_eq!(icmp.msg_code(), ICMP_CODE_HOST_UNREACHABLE);
}

#[test]
fn network_unreachable_without_a_route() {
    let (sender, receiver) = unbounded();
    let config = RouterConfig::from_toml_str(
        r#"
        [[interfaces]]
        name = "eth0"
        mac = "02:00:00:00:00:01"
        ip = "10.0.0.1"

        [[routes]]
        dest = "10.0.0.0"
        mask = "255.255.255.0"
        interface = "eth0"
        "#,
    )
    .unwrap();
    let router = config.build(ChannelSink::new(sender)).unwrap();

    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        64,
        &[0; 12],
    );
    router.process_frame(0, &datagram).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
    assert_eq!(icmp.msg_code(), ICMP_CODE_NET_UNREACHABLE);
}

// Scenario 3: with the next hop already resolved, a transit datagram is
// rewritten and forwarded: gateway MAC, router source MAC, TTL down one,
// checksum recomputed, payload untouched.
#[test]
fn forward_with_cache_hit() {
    let (router, receiver) = standard_router();
    router.process_frame(0, &arp_reply_from_gateway()).unwrap();
    assert!(receiver.try_recv().is_err());

    let payload = [9, 8, 7, 6, 5, 4, 3, 2, 1, 0];
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        64,
        &payload,
    );
    router.process_frame(0, &datagram).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    assert_eq!(frame.len(), datagram.len());

    let eth = EthernetFrame::from_buffer(frame).unwrap();
    assert_eq!(eth.dest_mac(), gateway_mac());
    assert_eq!(eth.src_mac(), router_mac());

    let ip = Ipv4Packet::try_from(eth).unwrap();
    assert_eq!(ip.ttl(), 63);
    assert!(ip.validate_checksum());
    assert_eq!(ip.src_addr(), HOST_IP);
    assert_eq!(ip.dest_addr(), UPSTREAM_IP);
    assert_eq!(ip.payload().as_ref(), &payload);
}

#[test]
fn forward_with_ttl_one_is_time_exceeded() {
    let (router, receiver) = standard_router();
    router.process_frame(0, &arp_reply_from_gateway()).unwrap();

    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        1,
        &[0; 12],
    );
    router.process_frame(0, &datagram).unwrap();

    let (_, frame) = receiver.try_recv().unwrap();
    let (ip, icmp) = parse_icmp(frame);
    assert_eq!(ip.dest_addr(), HOST_IP);
    assert_eq!(icmp.msg_type(), IcmpType::TimeExceeded as u8);
}

// Scenario 4: a cache miss transmits exactly one ARP request and parks the
// datagram; a second datagram for the same next hop parks behind the same
// request without another transmission.
#[test]
fn forward_miss_queues_behind_one_request() {
    let (router, receiver) = standard_router();

    let first = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        64,
        &[1; 12],
    );
    router.process_frame(0, &first).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    let eth = EthernetFrame::from_buffer(frame).unwrap();
    assert_eq!(eth.ether_type(), ARP_ETHER_TYPE);
    assert_eq!(eth.dest_mac(), MacAddr::BROADCAST);
    assert_eq!(eth.src_mac(), router_mac());
    let request = ArpFrame::try_from(eth).unwrap();
    assert_eq!(request.opcode(), ArpOp::Request as u16);
    assert_eq!(request.sender_ipv4_addr(), ROUTER_IP);
    assert_eq!(request.sender_mac_addr(), router_mac());
    assert_eq!(request.target_ipv4_addr(), GATEWAY_IP);
    assert_eq!(request.target_mac_addr(), MacAddr::ZERO);

    // Same route, different destination: no new request this tick.
    let second = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        Ipv4Addr::new(198, 51, 100, 6),
        IpProtocol::UDP,
        64,
        &[2; 12],
    );
    router.process_frame(0, &second).unwrap();
    assert!(receiver.try_recv().is_err());
}

// Scenario 5: the ARP reply releases every withheld frame exactly once,
// TTL decremented, and leaves the mapping cached.
#[test]
fn arp_reply_drains_withheld_frames() {
    let (router, receiver) = standard_router();

    for seq in 0..2u8 {
        let datagram = ipv4_frame(
            host_mac(),
            router_mac(),
            HOST_IP,
            Ipv4Addr::new(198, 51, 100, 5 + seq),
            IpProtocol::UDP,
            64,
            &[seq; 12],
        );
        router.process_frame(0, &datagram).unwrap();
    }
    // Only the one ARP request so far.
    let (_, frame) = receiver.try_recv().unwrap();
    assert_eq!(
        EthernetFrame::from_buffer(frame).unwrap().ether_type(),
        ARP_ETHER_TYPE
    );
    assert!(receiver.try_recv().is_err());

    router.process_frame(0, &arp_reply_from_gateway()).unwrap();

    for seq in 0..2u8 {
        let (_, frame) = receiver.try_recv().unwrap();
        let eth = EthernetFrame::from_buffer(frame).unwrap();
        assert_eq!(eth.dest_mac(), gateway_mac());
        let ip = Ipv4Packet::try_from(eth).unwrap();
        assert_eq!(ip.dest_addr(), Ipv4Addr::new(198, 51, 100, 5 + seq));
        assert_eq!(ip.ttl(), 63);
        assert!(ip.validate_checksum());
    }
    assert!(receiver.try_recv().is_err());

    // The mapping is cached now: the next transit datagram forwards
    // without a new resolution.
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        Ipv4Addr::new(198, 51, 100, 7),
        IpProtocol::UDP,
        64,
        &[7; 12],
    );
    router.process_frame(0, &datagram).unwrap();
    let (_, frame) = receiver.try_recv().unwrap();
    let eth = EthernetFrame::from_buffer(frame).unwrap();
    assert_eq!(eth.ether_type(), IPV4_ETHER_TYPE);
    assert_eq!(eth.dest_mac(), gateway_mac());
}

#[test]
fn withheld_ttl_one_becomes_time_exceeded_on_drain() {
    let (router, receiver) = standard_router();

    let dying = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        1,
        &[0; 12],
    );
    router.process_frame(0, &dying).unwrap();
    let _arp_request = receiver.try_recv().unwrap();

    router.process_frame(0, &arp_reply_from_gateway()).unwrap();

    let (iface, frame) = receiver.try_recv().unwrap();
    assert_eq!(iface, "eth0");
    let (ip, icmp) = parse_icmp(frame);
    assert_eq!(ip.dest_addr(), HOST_IP);
    assert_eq!(icmp.msg_type(), IcmpType::TimeExceeded as u8);
    assert!(receiver.try_recv().is_err());
}

// Scenario 6: five unanswered transmissions, then every withheld frame is
// answered with host unreachable toward its original source.
#[test]
fn abandonment_after_five_requests() {
    let (router, receiver) = standard_router();
    let start = Instant::now();

    for seq in 0..2u8 {
        let datagram = ipv4_frame(
            host_mac(),
            router_mac(),
            HOST_IP,
            Ipv4Addr::new(198, 51, 100, 5 + seq),
            IpProtocol::UDP,
            64,
            &[seq; 12],
        );
        router.process_frame(0, &datagram).unwrap();
    }

    // Ticks offset by half a second so each is a full retry interval past
    // the previous transmission.
    for tick in 0..6u64 {
        let now = start + Duration::from_millis(1500 + tick * 1000);
        router.arp_tick_at(now).unwrap();
    }

    let mut arp_requests = 0;
    let mut unreachables = Vec::new();
    while let Ok((iface, frame)) = receiver.try_recv() {
        assert_eq!(iface, "eth0");
        let eth = EthernetFrame::from_buffer(frame).unwrap();
        match eth.ether_type() {
            ARP_ETHER_TYPE => {
                let request = ArpFrame::try_from(eth).unwrap();
                assert_eq!(request.opcode(), ArpOp::Request as u16);
                assert_eq!(request.target_ipv4_addr(), GATEWAY_IP);
                arp_requests += 1;
            }
            IPV4_ETHER_TYPE => {
                let ip = Ipv4Packet::try_from(eth).unwrap();
                assert_eq!(ip.dest_addr(), HOST_IP);
                let icmp = IcmpPacket::try_from(ip).unwrap();
                assert_eq!(icmp.msg_type(), IcmpType::DestUnreachable as u8);
                assert_eq!(icmp.msg_code(), ICMP_CODE_HOST_UNREACHABLE);
                unreachables.push(icmp);
            }
            other => panic!("unexpected ethertype {:#06x}", other),
        }
    }

    // The initial transmission plus four retries, never more.
    assert_eq!(arp_requests, 5);
    // One host unreachable per withheld frame, exactly once each.
    assert_eq!(unreachables.len(), 2);

    // The pending entry is gone: a fresh datagram starts a new resolution.
    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        64,
        &[9; 12],
    );
    router.process_frame(0, &datagram).unwrap();
    let (_, frame) = receiver.try_recv().unwrap();
    assert_eq!(
        EthernetFrame::from_buffer(frame).unwrap().ether_type(),
        ARP_ETHER_TYPE
    );
}

#[test]
fn cache_entries_expire_after_ttl() {
    let (router, receiver) = standard_router();
    router.process_frame(0, &arp_reply_from_gateway()).unwrap();

    // 16 seconds later the 15 second TTL has passed.
    router
        .arp_tick_at(Instant::now() + Duration::from_secs(16))
        .unwrap();

    let datagram = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        UPSTREAM_IP,
        IpProtocol::UDP,
        64,
        &[0; 12],
    );
    router.process_frame(0, &datagram).unwrap();

    // The expired mapping forces a fresh resolution.
    let (_, frame) = receiver.try_recv().unwrap();
    assert_eq!(
        EthernetFrame::from_buffer(frame).unwrap().ether_type(),
        ARP_ETHER_TYPE
    );
}

#[test]
fn checksum_validation_knob_drops_corrupt_datagrams() {
    let (sender, receiver) = unbounded();
    let config = RouterConfig::from_toml_str(
        r#"
        validate_ip_checksum = true

        [[interfaces]]
        name = "eth0"
        mac = "02:00:00:00:00:01"
        ip = "10.0.0.1"
        "#,
    )
    .unwrap();
    let router = config.build(ChannelSink::new(sender)).unwrap();

    let mut corrupt = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::UDP,
        64,
        &[0; 12],
    );
    corrupt[24] ^= 0xff; // flip the checksum field
    router.process_frame(0, &corrupt).unwrap();
    assert!(receiver.try_recv().is_err());

    let intact = ipv4_frame(
        host_mac(),
        router_mac(),
        HOST_IP,
        ROUTER_IP,
        IpProtocol::UDP,
        64,
        &[0; 12],
    );
    router.process_frame(0, &intact).unwrap();
    let (_, frame) = receiver.try_recv().unwrap();
    let (_, icmp) = parse_icmp(frame);
    assert_eq!(icmp.msg_code(), ICMP_CODE_PORT_UNREACHABLE);
}

//! The per-frame classification and response state machine, the IP
//! forwarding path, and the ARP tick that the background worker drives.

use crate::arp::{ArpState, ARP_RETRY_CAP};
use crate::error::RouterError;
use crate::icmp::icmp_response;
use crate::interface::{Interface, InterfaceId};
use crate::routing::RoutingTable;
use crate::sink::FrameSink;
use nexthop_packets::{
    ArpFrame, ArpOp, EthernetFrame, IcmpPacket, IcmpType, IpProtocol, Ipv4Packet, MacAddr,
    ARP_ETHER_TYPE, ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE,
    ICMP_CODE_PORT_UNREACHABLE, ICMP_CODE_PROTOCOL_UNREACHABLE, IPV4_ETHER_TYPE, MAX_FRAME_LEN,
};
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The tunable constants of one router, normally taken from configuration.
#[derive(Clone, Copy, Debug)]
pub struct Tunables {
    /// How long a resolved ARP entry stays usable.
    pub arp_cache_ttl: Duration,
    /// Minimum gap between retransmissions of one pending ARP request.
    pub arp_retry_interval: Duration,
    /// Unanswered transmissions before a pending request is abandoned.
    pub arp_retry_cap: u8,
    /// Drop inbound datagrams whose header checksum does not verify.
    pub validate_ip_checksum: bool,
}

impl Default for Tunables {
    fn default() -> Tunables {
        Tunables {
            arp_cache_ttl: Duration::from_secs(15),
            arp_retry_interval: Duration::from_secs(1),
            arp_retry_cap: ARP_RETRY_CAP,
            validate_ip_checksum: false,
        }
    }
}

/// One router instance: its interfaces and routing table (immutable after
/// construction), the mutex-guarded ARP bundle, and the sink frames leave
/// through. A process may run any number of routers; they share nothing.
#[derive(Debug)]
pub struct Router<S: FrameSink> {
    interfaces: Vec<Interface>,
    routing: RoutingTable,
    arp: Mutex<ArpState>,
    tunables: Tunables,
    sink: S,
}

impl<S: FrameSink> Router<S> {
    pub fn new(
        interfaces: Vec<Interface>,
        routing: RoutingTable,
        tunables: Tunables,
        sink: S,
    ) -> Router<S> {
        Router {
            arp: Mutex::new(ArpState::new(tunables.arp_cache_ttl)),
            interfaces,
            routing,
            tunables,
            sink,
        }
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface_id(&self, name: &str) -> Option<InterfaceId> {
        self.interfaces.iter().position(|iface| iface.name == name)
    }

    /// Classify one inbound frame and answer, forward, or queue it.
    ///
    /// The caller keeps ownership of `frame` and may reclaim the buffer as
    /// soon as this returns; anything that must outlive the call is deep
    /// copied. Frames must be delivered sequentially per router; only the
    /// ARP worker runs in parallel with this.
    pub fn process_frame(&self, ingress: InterfaceId, frame: &[u8]) -> Result<(), RouterError> {
        if self.interfaces.get(ingress).is_none() {
            return Err(RouterError::Fatal("ingress interface id out of range"));
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(RouterError::Dropped("frame exceeds the interface MTU"));
        }

        let eth = match EthernetFrame::from_buffer(frame.to_vec()) {
            Ok(eth) => eth,
            Err(reason) => {
                debug!(reason, "dropping frame the codec refused");
                return Ok(());
            }
        };

        match eth.ether_type() {
            IPV4_ETHER_TYPE => self.process_ipv4(ingress, frame, eth),
            ARP_ETHER_TYPE => self.process_arp(ingress, eth),
            ether_type => {
                debug!(ether_type, "ignoring frame with unhandled ethertype");
                Ok(())
            }
        }
    }

    fn process_ipv4(
        &self,
        ingress: InterfaceId,
        raw: &[u8],
        eth: EthernetFrame,
    ) -> Result<(), RouterError> {
        let ip = match Ipv4Packet::try_from(eth) {
            Ok(ip) => ip,
            Err(reason) => {
                debug!(reason, "dropping malformed IPv4 frame");
                return Ok(());
            }
        };
        if self.tunables.validate_ip_checksum && !ip.validate_checksum() {
            debug!(src = %ip.src_addr(), "dropping datagram with bad header checksum");
            return Ok(());
        }

        let dst = ip.dest_addr();
        if dst == self.interfaces[ingress].ip {
            return self.deliver_local(ingress, raw, &ip);
        }
        if self.interfaces.iter().any(|iface| iface.ip == dst) {
            // Addressed to another of our interfaces; a router of this
            // grade does not cross-deliver between its own ports.
            return self.send_icmp(
                ingress,
                raw,
                IcmpType::DestUnreachable,
                ICMP_CODE_HOST_UNREACHABLE,
            );
        }
        self.forward(ingress, raw, ip)
    }

    /// The datagram is addressed to the ingress interface itself.
    fn deliver_local(
        &self,
        ingress: InterfaceId,
        raw: &[u8],
        ip: &Ipv4Packet,
    ) -> Result<(), RouterError> {
        match ip.protocol() {
            IpProtocol::TCP | IpProtocol::UDP => self.send_icmp(
                ingress,
                raw,
                IcmpType::DestUnreachable,
                ICMP_CODE_PORT_UNREACHABLE,
            ),
            _ if ip.ttl() == 1 => self.send_icmp(ingress, raw, IcmpType::TimeExceeded, 0),
            IpProtocol::ICMP => match IcmpPacket::try_from(ip.clone()) {
                Ok(icmp) if icmp.msg_type() == IcmpType::EchoRequest as u8 => {
                    self.send_icmp(ingress, raw, IcmpType::EchoReply, 0)
                }
                Ok(icmp) => {
                    debug!(
                        msg_type = icmp.msg_type(),
                        "ignoring non-echo ICMP message addressed to the router"
                    );
                    Ok(())
                }
                Err(reason) => {
                    debug!(reason, "dropping malformed ICMP message");
                    Ok(())
                }
            },
            _ => self.send_icmp(
                ingress,
                raw,
                IcmpType::DestUnreachable,
                ICMP_CODE_PROTOCOL_UNREACHABLE,
            ),
        }
    }

    /// The datagram is for somebody else: pick a route and either rewrite
    /// and transmit, or park the frame behind an ARP resolution.
    fn forward(&self, ingress: InterfaceId, raw: &[u8], ip: Ipv4Packet) -> Result<(), RouterError> {
        let entry = match self.routing.lookup(ip.dest_addr()) {
            Some(entry) => entry,
            None => {
                return self.send_icmp(
                    ingress,
                    raw,
                    IcmpType::DestUnreachable,
                    ICMP_CODE_NET_UNREACHABLE,
                );
            }
        };
        let next_hop = entry.next_hop(ip.dest_addr());
        let egress = entry.interface;
        let egress_iface = self
            .interfaces
            .get(egress)
            .ok_or(RouterError::Fatal("route references an interface id out of range"))?;

        let mut arp = self
            .arp
            .lock()
            .map_err(|_| RouterError::Fatal("ARP mutex poisoned"))?;
        if let Some(mac) = arp.cache.lookup(next_hop) {
            drop(arp);
            if ip.ttl() == 1 {
                return self.send_icmp(ingress, raw, IcmpType::TimeExceeded, 0);
            }
            return self.transmit_forwarded(ip, egress, mac);
        }

        match arp.pending.iter().position(|pending| pending.ip == next_hop) {
            Some(index) => {
                debug!(%next_hop, "resolution already in flight, withholding frame");
                arp.pending[index].attach_frame(raw, ingress);
            }
            None => {
                debug!(%next_hop, egress = %egress_iface.name, "cache miss, sending ARP request");
                self.send_arp_message(egress_iface, None, next_hop, ArpOp::Request);
                let pending = arp.pending_create(next_hop, egress);
                pending.times_sent = 1;
                pending.last_sent = Some(Instant::now());
                pending.attach_frame(raw, ingress);
            }
        }
        Ok(())
    }

    /// Forward-rewrite: same bytes, fresh Ethernet addressing, TTL down by
    /// one, header checksum recomputed. `ip` still carries its Ethernet
    /// header, so only the addressing fields change.
    fn transmit_forwarded(
        &self,
        mut ip: Ipv4Packet,
        egress: InterfaceId,
        dst_mac: MacAddr,
    ) -> Result<(), RouterError> {
        let egress_iface = self
            .interfaces
            .get(egress)
            .ok_or(RouterError::Fatal("egress interface id out of range"))?;

        let ttl = ip.ttl();
        ip.set_ttl(ttl - 1);
        ip.set_checksum();

        let mut eth = EthernetFrame::from_buffer(ip.data)
            .map_err(|_| RouterError::Fatal("forwarded packet lost its Ethernet header"))?;
        eth.set_dest_mac(dst_mac);
        eth.set_src_mac(egress_iface.mac);
        eth.set_ether_type(IPV4_ETHER_TYPE);

        self.sink.send_frame(egress_iface, &eth.data);
        Ok(())
    }

    fn process_arp(&self, ingress: InterfaceId, eth: EthernetFrame) -> Result<(), RouterError> {
        let iface = &self.interfaces[ingress];
        let arp_frame = match ArpFrame::try_from(eth) {
            Ok(arp_frame) => arp_frame,
            Err(reason) => {
                debug!(reason, "dropping malformed ARP frame");
                return Ok(());
            }
        };
        if arp_frame.target_ipv4_addr() != iface.ip {
            // Somebody else's resolution; the wire is shared.
            return Ok(());
        }

        match arp_frame.opcode() {
            op if op == ArpOp::Request as u16 => {
                debug!(requester = %arp_frame.sender_ipv4_addr(), "answering ARP request");
                self.send_arp_message(
                    iface,
                    Some(arp_frame.sender_mac_addr()),
                    arp_frame.sender_ipv4_addr(),
                    ArpOp::Reply,
                );
                Ok(())
            }
            op if op == ArpOp::Reply as u16 => self.absorb_arp_reply(arp_frame),
            op => {
                debug!(op, "ignoring ARP message with unsupported opcode");
                Ok(())
            }
        }
    }

    /// A neighbor answered: remember the mapping and release every frame
    /// that was waiting on it.
    fn absorb_arp_reply(&self, arp_frame: ArpFrame) -> Result<(), RouterError> {
        let resolved_ip = arp_frame.sender_ipv4_addr();
        let resolved_mac = arp_frame.sender_mac_addr();

        let mut arp = self
            .arp
            .lock()
            .map_err(|_| RouterError::Fatal("ARP mutex poisoned"))?;
        arp.cache.insert(resolved_ip, resolved_mac, Instant::now());
        let pending = match arp.pending_remove(resolved_ip) {
            Some(pending) => pending,
            None => return Ok(()),
        };
        drop(arp);

        debug!(
            ip = %resolved_ip,
            frames = pending.withheld.len(),
            "resolution complete, draining withheld frames"
        );
        for withheld in pending.withheld {
            let parsed = EthernetFrame::from_buffer(withheld.frame.clone())
                .and_then(Ipv4Packet::try_from);
            let ip = match parsed {
                Ok(ip) => ip,
                Err(reason) => {
                    debug!(reason, "dropping unforwardable withheld frame");
                    continue;
                }
            };
            if ip.ttl() == 1 {
                self.send_icmp(withheld.ingress, &withheld.frame, IcmpType::TimeExceeded, 0)?;
            } else {
                self.transmit_forwarded(ip, pending.interface, resolved_mac)?;
            }
        }
        Ok(())
    }

    /// Builds and transmits one ARP message on `iface`. A request leaves
    /// the target hardware address zeroed and goes to the broadcast MAC; a
    /// reply is unicast back to `target_mac`.
    fn send_arp_message(
        &self,
        iface: &Interface,
        target_mac: Option<MacAddr>,
        target_ip: Ipv4Addr,
        op: ArpOp,
    ) {
        let mut arp_frame = ArpFrame::new();
        arp_frame
            .set_opcode(op as u16)
            .set_sender_mac_addr(iface.mac)
            .set_sender_ipv4_addr(iface.ip)
            .set_target_mac_addr(target_mac.unwrap_or(MacAddr::ZERO))
            .set_target_ipv4_addr(target_ip);

        let mut eth = arp_frame.frame();
        eth.set_src_mac(iface.mac);
        eth.set_dest_mac(target_mac.unwrap_or(MacAddr::BROADCAST));
        self.sink.send_frame(iface, &eth.data);
    }

    fn send_icmp(
        &self,
        ingress: InterfaceId,
        trigger: &[u8],
        msg_type: IcmpType,
        code: u8,
    ) -> Result<(), RouterError> {
        let iface = &self.interfaces[ingress];
        match icmp_response(iface, trigger, msg_type, code) {
            Ok(frame) => {
                self.sink.send_frame(iface, &frame);
                Ok(())
            }
            Err(reason) => {
                // A trigger we cannot quote is a malformed frame: drop it.
                debug!(reason, "could not build ICMP response");
                Ok(())
            }
        }
    }

    /// One pass of the retry/expiry worker. Called at ~1 Hz.
    pub fn arp_tick(&self) -> Result<(), RouterError> {
        self.arp_tick_at(Instant::now())
    }

    /// `arp_tick` with an explicit current time, so embedders and tests can
    /// drive the retry schedule without real delays.
    pub fn arp_tick_at(&self, now: Instant) -> Result<(), RouterError> {
        let mut arp = self
            .arp
            .lock()
            .map_err(|_| RouterError::Fatal("ARP mutex poisoned"))?;
        arp.cache.expire(now);

        // Entries at the cap are detached first so their withheld frames
        // can be answered without holding the lock.
        let mut abandoned = Vec::new();
        let mut index = 0;
        while index < arp.pending.len() {
            if arp.pending[index].times_sent >= self.tunables.arp_retry_cap {
                abandoned.push(arp.pending.swap_remove(index));
            } else {
                index += 1;
            }
        }

        for pending in arp.pending.iter_mut() {
            let due = match pending.last_sent {
                Some(last_sent) => now.duration_since(last_sent) >= self.tunables.arp_retry_interval,
                None => true,
            };
            if !due {
                continue;
            }
            let iface = self
                .interfaces
                .get(pending.interface)
                .ok_or(RouterError::Fatal("pending entry references an interface id out of range"))?;
            debug!(ip = %pending.ip, attempt = pending.times_sent + 1, "retransmitting ARP request");
            self.send_arp_message(iface, None, pending.ip, ArpOp::Request);
            pending.times_sent += 1;
            pending.last_sent = Some(now);
        }
        drop(arp);

        for pending in abandoned {
            warn!(
                ip = %pending.ip,
                frames = pending.withheld.len(),
                "abandoning ARP resolution, answering with host unreachable"
            );
            for withheld in pending.withheld {
                self.send_icmp(
                    withheld.ingress,
                    &withheld.frame,
                    IcmpType::DestUnreachable,
                    ICMP_CODE_HOST_UNREACHABLE,
                )?;
            }
        }
        Ok(())
    }
}

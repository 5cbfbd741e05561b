use crate::*;
use std::convert::{TryFrom, TryInto};
use std::net::Ipv4Addr;

pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

pub enum ArpHardwareType {
    Ethernet = 1,
}

// Body offsets within the Ethernet payload. Only the Ethernet/IPv4 binding
// of RFC 826 is handled (hardware 1, protocol 0x0800, 6/4 address lengths),
// so every range is fixed:
// 0       2       4    5    6      8         14        18        24       28
// |-htype-|-ptype-|hln-|pln-|--op--|---sha---|---spa---|---tha---|--tpa---|
const HARDWARE_TYPE_RANGE: (usize, usize) = (0, 2);
const PROTOCOL_TYPE_RANGE: (usize, usize) = (2, 4);
const OPCODE_RANGE: (usize, usize) = (6, 8);
const SENDER_HARDWARE_ADDR_RANGE: (usize, usize) = (8, 14);
const SENDER_PROTOCOL_ADDR_RANGE: (usize, usize) = (14, 18);
const TARGET_HARDWARE_ADDR_RANGE: (usize, usize) = (18, 24);
const TARGET_PROTOCOL_ADDR_RANGE: (usize, usize) = (24, 28);

const ARP_BODY_LEN: usize = 28;

///
/// EthernetFrame wrapper with getters/setters for the packet structure
/// described in RFC 826, restricted to the Ethernet/IPv4 binding.
/// https://tools.ietf.org/html/rfc826
///
#[derive(Clone, Debug)]
pub struct ArpFrame {
    frame: EthernetFrame,
}

impl ArpFrame {
    ///
    /// Constructs a new packet with the Ethernet/IPv4 binding prefilled and
    /// every address zeroed.
    ///
    pub fn new() -> ArpFrame {
        let mut body = vec![0; ARP_BODY_LEN];
        body[..2].copy_from_slice(&(ArpHardwareType::Ethernet as u16).to_be_bytes());
        body[2..4].copy_from_slice(&IPV4_ETHER_TYPE.to_be_bytes());
        body[4] = 6;
        body[5] = 4;

        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(ARP_ETHER_TYPE);
        frame.set_payload(&body);

        ArpFrame { frame }
    }

    pub fn hardware_type(&self) -> u16 {
        let (start, end) = HARDWARE_TYPE_RANGE;
        u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn protocol_type(&self) -> u16 {
        let (start, end) = PROTOCOL_TYPE_RANGE;
        u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn hardware_addr_len(&self) -> u8 {
        self.arp_data(4, 5)[0]
    }

    pub fn protocol_addr_len(&self) -> u8 {
        self.arp_data(5, 6)[0]
    }

    pub fn opcode(&self) -> u16 {
        let (start, end) = OPCODE_RANGE;
        u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn set_opcode(&mut self, code: u16) -> &mut Self {
        let (start, end) = OPCODE_RANGE;
        self.set_arp_data(&code.to_be_bytes(), start, end)
    }

    pub fn sender_mac_addr(&self) -> MacAddr {
        let (start, end) = SENDER_HARDWARE_ADDR_RANGE;
        MacAddr::new(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn set_sender_mac_addr(&mut self, addr: MacAddr) -> &mut Self {
        let (start, end) = SENDER_HARDWARE_ADDR_RANGE;
        self.set_arp_data(&addr.bytes, start, end)
    }

    pub fn sender_ipv4_addr(&self) -> Ipv4Addr {
        let (start, end) = SENDER_PROTOCOL_ADDR_RANGE;
        let bytes: [u8; 4] = self.arp_data(start, end).try_into().unwrap();
        Ipv4Addr::from(bytes)
    }

    pub fn set_sender_ipv4_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        let (start, end) = SENDER_PROTOCOL_ADDR_RANGE;
        self.set_arp_data(&addr.octets(), start, end)
    }

    pub fn target_mac_addr(&self) -> MacAddr {
        let (start, end) = TARGET_HARDWARE_ADDR_RANGE;
        MacAddr::new(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn set_target_mac_addr(&mut self, addr: MacAddr) -> &mut Self {
        let (start, end) = TARGET_HARDWARE_ADDR_RANGE;
        self.set_arp_data(&addr.bytes, start, end)
    }

    pub fn target_ipv4_addr(&self) -> Ipv4Addr {
        let (start, end) = TARGET_PROTOCOL_ADDR_RANGE;
        let bytes: [u8; 4] = self.arp_data(start, end).try_into().unwrap();
        Ipv4Addr::from(bytes)
    }

    pub fn set_target_ipv4_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        let (start, end) = TARGET_PROTOCOL_ADDR_RANGE;
        self.set_arp_data(&addr.octets(), start, end)
    }

    // Move ownership of the frame back to the caller
    pub fn frame(self) -> EthernetFrame {
        self.frame
    }

    // Returns the bytes in the ethernet frame between start and end, exclusive
    fn arp_data(&self, start: usize, end: usize) -> &[u8] {
        let frame_offset_start = self.frame.payload_offset + start;
        let frame_offset_end = self.frame.payload_offset + end;
        &self.frame.data[frame_offset_start..frame_offset_end]
    }

    fn set_arp_data(&mut self, bytes: &[u8], start: usize, end: usize) -> &mut Self {
        let frame_offset_start = self.frame.payload_offset + start;
        let frame_offset_end = self.frame.payload_offset + end;
        self.frame.data[frame_offset_start..frame_offset_end].copy_from_slice(bytes);
        self
    }
}

impl Default for ArpFrame {
    fn default() -> Self {
        ArpFrame::new()
    }
}

impl TryFrom<EthernetFrame> for ArpFrame {
    type Error = &'static str;

    ///
    /// Decorates the given EthernetFrame with ArpFrame getters/setters.
    /// Validates
    /// - The frame has an ARP ether type
    /// - The payload holds a full 28 byte body (links may pad past it)
    /// - The body carries the Ethernet/IPv4 binding
    ///
    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        if frame.ether_type() != ARP_ETHER_TYPE {
            return Err("Frame does not have ARP ether type");
        }
        if frame.payload().len() < ARP_BODY_LEN {
            return Err("Frame payload is too small");
        }

        let arp_frame = ArpFrame { frame };
        if arp_frame.hardware_type() != ArpHardwareType::Ethernet as u16
            || arp_frame.hardware_addr_len() != 6
        {
            return Err("ARP hardware binding is not 48 bit Ethernet");
        }
        if arp_frame.protocol_type() != IPV4_ETHER_TYPE || arp_frame.protocol_addr_len() != 4 {
            return Err("ARP protocol binding is not IPv4");
        }

        Ok(arp_frame)
    }
}

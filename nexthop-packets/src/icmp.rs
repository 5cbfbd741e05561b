use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};

/// ICMP message kinds the router produces or understands, per RFC 792.
#[derive(Eq, Clone, Copy, PartialEq, Debug)]
pub enum IcmpType {
    EchoReply = 0,
    DestUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

/// Codes for `IcmpType::DestUnreachable`.
pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_CODE_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;

///
/// Ipv4Packet wrapper with getters/setters for the message structure of
/// RFC 792: type, code, checksum, four message-dependent bytes, body.
/// For echo messages the four bytes split into identifier and sequence
/// number; for errors they are unused and the body carries the offending
/// datagram's header plus its first payload bytes.
///
#[derive(Clone, Debug)]
pub struct IcmpPacket {
    packet: Ipv4Packet,
}

impl IcmpPacket {
    pub fn msg_type(&self) -> u8 {
        self.icmp_data(0, 1)[0]
    }

    pub fn set_msg_type(&mut self, msg_type: u8) -> &mut Self {
        self.set_icmp_data(&[msg_type], 0, 1)
    }

    pub fn msg_code(&self) -> u8 {
        self.icmp_data(1, 2)[0]
    }

    pub fn set_msg_code(&mut self, code: u8) -> &mut Self {
        self.set_icmp_data(&[code], 1, 2)
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.icmp_data(2, 4).try_into().unwrap())
    }

    /// Echo identifier; only meaningful for echo request/reply messages.
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes(self.icmp_data(4, 6).try_into().unwrap())
    }

    pub fn set_identifier(&mut self, identifier: u16) -> &mut Self {
        self.set_icmp_data(&identifier.to_be_bytes(), 4, 6)
    }

    /// Echo sequence number; only meaningful for echo request/reply messages.
    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes(self.icmp_data(6, 8).try_into().unwrap())
    }

    pub fn set_sequence_number(&mut self, sequence: u16) -> &mut Self {
        self.set_icmp_data(&sequence.to_be_bytes(), 6, 8)
    }

    /// The whole ICMP message, header included.
    pub fn body(&self) -> Cow<[u8]> {
        self.packet.payload()
    }

    /// The bytes after the 8 byte message header: the opaque echo payload,
    /// or the embedded datagram of an error message.
    pub fn payload(&self) -> Cow<[u8]> {
        let (start, end) = self.body_range();
        Cow::from(&self.packet.data[start + 8..end])
    }

    /// The value the checksum field must hold for the body to verify.
    pub fn compute_checksum(&self) -> u16 {
        let (start, end) = self.body_range();
        let mut body = self.packet.data[start..end].to_vec();
        body[2] = 0;
        body[3] = 0;
        internet_checksum(&body)
    }

    /// Sets the checksum field to the valid value.
    pub fn set_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.set_icmp_data(&checksum.to_be_bytes(), 2, 4);
    }

    pub fn validate_checksum(&self) -> bool {
        let (start, end) = self.body_range();
        internet_checksum(&self.packet.data[start..end]) == 0
    }

    // Move ownership of the packet back to the caller
    pub fn packet(self) -> Ipv4Packet {
        self.packet
    }

    fn body_range(&self) -> (usize, usize) {
        let end = self.packet.layer3_offset + self.packet.total_len() as usize;
        (self.packet.payload_offset, end)
    }

    fn icmp_data(&self, start: usize, end: usize) -> &[u8] {
        let (body_start, _) = self.body_range();
        &self.packet.data[body_start + start..body_start + end]
    }

    fn set_icmp_data(&mut self, bytes: &[u8], start: usize, end: usize) -> &mut Self {
        let (body_start, _) = self.body_range();
        self.packet.data[body_start + start..body_start + end].copy_from_slice(bytes);
        self
    }
}

impl TryFrom<Ipv4Packet> for IcmpPacket {
    type Error = &'static str;

    ///
    /// Decorates the given Ipv4Packet with IcmpPacket getters/setters.
    /// Validates
    /// - The packet's protocol field says ICMP
    /// - The payload holds at least the 8 byte message header
    ///
    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        if packet.protocol() != IpProtocol::ICMP {
            return Err("Packet does not carry an ICMP payload");
        }
        if packet.payload().len() < 8 {
            return Err("ICMP message is shorter than its 8 byte header");
        }
        Ok(IcmpPacket { packet })
    }
}

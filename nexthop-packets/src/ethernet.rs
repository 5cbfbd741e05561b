use crate::*;
use std::borrow::Cow;

// An Ethernet II header is two MACs and a 2 byte ethertype. When the
// ethertype slot holds the 802.1Q TPID, a 4 byte tag sits between the MACs
// and the real ethertype, pushing the payload out with it.
const UNTAGGED_HEADER_LEN: usize = 14;
const TAGGED_HEADER_LEN: usize = 18;

/// Longest buffer the codec frames: a full MTU of payload behind a tagged
/// header.
pub const MAX_FRAME_LEN: usize = ETHERNET_MTU + TAGGED_HEADER_LEN;

#[derive(Clone, Debug)]
pub struct EthernetFrame {
    pub data: PacketData,
    pub payload_offset: usize,
}

impl EthernetFrame {
    /// Frames the buffer: bounds the length against the header and the
    /// MTU, and locates the payload behind an 802.1Q tag when the frame
    /// carries one.
    pub fn from_buffer(data: PacketData) -> Result<EthernetFrame, &'static str> {
        if data.len() < UNTAGGED_HEADER_LEN {
            return Err("Buffer cannot hold an Ethernet header");
        }

        let tagged = u16::from_be_bytes([data[12], data[13]]) == VLAN_ETHER_TYPE;
        let payload_offset = if tagged {
            TAGGED_HEADER_LEN
        } else {
            UNTAGGED_HEADER_LEN
        };
        if data.len() < payload_offset {
            return Err("Frame's 802.1Q tag is truncated");
        }
        if data.len() > payload_offset + ETHERNET_MTU {
            return Err("Frame is longer than the link MTU allows");
        }

        Ok(EthernetFrame {
            data,
            payload_offset,
        })
    }

    /// An untagged frame with zeroed addressing and no payload, for
    /// building outbound packets.
    pub fn empty() -> EthernetFrame {
        EthernetFrame {
            data: vec![0; UNTAGGED_HEADER_LEN],
            payload_offset: UNTAGGED_HEADER_LEN,
        }
    }

    pub fn dest_mac(&self) -> MacAddr {
        self.mac_field(0)
    }

    pub fn src_mac(&self) -> MacAddr {
        self.mac_field(6)
    }

    pub fn set_dest_mac(&mut self, addr: MacAddr) {
        self.data[0..6].copy_from_slice(&addr.bytes);
    }

    pub fn set_src_mac(&mut self, addr: MacAddr) {
        self.data[6..12].copy_from_slice(&addr.bytes);
    }

    /// The ethertype of the payload. On a tagged frame this is the inner
    /// ethertype behind the 802.1Q tag, never the TPID.
    pub fn ether_type(&self) -> u16 {
        let at = self.payload_offset - 2;
        u16::from_be_bytes([self.data[at], self.data[at + 1]])
    }

    pub fn set_ether_type(&mut self, ether_type: u16) {
        let at = self.payload_offset - 2;
        self.data[at..at + 2].copy_from_slice(&ether_type.to_be_bytes());
    }

    pub fn is_tagged(&self) -> bool {
        self.payload_offset == TAGGED_HEADER_LEN
    }

    /// The VLAN id from the 802.1Q tag, if the frame carries one.
    pub fn vlan_id(&self) -> Option<u16> {
        if !self.is_tagged() {
            return None;
        }
        Some(u16::from_be_bytes([self.data[14], self.data[15]]) & 0x0FFF)
    }

    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    pub fn set_payload(&mut self, payload: &[u8]) {
        self.data.truncate(self.payload_offset);
        self.data.extend_from_slice(payload);
    }

    fn mac_field(&self, at: usize) -> MacAddr {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&self.data[at..at + 6]);
        MacAddr::new(bytes)
    }
}

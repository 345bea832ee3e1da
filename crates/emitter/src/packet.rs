use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use etherparse::{IcmpEchoHeader, Icmpv6Header, Icmpv6Type, IpNumber, PacketBuilder};

use crate::error::{Error, Result};

/// All-hosts multicast group on the local segment.
pub const IGMP_DESTINATION: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);
pub const ICMPV6_DESTINATION: Ipv6Addr =
    Ipv6Addr::new(0x2001, 0x0db8, 0x85a3, 0x0000, 0x0000, 0x8a2e, 0x0370, 0x7334);

/// IGMP messages never leave the local segment.
pub const IGMP_TTL: u8 = 1;
pub const ICMPV6_HOP_LIMIT: u8 = 64;

pub const IGMP_HEADER_LEN: usize = 8;
const IGMP_DEFAULT_MAX_RESPONSE_CODE: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IgmpType {
    MembershipQuery = 0x11,
    V1MembershipReport = 0x12,
    V2MembershipReport = 0x16,
    LeaveGroup = 0x17,
    V3MembershipReport = 0x22,
}

impl TryFrom<u8> for IgmpType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x11 => Ok(IgmpType::MembershipQuery),
            0x12 => Ok(IgmpType::V1MembershipReport),
            0x16 => Ok(IgmpType::V2MembershipReport),
            0x17 => Ok(IgmpType::LeaveGroup),
            0x22 => Ok(IgmpType::V3MembershipReport),
            other => Err(Error::MalformedIgmp(format!("unknown type 0x{:02x}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgmpHeader {
    pub igmp_type: IgmpType,
    pub max_response_code: u8,
    pub group_address: Ipv4Addr,
}

impl Default for IgmpHeader {
    fn default() -> Self {
        IgmpHeader {
            igmp_type: IgmpType::MembershipQuery,
            max_response_code: IGMP_DEFAULT_MAX_RESPONSE_CODE,
            group_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl IgmpHeader {
    /// Serializes the message with its checksum filled in.
    pub fn to_bytes(&self) -> [u8; IGMP_HEADER_LEN] {
        let mut bytes = [0u8; IGMP_HEADER_LEN];
        bytes[0] = self.igmp_type as u8;
        bytes[1] = self.max_response_code;
        bytes[4..8].copy_from_slice(&self.group_address.octets());
        let checksum = internet_checksum(&bytes);
        bytes[2..4].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    pub fn from_slice(data: &[u8]) -> Result<(IgmpHeader, &[u8])> {
        if data.len() < IGMP_HEADER_LEN {
            return Err(Error::MalformedIgmp(format!(
                "expected at least {} bytes, got {}",
                IGMP_HEADER_LEN,
                data.len()
            )));
        }

        if internet_checksum(data) != 0 {
            return Err(Error::MalformedIgmp("checksum mismatch".to_string()));
        }

        let header = IgmpHeader {
            igmp_type: IgmpType::try_from(data[0])?,
            max_response_code: data[1],
            group_address: Ipv4Addr::new(data[4], data[5], data[6], data[7]),
        };
        Ok((header, &data[IGMP_HEADER_LEN..]))
    }
}

/// Ones-complement sum of 16-bit words, odd trailing byte padded with zero.
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match *chunk {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => 0,
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Igmp,
    Icmpv6EchoRequest,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Igmp => write!(f, "igmp"),
            ProbeKind::Icmpv6EchoRequest => write!(f, "icmpv6"),
        }
    }
}

/// A transport-layer probe together with the network-layer fields the
/// kernel needs to wrap it in an IP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePacket {
    kind: ProbeKind,
    destination: IpAddr,
    protocol: IpNumber,
    hop_limit: u8,
    payload: Vec<u8>,
}

impl ProbePacket {
    pub fn igmp() -> ProbePacket {
        ProbePacket {
            kind: ProbeKind::Igmp,
            destination: IpAddr::V4(IGMP_DESTINATION),
            protocol: IpNumber::IGMP,
            hop_limit: IGMP_TTL,
            payload: IgmpHeader::default().to_bytes().to_vec(),
        }
    }

    /// The checksum is left zero: it covers the source address, which the
    /// kernel fills in on raw ICMPv6 sockets.
    pub fn icmpv6_echo_request() -> Result<ProbePacket> {
        let echo = IcmpEchoHeader { id: 0, seq: 0 };
        let header = Icmpv6Header::new(Icmpv6Type::EchoRequest(echo));
        let mut payload: Vec<u8> = Vec::with_capacity(header.header_len());
        header.write(&mut payload)?;
        Ok(ProbePacket {
            kind: ProbeKind::Icmpv6EchoRequest,
            destination: IpAddr::V6(ICMPV6_DESTINATION),
            protocol: IpNumber::IPV6_ICMP,
            hop_limit: ICMPV6_HOP_LIMIT,
            payload,
        })
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn destination(&self) -> IpAddr {
        self.destination
    }

    pub fn protocol(&self) -> IpNumber {
        self.protocol
    }

    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Renders the complete IP datagram as it would appear on the wire when
    /// sent from `source`.
    pub fn datagram(&self, source: IpAddr) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        match (source, self.destination) {
            (IpAddr::V4(source), IpAddr::V4(destination)) => {
                let packet =
                    PacketBuilder::ipv4(source.octets(), destination.octets(), self.hop_limit);
                buffer.reserve(packet.size(self.payload.len()));
                packet
                    .write(&mut buffer, self.protocol, &self.payload)
                    .map_err(|error| Error::PacketWrite(error.to_string()))?;
            }

            (IpAddr::V6(source), IpAddr::V6(destination)) => {
                let packet =
                    PacketBuilder::ipv6(source.octets(), destination.octets(), self.hop_limit);
                if self.protocol == IpNumber::IPV6_ICMP {
                    let (header, data) = Icmpv6Header::from_slice(&self.payload)
                        .map_err(|error| Error::PacketWrite(error.to_string()))?;
                    let packet = packet.icmpv6(header.icmp_type);
                    buffer.reserve(packet.size(data.len()));
                    packet
                        .write(&mut buffer, data)
                        .map_err(|error| Error::PacketWrite(error.to_string()))?;
                } else {
                    buffer.reserve(packet.size(self.payload.len()));
                    packet
                        .write(&mut buffer, self.protocol, &self.payload)
                        .map_err(|error| Error::PacketWrite(error.to_string()))?;
                }
            }

            (local, destination) => {
                return Err(Error::AddressFamilyMismatch { local, destination });
            }
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::{Icmpv6Slice, NetSlice, SlicedPacket};

    #[test]
    fn igmp_header_defaults_encode_with_checksum() {
        let bytes = IgmpHeader::default().to_bytes();
        assert_eq!(bytes, [0x11, 0x14, 0xee, 0xeb, 0, 0, 0, 0]);
    }

    #[test]
    fn igmp_header_parses_its_own_encoding() {
        let header = IgmpHeader {
            igmp_type: IgmpType::V2MembershipReport,
            max_response_code: 0,
            group_address: Ipv4Addr::new(239, 1, 2, 3),
        };
        let bytes = header.to_bytes();
        let (parsed, rest) = IgmpHeader::from_slice(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn igmp_header_rejects_bad_input() {
        let mut bytes = IgmpHeader::default().to_bytes();
        assert!(IgmpHeader::from_slice(&bytes[..4]).is_err());

        bytes[7] ^= 0xff;
        assert!(matches!(
            IgmpHeader::from_slice(&bytes),
            Err(Error::MalformedIgmp(_))
        ));

        assert!(IgmpType::try_from(0x42).is_err());
    }

    #[test]
    fn igmp_probe_targets_all_hosts() {
        let packet = ProbePacket::igmp();
        assert_eq!(packet.kind(), ProbeKind::Igmp);
        assert_eq!(packet.destination(), IpAddr::V4(Ipv4Addr::new(224, 0, 0, 1)));
        assert_eq!(packet.protocol(), IpNumber::IGMP);
        assert_eq!(packet.hop_limit(), 1);
        assert_eq!(packet.len(), IGMP_HEADER_LEN);
    }

    #[test]
    fn icmpv6_probe_is_an_echo_request() {
        let packet = ProbePacket::icmpv6_echo_request().unwrap();
        assert_eq!(packet.kind(), ProbeKind::Icmpv6EchoRequest);
        assert_eq!(
            packet.destination(),
            "2001:0db8:85a3:0000:0000:8a2e:0370:7334"
                .parse::<IpAddr>()
                .unwrap()
        );
        assert_eq!(packet.protocol(), IpNumber::IPV6_ICMP);
        assert_eq!(packet.payload(), &[128, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn igmp_datagram_carries_ipv4_header() {
        let packet = ProbePacket::igmp();
        let source = Ipv4Addr::new(192, 168, 1, 10);
        let datagram = packet.datagram(IpAddr::V4(source)).unwrap();

        let sliced = SlicedPacket::from_ip(&datagram).unwrap();
        let Some(NetSlice::Ipv4(ipv4)) = sliced.net else {
            panic!("expected an ipv4 datagram");
        };
        assert_eq!(ipv4.header().protocol(), IpNumber::IGMP);
        assert_eq!(ipv4.header().source_addr(), source);
        assert_eq!(ipv4.header().destination_addr(), IGMP_DESTINATION);
        assert_eq!(ipv4.header().ttl(), IGMP_TTL);

        let (header, _) = IgmpHeader::from_slice(ipv4.payload().payload).unwrap();
        assert_eq!(header, IgmpHeader::default());
    }

    #[test]
    fn icmpv6_datagram_carries_ipv6_header() {
        let packet = ProbePacket::icmpv6_echo_request().unwrap();
        let datagram = packet.datagram(IpAddr::V6(Ipv6Addr::LOCALHOST)).unwrap();

        let sliced = SlicedPacket::from_ip(&datagram).unwrap();
        let Some(NetSlice::Ipv6(ipv6)) = sliced.net else {
            panic!("expected an ipv6 datagram");
        };
        assert_eq!(ipv6.header().next_header(), IpNumber::IPV6_ICMP);
        assert_eq!(ipv6.header().destination_addr(), ICMPV6_DESTINATION);
        assert_eq!(ipv6.header().hop_limit(), ICMPV6_HOP_LIMIT);

        let icmpv6 = Icmpv6Slice::from_slice(ipv6.payload().payload).unwrap();
        let Icmpv6Type::EchoRequest(echo) = icmpv6.header().icmp_type else {
            panic!("expected an echo request");
        };
        assert_eq!(echo, IcmpEchoHeader { id: 0, seq: 0 });
        assert!(icmpv6.payload().is_empty());
    }

    #[test]
    fn datagram_rejects_mismatched_source() {
        let result = ProbePacket::igmp().datagram(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(matches!(
            result,
            Err(Error::AddressFamilyMismatch { .. })
        ));
    }
}

use super::IpProtocol;
use crate::core::error::{ParseError, ParseResult};
use std::net::Ipv4Addr;

const MIN_HEADER_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct Ipv4Packet<'a> {
    pub version: u8,
    pub header_length: usize,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    pub fn parse(data: &'a [u8]) -> ParseResult<Self> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(ParseError::truncated("IPv4", MIN_HEADER_SIZE, data.len()));
        }

        let version = (data[0] >> 4) & 0xf;
        if version != 4 {
            return Err(ParseError::InvalidField {
                layer: "IPv4",
                field: "version",
                value: version as u32,
            });
        }

        let ihl = (data[0] & 0xf) as usize;
        let header_length = ihl * 4;
        if header_length < MIN_HEADER_SIZE {
            return Err(ParseError::LengthMismatch {
                layer: "IPv4",
                field: "ihl",
                value: ihl,
            });
        }
        if header_length > data.len() {
            return Err(ParseError::truncated("IPv4", header_length, data.len()));
        }

        let total_length = u16::from_be_bytes([data[2], data[3]]);
        if (total_length as usize) < header_length {
            return Err(ParseError::LengthMismatch {
                layer: "IPv4",
                field: "total_length",
                value: total_length as usize,
            });
        }

        // 実際にキャプチャされた長さで切り詰める
        let end = (total_length as usize).min(data.len());

        Ok(Self {
            version,
            header_length,
            total_length,
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags: (data[6] >> 5) & 0x7,
            fragment_offset: u16::from_be_bytes([data[6] & 0x1f, data[7]]),
            ttl: data[8],
            protocol: IpProtocol::from(data[9]),
            source: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            destination: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            payload: &data[header_length..end],
        })
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn more_fragments(&self) -> bool {
        self.flags & 0x1 != 0
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(total_length: u16, protocol: u8) -> Vec<u8> {
        let mut data = vec![0x45, 0x00];
        data.extend_from_slice(&total_length.to_be_bytes());
        data.extend_from_slice(&[0x12, 0x34, 0x40, 0x00, 64, protocol, 0x00, 0x00]);
        data.extend_from_slice(&[192, 168, 0, 10]);
        data.extend_from_slice(&[10, 0, 0, 1]);
        data
    }

    #[test]
    fn parse_header_fields() {
        let mut data = header(24, 6);
        data.extend_from_slice(&[1, 2, 3, 4]);

        let packet = Ipv4Packet::parse(&data).unwrap();
        assert_eq!(packet.protocol, IpProtocol::Tcp);
        assert_eq!(packet.header_length, 20);
        assert_eq!(packet.source, Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(packet.destination, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.payload(), &[1, 2, 3, 4]);
        assert!(!packet.is_fragment());
    }

    #[test]
    fn payload_excludes_ethernet_padding() {
        let mut data = header(22, 6);
        data.extend_from_slice(&[1, 2, 0, 0, 0, 0]);

        let packet = Ipv4Packet::parse(&data).unwrap();
        assert_eq!(packet.payload(), &[1, 2]);
    }

    #[test]
    fn payload_is_clamped_to_capture() {
        let mut data = header(1500, 6);
        data.extend_from_slice(&[9; 8]);

        let packet = Ipv4Packet::parse(&data).unwrap();
        assert_eq!(packet.payload_size(), 8);
    }

    #[test]
    fn total_length_smaller_than_header_fails() {
        let data = header(10, 6);
        assert!(matches!(
            Ipv4Packet::parse(&data),
            Err(ParseError::LengthMismatch { field: "total_length", .. })
        ));
    }

    #[test]
    fn ihl_past_capture_fails() {
        let mut data = header(60, 6);
        data[0] = 0x4f;
        assert!(matches!(Ipv4Packet::parse(&data), Err(ParseError::Truncated { needed: 60, .. })));
    }

    #[test]
    fn wrong_version_fails() {
        let mut data = header(20, 6);
        data[0] = 0x65;
        assert!(matches!(
            Ipv4Packet::parse(&data),
            Err(ParseError::InvalidField { field: "version", value: 6, .. })
        ));
    }
}

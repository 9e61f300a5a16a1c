use super::EtherType;
use crate::core::error::{ParseError, ParseResult};
use pnet::util::MacAddr;

const HEADER_SIZE: usize = 14;
const VLAN_TAG_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct EthernetFrame<'a> {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: EtherType,
    pub vlan_id: Option<u16>,
    payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub fn parse(data: &'a [u8]) -> ParseResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::truncated("Ethernet", HEADER_SIZE, data.len()));
        }

        let destination = mac_at(data, 0);
        let source = mac_at(data, 6);
        let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
        let mut offset = HEADER_SIZE;
        let mut vlan_id = None;

        // 802.1Qタグは1段だけ剥がす
        if EtherType::from(ethertype) == EtherType::Vlan {
            if data.len() < HEADER_SIZE + VLAN_TAG_SIZE {
                return Err(ParseError::truncated(
                    "Ethernet",
                    HEADER_SIZE + VLAN_TAG_SIZE,
                    data.len(),
                ));
            }
            vlan_id = Some(u16::from_be_bytes([data[14], data[15]]) & 0x0fff);
            ethertype = u16::from_be_bytes([data[16], data[17]]);
            offset += VLAN_TAG_SIZE;
        }

        Ok(Self {
            destination,
            source,
            ethertype: EtherType::from(ethertype),
            vlan_id,
            payload: &data[offset..],
        })
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_ipv4(&self) -> bool {
        self.ethertype == EtherType::Ipv4
    }
}

fn mac_at(data: &[u8], at: usize) -> MacAddr {
    MacAddr::new(
        data[at],
        data[at + 1],
        data[at + 2],
        data[at + 3],
        data[at + 4],
        data[at + 5],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ethertype: u16) -> Vec<u8> {
        let mut frame = vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame
    }

    #[test]
    fn parse_ipv4_frame() {
        let mut data = header(0x0800);
        data.extend_from_slice(&[0x45, 0x00]);

        let frame = EthernetFrame::parse(&data).unwrap();
        assert!(frame.is_ipv4());
        assert_eq!(frame.destination, MacAddr::new(0xff, 0xff, 0xff, 0xff, 0xff, 0xff));
        assert_eq!(frame.source, MacAddr::new(0x02, 0, 0, 0, 0, 0x01));
        assert_eq!(frame.payload(), &[0x45, 0x00]);
        assert_eq!(frame.vlan_id, None);
    }

    #[test]
    fn vlan_tag_is_skipped() {
        let mut data = header(0x8100);
        data.extend_from_slice(&[0x00, 0x64, 0x08, 0x00, 0x45]);

        let frame = EthernetFrame::parse(&data).unwrap();
        assert_eq!(frame.vlan_id, Some(100));
        assert_eq!(frame.ethertype, EtherType::Ipv4);
        assert_eq!(frame.payload_size(), 1);
    }

    #[test]
    fn short_frame_is_structural_error() {
        let error = EthernetFrame::parse(&[0u8; 13]).unwrap_err();
        assert_eq!(error, ParseError::truncated("Ethernet", 14, 13));
    }
}

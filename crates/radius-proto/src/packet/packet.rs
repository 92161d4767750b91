use super::Code;
use crate::attributes::{decode_attributes, Attribute, AttributeType};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Fixed 20-byte header shared by every RADIUS packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw code byte; may not map to a known [`Code`]
    pub code: u8,
    pub identifier: u8,
    /// Length declared in the header, including the header itself
    pub length: usize,
    pub authenticator: [u8; 16],
}

impl PacketHeader {
    /// Read the header from the first 20 bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Packet::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        Ok(PacketHeader {
            code: data[0],
            identifier: data[1],
            length: u16::from_be_bytes([data[2], data[3]]) as usize,
            authenticator,
        })
    }

    pub fn known_code(&self) -> Option<Code> {
        Code::from_u8(self.code)
    }
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                         Authenticator                         |
/// |                                                               |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type (1 byte)
    pub code: Code,
    /// Packet identifier for matching requests/responses (1 byte)
    pub identifier: u8,
    /// Request or Response Authenticator (16 bytes)
    pub authenticator: [u8; 16],
    /// List of attributes
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// Minimum RADIUS packet size (20 bytes: 1 code + 1 id + 2 length + 16 authenticator)
    pub const MIN_PACKET_SIZE: usize = 20;
    /// Maximum RADIUS packet size (4096 bytes as per RFC 2865)
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            attr.encode_into(&mut buffer);
        }

        Ok(buffer)
    }

    /// Decode packet from bytes.
    ///
    /// Octets past the declared length are padding and ignored. Malformed
    /// attribute entries are tolerated as described on [`decode_attributes`].
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::parse(data)?;
        let code = header
            .known_code()
            .ok_or(PacketError::InvalidCode(header.code))?;

        if header.length < Self::MIN_PACKET_SIZE || header.length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::InvalidLength(header.length));
        }

        if data.len() < header.length {
            return Err(PacketError::InvalidLength(data.len()));
        }

        Ok(Packet {
            code,
            identifier: header.identifier,
            authenticator: header.authenticator,
            attributes: decode_attributes(&data[..header.length], Self::MIN_PACKET_SIZE),
        })
    }

    /// Get the length of the encoded packet
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(attr_type))
    }

    /// Find all attributes by type
    pub fn find_all_attributes(&self, attr_type: AttributeType) -> Vec<&Attribute> {
        self.attributes.iter().filter(|a| a.is(attr_type)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_encode_decode() {
        let mut packet = Packet::new(Code::AccountingRequest, 42, [1u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
        let encoded = packet.encode().unwrap();
        assert_eq!(encoded.len(), 27);

        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_packet_min_size() {
        let data = vec![0u8; 19];
        assert_eq!(
            PacketHeader::parse(&data),
            Err(PacketError::InvalidLength(19))
        );
        assert!(Packet::decode(&data).is_err());
    }

    #[test]
    fn test_header_fields() {
        let mut data = vec![4u8, 0x10, 0x00, 0x14];
        data.extend_from_slice(&[7u8; 16]);
        let header = PacketHeader::parse(&data).unwrap();
        assert_eq!(header.known_code(), Some(Code::AccountingRequest));
        assert_eq!(header.identifier, 0x10);
        assert_eq!(header.length, 20);
        assert_eq!(header.authenticator, [7u8; 16]);
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let packet = Packet::new(Code::AccountingResponse, 9, [0u8; 16]);
        let mut encoded = packet.encode().unwrap();
        encoded.extend_from_slice(&[1, 6, b'x']);
        let decoded = Packet::decode(&encoded).unwrap();
        assert!(decoded.attributes.is_empty());
    }

    #[test]
    fn test_declared_length_beyond_datagram() {
        let mut data = vec![4u8, 1, 0x00, 0x30];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(Packet::decode(&data), Err(PacketError::InvalidLength(20)));
    }

    #[test]
    fn test_unknown_code() {
        let mut data = vec![99u8, 1, 0x00, 0x14];
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(Packet::decode(&data), Err(PacketError::InvalidCode(99)));
    }
}

use super::types::{datatype_for, AttributeDatatype, AttributeType};
use crate::packet::PacketError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Interpreted attribute value. Which variant is produced depends only on the
/// attribute type and the length of the raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Zero-length value, or an entry whose declared length was malformed
    Empty,
    String(String),
    Integer(u32),
    Ip(IpAddr),
    Bytes(Vec<u8>),
}

impl AttributeValue {
    /// Interpret raw octets according to the datatype table.
    ///
    /// Values whose length does not fit the datatype (a 3-octet Integer, a
    /// 5-octet address) fall back to `Bytes` instead of failing the packet.
    pub fn decode(attr_type: u8, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return AttributeValue::Empty;
        }

        match datatype_for(attr_type) {
            AttributeDatatype::String => {
                AttributeValue::String(String::from_utf8_lossy(raw).into_owned())
            }
            AttributeDatatype::Integer => match <[u8; 4]>::try_from(raw) {
                Ok(bytes) => AttributeValue::Integer(u32::from_be_bytes(bytes)),
                Err(_) => AttributeValue::Bytes(raw.to_vec()),
            },
            AttributeDatatype::Ip => {
                if let Ok(octets) = <[u8; 4]>::try_from(raw) {
                    AttributeValue::Ip(IpAddr::V4(Ipv4Addr::from(octets)))
                } else if let Ok(octets) = <[u8; 16]>::try_from(raw) {
                    AttributeValue::Ip(IpAddr::V6(Ipv6Addr::from(octets)))
                } else {
                    AttributeValue::Bytes(raw.to_vec())
                }
            }
            AttributeDatatype::ByteArray | AttributeDatatype::EncryptedString => {
                AttributeValue::Bytes(raw.to_vec())
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Empty => f.write_str("<empty>"),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Ip(ip) => write!(f, "{}", ip),
            AttributeValue::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Immutable once built: the raw octets and their decoded form always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    attr_type: u8,
    raw: Vec<u8>,
    value: AttributeValue,
}

impl Attribute {
    /// Minimum attribute length (type + length fields = 2 bytes)
    pub const MIN_LENGTH: usize = 2;
    /// Maximum attribute length (255 bytes including type and length)
    pub const MAX_LENGTH: usize = 255;
    /// Maximum value length (253 bytes)
    pub const MAX_VALUE_LENGTH: usize = 253;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Attribute value too long: {} bytes (max {})",
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Self::from_wire(attr_type, value))
    }

    /// Build from octets already bounded by the one-byte length field
    pub(crate) fn from_wire(attr_type: u8, raw: Vec<u8>) -> Self {
        let value = AttributeValue::decode(attr_type, &raw);
        Attribute {
            attr_type,
            raw,
            value,
        }
    }

    /// Attribute with no value (malformed or zero-length on the wire)
    pub fn empty(attr_type: u8) -> Self {
        Attribute {
            attr_type,
            raw: Vec::new(),
            value: AttributeValue::Empty,
        }
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: u8, value: u32) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Create an IPv4 address attribute
    pub fn ipv4(attr_type: u8, value: Ipv4Addr) -> Result<Self, PacketError> {
        Self::new(attr_type, value.octets().to_vec())
    }

    /// Create an IPv6 address attribute
    pub fn ipv6(attr_type: u8, value: Ipv6Addr) -> Result<Self, PacketError> {
        Self::new(attr_type, value.octets().to_vec())
    }

    pub fn attr_type(&self) -> u8 {
        self.attr_type
    }

    /// Known type, if the code is in the dictionary
    pub fn known_type(&self) -> Option<AttributeType> {
        AttributeType::from_u8(self.attr_type)
    }

    pub fn is(&self, attr_type: AttributeType) -> bool {
        self.attr_type == attr_type.as_u8()
    }

    /// Raw value octets as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.value, AttributeValue::Empty)
    }

    pub fn as_string(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self.value {
            AttributeValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self.value {
            AttributeValue::Ip(ip) => Some(ip),
            _ => None,
        }
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        Self::MIN_LENGTH + self.raw.len()
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_into(&mut buffer);
        buffer
    }

    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.attr_type);
        // new() caps the value at 253 bytes, so this always fits in a u8
        buffer.push(self.encoded_length() as u8);
        buffer.extend_from_slice(&self.raw);
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known_type() {
            Some(t) => write!(f, "{}: {}", t.name(), self.value),
            None => write!(f, "Attribute-{}: {}", self.attr_type, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_attribute() {
        let attr = Attribute::string(AttributeType::UserName.as_u8(), "testuser").unwrap();
        assert_eq!(attr.attr_type(), 1);
        assert_eq!(attr.as_string(), Some("testuser"));
    }

    #[test]
    fn test_integer_attribute_is_big_endian() {
        let attr = Attribute::new(AttributeType::AcctStatusType.as_u8(), vec![0, 0, 0, 2]).unwrap();
        assert_eq!(attr.as_integer(), Some(2));

        let attr = Attribute::integer(AttributeType::AcctSessionTime.as_u8(), 0x01020304).unwrap();
        assert_eq!(attr.raw(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_ip_attributes() {
        let v4 = Attribute::ipv4(AttributeType::FramedIpAddress.as_u8(), Ipv4Addr::new(10, 0, 0, 5))
            .unwrap();
        assert_eq!(v4.as_ip(), Some("10.0.0.5".parse().unwrap()));

        let v6 = Attribute::ipv6(
            AttributeType::FramedIpv6Address.as_u8(),
            "2001:db8::1".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(v6.as_ip(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_mismatched_length_falls_back_to_bytes() {
        let attr = Attribute::new(AttributeType::AcctStatusType.as_u8(), vec![1, 2, 3]).unwrap();
        assert_eq!(attr.value(), &AttributeValue::Bytes(vec![1, 2, 3]));

        let attr = Attribute::new(AttributeType::FramedIpAddress.as_u8(), vec![1; 5]).unwrap();
        assert_eq!(attr.as_ip(), None);
    }

    #[test]
    fn test_user_password_is_never_decoded() {
        let attr = Attribute::new(AttributeType::UserPassword.as_u8(), b"secret".to_vec()).unwrap();
        assert_eq!(attr.value(), &AttributeValue::Bytes(b"secret".to_vec()));
    }

    #[test]
    fn test_max_value_length() {
        let value = vec![0u8; 254];
        assert!(Attribute::new(1, value).is_err());
    }

    #[test]
    fn test_display_uses_dictionary_name() {
        let attr = Attribute::integer(AttributeType::AcctStatusType.as_u8(), 1).unwrap();
        assert_eq!(attr.to_string(), "Acct-Status-Type: 1");

        let attr = Attribute::new(200, vec![0xab]).unwrap();
        assert_eq!(attr.to_string(), "Attribute-200: 0xab");
    }
}

//! RADIUS attribute (AVP) streams
//!
//! Attributes follow the 20-byte packet header as a sequence of
//! `[type:1][length:1][value:length-2]` entries.

mod attribute;
mod types;

pub use attribute::{Attribute, AttributeValue};
pub use types::{datatype_for, AttributeDatatype, AttributeType};

/// Decode every attribute in `data` starting at `offset`.
///
/// Decoding stops once fewer than two bytes remain. An entry whose declared
/// length is shorter than its own header, or would run past the end of the
/// buffer, is kept as an empty attribute and decoding resumes two bytes
/// later. Attributes decoded before such an entry are unaffected.
pub fn decode_attributes(data: &[u8], offset: usize) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let mut index = offset;

    while index + Attribute::MIN_LENGTH <= data.len() {
        let attr_type = data[index];
        let length = data[index + 1] as usize;

        if length > Attribute::MIN_LENGTH && index + length <= data.len() {
            let raw = data[index + Attribute::MIN_LENGTH..index + length].to_vec();
            attributes.push(Attribute::from_wire(attr_type, raw));
            index += length;
        } else {
            attributes.push(Attribute::empty(attr_type));
            index += Attribute::MIN_LENGTH;
        }
    }

    attributes
}

/// Encode a sequence of attributes back to wire format
pub fn encode_attributes(attributes: &[Attribute]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(attributes.iter().map(Attribute::encoded_length).sum());
    for attr in attributes {
        attr.encode_into(&mut buffer);
    }
    buffer
}

/// Bytes an attribute contributes to an Accounting-Response.
///
/// Only Proxy-State is echoed back (RFC 2866 Section 4.2), verbatim.
pub fn encode_response_attribute(attr: &Attribute) -> Vec<u8> {
    if attr.is(AttributeType::ProxyState) {
        attr.encode()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_attributes() -> Vec<Attribute> {
        vec![
            Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap(),
            Attribute::integer(AttributeType::AcctStatusType.as_u8(), 1).unwrap(),
            Attribute::ipv4(AttributeType::FramedIpAddress.as_u8(), Ipv4Addr::new(10, 0, 0, 5))
                .unwrap(),
            Attribute::ipv6(
                AttributeType::FramedIpv6Address.as_u8(),
                "fd00::5".parse().unwrap(),
            )
            .unwrap(),
            Attribute::new(AttributeType::Class.as_u8(), vec![0xde, 0xad]).unwrap(),
            Attribute::new(AttributeType::ProxyState.as_u8(), b"proxy-1".to_vec()).unwrap(),
            Attribute::new(250, vec![1, 2, 3]).unwrap(),
        ]
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let attrs = sample_attributes();
        let encoded = encode_attributes(&attrs);
        assert_eq!(decode_attributes(&encoded, 0), attrs);
    }

    #[test]
    fn test_decode_honours_offset() {
        let mut data = vec![0xffu8; 20];
        data.extend(encode_attributes(&sample_attributes()[..1]));
        let decoded = decode_attributes(&data, 20);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_string(), Some("alice"));
    }

    #[test]
    fn test_overrunning_length_is_empty_and_advances_two() {
        let mut data = encode_attributes(&sample_attributes()[..2]);
        // User-Name claiming 40 bytes with only 3 following
        data.extend_from_slice(&[1, 40, b'b', b'o', b'b']);

        let decoded = decode_attributes(&data, 0);
        assert_eq!(&decoded[..2], &sample_attributes()[..2]);
        assert!(decoded[2].is(AttributeType::UserName));
        assert!(decoded[2].is_empty());
        // 'b','o' is then read as type 98 with length 111, which overruns too
        assert_eq!(decoded[3].attr_type(), b'b');
        assert!(decoded[3].is_empty());
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn test_zero_length_does_not_loop() {
        let data = [1u8, 0, 1, 1, 44];
        let decoded = decode_attributes(&data, 0);
        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().all(Attribute::is_empty));
    }

    #[test]
    fn test_single_trailing_byte_is_ignored() {
        let mut data = encode_attributes(&sample_attributes()[..1]);
        data.push(7);
        assert_eq!(decode_attributes(&data, 0).len(), 1);
    }

    #[test]
    fn test_only_proxy_state_is_echoed() {
        for attr in sample_attributes() {
            let echoed = encode_response_attribute(&attr);
            if attr.is(AttributeType::ProxyState) {
                assert_eq!(echoed, [&[33u8, 9][..], b"proxy-1"].concat());
            } else {
                assert!(echoed.is_empty());
            }
        }
    }
}

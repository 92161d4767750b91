//! RADIUS Accounting Protocol Support (RFC 2866)
//!
//! Accounting-Request packets carry session start/stop notifications from a
//! NAS. Every authenticated request is acknowledged with an
//! Accounting-Response that echoes any Proxy-State attributes.
//!
//! # Accounting Status Types
//!
//! - **Start**: Session has started (e.g., user logged in)
//! - **Stop**: Session has ended (e.g., user logged out)
//! - **Interim-Update**: Periodic update during an active session
//! - **Accounting-On**: NAS is now ready to accept requests
//! - **Accounting-Off**: NAS is shutting down
//!
//! # Example
//!
//! ```rust
//! use radius_proto::accounting::{build_accounting_response, AcctStatusType};
//! use radius_proto::auth::verify_accounting_response;
//!
//! assert_eq!(AcctStatusType::from_u32(2), Some(AcctStatusType::Stop));
//!
//! let request_auth = [0x11u8; 16];
//! let response = build_accounting_response(42, &request_auth, &[], b"secret");
//! assert_eq!(response.len(), 20);
//! assert!(verify_accounting_response(&response, &request_auth, b"secret"));
//! ```

use crate::attributes::{encode_response_attribute, Attribute};
use crate::auth::sign_accounting_response;
use crate::packet::{Code, Packet};

/// Accounting Status-Type values (RFC 2866 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctStatusType {
    /// Start (1) - Session has begun
    Start = 1,
    /// Stop (2) - Session has ended
    Stop = 2,
    /// Interim-Update (3) - Periodic update during session
    InterimUpdate = 3,
    /// Accounting-On (7) - NAS is ready
    AccountingOn = 7,
    /// Accounting-Off (8) - NAS is shutting down
    AccountingOff = 8,
}

impl AcctStatusType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AcctStatusType::Start),
            2 => Some(AcctStatusType::Stop),
            3 => Some(AcctStatusType::InterimUpdate),
            7 => Some(AcctStatusType::AccountingOn),
            8 => Some(AcctStatusType::AccountingOff),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Start and Interim-Update both mean the session is live
    pub fn is_session_active(self) -> bool {
        matches!(self, AcctStatusType::Start | AcctStatusType::InterimUpdate)
    }
}

/// Build a signed Accounting-Response for a request
///
/// The response reuses the request identifier and carries only the echoed
/// Proxy-State attributes, in their original order.
pub fn build_accounting_response(
    identifier: u8,
    request_authenticator: &[u8; 16],
    request_attributes: &[Attribute],
    secret: &[u8],
) -> Vec<u8> {
    let echoed: Vec<u8> = request_attributes
        .iter()
        .flat_map(encode_response_attribute)
        .collect();

    let length = Packet::MIN_PACKET_SIZE + echoed.len();
    let mut response = Vec::with_capacity(length);
    response.push(Code::AccountingResponse.as_u8());
    response.push(identifier);
    response.extend_from_slice(&(length as u16).to_be_bytes());
    response.extend_from_slice(request_authenticator);
    response.extend_from_slice(&echoed);

    sign_accounting_response(&mut response, secret);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeType;
    use crate::auth::verify_accounting_response;

    #[test]
    fn test_acct_status_type_conversion() {
        assert_eq!(AcctStatusType::Start.as_u32(), 1);
        assert_eq!(AcctStatusType::AccountingOff.as_u32(), 8);
        assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
        assert_eq!(AcctStatusType::from_u32(99), None);

        assert!(AcctStatusType::Start.is_session_active());
        assert!(AcctStatusType::InterimUpdate.is_session_active());
        assert!(!AcctStatusType::Stop.is_session_active());
    }

    #[test]
    fn test_empty_request_gets_twenty_byte_response() {
        let request_auth = [0xabu8; 16];
        let response = build_accounting_response(0x33, &request_auth, &[], b"secret");

        assert_eq!(response.len(), 20);
        assert_eq!(response[0], 5);
        assert_eq!(response[1], 0x33);
        assert_eq!(&response[2..4], &[0, 20]);

        let mut expected = vec![5u8, 0x33, 0, 20];
        expected.extend_from_slice(&request_auth);
        expected.extend_from_slice(b"secret");
        assert_eq!(&response[4..20], &md5::compute(&expected).0[..]);
    }

    #[test]
    fn test_proxy_state_is_echoed_in_order() {
        let attrs = vec![
            Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap(),
            Attribute::new(AttributeType::ProxyState.as_u8(), b"one".to_vec()).unwrap(),
            Attribute::integer(AttributeType::AcctStatusType.as_u8(), 1).unwrap(),
            Attribute::new(AttributeType::ProxyState.as_u8(), b"two".to_vec()).unwrap(),
        ];
        let request_auth = [1u8; 16];
        let response = build_accounting_response(1, &request_auth, &attrs, b"s");

        assert_eq!(response.len(), 30);
        assert_eq!(&response[20..], &[33, 5, b'o', b'n', b'e', 33, 5, b't', b'w', b'o']);
        assert!(verify_accounting_response(&response, &request_auth, b"s"));
    }
}

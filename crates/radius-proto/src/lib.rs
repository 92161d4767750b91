//! RADIUS Accounting Protocol Implementation
//!
//! This crate provides the wire codec and authenticator computation for
//! RADIUS accounting as defined in RFC 2865 and RFC 2866.
//!
//! # Features
//!
//! - Packet header parsing and full packet encoding
//! - Tolerant attribute decoding driven by the RFC datatype table
//! - Accounting-Request verification and Accounting-Response signing
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::{sign_accounting_request, verify_accounting_request};
//!
//! let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
//! packet.add_attribute(
//!     Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap()
//! );
//! packet.add_attribute(
//!     Attribute::integer(AttributeType::AcctStatusType.as_u8(), 1).unwrap()
//! );
//!
//! let mut bytes = packet.encode().unwrap();
//! sign_accounting_request(&mut bytes, b"secret");
//! assert!(verify_accounting_request(&bytes, b"secret"));
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod packet;

pub use accounting::{build_accounting_response, AcctStatusType};
pub use attributes::{
    decode_attributes, encode_attributes, encode_response_attribute, Attribute, AttributeType,
    AttributeValue,
};
pub use auth::{
    calculate_accounting_request_authenticator, sign_accounting_request,
    verify_accounting_request, verify_accounting_response,
};
pub use packet::{Code, Packet, PacketError, PacketHeader};

use radius_proto::{AcctStatusType, Attribute, AttributeType};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("The {0} attribute was not present")]
    MissingAttribute(&'static str),
}

/// An authenticated Accounting-Request waiting to be batched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingEvent {
    source: IpAddr,
    attributes: Vec<Attribute>,
}

impl AccountingEvent {
    pub fn new(source: IpAddr, attributes: Vec<Attribute>) -> Self {
        AccountingEvent { source, attributes }
    }

    /// Address of the NAS that sent the request
    pub fn source(&self) -> IpAddr {
        self.source
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    fn first(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(attr_type))
    }

    /// Raw Acct-Status-Type, if present with a 4-octet value
    pub fn status_type(&self) -> Option<u32> {
        self.first(AttributeType::AcctStatusType)
            .and_then(Attribute::as_integer)
    }

    pub fn known_status(&self) -> Option<AcctStatusType> {
        self.status_type().and_then(AcctStatusType::from_u32)
    }

    pub fn username(&self) -> Option<&str> {
        self.first(AttributeType::UserName)
            .and_then(Attribute::as_string)
            .filter(|name| !name.is_empty())
    }

    /// Every Framed-IP-Address and Framed-IPv6-Address, IPv4 first
    pub fn framed_addresses(&self) -> Vec<IpAddr> {
        let v4 = self
            .attributes
            .iter()
            .filter(|a| a.is(AttributeType::FramedIpAddress));
        let v6 = self
            .attributes
            .iter()
            .filter(|a| a.is(AttributeType::FramedIpv6Address));

        v4.chain(v6).filter_map(Attribute::as_ip).collect()
    }

    /// Check the event carries what a User-ID mapping needs
    pub fn validate(&self) -> Result<(u32, &str), EventError> {
        let status = self
            .status_type()
            .ok_or(EventError::MissingAttribute("Acct-Status-Type"))?;
        let username = self
            .username()
            .ok_or(EventError::MissingAttribute("User-Name"))?;
        Ok((status, username))
    }
}

impl fmt::Display for AccountingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source IP: {}", self.source)?;
        for attr in &self.attributes {
            write!(f, "; {}", attr)?;
        }
        Ok(())
    }
}

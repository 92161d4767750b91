use crate::packet::Packet;

const AUTHENTICATOR_RANGE: std::ops::Range<usize> = 4..20;

fn digest(parts: &[&[u8]]) -> [u8; 16] {
    let mut context = md5::Context::new();
    for part in parts {
        context.consume(part);
    }
    context.compute().0
}

/// Calculate the Request Authenticator of an Accounting-Request per RFC 2866 Section 3
///
/// Request Authenticator = MD5(Code + ID + Length + 16 zero octets + Attributes + Secret)
///
/// `packet` holds the encoded request. Its current authenticator bytes are
/// ignored, and octets past the declared length are not hashed.
pub fn calculate_accounting_request_authenticator(packet: &[u8], secret: &[u8]) -> [u8; 16] {
    if packet.len() < Packet::MIN_PACKET_SIZE {
        return digest(&[packet, secret]);
    }

    let declared = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    let end = declared.clamp(Packet::MIN_PACKET_SIZE, packet.len());

    digest(&[&packet[..4], &[0u8; 16], &packet[Packet::MIN_PACKET_SIZE..end], secret])
}

/// Write the Request Authenticator into bytes 4..20 of an encoded request
pub fn sign_accounting_request(packet: &mut [u8], secret: &[u8]) {
    if packet.len() < Packet::MIN_PACKET_SIZE {
        return;
    }
    let authenticator = calculate_accounting_request_authenticator(packet, secret);
    packet[AUTHENTICATOR_RANGE].copy_from_slice(&authenticator);
}

/// Verify the Request Authenticator of a received Accounting-Request
pub fn verify_accounting_request(packet: &[u8], secret: &[u8]) -> bool {
    if packet.len() < Packet::MIN_PACKET_SIZE {
        return false;
    }
    calculate_accounting_request_authenticator(packet, secret)[..] == packet[AUTHENTICATOR_RANGE]
}

/// Sign an Accounting-Response in place
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// The caller must already have placed the request's authenticator in
/// bytes 4..20; the digest of the whole buffer then replaces it.
pub fn sign_accounting_response(response: &mut [u8], secret: &[u8]) {
    if response.len() < Packet::MIN_PACKET_SIZE {
        return;
    }
    let authenticator = digest(&[response, secret]);
    response[AUTHENTICATOR_RANGE].copy_from_slice(&authenticator);
}

/// Verify the Response Authenticator of an Accounting-Response
pub fn verify_accounting_response(
    response: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    if response.len() < Packet::MIN_PACKET_SIZE {
        return false;
    }
    let calculated = digest(&[
        &response[..4],
        request_authenticator,
        &response[Packet::MIN_PACKET_SIZE..],
        secret,
    ]);
    calculated[..] == response[AUTHENTICATOR_RANGE]
}

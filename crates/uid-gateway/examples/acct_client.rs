use radius_proto::{
    auth::{sign_accounting_request, verify_accounting_response},
    AcctStatusType, Attribute, AttributeType, Code, Packet,
};
use std::net::{IpAddr, UdpSocket};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 5 {
        eprintln!(
            "Usage: {} <start|stop|interim> <username> <framed_ip> <secret> [server_addr]",
            args[0]
        );
        eprintln!(
            "Example: {} start CORP\\\\alice 10.0.0.5 testing123 127.0.0.1:1813",
            args[0]
        );
        std::process::exit(1);
    }

    let status = match args[1].as_str() {
        "start" => AcctStatusType::Start,
        "stop" => AcctStatusType::Stop,
        "interim" => AcctStatusType::InterimUpdate,
        other => return Err(format!("unknown status type: {}", other).into()),
    };
    let username = &args[2];
    let framed_ip: IpAddr = args[3].parse()?;
    let secret = args[4].as_bytes();
    let server_addr = args.get(5).map(|s| s.as_str()).unwrap_or("127.0.0.1:1813");

    println!("RADIUS Accounting Client Test");
    println!("=============================");
    println!("Server: {}", server_addr);
    println!("Status: {:?}", status);
    println!("Username: {}", username);
    println!("Framed address: {}", framed_ip);
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(server_addr)?;

    // The authenticator is computed over the encoded packet
    let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
    packet.add_attribute(Attribute::integer(
        AttributeType::AcctStatusType.as_u8(),
        status.as_u32(),
    )?);
    packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), username.as_str())?);
    packet.add_attribute(match framed_ip {
        IpAddr::V4(v4) => Attribute::ipv4(AttributeType::FramedIpAddress.as_u8(), v4)?,
        IpAddr::V6(v6) => Attribute::ipv6(AttributeType::FramedIpv6Address.as_u8(), v6)?,
    });
    packet.add_attribute(Attribute::new(AttributeType::ProxyState.as_u8(), b"demo".to_vec())?);

    let mut request_data = packet.encode()?;
    sign_accounting_request(&mut request_data, secret);
    let mut request_auth = [0u8; 16];
    request_auth.copy_from_slice(&request_data[4..20]);

    println!("Sending Accounting-Request ({} bytes)...", request_data.len());
    socket.send(&request_data)?;

    let mut buffer = vec![0u8; Packet::MAX_PACKET_SIZE];
    socket.set_read_timeout(Some(std::time::Duration::from_secs(5)))?;

    match socket.recv(&mut buffer) {
        Ok(len) => {
            println!("Received response ({} bytes)", len);
            let response = &buffer[..len];
            let decoded = Packet::decode(response)?;

            if decoded.code != Code::AccountingResponse {
                println!("\n? Unexpected response: {:?}", decoded.code);
                return Ok(());
            }

            if verify_accounting_response(response, &request_auth, secret) {
                println!("\n✓ Accounting-Response verified");
            } else {
                println!("\n✗ Accounting-Response authenticator is invalid (check the secret)");
            }

            println!("\nResponse Details:");
            println!("  Identifier: {}", decoded.identifier);
            println!("  Attributes: {}", decoded.attributes.len());

            Ok(())
        }
        Err(e) => {
            eprintln!("\n✗ No response from gateway: {}", e);
            eprintln!("  Make sure the gateway is running on {} and lists this host as a client", server_addr);
            Err(e.into())
        }
    }
}

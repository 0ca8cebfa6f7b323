//! Small helpers shared across the harness.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use itkit_core::CommandResult;

/// The address other hosts would use to reach this machine.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the outbound interface. Falls back to loopback
/// when there is no route.
pub fn local_ip() -> IpAddr {
    fn probe() -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("10.255.255.255:1")?;
        Ok(socket.local_addr()?.ip())
    }

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::debug!("cannot determine local ip, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Echo a command line when command printing is on.
pub fn echo_command(enabled: bool, command: &str) {
    if enabled {
        println!("{command}");
    }
}

/// Echo a command's output when output printing is on.
pub fn echo_output(enabled: bool, result: &CommandResult) {
    if !enabled {
        return;
    }
    if let Some(command) = &result.command {
        println!("Command '{command}' results:");
    }
    println!("{}", result.out());
    println!("{}", result.err());
}

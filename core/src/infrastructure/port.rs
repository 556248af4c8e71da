//! Port allocator: finds an unused loopback TCP port by probing binds.

use std::net::{Ipv4Addr, TcpListener};

use log::debug;

use crate::error::ControlError;


/// Bind `preferred` on loopback; on failure try the next port up. The probe
/// listener is released before returning, so a later bind by another
/// process can still race us (see `Worker::start`).
///
/// `preferred == 0` asks the OS for any free port.
pub fn find_free_port(preferred: u16) -> Result<u16, ControlError> {
    let mut port = preferred;
    loop {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                let bound = listener
                    .local_addr()
                    .map_err(|e| ControlError::io("inspect probe listener", e))?
                    .port();
                drop(listener);
                return Ok(bound);
            }
            Err(e) => {
                debug!("port {} unavailable: {}", port, e);
                port = port.checked_add(1).ok_or_else(|| {
                    ControlError::runtime(
                        "port allocation",
                        format!("no free port at or above {}", preferred),
                    )
                })?;
            }
        }
    }
}

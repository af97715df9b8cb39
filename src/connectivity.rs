// Connectivity gate
//
// The daemon never assumes the network link exists: it asks the host for a
// connection before uploading and releases the request when idle so a
// metered modem can power down. Hosts with a permanent link use AlwaysUp.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::constants::CONNECTION_PROBE_INTERVAL;
use crate::error::{Result, UploaderError};

/// Host connectivity capability.
pub trait ConnectionGate {
    /// Signal that the daemon wants the link up. Counted, not blocking.
    fn request(&self);

    /// Withdraw the request made by `request`.
    fn release(&self);

    /// Block until the link is up. Each attempt waits at most `timeout`;
    /// failed attempts are retried every `retry_interval`, up to
    /// `max_retries` times before giving up with an error.
    fn wait_until_up(
        &self,
        timeout: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> Result<()>;
}

/// Gate for hosts with a permanent network link.
pub struct AlwaysUp;

impl ConnectionGate for AlwaysUp {
    fn request(&self) {}

    fn release(&self) {}

    fn wait_until_up(&self, _: Duration, _: Duration, _: u32) -> Result<()> {
        Ok(())
    }
}

/// Gate that decides link state by opening a TCP connection to a configured
/// address. The link manager on the host is expected to bring the interface
/// up on demand; this gate just observes whether it succeeded.
pub struct ProbeGate {
    probe_address: String,
}

impl ProbeGate {
    pub fn new(probe_address: String) -> Self {
        ProbeGate { probe_address }
    }

    fn probe(&self) -> bool {
        let addrs = match self.probe_address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("probe address {} did not resolve: {}", self.probe_address, e);
                return false;
            }
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, CONNECTION_PROBE_INTERVAL).is_ok() {
                return true;
            }
        }
        false
    }
}

impl ConnectionGate for ProbeGate {
    fn request(&self) {}

    fn release(&self) {}

    fn wait_until_up(
        &self,
        timeout: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> Result<()> {
        for attempt in 0..=max_retries {
            let deadline = Instant::now() + timeout;
            loop {
                if self.probe() {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(CONNECTION_PROBE_INTERVAL.min(deadline - Instant::now()));
            }
            if attempt < max_retries {
                log::warn!(
                    "connection still down, retrying in {}s",
                    retry_interval.as_secs()
                );
                std::thread::sleep(retry_interval);
            }
        }
        Err(UploaderError::Connectivity(format!(
            "no connection to {} after {} attempts",
            self.probe_address,
            max_retries + 1
        )))
    }
}

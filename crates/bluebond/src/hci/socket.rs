//! Raw Linux HCI socket
//!
//! The socket is the production [`CommandSender`] and event source. It is
//! polled from the owning context; nothing here spawns threads.

use crate::error::HciError;
use crate::hci::constants::HCI_EVENT_PKT;
use crate::hci::packet::{HciCommand, HciEvent};
use crate::hci::transport::CommandSender;
use log::trace;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

// Bluetooth socket constants
const AF_BLUETOOTH: i32 = 31;
const BTPROTO_HCI: i32 = 1;
const HCI_CHANNEL_RAW: u16 = 0;
const SOL_HCI: i32 = 0;
const HCI_FILTER: i32 = 2;

/// Represents an HCI socket
#[derive(Debug)]
pub struct HciSocket {
    fd: RawFd,
}

#[repr(C)]
struct SockaddrHci {
    hci_family: libc::sa_family_t,
    hci_dev: u16,
    hci_channel: u16,
}

#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciSocket {
    /// Opens a raw HCI socket bound to `dev_id` and subscribed to every event
    pub fn open(dev_id: u16) -> Result<Self, HciError> {
        let fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_RAW, BTPROTO_HCI) };

        if fd < 0 {
            return Err(HciError::SocketError(std::io::Error::last_os_error()));
        }

        let socket = HciSocket { fd };

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };

        let result = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(HciError::BindError(std::io::Error::last_os_error()));
        }

        let filter = HciFilter {
            type_mask: 1 << HCI_EVENT_PKT,
            event_mask: [u32::MAX, u32::MAX],
            opcode: 0,
        };

        let result = unsafe {
            libc::setsockopt(
                fd,
                SOL_HCI,
                HCI_FILTER,
                &filter as *const _ as *const libc::c_void,
                std::mem::size_of::<HciFilter>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(HciError::SocketError(std::io::Error::last_os_error()));
        }

        Ok(socket)
    }

    /// Read an HCI event from the socket
    pub fn read_event(&self) -> Result<HciEvent, HciError> {
        // Packet indicator plus the largest event
        let mut buffer = [0u8; 258];

        let bytes_read = unsafe {
            libc::read(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        };

        if bytes_read < 0 {
            return Err(HciError::ReceiveError(std::io::Error::last_os_error()));
        }

        let bytes_read = bytes_read as usize;
        if bytes_read < 3 || buffer[0] != HCI_EVENT_PKT {
            return Err(HciError::InvalidPacketFormat);
        }

        HciEvent::parse(&buffer[1..bytes_read]).ok_or(HciError::InvalidPacketFormat)
    }

    /// Waits up to `timeout` for an event; `Ok(None)` when nothing arrived
    pub fn poll_event(&self, timeout: Duration) -> Result<Option<HciEvent>, HciError> {
        let mut poll_fd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let result = unsafe { libc::poll(&mut poll_fd, 1, millis) };

        if result < 0 {
            return Err(HciError::ReceiveError(std::io::Error::last_os_error()));
        }

        if result == 0 {
            return Ok(None);
        }

        self.read_event().map(Some)
    }

    fn write_packet(&self, packet: &[u8]) -> Result<(), HciError> {
        match unsafe {
            libc::write(
                self.fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
            )
        } {
            -1 => Err(HciError::SendError(std::io::Error::last_os_error())),
            _ => Ok(()),
        }
    }
}

impl CommandSender for HciSocket {
    fn send_command(&self, command: HciCommand) -> Result<(), HciError> {
        trace!("HCI command 0x{:04x}", command.opcode());
        self.write_packet(&command.to_packet())
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for HciSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

// Transport Module - Serial connection to the display board
use std::io::Write;

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::protocol::READ_TIMEOUT;
use crate::types::BoardError;

/// Byte sink for encoded display messages. Writes are fire-and-forget:
/// the board sends no acknowledgement.
pub trait Transport: Send {
    /// Write the whole message and flush
    fn write_message(&mut self, msg: &[u8]) -> Result<(), BoardError>;

    fn name(&self) -> String;
}

pub struct SerialTransport {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` as 8-N-1 with a 1 second read timeout
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, BoardError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| BoardError::Transport(format!("Failed to open {}: {}", port_name, e)))?;

        info!("Opened serial port {} at {} baud", port_name, baud_rate);
        Ok(SerialTransport {
            port_name: port_name.to_string(),
            port,
        })
    }
}

impl Transport for SerialTransport {
    fn write_message(&mut self, msg: &[u8]) -> Result<(), BoardError> {
        self.port
            .write_all(msg)
            .and_then(|_| self.port.flush())
            .map_err(|e| BoardError::Transport(e.to_string()))?;
        debug!("Wrote {} bytes to {}", msg.len(), self.port_name);
        Ok(())
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>, BoardError> {
    let ports = serialport::available_ports()
        .map_err(|e| BoardError::Transport(format!("Failed to list serial ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BAUD_RATE;

    #[test]
    fn test_open_missing_port_is_transport_error() {
        let err = SerialTransport::open("/dev/does-not-exist-regatta", BAUD_RATE).err();
        assert!(matches!(err, Some(BoardError::Transport(_))));
    }

    #[test]
    fn test_recording_transport() {
        let mut t = testing::RecordingTransport::default();
        t.write_message(&[1, 2, 3]).unwrap();
        assert_eq!(t.messages(), vec![vec![1, 2, 3]]);
        let mut f = testing::RecordingTransport::failing();
        assert!(f.write_message(&[1]).is_err());
    }
}

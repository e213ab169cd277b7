//! # UWB Serial Communication
//!
//! This module provides the handle for the UWB ranging device's serial line:
//! connecting the port, pumping bytes into the framer, and resetting the
//! device via the DTR line.

use crate::constants::{RESET_PULSE_MILLIS, SERIAL_BAUD_RATE};
use crate::error::UwbBridgeError;
use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Command written after a reset to start the device's measurement stream.
const START_COMMAND: &[u8] = &[0xDC, 0xAC, 0x01, 0x00, b's'];

/// Handle to the UWB device's serial connection.
///
/// The line runs at 115200 baud, 8N1, no flow control. DTR is held low in
/// normal operation; pulsing it high for at least 100 ms resets the device.
pub struct UwbSerialHandle {
    port: tokio_serial::SerialStream,
    read_timeout: Duration,
}

impl UwbSerialHandle {
    /// Open the serial port and settle DTR low.
    pub async fn connect(port_name: &str) -> Result<UwbSerialHandle, UwbBridgeError> {
        let mut port = tokio_serial::new(port_name, SERIAL_BAUD_RATE)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))?;

        port.write_data_terminal_ready(false)
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))?;

        info!("Serial connection established: {port_name}");
        Ok(UwbSerialHandle {
            port,
            read_timeout: Duration::from_millis(100),
        })
    }

    /// Read whatever bytes are available into `buf`.
    ///
    /// Returns `Ok(0)` when the poll timeout elapses with no data; the caller
    /// treats that as an idle tick, not an error.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, UwbBridgeError> {
        match timeout(self.read_timeout, self.port.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(UwbBridgeError::SerialPortError(e.to_string())),
            Err(_) => Ok(0),
        }
    }

    /// Write raw bytes to the device and flush.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<(), UwbBridgeError> {
        self.port
            .write_all(data)
            .await
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))?;
        self.port
            .flush()
            .await
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))
    }

    /// Reset the device by pulsing the DTR line high then low.
    pub async fn reset_device(&mut self) -> Result<(), UwbBridgeError> {
        info!("Resetting device via DTR");
        self.port
            .write_data_terminal_ready(true)
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))?;
        sleep(Duration::from_millis(RESET_PULSE_MILLIS)).await;
        self.port
            .write_data_terminal_ready(false)
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))?;
        Ok(())
    }

    /// Discard any bytes pending in the OS input buffer.
    pub fn clear_input(&mut self) -> Result<(), UwbBridgeError> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| UwbBridgeError::SerialPortError(e.to_string()))
    }

    /// Send the measurement-stream start command.
    pub async fn send_start_command(&mut self) -> Result<(), UwbBridgeError> {
        debug!("Sending start command");
        self.write_bytes(START_COMMAND).await
    }
}

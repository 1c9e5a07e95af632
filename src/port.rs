//! Serial transport adapter.
//!
//! The gateway core is transport-agnostic: it consumes inbound byte chunks
//! from a channel and pushes framed packets into another. This module
//! bridges those channels to a serial port opened with the ESP3 settings
//! (57600 baud, 8N1, no flow control), using one blocking reader thread
//! and one blocking writer thread.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use log::{debug, error};
use tokio::sync::mpsc;

/// Byte channels connected to an open serial port.
///
/// `tx` accepts fully framed ESP3 packets (one `Vec<u8>` per write);
/// `rx` yields raw chunks in arrival order, with no framing guarantee.
pub struct SerialLink {
    pub tx: mpsc::Sender<Vec<u8>>,
    pub rx: mpsc::Receiver<Vec<u8>>,
}

/// Open `port_name` with ESP3 settings and spawn the bridge threads.
///
/// Both threads end when their channel side is dropped or the port fails.
pub fn open(port_name: &str) -> Result<SerialLink, serialport::Error> {
    let mut reader = serialport::new(port_name, 57600)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()?;
    let mut writer = reader.try_clone()?;

    let (tx, mut outbound) = mpsc::channel::<Vec<u8>>(32);
    let (inbound, rx) = mpsc::channel::<Vec<u8>>(32);

    thread::Builder::new()
        .name(format!("{port_name}-writer"))
        .spawn(move || {
            while let Some(frame) = outbound.blocking_recv() {
                if let Err(e) = writer.write_all(&frame) {
                    error!("serial write failed: {e}");
                    break;
                }
            }
            debug!("serial writer thread ending");
        })?;

    thread::Builder::new()
        .name(format!("{port_name}-reader"))
        .spawn(move || {
            let mut buffer = [0u8; 256];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => {}
                    Ok(n) => {
                        if inbound.blocking_send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        error!("serial read failed: {e}");
                        break;
                    }
                }
            }
            debug!("serial reader thread ending");
        })?;

    Ok(SerialLink { tx, rx })
}

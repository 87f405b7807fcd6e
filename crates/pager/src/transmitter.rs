//! Paging appliance transmitter.
//!
//! The appliance speaks a TAP-style block protocol over TCP. One block carries
//! one page:
//!
//! ```text
//! STX <cap code> CR <body> CR ETX <c1 c2 c3> CR
//! ```
//!
//! The checksum is the sum of every byte from STX through ETX, truncated to 12
//! bits and written as three characters `0x30 + nibble`, most significant
//! nibble first. The appliance answers with one line: ACK accepts the page,
//! anything else (NAK, RS, EOT) means it was not taken.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const CR: u8 = 0x0D;
pub const NAK: u8 = 0x15;
pub const RS: u8 = 0x1E;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransmitError {
    #[error("paging appliance unavailable: {0}")]
    Unavailable(String),

    #[error("{field} contains non-ASCII characters")]
    NonAscii { field: &'static str },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Hands one message to the paging network.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Ok only once the appliance acknowledged the message.
    async fn transmit(&self, cap_code: &str, body: &str) -> Result<(), TransmitError>;
}

/// Printable ASCII only; control bytes would break the block framing.
pub fn validate_field(field: &'static str, value: &str) -> Result<(), TransmitError> {
    if !value.is_ascii() {
        return Err(TransmitError::NonAscii { field });
    }
    if let Some(c) = value.chars().find(|c| c.is_ascii_control()) {
        return Err(TransmitError::InvalidField {
            field,
            reason: format!("control character 0x{:02X}", c as u8),
        });
    }
    Ok(())
}

/// 12-bit block checksum encoded as three characters.
pub fn checksum(block: &[u8]) -> [u8; 3] {
    let sum = block.iter().map(|b| u32::from(*b)).sum::<u32>() & 0xFFF;
    [
        0x30 + ((sum >> 8) & 0xF) as u8,
        0x30 + ((sum >> 4) & 0xF) as u8,
        0x30 + (sum & 0xF) as u8,
    ]
}

/// Build the wire block for one page.
pub fn encode_frame(cap_code: &str, body: &str) -> Result<Vec<u8>, TransmitError> {
    validate_field("cap code", cap_code)?;
    validate_field("body", body)?;
    if cap_code.is_empty() {
        return Err(TransmitError::InvalidField {
            field: "cap code",
            reason: "empty".to_string(),
        });
    }

    let mut frame = Vec::with_capacity(cap_code.len() + body.len() + 8);
    frame.push(STX);
    frame.extend_from_slice(cap_code.as_bytes());
    frame.push(CR);
    frame.extend_from_slice(body.as_bytes());
    frame.push(CR);
    frame.push(ETX);

    let sum = checksum(&frame);
    frame.extend_from_slice(&sum);
    frame.push(CR);
    Ok(frame)
}

/// TCP client for the paging appliance. Opens one connection per message.
#[derive(Debug, Clone)]
pub struct TapTransmitter {
    addr: String,
    timeout: Duration,
}

impl TapTransmitter {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn exchange(&self, frame: &[u8]) -> Result<(), TransmitError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransmitError::Unavailable(format!("connect {}: {e}", self.addr)))?;
        let mut stream = BufReader::new(stream);

        stream
            .get_mut()
            .write_all(frame)
            .await
            .map_err(|e| TransmitError::Unavailable(format!("write: {e}")))?;

        let mut response = Vec::new();
        stream
            .read_until(CR, &mut response)
            .await
            .map_err(|e| TransmitError::Unavailable(format!("read: {e}")))?;

        match response.first() {
            Some(&ACK) => Ok(()),
            Some(&NAK) => Err(TransmitError::Unavailable("appliance rejected block (NAK)".to_string())),
            Some(&RS) => Err(TransmitError::Unavailable("appliance abandoned block (RS)".to_string())),
            Some(&EOT) => Err(TransmitError::Unavailable("appliance disconnected (EOT)".to_string())),
            Some(other) => Err(TransmitError::Unavailable(format!(
                "unexpected response byte 0x{other:02X}"
            ))),
            None => Err(TransmitError::Unavailable("connection closed without response".to_string())),
        }
    }
}

#[async_trait]
impl Transmitter for TapTransmitter {
    async fn transmit(&self, cap_code: &str, body: &str) -> Result<(), TransmitError> {
        let frame = encode_frame(cap_code, body)?;

        match tokio::time::timeout(self.timeout, self.exchange(&frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransmitError::Unavailable(format!(
                "no acknowledgement within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Fake appliance: reads one block and answers with `reply`.
    async fn appliance(reply: &'static [u8]) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            // Block ends with ETX, three checksum bytes, CR.
            while !received.ends_with(&[CR]) || !received.contains(&ETX) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(reply).await.unwrap();
            received
        });
        (addr, handle)
    }

    #[test]
    fn test_checksum_vector() {
        let block = [STX, b'1', b'2', b'3', b'4', b'5', b'6', b'7', CR, b'H', b'I', CR, ETX];
        assert_eq!(&checksum(&block), b"21<");
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame("1234567", "HI").unwrap();
        assert_eq!(frame[0], STX);
        assert_eq!(&frame[1..8], b"1234567");
        assert_eq!(frame[8], CR);
        assert_eq!(&frame[9..11], b"HI");
        assert_eq!(&frame[11..13], &[CR, ETX]);
        assert_eq!(&frame[13..16], b"21<");
        assert_eq!(frame[16], CR);
    }

    #[test]
    fn test_encode_frame_rejects_bad_fields() {
        assert_eq!(
            encode_frame("1234567", "caf\u{e9}"),
            Err(TransmitError::NonAscii { field: "body" })
        );
        assert!(matches!(
            encode_frame("12\r34", "hi"),
            Err(TransmitError::InvalidField { field: "cap code", .. })
        ));
        assert!(matches!(
            encode_frame("", "hi"),
            Err(TransmitError::InvalidField { field: "cap code", .. })
        ));
    }

    #[tokio::test]
    async fn test_transmit_acknowledged() {
        let (addr, handle) = appliance(&[ACK, CR]).await;
        let transmitter = TapTransmitter::new(addr, Duration::from_secs(2));

        transmitter.transmit("1234567", "HI").await.unwrap();

        let received = handle.await.unwrap();
        assert_eq!(received, encode_frame("1234567", "HI").unwrap());
    }

    #[tokio::test]
    async fn test_transmit_nak_is_unavailable() {
        let (addr, _handle) = appliance(&[NAK, CR]).await;
        let transmitter = TapTransmitter::new(addr, Duration::from_secs(2));

        let err = transmitter.transmit("1234567", "HI").await.unwrap_err();
        assert!(matches!(err, TransmitError::Unavailable(reason) if reason.contains("NAK")));
    }

    #[tokio::test]
    async fn test_transmit_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transmitter = TapTransmitter::new(addr, Duration::from_secs(2));
        assert!(matches!(
            transmitter.transmit("1234567", "HI").await,
            Err(TransmitError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_transmit_times_out_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _holder = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transmitter = TapTransmitter::new(addr, Duration::from_millis(100));
        let err = transmitter.transmit("1234567", "HI").await.unwrap_err();
        assert!(matches!(err, TransmitError::Unavailable(reason) if reason.contains("acknowledgement")));
    }
}

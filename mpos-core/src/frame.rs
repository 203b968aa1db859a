//! Protocol frame structure and encoding/decoding

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::{CommandCode, ResponseCode},
    constants::{control, CHECKSUM_LEN, CODE_LEN, LENGTH_PREFIX_LEN},
    error::{Error, Result},
    MAX_PARAMETER_LEN,
};

/// Outbound command frame
///
/// # Frame Structure
///
/// ```text
/// ┌──────┬─────────┬────────────────────────────┬──────┬──────────┐
/// │ STX  │ Command │ { Length │ Parameter }*    │ ETX  │  CRC16   │
/// │ 0x16 │ 3 bytes │  3 digits│ Length bytes    │ 0x17 │ 2 bytes  │
/// │      │ (ASCII) │  (ASCII) │                 │      │ (BE u16) │
/// └──────┴─────────┴────────────────────────────┴──────┴──────────┘
/// ```
///
/// The checksum covers everything from the command code through the end
/// marker.
///
/// # Examples
///
/// ```
/// use mpos_core::{CommandCode, CommandFrame, ResponseRecord};
///
/// let frame = CommandFrame::new(CommandCode::DISPLAY).with_parameter("Hello");
/// let encoded = frame.encode().unwrap();
///
/// assert_eq!(encoded[0], 0x16);
/// assert_eq!(&encoded[1..4], b"DSP");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command code
    pub command: CommandCode,

    /// Ordered parameters, each at most 999 bytes
    pub parameters: Vec<Bytes>,
}

impl CommandFrame {
    /// Create a frame without parameters
    pub fn new(command: CommandCode) -> Self {
        Self {
            command,
            parameters: Vec::new(),
        }
    }

    /// Create a frame with parameters
    pub fn with_parameters(command: CommandCode, parameters: Vec<Bytes>) -> Self {
        Self {
            command,
            parameters,
        }
    }

    /// Append a parameter
    pub fn with_parameter(mut self, parameter: impl Into<Bytes>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        1 + CODE_LEN
            + self
                .parameters
                .iter()
                .map(|p| LENGTH_PREFIX_LEN + p.len())
                .sum::<usize>()
            + 1
            + CHECKSUM_LEN
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParameterTooLong`] if any parameter exceeds 999 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use mpos_core::{CommandCode, CommandFrame};
    ///
    /// let bytes = CommandFrame::new(CommandCode::OPEN).encode().unwrap();
    /// assert_eq!(&bytes[..], &[0x16, b'O', b'P', b'N', 0x17, 0xA8, 0xA9]);
    /// ```
    pub fn encode(&self) -> Result<BytesMut> {
        if let Some(param) = self.parameters.iter().find(|p| p.len() > MAX_PARAMETER_LEN) {
            return Err(Error::ParameterTooLong {
                len: param.len(),
                max: MAX_PARAMETER_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u8(control::STX);
        buf.put_slice(self.command.as_bytes());

        for param in &self.parameters {
            buf.put_slice(format!("{:03}", param.len()).as_bytes());
            buf.put_slice(param);
        }

        buf.put_u8(control::ETX);

        // Start marker is not covered
        let crc = checksum::calculate(&buf[1..]);
        buf.put_u16(crc);

        Ok(buf)
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFrame")
            .field("command", &self.command)
            .field("parameters", &self.parameters.len())
            .field("size", &self.size())
            .finish()
    }
}

/// Decoded inbound frame
///
/// Either a positive reply, a notification (`command == "NTM"`), or the
/// negative-acknowledgment sentinel, which has `acknowledged == false` and no
/// other field populated.
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    /// Whether the frame carried a well-formed reply
    pub acknowledged: bool,

    /// Command code the reply answers
    pub command: Option<CommandCode>,

    /// Application response code
    pub response_code: Option<ResponseCode>,

    /// Ordered parameters
    pub parameters: Vec<Bytes>,
}

impl ResponseRecord {
    /// Negative-acknowledgment sentinel
    pub fn negative() -> Self {
        Self {
            acknowledged: false,
            command: None,
            response_code: None,
            parameters: Vec::new(),
        }
    }

    /// Decode a reassembled frame
    ///
    /// Never fails: anything that is not a well-formed reply decodes to the
    /// negative sentinel. A single leading ACK byte is skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use mpos_core::ResponseRecord;
    ///
    /// let record = ResponseRecord::decode(&[0x15]);
    /// assert!(!record.acknowledged);
    /// assert!(record.command.is_none());
    /// ```
    pub fn decode(buf: &[u8]) -> Self {
        match Self::try_decode(buf) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("Decoded as negative acknowledgment: {}", e);
                Self::negative()
            }
        }
    }

    /// Decode a reassembled frame, reporting why it is malformed
    pub fn try_decode(buf: &[u8]) -> Result<Self> {
        let buf = strip_ack(buf);

        match buf.first() {
            Some(&control::STX) => {}
            Some(&control::NAK) => {
                return Err(Error::MalformedFrame("negative acknowledgment".into()));
            }
            Some(b) => {
                return Err(Error::MalformedFrame(format!(
                    "expected start marker, found 0x{:02X}",
                    b
                )));
            }
            None => return Err(Error::MalformedFrame("empty frame".into())),
        }

        let mut reader = FieldReader::new(&buf[1..]);

        let command = CommandCode::from_bytes(reader.take(CODE_LEN, "command code")?)?;
        let response_code = ResponseCode::from_bytes(reader.take(CODE_LEN, "response code")?)?;

        let mut parameters = Vec::new();
        while reader.peek()? != control::ETX {
            let len = parse_length(reader.take(LENGTH_PREFIX_LEN, "length prefix")?)?;
            let param = reader.take(len, "parameter")?;
            parameters.push(Bytes::copy_from_slice(param));
        }

        Ok(Self {
            acknowledged: true,
            command: Some(command),
            response_code: Some(response_code),
            parameters,
        })
    }

    /// Check if this record is an unsolicited notification
    pub fn is_notification(&self) -> bool {
        self.command.is_some_and(|c| c.is_notification())
    }

    /// Check if the reply follows the success convention
    pub fn is_success(&self) -> bool {
        self.acknowledged && self.response_code.is_some_and(|c| c.is_success())
    }

    /// Parameter as text, if present
    pub fn parameter_str(&self, index: usize) -> Option<String> {
        self.parameters
            .get(index)
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }
}

impl fmt::Debug for ResponseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRecord")
            .field("acknowledged", &self.acknowledged)
            .field("command", &self.command)
            .field("response_code", &self.response_code)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

impl fmt::Display for ResponseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.command, self.response_code) {
            (Some(command), Some(code)) if self.acknowledged => write!(
                f,
                "Response[{}](code={}, params={})",
                command,
                code,
                self.parameters.len()
            ),
            _ => f.write_str("Response[NAK]"),
        }
    }
}

/// How the receive path treats checksum trailers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Trust the link
    Ignore,

    /// Log mismatches, deliver the frame anyway
    #[default]
    Warn,

    /// Drop frames whose trailer does not match
    Enforce,
}

/// Verify the checksum trailer of a complete frame
///
/// The frame must end with the end marker and the two checksum bytes, as
/// emitted by the reassembler. A single leading ACK byte is skipped.
///
/// # Examples
///
/// ```
/// use mpos_core::{frame, CommandCode, CommandFrame};
///
/// let encoded = CommandFrame::new(CommandCode::OPEN).encode().unwrap();
/// assert!(frame::verify_trailer(&encoded).is_ok());
/// ```
pub fn verify_trailer(buf: &[u8]) -> Result<()> {
    let buf = strip_ack(buf);

    if buf.len() < 2 + CHECKSUM_LEN || buf[0] != control::STX {
        return Err(Error::MalformedFrame(format!(
            "{} bytes is not a checksummed frame",
            buf.len()
        )));
    }

    let (body, trailer) = buf.split_at(buf.len() - CHECKSUM_LEN);

    if body.last() != Some(&control::ETX) {
        return Err(Error::MalformedFrame(
            "checksum trailer does not follow the end marker".into(),
        ));
    }

    let received = BigEndian::read_u16(trailer);
    let expected = checksum::calculate(&body[1..]);

    if expected != received {
        return Err(Error::ChecksumMismatch { expected, received });
    }

    Ok(())
}

fn strip_ack(buf: &[u8]) -> &[u8] {
    match buf {
        [control::ACK, rest @ ..] => rest,
        _ => buf,
    }
}

fn parse_length(digits: &[u8]) -> Result<usize> {
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::MalformedFrame(format!(
            "length prefix is not decimal: {}",
            hex::encode(digits)
        )));
    }

    Ok(digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + (d - b'0') as usize))
}

/// Cursor over the fields of a frame body
struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn peek(&self) -> Result<u8> {
        self.buf
            .first()
            .copied()
            .ok_or_else(|| Error::MalformedFrame("missing end marker".into()))
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(Error::MalformedFrame(format!(
                "truncated {}: need {} bytes, have {}",
                field,
                len,
                self.buf.len()
            )));
        }

        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

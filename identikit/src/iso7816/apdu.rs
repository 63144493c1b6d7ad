//! Application protocol data units (APDUs).
//!
//! Only the short forms of ISO/IEC 7816-3 § 12.1.3 are implemented; the
//! passport traffic driven by this crate never needs the extended cases.


use std::fmt;


#[derive(Debug)]
pub enum WriteError {
    EmptyData,
    DataTooLong { maximum: usize, obtained: usize },
    ResponseLengthOutOfRange { obtained: usize },
}
impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyData => write!(f, "data is, but must not be, empty"),
            Self::DataTooLong { maximum, obtained } => write!(f, "too much data: obtained {} bytes, expected maximum {} bytes", obtained, maximum),
            Self::ResponseLengthOutOfRange { obtained } => write!(f, "response length {} not in 1..=256", obtained),
        }
    }
}
impl std::error::Error for WriteError {
}


#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CommandHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}
impl CommandHeader {
    pub const fn to_bytes(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    pub const fn to_be_u32(&self) -> u32 {
        ((self.cla as u32) << 24)
        | ((self.ins as u32) << 16)
        | ((self.p1 as u32) <<  8)
        | ((self.p2 as u32) <<  0)
    }
}
impl fmt::Debug for CommandHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandHeader {} cla: 0x{:02X}, ins: 0x{:02X}, p1: 0x{:02X}, p2: 0x{:02X} {}",
            '{', self.cla, self.ins, self.p1, self.p2, '}',
        )
    }
}


/// The body of a command APDU.
///
/// Response lengths are counted in bytes, 1 to 256; 256 is written as the
/// `0x00` length byte per the standard.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Data {
    None,
    Request { data: Vec<u8> },
    Response { length: usize },
    Both { data: Vec<u8>, length: usize },
}
impl Data {
    pub fn request_data(&self) -> Option<&[u8]> {
        match self {
            Self::None | Self::Response { .. } => None,
            Self::Request { data } | Self::Both { data, .. } => Some(data.as_slice()),
        }
    }

    pub fn response_length(&self) -> Option<usize> {
        match self {
            Self::None | Self::Request { .. } => None,
            Self::Response { length } | Self::Both { length, .. } => Some(*length),
        }
    }

    fn write_bytes(&self, output: &mut Vec<u8>) -> Result<(), WriteError> {
        fn write_request(output: &mut Vec<u8>, data: &[u8]) -> Result<(), WriteError> {
            if data.is_empty() {
                return Err(WriteError::EmptyData);
            }
            if data.len() > 256 {
                return Err(WriteError::DataTooLong { maximum: 256, obtained: data.len() });
            }
            let length_byte = if data.len() == 256 { 0x00 } else { data.len() as u8 };
            output.push(length_byte);
            output.extend(data);
            Ok(())
        }
        fn write_response_length(output: &mut Vec<u8>, length: usize) -> Result<(), WriteError> {
            if length == 0 || length > 256 {
                return Err(WriteError::ResponseLengthOutOfRange { obtained: length });
            }
            let length_byte = if length == 256 { 0x00 } else { length as u8 };
            output.push(length_byte);
            Ok(())
        }

        match self {
            Self::None => {
                // case 1
                Ok(())
            },
            Self::Request { data } => {
                // case 3S: [Lc] [Data]
                write_request(output, data)
            },
            Self::Response { length } => {
                // case 2S: [Le]
                write_response_length(output, *length)
            },
            Self::Both { data, length } => {
                // case 4S: [Lc] [Data] [Le]
                write_request(output, data)?;
                write_response_length(output, *length)
            },
        }
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Apdu {
    pub header: CommandHeader,
    pub data: Data,
}
impl Apdu {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut ret = Vec::with_capacity(6 + self.data.request_data().map(|d| d.len()).unwrap_or(0));
        ret.extend(self.header.to_bytes());
        self.data.write_bytes(&mut ret)?;
        Ok(ret)
    }
}


#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResponseTrailer {
    pub sw1: u8,
    pub sw2: u8,
}
impl ResponseTrailer {
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    pub const fn to_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }
}
impl fmt::Debug for ResponseTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseTrailer {} sw1: 0x{:02X}, sw2: 0x{:02X} {}", '{', self.sw1, self.sw2, '}')
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Response {
    pub data: Vec<u8>,
    pub trailer: ResponseTrailer,
}
impl Response {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        Some(Self {
            data: bytes[..bytes.len() - 2].to_vec(),
            trailer: ResponseTrailer {
                sw1: bytes[bytes.len() - 2],
                sw2: bytes[bytes.len() - 1],
            },
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_4s_le_256_writes_zero_byte() {
        let apdu = Apdu {
            header: CommandHeader { cla: 0x0C, ins: 0xA4, p1: 0x02, p2: 0x0C },
            data: Data::Both { data: vec![0x01, 0x1E], length: 256 },
        };
        assert_eq!(
            apdu.to_bytes().unwrap(),
            [0x0C, 0xA4, 0x02, 0x0C, 0x02, 0x01, 0x1E, 0x00],
        );
    }

    #[test]
    fn test_empty_request_data_rejected() {
        let apdu = Apdu {
            header: CommandHeader::default(),
            data: Data::Request { data: Vec::new() },
        };
        assert!(matches!(apdu.to_bytes(), Err(WriteError::EmptyData)));
    }

    #[test]
    fn test_response_round_trip() {
        let response = Response::from_slice(&[0xAB, 0xCD, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, [0xAB, 0xCD]);
        assert_eq!(response.trailer.to_word(), 0x9000);
        assert!(Response::from_slice(&[0x90]).is_none());
    }
}

//! The passport chip read session.
//!
//! One session drives one physical tag through the sequence
//! `Disconnected → Connected → Authenticated → DataGroupsRead → Closed`.
//! Operations block on contactless I/O; the caller runs the session off any
//! latency-sensitive thread and the whole read sequence is bounded by a
//! wall-clock budget, after which every further operation fails with a
//! timeout instead of hanging. The session performs no retries of its own;
//! asking the user to re-tap the card is a caller decision.
//!
//! The session is not safe for concurrent use. One tag, one session, released
//! before the next.


use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::bac::{self, BacKey};
use crate::der;
use crate::iso7816::apdu::{Apdu, CommandHeader, Data};
use crate::iso7816::transport::{CommunicationError, Transport};
use crate::secure_messaging::{Error, Operation};


/// ICAO eMRTD application identifier selected before authentication.
const EMRTD_APPLICATION_ID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

/// Bytes fetched per READ BINARY after the file header.
const READ_CHUNK: usize = 0xE0;

/// Bytes of the initial read used to learn the file length.
const FILE_HEADER_LENGTH: usize = 4;

/// Default wall-clock budget for connect through the last data-group read.
pub const DEFAULT_READ_BUDGET: Duration = Duration::from_secs(120);


/// Elementary files of the eMRTD application.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DataGroup {
    Com,
    Dg1,
    Dg2,
    Dg3,
    Dg4,
    Dg5,
    Dg6,
    Dg7,
    Dg8,
    Dg9,
    Dg10,
    Dg11,
    Dg12,
    Dg13,
    Dg14,
    Dg15,
    Dg16,
    Sod,
}
impl DataGroup {
    pub const fn file_id(&self) -> [u8; 2] {
        match self {
            Self::Com => [0x01, 0x1E],
            Self::Dg1 => [0x01, 0x01],
            Self::Dg2 => [0x01, 0x02],
            Self::Dg3 => [0x01, 0x03],
            Self::Dg4 => [0x01, 0x04],
            Self::Dg5 => [0x01, 0x05],
            Self::Dg6 => [0x01, 0x06],
            Self::Dg7 => [0x01, 0x07],
            Self::Dg8 => [0x01, 0x08],
            Self::Dg9 => [0x01, 0x09],
            Self::Dg10 => [0x01, 0x0A],
            Self::Dg11 => [0x01, 0x0B],
            Self::Dg12 => [0x01, 0x0C],
            Self::Dg13 => [0x01, 0x0D],
            Self::Dg14 => [0x01, 0x0E],
            Self::Dg15 => [0x01, 0x0F],
            Self::Dg16 => [0x01, 0x10],
            Self::Sod => [0x01, 0x1D],
        }
    }

    /// DG1 carries the machine-readable zone; a session that cannot read it
    /// has produced nothing of value.
    pub const fn is_mandatory(&self) -> bool {
        matches!(self, Self::Dg1)
    }
}
impl fmt::Display for DataGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Com => write!(f, "EF.COM"),
            Self::Sod => write!(f, "EF.SOD"),
            other => write!(f, "DG{}", (other.file_id()[1]) as u16),
        }
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    DataGroupsRead,
    Closed,
}
impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::DataGroupsRead => write!(f, "data groups read"),
            Self::Closed => write!(f, "closed"),
        }
    }
}


#[derive(Debug)]
pub enum SessionError {
    /// The physical link failed.
    Transport(CommunicationError),
    /// The chip rejected the derived access key: wrong MRZ input, or a chip
    /// that does not speak BAC.
    Authentication(CommunicationError),
    InvalidState { operation: &'static str, state: SessionState },
    Timeout { elapsed: Duration, budget: Duration },
    /// A selected file did not carry a parseable TLV header.
    FileFormat { group: DataGroup },
    /// The mandatory data group could not be read; the session is dead.
    MandatoryDataGroup { group: DataGroup, source: Box<SessionError> },
}
impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Authentication(e) => write!(f, "chip authentication failed: {}", e),
            Self::InvalidState { operation, state }
                => write!(f, "cannot {} in {} state", operation, state),
            Self::Timeout { elapsed, budget }
                => write!(f, "session exceeded its read budget: {:?} elapsed of {:?}", elapsed, budget),
            Self::FileFormat { group }
                => write!(f, "{} does not start with a valid TLV header", group),
            Self::MandatoryDataGroup { group, source }
                => write!(f, "failed to read mandatory {}: {}", group, source),
        }
    }
}
impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Authentication(e) => Some(e),
            Self::InvalidState { .. } => None,
            Self::Timeout { .. } => None,
            Self::FileFormat { .. } => None,
            Self::MandatoryDataGroup { source, .. } => Some(source),
        }
    }
}


/// A read session against one physical tag.
///
/// The transport handle is owned for the session's lifetime and closed on
/// every exit path: explicitly via [`ChipSession::close`], or by drop.
pub struct ChipSession {
    link: Option<Box<dyn Transport>>,
    state: SessionState,
    read_budget: Duration,
    started: Option<Instant>,
}
impl ChipSession {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_read_budget(transport, DEFAULT_READ_BUDGET)
    }

    pub fn with_read_budget(transport: Box<dyn Transport>, read_budget: Duration) -> Self {
        Self {
            link: Some(transport),
            state: SessionState::Disconnected,
            read_budget,
            started: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn link(&mut self, operation: &'static str) -> Result<&mut dyn Transport, SessionError> {
        let state = self.state;
        match self.link.as_mut() {
            Some(link) => Ok(link.as_mut()),
            None => Err(SessionError::InvalidState { operation, state }),
        }
    }

    fn ensure_within_budget(&self) -> Result<(), SessionError> {
        if let Some(started) = self.started {
            let elapsed = started.elapsed();
            if elapsed > self.read_budget {
                return Err(SessionError::Timeout { elapsed, budget: self.read_budget });
            }
        }
        Ok(())
    }

    /// Establish the physical link and start the session clock.
    #[instrument(skip(self))]
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::InvalidState { operation: "connect", state: self.state });
        }
        self.link("connect")?.connect().map_err(SessionError::Transport)?;
        self.started = Some(Instant::now());
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Select the eMRTD application and run Basic Access Control.
    #[instrument(skip_all)]
    pub fn authenticate(&mut self, key: &BacKey) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::InvalidState { operation: "authenticate", state: self.state });
        }
        self.ensure_within_budget()?;

        let select_application = Apdu {
            header: CommandHeader {
                cla: 0x00,
                ins: 0xA4, // SELECT
                p1: 0b000_001_00, // select by DF name (application identifier)
                p2: 0b0000_11_00, // return no metadata
            },
            data: Data::Request { data: EMRTD_APPLICATION_ID.to_vec() },
        };
        let link = self.link("authenticate")?;
        let response = link.communicate(&select_application)
            .map_err(SessionError::Transport)?;
        if response.trailer.to_word() != 0x9000 {
            return Err(SessionError::Authentication(Error::OperationFailed {
                operation: Operation::SelectApplication,
                status: response.trailer.to_word(),
            }.into()));
        }

        let session_keys = bac::establish(link, key).map_err(|error| match error {
            // a failing exchange means the chip rejected the key material;
            // anything below that layer is a link problem
            CommunicationError::SecureMessaging(_) => SessionError::Authentication(error),
            other => SessionError::Transport(other),
        })?;

        let plain = self.link.take()
            .ok_or(SessionError::InvalidState { operation: "authenticate", state: self.state })?;
        self.link = Some(Box::new(session_keys.into_channel(plain)));
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Read one elementary file over the session channel.
    ///
    /// May be called per group in any order once authenticated; a failure
    /// here affects only the group being read.
    #[instrument(skip(self))]
    pub fn read_data_group(&mut self, group: DataGroup) -> Result<Vec<u8>, SessionError> {
        if self.state != SessionState::Authenticated && self.state != SessionState::DataGroupsRead {
            return Err(SessionError::InvalidState { operation: "read data group", state: self.state });
        }
        self.ensure_within_budget()?;

        let link = self.link("read data group")?;

        let select_file = Apdu {
            header: CommandHeader {
                cla: 0x00,
                ins: 0xA4, // SELECT
                p1: 0b000_000_10, // select EF under the current DF
                p2: 0b0000_11_00, // return no metadata
            },
            data: Data::Request { data: group.file_id().to_vec() },
        };
        let response = link.communicate(&select_file).map_err(SessionError::Transport)?;
        if response.trailer.to_word() != 0x9000 {
            return Err(SessionError::Transport(Error::OperationFailed {
                operation: Operation::SelectFile,
                status: response.trailer.to_word(),
            }.into()));
        }

        // learn the file length from the leading TLV header
        let mut contents = read_binary(link, 0, FILE_HEADER_LENGTH)?;
        if contents.len() < FILE_HEADER_LENGTH {
            return Err(SessionError::FileFormat { group });
        }
        let tag_length = if contents[0] & 0x1F == 0x1F { 2 } else { 1 };
        let (value_length, rest) = der::try_decode_length(&contents[tag_length..])
            .ok_or(SessionError::FileFormat { group })?;
        let total_length = (contents.len() - rest.len()) + value_length;

        while contents.len() < total_length {
            self.ensure_within_budget()?;
            let link = self.link("read data group")?;
            let chunk_length = READ_CHUNK.min(total_length - contents.len());
            let chunk = read_binary(link, contents.len(), chunk_length)?;
            if chunk.is_empty() {
                return Err(SessionError::FileFormat { group });
            }
            contents.extend(chunk);
        }

        Ok(contents)
    }

    /// Read a set of data groups, tolerating failures on optional groups.
    ///
    /// A failure on the mandatory group (or a session timeout) aborts; any
    /// other per-group failure is logged and skipped. On return the session
    /// has left the reading phase.
    #[instrument(skip(self))]
    pub fn read_data_groups(
        &mut self,
        groups: &[DataGroup],
    ) -> Result<BTreeMap<DataGroup, Vec<u8>>, SessionError> {
        let mut contents = BTreeMap::new();
        for &group in groups {
            match self.read_data_group(group) {
                Ok(data) => {
                    contents.insert(group, data);
                },
                Err(error @ SessionError::Timeout { .. }) => return Err(error),
                Err(error) => {
                    if group.is_mandatory() {
                        return Err(SessionError::MandatoryDataGroup {
                            group,
                            source: Box::new(error),
                        });
                    }
                    debug!("skipping optional {}: {}", group, error);
                },
            }
        }
        self.state = SessionState::DataGroupsRead;
        Ok(contents)
    }

    /// Release the transport. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.state = SessionState::Closed;
    }
}
impl Drop for ChipSession {
    fn drop(&mut self) {
        self.close();
    }
}


fn read_binary(
    link: &mut dyn Transport,
    offset: usize,
    length: usize,
) -> Result<Vec<u8>, SessionError> {
    let offset_bytes = u16::try_from(offset)
        .map_err(|_| SessionError::Transport(Error::OperationFailed {
            operation: Operation::ReadBinary,
            status: 0x6B00, // wrong parameters: offset outside the file
        }.into()))?
        .to_be_bytes();
    let read = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0xB0, // READ BINARY
            p1: offset_bytes[0],
            p2: offset_bytes[1],
        },
        data: Data::Response { length },
    };
    let response = link.communicate(&read).map_err(SessionError::Transport)?;
    if response.trailer.to_word() != 0x9000 {
        return Err(SessionError::Transport(Error::OperationFailed {
            operation: Operation::ReadBinary,
            status: response.trailer.to_word(),
        }.into()));
    }
    Ok(response.data)
}

use cgms_core::crc::CrcError;
use cgms_racp::record::RecordStoreFull;

/// An error sent to the client in response to a read or write
///
/// These are the codes of the ATT error response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum AttError {
    #[error("invalid handle")]
    InvalidHandle,
    #[error("read not permitted")]
    ReadNotPermitted,
    #[error("write not permitted")]
    WriteNotPermitted,
    #[error("invalid attribute value length")]
    InvalidAttributeValueLength,
    #[error("missing E2E-CRC")]
    MissingCrc,
    #[error("invalid E2E-CRC")]
    InvalidCrc,
    #[error("client characteristic configuration descriptor improperly configured")]
    CccdImproperlyConfigured,
    #[error("procedure already in progress")]
    ProcedureAlreadyInProgress,
    #[error("out of range")]
    OutOfRange,
}

impl AttError {
    /// Get the error code
    pub fn code(&self) -> u8 {
        match self {
            AttError::InvalidHandle => 0x01,
            AttError::ReadNotPermitted => 0x02,
            AttError::WriteNotPermitted => 0x03,
            AttError::InvalidAttributeValueLength => 0x0D,
            AttError::MissingCrc => 0x80,
            AttError::InvalidCrc => 0x81,
            AttError::CccdImproperlyConfigured => 0xFD,
            AttError::ProcedureAlreadyInProgress => 0xFE,
            AttError::OutOfRange => 0xFF,
        }
    }
}

impl From<CrcError> for AttError {
    fn from(e: CrcError) -> Self {
        match e {
            CrcError::Missing => AttError::MissingCrc,
            CrcError::Invalid { .. } => AttError::InvalidCrc,
        }
    }
}

/// Error returned by the service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError<E> {
    /// The bearer failed to send a notification or indication
    #[error("bearer error, {0}")]
    Bearer(E),
    #[error(transparent)]
    RecordStoreFull(#[from] RecordStoreFull),
    /// Measurements cannot be added while the session is stopped
    #[error("the session is stopped")]
    SessionStopped,
}

/// Error for an invalid service configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("the handle {0:#06x} is used by more than one characteristic")]
    DuplicateHandle(u16),
    #[error("the handle 0x0000 is not a valid attribute handle")]
    NullHandle,
    #[error("a store capacity of {0} is larger than {max}", max = crate::ServiceConfig::MAX_CAPACITY)]
    CapacityTooLarge(usize),
}

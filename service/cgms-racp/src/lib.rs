//! Record Access Control Point
//!
//! The Record Access Control Point (RACP) is the control point used by a client to access the
//! glucose records stored by the server. A procedure is started by a write to the control point,
//! the server then processes the request against the [`RecordStore`] and sends exactly one
//! indication containing the [`Response`].
//!
//! A request is made of an opcode, an operator, and an operand.
//!
//! ```text
//! [opcode][operator][filter type][operand...]
//! ```
//!
//! The only filter type supported is the time offset, so an operand is either one time offset for
//! the operators `<=` and `>=`, or two time offsets (the lower and upper bound) for the operator
//! *within range of*.
//!
//! The engine within this crate is a pure function of a request and the record store.
//! [`evaluate`] selects the records of a request and returns them as part of an [`Evaluation`].
//! Sending the measurements of the selected records (for the report procedure) and sending the
//! indication is left to the service.
//!
//! [`RecordStore`]: record::RecordStore

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod record;

use alloc::vec::Vec;
use cgms_core::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use record::RecordStore;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The filter type of a time offset
pub const FILTER_TYPE_TIME_OFFSET: u8 = 0x01;

/// RACP opcodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Opcode {
    ReportStoredRecords,
    DeleteStoredRecords,
    AbortOperation,
    ReportNumberOfStoredRecords,
    /// Only sent by the server
    NumberOfStoredRecordsResponse,
    /// Only sent by the server
    ResponseCode,
}

impl Opcode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Opcode::ReportStoredRecords),
            0x02 => Some(Opcode::DeleteStoredRecords),
            0x03 => Some(Opcode::AbortOperation),
            0x04 => Some(Opcode::ReportNumberOfStoredRecords),
            0x05 => Some(Opcode::NumberOfStoredRecordsResponse),
            0x06 => Some(Opcode::ResponseCode),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Opcode::ReportStoredRecords => 0x01,
            Opcode::DeleteStoredRecords => 0x02,
            Opcode::AbortOperation => 0x03,
            Opcode::ReportNumberOfStoredRecords => 0x04,
            Opcode::NumberOfStoredRecordsResponse => 0x05,
            Opcode::ResponseCode => 0x06,
        }
    }

    /// Check if this opcode can be written by a client
    pub fn is_request(&self) -> bool {
        !matches!(self, Opcode::NumberOfStoredRecordsResponse | Opcode::ResponseCode)
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Opcode::ReportStoredRecords => f.write_str("report stored records"),
            Opcode::DeleteStoredRecords => f.write_str("delete stored records"),
            Opcode::AbortOperation => f.write_str("abort operation"),
            Opcode::ReportNumberOfStoredRecords => f.write_str("report number of stored records"),
            Opcode::NumberOfStoredRecordsResponse => f.write_str("number of stored records response"),
            Opcode::ResponseCode => f.write_str("response code"),
        }
    }
}

/// RACP operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operator {
    Null,
    AllRecords,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
    WithinRangeOf,
    FirstRecord,
    LastRecord,
}

impl Operator {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Operator::Null),
            0x01 => Some(Operator::AllRecords),
            0x02 => Some(Operator::LessThanOrEqualTo),
            0x03 => Some(Operator::GreaterThanOrEqualTo),
            0x04 => Some(Operator::WithinRangeOf),
            0x05 => Some(Operator::FirstRecord),
            0x06 => Some(Operator::LastRecord),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Operator::Null => 0x00,
            Operator::AllRecords => 0x01,
            Operator::LessThanOrEqualTo => 0x02,
            Operator::GreaterThanOrEqualTo => 0x03,
            Operator::WithinRangeOf => 0x04,
            Operator::FirstRecord => 0x05,
            Operator::LastRecord => 0x06,
        }
    }

    /// Get the length of the operand of this operator
    ///
    /// The filter type is part of the operand.
    pub fn operand_len(&self) -> usize {
        match self {
            Operator::Null | Operator::AllRecords | Operator::FirstRecord | Operator::LastRecord => 0,
            Operator::LessThanOrEqualTo | Operator::GreaterThanOrEqualTo => 3,
            Operator::WithinRangeOf => 5,
        }
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operator::Null => f.write_str("null"),
            Operator::AllRecords => f.write_str("all records"),
            Operator::LessThanOrEqualTo => f.write_str("less than or equal to"),
            Operator::GreaterThanOrEqualTo => f.write_str("greater than or equal to"),
            Operator::WithinRangeOf => f.write_str("within range of"),
            Operator::FirstRecord => f.write_str("first record"),
            Operator::LastRecord => f.write_str("last record"),
        }
    }
}

/// The operand of a request
///
/// Time offsets are in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    None,
    TimeOffset(u16),
    TimeOffsetRange { lower: u16, upper: u16 },
}

impl Operand {
    fn matches(&self, operator: Operator) -> bool {
        match self {
            Operand::None => operator.operand_len() == 0,
            Operand::TimeOffset(_) => {
                matches!(operator, Operator::LessThanOrEqualTo | Operator::GreaterThanOrEqualTo)
            }
            Operand::TimeOffsetRange { .. } => operator == Operator::WithinRangeOf,
        }
    }
}

/// The response codes of the response code opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResponseCode {
    Success,
    OpcodeNotSupported,
    InvalidOperator,
    OperatorNotSupported,
    InvalidOperand,
    NoRecordsFound,
    AbortUnsuccessful,
    ProcedureNotCompleted,
    OperandNotSupported,
}

impl ResponseCode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(ResponseCode::Success),
            0x02 => Some(ResponseCode::OpcodeNotSupported),
            0x03 => Some(ResponseCode::InvalidOperator),
            0x04 => Some(ResponseCode::OperatorNotSupported),
            0x05 => Some(ResponseCode::InvalidOperand),
            0x06 => Some(ResponseCode::NoRecordsFound),
            0x07 => Some(ResponseCode::AbortUnsuccessful),
            0x08 => Some(ResponseCode::ProcedureNotCompleted),
            0x09 => Some(ResponseCode::OperandNotSupported),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            ResponseCode::Success => 0x01,
            ResponseCode::OpcodeNotSupported => 0x02,
            ResponseCode::InvalidOperator => 0x03,
            ResponseCode::OperatorNotSupported => 0x04,
            ResponseCode::InvalidOperand => 0x05,
            ResponseCode::NoRecordsFound => 0x06,
            ResponseCode::AbortUnsuccessful => 0x07,
            ResponseCode::ProcedureNotCompleted => 0x08,
            ResponseCode::OperandNotSupported => 0x09,
        }
    }
}

impl core::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResponseCode::Success => f.write_str("success"),
            ResponseCode::OpcodeNotSupported => f.write_str("opcode not supported"),
            ResponseCode::InvalidOperator => f.write_str("invalid operator"),
            ResponseCode::OperatorNotSupported => f.write_str("operator not supported"),
            ResponseCode::InvalidOperand => f.write_str("invalid operand"),
            ResponseCode::NoRecordsFound => f.write_str("no records found"),
            ResponseCode::AbortUnsuccessful => f.write_str("abort unsuccessful"),
            ResponseCode::ProcedureNotCompleted => f.write_str("procedure not completed"),
            ResponseCode::OperandNotSupported => f.write_str("operand not supported"),
        }
    }
}

/// A request that could not be parsed
///
/// The request opcode is the raw opcode written by the client, this is echoed within the
/// response even when the opcode is unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid RACP request (opcode {request_opcode:#04x}): {code}")]
pub struct RequestError {
    pub request_opcode: u8,
    pub code: ResponseCode,
}

impl RequestError {
    fn new(request_opcode: u8, code: ResponseCode) -> Self {
        RequestError { request_opcode, code }
    }
}

impl From<RequestError> for Response {
    fn from(e: RequestError) -> Self {
        Response::ResponseCode {
            request_opcode: e.request_opcode,
            code: e.code,
        }
    }
}

/// A RACP request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Request {
    pub opcode: Opcode,
    pub operator: Operator,
    pub operand: Operand,
}

impl Request {
    const HEADER_LEN: usize = 2;

    pub fn new(opcode: Opcode, operator: Operator, operand: Operand) -> Self {
        Request {
            opcode,
            operator,
            operand,
        }
    }

    /// Get the expected length of a request from its opcode and operator
    ///
    /// The returned length does not include the E2E-CRC. `None` is returned if the opcode or
    /// operator are missing or unknown.
    pub fn expected_len(raw: &[u8]) -> Option<usize> {
        Opcode::from_raw(*raw.first()?).filter(Opcode::is_request)?;

        let operator = Operator::from_raw(*raw.get(1)?)?;

        Some(Self::HEADER_LEN + operator.operand_len())
    }

    /// Parse a request
    ///
    /// The input must not contain the E2E-CRC. Checks are made in the order of the opcode, the
    /// operator, the combination of the opcode and operator, the filter type, and finally the
    /// length of the operand.
    pub fn parse(raw: &[u8]) -> Result<Self, RequestError> {
        let raw_opcode = raw.first().copied().unwrap_or_default();

        let opcode = Opcode::from_raw(raw_opcode)
            .filter(Opcode::is_request)
            .ok_or(RequestError::new(raw_opcode, ResponseCode::OpcodeNotSupported))?;

        let raw_operator = raw
            .get(1)
            .copied()
            .ok_or(RequestError::new(raw_opcode, ResponseCode::ProcedureNotCompleted))?;

        let operator = Operator::from_raw(raw_operator)
            .ok_or(RequestError::new(raw_opcode, ResponseCode::OperatorNotSupported))?;

        Self::check_operator(opcode, operator).map_err(|code| RequestError::new(raw_opcode, code))?;

        let operand_raw = &raw[Self::HEADER_LEN..];

        if operator.operand_len() != 0 {
            if let Some(filter_type) = operand_raw.first() {
                if *filter_type != FILTER_TYPE_TIME_OFFSET {
                    return Err(RequestError::new(raw_opcode, ResponseCode::OperandNotSupported));
                }
            }
        }

        if operand_raw.len() != operator.operand_len() {
            return Err(RequestError::new(raw_opcode, ResponseCode::ProcedureNotCompleted));
        }

        let offset_at = |index: usize| u16::from_le_bytes([operand_raw[index], operand_raw[index + 1]]);

        let operand = match operator.operand_len() {
            0 => Operand::None,
            3 => Operand::TimeOffset(offset_at(1)),
            _ => Operand::TimeOffsetRange {
                lower: offset_at(1),
                upper: offset_at(3),
            },
        };

        Ok(Request::new(opcode, operator, operand))
    }

    fn check_operator(opcode: Opcode, operator: Operator) -> Result<(), ResponseCode> {
        match (opcode, operator) {
            (Opcode::AbortOperation, Operator::Null) => Ok(()),
            (Opcode::AbortOperation, _) => Err(ResponseCode::InvalidOperator),
            (_, Operator::Null) => Err(ResponseCode::InvalidOperator),
            _ => Ok(()),
        }
    }

    /// Validate the request
    ///
    /// This re-checks what [`parse`](Request::parse) checks for a request created by other means,
    /// and checks that the bounds of a range are in order.
    pub fn validate(&self) -> Result<(), ResponseCode> {
        if !self.opcode.is_request() {
            return Err(ResponseCode::OpcodeNotSupported);
        }

        Self::check_operator(self.opcode, self.operator)?;

        if !self.operand.matches(self.operator) {
            return Err(ResponseCode::InvalidOperand);
        }

        match self.operand {
            Operand::TimeOffsetRange { lower, upper } if lower > upper => Err(ResponseCode::InvalidOperand),
            _ => Ok(()),
        }
    }
}

impl TransferFormatInto for Request {
    fn len_of_into(&self) -> usize {
        Self::HEADER_LEN
            + match self.operand {
                Operand::None => 0,
                Operand::TimeOffset(_) => 3,
                Operand::TimeOffsetRange { .. } => 5,
            }
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        into_ret[0] = self.opcode.into_raw();

        into_ret[1] = self.operator.into_raw();

        match self.operand {
            Operand::None => (),
            Operand::TimeOffset(offset) => {
                into_ret[2] = FILTER_TYPE_TIME_OFFSET;

                offset.build_into_ret(&mut into_ret[3..5]);
            }
            Operand::TimeOffsetRange { lower, upper } => {
                into_ret[2] = FILTER_TYPE_TIME_OFFSET;

                lower.build_into_ret(&mut into_ret[3..5]);

                upper.build_into_ret(&mut into_ret[5..7]);
            }
        }
    }
}

/// A RACP response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    /// The response to the report number of stored records procedure
    NumberOfStoredRecords(u16),
    /// The response to every other procedure
    ResponseCode { request_opcode: u8, code: ResponseCode },
}

impl Response {
    fn code(request_opcode: Opcode, code: ResponseCode) -> Self {
        Response::ResponseCode {
            request_opcode: request_opcode.into_raw(),
            code,
        }
    }
}

impl core::fmt::Display for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Response::NumberOfStoredRecords(count) => write!(f, "{} stored records", count),
            Response::ResponseCode { request_opcode, code } => {
                write!(f, "response to opcode {:#04x}: {}", request_opcode, code)
            }
        }
    }
}

impl TransferFormatInto for Response {
    fn len_of_into(&self) -> usize {
        3
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        match self {
            Response::NumberOfStoredRecords(count) => {
                into_ret[0] = Opcode::NumberOfStoredRecordsResponse.into_raw();

                count.build_into_ret(&mut into_ret[1..3]);
            }
            Response::ResponseCode { request_opcode, code } => {
                into_ret[0] = Opcode::ResponseCode.into_raw();

                into_ret[1] = *request_opcode;

                into_ret[2] = code.into_raw();
            }
        }
    }
}

impl TransferFormatTryFrom for Response {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        if raw.len() != 3 {
            return Err(TransferFormatError::bad_size("RACP response", 3, raw.len()));
        }

        match Opcode::from_raw(raw[0]) {
            Some(Opcode::NumberOfStoredRecordsResponse) => Ok(Response::NumberOfStoredRecords(
                <u16 as TransferFormatTryFrom>::try_from(&raw[1..])?,
            )),
            Some(Opcode::ResponseCode) => {
                let code = ResponseCode::from_raw(raw[2])
                    .ok_or_else(|| TransferFormatError::from("unknown RACP response code"))?;

                Ok(Response::ResponseCode {
                    request_opcode: raw[1],
                    code,
                })
            }
            _ => Err(TransferFormatError::from("not a RACP response opcode")),
        }
    }
}

/// The output of [`evaluate`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// The opcode of the request
    ///
    /// This is `None` when the request could not be parsed.
    pub opcode: Option<Opcode>,
    /// The indices of the selected records within the record store in the order they are reported
    pub selected: Vec<usize>,
    pub response: Response,
}

impl Evaluation {
    fn without_selection(opcode: Option<Opcode>, response: Response) -> Self {
        Evaluation {
            opcode,
            selected: Vec::new(),
            response,
        }
    }

    /// Check if measurements of the selected records are to be sent to the client
    pub fn is_report(&self) -> bool {
        self.opcode == Some(Opcode::ReportStoredRecords) && !self.selected.is_empty()
    }
}

/// Select the active records matched by `operator` and `operand`
///
/// The operator and operand must have been validated.
fn select(operator: Operator, operand: Operand, store: &RecordStore) -> Vec<usize> {
    let active = store.iter_active();

    match (operator, operand) {
        (Operator::AllRecords, _) => active.map(|(index, _)| index).collect(),
        (Operator::FirstRecord, _) => active
            .min_by_key(|(_, record)| record.time_offset)
            .map(|(index, _)| index)
            .into_iter()
            .collect(),
        (Operator::LastRecord, _) => active
            .max_by_key(|(_, record)| record.time_offset)
            .map(|(index, _)| index)
            .into_iter()
            .collect(),
        (Operator::LessThanOrEqualTo, Operand::TimeOffset(max)) => active
            .filter(|(_, record)| record.time_offset <= max)
            .map(|(index, _)| index)
            .collect(),
        (Operator::GreaterThanOrEqualTo, Operand::TimeOffset(min)) => active
            .filter(|(_, record)| record.time_offset >= min)
            .map(|(index, _)| index)
            .collect(),
        (Operator::WithinRangeOf, Operand::TimeOffsetRange { lower, upper }) => active
            .filter(|(_, record)| (lower..=upper).contains(&record.time_offset))
            .map(|(index, _)| index)
            .collect(),
        _ => Vec::new(),
    }
}

/// Evaluate a request
///
/// The records of the request are selected from the active records of `store`. Records selected by
/// a delete request are marked as deleted, for every other request `store` is left untouched.
///
/// The abort operation is always successful as a procedure is never partially complete when a new
/// request is evaluated.
pub fn evaluate(request: &Request, store: &mut RecordStore) -> Evaluation {
    if let Err(code) = request.validate() {
        log::info!("(RACP) rejected request {:?}: {}", request, code);

        return Evaluation::without_selection(Some(request.opcode), Response::code(request.opcode, code));
    }

    if request.opcode == Opcode::AbortOperation {
        log::info!("(RACP) abort operation");

        let response = Response::code(request.opcode, ResponseCode::Success);

        return Evaluation::without_selection(Some(request.opcode), response);
    }

    let selected = select(request.operator, request.operand, store);

    log::info!(
        "(RACP) {} ({}): selected {} records",
        request.opcode,
        request.operator,
        selected.len()
    );

    let response = match request.opcode {
        Opcode::ReportNumberOfStoredRecords => {
            Response::NumberOfStoredRecords(<u16 as TryFrom<usize>>::try_from(selected.len()).unwrap_or(u16::MAX))
        }
        _ if selected.is_empty() => Response::code(request.opcode, ResponseCode::NoRecordsFound),
        Opcode::DeleteStoredRecords => {
            for index in selected.iter().copied() {
                store.delete(index);
            }

            Response::code(request.opcode, ResponseCode::Success)
        }
        _ => Response::code(request.opcode, ResponseCode::Success),
    };

    Evaluation {
        opcode: Some(request.opcode),
        selected,
        response,
    }
}

/// Parse and evaluate a request
///
/// `raw` must not contain the E2E-CRC. A request that cannot be parsed is turned into the
/// response for it, so a response is always produced.
pub fn process(raw: &[u8], store: &mut RecordStore) -> Evaluation {
    log::debug!("(RACP) processing request {:x?}", raw);

    match Request::parse(raw) {
        Ok(request) => evaluate(&request, store),
        Err(e) => {
            log::info!("(RACP) {}", e);

            Evaluation::without_selection(Opcode::from_raw(e.request_opcode), e.into())
        }
    }
}

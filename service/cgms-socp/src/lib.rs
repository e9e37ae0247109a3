//! CGM Specific Ops Control Point
//!
//! The Specific Ops Control Point (SOCP) is used by a client to read and change the configuration
//! of a CGM sensor and to start and stop a session. Every request written to the control point is
//! answered by one indication containing the [`Response`].
//!
//! ```text
//! request:  [opcode][operand...]
//! response: [response opcode][value...]
//!           [0x1C][request opcode][response code]
//! ```
//!
//! A request is either a getter, a setter, or a session control. A getter is answered by the
//! opcode of its response followed by the current value. Setters and session controls are
//! answered by the response code opcode. An operation whose feature is not supported by the
//! sensor is answered the same as an unknown opcode.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod calibration;
pub mod config;

use calibration::{CalibrationRecord, CalibrationStore};
use cgms_core::{BitFlags, Feature, SFloat, SensorStatus};
use cgms_core::{TransferFormatError, TransferFormatInto, TransferFormatTryFrom};
use config::Configuration;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! opcodes {
    ( $( $(#[$doc:meta])* $name:ident = $val:literal => $desc:literal, )* ) => {
        /// SOCP opcodes
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum Opcode {
            $( $(#[$doc])* $name, )*
        }

        impl Opcode {
            pub fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $( $val => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            pub fn into_raw(self) -> u8 {
                match self {
                    $( Opcode::$name => $val, )*
                }
            }
        }

        impl core::fmt::Display for Opcode {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $( Opcode::$name => f.write_str($desc), )*
                }
            }
        }
    };
}

opcodes! {
    SetCommunicationInterval = 0x01 => "set CGM communication interval",
    GetCommunicationInterval = 0x02 => "get CGM communication interval",
    CommunicationIntervalResponse = 0x03 => "CGM communication interval response",
    SetGlucoseCalibrationValue = 0x04 => "set glucose calibration value",
    GetGlucoseCalibrationValue = 0x05 => "get glucose calibration value",
    GlucoseCalibrationValueResponse = 0x06 => "glucose calibration value response",
    SetPatientHighAlertLevel = 0x07 => "set patient high alert level",
    GetPatientHighAlertLevel = 0x08 => "get patient high alert level",
    PatientHighAlertLevelResponse = 0x09 => "patient high alert level response",
    SetPatientLowAlertLevel = 0x0A => "set patient low alert level",
    GetPatientLowAlertLevel = 0x0B => "get patient low alert level",
    PatientLowAlertLevelResponse = 0x0C => "patient low alert level response",
    SetHypoAlertLevel = 0x0D => "set hypo alert level",
    GetHypoAlertLevel = 0x0E => "get hypo alert level",
    HypoAlertLevelResponse = 0x0F => "hypo alert level response",
    SetHyperAlertLevel = 0x10 => "set hyper alert level",
    GetHyperAlertLevel = 0x11 => "get hyper alert level",
    HyperAlertLevelResponse = 0x12 => "hyper alert level response",
    SetRateOfDecreaseAlertLevel = 0x13 => "set rate of decrease alert level",
    GetRateOfDecreaseAlertLevel = 0x14 => "get rate of decrease alert level",
    RateOfDecreaseAlertLevelResponse = 0x15 => "rate of decrease alert level response",
    SetRateOfIncreaseAlertLevel = 0x16 => "set rate of increase alert level",
    GetRateOfIncreaseAlertLevel = 0x17 => "get rate of increase alert level",
    RateOfIncreaseAlertLevelResponse = 0x18 => "rate of increase alert level response",
    ResetDeviceSpecificAlert = 0x19 => "reset device specific alert",
    StartSession = 0x1A => "start the session",
    StopSession = 0x1B => "stop the session",
    /// Only sent by the server
    ResponseCode = 0x1C => "response code",
}

impl Opcode {
    /// Get the length of the operand of a request with this opcode
    ///
    /// `None` is returned for the opcodes only sent by the server.
    pub fn operand_len(&self) -> Option<usize> {
        match self {
            Opcode::SetCommunicationInterval => Some(1),
            Opcode::SetGlucoseCalibrationValue => Some(CalibrationRecord::LEN),
            Opcode::GetGlucoseCalibrationValue => Some(2),
            Opcode::GetCommunicationInterval
            | Opcode::ResetDeviceSpecificAlert
            | Opcode::StartSession
            | Opcode::StopSession => Some(0),
            _ => match AlertLevel::from_opcode(*self) {
                Some((_, Access::Set)) => Some(2),
                Some((_, Access::Get)) => Some(0),
                None => None,
            },
        }
    }

    /// Get the feature required for the operation of this opcode
    pub fn required_feature(&self) -> Option<Feature> {
        match self {
            Opcode::SetGlucoseCalibrationValue
            | Opcode::GetGlucoseCalibrationValue
            | Opcode::GlucoseCalibrationValueResponse => Some(Feature::CalibrationSupported),
            Opcode::ResetDeviceSpecificAlert => Some(Feature::DeviceSpecificAlert),
            _ => AlertLevel::from_opcode(*self)
                .map(|(level, _)| level)
                .or_else(|| AlertLevel::from_response_opcode(*self))
                .map(|level| level.required_feature()),
        }
    }

    /// Check if the operation of this opcode is supported with `features`
    pub fn is_supported(&self, features: BitFlags<Feature>) -> bool {
        self.required_feature().map_or(true, |feature| features.contains(feature))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Set,
    Get,
}

/// The alert levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlertLevel {
    PatientHigh,
    PatientLow,
    Hypo,
    Hyper,
    RateOfDecrease,
    RateOfIncrease,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 6] = [
        AlertLevel::PatientHigh,
        AlertLevel::PatientLow,
        AlertLevel::Hypo,
        AlertLevel::Hyper,
        AlertLevel::RateOfDecrease,
        AlertLevel::RateOfIncrease,
    ];

    /// Get the opcodes of the setter, getter, and response of this alert level
    fn opcodes(&self) -> [Opcode; 3] {
        match self {
            AlertLevel::PatientHigh => [
                Opcode::SetPatientHighAlertLevel,
                Opcode::GetPatientHighAlertLevel,
                Opcode::PatientHighAlertLevelResponse,
            ],
            AlertLevel::PatientLow => [
                Opcode::SetPatientLowAlertLevel,
                Opcode::GetPatientLowAlertLevel,
                Opcode::PatientLowAlertLevelResponse,
            ],
            AlertLevel::Hypo => [
                Opcode::SetHypoAlertLevel,
                Opcode::GetHypoAlertLevel,
                Opcode::HypoAlertLevelResponse,
            ],
            AlertLevel::Hyper => [
                Opcode::SetHyperAlertLevel,
                Opcode::GetHyperAlertLevel,
                Opcode::HyperAlertLevelResponse,
            ],
            AlertLevel::RateOfDecrease => [
                Opcode::SetRateOfDecreaseAlertLevel,
                Opcode::GetRateOfDecreaseAlertLevel,
                Opcode::RateOfDecreaseAlertLevelResponse,
            ],
            AlertLevel::RateOfIncrease => [
                Opcode::SetRateOfIncreaseAlertLevel,
                Opcode::GetRateOfIncreaseAlertLevel,
                Opcode::RateOfIncreaseAlertLevelResponse,
            ],
        }
    }

    pub fn set_opcode(&self) -> Opcode {
        self.opcodes()[0]
    }

    pub fn get_opcode(&self) -> Opcode {
        self.opcodes()[1]
    }

    pub fn response_opcode(&self) -> Opcode {
        self.opcodes()[2]
    }

    fn from_opcode(opcode: Opcode) -> Option<(Self, Access)> {
        Self::ALL.into_iter().find_map(|level| {
            if level.set_opcode() == opcode {
                Some((level, Access::Set))
            } else if level.get_opcode() == opcode {
                Some((level, Access::Get))
            } else {
                None
            }
        })
    }

    fn from_response_opcode(opcode: Opcode) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.response_opcode() == opcode)
    }

    /// Get the feature that must be supported to use this alert level
    pub fn required_feature(&self) -> Feature {
        match self {
            AlertLevel::PatientHigh | AlertLevel::PatientLow => Feature::PatientHighLowAlerts,
            AlertLevel::Hypo => Feature::HypoAlerts,
            AlertLevel::Hyper => Feature::HyperAlerts,
            AlertLevel::RateOfDecrease | AlertLevel::RateOfIncrease => Feature::RateOfIncreaseDecreaseAlerts,
        }
    }
}

/// The response codes of the response code opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResponseCode {
    Success,
    OpcodeNotSupported,
    InvalidOperand,
    ProcedureNotCompleted,
    ParameterOutOfRange,
}

impl ResponseCode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(ResponseCode::Success),
            0x02 => Some(ResponseCode::OpcodeNotSupported),
            0x03 => Some(ResponseCode::InvalidOperand),
            0x04 => Some(ResponseCode::ProcedureNotCompleted),
            0x05 => Some(ResponseCode::ParameterOutOfRange),
            _ => None,
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            ResponseCode::Success => 0x01,
            ResponseCode::OpcodeNotSupported => 0x02,
            ResponseCode::InvalidOperand => 0x03,
            ResponseCode::ProcedureNotCompleted => 0x04,
            ResponseCode::ParameterOutOfRange => 0x05,
        }
    }
}

impl core::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResponseCode::Success => f.write_str("success"),
            ResponseCode::OpcodeNotSupported => f.write_str("opcode not supported"),
            ResponseCode::InvalidOperand => f.write_str("invalid operand"),
            ResponseCode::ProcedureNotCompleted => f.write_str("procedure not completed"),
            ResponseCode::ParameterOutOfRange => f.write_str("parameter out of range"),
        }
    }
}

/// A request that could not be parsed
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid SOCP request (opcode {request_opcode:#04x}): {code}")]
pub struct RequestError {
    pub request_opcode: u8,
    pub code: ResponseCode,
}

/// A SOCP request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Request {
    /// Set the communication interval in minutes
    ///
    /// Zero disables periodic communication and `0xFF` sets the fastest interval supported.
    SetCommunicationInterval(u8),
    GetCommunicationInterval,
    SetGlucoseCalibrationValue(CalibrationRecord),
    /// Get the calibration record with the record number
    GetGlucoseCalibrationValue(u16),
    SetAlertLevel(AlertLevel, SFloat),
    GetAlertLevel(AlertLevel),
    ResetDeviceSpecificAlert,
    StartSession,
    StopSession,
}

impl Request {
    /// The communication interval value for the fastest interval
    pub const FASTEST_COMMUNICATION_INTERVAL: u8 = 0xFF;

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::SetCommunicationInterval(_) => Opcode::SetCommunicationInterval,
            Request::GetCommunicationInterval => Opcode::GetCommunicationInterval,
            Request::SetGlucoseCalibrationValue(_) => Opcode::SetGlucoseCalibrationValue,
            Request::GetGlucoseCalibrationValue(_) => Opcode::GetGlucoseCalibrationValue,
            Request::SetAlertLevel(level, _) => level.set_opcode(),
            Request::GetAlertLevel(level) => level.get_opcode(),
            Request::ResetDeviceSpecificAlert => Opcode::ResetDeviceSpecificAlert,
            Request::StartSession => Opcode::StartSession,
            Request::StopSession => Opcode::StopSession,
        }
    }

    /// Get the expected length of a request from its opcode
    ///
    /// The returned length does not include the E2E-CRC. `None` is returned if the opcode is
    /// missing, unknown, or only sent by the server.
    pub fn expected_len(raw: &[u8]) -> Option<usize> {
        let opcode = Opcode::from_raw(*raw.first()?)?;

        opcode.operand_len().map(|len| 1 + len)
    }

    /// Parse a request
    ///
    /// The input must not contain the E2E-CRC.
    pub fn parse(raw: &[u8]) -> Result<Self, RequestError> {
        let request_opcode = raw.first().copied().unwrap_or_default();

        let error = |code| RequestError { request_opcode, code };

        let opcode = Opcode::from_raw(request_opcode).ok_or(error(ResponseCode::OpcodeNotSupported))?;

        let operand_len = opcode.operand_len().ok_or(error(ResponseCode::OpcodeNotSupported))?;

        let operand = &raw[1..];

        if operand.len() != operand_len {
            return Err(error(ResponseCode::InvalidOperand));
        }

        let invalid_operand = |_: TransferFormatError| error(ResponseCode::InvalidOperand);

        let request = match opcode {
            Opcode::SetCommunicationInterval => Request::SetCommunicationInterval(operand[0]),
            Opcode::GetCommunicationInterval => Request::GetCommunicationInterval,
            Opcode::SetGlucoseCalibrationValue => Request::SetGlucoseCalibrationValue(
                <CalibrationRecord as TransferFormatTryFrom>::try_from(operand).map_err(invalid_operand)?,
            ),
            Opcode::GetGlucoseCalibrationValue => Request::GetGlucoseCalibrationValue(
                <u16 as TransferFormatTryFrom>::try_from(operand).map_err(invalid_operand)?,
            ),
            Opcode::ResetDeviceSpecificAlert => Request::ResetDeviceSpecificAlert,
            Opcode::StartSession => Request::StartSession,
            Opcode::StopSession => Request::StopSession,
            _ => match AlertLevel::from_opcode(opcode) {
                Some((level, Access::Set)) => Request::SetAlertLevel(
                    level,
                    <SFloat as TransferFormatTryFrom>::try_from(operand).map_err(invalid_operand)?,
                ),
                Some((level, Access::Get)) => Request::GetAlertLevel(level),
                None => return Err(error(ResponseCode::OpcodeNotSupported)),
            },
        };

        Ok(request)
    }
}

impl TransferFormatInto for Request {
    fn len_of_into(&self) -> usize {
        1 + self.opcode().operand_len().unwrap_or_default()
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        into_ret[0] = self.opcode().into_raw();

        match self {
            Request::SetCommunicationInterval(interval) => into_ret[1] = *interval,
            Request::SetGlucoseCalibrationValue(record) => record.build_into_ret(&mut into_ret[1..]),
            Request::GetGlucoseCalibrationValue(number) => number.build_into_ret(&mut into_ret[1..]),
            Request::SetAlertLevel(_, value) => value.build_into_ret(&mut into_ret[1..]),
            _ => (),
        }
    }
}

/// A SOCP response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    CommunicationInterval(u8),
    GlucoseCalibrationValue(CalibrationRecord),
    AlertLevel(AlertLevel, SFloat),
    ResponseCode { request_opcode: u8, code: ResponseCode },
}

impl Response {
    fn code(request_opcode: Opcode, code: ResponseCode) -> Self {
        Response::ResponseCode {
            request_opcode: request_opcode.into_raw(),
            code,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Response::CommunicationInterval(_) => Opcode::CommunicationIntervalResponse,
            Response::GlucoseCalibrationValue(_) => Opcode::GlucoseCalibrationValueResponse,
            Response::AlertLevel(level, _) => level.response_opcode(),
            Response::ResponseCode { .. } => Opcode::ResponseCode,
        }
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

impl TransferFormatInto for Response {
    fn len_of_into(&self) -> usize {
        1 + match self {
            Response::CommunicationInterval(_) => 1,
            Response::GlucoseCalibrationValue(_) => CalibrationRecord::LEN,
            Response::AlertLevel(..) => 2,
            Response::ResponseCode { .. } => 2,
        }
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        into_ret[0] = self.opcode().into_raw();

        match self {
            Response::CommunicationInterval(interval) => into_ret[1] = *interval,
            Response::GlucoseCalibrationValue(record) => record.build_into_ret(&mut into_ret[1..]),
            Response::AlertLevel(_, value) => value.build_into_ret(&mut into_ret[1..]),
            Response::ResponseCode { request_opcode, code } => {
                into_ret[1] = *request_opcode;

                into_ret[2] = code.into_raw();
            }
        }
    }
}

impl TransferFormatTryFrom for Response {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
        let opcode = raw
            .first()
            .and_then(|raw_opcode| Opcode::from_raw(*raw_opcode))
            .ok_or_else(|| TransferFormatError::from("unknown SOCP response opcode"))?;

        let value = &raw[1..];

        match opcode {
            Opcode::CommunicationIntervalResponse => {
                <u8 as TransferFormatTryFrom>::try_from(value).map(Response::CommunicationInterval)
            }
            Opcode::GlucoseCalibrationValueResponse => {
                <CalibrationRecord as TransferFormatTryFrom>::try_from(value).map(Response::GlucoseCalibrationValue)
            }
            Opcode::ResponseCode => {
                if value.len() != 2 {
                    return Err(TransferFormatError::bad_size("SOCP response code", 2, value.len()));
                }

                let code = ResponseCode::from_raw(value[1])
                    .ok_or_else(|| TransferFormatError::from("unknown SOCP response code"))?;

                Ok(Response::ResponseCode {
                    request_opcode: value[0],
                    code,
                })
            }
            _ => {
                let level = AlertLevel::from_response_opcode(opcode)
                    .ok_or_else(|| TransferFormatError::from("not a SOCP response opcode"))?;

                <SFloat as TransferFormatTryFrom>::try_from(value).map(|v| Response::AlertLevel(level, v))
            }
        }
    }
}

/// The state of the device used by the operations of the control point
pub struct DeviceState<'a> {
    /// The features supported by the sensor
    pub features: BitFlags<Feature>,
    /// The sensor status annunciation
    ///
    /// The session is stopped while [`SessionStopped`](SensorStatus::SessionStopped) is set.
    pub status: &'a mut BitFlags<SensorStatus>,
}

/// The Specific Ops Control Point
///
/// This contains the configuration and the calibration records changed through the control
/// point.
#[derive(Clone, Debug)]
pub struct SpecificOps {
    config: Configuration,
    calibrations: CalibrationStore,
}

impl SpecificOps {
    pub fn new(config: Configuration) -> Self {
        let calibrations = CalibrationStore::new(config.calibration_capacity);

        SpecificOps { config, calibrations }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn calibrations(&self) -> &CalibrationStore {
        &self.calibrations
    }

    /// Parse and execute a request
    ///
    /// `raw` must not contain the E2E-CRC. A request that cannot be parsed is turned into the
    /// response for it, so there is always a response.
    pub fn process(&mut self, raw: &[u8], state: DeviceState<'_>) -> Response {
        log::debug!("(SOCP) processing request {:x?}", raw);

        let opcode = raw.first().and_then(|raw_opcode| Opcode::from_raw(*raw_opcode));

        if let Some(opcode) = opcode.filter(|opcode| !opcode.is_supported(state.features)) {
            log::info!("(SOCP) {} is not supported by the features of the sensor", opcode);

            return Response::code(opcode, ResponseCode::OpcodeNotSupported);
        }

        match Request::parse(raw) {
            Ok(request) => self.execute(request, state),
            Err(e) => {
                log::info!("(SOCP) {}", e);

                e.into()
            }
        }
    }

    /// Execute a request
    pub fn execute(&mut self, request: Request, state: DeviceState<'_>) -> Response {
        let opcode = request.opcode();

        if !opcode.is_supported(state.features) {
            return Response::code(opcode, ResponseCode::OpcodeNotSupported);
        }

        let response = match request {
            Request::SetCommunicationInterval(interval) => {
                Response::code(opcode, self.set_communication_interval(interval))
            }
            Request::GetCommunicationInterval => Response::CommunicationInterval(self.config.communication_interval),
            Request::SetGlucoseCalibrationValue(record) => Response::code(opcode, self.calibrate(record, state.status)),
            Request::GetGlucoseCalibrationValue(record_number) => match self.calibrations.get(record_number) {
                Some(record) => Response::GlucoseCalibrationValue(*record),
                None => Response::code(opcode, ResponseCode::ParameterOutOfRange),
            },
            Request::SetAlertLevel(level, value) => {
                if value.is_special() {
                    Response::code(opcode, ResponseCode::ParameterOutOfRange)
                } else {
                    self.config.alert_levels.set(level, value);

                    Response::code(opcode, ResponseCode::Success)
                }
            }
            Request::GetAlertLevel(level) => Response::AlertLevel(level, self.config.alert_levels.get(level)),
            Request::ResetDeviceSpecificAlert => {
                state.status.remove(SensorStatus::DeviceSpecificAlert);

                Response::code(opcode, ResponseCode::Success)
            }
            Request::StartSession => Response::code(opcode, Self::set_session(state.status, true)),
            Request::StopSession => Response::code(opcode, Self::set_session(state.status, false)),
        };

        log::info!("(SOCP) {}: {:?}", opcode, response);

        response
    }

    fn set_communication_interval(&mut self, interval: u8) -> ResponseCode {
        let fastest = self.config.fastest_communication_interval;

        match interval {
            Request::FASTEST_COMMUNICATION_INTERVAL => {
                self.config.communication_interval = fastest;

                ResponseCode::Success
            }
            0 => {
                self.config.communication_interval = 0;

                ResponseCode::Success
            }
            interval if interval < fastest => ResponseCode::ParameterOutOfRange,
            interval => {
                self.config.communication_interval = interval;

                ResponseCode::Success
            }
        }
    }

    fn calibrate(&mut self, record: CalibrationRecord, status: &mut BitFlags<SensorStatus>) -> ResponseCode {
        if record.glucose_concentration.is_special() {
            return ResponseCode::ParameterOutOfRange;
        }

        if status.contains(SensorStatus::CalibrationNotAllowed) {
            return ResponseCode::ProcedureNotCompleted;
        }

        let stored = self.calibrations.store(CalibrationRecord {
            status: BitFlags::empty(),
            ..record
        });

        log::info!(
            "(SOCP) stored calibration record {} ({})",
            stored.record_number,
            stored.glucose_concentration
        );

        status.remove(SensorStatus::CalibrationRequired | SensorStatus::CalibrationRecommended);

        ResponseCode::Success
    }

    fn set_session(status: &mut BitFlags<SensorStatus>, start: bool) -> ResponseCode {
        let is_stopped = status.contains(SensorStatus::SessionStopped);

        if is_stopped != start {
            return ResponseCode::ProcedureNotCompleted;
        }

        if start {
            status.remove(SensorStatus::SessionStopped)
        } else {
            status.insert(SensorStatus::SessionStopped)
        }

        ResponseCode::Success
    }
}

impl Default for SpecificOps {
    fn default() -> Self {
        SpecificOps::new(Configuration::default())
    }
}

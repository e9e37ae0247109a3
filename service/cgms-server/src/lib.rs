//! The Continuous Glucose Monitoring Service
//!
//! [`CgmsService`] owns every piece of state of the service: the glucose records, the
//! configuration of the Specific Ops Control Point, the sensor status, and the client
//! characteristic configurations. It is driven by the [`GattEvent`]s of whatever GATT server
//! hosts it, and sends its notifications and indications through a [`GattBearer`].
//!
//! ```
//! # use cgms_server::{CgmsService, ServiceConfig, GattBearer, GattEvent, EventResponse};
//! struct Log;
//!
//! impl GattBearer for Log {
//!     type Error = std::convert::Infallible;
//!
//!     fn send_notification(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
//!         println!("notification on {handle:#x}: {value:x?}");
//!         Ok(())
//!     }
//!
//!     fn send_indication(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
//!         println!("indication on {handle:#x}: {value:x?}");
//!         Ok(())
//!     }
//! }
//!
//! let config = ServiceConfig::default();
//!
//! let mut service = CgmsService::new(config).unwrap();
//!
//! let event = GattEvent::CharacteristicRead { handle: config.handles.feature };
//!
//! let response = service.process_event(event, &mut Log).unwrap();
//!
//! assert!(matches!(response, EventResponse::ReadValue(_)));
//! ```
//!
//! # E2E-CRC
//! When the sensor supports the E2E-CRC feature every value of the measurement, status, session
//! start time, session run time, and the two control points is followed by the CRC. Values
//! written by the client must also end with the CRC. A control point write with a missing or
//! invalid CRC is rejected *and* answered with an indication containing the invalid operand
//! response code.
//!
//! # Procedures
//! Only one procedure can be in progress on a control point. A procedure is in progress from the
//! write of the request until the client confirms the indication of the response. A write to a
//! control point while its procedure is in progress is rejected, except for the abort operation
//! of the record access control point.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod bearer;
pub mod characteristic;
mod config;
mod error;
#[cfg(feature = "tokio")]
pub mod task;

pub use bearer::{EventResponse, GattBearer, GattEvent};
pub use config::ServiceConfig;
pub use error::{AttError, ConfigError, ServiceError};

use characteristic::{Characteristic, ClientConfiguration, SessionStartTime, StatusValue};
use cgms_core::crc::{self, CrcError};
use cgms_core::feature::FeatureValue;
use cgms_core::{BitFlags, Feature, SensorStatus, TransferFormatInto, TransferFormatTryFrom};
use cgms_racp::record::{GlucoseRecord, Measurement, RecordStore};
use cgms_socp::{DeviceState, SpecificOps};

/// The state of the procedure of a control point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Procedure {
    Idle,
    /// The response was indicated but the client has not confirmed it
    AwaitingConfirmation,
}

/// The client characteristic configurations and the procedure states of a connection
#[derive(Clone, Copy, Debug)]
struct ConnectionState {
    measurement_cccd: BitFlags<ClientConfiguration>,
    racp_cccd: BitFlags<ClientConfiguration>,
    socp_cccd: BitFlags<ClientConfiguration>,
    racp_procedure: Procedure,
    socp_procedure: Procedure,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState {
            measurement_cccd: BitFlags::empty(),
            racp_cccd: BitFlags::empty(),
            socp_cccd: BitFlags::empty(),
            racp_procedure: Procedure::Idle,
            socp_procedure: Procedure::Idle,
        }
    }
}

/// The Continuous Glucose Monitoring Service
pub struct CgmsService {
    config: ServiceConfig,
    records: RecordStore,
    specific_ops: SpecificOps,
    status: BitFlags<SensorStatus>,
    status_value: Vec<u8>,
    session_start_time: SessionStartTime,
    connected: bool,
    connection: ConnectionState,
}

impl CgmsService {
    /// Create a new `CgmsService`
    ///
    /// An error is returned if the handles of `config` are not valid or a store capacity is
    /// larger than [`ServiceConfig::MAX_CAPACITY`].
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let records = if config.demo_records {
            RecordStore::with_demo_records(config.record_capacity)
        } else {
            RecordStore::new(config.record_capacity)
        };

        let status = if config.session_stopped {
            SensorStatus::SessionStopped.into()
        } else {
            BitFlags::empty()
        };

        let mut service = CgmsService {
            config,
            records,
            specific_ops: SpecificOps::new(config.specific_ops),
            status,
            status_value: Vec::new(),
            session_start_time: SessionStartTime::default(),
            connected: false,
            connection: ConnectionState::default(),
        };

        service.refresh_status();

        log::info!(
            "(CGMS) service created with {} records, E2E-CRC {}",
            service.records.len(),
            if service.is_e2e_crc() { "enabled" } else { "disabled" }
        );

        Ok(service)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn specific_ops(&self) -> &SpecificOps {
        &self.specific_ops
    }

    /// Get the sensor status annunciation
    pub fn status(&self) -> BitFlags<SensorStatus> {
        self.status
    }

    pub fn session_start_time(&self) -> &SessionStartTime {
        &self.session_start_time
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_e2e_crc(&self) -> bool {
        self.config.is_e2e_crc()
    }

    pub fn is_session_running(&self) -> bool {
        !self.status.contains(SensorStatus::SessionStopped)
    }

    /// Get the client characteristic configuration of a descriptor
    ///
    /// `None` is returned if `handle` is not the handle of a client characteristic configuration
    /// descriptor of this service.
    pub fn client_configuration(&self, handle: u16) -> Option<BitFlags<ClientConfiguration>> {
        match self.config.handles.characteristic(handle)? {
            Characteristic::MeasurementClientConfiguration => Some(self.connection.measurement_cccd),
            Characteristic::RecordAccessClientConfiguration => Some(self.connection.racp_cccd),
            Characteristic::SpecificOpsClientConfiguration => Some(self.connection.socp_cccd),
            _ => None,
        }
    }

    /// Get the procedure state of a control point
    pub fn procedure(&self, handle: u16) -> Option<Procedure> {
        match self.config.handles.characteristic(handle)? {
            Characteristic::RecordAccessControlPoint => Some(self.connection.racp_procedure),
            Characteristic::SpecificOpsControlPoint => Some(self.connection.socp_procedure),
            _ => None,
        }
    }

    /// Set the bits of the sensor status annunciation
    ///
    /// This is for the conditions detected by the sensor, the CGM Status value is updated.
    pub fn set_status<S>(&mut self, status: S, set: bool)
    where
        S: Into<BitFlags<SensorStatus>>,
    {
        if set {
            self.status.insert(status)
        } else {
            self.status.remove(status)
        }

        self.refresh_status();
    }

    /// Re-encode the value of the CGM Status characteristic
    ///
    /// The value is re-encoded whenever the sensor status or the latest record changes.
    fn refresh_status(&mut self) {
        let value = StatusValue {
            time_offset: self.records.latest_active().map_or(0, |record| record.time_offset),
            status: self.status,
        };

        self.status_value = self.with_crc(TransferFormatInto::into(&value));

        log::debug!("(CGMS) status value: {:x?}", self.status_value);
    }

    fn with_crc(&self, mut value: Vec<u8>) -> Vec<u8> {
        crc::extend_with_crc(&mut value, self.is_e2e_crc());

        value
    }

    /// Remove the E2E-CRC from a written value
    ///
    /// `payload_len` is the length of the value without the CRC, when it is `None` the last two
    /// bytes of the value are taken as the CRC.
    fn strip_crc<'a>(&self, value: &'a [u8], payload_len: Option<usize>) -> Result<&'a [u8], CrcError> {
        if !self.is_e2e_crc() {
            return Ok(value);
        }

        let payload_len = payload_len.unwrap_or_else(|| value.len().saturating_sub(crc::CRC_LEN));

        if payload_len == 0 {
            return Err(CrcError::Missing);
        }

        crc::verify(value, payload_len)?;

        Ok(&value[..payload_len])
    }

    /// Process a GATT event
    ///
    /// The returned `EventResponse` is how the GATT server should respond to the client. An error
    /// is only returned when the bearer fails.
    pub fn process_event<B>(
        &mut self,
        event: GattEvent<'_>,
        mut bearer: B,
    ) -> Result<EventResponse, ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        match event {
            GattEvent::Connected => {
                log::info!("(CGMS) connected");

                self.connected = true;

                Ok(EventResponse::Ignored)
            }
            GattEvent::Disconnected => {
                log::info!("(CGMS) disconnected");

                self.connected = false;

                self.connection = ConnectionState::default();

                Ok(EventResponse::Ignored)
            }
            GattEvent::CharacteristicRead { handle } => Ok(self.read(handle)),
            GattEvent::CharacteristicWritten { handle, value } => self.write(handle, value, &mut bearer),
            GattEvent::IndicationConfirmed { handle } => {
                let procedure = match self.config.handles.characteristic(handle) {
                    Some(Characteristic::RecordAccessControlPoint) => &mut self.connection.racp_procedure,
                    Some(Characteristic::SpecificOpsControlPoint) => &mut self.connection.socp_procedure,
                    _ => return Ok(EventResponse::Ignored),
                };

                *procedure = Procedure::Idle;

                log::debug!("(CGMS) indication confirmed on handle {:#06x}", handle);

                Ok(EventResponse::Ignored)
            }
        }
    }

    fn read(&self, handle: u16) -> EventResponse {
        let Some(characteristic) = self.config.handles.characteristic(handle) else {
            log::warn!("(CGMS) read of unknown handle {:#06x}", handle);

            return EventResponse::Rejected(AttError::InvalidHandle);
        };

        let value = match characteristic {
            Characteristic::Feature => TransferFormatInto::into(&FeatureValue {
                features: self.config.features,
                type_sample_location: self.config.type_sample_location,
            }),
            Characteristic::Status => self.status_value.clone(),
            Characteristic::SessionStartTime => self.with_crc(TransferFormatInto::into(&self.session_start_time)),
            Characteristic::SessionRunTime => self.with_crc(TransferFormatInto::into(&self.config.session_run_time)),
            Characteristic::MeasurementClientConfiguration
            | Characteristic::RecordAccessClientConfiguration
            | Characteristic::SpecificOpsClientConfiguration => self
                .client_configuration(handle)
                .unwrap_or_default()
                .bits()
                .to_le_bytes()
                .to_vec(),
            Characteristic::Measurement
            | Characteristic::RecordAccessControlPoint
            | Characteristic::SpecificOpsControlPoint => {
                log::warn!("(CGMS) read of {:?} is not permitted", characteristic);

                return EventResponse::Rejected(AttError::ReadNotPermitted);
            }
        };

        EventResponse::ReadValue(value)
    }

    fn write<B>(&mut self, handle: u16, value: &[u8], bearer: B) -> Result<EventResponse, ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        log::debug!("(CGMS) write to handle {:#06x}: {:x?}", handle, value);

        let Some(characteristic) = self.config.handles.characteristic(handle) else {
            log::warn!("(CGMS) write to unknown handle {:#06x}", handle);

            return Ok(EventResponse::Rejected(AttError::InvalidHandle));
        };

        match characteristic {
            Characteristic::MeasurementClientConfiguration => {
                Ok(Self::write_cccd(&mut self.connection.measurement_cccd, value))
            }
            Characteristic::RecordAccessClientConfiguration => {
                Ok(Self::write_cccd(&mut self.connection.racp_cccd, value))
            }
            Characteristic::SpecificOpsClientConfiguration => {
                Ok(Self::write_cccd(&mut self.connection.socp_cccd, value))
            }
            Characteristic::SessionStartTime => Ok(self.write_session_start_time(value)),
            Characteristic::RecordAccessControlPoint => self.write_racp(value, bearer),
            Characteristic::SpecificOpsControlPoint => self.write_socp(value, bearer),
            Characteristic::Measurement
            | Characteristic::Feature
            | Characteristic::Status
            | Characteristic::SessionRunTime => {
                log::warn!("(CGMS) write to {:?} is not permitted", characteristic);

                Ok(EventResponse::Rejected(AttError::WriteNotPermitted))
            }
        }
    }

    fn write_cccd(cccd: &mut BitFlags<ClientConfiguration>, value: &[u8]) -> EventResponse {
        match <u16 as TransferFormatTryFrom>::try_from(value) {
            Ok(bits) => {
                *cccd = BitFlags::from_bits_truncate(bits);

                EventResponse::WriteAccepted
            }
            Err(_) => EventResponse::Rejected(AttError::InvalidAttributeValueLength),
        }
    }

    fn write_session_start_time(&mut self, value: &[u8]) -> EventResponse {
        let payload = match self.strip_crc(value, Some(SessionStartTime::LEN)) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("(CGMS) session start time rejected, {}", e);

                return EventResponse::Rejected(e.into());
            }
        };

        let time = match <SessionStartTime as TransferFormatTryFrom>::try_from(payload) {
            Ok(time) => time,
            Err(_) => return EventResponse::Rejected(AttError::InvalidAttributeValueLength),
        };

        if !time.is_valid() {
            log::warn!("(CGMS) session start time {:?} is out of range", time);

            return EventResponse::Rejected(AttError::OutOfRange);
        }

        self.session_start_time = time;

        EventResponse::WriteAccepted
    }

    /// Check that a control point can be written to
    fn check_control_point(
        cccd: BitFlags<ClientConfiguration>,
        procedure: Procedure,
        is_abort: bool,
    ) -> Result<(), AttError> {
        if !cccd.contains(ClientConfiguration::Indication) {
            Err(AttError::CccdImproperlyConfigured)
        } else if procedure == Procedure::AwaitingConfirmation && !is_abort {
            Err(AttError::ProcedureAlreadyInProgress)
        } else {
            Ok(())
        }
    }

    fn write_racp<B>(&mut self, value: &[u8], mut bearer: B) -> Result<EventResponse, ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        let handle = self.config.handles.racp;

        let request_opcode = value.first().copied().unwrap_or_default();

        let is_abort = request_opcode == cgms_racp::Opcode::AbortOperation.into_raw();

        if let Err(e) = Self::check_control_point(self.connection.racp_cccd, self.connection.racp_procedure, is_abort) {
            log::warn!("(RACP) write rejected, {}", e);

            return Ok(EventResponse::Rejected(e));
        }

        let payload = match self.strip_crc(value, cgms_racp::Request::expected_len(value)) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("(RACP) write rejected, {}", e);

                let response = cgms_racp::Response::ResponseCode {
                    request_opcode,
                    code: cgms_racp::ResponseCode::InvalidOperand,
                };

                self.indicate(&mut bearer, handle, TransferFormatInto::into(&response))?;

                return Ok(EventResponse::Rejected(e.into()));
            }
        };

        let evaluation = cgms_racp::process(payload, &mut self.records);

        if evaluation.is_report() {
            if self.connection.measurement_cccd.contains(ClientConfiguration::Notification) {
                for index in evaluation.selected.iter().copied() {
                    if let Some(record) = self.records.get(index) {
                        let measurement = Measurement::new(record, self.is_e2e_crc());

                        bearer
                            .send_notification(self.config.handles.measurement, &TransferFormatInto::into(&measurement))
                            .map_err(ServiceError::Bearer)?;
                    }
                }
            } else {
                log::warn!(
                    "(RACP) notifications are not enabled, skipping {} measurements",
                    evaluation.selected.len()
                );
            }
        }

        if evaluation.opcode == Some(cgms_racp::Opcode::DeleteStoredRecords) {
            self.refresh_status();
        }

        self.indicate(&mut bearer, handle, TransferFormatInto::into(&evaluation.response))?;

        Ok(EventResponse::WriteAccepted)
    }

    fn write_socp<B>(&mut self, value: &[u8], mut bearer: B) -> Result<EventResponse, ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        let handle = self.config.handles.socp;

        if let Err(e) = Self::check_control_point(self.connection.socp_cccd, self.connection.socp_procedure, false) {
            log::warn!("(SOCP) write rejected, {}", e);

            return Ok(EventResponse::Rejected(e));
        }

        let payload = match self.strip_crc(value, cgms_socp::Request::expected_len(value)) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("(SOCP) write rejected, {}", e);

                let response = cgms_socp::Response::ResponseCode {
                    request_opcode: value.first().copied().unwrap_or_default(),
                    code: cgms_socp::ResponseCode::InvalidOperand,
                };

                self.indicate(&mut bearer, handle, TransferFormatInto::into(&response))?;

                return Ok(EventResponse::Rejected(e.into()));
            }
        };

        let previous_status = self.status;

        let state = DeviceState {
            features: self.config.features,
            status: &mut self.status,
        };

        let response = self.specific_ops.process(payload, state);

        if previous_status != self.status {
            log::info!("(CGMS) sensor status changed to {:?}", self.status);

            self.refresh_status();
        }

        self.indicate(&mut bearer, handle, TransferFormatInto::into(&response))?;

        Ok(EventResponse::WriteAccepted)
    }

    /// Send the response of a control point
    fn indicate<B>(&mut self, bearer: &mut B, handle: u16, response: Vec<u8>) -> Result<(), ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        let value = self.with_crc(response);

        log::debug!("(CGMS) indicating {:x?} on handle {:#06x}", value, handle);

        bearer.send_indication(handle, &value).map_err(ServiceError::Bearer)?;

        if handle == self.config.handles.racp {
            self.connection.racp_procedure = Procedure::AwaitingConfirmation
        } else {
            self.connection.socp_procedure = Procedure::AwaitingConfirmation
        }

        Ok(())
    }

    /// Add a new measurement
    ///
    /// The measurement is stored and, when a client is connected and has enabled notifications,
    /// sent as a notification. The sensor status and the warnings for the alert levels are added
    /// to the annunciation of the record. The trend and quality are dropped if they are not
    /// supported by the sensor.
    ///
    /// The index of the record within the record store is returned.
    pub fn push_measurement<B>(
        &mut self,
        mut record: GlucoseRecord,
        mut bearer: B,
    ) -> Result<usize, ServiceError<B::Error>>
    where
        B: GattBearer,
    {
        if !self.is_session_running() {
            return Err(ServiceError::SessionStopped);
        }

        let features = self.config.features;

        if !features.contains(Feature::TrendInformation) {
            record.trend = None
        }

        if !features.contains(Feature::Quality) {
            record.quality = None
        }

        let warnings = self.specific_ops.config().alert_levels.warnings(
            record.glucose_concentration,
            record.trend,
            features,
        );

        record.annunciation |= self.status | warnings;

        let index = self.records.push(record)?;

        log::info!(
            "(CGMS) new measurement {} at time offset {}",
            record.glucose_concentration,
            record.time_offset
        );

        self.refresh_status();

        if self.connected && self.connection.measurement_cccd.contains(ClientConfiguration::Notification) {
            let measurement = Measurement::new(&record, self.is_e2e_crc());

            bearer
                .send_notification(self.config.handles.measurement, &TransferFormatInto::into(&measurement))
                .map_err(ServiceError::Bearer)?;
        }

        Ok(index)
    }
}

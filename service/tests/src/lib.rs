//! Service integration test framework
//!
//! A [`Collector`] plays the part of the client connected to a [`CgmsService`]. Everything the
//! service sends is captured by a [`RecordingBearer`] so that the tests can check the
//! notifications and indications made for each write.

use cgms_core::crc;
use cgms_core::{TransferFormatInto, TransferFormatTryFrom};
use cgms_racp::record::{GlucoseRecord, Measurement};
use cgms_server::{CgmsService, EventResponse, GattBearer, GattEvent, ServiceConfig};
use std::convert::Infallible;

/// A notification or indication sent by the service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub handle: u16,
    pub value: Vec<u8>,
}

/// A bearer that records everything sent through it
#[derive(Debug, Default)]
pub struct RecordingBearer {
    pub notifications: Vec<Sent>,
    pub indications: Vec<Sent>,
}

impl RecordingBearer {
    pub fn take_notifications(&mut self) -> Vec<Sent> {
        core::mem::take(&mut self.notifications)
    }

    pub fn take_indications(&mut self) -> Vec<Sent> {
        core::mem::take(&mut self.indications)
    }
}

impl GattBearer for RecordingBearer {
    type Error = Infallible;

    fn send_notification(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        self.notifications.push(Sent {
            handle,
            value: value.to_vec(),
        });

        Ok(())
    }

    fn send_indication(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        self.indications.push(Sent {
            handle,
            value: value.to_vec(),
        });

        Ok(())
    }
}

/// Error of a [`ClosedBearer`]
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("the bearer is closed")]
pub struct BearerClosed;

/// A bearer that fails every send
#[derive(Debug, Default)]
pub struct ClosedBearer;

impl GattBearer for ClosedBearer {
    type Error = BearerClosed;

    fn send_notification(&mut self, _: u16, _: &[u8]) -> Result<(), Self::Error> {
        Err(BearerClosed)
    }

    fn send_indication(&mut self, _: u16, _: &[u8]) -> Result<(), Self::Error> {
        Err(BearerClosed)
    }
}

/// Append the E2E-CRC to `value` if `enabled` is true
pub fn with_crc(value: &[u8], enabled: bool) -> Vec<u8> {
    let mut value = value.to_vec();

    crc::extend_with_crc(&mut value, enabled);

    value
}

/// The client side of a connection to the service
pub struct Collector {
    pub service: CgmsService,
    pub bearer: RecordingBearer,
}

impl Collector {
    /// Create a service from `config` and connect to it
    ///
    /// The collector enables notifications of the measurement characteristic and indications of
    /// both control points.
    pub fn connect(config: ServiceConfig) -> Self {
        let service = CgmsService::new(config).expect("invalid service configuration");

        let mut collector = Collector {
            service,
            bearer: RecordingBearer::default(),
        };

        let handles = config.handles;

        collector.event(GattEvent::Connected);

        assert_eq!(EventResponse::WriteAccepted, collector.write_raw(handles.measurement_cccd, &[1, 0]));
        assert_eq!(EventResponse::WriteAccepted, collector.write_raw(handles.racp_cccd, &[2, 0]));
        assert_eq!(EventResponse::WriteAccepted, collector.write_raw(handles.socp_cccd, &[2, 0]));

        collector
    }

    pub fn is_e2e_crc(&self) -> bool {
        self.service.is_e2e_crc()
    }

    pub fn event(&mut self, event: GattEvent<'_>) -> EventResponse {
        self.service
            .process_event(event, &mut self.bearer)
            .expect("failed to process event")
    }

    /// Write `value` as is to the attribute at `handle`
    pub fn write_raw(&mut self, handle: u16, value: &[u8]) -> EventResponse {
        self.event(GattEvent::CharacteristicWritten { handle, value })
    }

    /// Write `value` to the attribute at `handle`, appending the E2E-CRC if it is enabled
    pub fn write(&mut self, handle: u16, value: &[u8]) -> EventResponse {
        let value = with_crc(value, self.is_e2e_crc());

        self.write_raw(handle, &value)
    }

    pub fn read(&mut self, handle: u16) -> Vec<u8> {
        match self.event(GattEvent::CharacteristicRead { handle }) {
            EventResponse::ReadValue(value) => value,
            response => panic!("failed to read handle {handle:#06x}: {response:?}"),
        }
    }

    /// Read a value and remove its E2E-CRC
    ///
    /// This panics if the CRC is not valid.
    pub fn read_checked(&mut self, handle: u16) -> Vec<u8> {
        let value = self.read(handle);

        self.check_crc(value)
    }

    pub fn confirm(&mut self, handle: u16) {
        assert_eq!(EventResponse::Ignored, self.event(GattEvent::IndicationConfirmed { handle }));
    }

    fn check_crc(&self, mut value: Vec<u8>) -> Vec<u8> {
        if self.is_e2e_crc() {
            let payload_len = value.len() - crc::CRC_LEN;

            crc::verify(&value, payload_len).expect("invalid E2E-CRC");

            value.truncate(payload_len);
        }

        value
    }

    /// Take the single indication sent on `handle`, confirm it, and remove its E2E-CRC
    pub fn take_indication(&mut self, handle: u16) -> Vec<u8> {
        let mut indications = self.bearer.take_indications();

        assert_eq!(1, indications.len(), "expected one indication, sent {indications:x?}");

        let Sent { handle: sent_on, value } = indications.remove(0);

        assert_eq!(handle, sent_on);

        self.confirm(handle);

        self.check_crc(value)
    }

    /// Take the notified measurements
    pub fn take_measurements(&mut self) -> Vec<GlucoseRecord> {
        let handle = self.service.config().handles.measurement;

        let e2e_crc = self.is_e2e_crc();

        self.bearer
            .take_notifications()
            .into_iter()
            .map(|sent| {
                assert_eq!(handle, sent.handle);

                Measurement::parse(&sent.value, e2e_crc).expect("invalid measurement")
            })
            .collect()
    }

    /// Write a request to the record access control point
    ///
    /// The measurements sent for the request and the response are returned.
    pub fn racp(&mut self, request: &[u8]) -> (Vec<GlucoseRecord>, cgms_racp::Response) {
        let handle = self.service.config().handles.racp;

        assert_eq!(EventResponse::WriteAccepted, self.write(handle, request));

        let measurements = self.take_measurements();

        let response = self.take_indication(handle);

        let response = <cgms_racp::Response as TransferFormatTryFrom>::try_from(&response).expect("bad RACP response");

        (measurements, response)
    }

    pub fn racp_request(&mut self, request: cgms_racp::Request) -> (Vec<GlucoseRecord>, cgms_racp::Response) {
        self.racp(&TransferFormatInto::into(&request))
    }

    /// Write a request to the specific ops control point and get the response
    pub fn socp(&mut self, request: &[u8]) -> cgms_socp::Response {
        let handle = self.service.config().handles.socp;

        assert_eq!(EventResponse::WriteAccepted, self.write(handle, request));

        let response = self.take_indication(handle);

        <cgms_socp::Response as TransferFormatTryFrom>::try_from(&response).expect("bad SOCP response")
    }

    pub fn socp_request(&mut self, request: cgms_socp::Request) -> cgms_socp::Response {
        self.socp(&TransferFormatInto::into(&request))
    }
}

/// Get the encoded measurement of a record
pub fn measurement(record: &GlucoseRecord, e2e_crc: bool) -> Vec<u8> {
    TransferFormatInto::into(&Measurement::new(record, e2e_crc))
}

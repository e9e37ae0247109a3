//! A scripted collector
//!
//! The collector plays the part of the client. It goes through the procedures a collector makes
//! after connecting to a CGM sensor and logs what the service sends back.

use crate::bearer::Outgoing;
use cgms::core::crc;
use cgms::core::feature::FeatureValue;
use cgms::core::{TransferFormatInto, TransferFormatTryFrom};
use cgms::racp::record::Measurement;
use cgms::server::characteristic::{CharacteristicHandles, SessionStartTime, StatusValue};
use cgms::server::task::{ServiceEvent, ServiceHandle};
use cgms::server::EventResponse;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedReceiver;

pub type Handle = ServiceHandle<SendError<Outgoing>>;

pub struct Collector {
    service: Handle,
    outgoing: UnboundedReceiver<Outgoing>,
    handles: CharacteristicHandles,
    e2e_crc: bool,
}

impl Collector {
    pub fn new(service: Handle, outgoing: UnboundedReceiver<Outgoing>, handles: CharacteristicHandles) -> Self {
        Collector {
            service,
            outgoing,
            handles,
            e2e_crc: false,
        }
    }

    async fn write(&self, handle: u16, value: &[u8], with_crc: bool) -> anyhow::Result<EventResponse> {
        let mut value = value.to_vec();

        crc::extend_with_crc(&mut value, with_crc && self.e2e_crc);

        let response = self
            .service
            .event(ServiceEvent::CharacteristicWritten { handle, value })
            .await?;

        Ok(response)
    }

    async fn read(&self, handle: u16) -> anyhow::Result<Vec<u8>> {
        match self.service.event(ServiceEvent::CharacteristicRead { handle }).await? {
            EventResponse::ReadValue(value) => Ok(value),
            response => anyhow::bail!("read of handle {:#06x} failed: {:?}", handle, response),
        }
    }

    fn strip_crc(&self, mut value: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        if self.e2e_crc {
            let payload_len = value.len().saturating_sub(crc::CRC_LEN);

            crc::verify(&value, payload_len)?;

            value.truncate(payload_len);
        }

        Ok(value)
    }

    /// Log a notified measurement
    ///
    /// Notifications on any other handle than the measurement characteristic are ignored, the
    /// return is whether the notification was a measurement.
    pub fn on_measurement(&self, handle: u16, value: &[u8]) -> anyhow::Result<bool> {
        if handle != self.handles.measurement {
            log::warn!("(collector) unexpected notification on {:#06x}", handle);

            return Ok(false);
        }

        let record = Measurement::parse(value, self.e2e_crc)?;

        log::info!(
            "(collector) measurement at {} min: {} mg/dL, trend {:?}, quality {:?}, annunciation {:?}",
            record.time_offset,
            record.glucose_concentration,
            record.trend.map(|trend| trend.to_f32()),
            record.quality.map(|quality| quality.to_f32()),
            record.annunciation
        );

        Ok(true)
    }

    /// Write a request to a control point and wait for its response
    ///
    /// Measurements notified before the response are logged.
    async fn control_point(&mut self, handle: u16, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        match self.write(handle, &request, true).await? {
            EventResponse::WriteAccepted => (),
            response => anyhow::bail!("write to control point {:#06x} failed: {:?}", handle, response),
        }

        loop {
            match self.outgoing.recv().await {
                Some(Outgoing::Notification { handle: notified, value }) => {
                    self.on_measurement(notified, &value)?;
                }
                Some(Outgoing::Indication { handle: indicated, value }) if indicated == handle => {
                    self.service.event(ServiceEvent::IndicationConfirmed { handle }).await?;

                    return self.strip_crc(value);
                }
                Some(Outgoing::Indication { handle, .. }) => {
                    log::warn!("(collector) unexpected indication on {:#06x}", handle)
                }
                None => anyhow::bail!("the service stopped"),
            }
        }
    }

    async fn racp(&mut self, request: cgms::racp::Request) -> anyhow::Result<cgms::racp::Response> {
        let response = self.control_point(self.handles.racp, TransferFormatInto::into(&request)).await?;

        Ok(<cgms::racp::Response as TransferFormatTryFrom>::try_from(&response)?)
    }

    async fn socp(&mut self, request: cgms::socp::Request) -> anyhow::Result<cgms::socp::Response> {
        let response = self.control_point(self.handles.socp, TransferFormatInto::into(&request)).await?;

        Ok(<cgms::socp::Response as TransferFormatTryFrom>::try_from(&response)?)
    }

    /// Connect to the service and run the setup procedures
    pub async fn connect(&mut self, start_time: SessionStartTime) -> anyhow::Result<()> {
        use cgms::racp::{Opcode, Operand, Operator, Request};

        self.service.event(ServiceEvent::Connected).await?;

        let feature = <FeatureValue as TransferFormatTryFrom>::try_from(&self.read(self.handles.feature).await?)?;

        self.e2e_crc = feature.features.contains(cgms::core::Feature::E2eCrc);

        log::info!("(collector) features: {:?}", feature.features);

        let status = self.strip_crc(self.read(self.handles.status).await?)?;

        let status = <StatusValue as TransferFormatTryFrom>::try_from(&status)?;

        log::info!("(collector) status: {:?}", status);

        for cccd in [self.handles.measurement_cccd, self.handles.racp_cccd, self.handles.socp_cccd] {
            let value = if cccd == self.handles.measurement_cccd { 1u16 } else { 2u16 };

            self.write(cccd, &value.to_le_bytes(), false).await?;
        }

        self.write(self.handles.session_start_time, &TransferFormatInto::into(&start_time), true)
            .await?;

        let count = self
            .racp(Request::new(Opcode::ReportNumberOfStoredRecords, Operator::AllRecords, Operand::None))
            .await?;

        log::info!("(collector) {}", count);

        let report = self
            .racp(Request::new(Opcode::ReportStoredRecords, Operator::AllRecords, Operand::None))
            .await?;

        log::info!("(collector) report: {}", report);

        let interval = self.socp(cgms::socp::Request::GetCommunicationInterval).await?;

        log::info!("(collector) communication interval: {:?}", interval);

        if let cgms::socp::Response::ResponseCode { code, .. } = self.socp(cgms::socp::Request::StartSession).await? {
            log::info!("(collector) start session: {:?}", code);
        }

        Ok(())
    }

    /// Log the measurements notified by the service
    ///
    /// This returns when the service stops.
    pub async fn listen(&mut self) -> anyhow::Result<()> {
        while let Some(outgoing) = self.outgoing.recv().await {
            match outgoing {
                Outgoing::Notification { handle, value } => {
                    self.on_measurement(handle, &value)?;
                }
                Outgoing::Indication { handle, .. } => {
                    self.service.event(ServiceEvent::IndicationConfirmed { handle }).await?;
                }
            }
        }

        Ok(())
    }
}

//! Tests for the procedures of the specific ops control point

use cgms_core::feature::default_features;
use cgms_core::{Feature, SFloat, SensorStatus, TransferFormatTryFrom, TypeSampleLocation};
use cgms_racp::record::GlucoseRecord;
use cgms_server::characteristic::StatusValue;
use cgms_server::{AttError, EventResponse, ServiceConfig};
use cgms_service_tests::Collector;
use cgms_socp::calibration::{CalibrationRecord, CalibrationStore};
use cgms_socp::{AlertLevel, Opcode, Request, Response, ResponseCode};

fn code(opcode: Opcode, code: ResponseCode) -> Response {
    Response::ResponseCode {
        request_opcode: opcode.into_raw(),
        code,
    }
}

fn status(collector: &mut Collector) -> StatusValue {
    let handle = collector.service.config().handles.status;

    let value = collector.read_checked(handle);

    <StatusValue as TransferFormatTryFrom>::try_from(&value).unwrap()
}

fn calibration(concentration: i16, calibration_time: u16) -> CalibrationRecord {
    CalibrationRecord {
        glucose_concentration: SFloat::new(concentration, 0).unwrap(),
        calibration_time,
        type_sample_location: TypeSampleLocation::default(),
        next_calibration_time: calibration_time + 60,
        record_number: 0,
        status: Default::default(),
    }
}

#[test]
fn communication_interval() {
    let mut collector = Collector::connect(ServiceConfig::default());

    assert_eq!(Response::CommunicationInterval(5), collector.socp(&[0x02]));

    assert_eq!(
        code(Opcode::SetCommunicationInterval, ResponseCode::Success),
        collector.socp(&[0x01, 0x0A])
    );

    assert_eq!(Response::CommunicationInterval(10), collector.socp(&[0x02]));

    collector.socp_request(Request::SetCommunicationInterval(Request::FASTEST_COMMUNICATION_INTERVAL));

    assert_eq!(Response::CommunicationInterval(1), collector.socp(&[0x02]));

    collector.socp(&[0x01, 0x00]);

    assert_eq!(Response::CommunicationInterval(0), collector.socp(&[0x02]));
}

#[test]
fn communication_interval_faster_than_supported() {
    let mut config = ServiceConfig::default();

    config.specific_ops.fastest_communication_interval = 3;

    let mut collector = Collector::connect(config);

    assert_eq!(
        code(Opcode::SetCommunicationInterval, ResponseCode::ParameterOutOfRange),
        collector.socp(&[0x01, 0x02])
    );

    assert_eq!(Response::CommunicationInterval(5), collector.socp(&[0x02]));
}

#[test]
fn calibration_values() {
    let mut collector = Collector::connect(ServiceConfig::default());

    collector
        .service
        .set_status(SensorStatus::CalibrationRequired | SensorStatus::CalibrationRecommended, true);

    let response = collector.socp_request(Request::SetGlucoseCalibrationValue(calibration(95, 30)));

    assert_eq!(code(Opcode::SetGlucoseCalibrationValue, ResponseCode::Success), response);

    collector.socp_request(Request::SetGlucoseCalibrationValue(calibration(105, 90)));

    let annunciation = status(&mut collector).status;

    assert!(!annunciation.intersects(SensorStatus::CalibrationRequired | SensorStatus::CalibrationRecommended));

    let Response::GlucoseCalibrationValue(first) = collector.socp_request(Request::GetGlucoseCalibrationValue(0))
    else {
        panic!("expected the calibration value response")
    };

    assert_eq!(0, first.record_number);
    assert_eq!(30, first.calibration_time);

    let Response::GlucoseCalibrationValue(last) =
        collector.socp_request(Request::GetGlucoseCalibrationValue(CalibrationStore::LAST_RECORD))
    else {
        panic!("expected the calibration value response")
    };

    assert_eq!(1, last.record_number);
    assert_eq!(SFloat::new(105, 0).unwrap(), last.glucose_concentration);

    assert_eq!(
        code(Opcode::GetGlucoseCalibrationValue, ResponseCode::ParameterOutOfRange),
        collector.socp_request(Request::GetGlucoseCalibrationValue(7))
    );
}

#[test]
fn calibration_not_allowed() {
    let mut collector = Collector::connect(ServiceConfig::default());

    collector.service.set_status(SensorStatus::CalibrationNotAllowed, true);

    assert_eq!(
        code(Opcode::SetGlucoseCalibrationValue, ResponseCode::ProcedureNotCompleted),
        collector.socp_request(Request::SetGlucoseCalibrationValue(calibration(95, 30)))
    );

    assert!(collector.service.specific_ops().calibrations().is_empty());
}

#[test]
fn alert_levels() {
    let mut collector = Collector::connect(ServiceConfig::default());

    assert_eq!(
        Response::AlertLevel(AlertLevel::Hypo, SFloat::new(55, 0).unwrap()),
        collector.socp_request(Request::GetAlertLevel(AlertLevel::Hypo))
    );

    for (index, level) in AlertLevel::ALL.into_iter().enumerate() {
        let value = SFloat::new(200 + index as i16, 0).unwrap();

        assert_eq!(
            code(level.set_opcode(), ResponseCode::Success),
            collector.socp_request(Request::SetAlertLevel(level, value))
        );

        assert_eq!(
            Response::AlertLevel(level, value),
            collector.socp_request(Request::GetAlertLevel(level))
        );
    }

    assert_eq!(
        code(Opcode::SetHyperAlertLevel, ResponseCode::ParameterOutOfRange),
        collector.socp_request(Request::SetAlertLevel(AlertLevel::Hyper, SFloat::NAN))
    );
}

#[test]
fn alert_level_warnings_in_measurements() {
    let mut collector = Collector::connect(ServiceConfig::default());

    collector.socp_request(Request::SetAlertLevel(AlertLevel::PatientHigh, SFloat::new(150, 0).unwrap()));

    let record = GlucoseRecord::new(SFloat::new(160, 0).unwrap(), 4);

    collector.service.push_measurement(record, &mut collector.bearer).unwrap();

    let measurements = collector.take_measurements();

    assert_eq!(1, measurements.len());

    assert!(measurements[0]
        .annunciation
        .contains(SensorStatus::ResultHigherThanPatientHighLevel));
}

#[test]
fn unsupported_features() {
    let config = ServiceConfig {
        features: default_features() & !(Feature::HypoAlerts | Feature::CalibrationSupported),
        ..ServiceConfig::default()
    };

    let mut collector = Collector::connect(config);

    assert_eq!(
        code(Opcode::GetHypoAlertLevel, ResponseCode::OpcodeNotSupported),
        collector.socp_request(Request::GetAlertLevel(AlertLevel::Hypo))
    );

    assert_eq!(
        code(Opcode::SetGlucoseCalibrationValue, ResponseCode::OpcodeNotSupported),
        collector.socp_request(Request::SetGlucoseCalibrationValue(calibration(95, 30)))
    );

    assert_eq!(
        Response::AlertLevel(AlertLevel::Hyper, SFloat::new(250, 0).unwrap()),
        collector.socp_request(Request::GetAlertLevel(AlertLevel::Hyper))
    );
}

#[test]
fn session_start_and_stop() {
    let mut collector = Collector::connect(ServiceConfig::default());

    assert!(!status(&mut collector).status.contains(SensorStatus::SessionStopped));

    assert_eq!(
        code(Opcode::StartSession, ResponseCode::ProcedureNotCompleted),
        collector.socp(&[0x1A])
    );

    assert_eq!(code(Opcode::StopSession, ResponseCode::Success), collector.socp(&[0x1B]));

    assert!(status(&mut collector).status.contains(SensorStatus::SessionStopped));

    let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), 4);

    assert!(collector.service.push_measurement(record, &mut collector.bearer).is_err());

    assert_eq!(code(Opcode::StartSession, ResponseCode::Success), collector.socp(&[0x1A]));

    assert!(collector.service.is_session_running());

    assert!(collector.service.push_measurement(record, &mut collector.bearer).is_ok());
}

#[test]
fn reset_device_specific_alert() {
    let mut collector = Collector::connect(ServiceConfig::default());

    collector.service.set_status(SensorStatus::DeviceSpecificAlert, true);

    assert!(status(&mut collector).status.contains(SensorStatus::DeviceSpecificAlert));

    assert_eq!(
        code(Opcode::ResetDeviceSpecificAlert, ResponseCode::Success),
        collector.socp(&[0x19])
    );

    assert!(!status(&mut collector).status.contains(SensorStatus::DeviceSpecificAlert));
}

#[test]
fn invalid_requests() {
    let mut collector = Collector::connect(ServiceConfig::default());

    assert_eq!(
        Response::ResponseCode {
            request_opcode: 0x30,
            code: ResponseCode::OpcodeNotSupported
        },
        collector.socp(&[0x30])
    );

    assert_eq!(
        code(Opcode::CommunicationIntervalResponse, ResponseCode::OpcodeNotSupported),
        collector.socp(&[0x03, 0x05])
    );

    assert_eq!(
        code(Opcode::SetCommunicationInterval, ResponseCode::InvalidOperand),
        collector.socp(&[0x01])
    );
}

#[test]
fn procedure_in_progress() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.socp;

    assert_eq!(EventResponse::WriteAccepted, collector.write(handle, &[0x02]));

    assert_eq!(
        EventResponse::Rejected(AttError::ProcedureAlreadyInProgress),
        collector.write(handle, &[0x02])
    );

    collector.take_indication(handle);

    assert_eq!(Response::CommunicationInterval(5), collector.socp(&[0x02]));
}

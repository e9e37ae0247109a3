//! Tests for the E2E-CRC of the service values

use cgms_core::crc::{crc16, verify};
use cgms_core::feature::FeatureValue;
use cgms_core::{Feature, SFloat, TransferFormatTryFrom};
use cgms_racp::record::{GlucoseRecord, Measurement, RecordStore};
use cgms_server::characteristic::SessionStartTime;
use cgms_server::{AttError, EventResponse, ServiceConfig};
use cgms_service_tests::{with_crc, Collector};

fn e2e_config() -> ServiceConfig {
    ServiceConfig::default().with_e2e_crc(true)
}

#[test]
fn feature_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.feature;

    let value = collector.read(handle);

    assert_eq!(6, value.len());

    assert_eq!(Ok(()), verify(&value, 4));

    let feature = <FeatureValue as TransferFormatTryFrom>::try_from(&value).unwrap();

    assert!(feature.features.contains(Feature::E2eCrc));
}

#[test]
fn feature_without_crc() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.feature;

    let value = collector.read(handle);

    assert_eq!([0xFF, 0xFF], value[4..]);
}

#[test]
fn measurements_carry_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.measurement;

    let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), 4);

    collector.service.push_measurement(record, &mut collector.bearer).unwrap();

    let sent = collector.bearer.take_notifications();

    assert_eq!(1, sent.len());

    assert_eq!(handle, sent[0].handle);

    let value = &sent[0].value;

    assert_eq!(usize::from(value[0]), value.len());

    assert_eq!(Ok(()), verify(value, value.len() - 2));

    assert_eq!(Ok(record), Measurement::parse(value, true));
}

#[test]
fn report_with_crc() {
    let mut collector = Collector::connect(e2e_config());

    let (measurements, _) = collector.racp(&[0x01, 0x01]);

    assert_eq!(RecordStore::demo_records().to_vec(), measurements);
}

#[test]
fn missing_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.racp;

    assert_eq!(
        EventResponse::Rejected(AttError::MissingCrc),
        collector.write_raw(handle, &[0x01, 0x01])
    );

    let response = collector.take_indication(handle);

    assert_eq!(vec![0x06, 0x01, 0x05], response);

    assert!(collector.bearer.notifications.is_empty());
}

#[test]
fn invalid_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.socp;

    let mut request = with_crc(&[0x02], true);

    request[1] ^= 0xFF;

    assert_eq!(
        EventResponse::Rejected(AttError::InvalidCrc),
        collector.write_raw(handle, &request)
    );

    assert_eq!(vec![0x1C, 0x02, 0x03], collector.take_indication(handle));
}

#[test]
fn control_point_with_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.socp;

    let request = [0x02, 0x95, 0x2C];

    assert_eq!(crc16(&[0x02]).to_le_bytes(), request[1..]);

    assert_eq!(EventResponse::WriteAccepted, collector.write_raw(handle, &request));

    assert_eq!(vec![0x03, 0x05], collector.take_indication(handle));
}

#[test]
fn session_start_time_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handle = collector.service.config().handles.session_start_time;

    let time = [0xE8, 0x07, 3, 14, 15, 9, 26, 0xEC, 4];

    assert_eq!(
        EventResponse::Rejected(AttError::MissingCrc),
        collector.write_raw(handle, &time)
    );

    let mut bad = with_crc(&time, true);

    bad[0] = 0xE9;

    assert_eq!(EventResponse::Rejected(AttError::InvalidCrc), collector.write_raw(handle, &bad));

    assert_eq!(EventResponse::WriteAccepted, collector.write(handle, &time));

    let read = collector.read_checked(handle);

    assert_eq!(time.to_vec(), read);

    assert_eq!(2024, collector.service.session_start_time().year);

    assert_eq!(
        Ok(*collector.service.session_start_time()),
        <SessionStartTime as TransferFormatTryFrom>::try_from(&read)
    );
}

#[test]
fn status_and_run_time_crc() {
    let mut collector = Collector::connect(e2e_config());

    let handles = collector.service.config().handles;

    let status = collector.read(handles.status);

    assert_eq!(7, status.len());

    assert_eq!(Ok(()), verify(&status, 5));

    let run_time = collector.read(handles.session_run_time);

    assert_eq!(4, run_time.len());

    assert_eq!(vec![0x50, 0x01], collector.read_checked(handles.session_run_time));
}

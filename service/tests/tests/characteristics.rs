//! Tests for the reads and writes of the characteristics outside of the control points

use cgms_core::feature::{default_features, FeatureValue};
use cgms_core::{SFloat, SensorStatus, TransferFormatTryFrom, TypeSampleLocation};
use cgms_racp::record::GlucoseRecord;
use cgms_server::characteristic::{CharacteristicHandles, SessionStartTime, StatusValue};
use cgms_server::{AttError, CgmsService, ConfigError, EventResponse, GattEvent, ServiceConfig, ServiceError};
use cgms_service_tests::{ClosedBearer, Collector};

#[test]
fn feature() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.feature;

    let value = collector.read(handle);

    let feature = <FeatureValue as TransferFormatTryFrom>::try_from(&value).unwrap();

    assert_eq!(default_features(), feature.features);
    assert_eq!(TypeSampleLocation::default(), feature.type_sample_location);
    assert_eq!(0x59, value[3]);
}

#[test]
fn status() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.status;

    let value = collector.read(handle);

    let status = <StatusValue as TransferFormatTryFrom>::try_from(&value).unwrap();

    assert_eq!(3, status.time_offset);
    assert!(status.status.is_empty());

    collector.service.set_status(SensorStatus::DeviceBatteryLow, true);

    assert_eq!(vec![0x03, 0x00, 0x02, 0x00, 0x00], collector.read(handle));
}

#[test]
fn session_start_time() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.session_start_time;

    assert_eq!(vec![0; SessionStartTime::LEN], collector.read(handle));

    let time = [0xE8, 0x07, 3, 14, 15, 9, 26, 0xEC, 4];

    assert_eq!(EventResponse::WriteAccepted, collector.write(handle, &time));

    assert_eq!(time.to_vec(), collector.read(handle));

    let out_of_range = [0xE8, 0x07, 13, 14, 15, 9, 26, 0xEC, 4];

    assert_eq!(
        EventResponse::Rejected(AttError::OutOfRange),
        collector.write(handle, &out_of_range)
    );

    assert_eq!(
        EventResponse::Rejected(AttError::InvalidAttributeValueLength),
        collector.write(handle, &time[..8])
    );

    assert_eq!(time.to_vec(), collector.read(handle));
}

#[test]
fn session_run_time() {
    let config = ServiceConfig {
        session_run_time: 24 * 10,
        ..ServiceConfig::default()
    };

    let mut collector = Collector::connect(config);

    let handle = collector.service.config().handles.session_run_time;

    assert_eq!(vec![0xF0, 0x00], collector.read(handle));
}

#[test]
fn permissions() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handles = collector.service.config().handles;

    for handle in [handles.measurement, handles.racp, handles.socp] {
        assert_eq!(
            EventResponse::Rejected(AttError::ReadNotPermitted),
            collector.event(GattEvent::CharacteristicRead { handle })
        );
    }

    for handle in [
        handles.measurement,
        handles.feature,
        handles.status,
        handles.session_run_time,
    ] {
        assert_eq!(
            EventResponse::Rejected(AttError::WriteNotPermitted),
            collector.write(handle, &[0x01, 0x00])
        );
    }
}

#[test]
fn unknown_handles() {
    let mut collector = Collector::connect(ServiceConfig::default());

    assert_eq!(
        EventResponse::Rejected(AttError::InvalidHandle),
        collector.event(GattEvent::CharacteristicRead { handle: 0x01 })
    );

    assert_eq!(
        EventResponse::Rejected(AttError::InvalidHandle),
        collector.write(0xFF00, &[0x01])
    );

    assert_eq!(
        EventResponse::Ignored,
        collector.event(GattEvent::IndicationConfirmed { handle: 0xFF00 })
    );
}

#[test]
fn client_configuration() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handles = collector.service.config().handles;

    assert_eq!(vec![0x01, 0x00], collector.read(handles.measurement_cccd));
    assert_eq!(vec![0x02, 0x00], collector.read(handles.racp_cccd));

    assert_eq!(
        EventResponse::Rejected(AttError::InvalidAttributeValueLength),
        collector.write_raw(handles.socp_cccd, &[0x02, 0x00, 0x00])
    );

    collector.event(GattEvent::Disconnected);

    assert_eq!(vec![0x00, 0x00], collector.read(handles.measurement_cccd));

    assert_eq!(
        EventResponse::Rejected(AttError::CccdImproperlyConfigured),
        collector.write(handles.socp, &[0x02])
    );
}

#[test]
fn measurements_are_not_sent_while_disconnected() {
    let mut collector = Collector::connect(ServiceConfig::default());

    collector.event(GattEvent::Disconnected);

    let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), 4);

    assert_eq!(3, collector.service.push_measurement(record, &mut collector.bearer).unwrap());

    assert!(collector.bearer.notifications.is_empty());

    assert_eq!(4, collector.service.records().len());
}

#[test]
fn unsupported_trend_and_quality_are_dropped() {
    let mut config = ServiceConfig::default();

    config.features.remove(cgms_core::Feature::TrendInformation | cgms_core::Feature::Quality);

    let mut collector = Collector::connect(config);

    let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), 4)
        .with_trend(SFloat::new(1, 0).unwrap())
        .with_quality(SFloat::new(90, 0).unwrap());

    collector.service.push_measurement(record, &mut collector.bearer).unwrap();

    let measurements = collector.take_measurements();

    assert_eq!(None, measurements[0].trend);
    assert_eq!(None, measurements[0].quality);
}

#[test]
fn full_record_store() {
    let config = ServiceConfig {
        record_capacity: 3,
        ..ServiceConfig::default()
    };

    let mut collector = Collector::connect(config);

    let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), 4);

    assert!(matches!(
        collector.service.push_measurement(record, &mut collector.bearer),
        Err(ServiceError::RecordStoreFull(_))
    ));
}

#[test]
fn bearer_errors() {
    let mut service = CgmsService::new(ServiceConfig::default()).unwrap();

    let handles = service.config().handles;

    let mut bearer = ClosedBearer;

    service.process_event(GattEvent::Connected, &mut bearer).unwrap();

    let enable = GattEvent::CharacteristicWritten {
        handle: handles.racp_cccd,
        value: &[0x02, 0x00],
    };

    service.process_event(enable, &mut bearer).unwrap();

    let request = GattEvent::CharacteristicWritten {
        handle: handles.racp,
        value: &[0x04, 0x01],
    };

    assert!(matches!(
        service.process_event(request, &mut bearer),
        Err(ServiceError::Bearer(_))
    ));
}

#[test]
fn invalid_handles() {
    let handles = CharacteristicHandles {
        racp: 0,
        ..CharacteristicHandles::default()
    };

    let config = ServiceConfig {
        handles,
        ..ServiceConfig::default()
    };

    assert!(matches!(CgmsService::new(config), Err(ConfigError::NullHandle)));
}

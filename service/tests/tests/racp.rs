//! Tests for the procedures of the record access control point

use cgms_core::SFloat;
use cgms_racp::record::{GlucoseRecord, RecordStore};
use cgms_racp::{Opcode, Operand, Operator, Request, Response, ResponseCode};
use cgms_server::{AttError, EventResponse, ServiceConfig};
use cgms_service_tests::Collector;
use rand::seq::SliceRandom;

fn offsets(records: &[GlucoseRecord]) -> Vec<u16> {
    records.iter().map(|record| record.time_offset).collect()
}

fn code(opcode: Opcode, code: ResponseCode) -> Response {
    Response::ResponseCode {
        request_opcode: opcode.into_raw(),
        code,
    }
}

fn report(operator: Operator, operand: Operand) -> Request {
    Request::new(Opcode::ReportStoredRecords, operator, operand)
}

#[test]
fn report_all_records() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, response) = collector.racp(&[0x01, 0x01]);

    assert_eq!(RecordStore::demo_records().to_vec(), measurements);

    assert_eq!(code(Opcode::ReportStoredRecords, ResponseCode::Success), response);
}

#[test]
fn report_with_filters() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, _) = collector.racp_request(report(Operator::LessThanOrEqualTo, Operand::TimeOffset(2)));

    assert_eq!(vec![1, 2], offsets(&measurements));

    let (measurements, _) = collector.racp_request(report(Operator::GreaterThanOrEqualTo, Operand::TimeOffset(2)));

    assert_eq!(vec![2, 3], offsets(&measurements));

    let within = Operand::TimeOffsetRange { lower: 2, upper: 2 };

    let (measurements, _) = collector.racp_request(report(Operator::WithinRangeOf, within));

    assert_eq!(vec![2], offsets(&measurements));

    let (measurements, _) = collector.racp_request(report(Operator::FirstRecord, Operand::None));

    assert_eq!(vec![1], offsets(&measurements));

    let (measurements, _) = collector.racp_request(report(Operator::LastRecord, Operand::None));

    assert_eq!(vec![3], offsets(&measurements));
}

#[test]
fn report_without_matches() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, response) =
        collector.racp_request(report(Operator::GreaterThanOrEqualTo, Operand::TimeOffset(100)));

    assert!(measurements.is_empty());

    assert_eq!(code(Opcode::ReportStoredRecords, ResponseCode::NoRecordsFound), response);
}

#[test]
fn report_number_of_records() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, response) = collector.racp(&[0x04, 0x01]);

    assert!(measurements.is_empty());

    assert_eq!(Response::NumberOfStoredRecords(3), response);

    let (_, response) = collector.racp(&[0x04, 0x03, 0x01, 0x03, 0x00]);

    assert_eq!(Response::NumberOfStoredRecords(1), response);
}

#[test]
fn delete_records() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, response) =
        collector.racp_request(Request::new(Opcode::DeleteStoredRecords, Operator::FirstRecord, Operand::None));

    assert!(measurements.is_empty());

    assert_eq!(code(Opcode::DeleteStoredRecords, ResponseCode::Success), response);

    let (measurements, _) = collector.racp(&[0x01, 0x01]);

    assert_eq!(vec![2, 3], offsets(&measurements));

    let (_, response) = collector.racp(&[0x04, 0x01]);

    assert_eq!(Response::NumberOfStoredRecords(2), response);

    collector.racp(&[0x02, 0x01]);

    let (_, response) = collector.racp(&[0x01, 0x01]);

    assert_eq!(code(Opcode::ReportStoredRecords, ResponseCode::NoRecordsFound), response);
}

#[test]
fn deleting_the_latest_record_updates_the_status() {
    let mut collector = Collector::connect(ServiceConfig::default().with_e2e_crc(false));

    let status_handle = collector.service.config().handles.status;

    assert_eq!(3, collector.read(status_handle)[0]);

    collector.racp_request(Request::new(Opcode::DeleteStoredRecords, Operator::LastRecord, Operand::None));

    assert_eq!(2, collector.read(status_handle)[0]);
}

#[test]
fn abort() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let (measurements, response) = collector.racp(&[0x03, 0x00]);

    assert!(measurements.is_empty());

    assert_eq!(code(Opcode::AbortOperation, ResponseCode::Success), response);
}

#[test]
fn abort_while_procedure_in_progress() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handle = collector.service.config().handles.racp;

    assert_eq!(EventResponse::WriteAccepted, collector.write(handle, &[0x01, 0x01]));

    assert_eq!(
        EventResponse::Rejected(AttError::ProcedureAlreadyInProgress),
        collector.write(handle, &[0x04, 0x01])
    );

    assert_eq!(EventResponse::WriteAccepted, collector.write(handle, &[0x03, 0x00]));

    assert_eq!(2, collector.bearer.take_indications().len());
}

#[test]
fn invalid_requests() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let cases: [(&[u8], u8, ResponseCode); 7] = [
        (&[0x07, 0x01], 0x07, ResponseCode::OpcodeNotSupported),
        (&[0x01, 0x00], 0x01, ResponseCode::InvalidOperator),
        (&[0x01, 0x07], 0x01, ResponseCode::OperatorNotSupported),
        (&[0x03, 0x01], 0x03, ResponseCode::InvalidOperator),
        (&[0x01, 0x02, 0x02, 0x01, 0x00], 0x01, ResponseCode::OperandNotSupported),
        (&[0x01, 0x02, 0x01, 0x01], 0x01, ResponseCode::ProcedureNotCompleted),
        (&[0x01, 0x04, 0x01, 0x03, 0x00, 0x01, 0x00], 0x01, ResponseCode::InvalidOperand),
    ];

    for (request, request_opcode, expected) in cases {
        let (measurements, response) = collector.racp(request);

        assert!(measurements.is_empty(), "{request:x?}");

        assert_eq!(
            Response::ResponseCode {
                request_opcode,
                code: expected
            },
            response,
            "{request:x?}"
        );
    }
}

#[test]
fn report_without_notifications_enabled() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let cccd = collector.service.config().handles.measurement_cccd;

    assert_eq!(EventResponse::WriteAccepted, collector.write_raw(cccd, &[0, 0]));

    let (measurements, response) = collector.racp(&[0x01, 0x01]);

    assert!(measurements.is_empty());

    assert_eq!(code(Opcode::ReportStoredRecords, ResponseCode::Success), response);
}

#[test]
fn indications_not_enabled() {
    let mut collector = Collector::connect(ServiceConfig::default());

    let handles = collector.service.config().handles;

    assert_eq!(EventResponse::WriteAccepted, collector.write_raw(handles.racp_cccd, &[1, 0]));

    assert_eq!(
        EventResponse::Rejected(AttError::CccdImproperlyConfigured),
        collector.write(handles.racp, &[0x01, 0x01])
    );

    assert!(collector.bearer.indications.is_empty());
}

#[test]
fn records_are_reported_in_store_order() {
    let config = ServiceConfig {
        demo_records: false,
        ..ServiceConfig::default()
    };

    let mut collector = Collector::connect(config);

    let mut time_offsets: Vec<u16> = (1..=20).map(|offset| offset * 5).collect();

    time_offsets.shuffle(&mut rand::thread_rng());

    for offset in time_offsets.iter().copied() {
        let record = GlucoseRecord::new(SFloat::new(100, 0).unwrap(), offset);

        collector.service.push_measurement(record, &mut collector.bearer).unwrap();
    }

    collector.bearer.take_notifications();

    let (measurements, _) = collector.racp(&[0x01, 0x01]);

    assert_eq!(time_offsets, offsets(&measurements));

    let (measurements, _) = collector.racp_request(report(Operator::FirstRecord, Operand::None));

    assert_eq!(vec![5], offsets(&measurements));

    let (measurements, _) = collector.racp_request(report(Operator::LastRecord, Operand::None));

    assert_eq!(vec![100], offsets(&measurements));

    let range = Operand::TimeOffsetRange { lower: 20, upper: 40 };

    let (measurements, _) = collector.racp_request(report(Operator::WithinRangeOf, range));

    let mut reported = offsets(&measurements);

    reported.sort_unstable();

    assert_eq!(vec![20, 25, 30, 35, 40], reported);
}

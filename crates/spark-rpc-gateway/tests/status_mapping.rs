//! 状态映射与截止时间计算的性质测试。
//!
//! - 映射是全函数：任意 `i32` 状态编号都落在唯一的错误类别上，未知编号归入 `io-error`；
//! - 截止时间饱和：`now + timeout` 溢出时得到最大截止时间，绝不回绕到过去。

use std::time::{Duration, SystemTime};

use proptest::prelude::*;
use spark_rpc_gateway::{Deadline, ErrorKind, Status, StatusCode, error_from_status, error_kind_for};

/// 独立写出的映射表，与实现互为对照。
fn expected_kind(code: i32) -> ErrorKind {
    match code {
        1 => ErrorKind::Canceled,
        3 | 9 => ErrorKind::InvalidArgument,
        4 => ErrorKind::TimedOut,
        7 | 16 => ErrorKind::PermissionDenied,
        12 => ErrorKind::NotSupported,
        _ => ErrorKind::Io,
    }
}

#[test]
fn table_covers_every_defined_code() {
    for code in 0..=16 {
        let status_code = StatusCode::from_i32(code);
        assert_ne!(status_code, StatusCode::Unrecognized(code));
        assert_eq!(status_code.as_i32(), code);
        let kind = error_kind_for(status_code);
        assert_eq!(kind, expected_kind(code), "code {code}");
    }
}

#[test]
fn translated_error_keeps_the_transport_message() {
    let err = error_from_status(&Status::new(StatusCode::InvalidArgument, "bad page token"));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.message(), "bad page token");
    assert_eq!(err.code(), "rpc.invalid_argument");

    let fallback = error_from_status(&Status::new(StatusCode::Unimplemented, ""));
    assert_eq!(fallback.kind(), ErrorKind::NotSupported);
    assert!(!fallback.message().is_empty());
}

#[test]
fn end_of_stream_is_never_a_translation_target() {
    for code in -4..=40 {
        let kind = error_kind_for(StatusCode::from_i32(code));
        assert_ne!(kind, ErrorKind::EndOfStream);
        assert_ne!(kind, ErrorKind::QueueClosed);
        assert_ne!(kind, ErrorKind::GatewayDestroyed);
    }
}

proptest! {
    #[test]
    fn mapping_is_total_and_deterministic(code in any::<i32>()) {
        let status_code = StatusCode::from_i32(code);
        prop_assert_eq!(status_code.as_i32(), code);
        prop_assert_eq!(error_kind_for(status_code), expected_kind(code));
        prop_assert_eq!(error_kind_for(status_code), error_kind_for(StatusCode::from_i32(code)));
    }

    #[test]
    fn deadline_never_wraps_into_the_past(secs in any::<u64>(), nanos in 0u32..1_000_000_000) {
        let now = SystemTime::now();
        let deadline = Deadline::after(now, Duration::new(secs, nanos));
        match deadline.instant() {
            Some(instant) => prop_assert!(instant >= now),
            None => prop_assert!(deadline.is_max()),
        }
        prop_assert!(!deadline.is_expired(now) || (secs == 0 && nanos == 0));
    }
}

#[test]
fn maximum_timeout_saturates() {
    let deadline = Deadline::after(SystemTime::now(), Duration::MAX);
    assert!(deadline.is_max());
    assert_eq!(deadline.remaining(SystemTime::now()), None);
    assert!(!deadline.is_expired(SystemTime::now()));
}

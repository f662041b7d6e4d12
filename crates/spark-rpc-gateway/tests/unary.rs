//! 一元调用的交付语义。

mod support;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use spark_rpc_gateway::test_stubs::memory::ScriptedUnaryMethod;
use spark_rpc_gateway::{ErrorKind, Status, StatusCode};
use support::{Harness, Results};

#[test]
fn success_is_delivered_exactly_once_and_never_inline() {
    let harness = Harness::new();
    let double = harness
        .gateway
        .make_call_request_handler(ScriptedUnaryMethod::new(|n: u32| Ok(n * 2)));

    let results = Results::new();
    double.handle_request(21, Duration::from_secs(5), results.handler());
    assert_eq!(results.len(), 0, "结果不得在提交调用栈内交付");

    assert!(harness.wait_for(&results, 1));
    // 再给调度线程一点时间，确认不会出现第二次交付
    harness
        .evloop
        .run_until(Duration::from_millis(20), || results.len() > 1);
    assert_eq!(results.take(), vec![Ok(42)]);
}

#[test]
fn transport_status_is_translated() {
    let harness = Harness::new();
    let denied = harness
        .gateway
        .make_call_request_handler(ScriptedUnaryMethod::new(|_: ()| {
            Err::<u32, _>(Status::new(StatusCode::PermissionDenied, "token revoked"))
        }));

    let err = harness
        .call(denied.as_ref(), (), Duration::from_secs(5))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.message(), "token revoked");
}

#[test]
fn expired_deadline_is_reported_as_timed_out() {
    let harness = Harness::new();
    let method = ScriptedUnaryMethod::new(|n: u32| Ok(n));
    let handler = harness.gateway.make_call_request_handler(method);

    let err = harness
        .call(handler.as_ref(), 1, Duration::ZERO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
}

#[test]
fn deadline_saturates_instead_of_wrapping() {
    let harness = Harness::new();
    let method = ScriptedUnaryMethod::new(|n: u32| Ok(n));
    let observer = method.observer();
    let handler = harness.gateway.make_call_request_handler(method);

    assert_eq!(harness.call(handler.as_ref(), 1, Duration::MAX), Ok(1));
    let observed = observer.last().expect("transport saw the call");
    assert!(observed.deadline.is_max());

    let before = SystemTime::now();
    let second = harness.call(handler.as_ref(), 2, Duration::from_secs(30));
    assert_eq!(second, Ok(2));
    let deadline = observer
        .last()
        .and_then(|rpc| rpc.deadline.instant())
        .expect("finite deadline");
    assert!(deadline >= before + Duration::from_secs(30));
    assert!(deadline <= SystemTime::now() + Duration::from_secs(30));
}

#[test]
fn call_context_is_cancelled_once_the_result_is_delivered() {
    let harness = Harness::new();
    let method = ScriptedUnaryMethod::new(|n: u32| Ok(n));
    let observer = method.observer();
    let handler = harness.gateway.make_call_request_handler(method);

    let reply = harness.call(handler.as_ref(), 9, Duration::from_secs(5));
    assert_eq!(reply, Ok(9));
    let observed = observer.last().expect("transport saw the call");
    assert!(observed.cancellation.is_cancelled());
}

#[test]
fn concurrent_calls_each_resolve_once() {
    let harness = Harness::new();
    let handler = harness
        .gateway
        .make_call_request_handler(ScriptedUnaryMethod::new(|n: u64| Ok(n + 1000)));

    let results = Results::new();
    let submitters: Vec<_> = (0..4u64)
        .map(|worker| {
            let handler = Arc::clone(&handler);
            let results = results.clone();
            std::thread::spawn(move || {
                for idx in 0..8 {
                    handler.handle_request(
                        worker * 8 + idx,
                        Duration::from_secs(5),
                        results.handler(),
                    );
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().expect("submitter panicked");
    }

    assert!(harness.wait_for(&results, 32));
    let mut values: Vec<u64> = results
        .take()
        .into_iter()
        .map(|result| result.expect("call succeeds"))
        .collect();
    values.sort_unstable();
    assert_eq!(values, (1000..1032).collect::<Vec<_>>());
}

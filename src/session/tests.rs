use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::consistency::Consistency;
use crate::session::Session;
use crate::session::SessionId;
use crate::test_support::init_tracing;
use crate::test_support::NoopContext;
use crate::wire::PublishResponse;

fn session(id: u64) -> Session<u32, u32, NoopContext> {
    let mut s = Session::new(
        SessionId(id),
        Duration::from_secs(1),
        Duration::from_secs(1),
        Arc::new(NoopContext::default()),
    );
    s.open();
    s
}

// §8 scenario 1: out-of-order submission.
#[test]
fn out_of_order_submission_drains_one_step_at_a_time() {
    let mut s = session(1);
    let log: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let log2 = log.clone();
    s.register_request(3, move || log2.lock().expect("not poisoned").push(3))
        .expect("session is open");
    let log3 = log.clone();
    s.register_request(2, move || log3.lock().expect("not poisoned").push(2))
        .expect("session is open");

    s.set_request_sequence(1);
    assert!(log.lock().expect("not poisoned").is_empty(), "nothing registered at 1");

    s.set_request_sequence(2);
    assert_eq!(*log.lock().expect("not poisoned"), vec![2]);

    s.set_request_sequence(3);
    assert_eq!(*log.lock().expect("not poisoned"), vec![2, 3]);
}

// §8 scenario 2: query gating by sequence.
#[test]
fn sequence_query_runs_exactly_once_when_reached() {
    let mut s = session(1);
    let ran = Arc::new(Mutex::new(0u32));

    let ran2 = ran.clone();
    s.register_sequence_query(5, move || *ran2.lock().expect("not poisoned") += 1)
        .expect("5 is ahead of command_sequence");

    s.set_command_sequence(3);
    assert_eq!(*ran.lock().expect("not poisoned"), 0);

    s.set_command_sequence(5);
    assert_eq!(*ran.lock().expect("not poisoned"), 1);

    s.set_command_sequence(6);
    assert_eq!(*ran.lock().expect("not poisoned"), 1, "runs only once");
}

#[test]
fn sequence_query_registered_too_late_is_rejected() {
    let mut s = session(1);
    s.set_command_sequence(5);
    let result = s.register_sequence_query(5, || ());
    assert!(result.is_err());
}

// §8 scenario 3: query gating by index.
#[test]
fn index_query_runs_once_last_applied_reaches_it() {
    let mut s = session(10); // last_applied initialized to id - 1 = 9
    let ran = Arc::new(Mutex::new(0u32));

    let ran2 = ran.clone();
    s.register_index_query(12, move || *ran2.lock().expect("not poisoned") += 1)
        .expect("12 is ahead of last_applied");

    s.set_last_applied(11);
    assert_eq!(*ran.lock().expect("not poisoned"), 0);

    s.set_last_applied(13);
    assert_eq!(*ran.lock().expect("not poisoned"), 1);
}

// §8 scenario 4: response cache GC.
#[test]
fn clear_responses_is_monotone_and_drops_low_water_mark() {
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, String, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx);
    s.register_response(1, "a".to_string(), None);
    s.register_response(2, "b".to_string(), None);
    s.register_response(3, "c".to_string(), None);

    s.clear_responses(2);
    assert_eq!(s.response(1), None);
    assert_eq!(s.response(2), None);
    assert_eq!(s.response(3), Some(&"c".to_string()));
    assert_eq!(s.command_low_water_mark(), 2);

    // Second call with the same or an earlier sequence is a no-op.
    s.clear_responses(2);
    assert_eq!(s.command_low_water_mark(), 2);
    assert_eq!(s.response(3), Some(&"c".to_string()));
}

// §8 scenario 5: linearizable vs sequential publish.
#[tokio::test]
async fn linearizable_publish_falls_back_to_the_address_registry() {
    init_tracing();
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, u32, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx.clone());
    s.open();
    s.set_address(crate::context::Address::new("peer-a"));

    ctx.set_index(20);
    ctx.set_consistency(Some(Consistency::Linearizable));
    ctx.set_synchronous(true);

    s.publish("tick", 1).expect("open command application accepts publish");
    let rx = s.commit(20).await.expect("batch was open at index 20");
    rx.await.expect("completion fires once the send is acked");

    assert_eq!(ctx.connection().sent.lock().expect("not poisoned").len(), 1);
}

#[tokio::test]
async fn sequential_publish_without_a_connection_stays_queued() {
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, u32, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx.clone());
    s.open();

    ctx.set_index(20);
    ctx.set_consistency(Some(Consistency::Sequential));
    ctx.set_synchronous(false);

    s.publish("tick", 1).expect("open command application accepts publish");
    let rx = s.commit(20).await.expect("batch was open at index 20");

    assert_eq!(ctx.connection().sent.lock().expect("not poisoned").len(), 0);
    assert!(rx.try_recv().is_err(), "not yet completed: nothing sent it");

    s.set_connection(ctx.connection());
    s.resend_events(19).await;

    assert_eq!(ctx.connection().sent.lock().expect("not poisoned").len(), 1);
    let sent = ctx.connection().sent.lock().expect("not poisoned")[0].clone();
    assert_eq!(sent.previous_index, 19);
}

// §8 scenario 6: ack and completion.
#[tokio::test]
async fn ack_clears_batches_up_to_the_acked_index() {
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, u32, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx.clone());
    s.open();

    // No connection attached: acks are simulated directly, as they would be if this session's
    // owning server learned them from a response that arrived out of band.
    ctx.set_consistency(Some(Consistency::Sequential));
    ctx.set_synchronous(false);

    ctx.set_index(5);
    s.publish("a", 1).unwrap();
    s.publish("b", 2).unwrap();
    let rx_a = s.commit(5).await.unwrap();

    ctx.set_index(7);
    s.publish("c", 3).unwrap();
    s.publish("d", 4).unwrap();
    let rx_b = s.commit(7).await.unwrap();

    s.handle_publish_response(PublishResponse::ok(6)).await.expect("ack is ahead of complete_index");
    assert!(rx_a.await.is_ok());
    assert_eq!(s.complete_index(), 6);

    s.handle_publish_response(PublishResponse::ok(7)).await.expect("ack is ahead of complete_index");
    assert!(rx_b.await.is_ok());
    assert_eq!(s.complete_index(), 7);
}

// §7: a not-OK publish-response triggers a resend of whatever remains queued, rather than just
// advancing complete_index the way an OK ack does.
#[tokio::test]
async fn not_ok_response_triggers_resend_of_remaining_batches() {
    init_tracing();
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, u32, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx.clone());
    s.open();

    // No connection attached yet: both batches queue without being sent.
    ctx.set_consistency(Some(Consistency::Sequential));
    ctx.set_synchronous(false);

    ctx.set_index(5);
    s.publish("a", 1).unwrap();
    let rx_a = s.commit(5).await.unwrap();

    ctx.set_index(8);
    s.publish("b", 2).unwrap();
    let rx_b = s.commit(8).await.unwrap();

    assert!(ctx.connection().sent.lock().expect("not poisoned").is_empty());

    s.set_connection(ctx.connection());
    let result = s.handle_publish_response(PublishResponse::error(4, "nack")).await;
    assert_eq!(result, Err(crate::error::PublishError::NackWithIndex { last_seen: 4 }));

    assert!(rx_a.await.is_ok());
    assert!(rx_b.await.is_ok());
    assert_eq!(s.complete_index(), 8);
    let sent = ctx.connection().sent.lock().expect("not poisoned").clone();
    assert_eq!(sent.len(), 2, "both queued batches resent");
    assert_eq!(sent[0].event_index, 5);
    assert_eq!(sent[1].event_index, 8);
}

#[test]
fn close_listener_invoked_immediately_if_already_closed() {
    let mut s = session(1);
    s.close();
    let invoked = Arc::new(Mutex::new(false));
    let invoked2 = invoked.clone();
    s.on_close(move |_id| *invoked2.lock().expect("not poisoned") = true);
    assert!(*invoked.lock().expect("not poisoned"));
}

#[tokio::test]
async fn expire_resolves_the_open_batch_and_every_queued_batch() {
    let ctx = Arc::new(NoopContext::default());
    let mut s: Session<u32, u32, NoopContext> =
        Session::new(SessionId(1), Duration::from_secs(1), Duration::from_secs(1), ctx.clone());
    s.open();
    ctx.set_consistency(Some(Consistency::Sequential));
    ctx.set_synchronous(false);

    ctx.set_index(1);
    s.publish("a", 1).unwrap();
    let rx_open = s.commit(1).await.unwrap();

    ctx.set_index(2);
    s.publish("b", 2).unwrap();
    // Left uncommitted: still the open batch when expire() runs.

    s.expire();
    assert!(s.is_closed());
    assert!(s.is_expired());
    assert!(rx_open.await.is_ok(), "queued batch resolves on expiry");
}

mod proptests {
    use proptest::prelude::*;

    use super::session;

    proptest! {
        #[test]
        fn command_sequence_is_monotone_and_equals_the_final_value(steps in proptest::collection::vec(1u64..50, 1..20)) {
            let mut s = session(1);
            let mut sorted = steps.clone();
            sorted.sort_unstable();
            let mut last = 0u64;
            for step in sorted {
                let before = s.command_sequence();
                s.set_command_sequence(step);
                prop_assert!(s.command_sequence() >= before);
                last = step;
            }
            prop_assert_eq!(s.command_sequence(), last);
        }

        #[test]
        fn clear_responses_retains_exactly_the_ungced_suffix(n in 1u64..20) {
            let mut s = session(1);
            for i in 1..=n {
                s.register_response(i, i as u32, None);
            }
            let cut = n / 2;
            s.clear_responses(cut);
            for i in 1..=cut {
                prop_assert_eq!(s.response(i), None);
            }
            for i in (cut + 1)..=n {
                prop_assert_eq!(s.response(i), Some(&(i as u32)));
            }
            prop_assert_eq!(s.command_low_water_mark(), cut);
        }
    }
}

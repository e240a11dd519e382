use std::cell::Cell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use weak_listener::{
    listen, unlisten, AbortController, ContextRole, EventTarget, Handler, ListenError,
    ListenerOptions, Realm,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn counting_handler(realm: &Realm) -> (Handler<u32>, Rc<Cell<u32>>) {
    let count = Rc::new(Cell::new(0));
    let counter = Rc::clone(&count);
    let handler = Handler::new(realm, move |_: &u32| counter.set(counter.get() + 1));
    (handler, count)
}

#[test]
fn forwards_events_while_handler_alive() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);

    listen(&target, "ping", &handler, ()).expect("listen");
    target.dispatch("ping", &1);
    target.dispatch("ping", &2);
    target.dispatch("pong", &3);

    assert_eq!(count.get(), 2);
    assert_eq!(target.listener_count("ping"), 1);
    assert_eq!(handler.active_registrations(), 1);
}

#[test]
fn identical_listen_delivers_once() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);

    listen(&target, "ping", &handler, ()).expect("first listen");
    listen(&target, "ping", &handler, false).expect("second listen");
    listen(&target, "ping", &handler, &ListenerOptions::new()).expect("third listen");

    target.dispatch("ping", &1);
    assert_eq!(count.get(), 1);
    assert_eq!(target.listener_count("ping"), 1);
    assert_eq!(handler.active_registrations(), 1);
}

#[test]
fn capture_and_bubble_are_separate_registrations() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);

    listen(&target, "ping", &handler, true).expect("capture listen");
    listen(&target, "ping", &handler, false).expect("bubble listen");
    target.dispatch("ping", &1);
    assert_eq!(count.get(), 2);

    unlisten(&target, "ping", &handler, true);
    target.dispatch("ping", &1);
    assert_eq!(count.get(), 3);
    assert_eq!(handler.active_registrations(), 1);
}

#[test]
fn same_handler_on_two_targets() {
    init_tracing();
    let realm = Realm::new("top");
    let first = EventTarget::<u32>::new(&realm);
    let second = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);

    listen(&first, "ping", &handler, ()).expect("listen first");
    listen(&second, "ping", &handler, ()).expect("listen second");
    assert_eq!(handler.active_registrations(), 2);

    unlisten(&first, "ping", &handler, ());
    first.dispatch("ping", &1);
    second.dispatch("ping", &1);
    assert_eq!(count.get(), 1);
    assert_eq!(first.listener_count("ping"), 0);
    assert_eq!(second.listener_count("ping"), 1);
}

#[test]
fn unlisten_twice_is_a_no_op() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let (other, other_count) = counting_handler(&realm);

    listen(&target, "ping", &handler, ()).expect("listen");
    listen(&target, "ping", &other, ()).expect("listen other");

    unlisten(&target, "ping", &handler, ());
    unlisten(&target, "ping", &handler, ());

    target.dispatch("ping", &1);
    assert_eq!(count.get(), 0);
    assert_eq!(other_count.get(), 1);
    assert_eq!(target.listener_count("ping"), 1);
    assert_eq!(handler.active_registrations(), 0);
}

#[test]
fn unlisten_without_registration_is_silent() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, _count) = counting_handler(&realm);

    unlisten(&target, "ping", &handler, ());
    unlisten(&target, "ping", None::<&Handler<u32>>, ());
    assert_eq!(handler.active_registrations(), 0);
}

#[test]
fn absent_handler_registers_nothing() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);

    listen(&target, "ping", None::<&Handler<u32>>, ()).expect("listen");
    assert_eq!(target.listener_count("ping"), 0);
    assert_eq!(realm.live_allocations(), 0);
}

#[test]
fn aborting_signal_tears_down_registration() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let controller = AbortController::new();
    let options = ListenerOptions::new().with_signal(controller.signal());

    listen(&target, "ping", &handler, &options).expect("listen");
    assert_eq!(controller.signal().listener_count(), 1);
    target.dispatch("ping", &1);

    controller.abort();
    target.dispatch("ping", &2);

    assert_eq!(count.get(), 1);
    assert_eq!(target.listener_count("ping"), 0);
    assert_eq!(handler.active_registrations(), 0);
    assert_eq!(controller.signal().listener_count(), 0);
}

#[test]
fn unlisten_detaches_from_signal() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, _count) = counting_handler(&realm);
    let controller = AbortController::new();
    let options = ListenerOptions::new().with_signal(controller.signal());

    listen(&target, "ping", &handler, &options).expect("listen");
    unlisten(&target, "ping", &handler, &options);

    assert_eq!(controller.signal().listener_count(), 0);
    assert_eq!(target.listener_count("ping"), 0);
    controller.abort();
}

#[test]
fn already_aborted_signal_registers_nothing() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, _count) = counting_handler(&realm);
    let controller = AbortController::new();
    controller.abort();

    let options = ListenerOptions::new().with_signal(controller.signal());
    listen(&target, "ping", &handler, &options).expect("listen");

    assert_eq!(target.listener_count("ping"), 0);
    assert_eq!(handler.active_registrations(), 0);
}

#[test]
fn signal_keeps_handler_alive_until_it_fires() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let weak = handler.downgrade();
    let controller = AbortController::new();
    let options = ListenerOptions::new().with_signal(controller.signal());

    listen(&target, "ping", &handler, &options).expect("listen");
    drop(handler);

    assert!(weak.is_alive());
    target.dispatch("ping", &1);
    assert_eq!(count.get(), 1);

    controller.abort();
    assert!(!weak.is_alive());
    target.dispatch("ping", &2);
    assert_eq!(count.get(), 1);
    assert_eq!(target.listener_count("ping"), 0);
}

#[test]
fn once_is_ignored_by_implicit_registrations() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let weak = handler.downgrade();
    let options = ListenerOptions::new().with_once(true);

    listen(&target, "ping", &handler, &options).expect("listen");
    target.dispatch("ping", &1);
    target.dispatch("ping", &2);
    assert_eq!(count.get(), 2);
    assert_eq!(target.listener_count("ping"), 1);

    drop(handler);
    assert!(!weak.is_alive());
    target.dispatch("ping", &3);
    assert_eq!(count.get(), 2);
    assert_eq!(target.listener_count("ping"), 0);
    assert_eq!(realm.live_allocations(), 0);
}

#[test]
fn once_with_signal_releases_handler_when_signal_fires() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let weak = handler.downgrade();
    let controller = AbortController::new();
    let options = ListenerOptions::new()
        .with_once(true)
        .with_signal(controller.signal());

    listen(&target, "ping", &handler, &options).expect("listen");
    target.dispatch("ping", &1);
    drop(handler);

    // The registration is still live, so the signal keeps the handler.
    assert!(weak.is_alive());
    target.dispatch("ping", &2);
    assert_eq!(count.get(), 2);

    controller.abort();
    assert!(!weak.is_alive());
    assert_eq!(controller.signal().listener_count(), 0);
    assert_eq!(target.listener_count("ping"), 0);
}

#[test]
fn handler_output_reaches_dispatcher() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<str, usize>::new(&realm);
    let handler = Handler::new(&realm, |event: &str| event.len());

    listen(&target, "message", &handler, ()).expect("listen");
    assert_eq!(target.dispatch("message", "hello"), vec![5]);
}

#[test]
fn passive_is_forwarded_and_signal_is_not() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, _count) = counting_handler(&realm);
    let controller = AbortController::new();
    let options = ListenerOptions::new()
        .with_passive(true)
        .with_signal(controller.signal());

    listen(&target, "scroll", &handler, &options).expect("listen");

    assert!(target.has_passive_listener("scroll"));
    // Only the registration's own hook is attached; the target got no signal.
    assert_eq!(controller.signal().listener_count(), 1);
}

#[test]
fn options_from_json_fixture() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let (handler, count) = counting_handler(&realm);
    let options: ListenerOptions =
        serde_json::from_str(r#"{"capture": true, "once": true}"#).expect("parse options");

    listen(&target, "ping", &handler, &options).expect("listen");
    // Registry lookup only cares about capture.
    listen(&target, "ping", &handler, true).expect("listen duplicate");
    target.dispatch("ping", &1);
    target.dispatch("ping", &2);

    assert_eq!(count.get(), 2);
    assert_eq!(target.listener_count("ping"), 1);
    assert_eq!(handler.active_registrations(), 1);

    unlisten(&target, "ping", &handler, true);
    assert_eq!(target.listener_count("ping"), 0);
}

#[test]
fn detached_emitter_is_a_context_error() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::detached();
    let (handler, _count) = counting_handler(&realm);

    let err = listen(&target, "ping", &handler, ()).expect_err("no realm");
    assert!(matches!(err, ListenError::ContextResolution(ContextRole::Emitter)));
    assert_eq!(target.listener_count("ping"), 0);
    assert_eq!(handler.active_registrations(), 0);
}

#[test]
fn handler_may_unlisten_itself_during_dispatch() {
    init_tracing();
    let realm = Realm::new("top");
    let target = EventTarget::<u32>::new(&realm);
    let count = Rc::new(Cell::new(0));
    let slot: Rc<std::cell::RefCell<Option<Handler<u32>>>> = Rc::default();

    let handler = {
        let target = Rc::clone(&target);
        let count = Rc::clone(&count);
        let slot = Rc::clone(&slot);
        Handler::new(&realm, move |_: &u32| {
            count.set(count.get() + 1);
            if let Some(handler) = slot.borrow().as_ref() {
                unlisten(&target, "ping", handler, ());
            }
        })
    };
    *slot.borrow_mut() = Some(handler.clone());

    listen(&target, "ping", &handler, ()).expect("listen");
    target.dispatch("ping", &1);
    target.dispatch("ping", &2);

    assert_eq!(count.get(), 1);
    assert_eq!(target.listener_count("ping"), 0);
    slot.borrow_mut().take();
}

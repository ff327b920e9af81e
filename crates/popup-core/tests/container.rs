use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use popup_channel::TransportHint;
use popup_config::{BlurBehavior, EnvironmentPreference};
use popup_core::{
    AdapterKind, ChildContext, ContainerAdapter, ContainerOverrides, Error, HostError, Phase,
    PopupAdapter, PopupHandle, PopupOptions, PopupProvider,
    host::{NativeBlur, NativeOutcome, NativeResult, NativeWindow},
    test_support::{FakeWindow, TestHost, result_within},
};
use popup_geom::{Point, Rect};
use popup_protocol::{CloseReason, LaunchParams, Message, MessageKind, PopupResult, Theme};
use serde_json::json;

fn init_tracing() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}

fn native(t: &TestHost) -> PopupProvider {
    init_tracing();
    let p = t.provider(EnvironmentPreference::Auto);
    assert_eq!(p.environment(), Some(AdapterKind::Container));
    p
}

fn resolved(h: &PopupHandle) -> PopupResult {
    h.try_result().expect("popup resolved")
}

/// Report window 0 ready and connect content to it.
fn ready_and_connect(t: &TestHost) -> (Arc<FakeWindow>, ChildContext) {
    let window = t.runtime.deliver_ready(0).expect("window requested");
    let request = t.runtime.last_request().unwrap();
    let child = ChildContext::from_custom_data(
        request.custom_data,
        &t.content_env(&window.endpoint()),
        TransportHint::PostMessage,
    )
    .expect("child connects");
    (window, child)
}

#[test]
fn forced_container_without_runtime_fails_to_open() {
    init_tracing();
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Container);
    assert_eq!(p.environment(), Some(AdapterKind::Container));
    let err = p
        .open(PopupOptions::url("https://app.local/a"))
        .unwrap_err();
    assert!(matches!(err, Error::NativeHostUnavailable));
    assert!(t.runtime.requests().is_empty());
}

#[test]
fn request_carries_screen_geometry_and_identity() {
    let t = TestHost::with_container();
    t.runtime.set_screen_offset(Some(Point::new(1000.0, 50.0)));
    let p = native(&t);
    let h = p
        .open(
            PopupOptions::url("https://app.local/menu")
                .anchor(Rect::new(100.0, 100.0, 100.0, 40.0))
                .data(json!({"k": 1})),
        )
        .unwrap();

    let req = t.runtime.last_request().unwrap();
    assert_eq!((req.x, req.y), (1100, 194));
    assert_eq!((req.width, req.height), (320, 240));
    assert_eq!(req.blur, NativeBlur::CloseOnBlur);
    assert!(req.focus);
    assert!(!req.frame);
    assert!(!req.always_on_top);
    assert!(req.url.starts_with("https://app.local/menu?popupId="));

    let params = LaunchParams::from_custom_data(req.custom_data).unwrap();
    assert_eq!(&params.popup_id, h.id());
    assert_eq!(params.theme, Theme::Light);
    assert_eq!(params.data, Some(json!({"k": 1})));
    assert_eq!(h.phase(), Phase::Opening);
}

#[test]
fn unanchored_window_is_centered_and_overrides_apply() {
    let t = TestHost::with_container();
    let p = native(&t);
    p.open(
        PopupOptions::url("https://app.local/dialog")
            .size(200.0, 100.0)
            .blur_behavior(BlurBehavior::None)
            .container_overrides(ContainerOverrides {
                frame: Some(true),
                background_color: Some("#202020".into()),
                focus: Some(false),
                always_on_top: Some(true),
            }),
    )
    .unwrap();
    let req = t.runtime.last_request().unwrap();
    assert_eq!((req.x, req.y), (412, 334));
    assert_eq!(req.blur, NativeBlur::ModalLike);
    assert!(req.frame && req.always_on_top && !req.focus);
    assert_eq!(req.background_color.as_deref(), Some("#202020"));
}

#[test]
fn structured_content_uses_the_component_route() {
    let t = TestHost::with_container();
    let p = native(&t);
    p.open(PopupOptions::component("Picker", json!({"n": 2})))
        .unwrap();
    let req = t.runtime.last_request().unwrap();
    assert!(req.url.starts_with("/popup/Picker?props="));
    assert!(req.url.contains("&popupId="));
    assert_eq!((req.width, req.height), (400, 300));
}

#[tokio::test]
async fn ready_then_content_submits() {
    let t = TestHost::with_container();
    let p = native(&t);
    let opened = Arc::new(AtomicUsize::new(0));
    let o = opened.clone();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();
    let h = p
        .open(
            PopupOptions::url("https://app.local/pick")
                .on_open(move |_| {
                    o.fetch_add(1, Ordering::SeqCst);
                })
                .on_message(move |m: &Message| sink.lock().push(m.kind)),
        )
        .unwrap();

    let (window, child) = ready_and_connect(&t);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(h.phase(), Phase::Live);

    let got = Arc::new(Mutex::new(Vec::new()));
    let into = got.clone();
    child.on_parent_message(move |v| {
        into.lock().push(v.clone());
        Ok(())
    });
    h.send(MessageKind::DataToChild, Some(json!("ping"))).unwrap();
    assert_eq!(*got.lock(), vec![json!("ping")]);

    child.close(PopupResult::submit(Some(json!(42)))).unwrap();
    let r = result_within(&h, 100).await.expect("resolved");
    assert_eq!(r, PopupResult::submit(Some(json!(42))));
    assert!(window.is_closed());
    assert_eq!(*kinds.lock(), vec![MessageKind::Ready, MessageKind::SubmitResult]);
}

#[test]
fn native_results_map_to_popup_results() {
    let t = TestHost::with_container();
    let p = native(&t);
    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let sink = forwarded.clone();
    let a = p
        .open(PopupOptions::url("https://app.local/a").on_message(move |m: &Message| {
            sink.lock().push((m.kind, m.payload.clone()));
        }))
        .unwrap();
    t.runtime.deliver_ready(0);
    t.runtime.deliver_result(
        0,
        NativeResult {
            outcome: NativeOutcome::Submitted,
            payload: Some(json!({"ok": true})),
        },
    );
    assert_eq!(resolved(&a), PopupResult::submit(Some(json!({"ok": true}))));
    assert_eq!(
        *forwarded.lock(),
        vec![(MessageKind::SubmitResult, Some(json!({"ok": true})))]
    );

    let b = p.open(PopupOptions::url("https://app.local/b")).unwrap();
    t.runtime.deliver_result(
        1,
        NativeResult {
            outcome: NativeOutcome::Dismissed,
            payload: None,
        },
    );
    assert_eq!(resolved(&b), PopupResult::dismissed(CloseReason::Blur));
}

#[test]
fn synchronous_rejection_reports_and_closes() {
    let t = TestHost::with_container();
    let p = native(&t);
    t.runtime.reject_next(HostError::Rejected("busy".into()));
    let errors = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();
    let h = p
        .open(PopupOptions::url("https://app.local/a").on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(resolved(&h), PopupResult::programmatic());
    assert!(p.open_popups().is_empty());
}

#[test]
fn asynchronous_error_reports_and_closes() {
    let t = TestHost::with_container();
    let p = native(&t);
    let errors = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();
    let h = p
        .open(PopupOptions::url("https://app.local/a").on_error(move |err: &Error| {
            if matches!(err, Error::Host(HostError::Unavailable)) {
                e.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();
    t.runtime.deliver_error(0, HostError::Unavailable);
    t.runtime.deliver_error(0, HostError::Unavailable);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(resolved(&h), PopupResult::programmatic());
}

#[test]
fn window_ready_after_close_is_closed_immediately() {
    let t = TestHost::with_container();
    let p = native(&t);
    let opened = Arc::new(AtomicUsize::new(0));
    let o = opened.clone();
    let h = p
        .open(PopupOptions::url("https://app.local/a").on_open(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    h.close(None);
    let window = t.runtime.deliver_ready(0).unwrap();
    assert!(window.is_closed());
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(resolved(&h), PopupResult::programmatic());
}

#[test]
fn markup_blob_is_revoked_on_close() {
    let t = TestHost::with_container();
    let p = native(&t);
    let h = p.open(PopupOptions::markup("<b>hi</b>")).unwrap();
    let blobs = t.dom.blobs_created();
    assert_eq!(blobs.len(), 1);
    let req = t.runtime.last_request().unwrap();
    assert_eq!(req.url, blobs[0]);
    let params = LaunchParams::from_custom_data(req.custom_data).unwrap();
    assert_eq!(params.popup_id, *h.id());
    assert!(t.dom.blobs_revoked().is_empty());
    h.close(None);
    assert_eq!(t.dom.blobs_revoked(), blobs);
}

#[test]
fn host_theme_is_relayed_until_close() {
    let t = TestHost::with_container();
    let p = native(&t);
    let h = p.open(PopupOptions::url("https://app.local/a")).unwrap();
    let (_window, child) = ready_and_connect(&t);
    t.theme.set(Theme::Dark);
    assert_eq!(child.theme(), Theme::Dark);
    assert_eq!(t.theme.watcher_count(), 1);
    h.close(None);
    assert_eq!(t.theme.watcher_count(), 0);
}

#[test]
fn update_position_is_unsupported_but_harmless() {
    let t = TestHost::with_container();
    let p = native(&t);
    let h = p.open(PopupOptions::url("https://app.local/a")).unwrap();
    t.runtime.deliver_ready(0);
    h.update_position(Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
    p.update_position(h.id(), None);
    assert!(h.is_open());
    assert_eq!(t.runtime.requests().len(), 1);
}

#[test]
fn availability_is_probed_on_every_check() {
    init_tracing();
    let t = TestHost::new();
    let adapter = ContainerAdapter::new(t.host.clone());
    assert!(!adapter.is_available());
    t.inject_container();
    assert!(adapter.is_available());
    let h = adapter
        .open(PopupOptions::url("https://app.local/a").resolve(&Default::default()))
        .unwrap();
    assert_eq!(adapter.open_count(), 1);
    t.eject_container();
    assert!(!adapter.is_available());
    adapter.destroy();
    assert_eq!(resolved(&h), PopupResult::programmatic());
    assert_eq!(adapter.open_count(), 0);
}

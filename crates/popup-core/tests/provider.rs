use popup_config::{EnvironmentPreference, PopupDefaults, ProviderConfig};
use popup_core::{AdapterKind, Error, Phase, PopupOptions, PopupProvider, test_support::TestHost};
use popup_protocol::{CloseReason, PopupResult, Theme};

fn init_tracing() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}

#[test]
fn auto_prefers_container_when_present() {
    init_tracing();
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Auto);
    assert_eq!(p.environment(), Some(AdapterKind::Overlay));

    t.inject_container();
    assert_eq!(p.initialize(EnvironmentPreference::Auto), AdapterKind::Container);
    assert_eq!(p.environment(), Some(AdapterKind::Container));
    assert_eq!(
        p.initialize(EnvironmentPreference::Overlay),
        AdapterKind::Overlay
    );
}

#[test]
fn open_popups_tracks_until_resolution() {
    init_tracing();
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Overlay);
    let a = p.open(PopupOptions::url("https://app.local/a")).unwrap();
    let b = p.open(PopupOptions::url("https://app.local/b")).unwrap();
    let ids: Vec<_> = p.open_popups().iter().map(|h| h.id().clone()).collect();
    assert_eq!(ids, vec![a.id().clone(), b.id().clone()]);

    p.close(a.id(), Some(PopupResult::cancel()));
    assert_eq!(a.try_result(), Some(PopupResult::cancel()));
    let ids: Vec<_> = p.open_popups().iter().map(|h| h.id().clone()).collect();
    assert_eq!(ids, vec![b.id().clone()]);
}

#[test]
fn close_all_closes_programmatically() {
    init_tracing();
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Overlay);
    let handles: Vec<_> = (0..3)
        .map(|i| p.open(PopupOptions::url(format!("https://app.local/{i}"))).unwrap())
        .collect();
    p.close_all();
    for h in &handles {
        assert_eq!(h.try_result(), Some(PopupResult::programmatic()));
        assert_eq!(h.phase(), Phase::Closed);
    }
    assert!(p.open_popups().is_empty());
}

#[test]
fn destroy_leaves_provider_uninitialized() {
    init_tracing();
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Overlay);
    let h = p.open(PopupOptions::url("https://app.local/a")).unwrap();
    p.destroy();
    assert_eq!(h.try_result(), Some(PopupResult::programmatic()));
    assert_eq!(p.environment(), None);
    assert!(matches!(
        p.open(PopupOptions::url("https://app.local/b")),
        Err(Error::NotInitialized)
    ));

    p.initialize(EnvironmentPreference::Overlay);
    assert!(p.open(PopupOptions::url("https://app.local/c")).is_ok());
}

#[test]
fn configured_defaults_apply_and_caller_wins() {
    init_tracing();
    let t = TestHost::new();
    let p = PopupProvider::new(
        t.host.clone(),
        ProviderConfig {
            environment: EnvironmentPreference::Overlay,
            defaults: PopupDefaults {
                close_on_escape: false,
                ..PopupDefaults::default()
            },
        },
    );
    assert!(!p.defaults().close_on_escape);
    let quiet = p.open(PopupOptions::url("https://app.local/a")).unwrap();
    let loud = p
        .open(PopupOptions::url("https://app.local/b").close_on_escape(true))
        .unwrap();
    t.dom.press_key("Escape");
    assert!(quiet.is_open());
    assert_eq!(
        loud.try_result(),
        Some(PopupResult::dismissed(CloseReason::Escape))
    );
}

#[test]
fn theme_reads_the_host() {
    let t = TestHost::new();
    let p = t.provider(EnvironmentPreference::Overlay);
    assert_eq!(p.theme(), Theme::Light);
    t.theme.set(Theme::Dark);
    assert_eq!(p.theme(), Theme::Dark);
}

#[test]
fn dropping_the_provider_closes_its_popups() {
    let t = TestHost::new();
    let h = {
        let p = t.provider(EnvironmentPreference::Overlay);
        p.open(PopupOptions::url("https://app.local/a")).unwrap()
    };
    assert_eq!(h.try_result(), Some(PopupResult::programmatic()));
    assert_eq!(t.dom.listener_count(), 0);
}

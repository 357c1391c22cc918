// tests/supervisor_tests.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use chatbridge_core::models::{ChatEvent, ConfigUpdate, Configuration, Platform, ViewerMessage};
use chatbridge_core::platforms::PlatformAdapter;
use chatbridge_core::test_utils::{raw_chat, FakeAdapter};
use chatbridge_core::{BroadcastHub, ConfigStore, Error, SourceMode, SourceSupervisor, ViewerSession};

const DEMO_TICK: Duration = Duration::from_millis(20);

struct Harness {
    sup: Arc<SourceSupervisor>,
    hub: BroadcastHub,
    tiktok: FakeAdapter,
    twitch: FakeAdapter,
}

async fn setup() -> Harness {
    let store = ConfigStore::default();
    let hub = BroadcastHub::new(store.clone());
    let tiktok = FakeAdapter::new(Platform::TikTok);
    let twitch = FakeAdapter::new(Platform::Twitch);
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![Arc::new(tiktok.clone()), Arc::new(twitch.clone())];

    let sup = Arc::new(SourceSupervisor::with_demo_interval(store, hub.clone(), adapters, DEMO_TICK));
    sup.start().await;
    Harness { sup, hub, tiktok, twitch }
}

/// Joins and swallows the initial snapshot.
fn quiet_viewer(hub: &BroadcastHub) -> ViewerSession {
    let mut v = hub.join();
    assert!(matches!(v.try_recv(), Some(ViewerMessage::InitialState(_))));
    v
}

fn drain(v: &mut ViewerSession) -> Vec<ViewerMessage> {
    let mut out = Vec::new();
    while let Some(m) = v.try_recv() {
        out.push(m);
    }
    out
}

fn chats(msgs: &[ViewerMessage]) -> Vec<ChatEvent> {
    msgs.iter()
        .filter_map(|m| match m {
            ViewerMessage::Chat(e) => Some(e.clone()),
            _ => None,
        })
        .collect()
}

async fn next_chat(v: &mut ViewerSession) -> ChatEvent {
    loop {
        match timeout(Duration::from_secs(1), v.recv()).await {
            Ok(Some(ViewerMessage::Chat(e))) => return e,
            Ok(Some(_)) => continue,
            other => panic!("expected a chat event, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_demo_mode_active_at_start() -> Result<(), Error> {
    let h = setup().await;
    assert_eq!(h.sup.mode().await, SourceMode::Fallback);
    assert!(h.sup.demo_running().await);
    assert!(h.sup.live_connections().await.is_empty());

    let mut viewer = quiet_viewer(&h.hub);
    let evt = next_chat(&mut viewer).await;
    assert_eq!(evt.color.as_deref(), Some(evt.platform.accent_color()));
    Ok(())
}

#[tokio::test]
async fn test_full_scenario() -> Result<(), Error> {
    let h = setup().await;
    let mut viewer = quiet_viewer(&h.hub);

    // Configure platform A: demo stops, exactly one A handle, B absent.
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "streamer42")).await?;
    assert_eq!(h.sup.mode().await, SourceMode::TikTokOnly);
    assert!(!h.sup.demo_running().await);
    assert_eq!(h.sup.live_connections().await, vec![(Platform::TikTok, "streamer42".to_string())]);
    assert_eq!(h.tiktok.live(), 1);
    assert_eq!(h.twitch.connects(), 0);

    let msgs = drain(&mut viewer);
    assert!(msgs.iter().any(|m| matches!(m, ViewerMessage::ConfigUpdate(c) if c.tiktok_username == "streamer42")));

    // Nothing synthetic after the switch.
    sleep(DEMO_TICK * 5).await;
    assert!(chats(&drain(&mut viewer)).is_empty());

    assert!(h.tiktok.emit_chat("tt_fan", "hi from tiktok").await);
    let evt = next_chat(&mut viewer).await;
    assert_eq!(evt.platform, Platform::TikTok);
    assert_eq!(evt.user, "tt_fan");
    assert_eq!(evt.theme, "default");

    // Theme-only update: config pushed, no reconnection.
    h.sup.apply_configuration(ConfigUpdate::theme("dark")).await?;
    assert_eq!(h.tiktok.connects(), 1);
    assert_eq!(h.tiktok.disconnects(), 0);
    match drain(&mut viewer).as_slice() {
        [ViewerMessage::ConfigUpdate(c)] => {
            assert_eq!(c.theme, "dark");
            assert_eq!(c.tiktok_username, "streamer42");
            assert_eq!(c.twitch_channel, "");
        }
        other => panic!("expected one config_update, got {:?}", other),
    }

    h.tiktok.emit_chat("tt_fan", "now dark").await;
    assert_eq!(next_chat(&mut viewer).await.theme, "dark");

    // Clear A: handle closes, demo resumes.
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "NONE")).await?;
    assert_eq!(h.tiktok.live(), 0);
    assert_eq!(h.tiktok.disconnects(), 1);
    assert!(h.sup.live_connections().await.is_empty());
    assert_eq!(h.sup.mode().await, SourceMode::Fallback);
    assert!(h.sup.demo_running().await);
    assert_eq!(next_chat(&mut viewer).await.theme, "dark");
    Ok(())
}

#[tokio::test]
async fn test_layout_updates_never_reconnect() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate {
        tiktok_username: Some("tt".into()),
        twitch_channel: Some("tw".into()),
        ..Default::default()
    }).await?;
    assert_eq!(h.sup.mode().await, SourceMode::Both);
    assert_eq!((h.tiktok.connects(), h.twitch.connects()), (1, 1));

    let updates: Vec<ConfigUpdate> = vec![
        serde_json::from_str(r#"{"theme":"neon"}"#)?,
        serde_json::from_str(r#"{"chatAlign":"center"}"#)?,
        serde_json::from_str(r#"{"chatFade":10}"#)?,
        serde_json::from_str(r#"{"fontSize":28}"#)?,
        serde_json::from_str(r#"{"tiktokUsername":"tt","twitchChannel":"tw"}"#)?,
        ConfigUpdate::default(),
    ];
    for u in updates {
        h.sup.apply_configuration(u).await?;
    }
    assert_eq!((h.tiktok.connects(), h.twitch.connects()), (1, 1));
    assert_eq!((h.tiktok.disconnects(), h.twitch.disconnects()), (0, 0));
    Ok(())
}

#[tokio::test]
async fn test_identity_change_replaces_handle() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "first")).await?;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "second")).await?;

    assert_eq!(h.twitch.connects(), 2);
    assert_eq!(h.twitch.disconnects(), 1);
    assert_eq!(h.twitch.live(), 1);
    assert_eq!(h.twitch.max_live(), 1, "old handle closed before the new one opened");
    assert_eq!(h.sup.live_connections().await, vec![(Platform::Twitch, "second".to_string())]);
    assert_eq!(h.twitch.identities(), vec!["first".to_string(), "second".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_applies_are_serialized() -> Result<(), Error> {
    let h = setup().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let sup = h.sup.clone();
        tasks.push(tokio::spawn(async move {
            sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, format!("chan{i}"))).await
        }));
    }
    for t in tasks {
        t.await.expect("apply task panicked")?;
    }

    assert_eq!(h.twitch.live(), 1);
    assert_eq!(h.twitch.max_live(), 1);
    assert_eq!(h.twitch.connects(), h.twitch.disconnects() + 1);

    let live = h.sup.live_connections().await;
    let final_channel = h.sup.store().snapshot().twitch_channel;
    assert_eq!(live, vec![(Platform::Twitch, final_channel)]);
    Ok(())
}

#[tokio::test]
async fn test_replaced_handle_events_are_dropped() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "old")).await?;
    let mut viewer = quiet_viewer(&h.hub);

    h.tiktok.emit_to(0, raw_chat(Platform::TikTok, "before", "still current")).await;
    assert_eq!(next_chat(&mut viewer).await.user, "before");

    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "new")).await?;
    drain(&mut viewer);

    // The first handle is gone from the supervisor's point of view; anything
    // it still produces must not reach viewers.
    h.tiktok.emit_to(0, raw_chat(Platform::TikTok, "stale", "from old")).await;
    sleep(Duration::from_millis(50)).await;
    h.tiktok.emit_to(1, raw_chat(Platform::TikTok, "fresh", "from new")).await;

    assert_eq!(next_chat(&mut viewer).await.user, "fresh");
    sleep(Duration::from_millis(50)).await;
    assert!(chats(&drain(&mut viewer)).iter().all(|e| e.user != "stale"));
    Ok(())
}

async fn wait_until_offline(sup: &SourceSupervisor) {
    timeout(Duration::from_secs(1), async {
        while !sup.live_connections().await.is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ended stream still reported as live");
}

#[tokio::test]
async fn test_ended_stream_is_reconnected_on_next_apply() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "chan")).await?;
    let mut viewer = quiet_viewer(&h.hub);

    h.twitch.end_stream(0);
    wait_until_offline(&h.sup).await;

    // Not an identity change, but the dead handle is replaced.
    h.sup.apply_configuration(ConfigUpdate::theme("dark")).await?;
    assert_eq!(h.twitch.connects(), 2);
    assert_eq!(h.twitch.disconnects(), 1);
    assert_eq!(h.twitch.live(), 1);
    assert_eq!(h.sup.live_connections().await, vec![(Platform::Twitch, "chan".to_string())]);
    assert!(!h.sup.demo_running().await);

    h.twitch.emit_chat("Viewer99", "back again").await;
    let evt = next_chat(&mut viewer).await;
    assert_eq!(evt.user, "Viewer99");
    assert_eq!(evt.theme, "dark");

    // A live handle is left alone by the next layout update.
    h.sup.apply_configuration(ConfigUpdate::theme("neon")).await?;
    assert_eq!(h.twitch.connects(), 2);
    Ok(())
}

#[tokio::test]
async fn test_stream_watcher_reconnects_without_apply() -> Result<(), Error> {
    let h = setup().await;
    tokio::spawn(h.sup.clone().watch_streams());
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "streamer42")).await?;
    let mut viewer = quiet_viewer(&h.hub);

    h.tiktok.end_stream(0);

    timeout(Duration::from_secs(3), async {
        while h.tiktok.connects() < 2 || h.sup.live_connections().await.is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("watcher did not reconnect");

    assert_eq!(h.sup.live_connections().await, vec![(Platform::TikTok, "streamer42".to_string())]);
    assert_eq!(h.tiktok.live(), 1);
    assert_eq!(h.tiktok.max_live(), 1);

    h.tiktok.emit_chat("tt_fan", "reconnected").await;
    assert_eq!(next_chat(&mut viewer).await.user, "tt_fan");
    Ok(())
}

#[tokio::test]
async fn test_ended_stream_of_cleared_platform_is_not_revived() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "chan")).await?;
    h.twitch.end_stream(0);
    wait_until_offline(&h.sup).await;

    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "NONE")).await?;
    assert_eq!(h.twitch.connects(), 1);
    assert_eq!(h.twitch.live(), 0);
    assert_eq!(h.sup.mode().await, SourceMode::Fallback);
    assert!(h.sup.demo_running().await);
    Ok(())
}

#[tokio::test]
async fn test_malformed_events_are_skipped() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "chan")).await?;
    let mut viewer = quiet_viewer(&h.hub);

    let mut broken = raw_chat(Platform::Twitch, "x", "y");
    if let chatbridge_core::platforms::RawChatMessage::Twitch(ref mut m) = broken {
        m.text = None;
    }
    h.twitch.emit(broken).await;
    h.twitch.emit_chat("Gamer123", "still alive").await;

    let evt = next_chat(&mut viewer).await;
    assert_eq!(evt.user, "Gamer123");
    assert_eq!(evt.color.as_deref(), Some("#9146FF"));
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_leaves_platform_offline() -> Result<(), Error> {
    let h = setup().await;
    h.tiktok.fail_next_connect();

    let merged = h.sup.apply_configuration(ConfigUpdate {
        tiktok_username: Some("badname".into()),
        twitch_channel: Some("goodchan".into()),
        ..Default::default()
    }).await?;
    assert_eq!(merged.tiktok_username, "badname");
    assert_eq!(h.sup.mode().await, SourceMode::Both);
    assert_eq!(h.sup.live_connections().await, vec![(Platform::Twitch, "goodchan".to_string())]);
    assert!(!h.sup.demo_running().await, "configured identity keeps demo off even if connect failed");

    // The next identity change retries.
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "goodname")).await?;
    assert_eq!(h.sup.live_connections().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_clearing_both_resumes_demo_and_empty_counts_as_unconfigured() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate {
        tiktok_username: Some("tt".into()),
        twitch_channel: Some("tw".into()),
        ..Default::default()
    }).await?;
    assert!(!h.sup.demo_running().await);

    h.sup.apply_configuration(ConfigUpdate::identity(Platform::TikTok, "")).await?;
    assert_eq!(h.sup.mode().await, SourceMode::TwitchOnly);
    assert!(!h.sup.demo_running().await);

    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "NONE")).await?;
    assert_eq!(h.sup.mode().await, SourceMode::Fallback);
    assert!(h.sup.demo_running().await);
    assert_eq!((h.tiktok.live(), h.twitch.live()), (0, 0));
    Ok(())
}

#[tokio::test]
async fn test_late_joiner_sees_current_config_once() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "chan")).await?;
    h.sup.apply_configuration(ConfigUpdate::theme("retro")).await?;
    for i in 0..3 {
        h.twitch.emit_chat("early", &format!("msg {i}")).await;
    }
    sleep(Duration::from_millis(50)).await;

    let mut late = h.hub.join();
    let msgs = drain(&mut late);
    match msgs.as_slice() {
        [ViewerMessage::InitialState(cfg)] => {
            assert_eq!(cfg, &Configuration {
                twitch_channel: "chan".into(),
                theme: "retro".into(),
                ..Configuration::default()
            });
        }
        other => panic!("expected exactly one initial_state, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_everything() -> Result<(), Error> {
    let h = setup().await;
    h.sup.apply_configuration(ConfigUpdate::identity(Platform::Twitch, "chan")).await?;
    h.sup.shutdown().await;

    assert_eq!(h.sup.mode().await, SourceMode::NoSource);
    assert_eq!(h.twitch.live(), 0);
    assert!(!h.sup.demo_running().await);
    Ok(())
}

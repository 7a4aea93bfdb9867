//! The world task driven through its handle on a paused clock

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use skirmish::config::Config;
use skirmish::game::{Outbound, World, WorldEvent, WorldHandle};
use skirmish::ws::protocol::{ClientMsg, HitZone, ServerMsg, SessionId};

fn spawn_world() -> (WorldHandle, tokio::task::JoinHandle<()>) {
    let config = Config {
        spawn_seed: Some(7),
        ..Config::default()
    };
    let (world, handle) = World::new(Arc::new(config));
    (handle, tokio::spawn(world.run()))
}

async fn connect(handle: &WorldHandle) -> (SessionId, mpsc::UnboundedReceiver<Outbound>) {
    let id = handle.allocate_session_id();
    let (tx, rx) = mpsc::unbounded_channel();
    handle
        .send(WorldEvent::Connected {
            session_id: id,
            outbound: tx,
        })
        .await
        .unwrap();
    (id, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(frame);
    }
    out
}

fn respawns(frames: &[Outbound]) -> Vec<ServerMsg> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            Outbound::Text(text) => ServerMsg::decode(text).ok(),
            _ => None,
        })
        .filter(|msg| matches!(msg, ServerMsg::Respawn { .. }))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn respawn_fires_once_after_the_delay() {
    let (handle, task) = spawn_world();
    let (a, _a_rx) = connect(&handle).await;
    let (b, mut b_rx) = connect(&handle).await;

    handle
        .send(WorldEvent::Message {
            session_id: a,
            msg: ClientMsg::PlayerHit {
                target_id: b,
                damage: 100.0,
                hit_zone: HitZone::Head,
            },
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(2999)).await;
    assert!(respawns(&drain(&mut b_rx)).is_empty());

    sleep(Duration::from_millis(2)).await;
    match &respawns(&drain(&mut b_rx))[..] {
        [ServerMsg::Respawn { state }] => assert_eq!(state.health, 100.0),
        other => panic!("unexpected {other:?}"),
    }

    sleep(Duration::from_secs(5)).await;
    assert!(respawns(&drain(&mut b_rx)).is_empty());

    drop(handle);
    tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(1), task).await);
}

#[tokio::test(start_paused = true)]
async fn quiet_session_is_pinged_then_closed() {
    let (handle, _task) = spawn_world();
    let (_id, mut rx) = connect(&handle).await;

    sleep(Duration::from_secs(9)).await;
    assert!(!drain(&mut rx).iter().any(|f| matches!(f, Outbound::Ping)));

    sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut rx).iter().any(|f| matches!(f, Outbound::Ping)));
    assert_eq!(handle.session_count(), 1);

    sleep(Duration::from_secs(20)).await;
    assert!(drain(&mut rx).iter().any(|f| matches!(f, Outbound::Close)));
    assert_eq!(handle.session_count(), 0);
}

//! Real sockets against the full router on an ephemeral port

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use glam::{Quat, Vec3};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use skirmish::app::AppState;
use skirmish::config::Config;
use skirmish::http::build_router;
use skirmish::ws::protocol::{AnimationState, ClientMsg, ServerMsg};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let config = Config {
        spawn_seed: Some(7),
        ..Config::default()
    };
    let (state, world) = AppState::new(config);
    tokio::spawn(world.run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = assert_ok!(connect_async(format!("ws://{addr}/ws")).await);
    socket
}

/// Next server message accepted by `keep`, skipping everything else
async fn next_matching<F>(socket: &mut Socket, keep: F) -> ServerMsg
where
    F: Fn(&ServerMsg) -> bool,
{
    let wait = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg = assert_ok!(ServerMsg::decode(&text));
                    if keep(&msg) {
                        return msg;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("socket ended: {other:?}"),
            }
        }
    };
    assert_ok!(timeout(Duration::from_secs(5), wait).await)
}

async fn send(socket: &mut Socket, msg: &ClientMsg) {
    let text = assert_ok!(msg.encode());
    assert_ok!(socket.send(Message::Text(text)).await);
}

#[tokio::test]
async fn init_then_join_notifications() {
    let addr = start_server().await;

    let mut first = connect(addr).await;
    let first_id = match next_matching(&mut first, |m| matches!(m, ServerMsg::Init { .. })).await {
        ServerMsg::Init { id, state, players } => {
            assert_eq!(state.id, id);
            assert_eq!(state.health, state.max_health);
            assert!(players.is_empty());
            id
        }
        _ => unreachable!(),
    };

    let mut second = connect(addr).await;
    match next_matching(&mut second, |m| matches!(m, ServerMsg::Init { .. })).await {
        ServerMsg::Init { id, players, .. } => {
            assert!(id > first_id);
            assert_eq!(players.len(), 1);
            assert_eq!(players[0].id, first_id);
        }
        _ => unreachable!(),
    }

    let joined = next_matching(&mut first, |m| matches!(m, ServerMsg::PlayerJoined { .. })).await;
    assert!(matches!(joined, ServerMsg::PlayerJoined { player } if player.id > first_id));
}

#[tokio::test]
async fn updates_show_up_in_world_state() {
    let addr = start_server().await;
    let mut mover = connect(addr).await;
    let mover_id = match next_matching(&mut mover, |m| matches!(m, ServerMsg::Init { .. })).await {
        ServerMsg::Init { id, .. } => id,
        _ => unreachable!(),
    };
    let mut watcher = connect(addr).await;

    let target = Vec3::new(3.0, 0.0, -4.0);
    send(
        &mut mover,
        &ClientMsg::PlayerUpdate {
            position: target,
            rotation: Quat::IDENTITY,
            animation: AnimationState::Run,
            health: 100.0,
        },
    )
    .await;

    let seen = next_matching(&mut watcher, |m| match m {
        ServerMsg::WorldState { players, .. } => players
            .iter()
            .any(|p| p.id == mover_id && p.position == target),
        _ => false,
    })
    .await;
    assert!(matches!(seen, ServerMsg::WorldState { .. }));
}

#[tokio::test]
async fn malformed_frame_does_not_close_connection() {
    let addr = start_server().await;
    let mut socket = connect(addr).await;
    next_matching(&mut socket, |m| matches!(m, ServerMsg::Init { .. })).await;

    assert_ok!(socket.send(Message::Text("{\"type\":\"nope\"".into())).await);
    send(&mut socket, &ClientMsg::Ping).await;

    let pong = next_matching(&mut socket, |m| matches!(m, ServerMsg::Pong)).await;
    assert_eq!(pong, ServerMsg::Pong);
}

#[tokio::test]
async fn closing_socket_broadcasts_player_left() {
    let addr = start_server().await;
    let mut stayer = connect(addr).await;
    next_matching(&mut stayer, |m| matches!(m, ServerMsg::Init { .. })).await;

    let mut leaver = connect(addr).await;
    let leaver_id = match next_matching(&mut leaver, |m| matches!(m, ServerMsg::Init { .. })).await {
        ServerMsg::Init { id, .. } => id,
        _ => unreachable!(),
    };
    assert_ok!(leaver.close(None).await);

    let left = next_matching(&mut stayer, |m| matches!(m, ServerMsg::PlayerLeft { .. })).await;
    assert_eq!(left, ServerMsg::PlayerLeft { id: leaver_id });
}

use super::*;
use pretty_assertions::assert_eq;
use tokio::time::{Duration, timeout};

/// Receive a frame from the channel with timeout.
async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<WireFrame>) -> WireFrame {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timeout waiting for relay frame")
        .expect("channel closed")
}

/// Assert that no frame is received within timeout.
async fn expect_no_frame(rx: &mut mpsc::UnboundedReceiver<WireFrame>) {
    let res = timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(res.is_err(), "expected no frame, but received one");
}

fn relay_state(protocol: Protocol) -> Arc<RelayState> {
    let config = small_config(protocol);
    let registry = config.registry().unwrap();
    RelayState::new(&config, &registry).unwrap()
}

/// Start a relay on an ephemeral port and return a client config pointing at it.
async fn start_relay(protocol: Protocol) -> CanvasConfig {
    init_logging();
    let config = CanvasConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..small_config(protocol)
    };
    let registry = config.registry().unwrap();
    let relay = Relay::bind(&config, &registry).await.unwrap();
    let addr = relay.local_addr().unwrap();
    tokio::spawn(relay.run());
    CanvasConfig {
        relay_url: format!("ws://{addr}/ws"),
        ..config
    }
}

/// Handle transport events until `done` holds.
async fn pump_until<F>(manager: &mut ConnectionManager<MemorySurface>, mut done: F)
where
    F: FnMut(&ConnectionManager<MemorySurface>) -> bool,
{
    timeout(Duration::from_secs(5), async move {
        while !done(&*manager) {
            assert!(manager.process_next().await, "transport ended early");
        }
    })
    .await
    .expect("timeout waiting for canvas state");
}

#[tokio::test]
async fn test_forwards_to_everyone_including_sender() {
    let state = relay_state(Protocol::Binary);
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let id1 = state.register_client(tx1).await;
    let _id2 = state.register_client(tx2).await;
    assert_eq!(state.client_count().await, 2);

    let frame = WireFrame::Binary(vec![0x0A, 0x00, 0x04, 0x00, 0x03]);
    assert_eq!(state.handle_frame(id1, frame.clone()).await, 1);
    assert_eq!(recv_frame(&mut rx1).await, frame);
    assert_eq!(recv_frame(&mut rx2).await, frame);
    assert_eq!(state.read(10, 4).await, Some(ColorValue::Index(3)));
}

#[tokio::test]
async fn test_invalid_frames_are_not_forwarded() {
    let state = relay_state(Protocol::Binary);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = state.register_client(tx).await;

    assert_eq!(state.handle_frame(id, WireFrame::Binary(vec![0, 0, 0])).await, 0);
    // index 12 is past the default palette
    assert_eq!(state.handle_frame(id, WireFrame::Binary(vec![0, 0, 0, 0, 12])).await, 0);
    assert_eq!(state.handle_frame(id, WireFrame::Text("{}".to_string())).await, 0);
    expect_no_frame(&mut rx).await;
    assert_eq!(state.read(0, 0).await, Some(ColorValue::Index(9)));
}

#[tokio::test]
async fn test_text_batch_forwarded_verbatim() {
    let state = relay_state(Protocol::Text);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = state.register_client(tx).await;

    let batch = WireFrame::Text(
        r##"[{"x":0,"y":0,"color":"#ff0000"},{"x":-1,"y":0,"color":"#00ff00"},{"x":1,"y":1,"color":"#0000ff"}]"##.to_string(),
    );
    assert_eq!(state.handle_frame(id, batch.clone()).await, 2);
    assert_eq!(recv_frame(&mut rx).await, batch);
    assert_eq!(state.read(0, 0).await, Some(ColorValue::Rgb(Color::new(0xFF, 0, 0))));
    assert_eq!(state.read(1, 1).await, Some(ColorValue::Rgb(Color::new(0, 0, 0xFF))));
}

#[tokio::test]
async fn test_late_joiner_replay_precedes_live_traffic() {
    let state = relay_state(Protocol::Binary);
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let id1 = state.register_client(tx1).await;
    state.handle_frame(id1, WireFrame::Binary(vec![1, 0, 0, 0, 2])).await;
    state.handle_frame(id1, WireFrame::Binary(vec![0, 0, 1, 0, 3])).await;
    state.handle_frame(id1, WireFrame::Binary(vec![1, 0, 0, 0, 4])).await;

    let (tx2, mut rx2) = mpsc::unbounded_channel();
    state.register_client(tx2).await;
    state.handle_frame(id1, WireFrame::Binary(vec![5, 0, 5, 0, 5])).await;

    // row-major replay of the current grid, then the live frame
    assert_eq!(recv_frame(&mut rx2).await, WireFrame::Binary(vec![1, 0, 0, 0, 4]));
    assert_eq!(recv_frame(&mut rx2).await, WireFrame::Binary(vec![0, 0, 1, 0, 3]));
    assert_eq!(recv_frame(&mut rx2).await, WireFrame::Binary(vec![5, 0, 5, 0, 5]));
    expect_no_frame(&mut rx2).await;
}

#[tokio::test]
async fn test_text_replay_is_batched() {
    let state = relay_state(Protocol::Text);
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let id1 = state.register_client(tx1).await;
    state
        .handle_frame(id1, WireFrame::Text(r#"[{"x":1,"y":0,"color":255},{"x":2,"y":0,"color":65280}]"#.to_string()))
        .await;

    let (tx2, mut rx2) = mpsc::unbounded_channel();
    state.register_client(tx2).await;
    assert_eq!(
        recv_frame(&mut rx2).await,
        WireFrame::Text(r#"[{"x":1,"y":0,"color":255},{"x":2,"y":0,"color":65280}]"#.to_string())
    );
    expect_no_frame(&mut rx2).await;
}

#[tokio::test]
async fn test_unregister() {
    let state = relay_state(Protocol::Binary);
    let (tx, _rx) = mpsc::unbounded_channel();
    let id = state.register_client(tx).await;
    state.unregister_client(id).await;
    assert_eq!(state.client_count().await, 0);
}

#[tokio::test]
async fn test_stalled_client_does_not_block_others() {
    let state = relay_state(Protocol::Binary);
    // never drained
    let (stalled_tx, _stalled_rx) = mpsc::unbounded_channel();
    let stalled = state.register_client(stalled_tx).await;
    for x in 0..1000 {
        state.handle_frame(stalled, WireFrame::Binary(vec![(x % 64) as u8, 0, 1, 0, 2])).await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = timeout(Duration::from_millis(500), state.register_client(tx))
        .await
        .expect("late joiner registered");
    let frame = WireFrame::Binary(vec![3, 0, 3, 0, 4]);
    let committed = timeout(Duration::from_millis(500), state.handle_frame(id, frame.clone()))
        .await
        .expect("other client's frame handled");
    assert_eq!(committed, 1);
    let cell = timeout(Duration::from_millis(500), state.read(3, 3)).await.expect("grid read");
    assert_eq!(cell, Some(ColorValue::Index(4)));

    // 64 replayed cells, then the live frame
    for _ in 0..64 {
        recv_frame(&mut rx).await;
    }
    assert_eq!(recv_frame(&mut rx).await, frame);
}

#[tokio::test]
async fn test_closed_client_is_dropped_on_broadcast() {
    let state = relay_state(Protocol::Binary);
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, rx2) = mpsc::unbounded_channel();
    let id1 = state.register_client(tx1).await;
    state.register_client(tx2).await;
    drop(rx2);

    let frame = WireFrame::Binary(vec![1, 0, 1, 0, 1]);
    assert_eq!(state.handle_frame(id1, frame.clone()).await, 1);
    assert_eq!(recv_frame(&mut rx1).await, frame);
    assert_eq!(state.client_count().await, 1);
}

#[tokio::test]
async fn test_clients_converge_through_relay() {
    let config = start_relay(Protocol::Binary).await;

    let (mut alice, _alice_events) = new_manager(&config);
    alice.connect().unwrap();
    pump_until(&mut alice, |m| m.state() == ConnectionState::Open).await;

    let (x, y) = PixelMapper::new(config.pixel_size).cell_at(105, 47, 0, 0);
    alice.send(PixelUpdate::indexed(x, y, 3)).unwrap();
    pump_until(&mut alice, |m| m.grid().read(10, 4) == Some(ColorValue::Index(3))).await;
    assert_eq!(alice.surface().pixel(10, 4), Some(Color::new(0x00, 0x80, 0x00)));

    // bob joins late and catches up from the replay
    let (mut bob, _bob_events) = new_manager(&config);
    bob.connect().unwrap();
    pump_until(&mut bob, |m| m.grid().read(10, 4) == Some(ColorValue::Index(3))).await;

    bob.send(PixelUpdate::indexed(10, 4, 0)).unwrap();
    pump_until(&mut alice, |m| m.grid().read(10, 4) == Some(ColorValue::Index(0))).await;
    pump_until(&mut bob, |m| m.grid().read(10, 4) == Some(ColorValue::Index(0))).await;
    assert_eq!(alice.grid(), bob.grid());

    alice.close();
    alice.run_until_closed().await;
    assert_eq!(alice.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_text_clients_converge_through_relay() {
    let config = start_relay(Protocol::Text).await;
    let pink = Color::new(0xFF, 0xC0, 0xCB);

    let (mut alice, _alice_events) = new_manager(&config);
    alice.connect().unwrap();
    pump_until(&mut alice, |m| m.state() == ConnectionState::Open).await;
    alice
        .send_batch(&[PixelUpdate::rgb(0, 0, pink), PixelUpdate::rgb(63, 63, pink)])
        .unwrap();
    pump_until(&mut alice, |m| m.grid().read(63, 63) == Some(ColorValue::Rgb(pink))).await;

    let (mut bob, _bob_events) = new_manager(&config);
    bob.connect().unwrap();
    pump_until(&mut bob, |m| m.grid().painted_cells().count() == 2).await;
    assert_eq!(alice.grid(), bob.grid());
    assert_eq!(bob.surface().pixel(0, 0), Some(pink));
}

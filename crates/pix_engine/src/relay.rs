//! Reference relay: fans every client's frames out to all clients.
//!
//! The relay keeps its own authoritative [`CanvasGrid`], built with the same
//! codec and validator as the clients. Inbound frames are decoded and
//! validated; valid elements are committed and the received frame is
//! forwarded verbatim to every client, the sender included. A frame without
//! any valid element is dropped.
//!
//! New connections first receive the current grid as ordinary update frames
//! (every cell that differs from the background) before any live traffic, so
//! late joiners converge without a dedicated snapshot message.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{RwLock, mpsc},
};
use tokio_tungstenite::tungstenite::Message;

use crate::{CanvasConfig, CanvasError, CanvasGrid, ColorValue, PaletteRegistry, PixelCodec, PixelUpdate, Result, UpdateValidator, WireFrame};

pub type ClientId = u64;

#[derive(Debug)]
pub struct RelayState {
    codec: PixelCodec,
    validator: UpdateValidator,
    /// Lock order: `grid` before `clients`.
    grid: RwLock<CanvasGrid>,
    clients: RwLock<HashMap<ClientId, mpsc::UnboundedSender<WireFrame>>>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new(config: &CanvasConfig, registry: &PaletteRegistry) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            codec: config.protocol.codec(),
            validator: config.validator(registry)?,
            grid: RwLock::new(config.new_grid(registry)?),
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }))
    }

    /// Queue the catch-up replay for a new client, then start forwarding live frames to it.
    ///
    /// Client queues are unbounded, so neither the replay nor a later fan-out
    /// waits on a slow reader while the grid is locked.
    pub async fn register_client(&self, sender: mpsc::UnboundedSender<WireFrame>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let grid = self.grid.read().await;
        let painted: Vec<PixelUpdate> = grid.painted_cells().collect();
        match self.codec.encode_batch(&painted) {
            Ok(frames) => {
                if !frames.is_empty() {
                    log::debug!("Replaying {} cells to client {} in {} frames", painted.len(), id, frames.len());
                }
                for frame in frames {
                    if sender.send(frame).is_err() {
                        break;
                    }
                }
            }
            Err(err) => log::error!("Cannot encode catch-up replay for client {id}: {err}"),
        }
        self.clients.write().await.insert(id, sender);
        drop(grid);
        id
    }

    pub async fn unregister_client(&self, id: ClientId) {
        self.clients.write().await.remove(&id);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn read(&self, x: i32, y: i32) -> Option<ColorValue> {
        self.grid.read().await.read(x, y)
    }

    /// Commit the valid elements of `frame` and forward it to everyone.
    /// Returns the number of committed updates.
    pub async fn handle_frame(&self, from: ClientId, frame: WireFrame) -> usize {
        let mut grid = self.grid.write().await;
        let mut committed = 0;
        for result in self.codec.decode(&frame).into_results() {
            match result {
                Ok(update) => match self.validator.validate(&update) {
                    Ok(()) => {
                        grid.commit_update(&update);
                        committed += 1;
                    }
                    Err(reason) => log::warn!("[client {from}] Dropping {update:?}: {reason}"),
                },
                Err(err) => log::warn!("[client {from}] Dropping undecodable update: {err}"),
            }
        }
        if committed == 0 {
            return 0;
        }
        // readers may proceed, other writers wait until the frame is queued everywhere
        let _grid = grid.downgrade();
        log::debug!("[client {from}] {frame}");
        self.broadcast(&frame).await;
        committed
    }

    async fn broadcast(&self, frame: &WireFrame) {
        let gone: Vec<ClientId> = {
            let clients = self.clients.read().await;
            clients.iter().filter(|(_, sender)| sender.send(frame.clone()).is_err()).map(|(id, _)| *id).collect()
        };
        if !gone.is_empty() {
            let mut clients = self.clients.write().await;
            for id in gone {
                log::debug!("Dropping client {id}: connection task is gone");
                clients.remove(&id);
            }
        }
    }
}

/// A bound relay, ready to accept connections.
pub struct Relay {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl Relay {
    pub async fn bind(config: &CanvasConfig, registry: &PaletteRegistry) -> Result<Self> {
        let state = RelayState::new(config, registry)?;
        let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        log::info!("Relay listening on {}", self.local_addr()?);
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(state, stream, addr).await {
                    log::error!("[{addr}] Connection error: {e}");
                }
            });
        }
    }
}

async fn handle_connection(state: Arc<RelayState>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await.map_err(|e| CanvasError::transport(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WireFrame>();
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame.into_message()).await.is_err() {
                break;
            }
        }
    });

    let id = state.register_client(tx).await;
    log::info!("[{addr}] Client {id} joined (clients: {})", state.client_count().await);

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                log::warn!("[{addr}] WebSocket error: {e}");
                break;
            }
        };
        match msg {
            Message::Close(_) => break,
            msg => {
                if let Some(frame) = WireFrame::from_message(msg) {
                    state.handle_frame(id, frame).await;
                }
            }
        }
    }

    state.unregister_client(id).await;
    log::info!("[{addr}] Client {id} left (clients: {})", state.client_count().await);
    sender_task.abort();
    Ok(())
}

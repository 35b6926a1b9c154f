//! Client side of the canvas: socket lifecycle plus the decode, validate,
//! commit and render pipeline.
//!
//! The WebSocket runs in a spawned task that never touches canvas state. It
//! reports [`TransportEvent`]s through one channel whose only consumer is the
//! [`ConnectionManager`], which handles each event synchronously. Every grid
//! mutation therefore happens inside exactly one event reaction.
//!
//! ```text
//! Disconnected --connect()--> Connecting --Opened--> Open
//!      ^                          |                   |
//!      |                        Error               Error / close()
//!      |                          v                   v
//!      +-----Closed / close()-- Errored           Closing --Closed--> Disconnected
//! ```

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{CanvasConfig, CanvasError, CanvasGrid, PaletteRegistry, PixelCodec, PixelUpdate, Rejection, RenderSurface, Result, UpdateValidator, WireFrame};

/// Inbound events only; outbound commands are unbounded so a valid send is never dropped.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Errored,
}

/// What the transport task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(WireFrame),
    Error(String),
    Closed,
}

/// What the manager asks of the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(WireFrame),
    Close,
}

/// Notifications for the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    StateChanged(ConnectionState),
    /// An update passed validation and is now in the grid.
    Committed(PixelUpdate),
    /// An inbound update failed validation and was dropped.
    Rejected { update: PixelUpdate, reason: Rejection },
    /// An inbound frame or batch element could not be decoded.
    DecodeFailed(CanvasError),
    /// A local update was refused before it reached the wire.
    SendRejected { update: PixelUpdate, error: CanvasError },
    TransportFailed(String),
}

/// Owns the transport handle, the grid and the render surface for one session.
pub struct ConnectionManager<S: RenderSurface> {
    url: String,
    codec: PixelCodec,
    registry: Arc<PaletteRegistry>,
    active_palette: String,
    validator: UpdateValidator,
    grid: CanvasGrid,
    surface: S,
    state: ConnectionState,
    debug_frames: bool,

    events: mpsc::UnboundedSender<CanvasEvent>,
    transport_rx: Option<mpsc::Receiver<TransportEvent>>,
    command_tx: Option<mpsc::UnboundedSender<TransportCommand>>,
    task: Option<JoinHandle<()>>,
}

impl<S: RenderSurface> ConnectionManager<S> {
    /// Build a disconnected manager. The surface is painted with the background.
    pub fn new(config: &CanvasConfig, registry: Arc<PaletteRegistry>, surface: S) -> Result<(Self, mpsc::UnboundedReceiver<CanvasEvent>)> {
        let validator = config.validator(&registry)?;
        let grid = config.new_grid(&registry)?;
        let (events, events_rx) = mpsc::unbounded_channel();

        let mut manager = Self {
            url: config.relay_url.clone(),
            codec: config.protocol.codec(),
            registry,
            active_palette: config.palette.clone(),
            validator,
            grid,
            surface,
            state: ConnectionState::Disconnected,
            debug_frames: config.debug_logging,
            events,
            transport_rx: None,
            command_tx: None,
            task: None,
        };
        manager.repaint();
        Ok((manager, events_rx))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn grid(&self) -> &CanvasGrid {
        &self.grid
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn validator(&self) -> &UpdateValidator {
        &self.validator
    }

    pub fn active_palette(&self) -> &str {
        &self.active_palette
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the transport in a background task.
    ///
    /// # Errors
    ///
    /// [`CanvasError::InvalidTransition`] unless currently disconnected.
    pub fn connect(&mut self) -> Result<()> {
        let (event_tx, command_rx) = self.attach_transport()?;
        log::info!("Connecting to relay: {}", self.url);
        self.task = Some(tokio::spawn(run_transport(self.url.clone(), event_tx, command_rx)));
        Ok(())
    }

    /// Enter `Connecting` with a caller-driven transport instead of a socket.
    #[doc(hidden)]
    pub fn attach_transport(&mut self) -> Result<(mpsc::Sender<TransportEvent>, mpsc::UnboundedReceiver<TransportCommand>)> {
        if self.state != ConnectionState::Disconnected {
            return Err(CanvasError::InvalidTransition {
                action: "connect",
                state: self.state,
            });
        }
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.transport_rx = Some(event_rx);
        self.command_tx = Some(command_tx);
        self.set_state(ConnectionState::Connecting);
        Ok((event_tx, command_rx))
    }

    /// Ask the transport to shut down.
    ///
    /// From `Connecting` or `Open` this enters `Closing` and the transport's
    /// `Closed` event completes the transition. From `Errored` it releases
    /// the transport and returns to `Disconnected` at once.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.request_close();
                self.set_state(ConnectionState::Closing);
            }
            ConnectionState::Errored => {
                self.release_transport();
                self.set_state(ConnectionState::Disconnected);
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }

    /// Validate, encode and transmit one local update. The grid is not touched;
    /// the update shows up once the relay echoes it back.
    ///
    /// # Errors
    ///
    /// [`CanvasError::NotConnected`] outside `Open`, [`CanvasError::ValidationRejected`]
    /// or [`CanvasError::EncodeRange`] if the update is refused. Refusals are also
    /// reported as [`CanvasEvent::SendRejected`].
    pub fn send(&mut self, update: PixelUpdate) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(CanvasError::NotConnected);
        }
        let frame = match self.prepare(&update) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Refusing to send {update:?}: {err}");
                self.emit(CanvasEvent::SendRejected { update, error: err.clone() });
                return Err(err);
            }
        };
        self.transmit(frame)
    }

    /// Send every update that passes validation. Refused updates are reported and skipped.
    /// Returns how many updates went out.
    pub fn send_batch(&mut self, updates: &[PixelUpdate]) -> Result<usize> {
        if self.state != ConnectionState::Open {
            return Err(CanvasError::NotConnected);
        }
        let mut accepted = Vec::with_capacity(updates.len());
        for update in updates {
            match self.validator.validate(update) {
                Ok(()) => accepted.push(*update),
                Err(reason) => {
                    log::warn!("Refusing to send {update:?}: {reason}");
                    self.emit(CanvasEvent::SendRejected {
                        update: *update,
                        error: reason.into(),
                    });
                }
            }
        }
        for frame in self.codec.encode_batch(&accepted)? {
            self.transmit(frame)?;
        }
        Ok(accepted.len())
    }

    /// Switch the palette used for validating and rendering from now on.
    /// Cells already on the surface keep their colors until [`Self::repaint`].
    pub fn set_active_palette(&mut self, name: &str) -> Result<()> {
        let palette = self.registry.palette(name)?;
        self.validator.palette_size = match self.codec {
            PixelCodec::BinaryIndexed => palette.len().min(16),
            PixelCodec::TextStructured => palette.len(),
        };
        log::info!("Active palette is now '{}' ({} colors)", name, palette.len());
        self.active_palette = name.to_string();
        Ok(())
    }

    /// Project the whole grid onto the surface with the active palette.
    pub fn repaint(&mut self) {
        let width = self.grid.width();
        for (i, value) in self.grid.cells().iter().enumerate() {
            let color = self.registry.resolve_or_default(&self.active_palette, *value);
            self.surface.set_pixel(i as u32 % width, i as u32 / width, color);
        }
    }

    /// Wait for one transport event and handle it. Returns `false` once no transport is attached.
    pub async fn process_next(&mut self) -> bool {
        let Some(rx) = self.transport_rx.as_mut() else {
            return false;
        };
        // all senders gone means the task ended
        let event = rx.recv().await.unwrap_or(TransportEvent::Closed);
        self.handle_event(event);
        true
    }

    pub async fn run_until_closed(&mut self) {
        while self.process_next().await {}
    }

    /// Apply one transport event to the state machine.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    log::info!("Connected to relay: {}", self.url);
                    self.set_state(ConnectionState::Open);
                } else {
                    log::debug!("Ignoring open while {:?}", self.state);
                }
            }
            TransportEvent::Frame(frame) => {
                if self.state == ConnectionState::Open {
                    self.apply_frame(&frame);
                } else {
                    log::warn!("Dropping {} byte frame while {:?}", frame.len(), self.state);
                }
            }
            TransportEvent::Error(message) => {
                log::error!("Transport error: {message}");
                self.emit(CanvasEvent::TransportFailed(message));
                if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
                    self.set_state(ConnectionState::Errored);
                    self.request_close();
                }
            }
            TransportEvent::Closed => {
                if self.state != ConnectionState::Disconnected {
                    log::info!("Disconnected from relay: {}", self.url);
                }
                self.release_transport();
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn apply_frame(&mut self, frame: &WireFrame) {
        if self.debug_frames {
            log::debug!("<- {frame}");
        }
        for result in self.codec.decode(frame).into_results() {
            match result {
                Ok(update) => self.apply_update(update),
                Err(err) => {
                    log::warn!("Dropping undecodable update: {err}");
                    self.emit(CanvasEvent::DecodeFailed(err));
                }
            }
        }
    }

    fn apply_update(&mut self, update: PixelUpdate) {
        if let Err(reason) = self.validator.validate(&update) {
            log::warn!("Dropping {update:?}: {reason}");
            self.emit(CanvasEvent::Rejected { update, reason });
            return;
        }
        self.grid.commit_update(&update);
        let color = self.registry.resolve_or_default(&self.active_palette, update.color);
        self.surface.set_pixel(update.x as u32, update.y as u32, color);
        self.emit(CanvasEvent::Committed(update));
    }

    fn prepare(&self, update: &PixelUpdate) -> Result<WireFrame> {
        self.validator.validate(update)?;
        self.codec.encode(update)
    }

    fn transmit(&mut self, frame: WireFrame) -> Result<()> {
        let Some(tx) = &self.command_tx else {
            return Err(CanvasError::NotConnected);
        };
        if self.debug_frames {
            log::debug!("-> {frame}");
        }
        tx.send(TransportCommand::Send(frame)).map_err(|_| CanvasError::NotConnected)
    }

    fn request_close(&mut self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(TransportCommand::Close);
        }
    }

    fn release_transport(&mut self) {
        self.command_tx = None;
        self.transport_rx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(CanvasEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: CanvasEvent) {
        let _ = self.events.send(event);
    }
}

impl<S: RenderSurface> Drop for ConnectionManager<S> {
    fn drop(&mut self) {
        self.request_close();
    }
}

/// Transport task: forwards socket traffic as events and executes commands.
/// Always ends by reporting `Closed`.
async fn run_transport(url: String, events: mpsc::Sender<TransportEvent>, mut commands: mpsc::UnboundedReceiver<TransportCommand>) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e.to_string())).await;
            let _ = events.send(TransportEvent::Closed).await;
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    if events.send(TransportEvent::Opened).await.is_err() {
        let _ = write.close().await;
        return;
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(msg)) => {
                        if let Some(frame) = WireFrame::from_message(msg) {
                            if events.send(TransportEvent::Frame(frame)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(TransportCommand::Send(frame)) => {
                        if let Err(e) = write.send(frame.into_message()).await {
                            let _ = events.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    Some(TransportCommand::Close) | None => {
                        let _ = write.close().await;
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(TransportEvent::Closed).await;
}


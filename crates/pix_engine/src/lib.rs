//! Shared pixel canvas: palettes, the pixel update wire protocol, and the
//! client and relay that keep every participant's grid in sync.

mod codec;
mod config;
mod connection;
mod error;
mod grid;
mod palette;
mod protocol;
mod relay;
mod render;
mod validator;

pub use codec::*;
pub use config::*;
pub use connection::*;
pub use error::*;
pub use grid::*;
pub use palette::*;
pub use protocol::*;
pub use relay::*;
pub use render::*;
pub use validator::*;

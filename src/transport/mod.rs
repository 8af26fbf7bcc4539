//! Transport module - byte streams a link can run over.
//!
//! Anything that is `AsyncRead + AsyncWrite + Send + 'static` is a
//! transport: TCP sockets, Unix sockets, Windows named pipes, serial port
//! streams or an in-memory `tokio::io::duplex` pair.

mod stream;

pub use stream::connect_tcp;

#[cfg(unix)]
pub use stream::connect_unix;

#[cfg(windows)]
pub use stream::connect_named_pipe;

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream owned exclusively by one link.
pub trait Transport: AsyncRead + AsyncWrite + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + 'static {}

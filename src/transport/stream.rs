//! Connecting to devices over sockets and pipes.
//!
//! - TCP: network bridges such as a serial-to-TCP adapter
//! - Unix: Unix Domain Socket (Linux/macOS)
//! - Windows: Named Pipe client
//!
//! # Example
//!
//! ```ignore
//! use alplink::{transport::connect_tcp, Link};
//!
//! let stream = connect_tcp("127.0.0.1:4478").await?;
//! let link = Link::open(stream)?;
//! ```

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// Connect to a device reachable over TCP.
///
/// Nagle is disabled, commands are short lines that should leave at once.
pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!("Connected to {:?}", stream.peer_addr().ok());
    Ok(stream)
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::UnixStream;

    /// Connect to a Unix Domain Socket.
    pub async fn connect_unix(path: impl AsRef<Path>) -> Result<UnixStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;
        tracing::debug!("Connected to {}", path.display());
        Ok(stream)
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

    /// Connect to a Named Pipe server, e.g. `\\.\pipe\ardulink`.
    pub async fn connect_named_pipe(path: &str) -> Result<NamedPipeClient> {
        let client = ClientOptions::new().open(path)?;
        tracing::debug!("Connected to {}", path);
        Ok(client)
    }
}

#[cfg(unix)]
pub use unix_impl::connect_unix;

#[cfg(windows)]
pub use windows_impl::connect_named_pipe;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_tcp_exchanges_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = connect_tcp(addr).await.unwrap();
        stream.write_all(b"alp:/").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"alp:/");
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        assert!(connect_tcp(addr).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_unix() {
        let path = std::env::temp_dir().join(format!("alplink-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let stream = connect_unix(&path).await;
        assert!(stream.is_ok());
        assert!(accept.await.unwrap().is_ok());

        let _ = std::fs::remove_file(&path);
    }
}

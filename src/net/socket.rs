// Harbor Network Layer — Socket
// Distributed under the MIT software license.

//! Owned TCP endpoint with cancellable exact-size I/O.
//!
//! A socket owns exactly one stream and the strand of the channel built
//! over it. At most one read and one write are in flight at any instant
//! (the proxy's single read loop and single writer task guarantee this;
//! the half locks enforce it). Every pending operation resolves with
//! `OperationCanceled` when `stop` lands mid-flight; stop is idempotent.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

use crate::config::authority::Authority;
use crate::error::{Error, Result};
use crate::runtime::strand::Strand;

pub struct Socket {
    strand: Strand,
    authority: Authority,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    stopped: AtomicBool,
    stop: watch::Sender<bool>,
}

impl Socket {
    /// Adopt a connected stream. The strand becomes the channel's strand.
    pub fn new(stream: TcpStream, strand: Strand) -> Self {
        let authority = stream
            .peer_addr()
            .map(Authority::from)
            .unwrap_or_else(|_| Authority::new([0u8; 16].into(), 0));

        let (reader, writer) = stream.into_split();
        let (stop, _) = watch::channel(false);

        Self {
            strand,
            authority,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            stopped: AtomicBool::new(false),
            stop,
        }
    }

    pub fn strand(&self) -> &Strand {
        &self.strand
    }

    /// The remote peer's identity.
    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Fill the buffer exactly; a peer disconnect reads as `ChannelStopped`.
    pub async fn read_exact(&self, buffer: &mut [u8]) -> Result<()> {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return Err(Error::ChannelStopped);
        }

        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            _ = stop.changed() => Err(Error::OperationCanceled),
            result = reader.read_exact(buffer) => match result {
                Ok(_) => Ok(()),
                Err(error) => Err(read_error(&error)),
            },
        }
    }

    /// Write the full slab.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return Err(Error::ChannelStopped);
        }

        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = stop.changed() => Err(Error::OperationCanceled),
            result = writer.write_all(bytes) => match result {
                Ok(()) => Ok(()),
                Err(error) => Err(Error::from_io(&error)),
            },
        }
    }

    /// Close the endpoint; pending completions resolve before drop.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.stop.send(true);
    }
}

fn read_error(error: &io::Error) -> Error {
    // An orderly remote close surfaces as EOF mid-heading.
    if error.kind() == io::ErrorKind::UnexpectedEof {
        Error::ChannelStopped
    } else {
        Error::from_io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::runtime::Handle;

    async fn pair() -> (Socket, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let client = TcpStream::connect(address).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Socket::new(server, Strand::new(&Handle::current())), client)
    }

    #[tokio::test]
    async fn test_read_exact_round_trip() {
        let (socket, mut client) = pair().await;

        client.write_all(b"hello").await.unwrap();
        let mut buffer = [0u8; 5];
        socket.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"hello");
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_read() {
        let (socket, _client) = pair().await;
        let socket = std::sync::Arc::new(socket);

        let reader = std::sync::Arc::clone(&socket);
        let pending = tokio::spawn(async move {
            let mut buffer = [0u8; 4];
            reader.read_exact(&mut buffer).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        socket.stop();
        socket.stop(); // idempotent

        assert_eq!(pending.await.unwrap(), Err(Error::OperationCanceled));
        assert!(socket.is_stopped());
    }

    #[tokio::test]
    async fn test_read_after_stop_fails_fast() {
        let (socket, _client) = pair().await;
        socket.stop();

        let mut buffer = [0u8; 1];
        assert_eq!(socket.read_exact(&mut buffer).await, Err(Error::ChannelStopped));
    }

    #[tokio::test]
    async fn test_peer_close_reads_as_stopped() {
        let (socket, client) = pair().await;
        drop(client);

        let mut buffer = [0u8; 1];
        assert_eq!(socket.read_exact(&mut buffer).await, Err(Error::ChannelStopped));
    }
}

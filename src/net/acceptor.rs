// Harbor Network Layer — Acceptor
// Distributed under the MIT software license.

//! Bound listener producing sockets for the inbound session.

use tokio::net::TcpListener;
use tokio::sync::watch;

use super::socket::Socket;
use crate::config::authority::Authority;
use crate::error::{Error, Result};
use crate::runtime::strand::Strand;

pub struct Acceptor {
    strand: Strand,
    listener: TcpListener,
    stop: watch::Sender<bool>,
}

impl Acceptor {
    /// Bind the configured endpoint; the strand serializes the accept loop.
    pub async fn bind(strand: Strand, authority: &Authority) -> Result<Self> {
        let listener = TcpListener::bind(authority.socket_addr())
            .await
            .map_err(|error| {
                tracing::warn!("bind {} failed: {}", authority, error);
                Error::BindFailed
            })?;

        let (stop, _) = watch::channel(false);
        Ok(Self { strand, listener, stop })
    }

    /// The endpoint actually bound (resolves port zero).
    pub fn local_authority(&self) -> Authority {
        self.listener
            .local_addr()
            .map(Authority::from)
            .unwrap_or_else(|_| Authority::new([0u8; 16].into(), 0))
    }

    /// Wait for one inbound connection. Each accepted socket gets a fresh
    /// strand — its channel's serialization lane.
    pub async fn accept(&self) -> Result<Socket> {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return Err(Error::OperationCanceled);
        }

        tokio::select! {
            biased;
            _ = stop.changed() => Err(Error::OperationCanceled),
            result = self.listener.accept() => match result {
                Ok((stream, _)) => {
                    let strand = Strand::new(self.strand.handle());
                    Ok(Socket::new(stream, strand))
                }
                Err(error) => {
                    tracing::warn!("accept failed: {}", error);
                    Err(Error::AcceptFailed)
                }
            },
        }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn test_accept_yields_socket() {
        let strand = Strand::new(&Handle::current());
        let acceptor = Acceptor::bind(strand, &"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let authority = acceptor.local_authority();
        assert_ne!(authority.port(), 0);

        let dial = tokio::spawn(async move {
            TcpStream::connect(authority.socket_addr()).await.unwrap()
        });

        let socket = acceptor.accept().await.unwrap();
        assert_ne!(socket.authority().port(), 0);
        dial.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_cancels_accept() {
        let strand = Strand::new(&Handle::current());
        let acceptor = Acceptor::bind(strand, &"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        acceptor.stop();
        assert_eq!(acceptor.accept().await.err(), Some(Error::OperationCanceled));
    }
}

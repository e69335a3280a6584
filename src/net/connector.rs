// Harbor Network Layer — Connector
// Distributed under the MIT software license.

//! Timed dialer producing sockets for the outreach sessions.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::socket::Socket;
use crate::config::authority::Authority;
use crate::error::{Error, Result};
use crate::runtime::strand::Strand;

pub struct Connector {
    strand: Strand,
    timeout: Duration,
    stop: watch::Sender<bool>,
}

impl Connector {
    pub fn new(strand: Strand, timeout: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        Self { strand, timeout, stop }
    }

    /// Dial an authority under the connect deadline. The resulting socket
    /// carries a fresh strand for its channel.
    pub async fn connect(&self, authority: Authority) -> Result<Socket> {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return Err(Error::OperationCanceled);
        }

        let dial = tokio::time::timeout(self.timeout, TcpStream::connect(authority.socket_addr()));

        tokio::select! {
            biased;
            _ = stop.changed() => Err(Error::OperationCanceled),
            result = dial => match result {
                Ok(Ok(stream)) => {
                    let strand = Strand::new(self.strand.handle());
                    Ok(Socket::new(stream, strand))
                }
                Ok(Err(error)) => {
                    tracing::debug!("connect {} failed: {}", authority, error);
                    Err(Error::ConnectFailed)
                }
                Err(_) => {
                    tracing::debug!("connect {} timed out", authority);
                    Err(Error::OperationTimeout)
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
    use tokio::net::TcpListener;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority = Authority::from(listener.local_addr().unwrap());

        let connector = Connector::new(Strand::new(&Handle::current()), Duration::from_secs(5));
        let socket = connector.connect(authority).await.unwrap();
        assert_eq!(socket.authority().port(), authority.port());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port that refuses.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority = Authority::from(listener.local_addr().unwrap());
        drop(listener);

        let connector = Connector::new(Strand::new(&Handle::current()), Duration::from_secs(5));
        assert_eq!(connector.connect(authority).await.err(), Some(Error::ConnectFailed));
    }

    #[tokio::test]
    async fn test_stop_cancels_dial() {
        let connector = Connector::new(Strand::new(&Handle::current()), Duration::from_secs(30));
        connector.stop();

        let authority: Authority = "203.0.113.1:8333".parse().unwrap();
        assert_eq!(connector.connect(authority).await.err(), Some(Error::OperationCanceled));
    }
}

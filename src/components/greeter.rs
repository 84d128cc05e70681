use crate::{error::AppResult, types::ParsedCertificate};
use std::{
    io::{Error as IoError, ErrorKind},
    net::SocketAddr,
    sync::Arc,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use tokio_rustls::{rustls::ServerConfig, server::TlsStream, TlsAcceptor};
use tokio_util::sync::CancellationToken;

const MAX_REQUEST_LEN: usize = 256;

/// Line-based greeter served over mutual TLS.
///
/// A client sends one request line, `HELLO <name>` or `AGAIN <name>`, and
/// receives the matching [`Greeting`] reply.
#[derive(Clone)]
pub struct Greeter {
    acceptor: TlsAcceptor,
}

impl Greeter {
    pub fn new(tls_config: ServerConfig) -> Self {
        Self {
            acceptor: TlsAcceptor::from(Arc::new(tls_config)),
        }
    }

    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> AppResult<()> {
        info!("Listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };

            let acceptor = self.acceptor.clone();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(stream) => {
                        if let Err(e) = handle_connection(stream, peer).await {
                            warn!("Connection from {} failed: {}", peer, e);
                        }
                    }
                    Err(e) => warn!("TLS handshake with {} failed: {}", peer, e),
                }
            });
        }
        Ok(())
    }
}

async fn handle_connection<IO>(stream: TlsStream<IO>, peer: SocketAddr) -> AppResult<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let (_, conn) = stream.get_ref();
    let server_name = conn.server_name().unwrap_or("unknown").to_owned();
    if let Some(client_leaf) = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .and_then(|leaf| ParsedCertificate::from_der(leaf.as_ref()).ok())
    {
        debug!("Client {} authenticated as {:?}", peer, client_leaf.subject());
    }

    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    (&mut stream)
        .take(MAX_REQUEST_LEN as u64)
        .read_line(&mut line)
        .await?;

    let (greeting, name) = Greeting::parse_request(line.trim_end())
        .ok_or_else(|| IoError::new(ErrorKind::InvalidData, "unknown request"))?;
    let reply = greeting.reply(name, &server_name);
    stream.write_all(reply.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Greeting {
    /// `Hello <name> (<server name>)`
    Hello,
    /// `Hello again <name> (<server name>)`
    HelloAgain,
}

impl Greeting {
    fn verb(self) -> &'static str {
        match self {
            Greeting::Hello => "HELLO",
            Greeting::HelloAgain => "AGAIN",
        }
    }

    pub fn request_line(self, name: &str) -> String {
        format!("{} {}\n", self.verb(), name)
    }

    pub fn parse_request(line: &str) -> Option<(Self, &str)> {
        let (verb, name) = line.split_once(' ').unwrap_or((line, ""));
        let greeting = match verb {
            "HELLO" => Greeting::Hello,
            "AGAIN" => Greeting::HelloAgain,
            _ => return None,
        };
        Some((greeting, name.trim()))
    }

    pub fn reply(self, name: &str, server_name: &str) -> String {
        match self {
            Greeting::Hello => format!("Hello {} ({})", name, server_name),
            Greeting::HelloAgain => format!("Hello again {} ({})", name, server_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_requests() {
        assert_eq!(
            Greeting::parse_request("HELLO world"),
            Some((Greeting::Hello, "world"))
        );
        assert_eq!(
            Greeting::parse_request("AGAIN  world "),
            Some((Greeting::HelloAgain, "world"))
        );
        assert_eq!(Greeting::parse_request("HELLO"), Some((Greeting::Hello, "")));
        assert_eq!(Greeting::parse_request("world"), None);
        assert_eq!(Greeting::parse_request(""), None);
    }

    #[test]
    fn replies() {
        assert_eq!(
            Greeting::Hello.reply("world", "localhost"),
            "Hello world (localhost)"
        );
        assert_eq!(
            Greeting::HelloAgain.reply("world", "localhost"),
            "Hello again world (localhost)"
        );
    }
}

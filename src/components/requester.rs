use crate::{
    components::greeter::Greeting,
    error::{AppResult, ErrorReason},
    types::Target,
};
use chrono::{SecondsFormat, Utc};
use rustls_pki_types::ServerName;
use std::{
    io::{Error as IoError, ErrorKind},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::{sleep, timeout},
};
use tokio_rustls::{rustls::ClientConfig, TlsConnector};
use tokio_util::sync::CancellationToken;

/// Periodically greets a server, one connection per request.
///
/// Every request performs a fresh handshake, so an identity rotated in the
/// credential store is presented from the next request on.
#[derive(Clone)]
pub struct Requester {
    connector: TlsConnector,
    target: Target,
    server_name: ServerName<'static>,
    name: String,
    timeout: Duration,
}

impl Requester {
    pub fn new(
        tls_config: ClientConfig,
        target: Target,
        server_name: Option<String>,
        name: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let server_name = match server_name {
            Some(name) => ServerName::try_from(name).map_err(|_| ErrorReason::InvalidTarget)?,
            None => target.server_name()?,
        };
        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            target,
            server_name,
            name,
            timeout,
        })
    }

    /// Sends one greeting on a fresh connection and returns the reply.
    pub async fn request(&self, greeting: Greeting) -> AppResult<String> {
        let connect = async {
            let stream = TcpStream::connect((self.target.host.as_str(), self.target.port)).await?;
            self.connector
                .connect(self.server_name.clone(), stream)
                .await
                .map_err(ErrorReason::Handshake)
        };
        let stream = timeout(self.timeout, connect)
            .await
            .map_err(|_| ErrorReason::Timeout)??;

        let mut stream = BufReader::new(stream);
        stream
            .write_all(greeting.request_line(&self.name).as_bytes())
            .await?;
        stream.flush().await?;

        let mut reply = String::new();
        let read = timeout(self.timeout, stream.read_line(&mut reply))
            .await
            .map_err(|_| ErrorReason::Timeout)??;
        if read == 0 {
            let eof = IoError::new(ErrorKind::UnexpectedEof, "connection closed without reply");
            return Err(eof.into());
        }
        Ok(reply.trim_end().to_owned())
    }

    /// Sends both greetings every `interval` until cancelled. The first
    /// failed request ends the loop with its error.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) -> AppResult<()> {
        loop {
            for greeting in [Greeting::Hello, Greeting::HelloAgain] {
                let reply = self.request(greeting).await?;
                println!(
                    "{}: {}",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    reply
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        components::greeter::Greeter,
        configs::IdentityPaths,
        credential_store::CredentialStore,
        testing::{Authority, CertDir},
        tls::{client_config, server_config},
        types::TrustPool,
    };
    use tokio::{net::TcpListener, task::JoinHandle};

    async fn store_for(dir: &CertDir) -> Arc<CredentialStore> {
        CredentialStore::load_initial(IdentityPaths {
            cert: dir.cert_path(),
            key: dir.key_path(),
            root: dir.root_path(),
        })
        .await
        .unwrap()
    }

    /// Starts a greeter presenting the identity in `dir` and trusting `roots`.
    async fn start_greeter(
        dir: &CertDir,
        roots: &TrustPool,
        shutdown: &CancellationToken,
    ) -> (u16, JoinHandle<AppResult<()>>) {
        let store = store_for(dir).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let greeter = Greeter::new(server_config(&store, roots).unwrap());
        let shutdown = shutdown.clone();
        let server = tokio::spawn(async move { greeter.serve(listener, shutdown).await });
        (port, server)
    }

    fn requester_for(store: &Arc<CredentialStore>, roots: &TrustPool, port: u16) -> Requester {
        Requester::new(
            client_config(store, roots).unwrap(),
            format!("127.0.0.1:{}", port).parse().unwrap(),
            Some("localhost".to_owned()),
            "world".to_owned(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn greet_over_mutual_tls() {
        let ca = Authority::new("Test Root CA");
        let server_dir = CertDir::new();
        server_dir.write_root(&ca.cert_pem);
        server_dir.write_identity(&ca.issue("localhost"));
        let client_dir = CertDir::new();
        client_dir.write_identity(&ca.issue("localhost"));

        let roots = TrustPool::load(&server_dir.root_path()).await.unwrap();
        let shutdown = CancellationToken::new();
        let (port, server) = start_greeter(&server_dir, &roots, &shutdown).await;
        let client_store = store_for(&client_dir).await;
        let requester = requester_for(&client_store, &roots, port);

        assert_eq!(
            requester.request(Greeting::Hello).await.unwrap(),
            "Hello world (localhost)"
        );
        assert_eq!(
            requester.request(Greeting::HelloAgain).await.unwrap(),
            "Hello again world (localhost)"
        );

        // A rotated client identity is used by the next request.
        client_dir.write_identity(&ca.issue("localhost"));
        client_store.reload().await.unwrap();
        assert_eq!(
            requester.request(Greeting::Hello).await.unwrap(),
            "Hello world (localhost)"
        );
        assert_eq!(client_store.generation(), 2);

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn untrusted_server_fails_request() {
        let ca = Authority::new("Test Root CA");
        let other_ca = Authority::new("Other CA");
        let server_dir = CertDir::new();
        server_dir.write_root(&ca.cert_pem);
        server_dir.write_identity(&other_ca.issue("localhost"));
        let client_dir = CertDir::new();
        client_dir.write_identity(&ca.issue("localhost"));

        let roots = TrustPool::load(&server_dir.root_path()).await.unwrap();
        let shutdown = CancellationToken::new();
        let (port, server) = start_greeter(&server_dir, &roots, &shutdown).await;
        let client_store = store_for(&client_dir).await;
        let requester = requester_for(&client_store, &roots, port);

        let err = requester.request(Greeting::Hello).await.unwrap_err();
        assert!(matches!(err.reason(), ErrorReason::Handshake(_)), "{err:?}");

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn greeter_keeps_serving_after_rejected_client() {
        let ca = Authority::new("Test Root CA");
        let rogue_ca = Authority::new("Rogue CA");
        let server_dir = CertDir::new();
        server_dir.write_root(&ca.cert_pem);
        server_dir.write_identity(&ca.issue("localhost"));
        let rogue_dir = CertDir::new();
        rogue_dir.write_identity(&rogue_ca.issue("localhost"));
        let client_dir = CertDir::new();
        client_dir.write_identity(&ca.issue("localhost"));

        let roots = TrustPool::load(&server_dir.root_path()).await.unwrap();
        let shutdown = CancellationToken::new();
        let (port, server) = start_greeter(&server_dir, &roots, &shutdown).await;

        let rogue = requester_for(&store_for(&rogue_dir).await, &roots, port);
        assert!(rogue.request(Greeting::Hello).await.is_err());

        let client = requester_for(&store_for(&client_dir).await, &roots, port);
        assert_eq!(
            client.request(Greeting::Hello).await.unwrap(),
            "Hello world (localhost)"
        );

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_until_cancelled() {
        let ca = Authority::new("Test Root CA");
        let server_dir = CertDir::new();
        server_dir.write_root(&ca.cert_pem);
        server_dir.write_identity(&ca.issue("localhost"));
        let client_dir = CertDir::new();
        client_dir.write_identity(&ca.issue("localhost"));

        let roots = TrustPool::load(&server_dir.root_path()).await.unwrap();
        let shutdown = CancellationToken::new();
        let (port, server) = start_greeter(&server_dir, &roots, &shutdown).await;
        let requester = requester_for(&store_for(&client_dir).await, &roots, port);

        let client_shutdown = CancellationToken::new();
        let client = tokio::spawn({
            let client_shutdown = client_shutdown.clone();
            async move {
                requester
                    .run(Duration::from_millis(50), client_shutdown)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!client.is_finished());
        client_shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .expect("requester did not stop")
            .unwrap()
            .unwrap();

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_first_failure() {
        let ca = Authority::new("Test Root CA");
        let client_dir = CertDir::new();
        client_dir.write_root(&ca.cert_pem);
        client_dir.write_identity(&ca.issue("localhost"));
        let roots = TrustPool::load(&client_dir.root_path()).await.unwrap();

        // Nothing listens on the port once the listener is dropped.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let requester = requester_for(&store_for(&client_dir).await, &roots, port);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            requester.run(Duration::from_millis(50), CancellationToken::new()),
        )
        .await
        .expect("requester kept running");
        assert!(result.is_err());
    }
}

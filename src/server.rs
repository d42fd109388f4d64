use crate::error::ProxyError;
use crate::resolver::DnsExchange;
use crate::router::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1::Builder as ServerBuilder;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use rustls::ServerConfig;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Plain HTTP and TLS listeners sharing one router.
pub struct DualListener<E> {
    router: Arc<Router<E>>,
    http: TcpListener,
    https: TcpListener,
    acceptor: TlsAcceptor,
}

impl<E: DnsExchange> DualListener<E> {
    /// Binds both sockets up front so either failing aborts startup.
    pub async fn bind(
        router: Arc<Router<E>>,
        http_addr: SocketAddr,
        https_addr: SocketAddr,
        tls_config: ServerConfig,
    ) -> Result<Self, ProxyError> {
        info!("Binding HTTP listener to: {}", http_addr);
        let http = TcpListener::bind(http_addr).await?;
        info!("Binding HTTPS listener to: {}", https_addr);
        let https = TcpListener::bind(https_addr).await?;

        Ok(Self {
            router,
            http,
            https,
            acceptor: TlsAcceptor::from(Arc::new(tls_config)),
        })
    }

    pub fn http_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.http.local_addr()?)
    }

    pub fn https_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.https.local_addr()?)
    }

    /// Runs both accept loops until one of them fails.
    pub async fn run(self) -> Result<(), ProxyError> {
        info!("HTTP server listening on: http://{}", self.http_addr()?);
        info!("HTTPS server listening on: https://{}", self.https_addr()?);

        tokio::try_join!(
            serve_http(self.http, self.router.clone()),
            serve_https(self.https, self.acceptor, self.router),
        )?;
        Ok(())
    }
}

pub async fn serve_http<E: DnsExchange>(
    listener: TcpListener,
    router: Arc<Router<E>>,
) -> Result<(), ProxyError> {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting HTTP connection: {}", e);
                continue;
            }
        };

        let router = router.clone();
        tokio::spawn(async move {
            serve_connection(stream, remote_addr, router).await;
        });
    }
}

pub async fn serve_https<E: DnsExchange>(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Arc<Router<E>>,
) -> Result<(), ProxyError> {
    loop {
        let (tcp_stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting HTTPS connection: {}", e);
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        tokio::spawn(async move {
            match acceptor.accept(tcp_stream).await {
                Ok(tls_stream) => serve_connection(tls_stream, remote_addr, router).await,
                Err(e) => warn!("Error establishing TLS connection from {}: {}", remote_addr, e),
            }
        });
    }
}

async fn serve_connection<S, E>(stream: S, remote_addr: SocketAddr, router: Arc<Router<E>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: DnsExchange,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.handle(req).await) }
    });

    if let Err(e) = ServerBuilder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!("Error serving connection from {}: {}", remote_addr, e);
    }
}

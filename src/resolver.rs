//! Name resolution for outbound connections.
//!
//! Every upstream dial is resolved against one fixed DNS server instead of
//! the system resolver. [`OverrideResolver`] plugs into `hyper_util`'s
//! `HttpConnector`, which keeps its own connect timeout and keep-alive.
//!
//! Only the first answer record is considered:
//! - `A` gives the address to dial
//! - `CNAME` gives a name that is dialed through the system resolver
//! - anything else, or an empty answer, fails that one connection attempt

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use hyper_util::client::legacy::connect::dns::Name as DialName;
use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tower::Service;

/// Large enough for EDNS-sized answers from public resolvers.
const MAX_DNS_RESPONSE_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerRecord {
    A(Ipv4Addr),
    Cname(String),
    Other(RecordType),
}

impl AnswerRecord {
    /// Classifies the first answer; `None` when the answer section is empty.
    pub fn from_response(response: &Message) -> Option<Self> {
        let first = response.answers().first()?;
        let record = match first.data() {
            RData::A(a) => AnswerRecord::A(a.0),
            RData::CNAME(cname) => {
                AnswerRecord::Cname(cname.0.to_utf8().trim_end_matches('.').to_string())
            }
            _ => AnswerRecord::Other(first.record_type()),
        };
        Some(record)
    }
}

/// Dial target produced for one connection attempt. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub target: String,
    pub port: u16,
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.port)
    }
}

impl ResolvedAddress {
    pub fn from_answer(host: &str, port: u16, answer: AnswerRecord) -> Result<Self> {
        match answer {
            AnswerRecord::A(ip) => Ok(Self {
                target: ip.to_string(),
                port,
            }),
            AnswerRecord::Cname(target) => Ok(Self { target, port }),
            AnswerRecord::Other(record_type) => Err(ProxyError::UnsupportedRecord {
                host: host.to_string(),
                record_type: record_type.to_string(),
            }),
        }
    }

    pub async fn socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        if let Ok(ip) = self.target.parse::<Ipv4Addr>() {
            return Ok(vec![SocketAddr::from((ip, self.port))]);
        }
        // CNAME targets are handed to the system resolver, as a plain dial by name would be
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.target.as_str(), self.port))
            .await?
            .collect();
        if addrs.is_empty() {
            return Err(ProxyError::DnsNotFound(self.target.clone()));
        }
        Ok(addrs)
    }
}

/// Builds a recursive A question; `host` and `host.` yield the same name.
pub fn build_query(host: &str) -> Result<Message> {
    let mut name = Name::from_ascii(host)?;
    name.set_fqdn(true);

    let mut message = Message::new();
    message
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::A));
    Ok(message)
}

/// One request/response round trip with a DNS server.
#[async_trait]
pub trait DnsExchange: Send + Sync + 'static {
    async fn exchange(&self, query: &Message) -> Result<Message>;
}

/// Plain UDP exchange with a single server, no retries.
#[derive(Debug, Clone)]
pub struct UdpExchange {
    server: SocketAddr,
    timeout: Duration,
}

impl UdpExchange {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    async fn round_trip(&self, query: &Message) -> Result<Message> {
        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;
        socket.send(&query.to_bytes()?).await?;

        let mut buf = [0u8; MAX_DNS_RESPONSE_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            let response = Message::from_bytes(&buf[..len])?;
            if response.id() == query.id() {
                return Ok(response);
            }
            debug!("Discarding DNS response with unexpected id {}", response.id());
        }
    }
}

#[async_trait]
impl DnsExchange for UdpExchange {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let name = query
            .queries()
            .first()
            .map(|q| q.name().to_string())
            .unwrap_or_default();
        timeout(self.timeout, self.round_trip(query))
            .await
            .map_err(|_| ProxyError::DnsTimeout(name))?
    }
}

/// Resolver handed to the HTTP connector in place of the system one.
pub struct OverrideResolver<E> {
    exchange: Arc<E>,
}

impl<E> Clone for OverrideResolver<E> {
    fn clone(&self) -> Self {
        Self {
            exchange: self.exchange.clone(),
        }
    }
}

impl OverrideResolver<UdpExchange> {
    pub fn udp(server: SocketAddr, timeout: Duration) -> Self {
        Self::new(UdpExchange::new(server, timeout))
    }
}

impl<E: DnsExchange> OverrideResolver<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange: Arc::new(exchange),
        }
    }

    pub async fn lookup(&self, host: &str) -> Result<AnswerRecord> {
        info!("Resolving {}", host);
        let query = build_query(host)?;
        let response = self.exchange.exchange(&query).await.inspect_err(|e| {
            warn!("{} not found: {}", host, e);
        })?;

        match AnswerRecord::from_response(&response) {
            Some(answer) => Ok(answer),
            None => {
                warn!("No results for {}", host);
                Err(ProxyError::DnsNotFound(host.to_string()))
            }
        }
    }

    pub async fn resolve(&self, host: &str, port: u16) -> Result<ResolvedAddress> {
        let answer = self.lookup(host).await?;
        let resolved = ResolvedAddress::from_answer(host, port, answer).inspect_err(|e| {
            warn!("Cannot dial {}: {}", host, e);
        })?;
        info!("Resolved {} to {}", host, resolved);
        Ok(resolved)
    }
}

// The connector overwrites the port of every returned address with the one
// from the request URI, so 0 is used here.
impl<E: DnsExchange> Service<DialName> for OverrideResolver<E> {
    type Response = std::vec::IntoIter<SocketAddr>;
    type Error = ProxyError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, name: DialName) -> Self::Future {
        let resolver = self.clone();
        Box::pin(async move {
            let resolved = resolver.resolve(name.as_str(), 0).await?;
            let addrs = resolved.socket_addrs().await?;
            Ok(addrs.into_iter())
        })
    }
}

//! UDP exchange tests against a fake DNS server on loopback

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{Name, RData, Record};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use hostgate::error::ProxyError;
use hostgate::resolver::{build_query, AnswerRecord, DnsExchange, OverrideResolver, UdpExchange};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Clone)]
enum Reply {
    A(Ipv4Addr),
    Cname(&'static str),
    Empty,
    /// A response with a wrong id first, then the real one
    StaleThenA(Ipv4Addr),
    Silent,
}

fn answer(query: &Message, records: Vec<RData>, id: u16) -> Vec<u8> {
    let name = query.queries()[0].name().clone();
    let mut response = Message::new();
    response
        .set_id(id)
        .set_message_type(MessageType::Response)
        .add_query(query.queries()[0].clone());
    for rdata in records {
        response.add_answer(Record::from_rdata(name.clone(), 300, rdata));
    }
    response.to_bytes().unwrap()
}

/// Serves `reply` for every query and counts the queries received.
async fn spawn_dns(reply: Reply) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let query = Message::from_bytes(&buf[..len]).unwrap();
            let id = query.id();

            let packets = match &reply {
                Reply::A(ip) => vec![answer(&query, vec![RData::A(A(*ip))], id)],
                Reply::Cname(target) => vec![answer(
                    &query,
                    vec![RData::CNAME(CNAME(Name::from_str(target).unwrap()))],
                    id,
                )],
                Reply::Empty => vec![answer(&query, vec![], id)],
                Reply::StaleThenA(ip) => vec![
                    answer(&query, vec![RData::A(A(Ipv4Addr::new(192, 0, 2, 1)))], id.wrapping_add(1)),
                    answer(&query, vec![RData::A(A(*ip))], id),
                ],
                Reply::Silent => vec![],
            };
            for packet in packets {
                socket.send_to(&packet, peer).await.unwrap();
            }
        }
    });

    (addr, received)
}

#[tokio::test]
async fn test_udp_exchange_a_record() {
    let (server, received) = spawn_dns(Reply::A(Ipv4Addr::new(10, 1, 2, 3))).await;
    let exchange = UdpExchange::new(server, Duration::from_secs(2));

    let query = build_query("example.com").unwrap();
    let response = exchange.exchange(&query).await.unwrap();

    assert_eq!(response.id(), query.id());
    assert_eq!(
        AnswerRecord::from_response(&response),
        Some(AnswerRecord::A(Ipv4Addr::new(10, 1, 2, 3)))
    );
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_udp_exchange_ignores_mismatched_id() {
    let (server, _) = spawn_dns(Reply::StaleThenA(Ipv4Addr::new(10, 9, 9, 9))).await;
    let resolver = OverrideResolver::udp(server, Duration::from_secs(2));

    let resolved = resolver.resolve("example.com", 443).await.unwrap();
    assert_eq!(resolved.to_string(), "10.9.9.9:443");
}

#[tokio::test]
async fn test_udp_cname_answer() {
    let (server, _) = spawn_dns(Reply::Cname("edge.example.net.")).await;
    let resolver = OverrideResolver::udp(server, Duration::from_secs(2));

    let answer = resolver.lookup("www.example.com.").await.unwrap();
    assert_eq!(answer, AnswerRecord::Cname("edge.example.net".to_string()));
}

#[tokio::test]
async fn test_udp_empty_answer_is_not_found() {
    let (server, _) = spawn_dns(Reply::Empty).await;
    let resolver = OverrideResolver::udp(server, Duration::from_secs(2));

    let err = resolver.resolve("missing.example", 80).await.unwrap_err();
    assert!(matches!(err, ProxyError::DnsNotFound(_)));
    assert_eq!(err.to_string(), "Not found: missing.example");
}

#[tokio::test]
async fn test_udp_silent_server_times_out() {
    let (server, received) = spawn_dns(Reply::Silent).await;
    let resolver = OverrideResolver::udp(server, Duration::from_millis(200));

    let err = resolver.resolve("slow.example", 80).await.unwrap_err();
    assert!(matches!(err, ProxyError::DnsTimeout(_)));
    // One attempt, no retries
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_every_lookup_queries_the_server() {
    let (server, received) = spawn_dns(Reply::A(Ipv4Addr::LOCALHOST)).await;
    let resolver = OverrideResolver::udp(server, Duration::from_secs(2));

    for _ in 0..3 {
        resolver.resolve("repeat.example", 80).await.unwrap();
    }
    assert_eq!(received.load(Ordering::SeqCst), 3);
}

//! Log output of name resolution at the default level
//!
//! Kept in its own test binary since the logger is process-global.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use hostgate::error::Result;
use hostgate::resolver::{DnsExchange, OverrideResolver};
use log::{Level, LevelFilter, Log, Metadata, Record as LogRecord};
use std::net::Ipv4Addr;
use std::sync::Mutex;

struct CaptureLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &LogRecord) {
        if self.enabled(record.metadata()) {
            self.lines
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

struct LoopbackExchange;

#[async_trait]
impl DnsExchange for LoopbackExchange {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let name = query.queries()[0].name().clone();
        let mut response = Message::new();
        response.set_id(query.id()).set_message_type(MessageType::Response);
        response.add_answer(Record::from_rdata(name, 60, RData::A(A(Ipv4Addr::LOCALHOST))));
        Ok(response)
    }
}

struct EmptyExchange;

#[async_trait]
impl DnsExchange for EmptyExchange {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let mut response = Message::new();
        response.set_id(query.id()).set_message_type(MessageType::Response);
        Ok(response)
    }
}

#[tokio::test]
async fn test_every_resolution_attempt_logged_at_info() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    OverrideResolver::new(LoopbackExchange)
        .resolve("found.example", 80)
        .await
        .unwrap();
    OverrideResolver::new(EmptyExchange)
        .resolve("missing.example", 80)
        .await
        .unwrap_err();

    let lines = LOGGER.lines.lock().unwrap().clone();
    let has = |level: Level, text: &str| lines.iter().any(|(l, m)| *l == level && m.contains(text));

    assert!(has(Level::Info, "Resolving found.example"), "{:?}", lines);
    assert!(has(Level::Info, "Resolved found.example to 127.0.0.1:80"), "{:?}", lines);
    assert!(has(Level::Info, "Resolving missing.example"), "{:?}", lines);
    assert!(has(Level::Warn, "No results for missing.example"), "{:?}", lines);
}

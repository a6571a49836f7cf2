/* src/nameserver.rs */

//! The authoritative name server as seen by the core: a sink for committed
//! record changes and a source of records and liveness.

use crate::error::NameServerError;
use crate::records::{Record, RecordType};
use async_trait::async_trait;
use fancy_log::{LogLevel, log};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode, UpdateMessage};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record as DnsRecord, RecordType as DnsRecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use parking_lot::Mutex;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    Add,
    Delete,
}

impl fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorAction::Add => f.write_str("add"),
            MirrorAction::Delete => f.write_str("delete"),
        }
    }
}

#[async_trait]
pub trait NameServer: Send + Sync {
    /// Applies one committed change to the server.
    async fn apply(&self, record: &Record, action: MirrorAction) -> Result<(), NameServerError>;

    /// Reachability check. Returns a short human-readable detail on success.
    async fn probe(&self) -> Result<String, NameServerError>;

    /// Full set of records the store is rebuilt from at startup.
    async fn fetch_records(&self) -> Result<Vec<Record>, NameServerError>;
}

/// Mirrors changes as RFC 2136 dynamic updates over UDP.
pub struct DnsUpdateClient {
    server: SocketAddr,
    origin: String,
    timeout: Duration,
    seed: Vec<Record>,
}

impl DnsUpdateClient {
    /// `seed` is what `fetch_records` hands back; zone transfers are not
    /// performed.
    pub fn new(server: SocketAddr, origin: &str, timeout: Duration, seed: Vec<Record>) -> Self {
        Self {
            server,
            origin: origin.to_string(),
            timeout,
            seed,
        }
    }

    fn zone_query(&self, query_type: DnsRecordType) -> Result<Query, NameServerError> {
        let mut query = Query::new();
        query
            .set_name(Name::from_str(&self.origin)?)
            .set_query_class(DNSClass::IN)
            .set_query_type(query_type);
        Ok(query)
    }

    fn update_message(&self, update: DnsRecord) -> Result<Message, NameServerError> {
        let mut message = Message::new();
        message
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update)
            .set_recursion_desired(false);
        message.add_zone(self.zone_query(DnsRecordType::SOA)?);
        message.add_update(update);
        Ok(message)
    }

    /// Sends one message and waits for the reply carrying the same id.
    async fn exchange(&self, request: &Message) -> Result<Message, NameServerError> {
        timeout(self.timeout, self.send_and_receive(request))
            .await
            .map_err(|_| NameServerError::Timeout(self.timeout))?
    }

    async fn send_and_receive(&self, request: &Message) -> Result<Message, NameServerError> {
        let bytes = request.to_bytes()?;
        let bind_addr = if self.server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;
        socket.send(&bytes).await?;

        let mut buf = [0u8; 4096];
        loop {
            let len = socket.recv(&mut buf).await?;
            let response = match Message::from_bytes(&buf[..len]) {
                Ok(response) => response,
                Err(e) => {
                    log(
                        LogLevel::Debug,
                        &format!("Ignoring unparsable reply from {}: {}", self.server, e),
                    );
                    continue;
                }
            };
            if response.id() == request.id() {
                return Ok(response);
            }
        }
    }
}

#[async_trait]
impl NameServer for DnsUpdateClient {
    async fn apply(&self, record: &Record, action: MirrorAction) -> Result<(), NameServerError> {
        let mut update = DnsRecord::from_rdata(
            Name::from_str(record.fqdn())?,
            record.ttl(),
            to_rdata(record)?,
        );
        if action == MirrorAction::Delete {
            // Class NONE with TTL 0 deletes exactly this RR.
            update.set_dns_class(DNSClass::NONE);
            update.set_ttl(0);
        }

        let response = self.exchange(&self.update_message(update)?).await?;
        match response.response_code() {
            ResponseCode::NoError => Ok(()),
            code => Err(NameServerError::Rejected(format!(
                "{} {}: {}",
                action, record, code
            ))),
        }
    }

    async fn probe(&self) -> Result<String, NameServerError> {
        let mut message = Message::new();
        message
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(false);
        message.add_query(self.zone_query(DnsRecordType::SOA)?);

        let response = self.exchange(&message).await?;
        if response.response_code() != ResponseCode::NoError {
            return Err(NameServerError::Rejected(format!(
                "SOA {}: {}",
                self.origin,
                response.response_code()
            )));
        }

        let serial = response.answers().iter().find_map(|answer| match answer.data() {
            RData::SOA(soa) => Some(soa.serial()),
            _ => None,
        });
        Ok(match serial {
            Some(serial) => format!("{} answered SOA serial {}", self.server, serial),
            None => format!("{} answered without SOA", self.server),
        })
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, NameServerError> {
        Ok(self.seed.clone())
    }
}

fn to_rdata(record: &Record) -> Result<RData, NameServerError> {
    let malformed = || NameServerError::Protocol(format!("cannot encode {}", record));
    match record.record_type() {
        RecordType::A => record
            .data()
            .parse::<Ipv4Addr>()
            .map(|ip| RData::A(A::from(ip)))
            .map_err(|_| malformed()),
        RecordType::AAAA => record
            .data()
            .parse::<Ipv6Addr>()
            .map(|ip| RData::AAAA(AAAA::from(ip)))
            .map_err(|_| malformed()),
        RecordType::CNAME => Ok(RData::CNAME(CNAME(Name::from_str(record.data())?))),
        RecordType::TXT => Ok(RData::TXT(TXT::new(vec![record.data().to_string()]))),
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    applied: Vec<(MirrorAction, Record)>,
    reject_applies: bool,
    unreachable: bool,
    delay: Duration,
}

/// In-process name server used for `mode = "memory"` and in tests.
#[derive(Debug, Default)]
pub struct MemoryNameServer {
    state: Mutex<MemoryState>,
}

impl MemoryNameServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records,
                ..Default::default()
            }),
        }
    }

    /// Records currently held, in application order.
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().records.clone()
    }

    /// Every change applied so far, in order.
    pub fn applied(&self) -> Vec<(MirrorAction, Record)> {
        self.state.lock().applied.clone()
    }

    pub fn set_reject_applies(&self, reject: bool) {
        self.state.lock().reject_applies = reject;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Latency added to every apply and probe.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    async fn wait(&self) {
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl NameServer for MemoryNameServer {
    async fn apply(&self, record: &Record, action: MirrorAction) -> Result<(), NameServerError> {
        self.wait().await;
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(NameServerError::Unavailable("memory server is down".to_string()));
        }
        if state.reject_applies {
            return Err(NameServerError::Rejected(format!("{} {}", action, record)));
        }
        match action {
            MirrorAction::Add => {
                if !state.records.iter().any(|r| r.hash() == record.hash()) {
                    state.records.push(record.clone());
                }
            }
            MirrorAction::Delete => state.records.retain(|r| r.hash() != record.hash()),
        }
        state.applied.push((action, record.clone()));
        Ok(())
    }

    async fn probe(&self) -> Result<String, NameServerError> {
        self.wait().await;
        let state = self.state.lock();
        if state.unreachable {
            return Err(NameServerError::Unavailable("memory server is down".to_string()));
        }
        Ok(format!("memory server holds {} records", state.records.len()))
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, NameServerError> {
        Ok(self.records())
    }
}

//! Fixtures for melsrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use melsrv::protocols::melsec::{DataBlock, DataCode, DataField, Datatype};
use melsrv::records::RecordSettings;
use melsrv::runtime::{Connector, PollerSettings, PollerStatus, ReconnectPolicy};

/// Batch-read request sizes
const BINARY_REQUEST_LEN: usize = 21;
const ASCII_REQUEST_LEN: usize = 42;

/// In-memory PLC answering batch reads with fixed word values
///
/// Refuses the first `failures` connects. The first accepted connection is
/// closed after `drop_first_after` responses when set; later ones stay up.
#[derive(Clone)]
pub struct FakePlc {
    code: DataCode,
    failures: u32,
    drop_first_after: Option<usize>,
    words: Vec<u16>,
    attempts: Arc<AtomicU32>,
    accepted: Arc<AtomicU32>,
}

impl FakePlc {
    pub fn new(words: Vec<u16>) -> Self {
        Self {
            code: DataCode::Binary,
            failures: 0,
            drop_first_after: None,
            words,
            attempts: Arc::new(AtomicU32::new(0)),
            accepted: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn ascii(mut self) -> Self {
        self.code = DataCode::Ascii;
        self
    }

    pub fn refusing(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn dropping_first_after(mut self, responses: usize) -> Self {
        self.drop_first_after = Some(responses);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakePlc {
    type Stream = DuplexStream;

    async fn connect(&self) -> io::Result<DuplexStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("fake refusal {}", attempt),
            ));
        }

        let accepted = self.accepted.fetch_add(1, Ordering::SeqCst);
        let limit = if accepted == 0 { self.drop_first_after } else { None };
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, self.code, self.words.clone(), limit));
        Ok(client)
    }

    fn endpoint(&self) -> String {
        "fake-plc".to_string()
    }
}

async fn serve(
    mut stream: DuplexStream,
    code: DataCode,
    words: Vec<u16>,
    limit: Option<usize>,
) {
    let request_len = match code {
        DataCode::Ascii => ASCII_REQUEST_LEN,
        DataCode::Binary => BINARY_REQUEST_LEN,
    };
    let mut served = 0usize;
    let mut request = vec![0u8; request_len];
    while stream.read_exact(&mut request).await.is_ok() {
        let response = match code {
            DataCode::Ascii => ascii_response(&request, &words),
            DataCode::Binary => binary_response(&request, &words),
        };
        if stream.write_all(&response).await.is_err() {
            break;
        }

        served += 1;
        if limit.is_some_and(|n| served >= n) {
            break;
        }
    }
}

fn binary_response(request: &[u8], words: &[u16]) -> Vec<u8> {
    let count = u16::from_le_bytes([request[19], request[20]]) as usize;
    let data: Vec<u8> = (0..count)
        .flat_map(|i| words.get(i).copied().unwrap_or(0).to_le_bytes())
        .collect();

    let mut response = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00];
    response.extend_from_slice(&((data.len() + 2) as u16).to_le_bytes());
    response.extend_from_slice(&[0x00, 0x00]);
    response.extend_from_slice(&data);
    response
}

/// Words travel as four hex digits each, most significant first
fn ascii_response(request: &[u8], words: &[u16]) -> Vec<u8> {
    let count_hex = std::str::from_utf8(&request[38..42]).unwrap();
    let count = usize::from_str_radix(count_hex, 16).unwrap();
    let data: String = (0..count)
        .map(|i| format!("{:04X}", words.get(i).copied().unwrap_or(0)))
        .collect();

    format!("D00000FF03FF00{:04X}0000{}", data.len() + 4, data).into_bytes()
}

/// Two words: COUNT at D0, RUN as bit 0 of D1
pub fn counter_block() -> DataBlock {
    DataBlock {
        baseaddress: "0x0".to_string(),
        register: "D*".to_string(),
        wordlength: 2,
        datafields: vec![
            DataField {
                name: "COUNT".to_string(),
                address: "0x0".to_string(),
                datatype: Datatype::Word,
                units: None,
                bit: None,
                charpos: None,
                charlength: None,
            },
            DataField {
                name: "RUN".to_string(),
                address: "0x1".to_string(),
                datatype: Datatype::Bit,
                units: None,
                bit: Some(0),
                charpos: None,
                charlength: None,
            },
        ],
    }
}

pub fn settings(poll_interval: Duration, aggregation: Duration) -> PollerSettings {
    PollerSettings {
        source: "press01".to_string(),
        poll_interval,
        aggregation,
        data_code: DataCode::Binary,
        read_timeout: Duration::from_millis(500),
        reconnect: ReconnectPolicy::fixed(Duration::from_millis(10)),
        blocks: vec![counter_block()],
        records: RecordSettings {
            running_field: Some("RUN".to_string()),
            counter_field: Some("COUNT".to_string()),
            ..Default::default()
        },
    }
}

/// Wait until `done` holds for the published status
pub async fn wait_for_status<F>(
    rx: &mut watch::Receiver<PollerStatus>,
    within: Duration,
    done: F,
) -> PollerStatus
where
    F: FnMut(&PollerStatus) -> bool,
{
    let status = tokio::time::timeout(within, rx.wait_for(done))
        .await
        .expect("timed out waiting for poller status")
        .expect("poller status channel closed");
    status.clone()
}

pub fn output_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.to_string_lossy().ends_with(".sm.json"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

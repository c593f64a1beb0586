//! Scripted fake modem for tests.
//!
//! [`FakeModem`] plays a modem on the far end of a [`tokio::io::duplex`]
//! pipe. Steps run in order: an expectation reads exactly the request bytes,
//! asserts them and writes the canned response; a push writes bytes without
//! waiting for a request. Once the script is done the modem keeps reading so
//! the host's writes never fail, and returns whatever it read after the
//! script ended.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::bridge::{Bridge, BridgeOptions};

#[derive(Debug)]
enum Step {
    Expect { request: Vec<u8>, response: Vec<u8> },
    Push(Vec<u8>),
}

#[derive(Debug, Default)]
pub(crate) struct FakeModem {
    script: Vec<Step>,
}

impl FakeModem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Expect `request` from the host and answer with `response`.
    pub(crate) fn expect(mut self, request: &[u8], response: &[u8]) -> Self {
        self.script.push(Step::Expect {
            request: request.to_vec(),
            response: response.to_vec(),
        });
        self
    }

    /// Expect `request` and echo it back with an ACK.
    pub(crate) fn ack(self, request: &[u8]) -> Self {
        let mut response = request.to_vec();
        response.push(0x06);
        self.expect(request, &response)
    }

    /// Expect `request` and echo it back with a NAK.
    pub(crate) fn nak(self, request: &[u8]) -> Self {
        let mut response = request.to_vec();
        response.push(0x15);
        self.expect(request, &response)
    }

    /// Write `bytes` without waiting for a request.
    pub(crate) fn push(mut self, bytes: &[u8]) -> Self {
        self.script.push(Step::Push(bytes.to_vec()));
        self
    }

    /// Starts the modem, returning the host end of the pipe.
    pub(crate) fn spawn(self) -> (DuplexStream, JoinHandle<Vec<u8>>) {
        let (host, mut modem) = tokio::io::duplex(1024);

        let task = tokio::spawn(async move {
            for step in self.script {
                match step {
                    Step::Expect { request, response } => {
                        let mut got = vec![0u8; request.len()];
                        modem.read_exact(&mut got).await.unwrap();
                        assert_eq!(
                            hex::encode(&got),
                            hex::encode(&request),
                            "unexpected request"
                        );
                        modem.write_all(&response).await.unwrap();
                    }
                    Step::Push(bytes) => modem.write_all(&bytes).await.unwrap(),
                }
            }

            let mut trailing = Vec::new();
            let mut buf = [0u8; 64];
            loop {
                match modem.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => trailing.extend_from_slice(&buf[..n]),
                }
            }
            trailing
        });

        (host, task)
    }

    /// Starts the modem and opens a bridge over it.
    pub(crate) fn bridge(self) -> (Bridge, JoinHandle<Vec<u8>>) {
        self.bridge_with(BridgeOptions::default())
    }

    pub(crate) fn bridge_with(self, options: BridgeOptions) -> (Bridge, JoinHandle<Vec<u8>>) {
        let (stream, task) = self.spawn();
        (Bridge::from_stream(stream, options), task)
    }
}

/// Builds a standard-length received message frame.
pub(crate) fn received(from: [u8; 3], to: [u8; 3], flags: u8, cmd1: u8, cmd2: u8) -> Vec<u8> {
    let mut frame = vec![0x02, 0x50];
    frame.extend_from_slice(&from);
    frame.extend_from_slice(&to);
    frame.extend_from_slice(&[flags, cmd1, cmd2]);
    frame
}

/// Builds an extended received message frame.
pub(crate) fn received_extended(
    from: [u8; 3],
    to: [u8; 3],
    flags: u8,
    cmd1: u8,
    cmd2: u8,
    userdata: &[u8; 14],
) -> Vec<u8> {
    let mut frame = received(from, to, flags, cmd1, cmd2);
    frame[1] = 0x51;
    frame.extend_from_slice(userdata);
    frame
}

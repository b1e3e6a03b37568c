//! Minimal protocol client driving the agent over a socket pair.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use mgmtwire_protocol::{
    BodyReader, ErrorCode, FrameEncoder, FrameFlags, FrameHeader, MessageKind, ProtocolVersion,
    StreamId,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A response frame as the client sees it.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub version: u8,
    pub flags: FrameFlags,
    pub stream_id: StreamId,
    pub kind: MessageKind,
    pub body: Vec<u8>,
}

impl ClientResponse {
    fn reader(&self) -> BodyReader<'_> {
        let mut reader = BodyReader::new(self.kind, &self.body);
        if self.flags.contains(FrameFlags::WARNING) {
            reader.string_list().expect("warnings list");
        }
        reader
    }

    /// Warnings carried ahead of the body.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        if !self.flags.contains(FrameFlags::WARNING) {
            return Vec::new();
        }
        BodyReader::new(self.kind, &self.body)
            .string_list()
            .expect("warnings list")
    }

    /// Code and message of an `ERROR` response.
    #[must_use]
    pub fn error(&self) -> Option<(ErrorCode, String)> {
        if self.kind != MessageKind::Error {
            return None;
        }
        let mut reader = self.reader();
        let code = reader.int().expect("error code");
        let message = reader.string().expect("error message");
        Some((ErrorCode::from_code(code).expect("known error code"), message))
    }

    /// Raw payload after any warnings.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        self.reader().rest().to_vec()
    }
}

/// Client end of a connection served by the agent.
#[derive(Debug)]
pub struct TestClient {
    stream: UnixStream,
    version: ProtocolVersion,
}

impl TestClient {
    #[must_use]
    pub fn new(stream: UnixStream, version: ProtocolVersion) -> Self {
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set client read timeout");
        Self { stream, version }
    }

    /// Sends one request frame.
    pub fn send(&mut self, stream: i16, kind: MessageKind, body: &[u8]) {
        self.send_flagged(stream, kind, FrameFlags::empty(), body);
    }

    /// Sends one request frame with explicit flags.
    pub fn send_flagged(&mut self, stream: i16, kind: MessageKind, flags: FrameFlags, body: &[u8]) {
        let header = FrameHeader {
            version: self.version,
            flags,
            stream_id: StreamId::new(stream),
            kind,
        };
        FrameEncoder::requests()
            .write_frame(&mut self.stream, &header, body)
            .expect("write request frame");
    }

    /// Writes raw bytes, bypassing the encoder.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("write raw bytes");
    }

    /// Reads one response frame.
    #[must_use]
    pub fn receive(&mut self) -> ClientResponse {
        let mut byte = [0_u8; 1];
        self.stream.read_exact(&mut byte).expect("response version");
        let [raw_version] = byte;
        assert_ne!(raw_version & 0x80, 0, "response direction bit missing");
        let version = raw_version & 0x7f;

        self.stream.read_exact(&mut byte).expect("response flags");
        let [flags] = byte;

        let stream_id = if version >= 3 {
            let mut wide = [0_u8; 2];
            self.stream.read_exact(&mut wide).expect("response stream");
            i16::from_be_bytes(wide)
        } else {
            self.stream.read_exact(&mut byte).expect("response stream");
            i16::from(i8::from_be_bytes(byte))
        };

        self.stream.read_exact(&mut byte).expect("response opcode");
        let [opcode] = byte;
        let kind = MessageKind::from_opcode(opcode).expect("known response opcode");

        let mut length = [0_u8; 4];
        self.stream.read_exact(&mut length).expect("response length");
        let length = usize::try_from(u32::from_be_bytes(length)).expect("length fits usize");
        let mut body = vec![0_u8; length];
        self.stream.read_exact(&mut body).expect("response body");

        ClientResponse {
            version,
            flags: FrameFlags::from_bits(flags),
            stream_id: StreamId::new(stream_id),
            kind,
            body,
        }
    }

    /// Reads `count` responses, in arrival order.
    #[must_use]
    pub fn receive_many(&mut self, count: usize) -> Vec<ClientResponse> {
        (0..count).map(|_| self.receive()).collect()
    }

    /// Closes the client's writing half so the agent sees end of stream.
    pub fn finish(&self) {
        self.stream
            .shutdown(std::net::Shutdown::Write)
            .expect("shut down client writes");
    }

    /// Whether the agent has closed its side.
    #[must_use]
    pub fn at_end_of_stream(&mut self) -> bool {
        let mut byte = [0_u8; 1];
        matches!(self.stream.read(&mut byte), Ok(0))
    }
}

//! In-process AgentX master used by the session tests.
//!
//! The mock speaks the real wire format through the public codec, so
//! every exchange in these tests exercises encode and decode from the
//! outside.

#![allow(dead_code)]

use std::net::SocketAddr;

use async_agentx::pdu::{HEADER_LEN, Header, Pdu, PduPayload, ResponseError, ResponsePdu};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockMaster {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockMaster {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        Self { listener, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn accept(&self) -> MasterConn {
        let (stream, _) = self.listener.accept().await.expect("accept");
        MasterConn { stream }
    }
}

pub struct MasterConn {
    stream: TcpStream,
}

impl MasterConn {
    pub async fn read_pdu(&mut self) -> Pdu {
        let mut raw = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut raw).await.expect("read header");
        let header = Header::decode(&raw).expect("valid header");

        let mut frame = raw.to_vec();
        frame.resize(HEADER_LEN + header.payload_length as usize, 0);
        self.stream
            .read_exact(&mut frame[HEADER_LEN..])
            .await
            .expect("read payload");

        Pdu::decode(&frame).expect("valid pdu")
    }

    pub async fn write_pdu(&mut self, pdu: &Pdu) {
        self.stream.write_all(&pdu.encode()).await.expect("write");
    }

    /// Acknowledge a request with a success Response carrying `session_id`.
    pub async fn respond_ok(&mut self, request: &Pdu, session_id: u32) {
        let response = Pdu::new(
            session_id,
            request.transaction_id,
            request.packet_id,
            request.byte_order,
            PduPayload::Response(ResponsePdu::success(0, Vec::new())),
        );
        self.write_pdu(&response).await;
    }

    /// Reject a request with an error Response.
    pub async fn respond_err(&mut self, request: &Pdu, session_id: u32, code: ResponseError) {
        let response = Pdu::new(
            session_id,
            request.transaction_id,
            request.packet_id,
            request.byte_order,
            PduPayload::Response(ResponsePdu::error(0, code, 0)),
        );
        self.write_pdu(&response).await;
    }

    /// Serve the subagent's Open and the expected number of Register PDUs,
    /// accepting all of them. Returns the Register PDUs seen.
    pub async fn handshake(&mut self, session_id: u32, expected_registers: usize) -> Vec<Pdu> {
        let open = self.read_pdu().await;
        assert!(
            matches!(open.payload, PduPayload::Open(_)),
            "expected Open, got {:?}",
            open.payload
        );
        assert_eq!(open.session_id, 0, "Open must carry session id 0");
        self.respond_ok(&open, session_id).await;

        let mut registers = Vec::new();
        for _ in 0..expected_registers {
            let register = self.read_pdu().await;
            assert!(
                matches!(register.payload, PduPayload::Register(_)),
                "expected Register, got {:?}",
                register.payload
            );
            assert_eq!(register.session_id, session_id);
            self.respond_ok(&register, session_id).await;
            registers.push(register);
        }
        registers
    }
}

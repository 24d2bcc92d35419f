#![expect(clippy::unwrap_used, reason = "test assertions")]
#![expect(missing_docs, reason = "test file")]

//! Shared scaffolding for the binary-transport integration tests: a tiny
//! length-prefixed frame reader/writer matching the wire format, and a
//! `CoreConInfo` builder with sane defaults callers only need to tweak.

use mcd_client::codec::FixedString;
use mcd_client::codec::request::Opcode;
use mcd_client::codec::value::CoreConInfo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0_u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0_u8; len];
    stream.read_exact(&mut body).await.unwrap();
    body
}

pub async fn read_opcode(stream: &mut TcpStream, expected: Opcode) -> Vec<u8> {
    let frame = read_frame(stream).await;
    assert_eq!(frame[0], expected as u8);
    frame
}

pub async fn write_reply(stream: &mut TcpStream, body: &[u8]) {
    let len = u32::try_from(body.len()).unwrap();
    stream.write_all(&len.to_le_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();
}

pub fn sample_core_con_info() -> CoreConInfo {
    CoreConInfo {
        host: FixedString::from_str_lossy("localhost"),
        server_port: 1235,
        server_key: FixedString::empty(),
        system_key: FixedString::empty(),
        device_key: FixedString::empty(),
        system: FixedString::from_str_lossy("sim"),
        system_instance: FixedString::empty(),
        acc_hw: FixedString::empty(),
        device_type: 0,
        device: FixedString::from_str_lossy("core0"),
        device_id: 0,
        core: FixedString::from_str_lossy("core0"),
        core_type: 0,
        core_id: 0,
    }
}

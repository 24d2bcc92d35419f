#![expect(clippy::unwrap_used, reason = "test assertions")]
#![expect(missing_docs, reason = "test file")]

//! A server that declares a reply length past the frame cap must be
//! rejected immediately, without the client reading past the length
//! prefix or hanging waiting for a body that was never coming.

mod common;

use common::read_opcode;
use mcd_client::McdError;
use mcd_client::codec::request::Opcode;
use mcd_client::facade::ServerHandle;
use mcd_client::transport::TransportError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[tokio::test]
async fn oversize_reply_length_prefix_is_rejected_without_reading_a_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_opcode(&mut stream, Opcode::OpenServer).await;
        // Declares a body far past MAX_FRAME_LEN and never sends one.
        stream.write_all(&70_000_u32.to_le_bytes()).await.unwrap();
    });

    let config = format!("{}:{}", addr.ip(), addr.port());
    let err = ServerHandle::open_server(&config, "").await.unwrap_err();
    assert!(matches!(
        err,
        McdError::Transport(TransportError::ReplyTooLarge { declared: 70_000, .. })
    ));

    server.await.unwrap();
}

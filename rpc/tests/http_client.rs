//! `HttpNodeClient` against a canned HTTP server on a local socket.
//!
//! Each test server accepts one connection, records the request and writes
//! a fixed response, so transport mapping is exercised without a node.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use multinode_rpc::{HttpNodeClient, NodeRpc, RpcError};
use multinode_types::{BlockHash, NodeEndpoint, TxId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn http_response(status: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve one connection with `response`; the handle yields the raw request.
async fn serve_once(response: Vec<u8>) -> (NodeEndpoint, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    let endpoint = NodeEndpoint::new("127.0.0.1", port)
        .with_credentials("rpcuser", "rpcpass")
        .with_timeout(Duration::from_secs(5));
    (endpoint, handle)
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blockchain_info_is_parsed() {
    let body = br#"{"result":{"chain":"main","blocks":700000,"headers":700001,
        "bestblockhash":"0000000000000000000b1f2e4a7c8d9e0f1a2b3c4d5e6f708192a3b4c5d6e7f8",
        "chainwork":"00000000000000000000000000000000000000001f0000000000000000000000"},
        "error":null,"id":1}"#;
    let (endpoint, server) = serve_once(http_response("200 OK", body)).await;
    let client = HttpNodeClient::new(endpoint).unwrap();

    let info = client.get_blockchain_info().await.unwrap();
    assert_eq!(info.blocks, 700_000);
    assert_eq!(info.headers, 700_001);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST / "));
    assert!(request.contains(r#""method":"getblockchaininfo""#));
    assert!(request.contains(r#""params":[]"#));
    assert!(request.to_ascii_lowercase().contains("authorization: basic"));
}

#[tokio::test]
async fn unknown_transaction_maps_to_not_found() {
    let body = br#"{"result":null,"error":{"code":-5,"message":"No such mempool or blockchain transaction"},"id":1}"#;
    let (endpoint, server) = serve_once(http_response("500 Internal Server Error", body)).await;
    let client = HttpNodeClient::new(endpoint).unwrap();

    let err = client.get_raw_transaction(&TxId::new([0xab; 32])).await.unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));

    let request = server.await.unwrap();
    assert!(request.contains(r#""method":"getrawtransaction""#));
}

#[tokio::test]
async fn raw_transaction_hex_is_decoded() {
    let body = br#"{"result":"0100beef","error":null,"id":1}"#;
    let (endpoint, _server) = serve_once(http_response("200 OK", body)).await;
    let client = HttpNodeClient::new(endpoint).unwrap();
    let raw = client.get_raw_transaction(&TxId::new([1; 32])).await.unwrap();
    assert_eq!(raw, vec![0x01, 0x00, 0xbe, 0xef]);
}

#[tokio::test]
async fn garbage_body_is_protocol_error() {
    let (endpoint, _server) = serve_once(http_response("200 OK", b"<html>nope</html>")).await;
    let client = HttpNodeClient::new(endpoint).unwrap();
    assert!(matches!(
        client.get_network_info().await.unwrap_err(),
        RpcError::Protocol(_)
    ));
}

#[tokio::test]
async fn rejected_credentials_are_protocol_error() {
    let (endpoint, _server) = serve_once(http_response("401 Unauthorized", b"")).await;
    let client = HttpNodeClient::new(endpoint).unwrap();
    assert!(matches!(
        client.get_network_info().await.unwrap_err(),
        RpcError::Protocol(_)
    ));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = HttpNodeClient::new(NodeEndpoint::new("127.0.0.1", port)).unwrap();
    assert!(matches!(
        client.get_blockchain_info().await.unwrap_err(),
        RpcError::Unreachable(_)
    ));
}

// ---------------------------------------------------------------------------
// REST block stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn block_body_is_streamed() {
    let block: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    let mut response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        block.len()
    )
    .into_bytes();
    response.extend_from_slice(&block);
    let (endpoint, server) = serve_once(response).await;
    let client = HttpNodeClient::new(endpoint).unwrap();

    let hash = BlockHash::new([0x5a; 32]);
    let mut stream = client.get_block_stream(&hash).await.unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend(chunk.unwrap());
    }
    assert_eq!(received, block);

    let request = server.await.unwrap();
    assert!(request.starts_with(&format!("GET /rest/block/{hash}.bin ")));
}

#[tokio::test]
async fn missing_block_is_not_found() {
    let (endpoint, _server) = serve_once(http_response("404 Not Found", b"")).await;
    let client = HttpNodeClient::new(endpoint).unwrap();
    let result = client.get_block_stream(&BlockHash::new([1; 32])).await;
    assert!(matches!(result, Err(RpcError::NotFound(_))));
}

#[tokio::test]
async fn short_body_ends_interrupted() {
    let mut response =
        b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\nconnection: close\r\n\r\n".to_vec();
    response.extend_from_slice(&[7u8; 400]);
    let (endpoint, _server) = serve_once(response).await;
    let client = HttpNodeClient::new(endpoint).unwrap();

    let mut stream = client.get_block_stream(&BlockHash::new([2; 32])).await.unwrap();
    let mut received = 0;
    let err = loop {
        match stream.next().await {
            Some(Ok(chunk)) => received += chunk.len(),
            Some(Err(e)) => break e,
            None => panic!("short body ended cleanly"),
        }
    };
    assert_eq!(received, 400);
    assert!(matches!(err, RpcError::Interrupted(_)));
    assert!(stream.next().await.is_none());
}

#![allow(dead_code)]

//! In-process DNS servers for exercising the wire clients.

use hickory_proto::op::Message;
use janus_dns_infrastructure::wire;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// Plain-UDP DNS server driven by a responder closure. Raw request frames
/// are captured for wire-level assertions.
pub async fn spawn_udp_server<F>(respond: F) -> (SocketAddr, Arc<Mutex<Vec<Vec<u8>>>>)
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&captured);

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            capture.lock().unwrap().push(buf[..len].to_vec());
            let Ok(query) = wire::unpack(&buf[..len]) else {
                continue;
            };
            if let Some(response) = respond(&query) {
                let bytes = wire::pack(&response).unwrap();
                let _ = socket.send_to(&bytes, peer).await;
            }
        }
    });

    (addr, captured)
}

/// TCP DNS server speaking 2-byte length-prefixed frames, serving any
/// number of queries per connection. Returns the accepted-connection
/// counter for pipelining assertions.
pub async fn spawn_tcp_server<F>(respond: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(&Message) -> Message + Send + Sync + Clone + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let respond = respond.clone();
            tokio::spawn(async move {
                loop {
                    let mut len_buf = [0u8; 2];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        break;
                    }
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut msg_buf = vec![0u8; len];
                    if stream.read_exact(&mut msg_buf).await.is_err() {
                        break;
                    }
                    let Ok(query) = wire::unpack(&msg_buf) else {
                        break;
                    };
                    let bytes = wire::pack(&respond(&query)).unwrap();
                    let frame_len = (bytes.len() as u16).to_be_bytes();
                    if stream.write_all(&frame_len).await.is_err() {
                        break;
                    }
                    if stream.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, connections)
}

/// True when `needle` appears as a contiguous byte run in `haystack`.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    count_bytes(haystack, needle) > 0
}

/// Number of contiguous occurrences of `needle` in `haystack`.
pub fn count_bytes(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

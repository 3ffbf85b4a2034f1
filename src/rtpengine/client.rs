use super::bencode::Value;
use super::{CallRef, MediaRelay, NegotiateParams, NgResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::{distr::Alphanumeric, Rng};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::select;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outstanding requests by cookie, with the address the reply must come from.
type PendingMap = Arc<Mutex<HashMap<String, (SocketAddr, oneshot::Sender<Value>)>>>;

const COOKIE_LEN: usize = 16;
const MAX_DATAGRAM: usize = 65535;

/// UDP client for the rtpengine NG control protocol.
///
/// Each request is framed as `<cookie> <bencoded dict>`; the relay echoes the
/// cookie in its reply, which is how replies find their waiters. Datagrams
/// that match no outstanding request from the same address are dropped
/// without being decoded.
pub struct NgClient {
    socket: Arc<UdpSocket>,
    pending: PendingMap,
    timeout: Duration,
    token: CancellationToken,
}

impl NgClient {
    pub async fn bind(local_port: u16, timeout: Duration) -> Result<Self> {
        let local_addr: SocketAddr = format!("0.0.0.0:{}", local_port).parse()?;
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| anyhow!("rtpengine: failed to bind {}: {}", local_addr, e))?;
        Ok(Self::with_socket(socket, timeout))
    }

    pub fn with_socket(socket: UdpSocket, timeout: Duration) -> Self {
        let socket = Arc::new(socket);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let token = CancellationToken::new();
        tokio::spawn(recv_loop(socket.clone(), pending.clone(), token.clone()));
        Self {
            socket,
            pending,
            timeout,
            token,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn request(&self, remote: SocketAddr, message: Value) -> Result<NgResponse> {
        let cookie = new_cookie();
        let (tx, rx) = oneshot::channel();
        let _waiter = Waiter::register(&self.pending, cookie.clone(), remote, tx);

        let mut packet = Vec::with_capacity(COOKIE_LEN + 1 + 512);
        packet.extend_from_slice(cookie.as_bytes());
        packet.push(b' ');
        packet.extend_from_slice(&message.encode());

        let start = Instant::now();
        self.socket
            .send_to(&packet, remote)
            .await
            .map_err(|e| anyhow!("rtpengine: failed to send to {}: {}", remote, e))?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => {
                debug!(
                    %remote,
                    cookie,
                    elapsed_ms = start.elapsed().as_millis(),
                    "rtpengine reply received"
                );
                NgResponse::from_bencode(&reply)
            }
            Ok(Err(_)) => Err(anyhow!("rtpengine: client closed while waiting for {}", remote)),
            Err(_) => Err(anyhow!(
                "rtpengine: no reply from {} within {}ms",
                remote,
                self.timeout.as_millis()
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_requests(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }
}

impl Drop for NgClient {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl MediaRelay for NgClient {
    async fn offer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse> {
        self.request(remote, params.to_bencode("offer")).await
    }

    async fn answer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse> {
        self.request(remote, params.to_bencode("answer")).await
    }

    async fn delete(&self, remote: SocketAddr, call: &CallRef) -> Result<NgResponse> {
        let mut message = Value::dict();
        message.insert("command", "delete");
        call.append_to(&mut message);
        self.request(remote, message).await
    }

    async fn ping(&self, remote: SocketAddr) -> Result<NgResponse> {
        let mut message = Value::dict();
        message.insert("command", "ping");
        self.request(remote, message).await
    }

    async fn start_forwarding(&self, remote: SocketAddr, call_id: &str) -> Result<NgResponse> {
        let mut message = Value::dict();
        message.insert("command", "start forwarding");
        message.insert("call-id", call_id);
        message.insert("all", "all");
        self.request(remote, message).await
    }
}

/// Keeps a cookie registered for as long as its request is in flight; a
/// late reply then finds no waiter and is discarded.
struct Waiter {
    pending: PendingMap,
    cookie: String,
}

impl Waiter {
    fn register(
        pending: &PendingMap,
        cookie: String,
        remote: SocketAddr,
        tx: oneshot::Sender<Value>,
    ) -> Self {
        if let Ok(mut map) = pending.lock() {
            map.insert(cookie.clone(), (remote, tx));
        }
        Self {
            pending: pending.clone(),
            cookie,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.cookie);
        }
    }
}

fn new_cookie() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(COOKIE_LEN)
        .map(char::from)
        .collect()
}

async fn recv_loop(socket: Arc<UdpSocket>, pending: PendingMap, token: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = select! {
            _ = token.cancelled() => break,
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    // ICMP unreachable from a dead relay surfaces here; keep serving
                    debug!("rtpengine: recv error: {}", e);
                    continue;
                }
            }
        };
        deliver(&pending, &buf[..n], from);
    }
}

fn deliver(pending: &PendingMap, datagram: &[u8], from: SocketAddr) {
    let Some(split) = datagram.iter().position(|b| *b == b' ') else {
        warn!(%from, "rtpengine: reply without cookie");
        return;
    };
    let cookie = String::from_utf8_lossy(&datagram[..split]).to_string();
    let Ok(mut waiters) = pending.lock() else {
        return;
    };
    match waiters.get(&cookie) {
        Some((remote, _)) if *remote == from => {}
        Some((remote, _)) => {
            warn!(%from, %remote, cookie, "rtpengine: reply from unexpected address");
            return;
        }
        None => {
            debug!(%from, cookie, "rtpengine: reply for unknown or expired request");
            return;
        }
    }
    let reply = match Value::decode(&datagram[split + 1..]) {
        Ok(v) => v,
        Err(e) => {
            warn!(%from, cookie, "rtpengine: undecodable reply: {}", e);
            return;
        }
    };
    if let Some((_, waiter)) = waiters.remove(&cookie) {
        waiter.send(reply).ok();
    }
}

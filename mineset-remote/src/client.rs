use crate::{
    config::{Endpoint, RemoteConfig},
    connection::{CloseCallback, CloseNotifier, Connector, MinerIdentity, MiningConnection},
    error::{RemoteError, Result},
    protocol::{methods, parse_balance, Incoming, RemoteRequest, RemoteResponse, SpecificationPayload},
};
use async_trait::async_trait;
use futures::{sink::SinkExt, stream::StreamExt};
use num_bigint::BigUint;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    time::{timeout, Instant},
};
use tokio_util::{
    codec::{Framed, LinesCodec},
    sync::CancellationToken,
};
use tracing::{debug, error, info, warn};

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<RemoteResponse>>>>;

/// JSON-lines connection to a mining endpoint
pub struct TcpConnection {
    /// Remote address
    endpoint: Endpoint,

    /// Outgoing requests, drained by the write task
    request_tx: mpsc::Sender<RemoteRequest>,

    /// Requests waiting for their response
    pending_requests: PendingRequests,

    next_id: AtomicU64,

    /// Cancelled when either side closes the connection
    shutdown: CancellationToken,

    notifier: Arc<CloseNotifier>,
}

impl TcpConnection {
    /// Open the TCP stream and start the read and write tasks
    pub async fn open(
        endpoint: Endpoint,
        config: &RemoteConfig,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>> {
        info!("Connecting to {}", endpoint);

        let stream = timeout(connect_timeout, TcpStream::connect(endpoint.address()))
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(|e| RemoteError::Deployment(format!("{}: {}", endpoint, e)))?;
        stream.set_nodelay(true)?;

        let framed = Framed::new(stream, LinesCodec::new_with_max_length(config.max_line_length));
        let (request_tx, request_rx) = mpsc::channel(config.request_queue_size);

        let connection = Arc::new(Self {
            endpoint,
            request_tx,
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            notifier: Arc::new(CloseNotifier::new()),
        });

        connection.start_tasks(framed, request_rx);
        Ok(connection)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn start_tasks(
        &self,
        framed: Framed<TcpStream, LinesCodec>,
        mut request_rx: mpsc::Receiver<RemoteRequest>,
    ) {
        let (mut sink, mut lines) = framed.split::<String>();

        // Write task
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = request_rx.recv() => {
                        let Some(request) = request else { break };
                        let msg = match serde_json::to_string(&request) {
                            Ok(msg) => msg,
                            Err(e) => {
                                error!("Failed to encode request {}: {}", request.method, e);
                                continue;
                            }
                        };
                        debug!("Sending: {}", msg);

                        if let Err(e) = sink.send(msg).await {
                            error!("Write error: {}", e);
                            shutdown.cancel();
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Read task, the only place that fires the close notification
        let shutdown = self.shutdown.clone();
        let pending = self.pending_requests.clone();
        let notifier = self.notifier.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = lines.next() => match line {
                        Some(Ok(line)) => {
                            debug!("Received: {}", line);
                            Self::dispatch(&line, &pending).await;
                        }
                        Some(Err(e)) => {
                            error!("Read error from {}: {}", endpoint, e);
                            break;
                        }
                        None => {
                            info!("{} closed the connection", endpoint);
                            break;
                        }
                    }
                }
            }

            shutdown.cancel();
            // Dropping the senders wakes every waiter with `Closed`
            pending.lock().await.clear();
            notifier.fire();
        });
    }

    async fn dispatch(line: &str, pending: &PendingRequests) {
        match Incoming::parse(line) {
            Ok(Incoming::Response(response)) => {
                if let Some(tx) = pending.lock().await.remove(&response.id) {
                    let _ = tx.send(response);
                } else {
                    debug!("Dropping response to unknown request {}", response.id);
                }
            }
            Ok(Incoming::Notification(notification)) => match notification.method.as_str() {
                methods::CHALLENGE => {
                    debug!("Challenge received: {:?}", notification.params);
                }
                methods::SHOW_MESSAGE => {
                    if let Some(Value::String(msg)) = notification.params.first() {
                        info!("Endpoint message: {}", msg);
                    }
                }
                _ => {
                    debug!("Unknown notification: {}", notification.method);
                }
            },
            Err(e) => {
                warn!("Failed to parse message: {}", e);
            }
        }
    }

    /// Send a request and wait at most `deadline` for its response
    pub async fn request<F>(&self, build: F, deadline: Duration) -> Result<Value>
    where
        F: FnOnce(u64) -> RemoteRequest,
    {
        if self.shutdown.is_cancelled() {
            return Err(RemoteError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = build(id);
        let (tx, rx) = oneshot::channel();
        self.pending_requests.lock().await.insert(id, tx);

        // The read task may have cleared the map just before the insert
        if self.shutdown.is_cancelled() {
            self.pending_requests.lock().await.remove(&id);
            return Err(RemoteError::Closed);
        }

        if self.request_tx.send(request).await.is_err() {
            self.pending_requests.lock().await.remove(&id);
            return Err(RemoteError::Closed);
        }

        match timeout(deadline, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(RemoteError::Closed),
            Err(_) => {
                self.pending_requests.lock().await.remove(&id);
                Err(RemoteError::Timeout)
            }
        }
    }
}

#[async_trait]
impl MiningConnection for TcpConnection {
    async fn get_balance(
        &self,
        signature: &str,
        public_key_base58: &str,
        timeout: Duration,
    ) -> Result<Option<BigUint>> {
        let result = self
            .request(|id| RemoteRequest::get_balance(id, signature, public_key_base58), timeout)
            .await?;
        parse_balance(&result)
    }

    async fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Closing connection to {}", self.endpoint);
        }
        self.shutdown.cancel();
    }

    fn on_close(&self, callback: CloseCallback) {
        self.notifier.register(callback);
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.notifier.is_closed()
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Opens `TcpConnection`s and performs the identity handshake
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: RemoteConfig,
}

impl TcpConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        identity: &MinerIdentity,
        uri: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn MiningConnection>> {
        let endpoint = Endpoint::parse(uri)?;
        // One budget for the socket and the handshake together
        let deadline = Instant::now() + timeout;
        let connection = TcpConnection::open(endpoint, &self.config, timeout).await?;

        debug!(
            "Miner {} mining {} with plot {}",
            identity.miner_id,
            uri,
            identity.plot_path.display()
        );

        let hello = connection
            .request(
                |id| {
                    RemoteRequest::hello(
                        id,
                        &self.config.user_agent,
                        &identity.public_key_base58,
                        &identity.signature_for_deadlines,
                    )
                },
                deadline.saturating_duration_since(Instant::now()),
            )
            .await;

        match hello {
            Ok(_) => {
                info!("Miner {} connected to {}", identity.miner_id, uri);
                Ok(connection as Arc<dyn MiningConnection>)
            }
            Err(e) => {
                connection.close().await;
                Err(match e {
                    RemoteError::Timeout => RemoteError::Timeout,
                    other => RemoteError::Deployment(format!("handshake with {} failed: {}", uri, other)),
                })
            }
        }
    }

    async fn fetch_specification(&self, uri: &str, timeout: Duration) -> Result<SpecificationPayload> {
        let endpoint = Endpoint::parse(uri)?;
        let deadline = Instant::now() + timeout;
        let connection = TcpConnection::open(endpoint, &self.config, timeout).await?;

        let result = connection
            .request(RemoteRequest::get_specification, deadline.saturating_duration_since(Instant::now()))
            .await;
        connection.close().await;

        let specification: SpecificationPayload = serde_json::from_value(result?)?;
        debug!("{} mines on chain {}", uri, specification.chain_id);
        Ok(specification)
    }
}

//! etcd v3 store over gRPC.
//!
//! Each [`EtcdStoreFactory::connect`] builds a lazily connecting channel
//! balanced across the configured endpoints; nothing touches the network
//! until the first request. A prefix watch is one bidirectional `Watch`
//! stream whose responses are forwarded onto the synchronizer's sink by a
//! per-watch task.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Streaming;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::KeyValue;
use super::RemoteStore;
use super::StoreFactory;
use super::StoreResult;
use super::WatchEvent;
use super::WatchId;
use super::WatchMessage;
use super::WatchSender;
use crate::proto::event::EventType;
use crate::proto::kv_client::KvClient;
use crate::proto::watch_client::WatchClient;
use crate::proto::watch_request::RequestUnion;
use crate::proto::RangeRequest;
use crate::proto::WatchCancelRequest;
use crate::proto::WatchCreateRequest;
use crate::proto::WatchRequest;
use crate::proto::WatchResponse;
use crate::StoreConfig;
use crate::StoreError;

/// Builds [`EtcdStore`] connections from a [`StoreConfig`]
#[derive(Debug, Clone)]
pub struct EtcdStoreFactory {
    config: StoreConfig,
}

impl EtcdStoreFactory {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl StoreFactory for EtcdStoreFactory {
    fn connect(&self) -> StoreResult<Arc<dyn RemoteStore>> {
        Ok(Arc::new(EtcdStore::connect_lazy(&self.config)?))
    }
}

/// One gRPC channel to an etcd cluster
#[derive(Debug)]
pub struct EtcdStore {
    // Tonic's Channel is cheap to clone and shared by every request
    channel: Channel,
    /// Cancellation handle of each forwarding task
    watches: DashMap<WatchId, CancellationToken>,
    /// Store revision of the last range read per prefix
    revisions: DashMap<String, i64>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl EtcdStore {
    /// Builds the channel without connecting. Must be called inside a
    /// tokio runtime.
    pub fn connect_lazy(config: &StoreConfig) -> StoreResult<Self> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|addr| create_endpoint(addr, config))
            .collect::<StoreResult<Vec<_>>>()?;

        let channel = match endpoints.as_slice() {
            [single] => single.connect_lazy(),
            _ => Channel::balance_list(endpoints.into_iter()),
        };
        debug!(endpoints = ?config.endpoints, "etcd channel created");

        Ok(Self {
            channel,
            watches: DashMap::new(),
            revisions: DashMap::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for EtcdStore {
    async fn fetch_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Vec<KeyValue>> {
        self.ensure_open()?;

        let request = RangeRequest {
            key: prefix.as_bytes().to_vec(),
            range_end: prefix_range_end(prefix.as_bytes()),
            ..Default::default()
        };
        let response = KvClient::new(self.channel.clone()).range(request).await?.into_inner();
        let revision = response.header.as_ref().map(|h| h.revision);
        trace!(prefix, count = response.kvs.len(), ?revision, "etcd range");
        if let Some(revision) = revision {
            self.revisions.insert(prefix.to_string(), revision);
        }

        Ok(response
            .kvs
            .into_iter()
            .map(|kv| KeyValue::new(kv.key, kv.value))
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        sink: WatchSender,
    ) -> StoreResult<WatchId> {
        self.ensure_open()?;

        let (requests, request_rx) = mpsc::channel(4);
        let start_revision = self.revisions.get(prefix).map(|r| *r);
        let create = watch_create_request(prefix, start_revision);
        requests.send(create).await.map_err(|_| StoreError::Closed)?;

        let mut stream = WatchClient::new(self.channel.clone())
            .watch(ReceiverStream::new(request_rx))
            .await?
            .into_inner();

        let created = stream
            .message()
            .await?
            .ok_or_else(|| StoreError::WatchRejected("watch stream closed before creation".to_string()))?;
        if !created.created || created.canceled {
            return Err(StoreError::WatchRejected(created.cancel_reason));
        }

        let watch_id = created.watch_id as WatchId;
        let token = self.shutdown.child_token();
        self.watches.insert(watch_id, token.clone());
        debug!(watch_id, prefix, ?start_revision, "etcd watch created");

        tokio::spawn(forward_watch(stream, requests, sink, token, watch_id));
        Ok(watch_id)
    }

    async fn cancel_watch(
        &self,
        watch_id: WatchId,
    ) -> StoreResult<()> {
        match self.watches.remove(&watch_id) {
            Some((_, token)) => {
                token.cancel();
                Ok(())
            }
            None => Err(StoreError::WatchNotFound(watch_id)),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.watches.clear();
        debug!("etcd store closed");
        Ok(())
    }
}

/// Relays one watch stream onto `sink` until cancelled or the stream ends.
/// The request sender is held so the stream stays open.
async fn forward_watch(
    mut stream: Streaming<WatchResponse>,
    requests: mpsc::Sender<WatchRequest>,
    sink: WatchSender,
    token: CancellationToken,
    watch_id: WatchId,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => {
                let cancel = WatchRequest {
                    request_union: Some(RequestUnion::CancelRequest(WatchCancelRequest {
                        watch_id: watch_id as i64,
                    })),
                };
                if let Err(e) = requests.try_send(cancel) {
                    debug!(watch_id, "etcd cancel request not sent: {}", e);
                }
                return;
            }
            message = stream.message() => message,
        };

        let response = match message {
            Ok(Some(response)) => response,
            Ok(None) => {
                terminate(&sink, watch_id, "watch stream ended".to_string());
                return;
            }
            Err(status) => {
                error!(watch_id, %status, "etcd watch stream failed");
                terminate(&sink, watch_id, status.to_string());
                return;
            }
        };

        if response.canceled {
            let reason = if response.compact_revision != 0 {
                format!("compacted at revision {}", response.compact_revision)
            } else {
                response.cancel_reason
            };
            terminate(&sink, watch_id, reason);
            return;
        }

        let events: Vec<WatchEvent> = response
            .events
            .into_iter()
            .filter_map(|event| {
                let event_type = event.r#type();
                let kv = event.kv?;
                Some(match event_type {
                    EventType::Put => WatchEvent::put(kv.key, kv.value),
                    EventType::Delete => WatchEvent::delete(kv.key),
                })
            })
            .collect();
        if events.is_empty() {
            continue;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = sink.send(WatchMessage::Events(events)) => {
                if sent.is_err() {
                    debug!(watch_id, "watch receiver gone");
                    return;
                }
            }
        }
    }
}

fn terminate(
    sink: &WatchSender,
    watch_id: WatchId,
    reason: String,
) {
    warn!(watch_id, reason = %reason, "etcd watch terminated");
    if let Err(e) = sink.try_send(WatchMessage::Terminated(reason)) {
        debug!(watch_id, "terminate not delivered: {}", e);
    }
}

fn create_endpoint(
    addr: &str,
    config: &StoreConfig,
) -> StoreResult<Endpoint> {
    let uri = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };

    let endpoint = Endpoint::from_shared(uri).map_err(|e| StoreError::InvalidEndpoint(format!("{}: {}", addr, e)))?;
    // no per-request timeout: it would also cut long-lived watch streams
    Ok(endpoint
        .connect_timeout(config.connect_timeout())
        .tcp_nodelay(true))
}

/// Watch on every key under `prefix`. After a range read at `revision`
/// the watch starts right after it, so writes in between are replayed.
pub(crate) fn watch_create_request(
    prefix: &str,
    revision: Option<i64>,
) -> WatchRequest {
    WatchRequest {
        request_union: Some(RequestUnion::CreateRequest(WatchCreateRequest {
            key: prefix.as_bytes().to_vec(),
            range_end: prefix_range_end(prefix.as_bytes()),
            start_revision: revision.map_or(0, |r| r + 1),
            ..Default::default()
        })),
    }
}

/// Smallest key greater than every key starting with `prefix`, as etcd
/// expects in `range_end`. An all-0xff or empty prefix means "to the end".
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

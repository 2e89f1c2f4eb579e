//! gRPC client side of the replication service.
//!
//! Requests are encoded with tonic's prost codec against the
//! `replication.Replication` service paths. Channels are connected lazily
//! and cached per peer.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::timeout;
use tonic::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::SnapshotRequest;
use crate::proto::SnapshotResponse;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;
use crate::Transport;

pub const APPEND_ENTRIES_PATH: &str = "/replication.Replication/AppendEntries";
pub const INSTALL_SNAPSHOT_PATH: &str = "/replication.Replication/InstallSnapshot";

#[derive(Debug)]
pub struct GrpcTransport {
    settings: NetworkConfig,
    /// peer_id -> address, e.g. "http://127.0.0.1:9082"
    addresses: DashMap<String, String>,
    channels: DashMap<String, Channel>,
}

impl GrpcTransport {
    pub fn new(settings: NetworkConfig) -> Self {
        Self {
            settings,
            addresses: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    pub fn register_peer(
        &self,
        peer_id: impl Into<String>,
        address: impl Into<String>,
    ) {
        let peer_id = peer_id.into();
        let address = address.into();
        info!("register peer {} at {}", peer_id, address);
        self.channels.remove(&peer_id);
        self.addresses.insert(peer_id, address);
    }

    pub fn remove_peer(
        &self,
        peer_id: &str,
    ) {
        self.addresses.remove(peer_id);
        self.channels.remove(peer_id);
    }

    fn channel(
        &self,
        peer_id: &str,
    ) -> Result<Channel> {
        if let Some(channel) = self.channels.get(peer_id) {
            return Ok(channel.clone());
        }

        let address = self
            .addresses
            .get(peer_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| NetworkError::PeerNotFound(peer_id.to_string()))?;

        let channel = Endpoint::from_shared(address.clone())
            .map_err(|_| NetworkError::InvalidURI(address))?
            .connect_timeout(self.settings.connect_timeout())
            .connect_lazy();

        self.channels.insert(peer_id.to_string(), channel.clone());
        Ok(channel)
    }

    async fn unary<Req, Resp>(
        &self,
        peer_id: &str,
        path: &'static str,
        req: Req,
        deadline: Duration,
        compressed: bool,
    ) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel(peer_id)?);
        if compressed {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        grpc.ready().await.map_err(|e| {
            warn!("channel to {} not ready: {}", peer_id, e);
            NetworkError::ServiceUnavailable(format!("{peer_id}: {e}"))
        })?;

        let mut request = tonic::Request::new(req);
        request.set_timeout(deadline);
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();

        debug!("rpc {} -> {}", path, peer_id);
        match timeout(deadline, grpc.unary(request, PathAndQuery::from_static(path), codec)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => {
                warn!("rpc {} to {} failed: {}", path, peer_id, status);
                Err(status.into())
            }
            Err(_) => Err(NetworkError::Timeout {
                peer_id: peer_id.to_string(),
                duration: deadline,
            }
            .into()),
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn send_append_entries(
        &self,
        peer_id: &str,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        self.unary(
            peer_id,
            APPEND_ENTRIES_PATH,
            req,
            self.settings.request_timeout(),
            false,
        )
        .await
    }

    async fn send_snapshot(
        &self,
        peer_id: &str,
        req: SnapshotRequest,
    ) -> Result<SnapshotResponse> {
        self.unary(
            peer_id,
            INSTALL_SNAPSHOT_PATH,
            req,
            self.settings.snapshot_request_timeout(),
            true,
        )
        .await
    }
}

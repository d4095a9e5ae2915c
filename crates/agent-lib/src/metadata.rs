//! Client for the cluster metadata/control store
//!
//! Constructed eagerly during bootstrap, before the agent exists, so the
//! locally-assigned client id can be logged and the handle shared into both
//! subsystems. Construction failure is fatal to startup; retry and backoff
//! are the store client's own concern, not this layer's.

use std::sync::Arc;

use thiserror::Error;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::Request;
use tracing::debug;
use uuid::Uuid;

use crate::proto::{
    HeartbeatReply, HeartbeatRequest, LocateObjectReply, LocateObjectRequest, NodeInfo,
    RegisterNodeReply, RegisterNodeRequest,
};

const REGISTER_NODE: &str = "/cluster.v1.ControlStore/RegisterNode";
const HEARTBEAT: &str = "/cluster.v1.ControlStore/Heartbeat";
const LOCATE_OBJECT: &str = "/cluster.v1.ControlStore/LocateObject";

/// Shared, reference-counted handle to the control store client.
///
/// The agent and both subsystems hold one; the longest holder determines
/// teardown time.
pub type MetadataClientHandle = Arc<MetadataClient>;

/// Failures talking to the control store.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid control store endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: tonic::codegen::http::uri::InvalidUri,
    },

    #[error("failed to connect to control store at `{endpoint}`: {source}")]
    Connect {
        endpoint: String,
        source: tonic::transport::Error,
    },

    #[error("control store transport not ready: {0}")]
    Unavailable(String),

    #[error("control store rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
}

/// Client for the cluster's metadata/control store.
///
/// The underlying channel is cheaply clonable; each call builds its own
/// gRPC stub over a clone, so the client itself needs no interior locking.
pub struct MetadataClient {
    channel: Channel,
    endpoint: String,
    client_id: String,
}

impl MetadataClient {
    /// Connect to the store at `addr:port`, eagerly.
    ///
    /// An unreachable store fails construction; the caller treats that as
    /// fatal to process startup.
    pub async fn connect(addr: &str, port: u16) -> Result<Self, MetadataError> {
        let endpoint = format!("http://{addr}:{port}");
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|source| MetadataError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                source,
            })?
            .connect()
            .await
            .map_err(|source| MetadataError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(Self::with_channel(channel, endpoint))
    }

    /// Build the client without connecting; the channel connects on first
    /// use. Intended for tests and collaborators that tolerate a store
    /// coming up later.
    pub fn connect_lazy(addr: &str, port: u16) -> Result<Self, MetadataError> {
        let endpoint = format!("http://{addr}:{port}");
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|source| MetadataError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                source,
            })?
            .connect_lazy();

        Ok(Self::with_channel(channel, endpoint))
    }

    fn with_channel(channel: Channel, endpoint: String) -> Self {
        let client_id = Uuid::new_v4().to_string();
        debug!(client_id = %client_id, endpoint = %endpoint, "control store client created");
        Self {
            channel,
            endpoint,
            client_id,
        }
    }

    /// Locally-assigned identifier for this client.
    pub fn local_client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Announce a node joining the cluster.
    pub async fn register_node(&self, node: NodeInfo) -> Result<RegisterNodeReply, MetadataError> {
        self.unary(REGISTER_NODE, RegisterNodeRequest { node: Some(node) })
            .await
    }

    /// Publish liveness and available resources.
    pub async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, MetadataError> {
        self.unary(HEARTBEAT, request).await
    }

    /// Resolve which nodes hold a copy of an object.
    pub async fn locate_object(&self, object_id: &str) -> Result<LocateObjectReply, MetadataError> {
        self.unary(
            LOCATE_OBJECT,
            LocateObjectRequest {
                object_id: object_id.to_string(),
            },
        )
        .await
    }

    async fn unary<Req, Reply>(&self, method: &'static str, request: Req) -> Result<Reply, MetadataError>
    where
        Req: prost::Message + 'static,
        Reply: prost::Message + Default + 'static,
    {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;

        let codec: ProstCodec<Req, Reply> = ProstCodec::default();
        let path = PathAndQuery::from_static(method);
        let reply = grpc.unary(Request::new(request), path, codec).await?;
        Ok(reply.into_inner())
    }
}

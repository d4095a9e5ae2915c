//! Wire messages for the cluster control store
//!
//! The message set is small enough to maintain by hand as prost derives,
//! which keeps the build free of protoc. Method paths live next to the
//! client in `metadata.rs`.

pub mod cluster {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        /// Identity and capacity a node reports when joining the cluster.
        #[derive(Clone, PartialEq, Message)]
        pub struct NodeInfo {
            #[prost(string, tag = "1")]
            pub node_id: String,
            #[prost(string, tag = "2")]
            pub node_ip: String,
            #[prost(string, tag = "3")]
            pub agent_socket: String,
            #[prost(string, tag = "4")]
            pub store_socket: String,
            #[prost(map = "string, double", tag = "5")]
            pub resources: HashMap<String, f64>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct RegisterNodeRequest {
            #[prost(message, optional, tag = "1")]
            pub node: Option<NodeInfo>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct RegisterNodeReply {
            #[prost(bool, tag = "1")]
            pub success: bool,
            #[prost(string, tag = "2")]
            pub message: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct HeartbeatRequest {
            #[prost(string, tag = "1")]
            pub node_id: String,
            #[prost(map = "string, double", tag = "2")]
            pub available: HashMap<String, f64>,
            #[prost(message, optional, tag = "3")]
            pub timestamp: Option<prost_types::Timestamp>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct HeartbeatReply {}

        #[derive(Clone, PartialEq, Message)]
        pub struct LocateObjectRequest {
            #[prost(string, tag = "1")]
            pub object_id: String,
        }

        /// Nodes currently holding a copy of the object.
        #[derive(Clone, PartialEq, Message)]
        pub struct LocateObjectReply {
            #[prost(string, repeated, tag = "1")]
            pub node_ids: Vec<String>,
        }
    }
}

pub use cluster::v1::{
    HeartbeatReply, HeartbeatRequest, LocateObjectReply, LocateObjectRequest, NodeInfo,
    RegisterNodeReply, RegisterNodeRequest,
};

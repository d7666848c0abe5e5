//! RPC surface of the durable state store.
//!
//! The store runs behind a tonic gRPC service ([`DbosGrpcService`]);
//! callers go through the [`DbosApi`] seam, implemented both by the
//! remote [`DbosClient`] and by [`DirectDbos`], which wraps the store
//! in-process for embedded deployments and tests.

pub mod proto {
    tonic::include_proto!("imn.v1");
}

mod error;
pub use error::DbosError;

mod convert;

mod api;
pub use api::{DbosApi, DirectDbos};

mod service;
pub use service::DbosGrpcService;

mod client;
pub use client::DbosClient;

pub use proto::dbos_service_server::DbosServiceServer;

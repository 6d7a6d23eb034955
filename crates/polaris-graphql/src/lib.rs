//! GraphQL control plane client
//!
//! [`PolarisControlPlane`] implements [`polaris_cloud::ControlPlane`] by
//! posting GraphQL operations to the account's control plane endpoint.
//!
//! ```ignore
//! use polaris_graphql::{GraphqlClient, PolarisControlPlane};
//! use std::sync::Arc;
//!
//! let client = GraphqlClient::new("https://acme.my.polaris.com/api/graphql", token);
//! let ctx = polaris_cloud::Context::new(Arc::new(PolarisControlPlane::new(client)));
//! ```

pub mod client;
pub mod control_plane;
pub mod error;

pub use client::GraphqlClient;
pub use control_plane::PolarisControlPlane;
pub use error::{GraphqlError, Result};

//! # Client Proxy
//!
//! Typed calls against one remote service identity.
//!
//! The proxy builds a [`RpcRequest`] with a fresh UUID, sends it through the
//! [`RpcClient`] and waits for the response. A response is accepted only when it
//! echoes the request id and reports success; its data is then decoded into the
//! caller's return type.
//!
//! ```rust,no_run
//! # async fn demo(client: std::sync::Arc<netrpc::transport::client::RpcClient>) -> netrpc::error::Result<()> {
//! use netrpc::protocol::message::RpcServiceProperties;
//! use netrpc::service::proxy::RpcClientProxy;
//!
//! let hello = RpcClientProxy::new(client, RpcServiceProperties::new("Hello", "test1", "version1"));
//! let greeting: String = hello.invoke("hello", &"world".to_string()).await?;
//! # Ok(())
//! # }
//! ```

use crate::core::serialization::to_blob;
use crate::error::{Result, RpcError};
use crate::protocol::message::{RpcRequest, RpcResponse, RpcServiceProperties};
use crate::protocol::provider::param_type_names;
use crate::transport::client::RpcClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct RpcClientProxy {
    client: Arc<RpcClient>,
    properties: RpcServiceProperties,
}

impl RpcClientProxy {
    pub fn new(client: Arc<RpcClient>, properties: RpcServiceProperties) -> Self {
        Self { client, properties }
    }

    pub fn properties(&self) -> &RpcServiceProperties {
        &self.properties
    }

    /// Build the request for `method` with `params`.
    pub fn build_request<P: Serialize>(&self, method: &str, params: &P) -> Result<RpcRequest> {
        Ok(RpcRequest {
            request_id: Uuid::new_v4().to_string(),
            interface_name: self.properties.service_name.clone(),
            method_name: method.to_string(),
            param_types: param_type_names::<P>(),
            parameters: to_blob(params)?,
            group: self.properties.group.clone(),
            version: self.properties.version.clone(),
        })
    }

    /// Call `method` remotely and decode its return value.
    #[instrument(skip(self, params), fields(service = %self.properties.rpc_service_name()))]
    pub async fn invoke<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = self.build_request(method, params)?;
        let request_id = request.request_id.clone();
        let response = self.client.send_rpc_request(request).await?.await?;
        debug!(request_id = %request_id, code = %response.code, "Response received");

        check(&self.properties, &request_id, &response)?;
        response.decode_data()
    }
}

/// Accept `response` only if it answers `request_id` successfully.
fn check(properties: &RpcServiceProperties, request_id: &str, response: &RpcResponse) -> Result<()> {
    if response.request_id != request_id {
        return Err(RpcError::RequestMismatch {
            expected: request_id.to_string(),
            actual: response.request_id.clone(),
        });
    }
    if !response.is_success() {
        return Err(RpcError::CallFailed {
            service: properties.service_name.clone(),
            request_id: request_id.to_string(),
            message: response.message.clone(),
        });
    }
    Ok(())
}

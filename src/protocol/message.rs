//! Call request and response bodies carried inside REQUEST/RESPONSE frames.

use crate::core::serialization::from_blob;
use crate::error::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compose the key a provider is published and looked up under
pub fn service_key(service_name: &str, group: &str, version: &str) -> String {
    format!("{service_name}{group}{version}")
}

/// One remote call, created by the proxy and consumed once by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Globally unique per call, independent of the frame's numeric id
    pub request_id: String,
    pub interface_name: String,
    pub method_name: String,
    /// Type names of the parameter blob, checked at dispatch
    pub param_types: Vec<String>,
    /// bincode-encoded parameters
    pub parameters: Vec<u8>,
    pub group: String,
    pub version: String,
}

impl RpcRequest {
    pub fn rpc_service_name(&self) -> String {
        service_key(&self.interface_name, &self.group, &self.version)
    }
}

/// Outcome of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Success,
    Fail,
}

impl ResponseCode {
    pub fn code(self) -> u16 {
        match self {
            ResponseCode::Success => 200,
            ResponseCode::Fail => 500,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ResponseCode::Success => "The remote call is successful",
            ResponseCode::Fail => "The remote call is fail",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}

/// Result of a call, echoing the request's string id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub request_id: String,
    pub code: ResponseCode,
    pub message: String,
    /// bincode-encoded return value
    pub data: Option<Vec<u8>>,
}

impl RpcResponse {
    pub fn success(data: Option<Vec<u8>>, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code: ResponseCode::Success,
            message: ResponseCode::Success.message().to_string(),
            data,
        }
    }

    pub fn fail(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code: ResponseCode::Fail,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success
    }

    /// Decode the return value blob
    pub fn decode_data<R: DeserializeOwned>(&self) -> Result<R> {
        match &self.data {
            Some(bytes) => from_blob(bytes),
            None => Err(RpcError::Deserialize(format!(
                "response {} carries no data",
                self.request_id
            ))),
        }
    }
}

/// Identity of a published service: name plus group and version
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RpcServiceProperties {
    pub service_name: String,
    pub group: String,
    pub version: String,
}

impl RpcServiceProperties {
    pub fn new(
        service_name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            group: group.into(),
            version: version.into(),
        }
    }

    pub fn rpc_service_name(&self) -> String {
        service_key(&self.service_name, &self.group, &self.version)
    }
}

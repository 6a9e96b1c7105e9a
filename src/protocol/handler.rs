//! Server-side request dispatch.
//!
//! Every outcome becomes an [`RpcResponse`]: a missing service, an unknown method,
//! a parameter mismatch or a failing method all yield FAIL with the error text,
//! so the caller tells them apart by status rather than by transport fault.

use crate::error::constants::ERR_SERVICE_INVOCATION_FAILURE;
use crate::protocol::message::{RpcRequest, RpcResponse};
use crate::protocol::provider::ServiceProvider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves a request's service and invokes the named method
#[derive(Clone)]
pub struct RpcRequestHandler {
    provider: Arc<ServiceProvider>,
}

impl RpcRequestHandler {
    pub fn new(provider: Arc<ServiceProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    pub fn handle(&self, request: &RpcRequest) -> RpcResponse {
        let service_key = request.rpc_service_name();
        let outcome = self.provider.get_service(&service_key).and_then(|service| {
            service.invoke(
                &request.method_name,
                &request.param_types,
                &request.parameters,
            )
        });

        match outcome {
            Ok(data) => {
                debug!(
                    service = %service_key,
                    method = %request.method_name,
                    request_id = %request.request_id,
                    "Service invoked"
                );
                RpcResponse::success(Some(data), request.request_id.clone())
            }
            Err(e) => {
                warn!(
                    service = %service_key,
                    method = %request.method_name,
                    request_id = %request.request_id,
                    error = %e,
                    "{}",
                    ERR_SERVICE_INVOCATION_FAILURE
                );
                RpcResponse::fail(request.request_id.clone(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serialization::to_blob;
    use crate::protocol::message::ResponseCode;
    use crate::protocol::provider::{param_type_names, RpcService};

    #[allow(clippy::unwrap_used)]
    fn request(interface: &str, method: &str) -> RpcRequest {
        RpcRequest {
            request_id: "req-1".into(),
            interface_name: interface.into(),
            method_name: method.into(),
            param_types: param_type_names::<String>(),
            parameters: to_blob(&"world".to_string()).unwrap(),
            group: "test1".into(),
            version: "version1".into(),
        }
    }

    fn handler() -> RpcRequestHandler {
        let provider = Arc::new(ServiceProvider::new());
        provider.publish(
            RpcService::builder("Hello")
                .method("hello", |name: String| format!("Hello, {name}"))
                .build(),
            "test1",
            "version1",
        );
        RpcRequestHandler::new(provider)
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn success_echoes_request_id() {
        let response = handler().handle(&request("Hello", "hello"));
        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.code, ResponseCode::Success);
        assert_eq!(response.decode_data::<String>().unwrap(), "Hello, world");
    }

    #[test]
    fn missing_service_is_a_fail_response() {
        let response = handler().handle(&request("Goodbye", "hello"));
        assert_eq!(response.code, ResponseCode::Fail);
        assert_eq!(response.request_id, "req-1");
        assert!(response.message.contains("Goodbyetest1version1"));
    }

    #[test]
    fn unknown_method_is_a_fail_response() {
        let response = handler().handle(&request("Hello", "bye"));
        assert!(!response.is_success());
        assert!(response.data.is_none());
    }
}

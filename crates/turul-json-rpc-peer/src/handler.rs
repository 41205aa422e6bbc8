//! Handler adapter: every user handler, sync or async, is lifted into a
//! boxed future before the dispatcher sees it.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{JsonRpcErrorObject, ToJsonRpcError},
    message::JsonRpcCall,
    request::RequestParams,
};

/// Outcome of a handler call once settled
pub type HandlerResult = Result<Value, JsonRpcErrorObject>;

/// What a handler hands back: a value it already has, or a future for one
pub enum HandlerOutput {
    Ready(HandlerResult),
    Pending(BoxFuture<'static, HandlerResult>),
}

impl HandlerOutput {
    pub fn ready(result: HandlerResult) -> Self {
        HandlerOutput::Ready(result)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        HandlerOutput::Pending(future.boxed())
    }

    pub fn into_future(self) -> BoxFuture<'static, HandlerResult> {
        match self {
            HandlerOutput::Ready(result) => future::ready(result).boxed(),
            HandlerOutput::Pending(future) => future,
        }
    }
}

impl std::fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerOutput::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            HandlerOutput::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<HandlerResult> for HandlerOutput {
    fn from(result: HandlerResult) -> Self {
        HandlerOutput::Ready(result)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Ready(Ok(value))
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        HandlerOutput::Ready(Ok(Value::Null))
    }
}

impl From<JsonRpcErrorObject> for HandlerOutput {
    fn from(error: JsonRpcErrorObject) -> Self {
        HandlerOutput::Ready(Err(error))
    }
}

impl From<BoxFuture<'static, HandlerResult>> for HandlerOutput {
    fn from(future: BoxFuture<'static, HandlerResult>) -> Self {
        HandlerOutput::Pending(future)
    }
}

/// Receives inbound requests and notifications.
///
/// `context` is whatever the transport passed to
/// [`Peer::write_with_context`](crate::Peer::write_with_context) or
/// [`Peer::dispatch`](crate::Peer::dispatch). For notifications the result is
/// discarded.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, call: JsonRpcCall, context: Option<Value>) -> HandlerOutput;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, call: JsonRpcCall, context: Option<Value>) -> HandlerOutput {
        (**self).call(call, context)
    }
}

/// Invoke `handler` exactly once and always return a future.
///
/// A panic, either while the handler runs synchronously or while its future
/// is polled, settles the future with an internal error.
pub fn invoke(
    handler: &dyn Handler,
    call: JsonRpcCall,
    context: Option<Value>,
) -> BoxFuture<'static, HandlerResult> {
    let method = call.method().to_string();

    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(call, context))) {
        Ok(HandlerOutput::Ready(result)) => future::ready(result).boxed(),
        Ok(HandlerOutput::Pending(pending)) => AssertUnwindSafe(pending)
            .catch_unwind()
            .map(move |outcome| outcome.unwrap_or_else(|panic| Err(panicked(&method, panic))))
            .boxed(),
        Err(panic) => future::ready(Err(panicked(&method, panic))).boxed(),
    }
}

fn panicked(method: &str, panic: Box<dyn Any + Send>) -> JsonRpcErrorObject {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    warn!(method = %method, reason = %reason, "Handler panicked");
    JsonRpcErrorObject::internal_error(Some(format!("Handler panicked: {}", reason)))
}

/// Handler used when none is configured: every request is answered with
/// method-not-found, every notification is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {
    fn call(&self, call: JsonRpcCall, _context: Option<Value>) -> HandlerOutput {
        match call {
            JsonRpcCall::Request(request) => {
                Err(JsonRpcErrorObject::method_not_found_for(&request.method)).into()
            }
            JsonRpcCall::Notification(_) => ().into(),
        }
    }
}

/// Handler backed by a closure returning anything convertible into a
/// [`HandlerOutput`]
pub struct FnHandler<F> {
    handler_fn: F,
}

/// Wrap a closure as a [`Handler`]
pub fn handler_fn<F, R>(handler_fn: F) -> FnHandler<F>
where
    F: Fn(JsonRpcCall, Option<Value>) -> R + Send + Sync + 'static,
    R: Into<HandlerOutput>,
{
    FnHandler { handler_fn }
}

impl<F, R> Handler for FnHandler<F>
where
    F: Fn(JsonRpcCall, Option<Value>) -> R + Send + Sync + 'static,
    R: Into<HandlerOutput>,
{
    fn call(&self, call: JsonRpcCall, context: Option<Value>) -> HandlerOutput {
        (self.handler_fn)(call, context).into()
    }
}

/// Handler backed by a closure returning a future
pub struct AsyncFnHandler<F> {
    handler_fn: F,
}

/// Wrap an async closure as a [`Handler`]
pub fn async_handler_fn<F, Fut>(handler_fn: F) -> AsyncFnHandler<F>
where
    F: Fn(JsonRpcCall, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    AsyncFnHandler { handler_fn }
}

impl<F, Fut> Handler for AsyncFnHandler<F>
where
    F: Fn(JsonRpcCall, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, call: JsonRpcCall, context: Option<Value>) -> HandlerOutput {
        HandlerOutput::pending((self.handler_fn)(call, context))
    }
}

/// Trait for handling JSON-RPC method calls by name
#[async_trait]
pub trait JsonRpcHandler: Send + Sync {
    /// The error type returned by this handler
    type Error: ToJsonRpcError;

    /// Handle a method call. Returns domain errors only; the router converts
    /// them to JSON-RPC error objects.
    async fn handle(
        &self,
        method: &str,
        params: Option<RequestParams>,
        context: Option<Value>,
    ) -> Result<Value, Self::Error>;

    /// Handle a notification (default: ignore)
    async fn handle_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
        context: Option<Value>,
    ) -> Result<(), Self::Error> {
        let _ = (method, params, context);
        Ok(())
    }

    /// List supported methods (used for introspection)
    fn supported_methods(&self) -> Vec<String> {
        vec![]
    }
}

/// Routes calls to [`JsonRpcHandler`]s registered per method name
pub struct MethodRouter<E>
where
    E: ToJsonRpcError,
{
    handlers: HashMap<String, Arc<dyn JsonRpcHandler<Error = E>>>,
    default_handler: Option<Arc<dyn JsonRpcHandler<Error = E>>>,
}

impl<E> MethodRouter<E>
where
    E: ToJsonRpcError,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: None,
        }
    }

    /// Register a handler for a specific method
    pub fn register_method<H>(&mut self, method: impl Into<String>, handler: H)
    where
        H: JsonRpcHandler<Error = E> + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// Register one handler for every method it reports in
    /// [`JsonRpcHandler::supported_methods`]
    pub fn register<H>(&mut self, handler: H)
    where
        H: JsonRpcHandler<Error = E> + 'static,
    {
        let handler: Arc<dyn JsonRpcHandler<Error = E>> = Arc::new(handler);
        for method in handler.supported_methods() {
            self.handlers.insert(method, Arc::clone(&handler));
        }
    }

    /// Set a fallback for unregistered methods
    pub fn set_default_handler<H>(&mut self, handler: H)
    where
        H: JsonRpcHandler<Error = E> + 'static,
    {
        self.default_handler = Some(Arc::new(handler));
    }

    pub fn registered_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    fn route(&self, method: &str) -> Option<Arc<dyn JsonRpcHandler<Error = E>>> {
        self.handlers
            .get(method)
            .or(self.default_handler.as_ref())
            .cloned()
    }
}

impl<E> Default for MethodRouter<E>
where
    E: ToJsonRpcError,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Handler for MethodRouter<E>
where
    E: ToJsonRpcError,
{
    fn call(&self, call: JsonRpcCall, context: Option<Value>) -> HandlerOutput {
        let Some(handler) = self.route(call.method()) else {
            return match call {
                JsonRpcCall::Request(_) => Err(JsonRpcErrorObject::method_not_found()).into(),
                // Notifications don't return errors, just ignore unknown methods
                JsonRpcCall::Notification(_) => ().into(),
            };
        };

        match call {
            JsonRpcCall::Request(request) => HandlerOutput::pending(async move {
                handler
                    .handle(&request.method, request.params, context)
                    .await
                    .map_err(|e| e.to_error_object())
            }),
            JsonRpcCall::Notification(notification) => HandlerOutput::pending(async move {
                handler
                    .handle_notification(&notification.method, notification.params, context)
                    .await
                    .map(|()| Value::Null)
                    .map_err(|e| e.to_error_object())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{notification::JsonRpcNotification, request::JsonRpcRequest, types::RequestId};
    use serde_json::json;

    #[derive(thiserror::Error, Debug)]
    enum TestError {
        #[error("Test error: {0}")]
        TestError(String),
    }

    impl ToJsonRpcError for TestError {
        fn to_error_object(&self) -> JsonRpcErrorObject {
            match self {
                TestError::TestError(msg) => JsonRpcErrorObject::internal_error(Some(msg.clone())),
            }
        }
    }

    struct TestHandler;

    #[async_trait]
    impl JsonRpcHandler for TestHandler {
        type Error = TestError;

        async fn handle(
            &self,
            method: &str,
            _params: Option<RequestParams>,
            _context: Option<Value>,
        ) -> Result<Value, Self::Error> {
            match method {
                "add" => Ok(json!({"result": "addition"})),
                _ => Err(TestError::TestError("test error".to_string())),
            }
        }

        fn supported_methods(&self) -> Vec<String> {
            vec!["add".to_string(), "error".to_string()]
        }
    }

    fn request(method: &str) -> JsonRpcCall {
        JsonRpcRequest::new_no_params(RequestId::Number(1), method).into()
    }

    #[tokio::test]
    async fn test_sync_results_become_ready_futures() {
        let ok = handler_fn(|_call, _ctx| json!(1));
        assert_eq!(invoke(&ok, request("x"), None).await, Ok(json!(1)));

        let failing = handler_fn(|_call, _ctx| JsonRpcErrorObject::invalid_params("nope"));
        let error = invoke(&failing, request("x"), None).await.unwrap_err();
        assert_eq!(error.code, crate::error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_async_handler_receives_context() {
        let handler = async_handler_fn(|call: JsonRpcCall, ctx: Option<Value>| async move {
            Ok(json!({"method": call.method(), "ctx": ctx}))
        });

        let result = invoke(&handler, request("echo"), Some(json!("conn-1")))
            .await
            .unwrap();
        assert_eq!(result, json!({"method": "echo", "ctx": "conn-1"}));
    }

    #[tokio::test]
    async fn test_panics_become_internal_errors() {
        let sync_panic = handler_fn(|_call, _ctx| -> HandlerResult { panic!("sync boom") });
        let error = invoke(&sync_panic, request("x"), None).await.unwrap_err();
        assert_eq!(error.code, crate::error_codes::INTERNAL_ERROR);
        assert!(error.message.contains("sync boom"));

        let async_panic = async_handler_fn(|_call, _ctx| async move {
            if true {
                panic!("async boom");
            }
            Ok(Value::Null)
        });
        let error = invoke(&async_panic, request("x"), None).await.unwrap_err();
        assert!(error.message.contains("async boom"));
    }

    #[tokio::test]
    async fn test_default_handler() {
        let error = invoke(&DefaultHandler, request("foo"), None)
            .await
            .unwrap_err();
        assert!(error.is_method_not_found());
        assert_eq!(error.data, Some(json!("foo")));

        let notification = JsonRpcNotification::new_no_params("tick").into();
        assert_eq!(invoke(&DefaultHandler, notification, None).await, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_router_dispatches_by_method() {
        let mut router: MethodRouter<TestError> = MethodRouter::new();
        router.register(TestHandler);
        assert_eq!(router.registered_methods(), vec!["add", "error"]);

        let result = invoke(&router, request("add"), None).await.unwrap();
        assert_eq!(result["result"], "addition");

        let error = invoke(&router, request("error"), None).await.unwrap_err();
        assert_eq!(error.message, "test error");

        let missing = invoke(&router, request("unknown"), None).await.unwrap_err();
        assert!(missing.is_method_not_found());
        assert!(missing.data.is_none());
    }
}

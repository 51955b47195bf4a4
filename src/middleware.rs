use crate::service::{Service, ServiceClient, ServiceServer, ServiceWithInterface};
use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::error::CallError;
use switchboard_core::{CallCtx, Interface, Method, Payload};

/// The invoke contract as a standalone callable, so middlewares can wrap it.
#[async_trait]
pub trait InvokeHandler: Send + Sync + 'static {
    async fn call(
        &self,
        ctx: &CallCtx,
        method: &Method,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError>;
}

pub type ServiceHandler = Arc<dyn InvokeHandler>;

/// Transforms one invoke contract into another. In a chain `[m0, m1, ..]`
/// passed to the decorate functions, `m0` is the outermost wrapper.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: ServiceHandler) -> ServiceHandler;
}

struct ServiceInvoke<S: ?Sized>(Arc<S>);

#[async_trait]
impl<S: Service + ?Sized> InvokeHandler for ServiceInvoke<S> {
    async fn call(
        &self,
        ctx: &CallCtx,
        method: &Method,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError> {
        self.0.invoke(ctx, method, input, output).await
    }
}

fn compose<S: Service + ?Sized>(svc: &Arc<S>, mws: &[Arc<dyn Middleware>]) -> ServiceHandler {
    let mut h: ServiceHandler = Arc::new(ServiceInvoke(svc.clone()));
    for mw in mws.iter().rev() {
        h = mw.wrap(h);
    }
    h
}

struct DecoratedService {
    name: String,
    h: ServiceHandler,
}

#[async_trait]
impl Service for DecoratedService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        ctx: &CallCtx,
        method: &Method,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError> {
        self.h.call(ctx, method, input, output).await
    }
}

struct DecoratedServiceWithInterface {
    inner: Arc<dyn ServiceWithInterface>,
    h: ServiceHandler,
}

#[async_trait]
impl Service for DecoratedServiceWithInterface {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(
        &self,
        ctx: &CallCtx,
        method: &Method,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError> {
        self.h.call(ctx, method, input, output).await
    }
}

impl ServiceWithInterface for DecoratedServiceWithInterface {
    fn interface(&self) -> Interface {
        self.inner.interface()
    }
}

/// Decorate a service's invoke with middlewares; `mws[0]` is outermost.
/// Name is preserved.
pub fn decorate_service(svc: Arc<dyn Service>, mws: &[Arc<dyn Middleware>]) -> Arc<dyn Service> {
    let h = compose(&svc, mws);
    Arc::new(DecoratedService { name: svc.name().to_string(), h })
}

/// Like [decorate_service], preserving the declared interface as well.
pub fn decorate_service_with_interface(
    svc: Arc<dyn ServiceWithInterface>,
    mws: &[Arc<dyn Middleware>],
) -> Arc<dyn ServiceWithInterface> {
    let h = compose(&svc, mws);
    Arc::new(DecoratedServiceWithInterface { inner: svc, h })
}

struct DecoratedClient {
    inner: Arc<dyn ServiceClient>,
    mws: Vec<Arc<dyn Middleware>>,
}

impl ServiceClient for DecoratedClient {
    fn make(&self, svc_name: &str) -> Arc<dyn Service> {
        decorate_service(self.inner.make(svc_name), &self.mws)
    }
}

/// Every service made by the returned client carries the middleware chain;
/// `mws[0]` is outermost.
pub fn decorate_client(
    client: Arc<dyn ServiceClient>,
    mws: Vec<Arc<dyn Middleware>>,
) -> Arc<dyn ServiceClient> {
    Arc::new(DecoratedClient { inner: client, mws })
}

struct DecoratedServer {
    inner: Arc<dyn ServiceServer>,
    mws: Vec<Arc<dyn Middleware>>,
}

impl ServiceServer for DecoratedServer {
    fn register(&self, svc: Arc<dyn ServiceWithInterface>) -> Result<(), CallError> {
        self.inner.register(decorate_service_with_interface(svc, &self.mws))
    }

    fn deregister(&self, svc_name: &str) -> Result<(), CallError> {
        self.inner.deregister(svc_name)
    }
}

/// Every service registered on the returned server carries the middleware
/// chain; `mws[0]` is outermost.
pub fn decorate_server(
    server: Arc<dyn ServiceServer>,
    mws: Vec<Arc<dyn Middleware>>,
) -> Arc<dyn ServiceServer> {
    Arc::new(DecoratedServer { inner: server, mws })
}

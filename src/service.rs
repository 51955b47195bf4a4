use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::error::{CallError, MisuseError};
use switchboard_core::{is_valid_service_name, CallCtx, Interface, Method, Payload};

/// An entity whose methods can be invoked; may be local or remote.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Invoke one method. `input` and `output` must satisfy the method's
    /// type assertions; violations are programmer errors and panic.
    ///
    /// Only when `Ok(())` is returned does `output` hold the result
    /// (mutated in place).
    async fn invoke(
        &self,
        ctx: &CallCtx,
        method: &Method,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError>;
}

/// A [Service] that additionally exposes the interface it implements.
///
/// The exposed interface may be a subset of the service's full method set.
/// Server registration requires this form because a server must be able to
/// enumerate the callable methods.
pub trait ServiceWithInterface: Service {
    fn interface(&self) -> Interface;
}

/// Server side of a service: registers services so they can be called.
pub trait ServiceServer: Send + Sync + 'static {
    /// Register a service; only methods in its interface become callable.
    /// Registering a second service under the same name fails with
    /// [CallError::SvcNameConflict].
    fn register(&self, svc: Arc<dyn ServiceWithInterface>) -> Result<(), CallError>;

    /// Deregister by name; unknown names are not an error.
    fn deregister(&self, svc_name: &str) -> Result<(), CallError>;
}

/// Client side of a service: makes call handles.
pub trait ServiceClient: Send + Sync + 'static {
    /// Create a handle on the service named `svc_name`.
    ///
    /// Panics when the name is invalid; resolution happens lazily at invoke
    /// time.
    fn make(&self, svc_name: &str) -> Arc<dyn Service>;
}

impl<T: ServiceClient + ?Sized> ServiceClient for Arc<T> {
    #[inline]
    fn make(&self, svc_name: &str) -> Arc<dyn Service> {
        (**self).make(svc_name)
    }
}

/// A method-level handler. Input and output are type-erased; the [Method]
/// descriptor provides the type checks before a handler runs.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: &CallCtx,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError>;
}

/// Adapts a plain closure (no await points) into a [MethodHandler].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F> MethodHandler for HandlerFn<F>
where
    F: Fn(&CallCtx, &dyn Payload, &mut dyn Payload) -> Result<(), CallError>
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        ctx: &CallCtx,
        input: &dyn Payload,
        output: &mut dyn Payload,
    ) -> Result<(), CallError> {
        (self.0)(ctx, input, output)
    }
}

/// A service implemented in-process by a set of `(Method, handler)` pairs.
///
/// Pairs registered later win the method name in the interface view, the way
/// repeated map assignment would; handlers stay addressable by method
/// identity.
pub struct LocalService {
    name: String,
    methods: HashMap<String, Method>,
    handlers: HashMap<Method, Arc<dyn MethodHandler>>,
}

impl LocalService {
    /// Panics when `name` is not a valid service name.
    pub fn new<P>(name: &str, pairs: P) -> Arc<Self>
    where
        P: IntoIterator<Item = (Method, Arc<dyn MethodHandler>)>,
    {
        if !is_valid_service_name(name) {
            panic!("{}", MisuseError::BadSvcName);
        }
        let mut methods = HashMap::new();
        let mut handlers = HashMap::new();
        for (method, handler) in pairs {
            methods.insert(method.name().to_string(), method.clone());
            handlers.insert(method, handler);
        }
        Arc::new(Self { name: name.to_string(), methods, handlers })
    }
}

#[async_trait]
impl Service for LocalService {
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
        let Some(handler) = self.handlers.get(method) else {
            return Err(CallError::MethodNotFound);
        };
        method.assert_input_type(input);
        method.assert_output_type(output);
        handler.handle(ctx, input, output).await
    }
}

impl ServiceWithInterface for LocalService {
    fn interface(&self) -> Interface {
        Interface::new(self.methods.values().map(Interface::from))
    }
}

struct BoundService<S: ?Sized> {
    inner: Arc<S>,
    itf: Interface,
}

#[async_trait]
impl<S: Service + ?Sized> Service for BoundService<S> {
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
        self.inner.invoke(ctx, method, input, output).await
    }
}

impl<S: Service + ?Sized> ServiceWithInterface for BoundService<S> {
    fn interface(&self) -> Interface {
        self.itf.clone()
    }
}

/// Bind an interface to a service that does not declare one.
pub fn bind_interface(svc: Arc<dyn Service>, itf: Interface) -> Arc<dyn ServiceWithInterface> {
    Arc::new(BoundService { inner: svc, itf })
}

/// Bind a narrower (or equal) interface to a service that already declares
/// one. Every method of `itf` must be a member of the service's current
/// interface; a violation is a construction-time panic.
pub fn narrow_interface(
    svc: Arc<dyn ServiceWithInterface>,
    itf: Interface,
) -> Arc<dyn ServiceWithInterface> {
    let cur = svc.interface();
    for m in itf.methods() {
        if !cur.has_method(&m) {
            panic!("{}", CallError::MethodNotFound);
        }
    }
    Arc::new(BoundService { inner: svc, itf })
}

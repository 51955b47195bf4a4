use crate::service::{Service, ServiceClient, ServiceServer, ServiceWithInterface};
use async_trait::async_trait;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use switchboard_core::error::{CallError, MisuseError};
use switchboard_core::{is_valid_service_name, CallCtx, Method, Payload};

/// A name->service table. One process-global instance backs
/// [inproc_server] / [inproc_client]; tests that need isolation construct
/// their own with [Registry::new] and use the `with_registry` constructors.
pub struct Registry {
    svcs: RwLock<HashMap<String, Arc<dyn ServiceWithInterface>>>,
}

static GLOBAL: LazyLock<Arc<Registry>> = LazyLock::new(Registry::new);

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { svcs: RwLock::new(HashMap::new()) })
    }

    fn register(&self, svc: Arc<dyn ServiceWithInterface>) -> Result<(), CallError> {
        let mut svcs = self.svcs.write().unwrap();
        if svcs.contains_key(svc.name()) {
            return Err(CallError::SvcNameConflict);
        }
        svcs.insert(svc.name().to_string(), svc);
        Ok(())
    }

    fn deregister(&self, svc_name: &str) {
        self.svcs.write().unwrap().remove(svc_name);
    }

    // The lock is held for the lookup only, never while invoking.
    fn lookup(&self, svc_name: &str) -> Option<Arc<dyn ServiceWithInterface>> {
        self.svcs.read().unwrap().get(svc_name).cloned()
    }
}

/// Server registering services for same-process callers.
#[derive(Clone)]
pub struct InprocServer {
    reg: Arc<Registry>,
}

/// Create an in-process server over the process-global registry.
pub fn inproc_server() -> InprocServer {
    InprocServer::with_registry(GLOBAL.clone())
}

impl InprocServer {
    pub fn with_registry(reg: Arc<Registry>) -> Self {
        Self { reg }
    }
}

impl ServiceServer for InprocServer {
    fn register(&self, svc: Arc<dyn ServiceWithInterface>) -> Result<(), CallError> {
        debug!("inproc: register service {:?}", svc.name());
        self.reg.register(svc)
    }

    fn deregister(&self, svc_name: &str) -> Result<(), CallError> {
        self.reg.deregister(svc_name);
        Ok(())
    }
}

/// Client reaching services registered in the same process.
#[derive(Clone)]
pub struct InprocClient {
    reg: Arc<Registry>,
}

/// Create an in-process client over the process-global registry.
pub fn inproc_client() -> InprocClient {
    InprocClient::with_registry(GLOBAL.clone())
}

impl InprocClient {
    pub fn with_registry(reg: Arc<Registry>) -> Self {
        Self { reg }
    }
}

impl ServiceClient for InprocClient {
    fn make(&self, svc_name: &str) -> Arc<dyn Service> {
        if !is_valid_service_name(svc_name) {
            panic!("{}", MisuseError::BadSvcName);
        }
        Arc::new(InprocClientService { name: svc_name.to_string(), reg: self.reg.clone() })
    }
}

struct InprocClientService {
    name: String,
    reg: Arc<Registry>,
}

#[async_trait]
impl Service for InprocClientService {
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
        let Some(svc) = self.reg.lookup(&self.name) else {
            return Err(CallError::SvcNotFound);
        };
        svc.invoke(ctx, method, input, output).await
    }
}

/// A client that consults the in-process registry first and falls back to an
/// alternate client when the service is not registered locally.
pub struct InprocFirstClient {
    reg: Arc<Registry>,
    alt: Arc<dyn ServiceClient>,
}

/// Create an inproc-first client over the process-global registry.
///
/// Panics when `alt` is the bare in-process client: the fallback would just
/// look up the same registry again.
pub fn new_inproc_first_client<C: ServiceClient>(alt: C) -> InprocFirstClient {
    InprocFirstClient::with_registry(GLOBAL.clone(), alt)
}

impl InprocFirstClient {
    pub fn with_registry<C: ServiceClient>(reg: Arc<Registry>, alt: C) -> Self {
        if TypeId::of::<C>() == TypeId::of::<InprocClient>() {
            panic!("{}", MisuseError::AltIsInprocClient);
        }
        Self { reg, alt: Arc::new(alt) }
    }
}

impl ServiceClient for InprocFirstClient {
    fn make(&self, svc_name: &str) -> Arc<dyn Service> {
        if !is_valid_service_name(svc_name) {
            panic!("{}", MisuseError::BadSvcName);
        }
        Arc::new(InprocFirstService {
            name: svc_name.to_string(),
            reg: self.reg.clone(),
            fallback: self.alt.make(svc_name),
        })
    }
}

struct InprocFirstService {
    name: String,
    reg: Arc<Registry>,
    fallback: Arc<dyn Service>,
}

#[async_trait]
impl Service for InprocFirstService {
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
        match self.reg.lookup(&self.name) {
            Some(svc) => svc.invoke(ctx, method, input, output).await,
            None => self.fallback.invoke(ctx, method, input, output).await,
        }
    }
}

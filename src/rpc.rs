use crate::protocol::{
    ClientProtocol, ClientProtocolFactory, InputPhase, ReqPhase, ServerProtocol,
    ServerProtocolFactory,
};
use crate::service::{Service, ServiceClient, ServiceServer, ServiceWithInterface};
use crate::transport::{TransportClient, TransportHandler, TransportRequestor, TransportServer};
use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::error::{CallError, MisuseError};
use switchboard_core::{is_valid_service_name, CallCtx, Interface, Method, Payload};

/// A [ServiceServer] that exposes registered services over a transport,
/// speaking the protocol produced by the factory.
pub struct RpcServer {
    protocol: Arc<dyn ServerProtocolFactory>,
    transport: Arc<dyn TransportServer>,
}

/// Create an RPC server; services registered here are reachable by the
/// matching [new_rpc_client].
pub fn new_rpc_server(
    protocol: Arc<dyn ServerProtocolFactory>,
    transport: Arc<dyn TransportServer>,
) -> RpcServer {
    RpcServer { protocol, transport }
}

impl ServiceServer for RpcServer {
    fn register(&self, svc: Arc<dyn ServiceWithInterface>) -> Result<(), CallError> {
        let name = svc.name().to_string();
        debug!("rpc server: register service {:?}", name);
        let handler = Arc::new(RpcServerHandler {
            itf: svc.interface(),
            svc,
            protocol: self.protocol.clone(),
        });
        self.transport.register(&name, handler)
    }

    fn deregister(&self, svc_name: &str) -> Result<(), CallError> {
        debug!("rpc server: deregister service {:?}", svc_name);
        self.transport.deregister(svc_name)
    }
}

struct RpcServerHandler {
    svc: Arc<dyn ServiceWithInterface>,
    itf: Interface,
    protocol: Arc<dyn ServerProtocolFactory>,
}

#[async_trait]
impl TransportHandler for RpcServerHandler {
    async fn handle(&self, ctx: CallCtx, req: &[u8], resp: &mut Vec<u8>) -> Result<(), CallError> {
        let mut protocol = self.protocol.protocol();

        // parse the envelope: method name and passthru
        let (method_name, passthru) = match protocol.process_request(resp, req)? {
            ReqPhase::Done => return Ok(()),
            ReqPhase::Call { method, passthru } => (method, passthru),
        };

        // look the method up
        let Some(method) = self.itf.method_by_name(&method_name) else {
            return protocol.process_method_not_found(resp, &method_name);
        };

        // input
        let mut input = method.gen_input();
        match protocol.process_input(resp, input.as_mut())? {
            InputPhase::Done => return Ok(()),
            InputPhase::Ready => {}
        }

        // invoke
        let ctx = match passthru {
            Some(kv) if !kv.is_empty() => ctx.with_passthru(kv),
            _ => ctx,
        };
        let mut output = method.gen_output();
        let result = self.svc.invoke(&ctx, &method, input.as_ref(), output.as_mut()).await;
        // invoke already checked the output type, no need to check here

        // output
        protocol.process_output(resp, output.as_ref(), result.as_ref().err())
    }
}

/// A [ServiceClient] that reaches remote services over a transport, speaking
/// the protocol produced by the factory.
pub struct RpcClient {
    protocol: Arc<dyn ClientProtocolFactory>,
    transport: Arc<dyn TransportClient>,
}

/// Create an RPC client for services registered on the matching
/// [new_rpc_server].
pub fn new_rpc_client(
    protocol: Arc<dyn ClientProtocolFactory>,
    transport: Arc<dyn TransportClient>,
) -> RpcClient {
    RpcClient { protocol, transport }
}

impl ServiceClient for RpcClient {
    fn make(&self, svc_name: &str) -> Arc<dyn Service> {
        if !is_valid_service_name(svc_name) {
            panic!("{}", MisuseError::BadSvcName);
        }
        Arc::new(RpcClientService {
            name: svc_name.to_string(),
            protocol: self.protocol.clone(),
            transport: self.transport.clone(),
        })
    }
}

struct RpcClientService {
    name: String,
    protocol: Arc<dyn ClientProtocolFactory>,
    transport: Arc<dyn TransportClient>,
}

#[async_trait]
impl Service for RpcClientService {
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
        method.assert_input_type(input);
        method.assert_output_type(output);

        let mut protocol = self.protocol.protocol();

        // discover an endpoint
        let requestor = self.transport.discover(ctx, &self.name).await?;

        // one request; the protocol writes the body
        let mut write_req = |req: &mut Vec<u8>| {
            protocol.process_input(req, method.name(), input, ctx.passthru())
        };
        let resp = requestor.invoke(ctx, &mut write_req).await?;

        // response -> output carrier
        protocol.process_output(&resp, output)
    }
}

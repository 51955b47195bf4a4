use crate::msg::*;
use serde_json::value::RawValue;
use serde_json::Value;
use switchboard::protocol::{
    ClientProtocol, ClientProtocolFactory, InputPhase, ReqPhase, ServerProtocol,
    ServerProtocolFactory,
};
use switchboard_core::error::{AppError, CallError};
use switchboard_core::{PassthruMap, Payload};
use uuid::Uuid;

/// Factory for the server side of the JSON-RPC 2.0 protocol.
#[derive(Default, Clone, Copy)]
pub struct ServerFactory;

/// Factory for the client side of the JSON-RPC 2.0 protocol.
#[derive(Default, Clone, Copy)]
pub struct ClientFactory;

impl ServerProtocolFactory for ServerFactory {
    fn protocol(&self) -> Box<dyn ServerProtocol> {
        Box::new(JsonServerProtocol::default())
    }
}

impl ClientProtocolFactory for ClientFactory {
    fn protocol(&self) -> Box<dyn ClientProtocol> {
        Box::new(JsonClientProtocol::default())
    }
}

#[derive(Default)]
struct JsonServerProtocol {
    // request id: shape-checked only, echoed back verbatim
    id: Option<Box<RawValue>>,
    // params: decoded lazily against the input carrier
    params: Option<Box<RawValue>>,
}

impl JsonServerProtocol {
    fn write_error(
        &self,
        resp: &mut Vec<u8>,
        code: i32,
        message: &str,
        data: Option<Value>,
    ) -> Result<(), CallError> {
        let frame = RespFrame {
            jsonrpc: Ver20,
            result: None,
            error: Some(RespErrFrame { code, message, data }),
            id: self.id.as_deref(),
        };
        serde_json::to_writer(&mut *resp, &frame).map_err(|e| CallError::Encode(e.to_string()))
    }
}

impl ServerProtocol for JsonServerProtocol {
    fn process_request(&mut self, resp: &mut Vec<u8>, req: &[u8]) -> Result<ReqPhase, CallError> {
        let parsed: ReqParse = match serde_json::from_slice(req) {
            Ok(p) => p,
            Err(_) => {
                self.write_error(resp, CODE_PARSE_ERROR, MSG_PARSE_ERROR, None)?;
                return Ok(ReqPhase::Done);
            }
        };

        // id is required and must be a string or number; the JSON is already
        // known valid, so the first byte is enough to tell
        let Some(id) = parsed.id else {
            self.write_error(
                resp,
                CODE_INVALID_REQ,
                MSG_INVALID_REQ,
                Some(Value::from(DATA_MISSING_ID)),
            )?;
            return Ok(ReqPhase::Done);
        };
        match id.get().as_bytes().first() {
            Some(b'"' | b'-' | b'0'..=b'9') => {}
            _ => {
                self.write_error(
                    resp,
                    CODE_INVALID_REQ,
                    MSG_INVALID_REQ,
                    Some(Value::from(DATA_BAD_ID_VALUE)),
                )?;
                return Ok(ReqPhase::Done);
            }
        }
        self.id = Some(id);

        // params must be an object or array when present
        if let Some(params) = parsed.params {
            match params.get().as_bytes().first() {
                Some(b'{' | b'[') => {}
                _ => {
                    self.write_error(
                        resp,
                        CODE_INVALID_REQ,
                        MSG_INVALID_REQ,
                        Some(Value::from(DATA_BAD_PARAM_VALUE)),
                    )?;
                    return Ok(ReqPhase::Done);
                }
            }
            self.params = Some(params);
        }

        let method = match parsed.method {
            Some(m) if !m.is_empty() => m,
            _ => {
                self.write_error(
                    resp,
                    CODE_INVALID_REQ,
                    MSG_INVALID_REQ,
                    Some(Value::from(DATA_MISSING_METHOD)),
                )?;
                return Ok(ReqPhase::Done);
            }
        };

        Ok(ReqPhase::Call { method, passthru: parsed.ctx })
    }

    fn process_method_not_found(
        &mut self,
        resp: &mut Vec<u8>,
        method_name: &str,
    ) -> Result<(), CallError> {
        self.write_error(
            resp,
            CODE_METHOD_NOT_FOUND,
            MSG_METHOD_NOT_FOUND,
            Some(Value::from(method_name)),
        )
    }

    fn process_input(
        &mut self,
        resp: &mut Vec<u8>,
        input: &mut dyn Payload,
    ) -> Result<InputPhase, CallError> {
        // absent params: skip, the carrier keeps its generated contents
        let Some(params) = self.params.take() else {
            return Ok(InputPhase::Ready);
        };
        let v: Value =
            serde_json::from_str(params.get()).map_err(|e| CallError::Decode(e.to_string()))?;
        if let Err(e) = input.set_from_value(v) {
            self.write_error(
                resp,
                CODE_INVALID_PARAMS,
                MSG_INVALID_PARAMS,
                Some(Value::from(e.to_string())),
            )?;
            return Ok(InputPhase::Done);
        }
        Ok(InputPhase::Ready)
    }

    fn process_output(
        &mut self,
        resp: &mut Vec<u8>,
        output: &dyn Payload,
        invoke_err: Option<&CallError>,
    ) -> Result<(), CallError> {
        let Some(err) = invoke_err else {
            let result = output.to_value()?;
            let frame = RespFrame {
                jsonrpc: Ver20,
                result: Some(&result),
                error: None,
                id: self.id.as_deref(),
            };
            return serde_json::to_writer(&mut *resp, &frame)
                .map_err(|e| CallError::Encode(e.to_string()));
        };
        // the business error goes inside the response
        self.write_error(resp, CODE_GENERAL_ERROR, MSG_GENERAL_ERROR, Some(Value::from(err.to_string())))
    }
}

#[derive(Default)]
struct JsonClientProtocol {
    // the request id, remembered to compare against the response
    id: String,
}

impl ClientProtocol for JsonClientProtocol {
    fn process_input(
        &mut self,
        req: &mut Vec<u8>,
        method_name: &str,
        input: &dyn Payload,
        passthru: Option<&PassthruMap>,
    ) -> Result<(), CallError> {
        // the uuid alphabet needs no JSON escaping, which the raw id echo
        // comparison in process_output relies on
        let id = Uuid::new_v4().to_string();
        let frame = ReqFrame {
            jsonrpc: Ver20,
            method: method_name,
            params: Some(input.to_value()?),
            id: &id,
            ctx: passthru.filter(|kv| !kv.is_empty()),
        };
        serde_json::to_writer(&mut *req, &frame).map_err(|e| CallError::Encode(e.to_string()))?;
        self.id = id;
        Ok(())
    }

    fn process_output(&mut self, resp: &[u8], output: &mut dyn Payload) -> Result<(), CallError> {
        let parsed: RespParse =
            serde_json::from_slice(resp).map_err(|e| CallError::Decode(e.to_string()))?;

        // an error response bypasses the id check
        if let Some(err) = parsed.error {
            if let Some(code) = err.code {
                let data = match err.data {
                    Some(raw) => Some(
                        serde_json::from_str(raw.get())
                            .map_err(|e| CallError::Decode(e.to_string()))?,
                    ),
                    None => None,
                };
                return Err(CallError::App(AppError { code, message: err.message, data }));
            }
        }

        let id_ok = parsed.id.as_deref().is_some_and(|id| {
            let s = id.get();
            s.len() >= 2 && s.starts_with('"') && s.ends_with('"') && &s[1..s.len() - 1] == self.id
        });
        if !id_ok {
            return Err(CallError::Protocol("request/response id mismatch".to_string()));
        }

        match parsed.result {
            // a success response without result leaves the carrier as
            // generated
            None => Ok(()),
            Some(raw) => {
                let v: Value = serde_json::from_str(raw.get())
                    .map_err(|e| CallError::Decode(e.to_string()))?;
                output.set_from_value(v)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct EchoMsg {
        msg: String,
    }

    fn server() -> Box<dyn ServerProtocol> {
        ServerProtocolFactory::protocol(&ServerFactory)
    }

    fn client() -> Box<dyn ClientProtocol> {
        ClientProtocolFactory::protocol(&ClientFactory)
    }

    fn parse(resp: &[u8]) -> Value {
        serde_json::from_slice(resp).expect("response should be valid json")
    }

    #[test]
    fn test_request_round_trip() {
        let mut c = client();
        let mut req = Vec::new();
        let input = EchoMsg { msg: "hi".to_string() };
        let passthru: PassthruMap =
            [("tenant".to_string(), "t1".to_string())].into_iter().collect();
        c.process_input(&mut req, "Echo", &input, Some(&passthru)).unwrap();

        let frame = parse(&req);
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["method"], "Echo");
        assert_eq!(frame["params"], json!({"msg": "hi"}));
        assert_eq!(frame["ctx"], json!({"tenant": "t1"}));
        assert!(frame["id"].is_string());

        let mut s = server();
        let mut resp = Vec::new();
        match s.process_request(&mut resp, &req).unwrap() {
            ReqPhase::Call { method, passthru } => {
                assert_eq!(method, "Echo");
                assert_eq!(passthru.unwrap().get("tenant").unwrap(), "t1");
            }
            other => panic!("unexpected phase: {:?}", other),
        }
        assert!(resp.is_empty());

        let mut carrier = EchoMsg::default();
        let phase = s.process_input(&mut resp, &mut carrier).unwrap();
        assert_eq!(phase, InputPhase::Ready);
        assert_eq!(carrier.msg, "hi");

        // success response echoes the request id and the client accepts it
        s.process_output(&mut resp, &carrier, None).unwrap();
        let rframe = parse(&resp);
        assert_eq!(rframe["id"], frame["id"]);
        assert_eq!(rframe["result"], json!({"msg": "hi"}));

        let mut output = EchoMsg::default();
        c.process_output(&resp, &mut output).unwrap();
        assert_eq!(output.msg, "hi");
    }

    #[test]
    fn test_parse_error() {
        let mut s = server();
        let mut resp = Vec::new();
        match s.process_request(&mut resp, b"{not json").unwrap() {
            ReqPhase::Done => {}
            other => panic!("unexpected phase: {:?}", other),
        }
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32700);
        assert_eq!(frame["error"]["message"], "Parse error");
        assert_eq!(frame["id"], Value::Null);
    }

    #[test]
    fn test_missing_id() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","params":{"msg":"hi"}}"#;
        match s.process_request(&mut resp, req).unwrap() {
            ReqPhase::Done => {}
            other => panic!("unexpected phase: {:?}", other),
        }
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32600);
        assert_eq!(frame["error"]["data"], "Missing field 'id'");
        assert_eq!(frame["id"], Value::Null);
    }

    #[test]
    fn test_bad_id_type() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":{"k":1}}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Done));
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32600);
        assert_eq!(frame["error"]["data"], "Field 'id' should be string or number");
    }

    #[test]
    fn test_numeric_id_accepted() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":42}"#;
        match s.process_request(&mut resp, req).unwrap() {
            ReqPhase::Call { method, passthru } => {
                assert_eq!(method, "Echo");
                assert!(passthru.is_none());
            }
            other => panic!("unexpected phase: {:?}", other),
        }
        // the numeric id is echoed verbatim
        let carrier = EchoMsg::default();
        s.process_output(&mut resp, &carrier, None).unwrap();
        assert_eq!(parse(&resp)["id"], 42);
    }

    #[test]
    fn test_bad_params() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":"1","params":"nope"}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Done));
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32600);
        assert_eq!(frame["error"]["data"], "Field 'param' should be object or array");
        // the id was already recorded, so the error echoes it
        assert_eq!(frame["id"], "1");
    }

    #[test]
    fn test_missing_method() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","id":"1"}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Done));
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32600);
        assert_eq!(frame["error"]["data"], "Missing field 'method'");
    }

    #[test]
    fn test_method_not_found_frame() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo.nope","id":"1"}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Call { .. }));
        s.process_method_not_found(&mut resp, "Echo.nope").unwrap();
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32601);
        assert_eq!(frame["error"]["message"], "Method not found");
        assert_eq!(frame["error"]["data"], "Echo.nope");
        assert_eq!(frame["id"], "1");
    }

    #[test]
    fn test_invalid_params_decode() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":"1","params":{"msg":123}}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Call { .. }));
        let mut carrier = EchoMsg::default();
        let phase = s.process_input(&mut resp, &mut carrier).unwrap();
        assert_eq!(phase, InputPhase::Done);
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -32602);
        assert_eq!(frame["error"]["message"], "Invalid params");
    }

    #[test]
    fn test_absent_params_skips_decode() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":"1"}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Call { .. }));
        let mut carrier = EchoMsg { msg: "generated".to_string() };
        assert_eq!(s.process_input(&mut resp, &mut carrier).unwrap(), InputPhase::Ready);
        assert_eq!(carrier.msg, "generated");
    }

    #[test]
    fn test_business_error_response() {
        let mut s = server();
        let mut resp = Vec::new();
        let req = br#"{"jsonrpc":"2.0","method":"Echo","id":"1","params":{"msg":"hi"}}"#;
        assert!(matches!(s.process_request(&mut resp, req).unwrap(), ReqPhase::Call { .. }));
        let carrier = EchoMsg::default();
        let err = CallError::App(AppError {
            code: 7,
            message: "boom".to_string(),
            data: None,
        });
        s.process_output(&mut resp, &carrier, Some(&err)).unwrap();
        let frame = parse(&resp);
        assert_eq!(frame["error"]["code"], -1);
        assert_eq!(frame["error"]["message"], "General error");
        assert_eq!(frame["error"]["data"], "boom (code 7)");
        assert!(frame.get("result").is_none());
    }

    #[test]
    fn test_client_decodes_app_error() {
        let mut c = client();
        let mut req = Vec::new();
        c.process_input(&mut req, "Echo", &EchoMsg::default(), None).unwrap();

        let resp = br#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found","data":"Echo"},"id":null}"#;
        let mut output = EchoMsg::default();
        let err = c.process_output(resp, &mut output).unwrap_err();
        match err {
            CallError::App(app) => {
                assert_eq!(app.code, -32601);
                assert_eq!(app.message, "Method not found");
                assert_eq!(app.data, Some(json!("Echo")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_client_id_mismatch() {
        let mut c = client();
        let mut req = Vec::new();
        c.process_input(&mut req, "Echo", &EchoMsg::default(), None).unwrap();

        let resp = br#"{"jsonrpc":"2.0","result":{"msg":"hi"},"id":"someone-else"}"#;
        let mut output = EchoMsg::default();
        let err = c.process_output(resp, &mut output).unwrap_err();
        assert_eq!(err, CallError::Protocol("request/response id mismatch".to_string()));
    }

    #[test]
    fn test_client_omits_empty_passthru() {
        let mut c = client();
        let mut req = Vec::new();
        let empty = PassthruMap::new();
        c.process_input(&mut req, "Echo", &EchoMsg::default(), Some(&empty)).unwrap();
        let frame = parse(&req);
        assert!(frame.get("ctx").is_none());
    }
}

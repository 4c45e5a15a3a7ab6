//! JSON-RPC dispatch for one server session.

use kioku_core::VersionStore;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::protocol;
use crate::protocol::CallToolParams;
use crate::protocol::JsonRpcRequest;
use crate::protocol::OutgoingMessage;
use crate::session::SessionContext;
use crate::tools;
use crate::tools::ToolError;

pub struct MessageProcessor {
    store: VersionStore,
    session: SessionContext,
}

impl MessageProcessor {
    pub fn new(store: VersionStore, session: SessionContext) -> Self {
        Self { store, session }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Handle one raw input line. `None` means nothing should be written
    /// back (notifications).
    pub fn process_line(&mut self, line: &str) -> Option<OutgoingMessage> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return Some(OutgoingMessage::error(
                    None,
                    protocol::PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
            }
        };
        self.process(request)
    }

    pub fn process(&mut self, request: JsonRpcRequest) -> Option<OutgoingMessage> {
        debug!(method = request.method, "incoming request");
        if request.jsonrpc != protocol::JSONRPC_VERSION {
            return Some(OutgoingMessage::error(
                request.id,
                protocol::INVALID_REQUEST,
                "unsupported jsonrpc version",
            ));
        }

        // Notifications get no reply.
        let Some(id) = request.id else {
            debug!(method = request.method, "notification ignored");
            return None;
        };

        let message = match request.method.as_str() {
            "initialize" => OutgoingMessage::response(
                id,
                protocol::initialize_result("kioku-mcp-server", env!("CARGO_PKG_VERSION")),
            ),
            "ping" => OutgoingMessage::response(id, json!({})),
            "tools/list" => {
                OutgoingMessage::response(id, json!({ "tools": tools::definitions() }))
            }
            "tools/call" => self.call_tool(id, request.params),
            other => OutgoingMessage::error(
                Some(id),
                protocol::METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            ),
        };
        Some(message)
    }

    fn call_tool(
        &mut self,
        id: protocol::RequestId,
        params: Option<Value>,
    ) -> OutgoingMessage {
        let params: CallToolParams = match params
            .ok_or_else(|| "missing params".to_string())
            .and_then(|p| serde_json::from_value(p).map_err(|e| e.to_string()))
        {
            Ok(params) => params,
            Err(message) => {
                return OutgoingMessage::error(Some(id), protocol::INVALID_PARAMS, message);
            }
        };
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        match tools::call(&mut self.store, &self.session, &params.name, &arguments) {
            Ok((payload, is_error)) => {
                OutgoingMessage::response(id, protocol::call_tool_result(&payload, is_error))
            }
            Err(ToolError::UnknownTool(name)) => OutgoingMessage::error(
                Some(id),
                protocol::INVALID_PARAMS,
                format!("unknown tool: {name}"),
            ),
            Err(ToolError::InvalidParams(message)) => {
                OutgoingMessage::error(Some(id), protocol::INVALID_PARAMS, message)
            }
        }
    }
}

use crate::broadcast::GatewayBroadcaster;
use crate::handlers::MethodHandlers;
use crate::protocol::*;
use anyhow::{Context, Result};
use futures_util::{sink::SinkExt, stream::StreamExt};
use lobby_core::GatewayConfig;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

const MAX_PAYLOAD: usize = 64 * 1024;

/// Per-connection subscription state
#[derive(Debug, Default)]
pub struct Subscription {
    tenants: HashSet<String>,
}

impl Subscription {
    pub fn subscribe(&mut self, tenant: String) -> bool {
        self.tenants.insert(tenant)
    }

    /// Whether this connection should receive `event`
    pub fn wants(&self, event: &GatewayEvent, require_tenant_subscription: bool) -> bool {
        match &event.tenant {
            None => true,
            Some(tenant) if self.tenants.contains(tenant) => true,
            Some(_) => !require_tenant_subscription && self.tenants.is_empty(),
        }
    }
}

/// Gateway server
pub struct GatewayServer {
    config: GatewayConfig,
    handlers: Arc<MethodHandlers>,
    broadcaster: GatewayBroadcaster,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        handlers: Arc<MethodHandlers>,
        broadcaster: GatewayBroadcaster,
    ) -> Self {
        Self {
            config,
            handlers,
            broadcaster,
        }
    }

    /// Bind the configured address and serve forever
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind gateway on {}", addr))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Gateway server listening on {}{}",
            listener.local_addr()?,
            self.config.ws_path
        );

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let handlers = self.handlers.clone();
            let event_rx = self.broadcaster.subscribe();
            let ws_path = self.config.ws_path.clone();
            let require_tenant_subscription = self.config.require_tenant_subscription;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(
                    stream,
                    addr.to_string(),
                    handlers,
                    event_rx,
                    ws_path,
                    require_tenant_subscription,
                )
                .await
                {
                    tracing::error!("Connection error: {}", e);
                }
            });
        }
    }
}

// Handle a WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: String,
    handlers: Arc<MethodHandlers>,
    mut event_rx: broadcast::Receiver<GatewayEvent>,
    ws_path: String,
    require_tenant_subscription: bool,
) -> Result<()> {
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == ws_path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some(format!(
                "No WebSocket endpoint at {}",
                request.uri().path()
            )));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .context("WebSocket handshake failed")?;

    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connection {} established from {}", conn_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let hello_payload = serde_json::to_value(create_hello_ok(&conn_id, require_tenant_subscription))?;
    let hello_response =
        GatewayFrame::Response(GatewayResponse::ok("hello".to_string(), hello_payload));
    ws_sender
        .send(Message::Text(serde_json::to_string(&hello_response)?.into()))
        .await?;

    let mut subscription = Subscription::default();

    loop {
        tokio::select! {
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if msg.is_text() {
                            let text = msg.to_text()?;
                            tracing::debug!("Received message: {}", text);

                            let response = match serde_json::from_str::<GatewayFrame>(text) {
                                Ok(GatewayFrame::Request(request)) => {
                                    handle_request(&request, &handlers, &mut subscription).await
                                }
                                Ok(_) => GatewayResponse::error(
                                    String::new(),
                                    ProtocolError::new(
                                        ProtocolError::INVALID_REQUEST,
                                        "Only request frames are accepted",
                                    ),
                                ),
                                Err(e) => GatewayResponse::error(
                                    String::new(),
                                    ProtocolError::new(
                                        ProtocolError::INVALID_REQUEST,
                                        format!("Malformed frame: {}", e),
                                    ),
                                ),
                            };

                            let response_msg = serde_json::to_string(&GatewayFrame::Response(response))?;
                            ws_sender.send(Message::Text(response_msg.into())).await?;
                        } else if msg.is_close() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Ok(event) => {
                        if subscription.wants(&event, require_tenant_subscription) {
                            let event_msg = serde_json::to_string(&GatewayFrame::Event(event))?;
                            ws_sender.send(Message::Text(event_msg.into())).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection {} lagged, skipped {} events", conn_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Event channel closed");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("Connection {} closed", conn_id);
    Ok(())
}

/// Route one request
async fn handle_request(
    request: &GatewayRequest,
    handlers: &MethodHandlers,
    subscription: &mut Subscription,
) -> GatewayResponse {
    if request.id.trim().is_empty() {
        return GatewayResponse::error(
            request.id.clone(),
            ProtocolError::new(ProtocolError::INVALID_REQUEST, "Request id cannot be empty"),
        );
    }

    let result = match request.method.as_str() {
        "health" => handlers.health(request).await,
        "presence.connect" => handlers.connect(request).await,
        "presence.disconnect" => handlers.disconnect(request).await,
        "presence.list" => handlers.list_online(request).await,
        "presence.subscribe" => subscribe(request, subscription),
        "lobby.push" => handlers.push(request).await,
        _ => Err(ProtocolError::new(
            ProtocolError::NOT_FOUND,
            format!("Unknown method: {}", request.method),
        )),
    };

    match result {
        Ok(payload) => GatewayResponse::ok(request.id.clone(), payload),
        Err(error) => GatewayResponse::error(request.id.clone(), error),
    }
}

fn subscribe(request: &GatewayRequest, subscription: &mut Subscription) -> Result<serde_json::Value, ProtocolError> {
    let params: TenantParams = request.parse_params()?;
    lobby_presence::TenantId::parse(&params.tenant_id)?;
    subscription.subscribe(params.tenant_id.clone());
    Ok(serde_json::json!({ "subscribed": params.tenant_id }))
}

/// Create hello-ok payload
fn create_hello_ok(connection_id: &str, require_tenant_subscription: bool) -> HelloOkPayload {
    HelloOkPayload {
        protocol: ProtocolVersion { min: 1, max: 1 },
        version: env!("CARGO_PKG_VERSION").to_string(),
        connection_id: connection_id.to_string(),
        policy: GatewayPolicy {
            max_payload: MAX_PAYLOAD,
            require_tenant_subscription,
        },
    }
}

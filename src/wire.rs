//! Newline-delimited JSON adapter over TCP.
//!
//! One request object per line, tagged by `"op"`; one response object per
//! line. The adapter translates between JSON and the engine's types and maps
//! error kinds to stable codes. It holds no booking logic.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Ping,
    CreateAppointment {
        client_name: String,
        start: Ms,
        end: Ms,
        #[serde(default)]
        products: Vec<Ulid>,
    },
    UpdateAppointment {
        id: Ulid,
        client_name: String,
        start: Ms,
        end: Ms,
        #[serde(default)]
        products: Vec<Ulid>,
    },
    CancelAppointment {
        id: Ulid,
    },
    GetAppointment {
        id: Ulid,
    },
    ListAppointments,
    TotalPrice {
        id: Ulid,
    },
    CreateProduct {
        name: String,
        price: Amount,
        #[serde(default)]
        description: Option<String>,
    },
    UpdateProduct {
        id: Ulid,
        name: String,
        price: Amount,
        #[serde(default)]
        description: Option<String>,
    },
    DeleteProduct {
        id: Ulid,
    },
    GetProduct {
        id: Ulid,
    },
    ListProducts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody { code: code.to_string(), message: message.into() }),
        }
    }

    fn encode(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"ok":false,"error":{"code":"internal","message":"unencodable response"}}"#.into())
    }
}

pub fn error_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidWindow(_) => "invalid_window",
        EngineError::SchedulingConflict(_) => "scheduling_conflict",
        EngineError::ProductNotFound(_) => "product_not_found",
        EngineError::NotFound(_) => "not_found",
        EngineError::DuplicateName(_) => "duplicate_name",
        EngineError::InvalidInput(_) => "invalid_input",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::Aborted | EngineError::Storage(_) => "storage_error",
    }
}

impl From<&EngineError> for Response {
    fn from(e: &EngineError) -> Self {
        Response::error(error_code(e), e.to_string())
    }
}

async fn execute(engine: &Engine, req: Request) -> Result<Value, EngineError> {
    let data = match req {
        Request::Ping => json!({ "status": "ok", "service": "slotbook" }),
        Request::CreateAppointment { client_name, start, end, products } => {
            let candidate = NewAppointment { client_name, start, end, product_ids: products };
            json!(engine.create_appointment(candidate).await?)
        }
        Request::UpdateAppointment { id, client_name, start, end, products } => {
            let candidate = NewAppointment { client_name, start, end, product_ids: products };
            json!(engine.update_appointment(id, candidate).await?)
        }
        Request::CancelAppointment { id } => {
            engine.cancel_appointment(id).await?;
            json!({ "cancelled": id })
        }
        Request::GetAppointment { id } => json!(engine.get_appointment(id).await?),
        Request::ListAppointments => {
            let appointments = engine.list_appointments().await?;
            json!({ "total": appointments.len(), "appointments": appointments })
        }
        Request::TotalPrice { id } => {
            let total = engine.total_price(id).await?;
            json!({ "appointment_id": id, "total": total })
        }
        Request::CreateProduct { name, price, description } => {
            json!(engine.create_product(NewProduct { name, price, description }).await?)
        }
        Request::UpdateProduct { id, name, price, description } => {
            json!(engine.update_product(id, NewProduct { name, price, description }).await?)
        }
        Request::DeleteProduct { id } => {
            engine.delete_product(id).await?;
            json!({ "deleted": id })
        }
        Request::GetProduct { id } => json!(engine.get_product(id).await?),
        Request::ListProducts => {
            let products = engine.list_products().await?;
            json!({ "total": products.len(), "products": products })
        }
    };
    Ok(data)
}

/// Decode, execute under `timeout` and encode one request line.
pub async fn handle_line(engine: &Engine, line: &str, timeout: Duration) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => return Response::error("bad_request", e.to_string()),
    };
    let op = observability::op_label(&req);
    let started = Instant::now();

    let response = match tokio::time::timeout(timeout, execute(engine, req)).await {
        Ok(Ok(data)) => Response::ok(data),
        Ok(Err(e)) => Response::from(&e),
        Err(_) => Response::error("timeout", format!("{op} exceeded {}ms", timeout.as_millis())),
    };

    let status = if response.ok { "ok" } else { "error" };
    metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    response
}

fn codec_io(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "request line too long")
        }
    }
}

/// Serve one client until it disconnects. An over-long line gets a
/// `bad_request` reply and closes the connection.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    request_timeout: Duration,
) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e @ LinesCodecError::MaxLineLengthExceeded) => {
                let reply = Response::error("bad_request", "request line too long");
                let _ = framed.send(reply.encode()).await;
                return Err(codec_io(e));
            }
            Err(e) => return Err(codec_io(e)),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&engine, &line, request_timeout).await;
        framed.send(response.encode()).await.map_err(codec_io)?;
    }
    Ok(())
}

//! HTTP request server.
//!
//! An actix-web server runs on its own named worker thread with a
//! single-threaded actix system, so the feeder's blocking workers never see
//! the async runtime.  Any path is accepted; the method picks the route:
//!
//! | Method    | Reply                                            |
//! |-----------|--------------------------------------------------|
//! | `GET`     | 200, status JSON                                 |
//! | `POST`    | 200, `{"success":true}` or `success:false` + msg |
//! | `OPTIONS` | 204, CORS headers only                           |
//! | other     | 405                                              |
//!
//! Commands run on actix's blocking pool, since a feed holds the caller for
//! the length of its sequence.  `stop()` signals the server handle over a
//! oneshot channel and joins the thread.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use actix_web::http::{KeepAlive, header};
use actix_web::middleware::DefaultHeaders;
use actix_web::{App, HttpResponse, HttpServer, web};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::app::ports::{CommandReply, RequestHandler, Worker};
use crate::config::ServerConfig;
use crate::error::{IoError, Result};
use crate::worker::{FaultGuard, SERVER_STACK_KB, WorkerSlot, spawn_worker};

const WORKER_NAME: &str = "request-server";

/// Largest POST body accepted; bigger ones get 413.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Reply envelope for POST.
#[derive(Debug, Serialize)]
struct Reply<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

pub struct RequestServer {
    handler: Arc<dyn RequestHandler>,
    local_addr: SocketAddr,
    request_timeout: Duration,
    running: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    slot: Mutex<WorkerSlot<TcpListener>>,
}

impl RequestServer {
    /// Bind the listener.  Serving starts with [`Worker::start`].
    pub fn bind(config: &ServerConfig, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address)
            .map_err(|e| IoError::Socket(format!("bind {}: {e}", config.bind_address)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| IoError::Socket(e.to_string()))?;
        info!("Request server bound to {}", local_addr);
        Ok(Self {
            handler,
            local_addr,
            request_timeout: Duration::from_millis(config.read_timeout_ms),
            running: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            shutdown: Mutex::new(None),
            slot: Mutex::new(WorkerSlot::Idle(listener)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Worker for RequestServer {
    fn name(&self) -> &'static str {
        WORKER_NAME
    }

    fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.has_handle() {
            if self.running.load(Ordering::Acquire) {
                return Ok(());
            }
            slot.reap(WORKER_NAME);
        }
        let Some(listener) = slot.take_idle() else {
            self.healthy.store(false, Ordering::Release);
            return Err(IoError::Socket("listener lost".into()).into());
        };
        // actix takes ownership of what it serves; the original stays with
        // us so a stopped server can start again on the same port.
        let serving = match listener.try_clone() {
            Ok(serving) => serving,
            Err(e) => {
                *slot = WorkerSlot::Idle(listener);
                return Err(IoError::Socket(format!("clone listener: {e}")).into());
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let healthy = Arc::clone(&self.healthy);
        let handler = Arc::clone(&self.handler);
        let request_timeout = self.request_timeout;
        match spawn_worker(WORKER_NAME, SERVER_STACK_KB, move || {
            let _guard = FaultGuard::new(WORKER_NAME, || {
                running.store(false, Ordering::Release);
                healthy.store(false, Ordering::Release);
            });
            if let Err(e) = serve(serving, handler, request_timeout, shutdown_rx) {
                error!("HTTP server error: {}", e);
                healthy.store(false, Ordering::Release);
            }
            running.store(false, Ordering::Release);
            listener
        }) {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn stop(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !slot.has_handle() {
            return;
        }
        if let Some(tx) = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).take() {
            // Err means the server already exited on its own.
            let _ = tx.send(());
        }
        slot.reap(WORKER_NAME);
        self.running.store(false, Ordering::Release);
        info!("Request server stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

impl Drop for RequestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the actix system on the calling thread until `shutdown` fires.
fn serve(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    request_timeout: Duration,
    shutdown: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;
    actix_web::rt::System::new().block_on(async move {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::from(Arc::clone(&handler)))
                .app_data(web::PayloadConfig::new(MAX_BODY_SIZE))
                .wrap(
                    DefaultHeaders::new()
                        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
                        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")),
                )
                .configure(routes)
        })
        .workers(1)
        .keep_alive(KeepAlive::Disabled)
        .client_request_timeout(request_timeout)
        .disable_signals()
        .listen(listener)?
        .run();

        let server_handle = server.handle();
        actix_web::rt::spawn(async move {
            let _ = shutdown.await;
            server_handle.stop(true).await;
        });

        info!("Serving requests");
        server.await
    })
}

/// Method table for every path.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/{tail:.*}")
            .route(web::get().to(status))
            .route(web::post().to(command))
            .route(web::method(actix_web::http::Method::OPTIONS).to(preflight))
            .default_service(web::to(not_allowed)),
    );
}

async fn status(handler: web::Data<dyn RequestHandler>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(header::ContentType::json())
        .body(handler.status_json())
}

async fn command(handler: web::Data<dyn RequestHandler>, body: web::Bytes) -> HttpResponse {
    let Ok(body) = String::from_utf8(body.to_vec()) else {
        warn!("Rejected non-UTF-8 request body");
        return HttpResponse::BadRequest().json(Reply {
            success: false,
            message: Some("body is not UTF-8"),
        });
    };
    let handler = handler.into_inner();
    match web::block(move || handler.handle_command(&body)).await {
        Ok(CommandReply::Accepted) => HttpResponse::Ok().json(Reply {
            success: true,
            message: None,
        }),
        Ok(CommandReply::Rejected(message)) => HttpResponse::Ok().json(Reply {
            success: false,
            message: Some(message.as_str()),
        }),
        Err(e) => {
            error!("Command handler failed: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn not_allowed(req: actix_web::HttpRequest) -> HttpResponse {
    debug!("Method {} not allowed", req.method());
    HttpResponse::MethodNotAllowed().finish()
}

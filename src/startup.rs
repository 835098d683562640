use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use tracing_actix_web::TracingLogger;

use crate::health::SyncStatus;

async fn health_check(status: web::Data<SyncStatus>) -> impl Responder {
    HttpResponse::Ok().json(status.snapshot())
}

/// Health surface of the controller: a single endpoint reporting process
/// liveness and the sync counters.
pub fn run(listener: TcpListener, status: Arc<SyncStatus>) -> Result<Server, std::io::Error> {
    let status = web::Data::from(status);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .service(web::resource("/health_check").route(web::get().to(health_check)))
            .app_data(status.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::queue::JobQueue;
use crate::routes::{
    health_handler, json_error_handler, languages_handler, query_error_handler,
    queue_stats_handler, result_handler, status_handler, submit_handler, terminal_ws_handler,
};
use crate::submission::SubmissionRegistry;
use crate::terminal::TerminalHub;

pub fn build_server(
    server_config: ServerConfig,
    registry: Arc<SubmissionRegistry>,
    hub: Arc<TerminalHub>,
    job_queue: Arc<JobQueue>,
) -> std::io::Result<Server> {
    let registry = web::Data::from(registry);
    let hub = web::Data::from(hub);
    let job_queue = web::Data::from(job_queue); // Construct directly from Arc

    let server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .app_data(hub.clone())
            .app_data(job_queue.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .service(submit_handler)
            .service(status_handler)
            .service(result_handler)
            .service(queue_stats_handler)
            .service(languages_handler)
            .service(health_handler)
            .service(terminal_ws_handler)
    })
    .bind(("0.0.0.0", server_config.port))?
    .run();

    Ok(server)
}

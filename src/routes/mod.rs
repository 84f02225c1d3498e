// Route exports
pub mod swipes;

use actix_web::web;

pub use swipes::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(swipes::configure),
    );
}

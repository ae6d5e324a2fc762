use std::sync::{Arc, Mutex};

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use log::error;
use tera::{Context, Tera};

use crate::node::node_info::NodeInfo;
use crate::node::routing::RoutingState;
use crate::utils::config::Config;
use crate::utils::types::Address;

#[get("/")]
pub async fn index(
    state: web::Data<Arc<Mutex<RoutingState>>>,
    self_info: web::Data<NodeInfo>,
    config: web::Data<Config>,
) -> impl Responder {
    let tera = match Tera::new("static/html/**/*") {
        Ok(tera) => tera,
        Err(e) => return HttpResponse::InternalServerError().body(format!("template error: {}", e)),
    };

    let mut context = Context::new();
    context.insert("title", "Chord Node");
    context.insert("info", self_info.get_ref());
    context.insert("config", config.get_ref());
    {
        let guard = state.lock().unwrap();
        context.insert("fingers", &guard.finger_table().fingers);
        context.insert("successors", &guard.successor_list().successors);
        context.insert("predecessor", &guard.predecessor_option());
        context.insert("active", &guard.active());
        context.insert("in_ring", &guard.in_ring());
        context.insert("is_alone", &guard.is_alone(self_info.pos()));
    }

    match tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => HttpResponse::InternalServerError().body(format!("render error: {}", e)),
    }
}

/// Serves the routing dashboard on a dedicated actix system thread.
pub fn spawn_dashboard(
    address: Address,
    state: Arc<Mutex<RoutingState>>,
    self_info: NodeInfo,
    config: Config,
) {
    std::thread::spawn(move || {
        let result = actix_web::rt::System::new().block_on(async move {
            HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .app_data(web::Data::new(self_info.clone()))
                    .app_data(web::Data::new(config.clone()))
                    .service(index)
            })
            .bind(address.as_str())?
            .run()
            .await
        });
        if let Err(e) = result {
            error!("Dashboard failed: {}", e);
        }
    });
}

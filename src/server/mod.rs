use crate::cluster::DEFAULT_BASE_PATH;
use crate::group::GroupRegistry;
use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, get,
    web::{self, Data},
};
use log::{error, info};
use std::{net::TcpListener, sync::Arc};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub groups: GroupRegistry,
}

/// Base path the cache resource was mounted under, attached to the
/// resource so the handler can strip it off the raw request path.
struct CacheBasePath(String);

#[get("/")]
async fn home() -> HttpResponse {
    HttpResponse::Ok().body("Cache node")
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json("ok")
}

#[get("/stats/{group}")]
async fn group_stats(path: web::Path<String>, state: Data<AppState>) -> HttpResponse {
    match state.groups.lookup(&path) {
        Some(group) => HttpResponse::Ok().json(group.stats()),
        None => HttpResponse::NotFound().body(format!("no such group: {}", *path)),
    }
}

/// Splits the still-escaped `{group}/{key}` tail of a cache request path,
/// percent-decoding each segment exactly once. Both segments must be
/// non-empty and decode cleanly.
fn split_entry_path(tail: &str) -> Option<(String, String)> {
    let (group, key) = tail.split_once('/')?;
    if group.is_empty() || key.is_empty() {
        return None;
    }

    let group = urlencoding::decode(group).ok()?;
    let key = urlencoding::decode(key).ok()?;
    Some((group.into_owned(), key.into_owned()))
}

/// Serves `GET {base_path}{group}/{key}` for peers and direct callers.
///
/// The raw request path is parsed instead of the extracted route
/// parameter: extraction would percent-decode the tail before the split,
/// and a second decode of an already-decoded key resolves the wrong key.
async fn serve_entry(
    req: HttpRequest,
    base: Data<CacheBasePath>,
    state: Data<AppState>,
) -> HttpResponse {
    info!("{} {}", req.method(), req.path());

    let Some(tail) = req.uri().path().strip_prefix(base.0.as_str()) else {
        error!(
            "cache handler received {} outside its base path {}",
            req.path(),
            base.0
        );
        return HttpResponse::InternalServerError().finish();
    };

    let Some((group_name, key)) = split_entry_path(tail) else {
        return HttpResponse::BadRequest().body("bad request: expected {group}/{key}");
    };

    let Some(group) = state.groups.lookup(&group_name) else {
        return HttpResponse::NotFound().body(format!("no such group: {group_name}"));
    };

    match group.get(&key).await {
        Ok(view) => HttpResponse::Ok()
            .content_type("application/octet-stream")
            .body(view.into_bytes()),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

pub fn configure_app(cfg: &mut web::ServiceConfig, base_path: &str) {
    cfg.service(home)
        .service(health)
        .service(group_stats)
        .service(
            web::resource(format!("{base_path}{{tail:.*}}"))
                .app_data(Data::new(CacheBasePath(base_path.to_string())))
                .route(web::get().to(serve_entry)),
        );
}

pub async fn start_server(state: AppState, listener: TcpListener) -> std::io::Result<()> {
    let data = Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .configure(|cfg| configure_app(cfg, DEFAULT_BASE_PATH))
            .app_data(data.clone())
    })
    .listen(listener)?;

    server.run().await
}

#[cfg(test)]
pub async fn start_server_test(groups: GroupRegistry) -> u16 {
    let state = Arc::new(AppStateInner { groups });

    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind to random port");
    let port = listener
        .local_addr()
        .expect("failed to get local addr")
        .port();

    tokio::spawn(async {
        start_server(state, listener).await.unwrap();
    });

    port
}

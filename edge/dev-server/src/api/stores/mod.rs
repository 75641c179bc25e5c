use super::Router;

mod kv;

pub fn router() -> Router {
    Router::new().nest("/kv", kv::router())
}

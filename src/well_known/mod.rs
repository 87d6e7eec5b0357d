pub mod webfinger;

use axum::Router;
use axum::routing::get;

use crate::AppState;

pub fn well_known() -> Router<AppState> {
    Router::new().route("/.well-known/webfinger", get(webfinger::handler))
}

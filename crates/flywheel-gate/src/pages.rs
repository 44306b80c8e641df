//! Locally answered pages.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(
        tmpl.render()
            .unwrap_or_else(|e| format!("<pre>Template error: {e}</pre>")),
    )
}

#[derive(Template)]
#[template(path = "stopped.html")]
struct StoppedTemplate<'a> {
    start_link: &'a str,
}

#[derive(Template)]
#[template(path = "starting.html")]
struct StartingTemplate;

#[derive(Template)]
#[template(path = "stopping.html")]
struct StoppingTemplate;

#[derive(Template)]
#[template(path = "unhealthy.html")]
struct UnhealthyTemplate;

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    message: &'a str,
}

pub fn stopped(start_link: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        render(StoppedTemplate { start_link }),
    )
        .into_response()
}

pub fn starting() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, render(StartingTemplate)).into_response()
}

pub fn stopping() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, render(StoppingTemplate)).into_response()
}

pub fn unhealthy() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, render(UnhealthyTemplate)).into_response()
}

pub fn error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        render(ErrorTemplate { message }),
    )
        .into_response()
}

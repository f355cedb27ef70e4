//! The demo host's staff-only area.

use axum::{extract::Extension, response::Html, routing::get, Router};

use crate::context::SessionContext;

pub fn router() -> Router {
    Router::new()
        .route("/admin", get(index))
        .route("/admin/", get(index))
}

async fn index(Extension(context): Extension<SessionContext>) -> Html<String> {
    let username = context.username().unwrap_or_default();
    Html(format!(
        "<h1>Site administration</h1><p>Welcome, {}.</p>",
        escape_html(username)
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_escaped() {
        assert_eq!(escape_html("<b>al&ice</b>"), "&lt;b&gt;al&amp;ice&lt;/b&gt;");
    }
}

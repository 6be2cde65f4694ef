//! HTML rendering for the browser flow.

use axum::http::StatusCode;

/// Shared CSS for rendered pages.
const STYLES: &str = r#"
body { font-family: system-ui, sans-serif; background: #f5f5f7; color: #1d1d1f; margin: 0; }
.container { max-width: 480px; margin: 80px auto; padding: 0 16px; }
.card { background: #fff; border-radius: 12px; padding: 32px; box-shadow: 0 1px 3px rgba(0,0,0,.1); text-align: center; }
.error-title { font-size: 20px; font-weight: 600; margin-bottom: 12px; }
.error-code { margin-top: 16px; color: #86868b; font-size: 13px; }
"#;

fn html_page(title: &str, head: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(head);
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str("</title>\n    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str(content);
    html.push_str("\n    </div>\n</body>\n</html>");
    html
}

/// Renders a page that immediately navigates to `url`.
///
/// Safari drops the session cookie on a cross-site `302`, so it is sent a
/// `200` page with a meta refresh instead.
pub fn render_meta_refresh(url: &str) -> String {
    let escaped = html_escape(url);
    let head = format!("    <meta http-equiv=\"refresh\" content=\"0; url={escaped}\">\n");
    let content = format!(
        "<div class=\"card\"><a href=\"{escaped}\">Continue to login</a></div>"
    );
    html_page("Redirecting", &head, &content)
}

/// Renders the error page shown for interactive login failures.
pub fn render_error_page(status: StatusCode, message: &str) -> String {
    let mut content = String::with_capacity(512);
    content.push_str("<div class=\"card\">\n<div class=\"error-title\">Login failed</div>\n<div>");
    content.push_str(&html_escape(message));
    content.push_str("</div>\n<div class=\"error-code\">");
    content.push_str(status.as_str());
    content.push_str("</div>\n</div>");
    html_page("Error", "", &content)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

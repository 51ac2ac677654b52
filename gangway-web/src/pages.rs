use poem::http::{header, StatusCode};
use poem::session::Session;
use poem::web::{Data, Form, Html, Json, Path, Query};
use poem::Response;
use poem::{handler, IntoResponse, Request};
use serde::Deserialize;
use tracing::*;
use gangway_common::{parse_env_string, sanitize_host, sanitize_term, Secret};
use gangway_core::{CredentialSource, PartialCredentials, Services};

use crate::common::{
    parse_basic_auth, sso_source, StoredSessionContext, SESSION_CONTEXT_KEY, SSO_PASSWORD_HEADER,
    SSO_SESSION_HEADER, SSO_USERNAME_HEADER,
};

#[derive(Debug, Deserialize, Default)]
pub struct LandingQuery {
    pub port: Option<u16>,
    pub header: Option<String>,
    #[serde(rename = "headerBackground")]
    pub header_background: Option<String>,
    pub sshterm: Option<String>,
    pub env: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Credentials submitted through the landing page's login form.
#[derive(Debug, Deserialize, Default)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[handler]
pub async fn landing(
    req: &Request,
    session: &Session,
    Query(query): Query<LandingQuery>,
    Data(services): Data<&Services>,
) -> impl IntoResponse {
    render_landing(req, session, None, query, LoginForm::default(), services)
}

#[handler]
pub async fn landing_host(
    req: &Request,
    session: &Session,
    Path(host): Path<String>,
    Query(query): Query<LandingQuery>,
    Data(services): Data<&Services>,
) -> impl IntoResponse {
    render_landing(req, session, Some(host), query, LoginForm::default(), services)
}

#[handler]
pub async fn landing_post(
    req: &Request,
    session: &Session,
    Query(query): Query<LandingQuery>,
    Form(form): Form<LoginForm>,
    Data(services): Data<&Services>,
) -> impl IntoResponse {
    render_landing(req, session, None, query, form, services)
}

#[handler]
pub async fn landing_host_post(
    req: &Request,
    session: &Session,
    Path(host): Path<String>,
    Query(query): Query<LandingQuery>,
    Form(form): Form<LoginForm>,
    Data(services): Data<&Services>,
) -> impl IntoResponse {
    render_landing(req, session, Some(host), query, form, services)
}

fn render_landing(
    req: &Request,
    session: &Session,
    host: Option<String>,
    query: LandingQuery,
    form: LoginForm,
    services: &Services,
) -> Html<String> {
    let mut context = StoredSessionContext::default();

    if let Some(raw) = req.header(header::AUTHORIZATION) {
        if let Some((username, password)) = parse_basic_auth(raw) {
            context
                .sources
                .push(CredentialSource::http_basic(username, password));
        }
    }

    // URL and POST form parameters share one source slot; the form wins
    // on conflicts since it is the more deliberate submission.
    let url_fields = PartialCredentials {
        username: form.username.or_else(|| query.username.clone()),
        password: form
            .password
            .or_else(|| query.password.clone())
            .map(Secret::new),
        host: form
            .host
            .as_deref()
            .or(host.as_deref())
            .map(sanitize_host),
        port: form.port.or(query.port),
        ..Default::default()
    };
    if url_fields != PartialCredentials::default() {
        context.sources.push(CredentialSource::url_params(url_fields));
    }

    if let (Some(username), Some(password), Some(_)) = (
        req.header(SSO_USERNAME_HEADER),
        req.header(SSO_PASSWORD_HEADER),
        req.header(SSO_SESSION_HEADER),
    ) {
        context.sources.push(sso_source(username, password));
    }

    context.term = query.sshterm.as_deref().and_then(sanitize_term);
    context.env = query.env.as_deref().map(parse_env_string).unwrap_or_default();
    context.header = query.header.clone();
    context.header_background = query.header_background.clone();

    session.set(SESSION_CONTEXT_KEY, &context);
    debug!(host = host.as_deref().unwrap_or("<config>"), "Landing page");

    let header_text = context
        .header
        .or_else(|| services.config.header.text.clone())
        .unwrap_or_default();
    let header_background = context
        .header_background
        .unwrap_or_else(|| services.config.header.background.clone());

    Html(landing_page(&header_text, &header_background))
}

/// Clears the HTTP credential cookie and re-challenges the browser.
#[handler]
pub async fn reauth(session: &Session) -> Response {
    session.purge();
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::WWW_AUTHENTICATE, r#"Basic realm="WebSSH2""#)
        .body("Authentication required")
}

#[handler]
pub async fn healthz(Data(services): Data<&Services>) -> impl IntoResponse {
    Json(services.metrics.snapshot())
}

/// Minimal terminal shell page; asset bundling is the frontend's concern.
fn landing_page(header_text: &str, header_background: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Gangway</title>
<style>
  html, body {{ height: 100%; margin: 0; background: #000; }}
  #header {{ background: {header_background}; color: #fff; font: 14px sans-serif; padding: 2px 8px; }}
  #terminal {{ height: calc(100% - 40px); }}
  #footer, #status {{ color: #aaa; font: 12px monospace; padding: 2px 8px; }}
</style>
</head>
<body>
<div id="header">{header_text}</div>
<div id="terminal"></div>
<div id="status"></div>
<div id="footer"></div>
<script src="/ssh/assets/client.js"></script>
</body>
</html>
"#,
        header_text = escape_html(header_text),
        header_background = escape_html(header_background),
    )
}

fn escape_html(raw: &str) -> String {
    html_escape::encode_safe(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landing_page_escapes_header() {
        let page = landing_page("<b>ops</b>", "green\"><script>");
        assert!(!page.contains("<b>ops</b>"));
        assert!(!page.contains(r#"green"><script>"#));
        assert!(page.contains("&lt;b&gt;ops&lt;/b&gt;"));
    }
}

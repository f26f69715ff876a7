/*
 * Responsibility
 * - GET /      : セッションの有無で /home か /login へリダイレクト
 * - GET /login : ログインページ (認証済みなら /home へ)
 * - GET /home  : ホームページ (未認証なら /login へ)
 *
 * Notes
 * - テンプレートエンジンや静的ファイルは使わず、最小限の HTML をここで組み立てる
 */
use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::debug;
use url::Url;

use crate::api::extractors::Session;
use crate::api::routes::{HOME_PATH, INITIATE_PATH, LOGIN_PATH, LOGOUT_PATH};
use crate::state::AppState;

pub async fn root(session: Session) -> Redirect {
    if session.is_authenticated() {
        Redirect::to(HOME_PATH)
    } else {
        Redirect::to(LOGIN_PATH)
    }
}

pub async fn login(State(state): State<AppState>, session: Session) -> Response {
    if session.is_authenticated() {
        return Redirect::to(HOME_PATH).into_response();
    }
    Html(login_page(&state.public_base_url)).into_response()
}

pub async fn home(session: Session) -> Response {
    match session.user_id() {
        Some(user_id) => Html(home_page(user_id)).into_response(),
        None => {
            debug!(reason = ?session.reason(), "no session, redirecting to login");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}

fn absolute(base: &Url, path: &str) -> String {
    base.join(path)
        .map(String::from)
        .unwrap_or_else(|_| path.to_string())
}

// Rendered as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
}

fn login_page(base: &Url) -> String {
    let initiate_url = js_string(&absolute(base, INITIATE_PATH));
    let home_url = js_string(&absolute(base, HOME_PATH));

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Log in</title></head>
<body>
  <h1>Log in</h1>
  <button id="initiate-oauth-button" type="button">Sign in with Google</button>
  <p id="status" role="status"></p>
  <script>
    window.onload = function () {{
      const status = document.getElementById('status');
      document.getElementById('initiate-oauth-button').addEventListener('click', () => {{
        status.textContent = 'Continue in the browser window that just opened...';
        fetch({initiate_url}, {{ method: 'POST', credentials: 'same-origin' }})
          .then(async (res) => {{
            if (res.ok) {{
              window.location.replace({home_url});
              return;
            }}
            const body = await res.json().catch(() => null);
            status.textContent = body?.error?.message ?? 'Login failed.';
          }})
          .catch(() => {{ status.textContent = 'Login failed.'; }});
      }});
    }};
  </script>
</body>
</html>
"#
    )
}

fn home_page(user_id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Home</title></head>
<body>
  <h1>Home</h1>
  <p>Signed in as <code>{user}</code>.</p>
  <form method="post" action="{LOGOUT_PATH}"><button type="submit">Log out</button></form>
</body>
</html>
"#,
        user = escape_html(user_id)
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

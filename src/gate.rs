//! Shared-password login.
//!
//! With no password configured the gate is open and the login routes just
//! bounce to `/`. Otherwise a session becomes authenticated once a POST to
//! `/login` carries the right password, and [`require_auth`] keeps every
//! browse route behind that.

use axum::{
    extract::{Form, Request, State},
    http::{header, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::App;
use crate::error::AppError;
use crate::presenter::present_error;
use crate::server::SharedState;
use crate::session::{clear_cookie, Session, AUTH_KEY};
use crate::views::LoginView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoPasswordConfigured,
    Unauthenticated,
    Authenticated,
}

pub fn auth_state(app: &App, session: &Session) -> AuthState {
    if !app.password_required() {
        AuthState::NoPasswordConfigured
    } else if session.is_authenticated() {
        AuthState::Authenticated
    } else {
        AuthState::Unauthenticated
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LoginRequest<'a> {
    Show,
    Submit { password: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Nothing to do here; send the browser to `/`.
    Redirect,
    /// The session was just marked authenticated and must be persisted
    /// before redirecting.
    Authenticated,
    ShowForm { unauthorized: bool },
}

/// Applies one login request to `session`.
///
/// The session is only modified on a correct password.
pub fn login_transition(app: &App, session: &mut Session, request: LoginRequest<'_>) -> LoginOutcome {
    match (auth_state(app, session), request) {
        (AuthState::NoPasswordConfigured, _) | (AuthState::Authenticated, _) => LoginOutcome::Redirect,
        (AuthState::Unauthenticated, LoginRequest::Show) => LoginOutcome::ShowForm { unauthorized: false },
        (AuthState::Unauthenticated, LoginRequest::Submit { password }) => {
            if password == app.password {
                session.set(AUTH_KEY, true);
                LoginOutcome::Authenticated
            } else {
                LoginOutcome::ShowForm { unauthorized: true }
            }
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginForm {
    #[serde(default)]
    password: String,
}

pub fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

pub async fn login_page(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    handle_login(&state, jar, LoginRequest::Show, &method, &uri)
}

pub async fn login_submit(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    jar: CookieJar,
    form: Option<Form<LoginForm>>,
) -> Response {
    // A body that isn't a login form counts as a wrong password.
    let password = form.map(|Form(form)| form.password).unwrap_or_default();
    handle_login(
        &state,
        jar,
        LoginRequest::Submit { password: &password },
        &method,
        &uri,
    )
}

fn handle_login(
    state: &SharedState,
    jar: CookieJar,
    request: LoginRequest<'_>,
    method: &Method,
    uri: &Uri,
) -> Response {
    if !state.app.password_required() {
        info!("Login requested but no password is configured");
        return found("/");
    }

    let mut session = Session::load(state.sessions.as_ref(), &jar);
    match login_transition(&state.app, &mut session, request) {
        LoginOutcome::Redirect => {
            debug!("Session {} already authenticated", session.id());
            found("/")
        }
        LoginOutcome::Authenticated => match session.persist(state.sessions.as_ref(), jar) {
            Ok(jar) => {
                info!("Session {} logged in", session.id());
                (jar, found("/")).into_response()
            }
            Err(e) => present_error(state.templates.as_ref(), &AppError::from(e), method, uri),
        },
        LoginOutcome::ShowForm { unauthorized } => {
            if unauthorized {
                info!("Wrong password for session {}", session.id());
            }
            match state.templates.login(&LoginView { unauthorized }) {
                Ok(markup) => markup.into_response(),
                Err(e) => present_error(state.templates.as_ref(), &AppError::from(e), method, uri),
            }
        }
    }
}

pub async fn logout(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    if !state.app.password_required() {
        return found("/");
    }
    let mut session = Session::load(state.sessions.as_ref(), &jar);
    session.remove(AUTH_KEY);
    match session.persist(state.sessions.as_ref(), jar) {
        Ok(jar) => {
            info!("Session {} logged out", session.id());
            (clear_cookie(jar), found("/login")).into_response()
        }
        Err(e) => present_error(state.templates.as_ref(), &AppError::from(e), &method, &uri),
    }
}

/// Redirects to `/login` unless the gate is open or the session is
/// authenticated.
pub async fn require_auth(
    State(state): State<SharedState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if !state.app.password_required() {
        return next.run(request).await;
    }
    let session = Session::load(state.sessions.as_ref(), &jar);
    match auth_state(&state.app, &session) {
        AuthState::Unauthenticated => {
            debug!("Unauthenticated request for {}", request.uri());
            found("/login")
        }
        _ => next.run(request).await,
    }
}

use axum::{
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::AppError;
use crate::views::{ErrorView, Templates};

/// Turns a failed request into a 500 page. If the error page can't be
/// rendered either, falls back to plain text naming both failures.
pub fn present_error(templates: &dyn Templates, err: &AppError, method: &Method, uri: &Uri) -> Response {
    error!("{} {} failed: {}", method, uri, err);

    let view = ErrorView {
        error: err.to_string(),
        method: method.to_string(),
        uri: uri.to_string(),
    };
    match templates.error_page(&view) {
        Ok(markup) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )],
            markup.into_string(),
        )
            .into_response(),
        Err(render_err) => {
            error!("Error page failed to render: {}", render_err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                format!(
                    "Internal server error: {}\nAdditionally, an error was encountered while loading the error page: {}",
                    err, render_err
                ),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::views::{DirectoryListView, LoginView, MaudTemplates};
    use maud::Markup;

    /// Templates that fail for every page.
    pub(crate) struct BrokenTemplates;

    impl Templates for BrokenTemplates {
        fn directory_list(&self, _: &DirectoryListView) -> Result<Markup, RenderError> {
            Err(broken("directory_list"))
        }
        fn login(&self, _: &LoginView) -> Result<Markup, RenderError> {
            Err(broken("login"))
        }
        fn error_page(&self, _: &ErrorView) -> Result<Markup, RenderError> {
            Err(broken("error_page"))
        }
    }

    fn broken(template: &'static str) -> RenderError {
        RenderError {
            template,
            message: "template missing".to_string(),
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn renders_html_error_page() {
        let err = AppError::UnsupportedFormat("tar".into());
        let uri: Uri = "/docs?format=tar".parse().unwrap();
        let response = present_error(&MaudTemplates, &err, &Method::GET, &uri);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let body = body_string(response).await;
        assert!(body.contains("Unsupported format: tar"));
        assert!(body.contains("/docs?format=tar"));
    }

    #[tokio::test]
    async fn falls_back_to_plain_text() {
        let err = AppError::NotFound("/srv/x".into());
        let uri: Uri = "/x".parse().unwrap();
        let response = present_error(&BrokenTemplates, &err, &Method::GET, &uri);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = body_string(response).await;
        assert!(body.contains("Not found"));
        assert!(body.contains("template missing"));
    }
}

//! HTML views.
//!
//! Each page has its own view-model struct; [`Templates`] is the seam the
//! handlers render through, so a different front end (or a failing one in
//! tests) can be swapped in.

use chrono::prelude::*;
use humansize::{format_size, BINARY};
use maud::{html, Markup, DOCTYPE};
use std::time::SystemTime;

use crate::error::RenderError;
use crate::listing::{BreadCrumb, DirectoryEntry};
use crate::resolver::FsInfo;

// --- View models ---
#[derive(Debug, Clone)]
pub struct DirectoryListView {
    pub machine: String,
    /// Root-relative path of the listed directory.
    pub path: String,
    pub base_info: FsInfo,
    pub entries: Vec<DirectoryEntry>,
    pub bread_crumbs: Vec<BreadCrumb>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoginView {
    pub unauthorized: bool,
}

#[derive(Debug, Clone)]
pub struct ErrorView {
    pub error: String,
    pub method: String,
    pub uri: String,
}

pub trait Templates: Send + Sync {
    fn directory_list(&self, view: &DirectoryListView) -> Result<Markup, RenderError>;
    fn login(&self, view: &LoginView) -> Result<Markup, RenderError>;
    fn error_page(&self, view: &ErrorView) -> Result<Markup, RenderError>;
}

/// Built-in templates rendered with maud.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaudTemplates;

impl Templates for MaudTemplates {
    fn directory_list(&self, view: &DirectoryListView) -> Result<Markup, RenderError> {
        let here = encode_path(&view.path);
        let title = format!("{}:{}", view.machine, view.path);
        Ok(page(
            &title,
            html! {
                nav #breadcrumbs {
                    @for (i, crumb) in view.bread_crumbs.iter().enumerate() {
                        @if i > 0 { " / " }
                        a href=(encode_path(&crumb.path)) { (crumb.label) }
                    }
                }
                div #current-path {
                    span class="machine" { (view.machine) }
                    " "
                    span { (view.path) }
                    @if let Some(modified) = format_modified(view.base_info.modified) {
                        span class="file-info" { " (" (modified) ")" }
                    }
                }
                div #exports {
                    a href={(here) "?format=csv"} { "Export CSV" }
                    " "
                    a href={(here) "?format=zip"} { "Download ZIP" }
                }
                ul #file-list {
                    @if view.path != "/" {
                        li { a href=(parent_href(&view.path)) { ".." } }
                    }
                    @for entry in &view.entries {
                        @let href = join_href(&here, &entry.name);
                        li data-is-dir=(if entry.is_dir { "true" } else { "false" }) {
                            @if entry.is_dir {
                                a href={(href) "/"} { (entry.name) "/" }
                            } @else {
                                a href=(href) { (entry.name) }
                                " "
                                a class="download" href={(href) "?format=download"} { "[download]" }
                                span class="file-info" { " " (format_size(entry.size, BINARY)) }
                            }
                            @if let Some(modified) = format_modified(entry.modified) {
                                span class="file-info" { " " (modified) }
                            }
                        }
                    }
                }
            },
        ))
    }

    fn login(&self, view: &LoginView) -> Result<Markup, RenderError> {
        Ok(page(
            "Login",
            html! {
                @if view.unauthorized {
                    p class="error" { "Wrong password." }
                }
                form method="post" action="/login" {
                    label for="password" { "Password" }
                    input #password type="password" name="password" autofocus;
                    button type="submit" { "Log in" }
                }
            },
        ))
    }

    fn error_page(&self, view: &ErrorView) -> Result<Markup, RenderError> {
        Ok(page(
            "Error",
            html! {
                div style="padding: 10px; border: 1px solid red; color: red; margin: 10px;" {
                    h2 { "Internal server error" }
                    p { (view.error) }
                    p { code { (view.method) " " (view.uri) } }
                }
            },
        ))
    }
}

fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
            }
            body { (body) }
        }
    }
}

/// Local modification time as `YYYY-MM-DD HH:MM`.
fn format_modified(time: SystemTime) -> Option<String> {
    if time == SystemTime::UNIX_EPOCH {
        return None;
    }
    let datetime: DateTime<Local> = time.into();
    Some(datetime.format("%Y-%m-%d %H:%M").to_string())
}

/// Percent-encodes each segment of a root-relative path.
pub fn encode_path(path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let joined = encoded.join("/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

fn join_href(dir_href: &str, name: &str) -> String {
    format!(
        "{}/{}",
        dir_href.trim_end_matches('/'),
        urlencoding::encode(name)
    )
}

fn parent_href(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => encode_path(parent),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::make_bread_crumbs;

    fn entry(name: &str, is_dir: bool) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            size: 10,
            modified: SystemTime::now(),
            mode: 0o644,
            is_dir,
        }
    }

    #[test]
    fn hrefs_are_encoded() {
        assert_eq!(encode_path("/"), "/");
        assert_eq!(encode_path("/a b/c"), "/a%20b/c");
        assert_eq!(join_href("/", "x y.txt"), "/x%20y.txt");
        assert_eq!(join_href("/docs", "r.txt"), "/docs/r.txt");
        assert_eq!(parent_href("/a/b"), "/a");
        assert_eq!(parent_href("/a"), "/");
    }

    #[test]
    fn directory_list_renders_entries_and_crumbs() {
        let view = DirectoryListView {
            machine: "box".to_string(),
            path: "/reports".to_string(),
            base_info: FsInfo {
                size: 0,
                modified: SystemTime::now(),
                mode: 0o40755,
                is_dir: true,
                is_symlink: false,
            },
            entries: vec![entry("2023", true), entry("a.txt", false)],
            bread_crumbs: make_bread_crumbs("/reports"),
        };
        let html = MaudTemplates.directory_list(&view).unwrap().into_string();
        assert!(html.contains(r#"href="/reports/2023/""#));
        assert!(html.contains(r#"href="/reports/a.txt?format=download""#));
        assert!(html.contains(r#"href="/reports?format=zip""#));
        assert!(html.contains("box"));
    }

    #[test]
    fn every_crumb_after_root_is_separated() {
        let view = DirectoryListView {
            machine: "box".to_string(),
            path: "/reports/2023".to_string(),
            base_info: FsInfo {
                size: 0,
                modified: SystemTime::now(),
                mode: 0o40755,
                is_dir: true,
                is_symlink: false,
            },
            entries: vec![],
            bread_crumbs: make_bread_crumbs("/reports/2023"),
        };
        let html = MaudTemplates.directory_list(&view).unwrap().into_string();
        assert!(html.contains(r#"<a href="/">/</a> / <a href="/reports">reports</a>"#));
        assert!(html.contains(r#"<a href="/reports">reports</a> / <a href="/reports/2023">2023</a>"#));
    }

    #[test]
    fn login_shows_failure_only_when_unauthorized() {
        let ok = MaudTemplates.login(&LoginView { unauthorized: false }).unwrap().into_string();
        assert!(!ok.contains("Wrong password"));
        let bad = MaudTemplates.login(&LoginView { unauthorized: true }).unwrap().into_string();
        assert!(bad.contains("Wrong password"));
    }
}

//! Asset resolution: make report HTML printable by an offline engine.
//!
//! Browser markup refers to images by web path (`/static/...`) and carries
//! editing furniture (toolbars, hidden widgets, empty editor boxes). The PDF
//! engine has no web server and must not print any of that, so before
//! rendering we:
//!
//! 1. strip elements that only make sense on screen, repeating until nothing
//!    more is removed (removing a toolbar can leave its editor box empty);
//! 2. drop `contenteditable` attributes from what remains;
//! 3. rewrite root-relative `<img src>` values to absolute `file://` URLs:
//!    the static URL prefix maps to the static directory, anything else to
//!    the application directory.
//!
//! `file:`, `data:`, `http(s):` and protocol-relative sources are left alone,
//! which is what makes [`AssetResolver::resolve`] idempotent.
//!
//! The scanner is regex-driven rather than a DOM parse: tags are matched as
//! `<name attrs>` and element extents are found by counting nested tags of
//! the same name. Attribute values containing `>` are not supported.

use crate::config::PipelineConfig;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(/)?([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").unwrap());

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

static RE_CONTENTEDITABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+contenteditable(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))?"#).unwrap()
});

static RE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)((?:^|\s)src\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

static RE_BLANK_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:p|br)\b[^>]*>|&nbsp;").unwrap());

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const SCREEN_ONLY_CLASSES: &[&str] = &["edit-controls", "no-print"];

/// Rewrites asset references and strips screen-only markup.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    base_dir: PathBuf,
    base_url: String,
    mount: Option<Mount>,
}

/// A URL prefix served from a directory outside the plain `base_dir` layout.
#[derive(Debug, Clone)]
struct Mount {
    /// Prefix without surrounding slashes, e.g. `static`.
    prefix: String,
    dir: PathBuf,
    url: String,
}

impl AssetResolver {
    /// `base_dir` is the directory root-relative paths resolve against.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let base_url = dir_url(&base_dir);
        Self {
            base_dir,
            base_url,
            mount: None,
        }
    }

    /// Resolve paths under `url_prefix` against `dir` instead of `base_dir`.
    pub fn with_mount(mut self, url_prefix: &str, dir: impl Into<PathBuf>) -> Self {
        let prefix = url_prefix.trim_matches('/').to_string();
        if prefix.is_empty() {
            return self;
        }
        let dir = dir.into();
        let url = dir_url(&dir);
        self.mount = Some(Mount { prefix, dir, url });
        self
    }

    /// Resolver for `working_dir`, with the static URL prefix mapped to the
    /// static directory the pipeline writes images into.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.working_dir).with_mount(&config.static_url_prefix, config.static_root())
    }

    /// `file://` URL of the base directory, with a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Local file a root-relative web path maps to, with its `file://` URL.
    pub fn locate(&self, web_path: &str) -> (PathBuf, String) {
        let relative = web_path.trim_start_matches('/');
        let (dir, url, rest) = match self.mount {
            Some(ref m) if under_prefix(relative, &m.prefix) => (
                &m.dir,
                &m.url,
                relative[m.prefix.len()..].trim_start_matches('/'),
            ),
            _ => (&self.base_dir, &self.base_url, relative),
        };
        let on_disk = rest.split(['?', '#']).next().unwrap_or(rest);
        (dir.join(on_disk), format!("{}{}", url, rest))
    }

    /// Sanitise `html` for printing.
    pub fn resolve(&self, html: &str) -> String {
        let mut current = html.to_string();
        let mut passes = 0;
        loop {
            let (next, removed) = strip_pass(&current);
            current = next;
            if removed == 0 {
                break;
            }
            passes += 1;
            debug!("Asset resolver pass {}: removed {} elements", passes, removed);
        }

        RE_TAG
            .replace_all(&current, |caps: &Captures| self.rewrite_tag(caps))
            .into_owned()
    }

    fn rewrite_tag(&self, caps: &Captures) -> String {
        if caps.get(1).is_some() {
            return caps[0].to_string();
        }
        let name = &caps[2];
        let attrs = RE_CONTENTEDITABLE.replace_all(&caps[3], "");
        let attrs = if name.eq_ignore_ascii_case("img") {
            RE_SRC
                .replace_all(&attrs, |src: &Captures| self.rewrite_src(src))
                .into_owned()
        } else {
            attrs.into_owned()
        };
        format!("<{}{}>", name, attrs)
    }

    fn rewrite_src(&self, caps: &Captures) -> String {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());

        if !value.starts_with('/') || value.starts_with("//") {
            return caps[0].to_string();
        }

        let (local, url) = self.locate(value);
        if !local.exists() {
            warn!("Image not found on disk: {}", local.display());
        }

        format!("{}\"{}\"", &caps[1], url)
    }
}

fn under_prefix(relative: &str, prefix: &str) -> bool {
    relative
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// `file://` URL of a directory, with a trailing slash.
fn dir_url(dir: &Path) -> String {
    let dir = dir.to_string_lossy();
    let dir = dir.trim_end_matches('/').replace(' ', "%20");
    if dir.starts_with('/') {
        format!("file://{}/", dir)
    } else {
        format!("file:///{}/", dir)
    }
}

/// One sweep over the markup, removing every screen-only element found.
fn strip_pass(html: &str) -> (String, usize) {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut search = 0;
    let mut removed = 0;

    while let Some(caps) = RE_TAG.captures_at(html, search) {
        let Some(whole) = caps.get(0) else { break };
        if caps.get(1).is_some() {
            search = whole.end();
            continue;
        }

        let name = caps[2].to_ascii_lowercase();
        let attrs = &caps[3];
        let strip = match classify(&name, attrs) {
            Visibility::Print => None,
            Visibility::Screen => Some(element_end(html, &name, attrs, whole.end())),
            Visibility::EditorBox => {
                let end = element_end(html, &name, attrs, whole.end());
                let inner = &html[whole.end()..inner_end(html, whole.end(), end)];
                (end > whole.end() && is_blank_markup(inner)).then_some(end)
            }
        };

        match strip {
            Some(end) => {
                out.push_str(&html[copied..whole.start()]);
                copied = end;
                search = end;
                removed += 1;
            }
            None => search = whole.end(),
        }
    }

    out.push_str(&html[copied..]);
    (out, removed)
}

/// Byte offset just past the element opened by a start tag ending at `from`.
///
/// Void, self-closing and unclosed elements end with their start tag.
fn element_end(html: &str, name: &str, attrs: &str, from: usize) -> usize {
    if VOID_ELEMENTS.contains(&name) || attrs.trim_end().ends_with('/') {
        return from;
    }

    let mut depth = 1usize;
    let mut search = from;
    while let Some(caps) = RE_TAG.captures_at(html, search) {
        let Some(whole) = caps.get(0) else { break };
        search = whole.end();
        if !caps[2].eq_ignore_ascii_case(name) {
            continue;
        }
        if caps.get(1).is_some() {
            depth -= 1;
            if depth == 0 {
                return whole.end();
            }
        } else if !caps[3].trim_end().ends_with('/') {
            depth += 1;
        }
    }
    from
}

/// Start of the closing tag, given the element extent.
fn inner_end(html: &str, start: usize, end: usize) -> usize {
    if end <= start {
        return start;
    }
    html[..end].rfind("</").filter(|&i| i >= start).unwrap_or(start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    /// Printed as-is.
    Print,
    /// Removed with its content.
    Screen,
    /// A rich-text editor container, removed only when empty.
    EditorBox,
}

fn classify(name: &str, attrs: &str) -> Visibility {
    if name == "button" || name == "script" {
        return Visibility::Screen;
    }

    let mut editor = false;
    for caps in RE_ATTR.captures_iter(attrs) {
        let attr = caps[1].to_ascii_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());

        match attr.as_str() {
            "hidden" => return Visibility::Screen,
            "style" => {
                let style: String = value
                    .to_ascii_lowercase()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if style.contains("display:none") {
                    return Visibility::Screen;
                }
            }
            "class" => {
                for class in value.split_whitespace() {
                    if SCREEN_ONLY_CLASSES.contains(&class) {
                        return Visibility::Screen;
                    }
                    editor |= class == "ql-editor";
                }
            }
            "contenteditable" => editor = true,
            _ => {}
        }
    }

    if editor {
        Visibility::EditorBox
    } else {
        Visibility::Print
    }
}

/// True for content made only of empty paragraphs, line breaks and whitespace.
fn is_blank_markup(inner: &str) -> bool {
    RE_BLANK_CONTENT.replace_all(inner, "").trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AssetResolver {
        AssetResolver::new("/srv/app")
    }

    #[test]
    fn root_relative_src_becomes_file_url() {
        let out = resolver().resolve(r#"<p>x</p><img src="/static/generated_images/abc.png" alt="a">"#);
        assert_eq!(
            out,
            r#"<p>x</p><img src="file:///srv/app/static/generated_images/abc.png" alt="a">"#
        );
    }

    #[test]
    fn single_quoted_src_rewritten() {
        let out = resolver().resolve("<IMG class='pic' src='/static/x.png'>");
        assert_eq!(out, r#"<IMG class='pic' src="file:///srv/app/static/x.png">"#);
    }

    #[test]
    fn remote_and_inline_sources_untouched() {
        let html = concat!(
            r#"<img src="https://cdn.example.com/a.png">"#,
            r#"<img src="//cdn.example.com/b.png">"#,
            r#"<img src="data:image/png;base64,AAAA">"#,
            r#"<img src="file:///tmp/c.png">"#,
            r#"<img src="relative/d.png">"#,
        );
        assert_eq!(resolver().resolve(html), html);
    }

    #[test]
    fn only_img_sources_are_rewritten() {
        let html = r#"<script src="/static/app.js"></script><link href="/static/site.css"><a href="/home">h</a>"#;
        assert_eq!(
            resolver().resolve(html),
            r#"<link href="/static/site.css"><a href="/home">h</a>"#
        );
    }

    #[test]
    fn screen_only_elements_removed() {
        let html = concat!(
            "<div class=\"toolbar edit-controls\"><div><button>Bold</button></div></div>",
            "<p>Keep me</p>",
            "<span style=\"color: red; display : none\">secret</span>",
            "<div hidden>gone</div>",
            "<section class=\"no-print\"><div>nested</div><div>twice</div></section>",
            "<button type=\"button\">Save</button>",
            "<div class=\"ql-editor\"><p><br></p></div>",
            "<div contenteditable=\"true\"><p>typed text</p></div>",
        );
        assert_eq!(
            resolver().resolve(html),
            "<p>Keep me</p><div><p>typed text</p></div>"
        );
    }

    #[test]
    fn aria_hidden_is_not_hidden() {
        let html = r#"<span aria-hidden="true">icon</span>"#;
        assert_eq!(resolver().resolve(html), html);
    }

    #[test]
    fn editor_emptied_by_stripping_is_removed_too() {
        let html = r#"<div class="ql-editor"><p><button>x</button></p></div><p>after</p>"#;
        assert_eq!(resolver().resolve(html), "<p>after</p>");
    }

    #[test]
    fn resolve_is_idempotent() {
        let html = concat!(
            "<div class=\"adime-report\"><div class=\"edit-controls\"><button>B</button></div>",
            "<div class=\"section\"><h2>Intervention</h2>",
            "<div class=\"action-item\"><p contenteditable=\"true\">Drink water</p>",
            "<img src=\"/static/generated_images/p.png\" alt=\"w\"></div>",
            "<div class=\"ql-editor\"><span>x</span><button>y</button></div>",
            "<div contenteditable><p>&nbsp;</p></div></div></div>",
        );
        let r = resolver();
        let once = r.resolve(html);
        assert_eq!(r.resolve(&once), once);
        assert!(once.contains("file:///srv/app/static/generated_images/p.png"));
        assert!(!once.contains("contenteditable"));
        assert!(!once.contains("<button"));
    }

    #[test]
    fn data_src_left_alone() {
        let html = r#"<img data-src="/lazy.png" src="/static/a.png">"#;
        assert_eq!(
            resolver().resolve(html),
            r#"<img data-src="/lazy.png" src="file:///srv/app/static/a.png">"#
        );
    }

    #[test]
    fn mounted_prefix_resolves_to_its_own_dir() {
        let r = AssetResolver::new("/srv/app").with_mount("/static/", "/var/lib/adime");
        let out = r.resolve(r#"<img src="/static/generated_images/a.png"><img src="/logo.png">"#);
        assert_eq!(
            out,
            concat!(
                r#"<img src="file:///var/lib/adime/generated_images/a.png">"#,
                r#"<img src="file:///srv/app/logo.png">"#
            )
        );
        // A longer name sharing the prefix is not under the mount.
        let out = r.resolve(r#"<img src="/staticfiles/b.png">"#);
        assert_eq!(out, r#"<img src="file:///srv/app/staticfiles/b.png">"#);
        assert_eq!(r.resolve(&out), out);
    }

    #[test]
    fn static_dir_outside_working_dir_points_at_real_files() {
        let app = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .working_dir(app.path())
            .static_dir(store.path())
            .build()
            .unwrap();
        std::fs::create_dir_all(config.image_dir()).unwrap();
        std::fs::write(config.placeholder_image_path(), b"png").unwrap();

        let resolver = AssetResolver::from_config(&config);
        let (local, url) = resolver.locate(&config.placeholder_image_url());
        assert_eq!(local, config.placeholder_image_path());
        assert!(local.is_file());

        let html = format!(r#"<img src="{}">"#, config.placeholder_image_url());
        assert_eq!(resolver.resolve(&html), format!(r#"<img src="{}">"#, url));
        assert!(url.starts_with(&dir_url(store.path())));
    }

    #[test]
    fn base_url_has_trailing_slash() {
        assert_eq!(AssetResolver::new("/srv/app/").base_url(), "file:///srv/app/");
    }

    #[test]
    fn unclosed_button_only_drops_tag() {
        assert_eq!(resolver().resolve("<button>Save<p>text</p>"), "Save<p>text</p>");
    }
}

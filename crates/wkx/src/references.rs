//! 🔗 References — turning "/xwiki/bin/view/Space/Page" into something a
//! permission check can reason about.
//!
//! Report rows carry page URLs in their `label`. The wiki does not guard URLs,
//! it guards pages. So before a row can be shown we need the page behind it:
//! an [`EntityReference`].
//!
//! ## Knowledge Graph 🧠
//! - Trait: [`ReferenceResolver`] — the seam. Hosts with their own URL scheme plug in here.
//! - Default impl: [`StandardUrlResolver`] — understands the standard wiki URL layout:
//!
//! ```text
//!   [/<context>]/bin/<action>/<Space>[/<Space>...]/<Page>     main wiki
//!   [/<context>]/wiki/<wiki>/<action>/<Space>[/...]/<Page>    sub-wiki
//!   .../<Space>/                                              → <Space>.WebHome
//! ```
//!
//! - Used by: `normalisers::most_viewed` as a permission gate. Never to rewrite labels.

use std::fmt;

use percent_encoding::percent_decode_str;
use tracing::trace;
use url::Url;

use crate::app_config::WikiConfig;
use crate::error::MalformedUrlError;

/// 🏠 The page a space-only URL lands on.
pub const DEFAULT_PAGE: &str = "WebHome";

/// 🏠 The space a bare `/bin/view/` URL lands on.
pub const DEFAULT_SPACE: &str = "Main";

/// 📍 Anchor for relative labels when no `wiki.base_url` is configured. Only
/// the path matters to resolution, so any http host would do.
const FALLBACK_BASE: &str = "http://localhost/";

/// Actions that address a page. Attachments, skins and friends are not pages.
const PAGE_ACTIONS: &[&str] = &["view", "edit", "inline", "get", "preview", "history", "export"];

/// 📄 A wiki page, fully qualified: which wiki, which nested spaces, which page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityReference {
    pub wiki: String,
    pub spaces: Vec<String>,
    pub page: String,
}

impl EntityReference {
    pub fn new(wiki: impl Into<String>, spaces: Vec<String>, page: impl Into<String>) -> Self {
        Self {
            wiki: wiki.into(),
            spaces,
            page: page.into(),
        }
    }
}

/// 🖨️ `wiki:Space.Sub.Page`, with `.` `:` and `\` escaped by a backslash
/// inside names so the form round-trips unambiguously.
impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", escape(&self.wiki))?;
        for space in &self.spaces {
            write!(f, "{}.", escape(space))?;
        }
        write!(f, "{}", escape(&self.page))
    }
}

fn escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '.' | ':' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 🔗 Label URL → page reference.
///
/// # Contract 📜
/// - `Err(MalformedUrlError)` — the label is not a usable URL. Callers log and move on.
/// - `Ok(None)` — a fine URL that points at no page (static file, REST, somewhere else).
/// - `Ok(Some(reference))` — the page behind the URL.
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Option<EntityReference>, MalformedUrlError>;
}

/// 🗺️ Resolver for the standard wiki URL layout.
///
/// Relative labels (the analytics server loves "/xwiki/bin/view/...") are joined
/// against `base`, or against a local placeholder when none is configured.
#[derive(Debug, Clone)]
pub struct StandardUrlResolver {
    base: Option<Url>,
    default_wiki: String,
}

impl StandardUrlResolver {
    pub fn new(base: Option<Url>, default_wiki: impl Into<String>) -> Self {
        Self {
            base,
            default_wiki: default_wiki.into(),
        }
    }

    /// 🔧 Build from the `[wiki]` config section. Fails if `base_url` is set but unparseable.
    pub fn from_config(config: &WikiConfig) -> anyhow::Result<Self> {
        let base = match config.base_url.as_deref().filter(|base| !base.is_empty()) {
            Some(raw) => Some(Url::parse(raw).map_err(|err| {
                anyhow::anyhow!("💀 wiki.base_url '{raw}' is not a valid URL: {err}")
            })?),
            None => None,
        };
        Ok(Self::new(base, config.default_wiki.clone()))
    }

    fn parse(&self, label: &str) -> Result<Url, MalformedUrlError> {
        let url = match Url::parse(label) {
            Ok(url) => url,
            // -- "/xwiki/bin/view/..." has no host of its own; borrow one
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base.join(label)?,
                None => Url::parse(FALLBACK_BASE)?.join(label)?,
            },
            Err(err) => return Err(err.into()),
        };

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(MalformedUrlError::UnknownProtocol(other.to_string())),
        }
    }

    fn reference_for(&self, url: &Url) -> Option<EntityReference> {
        let segments: Vec<String> = url
            .path_segments()?
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .collect();

        // 🧭 Whichever marker comes first owns the path. Anything after it is
        // wiki/action/space/page territory, where "bin" and "wiki" are just names.
        let at = segments.iter().position(|s| s == "bin" || s == "wiki")?;
        let (wiki, rest) = if segments[at] == "bin" {
            (self.default_wiki.clone(), &segments[at + 1..])
        } else {
            let wiki = segments.get(at + 1).filter(|name| !name.is_empty())?;
            (wiki.clone(), segments.get(at + 2..)?)
        };

        let (action, entity) = rest.split_first()?;
        if !PAGE_ACTIONS.contains(&action.as_str()) {
            return None;
        }

        // -- a trailing "/" shows up as one empty last segment; it means "the space's home"
        let trailing_slash = entity.last().is_some_and(|last| last.is_empty());
        let mut names: Vec<String> = entity.iter().filter(|s| !s.is_empty()).cloned().collect();

        let page = match (names.len(), trailing_slash) {
            (0, _) => {
                names.push(DEFAULT_SPACE.to_string());
                DEFAULT_PAGE.to_string()
            }
            (1, _) | (_, true) => DEFAULT_PAGE.to_string(),
            _ => names.pop()?,
        };

        Some(EntityReference::new(wiki, names, page))
    }
}

impl ReferenceResolver for StandardUrlResolver {
    fn resolve(&self, label: &str) -> Result<Option<EntityReference>, MalformedUrlError> {
        let url = self.parse(label)?;
        let reference = self.reference_for(&url);
        trace!(%url, reference = ?reference.as_ref().map(ToString::to_string), "🔗 Resolved label");
        Ok(reference)
    }
}

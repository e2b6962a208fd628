//! Metadata extraction from fetched HTML.
//!
//! Sources are tried in a fixed order: Open Graph, Twitter Card, plain HTML
//! tags, then a scan of the page body. Each field is filled independently by
//! the first source that has a non-empty value for it, so a preview may take
//! its title from one tier and its image from another.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{charset, Preview, SourceTag};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const SITE_NAME_MAX_CHARS: usize = 200;

/// Smallest width/height hint for an `<img>` to count as a thumbnail.
pub const MIN_IMAGE_DIMENSION: u32 = 50;

#[derive(Debug, Default)]
struct Candidate {
    title: Option<String>,
    description: Option<String>,
    image: Option<String>,
    site_name: Option<String>,
}

type Strategy = fn(&Page) -> Candidate;

const STRATEGIES: &[(SourceTag, Strategy)] = &[
    (SourceTag::OpenGraph, open_graph),
    (SourceTag::TwitterCard, twitter_card),
    (SourceTag::HtmlMeta, html_tags),
    (SourceTag::Heuristic, body_scan),
];

struct Page {
    html: Html,
    meta: Vec<(String, String)>,
}

impl Page {
    fn parse(source: &str) -> Self {
        let html = Html::parse_document(source);
        let mut meta = Vec::new();

        if let Ok(selector) = Selector::parse("meta") {
            for el in html.select(&selector) {
                let attrs = el.value();
                let Some(content) = attrs.attr("content") else {
                    continue;
                };
                for key in [attrs.attr("property"), attrs.attr("name")].into_iter().flatten() {
                    meta.push((key.trim().to_ascii_lowercase(), content.to_string()));
                }
            }
        }

        Self { html, meta }
    }

    // keys come from `property` or `name`, lowercased
    fn meta(&self, key: &str) -> Option<String> {
        self.meta
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.clone())
    }

    fn first(&self, css: &str) -> Option<ElementRef<'_>> {
        let selector = Selector::parse(css).ok()?;
        self.html.select(&selector).next()
    }

    fn first_text(&self, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        self.html
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .find(|text| !text.trim().is_empty())
    }
}

fn open_graph(page: &Page) -> Candidate {
    Candidate {
        title: page.meta("og:title"),
        description: page.meta("og:description"),
        image: page.meta("og:image").or_else(|| page.meta("og:image:url")),
        site_name: page.meta("og:site_name"),
    }
}

fn twitter_card(page: &Page) -> Candidate {
    Candidate {
        title: page.meta("twitter:title"),
        description: page.meta("twitter:description"),
        image: page.meta("twitter:image").or_else(|| page.meta("twitter:image:src")),
        site_name: None,
    }
}

fn html_tags(page: &Page) -> Candidate {
    Candidate {
        title: page
            .first("title")
            .map(|el| el.text().collect::<String>()),
        description: page.meta("description"),
        image: first_thumbnail(page),
        site_name: None,
    }
}

fn body_scan(page: &Page) -> Candidate {
    Candidate {
        title: page.first_text("h1"),
        description: page.first_text("p"),
        image: None,
        site_name: None,
    }
}

fn first_thumbnail(page: &Page) -> Option<String> {
    let selector = Selector::parse("img").ok()?;
    let mut unhinted = None;

    for el in page.html.select(&selector) {
        let attrs = el.value();
        let Some(src) = attrs.attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }

        let hints: Vec<u32> = [attrs.attr("width"), attrs.attr("height")]
            .into_iter()
            .flatten()
            .filter_map(dimension)
            .collect();

        if hints.is_empty() {
            unhinted.get_or_insert_with(|| src.to_string());
        } else if hints.iter().all(|&d| d >= MIN_IMAGE_DIMENSION) {
            return Some(src.to_string());
        }
    }

    unhinted
}

fn dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

/// Builds a preview from a response body. `content_type` is the response
/// header, used for its charset. `base_url` is the address the body was finally
/// served from and anchors relative image links.
pub fn extract(body: &[u8], content_type: Option<&str>, base_url: &Url) -> Preview {
    let source = charset::decode(body, content_type);
    let page = Page::parse(&source);

    let mut title = None;
    let mut source_tag = SourceTag::None;
    let mut description = None;
    let mut image_url = None;
    let mut site_name = None;

    for (tag, strategy) in STRATEGIES {
        let candidate = strategy(&page);

        if title.is_none() {
            title = candidate.title.and_then(|t| clean_text(&t, TITLE_MAX_CHARS));
            if title.is_some() {
                source_tag = *tag;
            }
        }
        if description.is_none() {
            description = candidate
                .description
                .and_then(|d| clean_text(&d, DESCRIPTION_MAX_CHARS));
        }
        if image_url.is_none() {
            image_url = candidate.image.and_then(|i| resolve_image(&i, base_url));
        }
        if site_name.is_none() {
            site_name = candidate
                .site_name
                .and_then(|s| clean_text(&s, SITE_NAME_MAX_CHARS));
        }
    }

    Preview {
        url: base_url.to_string(),
        title: title.unwrap_or_else(|| title_from_url(base_url)),
        description,
        image_url,
        site_name,
        source_tag,
    }
}

pub fn clean_text(raw: &str, max_chars: usize) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= max_chars {
        return Some(collapsed);
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    Some(cut.trim_end().to_string())
}

fn resolve_image(raw: &str, base_url: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let url = base_url.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Host followed by path, without a trailing slash: `example.com/blog/post`.
pub fn title_from_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let joined = format!("{}{}", host, url.path());
    let trimmed = joined.trim_end_matches('/');
    clean_text(trimmed, TITLE_MAX_CHARS).unwrap_or_else(|| url.to_string())
}

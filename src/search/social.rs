//! Resolution of social-media links into structured content.

use std::collections::HashMap;

use crate::embedding::SocialContent;
use crate::error::{ProviderError, ProviderResult};

const COLLABORATOR: &str = "social";

/// Hosts whose links the slug resolver accepts.
const KNOWN_HOSTS: &[&str] = &[
    "pinterest.com",
    "pin.it",
    "instagram.com",
    "tiktok.com",
    "tumblr.com",
];

/// Turns a social link into content that can be embedded.
pub trait SocialResolver: Send + Sync {
    fn resolve(&self, url: &str) -> ProviderResult<SocialContent>;
}

/// Resolver that reads the descriptive slug of a link without fetching it.
///
/// `https://www.pinterest.com/pin/linen-summer-dress-outfit-8812/` resolves to
/// title "linen summer dress outfit" with one tag per word.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugSocialResolver;

impl SocialResolver for SlugSocialResolver {
    fn resolve(&self, url: &str) -> ProviderResult<SocialContent> {
        let rest = url
            .trim()
            .strip_prefix("https://")
            .or_else(|| url.trim().strip_prefix("http://"))
            .ok_or_else(|| ProviderError::new(COLLABORATOR, format!("not an http(s) link: {url}")))?;

        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = host.trim_start_matches("www.").to_ascii_lowercase();
        if !KNOWN_HOSTS
            .iter()
            .any(|known| host == *known || host.ends_with(&format!(".{known}")))
        {
            return Err(ProviderError::new(
                COLLABORATOR,
                format!("unsupported host '{host}'"),
            ));
        }

        let path = path.split(['?', '#']).next().unwrap_or_default();
        let words: Vec<String> = path
            .split('/')
            .flat_map(|segment| segment.split(['-', '_', '+', '.']))
            .map(str::to_lowercase)
            .filter(|w| w.len() > 1 && !w.chars().all(|c| c.is_ascii_digit()))
            .filter(|w| !matches!(w.as_str(), "pin" | "p" | "reel" | "video" | "post"))
            .collect();

        if words.is_empty() {
            return Err(ProviderError::new(
                COLLABORATOR,
                format!("link carries no descriptive text: {url}"),
            ));
        }

        Ok(SocialContent {
            title: words.join(" "),
            description: String::new(),
            tags: words,
            image_urls: Vec::new(),
        })
    }
}

/// Fixed URL → content table.
#[derive(Debug, Clone, Default)]
pub struct StaticSocialResolver {
    entries: HashMap<String, SocialContent>,
}

impl StaticSocialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, url: impl Into<String>, content: SocialContent) -> Self {
        self.entries.insert(url.into(), content);
        self
    }
}

impl SocialResolver for StaticSocialResolver {
    fn resolve(&self, url: &str) -> ProviderResult<SocialContent> {
        self.entries
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::new(COLLABORATOR, format!("unknown link: {url}")))
    }
}

//! Company data from the company's own website.
//!
//! Fetches the page (after consulting `robots.txt`) and pulls out a
//! description, product names, team members and social profile links.
//! Malformed HTML never fails extraction; missing sections are just empty.

use std::collections::BTreeMap;
use std::time::Duration;

use moka::future::Cache;

use prospector_core::error::AppError;
use prospector_core::models::FieldMap;
use prospector_core::traits::{Fetcher, WebsiteExtractor};
use robotstxt::DefaultMatcher;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use url::Url;

/// Product token matched against `User-agent:` lines in robots.txt.
const ROBOTS_AGENT: &str = "ProspectResearchBot";
const MAX_PRODUCTS: usize = 20;
const MAX_TEAM: usize = 25;
const MIN_PARAGRAPH_LEN: usize = 40;
/// How long an allowed robots.txt verdict is reused for the same URL.
const ROBOTS_VERDICT_TTL: Duration = Duration::from_secs(600);
const ROBOTS_VERDICT_CAPACITY: u64 = 1000;

const PRODUCT_SELECTORS: &str = "[itemtype*='schema.org/Product'] [itemprop='name'], \
     .product-name, .product h2, .product h3, .products li, #products li";
const TEAM_SELECTORS: &str =
    "[itemtype*='schema.org/Person'], .team-member, .team .member, #team .member";
const MEMBER_NAME_SELECTORS: &str = "[itemprop='name'], .name, h3, h4";
const MEMBER_ROLE_SELECTORS: &str = "[itemprop='jobTitle'], .role, .title, .position";

/// Social platforms recognised by host, in lookup order.
const SOCIAL_HOSTS: [(&str, &str); 7] = [
    ("twitter.com", "twitter"),
    ("x.com", "twitter"),
    ("linkedin.com", "linkedin"),
    ("facebook.com", "facebook"),
    ("instagram.com", "instagram"),
    ("youtube.com", "youtube"),
    ("github.com", "github"),
];

/// [`WebsiteExtractor`] backed by any [`Fetcher`].
#[derive(Clone)]
pub struct HtmlWebsiteExtractor<F: Fetcher> {
    fetcher: F,
    respect_robots: bool,
    /// URLs robots.txt already allowed, so retried extractions skip the check.
    allowed: Cache<String, ()>,
}

impl<F: Fetcher> HtmlWebsiteExtractor<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            respect_robots: true,
            allowed: Cache::builder()
                .max_capacity(ROBOTS_VERDICT_CAPACITY)
                .time_to_live(ROBOTS_VERDICT_TTL)
                .build(),
        }
    }

    /// Skip the robots.txt check.
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    /// An unreachable robots.txt allows everything.
    async fn check_robots(&self, url: &Url) -> Result<(), AppError> {
        let Ok(robots_url) = url.join("/robots.txt") else {
            return Ok(());
        };
        let body = match self.fetcher.fetch(robots_url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(robots = %robots_url, error = %e, "No usable robots.txt, allowing");
                return Ok(());
            }
        };

        let mut matcher = DefaultMatcher::default();
        if matcher.one_agent_allowed_by_robots(&body, ROBOTS_AGENT, url.as_str()) {
            Ok(())
        } else {
            Err(AppError::RobotsDisallowed(url.to_string()))
        }
    }
}

impl<F: Fetcher> WebsiteExtractor for HtmlWebsiteExtractor<F> {
    async fn extract_website_data(&self, url: &str) -> Result<FieldMap, AppError> {
        let parsed =
            Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;

        if self.respect_robots && !self.allowed.contains_key(url) {
            self.check_robots(&parsed).await?;
            self.allowed.insert(url.to_string(), ()).await;
        }

        let html = self.fetcher.fetch(url).await?;
        tracing::debug!(bytes = html.len(), "Fetched company page");
        Ok(parse_company_page(&html, &parsed))
    }
}

/// Extract company fields from a page. Always yields `products`, `team` and
/// `social_media` (possibly empty); `description` only when one is found.
pub fn parse_company_page(html: &str, base: &Url) -> FieldMap {
    let doc = Html::parse_document(html);
    let mut fields = FieldMap::new();

    if let Some(description) = extract_description(&doc) {
        fields.insert("description".into(), Value::String(description));
    }
    fields.insert("products".into(), json!(extract_products(&doc)));
    fields.insert("team".into(), extract_team(&doc));
    fields.insert("social_media".into(), json!(extract_social_links(&doc, base)));
    fields
}

fn extract_description(doc: &Html) -> Option<String> {
    let meta = ["meta[name='description']", "meta[property='og:description']"]
        .into_iter()
        .filter_map(|css| select_first(doc, css))
        .filter_map(|el| el.value().attr("content").map(normalize))
        .find(|content| !content.is_empty());

    meta.or_else(|| {
        select_all(doc, "main p, article p, body p")
            .map(|p| normalize(&p.text().collect::<String>()))
            .find(|text| text.len() >= MIN_PARAGRAPH_LEN)
    })
}

fn extract_products(doc: &Html) -> Vec<String> {
    let mut products: Vec<String> = Vec::new();
    for el in select_all(doc, PRODUCT_SELECTORS) {
        let name = normalize(&el.text().collect::<String>());
        if !name.is_empty() && !products.contains(&name) {
            products.push(name);
        }
        if products.len() == MAX_PRODUCTS {
            break;
        }
    }
    products
}

fn extract_team(doc: &Html) -> Value {
    let (Ok(name_sel), Ok(role_sel)) = (
        Selector::parse(MEMBER_NAME_SELECTORS),
        Selector::parse(MEMBER_ROLE_SELECTORS),
    ) else {
        return json!([]);
    };

    let members: Vec<Value> = select_all(doc, TEAM_SELECTORS)
        .filter_map(|card| {
            let name = first_text(card, &name_sel)?;
            let role = first_text(card, &role_sel).unwrap_or_default();
            Some(json!({"name": name, "role": role}))
        })
        .take(MAX_TEAM)
        .collect();
    Value::Array(members)
}

fn extract_social_links(doc: &Html, base: &Url) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    for anchor in select_all(doc, "a[href]") {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(target) = base.join(href) else {
            continue;
        };
        let Some(host) = target.host_str() else {
            continue;
        };
        let host = host.strip_prefix("www.").unwrap_or(host);
        if let Some((_, platform)) = SOCIAL_HOSTS
            .iter()
            .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        {
            links
                .entry(platform.to_string())
                .or_insert_with(|| target.to_string());
        }
    }
    links
}

fn select_all<'a>(doc: &'a Html, css: &str) -> impl Iterator<Item = ElementRef<'a>> {
    let selector = Selector::parse(css).ok();
    selector
        .into_iter()
        .flat_map(move |sel| doc.select(&sel).collect::<Vec<_>>())
}

fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    select_all(doc, css).next()
}

fn first_text(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector)
        .map(|e| normalize(&e.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! HTTP Skills
//!
//! Network information gathering: raw HTTP requests, RSS feeds, CSS-scoped
//! page scraping, and search-engine results.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::time::Duration;

use crate::skills::registry::Skill;
use crate::skills::schema::ToolSpec;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_BODY_CHARS: usize = 5000;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .unwrap_or_default()
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() > max {
        (text.chars().take(max).collect(), true)
    } else {
        (text.to_string(), false)
    }
}

// ---------- http_request ----------

pub struct HttpRequestSkill;

impl HttpRequestSkill {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpRequestSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for HttpRequestSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "http_request",
            "发送 HTTP 请求获取数据。支持 GET 和 POST 请求，可用于获取网页内容、调用 API、下载 JSON 数据等。当需要从网络获取信息时使用此工具。",
        )
        .string_param("url", "请求的 URL 地址", true)
        .enum_param("method", "HTTP 方法，默认 GET", &["GET", "POST"], false)
        .object_param("headers", "请求头，可选", false)
        .object_param("data", "POST 请求的数据，可选", false)
        .int_param("timeout", "超时时间（秒），默认 30", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let url = args["url"].as_str().unwrap_or("");
        if url.is_empty() {
            return json!({"success": false, "error": "缺少 URL"});
        }

        let method = args["method"].as_str().unwrap_or("GET").to_uppercase();
        let timeout = args["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = http_client(timeout);

        let mut request = if method == "POST" {
            let mut req = client.post(url);
            if let Some(data) = args.get("data").filter(|d| d.is_object()) {
                req = req.json(data);
            }
            req
        } else {
            client.get(url)
        };

        if let Some(headers) = args["headers"].as_object() {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key, v);
                }
            }
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return json!({"success": false, "error": format!("请求失败: {}", e)}),
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (content, truncated) = truncate_chars(&body, MAX_BODY_CHARS);

        json!({
            "success": true,
            "status": status,
            "content": content,
            "truncated": truncated,
        })
    }
}

// ---------- rss_fetcher ----------

static RSS_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<item[ >](.*?)</item>").expect("static pattern"));
static RSS_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<title>(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?</title>").expect("static pattern")
});
static RSS_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<link>(.*?)</link>").expect("static pattern"));

pub struct RssSkill;

impl RssSkill {
    pub fn new() -> Self {
        Self
    }

    /// Shallow item extraction; enough for titles and links
    fn parse_items(feed: &str, max_items: usize) -> Vec<Value> {
        RSS_ITEM
            .captures_iter(feed)
            .take(max_items)
            .map(|item| {
                let body = &item[1];
                let title = RSS_TITLE
                    .captures(body)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_default();
                let link = RSS_LINK
                    .captures(body)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_default();
                json!({"title": title, "link": link})
            })
            .collect()
    }
}

impl Default for RssSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for RssSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "rss_fetcher",
            "获取 RSS/播客订阅源内容。用于读取博客更新、播客节目列表、新闻订阅等。",
        )
        .string_param("url", "RSS 订阅源地址", true)
        .int_param("max_items", "返回条目数量，默认 5", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let url = args["url"].as_str().unwrap_or("");
        if url.is_empty() {
            return json!({"success": false, "error": "缺少订阅源地址"});
        }
        let max_items = args["max_items"].as_u64().unwrap_or(5) as usize;

        let feed = match http_client(DEFAULT_TIMEOUT_SECS).get(url).send().await {
            Ok(r) => r.text().await.unwrap_or_default(),
            Err(e) => return json!({"success": false, "error": format!("获取订阅源失败: {}", e)}),
        };

        let items = Self::parse_items(&feed, max_items);
        if items.is_empty() {
            return json!({"success": false, "error": "订阅源中没有找到条目"});
        }

        json!({"success": true, "items": items})
    }
}

// ---------- web_scraper ----------

pub struct WebScraperSkill;

impl WebScraperSkill {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebScraperSkill {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract text matched by a CSS selector; parsing stays synchronous
fn scrape_text(html: &str, selector: &str) -> Result<String, String> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(selector).map_err(|_| format!("无效的选择器: {}", selector))?;

    let parts: Vec<String> = document
        .select(&selector)
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect();

    if parts.is_empty() {
        Err("选择器未匹配任何内容".to_string())
    } else {
        Ok(parts.join("\n"))
    }
}

#[async_trait]
impl Skill for WebScraperSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "web_scraper",
            "网页内容抓取工具。获取指定网页并用 CSS 选择器提取内容，适合结构化页面的数据采集。",
        )
        .string_param("url", "网页地址", true)
        .string_param("selector", "CSS 选择器，默认 body", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let url = args["url"].as_str().unwrap_or("");
        if url.is_empty() {
            return json!({"success": false, "error": "缺少网页地址"});
        }
        let selector = args["selector"].as_str().unwrap_or("body").to_string();

        let html = match http_client(DEFAULT_TIMEOUT_SECS).get(url).send().await {
            Ok(r) => r.text().await.unwrap_or_default(),
            Err(e) => return json!({"success": false, "error": format!("获取网页失败: {}", e)}),
        };

        match scrape_text(&html, &selector) {
            Ok(text) => {
                let (content, truncated) = truncate_chars(&text, MAX_BODY_CHARS);
                json!({"success": true, "content": content, "truncated": truncated})
            }
            Err(e) => json!({"success": false, "error": e}),
        }
    }
}

// ---------- web_search ----------

pub struct WebSearchSkill;

impl WebSearchSkill {
    pub fn new() -> Self {
        Self
    }

    /// Parse result blocks out of a search results page
    fn parse_results(html: &str, max_results: usize) -> Vec<Value> {
        let document = Html::parse_document(html);
        let result_sel = Selector::parse(".result").expect("static selector");
        let title_sel = Selector::parse(".t a, h3 a").expect("static selector");
        let abstract_sel = Selector::parse(".c-abstract, .content-right_8Zs40").expect("static selector");

        document
            .select(&result_sel)
            .filter_map(|item| {
                let title_el = item.select(&title_sel).next()?;
                let title = title_el.text().collect::<String>().trim().to_string();
                let url = title_el.value().attr("href").unwrap_or_default().to_string();
                let snippet = item
                    .select(&abstract_sel)
                    .next()
                    .map(|a| a.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();

                if title.is_empty() {
                    None
                } else {
                    Some(json!({"title": title, "url": url, "snippet": snippet}))
                }
            })
            .take(max_results)
            .collect()
    }
}

impl Default for WebSearchSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn definition(&self) -> Value {
        ToolSpec::new(
            "web_search",
            "网络搜索工具。用于查询信息、获取最新数据、查找资料等需要从网络获取信息的任务。",
        )
        .string_param("query", "搜索关键词或问题。", true)
        .int_param("max_results", "返回结果数量，默认3条。", false)
        .build()
    }

    async fn invoke(&self, args: Value) -> Value {
        let query = args["query"].as_str().unwrap_or("");
        if query.is_empty() {
            return json!({"success": false, "error": "搜索关键词不能为空"});
        }
        let max_results = args["max_results"].as_u64().unwrap_or(3) as usize;

        let search_url = format!(
            "https://www.baidu.com/s?wd={}",
            urlencode(query)
        );

        let html = match http_client(10).get(&search_url).send().await {
            Ok(r) => r.text().await.unwrap_or_default(),
            Err(e) => return json!({"success": false, "error": format!("搜索请求失败: {}", e)}),
        };

        let results = Self::parse_results(&html, max_results);
        if results.is_empty() {
            return json!({"success": false, "error": "未找到搜索结果"});
        }

        json!({"success": true, "query": query, "results": results})
    }
}

/// Percent-encode a query string component
fn urlencode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() * 3);
    for byte in text.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(*byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        let (text, truncated) = truncate_chars("hello", 10);
        assert_eq!(text, "hello");
        assert!(!truncated);

        let (text, truncated) = truncate_chars("hello world", 5);
        assert_eq!(text, "hello");
        assert!(truncated);
    }

    #[test]
    fn test_rss_item_parsing() {
        let feed = r#"<rss><channel>
            <item><title>Episode 1</title><link>https://pod.example/1</link></item>
            <item><title><![CDATA[Episode 2]]></title><link>https://pod.example/2</link></item>
        </channel></rss>"#;

        let items = RssSkill::parse_items(feed, 5);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "Episode 1");
        assert_eq!(items[1]["title"], "Episode 2");
        assert_eq!(items[1]["link"], "https://pod.example/2");
    }

    #[test]
    fn test_scrape_text() {
        let html = "<html><body><p class='x'>first</p><p class='x'>second</p></body></html>";
        let text = scrape_text(html, ".x").unwrap();
        assert_eq!(text, "first\nsecond");

        assert!(scrape_text(html, ".missing").is_err());
    }

    #[test]
    fn test_search_result_parsing() {
        let html = r#"<div class="result">
            <div class="t"><a href="https://a.example">Rust 入门教程</a></div>
            <div class="c-abstract">快速学习 Rust 的方法</div>
        </div>"#;

        let results = WebSearchSkill::parse_results(html, 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Rust 入门教程");
        assert!(results[0]["snippet"].as_str().unwrap().contains("学习"));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("rust lang"), "rust%20lang");
        assert_eq!(urlencode("abc_123"), "abc_123");
    }

    #[tokio::test]
    async fn test_http_request_missing_url() {
        let skill = HttpRequestSkill::new();
        let result = skill.invoke(json!({})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let skill = WebSearchSkill::new();
        let result = skill.invoke(json!({"query": ""})).await;
        assert_eq!(result["success"], false);
    }
}

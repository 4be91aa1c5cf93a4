//! Browser Controller
//!
//! HTTP-mode page driver: fetches pages with a desktop user agent and a
//! cookie jar, and answers extraction/interaction operations against the
//! fetched document. Clicking follows the matched anchor; form fills are
//! staged and sent on submit. A full browser engine stays outside this
//! crate; the controller covers the information-gathering surface.
//!
//! Every operation passes through the safety guard first, and guard
//! denials are returned in the standard decision shape.

use reqwest::Url;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::guard::SafetyGuard;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_EXTRACT_CHARS: usize = 5000;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl BrowserConfig {
    pub fn from_env() -> Self {
        Self {
            timeout_secs: std::env::var("BROWSER_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            user_agent: std::env::var("BROWSER_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// The currently loaded page
#[derive(Debug, Clone)]
pub struct PageState {
    pub url: String,
    pub status: u16,
    pub title: String,
    pub html: String,
}

/// HTTP-mode browser controller
pub struct BrowserController {
    client: reqwest::Client,
    guard: Arc<SafetyGuard>,
    page: Option<PageState>,
    /// field name -> staged value for the next submit
    staged_form: HashMap<String, String>,
}

impl BrowserController {
    pub fn new(config: BrowserConfig, guard: Arc<SafetyGuard>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .cookie_store(true)
            .build()
            .unwrap_or_default();

        Self {
            client,
            guard,
            page: None,
            staged_form: HashMap::new(),
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.as_str())
    }

    /// Fetch a URL and make it the current page
    pub async fn navigate(&mut self, url: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("navigate", url, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return json!({"success": false, "error": format!("请求失败: {}", e)}),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => return json!({"success": false, "error": format!("读取响应失败: {}", e)}),
        };

        let title = extract_title(&html);
        info!("Navigated to {} ({} bytes)", final_url, html.len());

        self.page = Some(PageState {
            url: final_url.clone(),
            status,
            title: title.clone(),
            html,
        });
        self.staged_form.clear();

        json!({
            "success": true,
            "url": final_url,
            "status": status,
            "title": title,
        })
    }

    /// Extract visible text from the current page, optionally scoped
    pub fn extract_text(&self, selector: Option<&str>) -> Value {
        let decision = self
            .guard
            .check_operation("extract", selector.unwrap_or("body"), "", false);
        if !decision.allowed {
            return decision.to_json();
        }

        let page = match &self.page {
            Some(p) => p,
            None => return json!({"success": false, "error": "尚未打开任何页面"}),
        };

        let text = match extract_page_text(&page.html, selector) {
            Ok(t) => t,
            Err(e) => return json!({"success": false, "error": e}),
        };

        let truncated = text.chars().count() > MAX_EXTRACT_CHARS;
        let body: String = text.chars().take(MAX_EXTRACT_CHARS).collect();

        json!({
            "success": true,
            "url": page.url,
            "text": body,
            "truncated": truncated,
        })
    }

    /// Page title of the current page
    pub fn title(&self) -> Value {
        let decision = self.guard.check_operation("get_title", "", "", false);
        if !decision.allowed {
            return decision.to_json();
        }

        match &self.page {
            Some(p) => json!({"success": true, "title": p.title, "url": p.url}),
            None => json!({"success": false, "error": "尚未打开任何页面"}),
        }
    }

    /// Anchor links on the current page (text + absolute href)
    pub fn links(&self, limit: usize) -> Value {
        let decision = self.guard.check_operation("read", "links", "", false);
        if !decision.allowed {
            return decision.to_json();
        }

        let page = match &self.page {
            Some(p) => p,
            None => return json!({"success": false, "error": "尚未打开任何页面"}),
        };

        let links = collect_links(&page.html, &page.url, limit);
        json!({"success": true, "url": page.url, "links": links})
    }

    /// Follow the anchor matched by a CSS selector
    pub async fn click(&mut self, selector: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("click", selector, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let href = {
            let page = match &self.page {
                Some(p) => p,
                None => return json!({"success": false, "error": "尚未打开任何页面"}),
            };
            match find_href(&page.html, &page.url, selector) {
                Ok(h) => h,
                Err(e) => return json!({"success": false, "error": e}),
            }
        };

        debug!("Click follows link: {}", href);
        // The target URL inherits this click's approval; the navigate check
        // still applies its own URL-scheme validation.
        self.navigate(&href, true).await
    }

    /// Stage a value for a form field matched by a CSS selector
    pub fn fill(&mut self, selector: &str, value: &str, auto_confirm: bool) -> Value {
        let decision = self.guard.check_operation("fill", selector, value, auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let page = match &self.page {
            Some(p) => p,
            None => return json!({"success": false, "error": "尚未打开任何页面"}),
        };

        let field_name = match find_field_name(&page.html, selector) {
            Ok(n) => n,
            Err(e) => return json!({"success": false, "error": e}),
        };

        self.staged_form.insert(field_name.clone(), value.to_string());
        json!({"success": true, "field": field_name, "staged_fields": self.staged_form.len()})
    }

    /// Send the staged values to the current page's form
    pub async fn submit(&mut self, auto_confirm: bool) -> Value {
        let target = self.current_url().unwrap_or("").to_string();
        let decision = self.guard.check_operation("submit", &target, "", auto_confirm);
        if !decision.allowed {
            return decision.to_json();
        }

        let (action, method, mut fields) = {
            let page = match &self.page {
                Some(p) => p,
                None => return json!({"success": false, "error": "尚未打开任何页面"}),
            };
            match form_target(&page.html, &page.url) {
                Ok(t) => t,
                Err(e) => return json!({"success": false, "error": e}),
            }
        };

        for (name, value) in &self.staged_form {
            fields.insert(name.clone(), value.clone());
        }

        let response = if method.eq_ignore_ascii_case("post") {
            self.client.post(&action).form(&fields).send().await
        } else {
            self.client.get(&action).query(&fields).send().await
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => return json!({"success": false, "error": format!("表单提交失败: {}", e)}),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await.unwrap_or_default();
        let title = extract_title(&html);

        self.page = Some(PageState {
            url: final_url.clone(),
            status,
            title: title.clone(),
            html,
        });
        self.staged_form.clear();

        json!({"success": true, "url": final_url, "status": status, "title": title})
    }
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|_| format!("无效的选择器: {}", selector))
}

fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").expect("static selector");
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn extract_page_text(html: &str, selector: Option<&str>) -> Result<String, String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector.unwrap_or("body"))?;

    let mut parts = Vec::new();
    for element in document.select(&selector) {
        let text: Vec<&str> = element.text().map(str::trim).filter(|t| !t.is_empty()).collect();
        if !text.is_empty() {
            parts.push(text.join(" "));
        }
    }

    if parts.is_empty() {
        return Err("选择器未匹配任何内容".to_string());
    }
    Ok(parts.join("\n"))
}

fn collect_links(html: &str, base_url: &str, limit: usize) -> Vec<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");
    let base = Url::parse(base_url).ok();

    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let absolute = resolve_href(base.as_ref(), href)?;
            let text = a.text().collect::<String>().trim().to_string();
            Some(json!({"text": text, "href": absolute}))
        })
        .take(limit)
        .collect()
}

fn find_href(html: &str, base_url: &str, selector: &str) -> Result<String, String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector)?;
    let base = Url::parse(base_url).ok();

    let element = document
        .select(&selector)
        .next()
        .ok_or_else(|| "选择器未匹配任何元素".to_string())?;

    let href = element
        .value()
        .attr("href")
        .ok_or_else(|| "匹配的元素不是链接".to_string())?;

    resolve_href(base.as_ref(), href).ok_or_else(|| "无法解析链接地址".to_string())
}

fn find_field_name(html: &str, selector: &str) -> Result<String, String> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector)?;

    let element = document
        .select(&selector)
        .next()
        .ok_or_else(|| "选择器未匹配任何元素".to_string())?;

    element
        .value()
        .attr("name")
        .or_else(|| element.value().attr("id"))
        .map(|s| s.to_string())
        .ok_or_else(|| "匹配的元素没有 name 属性".to_string())
}

/// First form's absolute action URL, method, and hidden-field defaults
fn form_target(
    html: &str,
    base_url: &str,
) -> Result<(String, String, HashMap<String, String>), String> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").expect("static selector");
    let base = Url::parse(base_url).ok();

    let form = document
        .select(&form_selector)
        .next()
        .ok_or_else(|| "页面上没有表单".to_string())?;

    let action = form
        .value()
        .attr("action")
        .and_then(|a| resolve_href(base.as_ref(), a))
        .unwrap_or_else(|| base_url.to_string());
    let method = form.value().attr("method").unwrap_or("get").to_string();

    let hidden_selector = Selector::parse("input[type=hidden]").expect("static selector");
    let mut fields = HashMap::new();
    for input in form.select(&hidden_selector) {
        if let (Some(name), Some(value)) = (input.value().attr("name"), input.value().attr("value"))
        {
            fields.insert(name.to_string(), value.to_string());
        }
    }

    Ok((action, method, fields))
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const PAGE: &str = r#"<html><head><title>Demo Page</title></head>
        <body>
        <h1>Welcome</h1>
        <p class="intro">Some intro text.</p>
        <a id="next" href="/page2">Next page</a>
        <form action="/search" method="get">
          <input type="hidden" name="token" value="abc"/>
          <input type="text" name="q" id="query"/>
        </form>
        </body></html>"#;

    fn controller_with_page() -> BrowserController {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_browser_audit")));
        let mut controller = BrowserController::new(BrowserConfig::default(), guard);
        controller.page = Some(PageState {
            url: "https://example.com/page1".to_string(),
            status: 200,
            title: "Demo Page".to_string(),
            html: PAGE.to_string(),
        });
        controller
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title(PAGE), "Demo Page");
    }

    #[test]
    fn test_extract_text_with_selector() {
        let controller = controller_with_page();
        let result = controller.extract_text(Some(".intro"));
        assert_eq!(result["success"], true);
        assert!(result["text"].as_str().unwrap().contains("intro text"));
    }

    #[test]
    fn test_extract_text_no_match() {
        let controller = controller_with_page();
        let result = controller.extract_text(Some(".missing"));
        assert_eq!(result["success"], false);
    }

    #[test]
    fn test_links_are_absolute() {
        let controller = controller_with_page();
        let result = controller.links(10);
        assert_eq!(result["success"], true);
        assert_eq!(result["links"][0]["href"], "https://example.com/page2");
    }

    #[test]
    fn test_find_href_resolves_relative() {
        let href = find_href(PAGE, "https://example.com/page1", "#next").unwrap();
        assert_eq!(href, "https://example.com/page2");
    }

    #[test]
    fn test_fill_requires_confirmation() {
        let mut controller = controller_with_page();
        let result = controller.fill("#query", "rust", false);
        assert_eq!(result["allowed"], false);
        assert_eq!(result["requires_confirmation"], true);
    }

    #[test]
    fn test_fill_with_auto_confirm_stages_field() {
        let mut controller = controller_with_page();
        let result = controller.fill("#query", "rust", true);
        assert_eq!(result["success"], true);
        assert_eq!(result["field"], "q");
    }

    #[test]
    fn test_form_target_includes_hidden_fields() {
        let (action, method, fields) = form_target(PAGE, "https://example.com/page1").unwrap();
        assert_eq!(action, "https://example.com/search");
        assert_eq!(method, "get");
        assert_eq!(fields.get("token").map(|s| s.as_str()), Some("abc"));
    }

    #[tokio::test]
    async fn test_navigate_rejects_bad_scheme() {
        let guard = Arc::new(SafetyGuard::new(Path::new("/tmp/neo_test_browser_audit")));
        let mut controller = BrowserController::new(BrowserConfig::default(), guard);
        let result = controller.navigate("javascript:alert(1)", false).await;
        assert_eq!(result["allowed"], false);
    }
}

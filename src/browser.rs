use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use thirtyfour::cookie::Cookie;
use thirtyfour::prelude::*;
use tokio::time::sleep;

use crate::config::{parse_cookie_pairs, COOKIE_DOMAIN, FORUM_URL};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PAGE_SETTLE: Duration = Duration::from_secs(5);
const LOGIN_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_5_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Thin capability layer over the WebDriver session. The rest of the
/// program drives the page only through these methods.
pub struct Browser {
    driver: WebDriver,
    verbose: bool,
}

impl Browser {
    pub async fn launch(webdriver_url: &str, headless: bool, verbose: bool) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();

        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];

        let mut chrome_args = vec![
            format!("--user-agent={}", user_agent),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-infobars".to_string(),
            "--disable-notifications".to_string(),
            "--disable-popup-blocking".to_string(),
            "--lang=zh-CN".to_string(),
        ];

        if headless {
            chrome_args.push("--headless=new".to_string());
            chrome_args.push("--window-size=1920,1080".to_string());
        }

        for arg in &chrome_args {
            caps.add_arg(arg)?;
        }

        caps.add_experimental_option("excludeSwitches", vec!["enable-automation"])?;
        caps.add_experimental_option("useAutomationExtension", false)?;

        let driver = WebDriver::new(webdriver_url, caps)
            .await
            .context("Failed to create WebDriver. Make sure ChromeDriver is running")?;

        let _ = driver
            .execute(
                "const newProto = navigator.__proto__; delete newProto.webdriver; navigator.__proto__ = newProto;",
                vec![],
            )
            .await;

        if verbose {
            println!("[INIT] Using User-Agent: {}", user_agent);
        }

        Ok(Self { driver, verbose })
    }

    /// Navigates to the forum, injects the session cookies, reloads and
    /// runs a best-effort login check. Returns whether the avatar was
    /// found; a stale cookie is reported, never fatal.
    pub async fn open_forum_with_cookies(&self, cookie_string: &str) -> Result<bool> {
        println!("[INIT] Opening {}", FORUM_URL);
        self.driver.goto(FORUM_URL).await?;
        sleep(PAGE_SETTLE).await;

        let pairs = parse_cookie_pairs(cookie_string);
        println!("[INIT] Injecting {} cookies", pairs.len());
        for (name, value) in pairs {
            let mut cookie = Cookie::new(name.clone(), value);
            cookie.set_domain(COOKIE_DOMAIN);
            cookie.set_path("/");
            if let Err(e) = self.driver.add_cookie(cookie).await {
                println!("[INIT] Failed to set cookie {}: {}", name, e);
            }
        }

        self.driver.refresh().await?;
        sleep(PAGE_SETTLE).await;

        let logged_in = self
            .driver
            .query(By::Css(".user-avatar"))
            .wait(LOGIN_CHECK_TIMEOUT, POLL_INTERVAL)
            .first()
            .await
            .is_ok();

        if logged_in {
            println!("[INIT] Login check: avatar found, session looks valid");
        } else {
            println!("[INIT] Login check: no avatar found. Check that the cookie is still valid");
        }
        Ok(logged_in)
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .with_context(|| format!("Navigation failed: {}", url))
    }

    pub async fn wait_css(&self, css: &str, timeout: Duration) -> Result<WebElement> {
        self.driver
            .query(By::Css(css))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await
            .with_context(|| format!("Element not found: {}", css))
    }

    pub async fn wait_all_css(&self, css: &str, timeout: Duration) -> Result<Vec<WebElement>> {
        self.driver
            .query(By::Css(css))
            .wait(timeout, POLL_INTERVAL)
            .all_from_selector()
            .await
            .with_context(|| format!("Elements not found: {}", css))
    }

    pub async fn wait_xpath(&self, xpath: &str, timeout: Duration) -> Result<WebElement> {
        self.driver
            .query(By::XPath(xpath))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await
            .with_context(|| format!("Element not found: {}", xpath))
    }

    /// Immediate lookup, no polling.
    pub async fn find_now(&self, by: By) -> Option<WebElement> {
        self.driver.find(by).await.ok()
    }

    /// Native click, falling back to a script click when the element is
    /// obscured or the driver refuses.
    pub async fn click_with_js_fallback(&self, element: &WebElement) -> Result<()> {
        match element.click().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.verbose {
                    println!("[CLICK] Native click failed, trying JS click: {}", e);
                }
                self.driver
                    .execute("arguments[0].click();", vec![element.to_json()?])
                    .await
                    .context("JS click failed")?;
                Ok(())
            }
        }
    }

    pub async fn scroll_into_view(&self, element: &WebElement) -> Result<()> {
        self.driver
            .execute(
                "arguments[0].scrollIntoView({block: 'center'});",
                vec![element.to_json()?],
            )
            .await?;
        Ok(())
    }

    /// Best-effort page scroll, used to simulate reading.
    pub async fn scroll_by(&self, pixels: i64) {
        let _ = self
            .driver
            .execute(&format!("window.scrollBy(0, {});", pixels), vec![])
            .await;
    }

    /// Clicks the element and types into whatever took focus, one
    /// character at a time with randomized pauses.
    pub async fn human_type(&self, element: &WebElement, text: &str) -> Result<()> {
        element.click().await?;
        sleep(Duration::from_millis(500)).await;

        let target = self
            .driver
            .active_element()
            .await
            .unwrap_or_else(|_| element.clone());

        let mut rng = rand::thread_rng();
        for ch in text.chars() {
            target.send_keys(ch.to_string()).await?;
            sleep(Duration::from_millis(rng.gen_range(100..300))).await;
        }
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    /// First `limit` chars of the page source, for failure dumps.
    pub async fn page_source_snippet(&self, limit: usize) -> String {
        match self.driver.source().await {
            Ok(source) => source.chars().take(limit).collect(),
            Err(_) => String::new(),
        }
    }

    pub async fn save_screenshot(&self, filename: &str) -> Result<()> {
        let screenshot = self.driver.screenshot_as_png().await?;
        std::fs::write(filename, screenshot)?;
        if self.verbose {
            println!("[SCREENSHOT] Saved: {}", filename);
        }
        Ok(())
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}

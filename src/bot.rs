use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use thirtyfour::prelude::*;
use tokio::time::sleep;

use crate::browser::Browser;
use crate::config::{Config, FORUM_URL};
use crate::gemini::GeminiClient;

const LOG_FILE: &str = "comment_log.txt";

const LISTING_TIMEOUT: Duration = Duration::from_secs(30);
const POST_ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const EDITOR_TIMEOUT: Duration = Duration::from_secs(30);
const SIGN_ICON_TIMEOUT: Duration = Duration::from_secs(30);
const DIALOG_TIMEOUT: Duration = Duration::from_secs(5);
const REWARD_TIMEOUT: Duration = Duration::from_secs(5);

const SAMPLE_MIN: usize = 20;
const SAMPLE_MAX: usize = 25;
const CEILING_MIN: u32 = 20;
const CEILING_MAX: u32 = 25;
const POST_SLEEP_SECS: (u64, u64) = (600, 900);
const POST_CONTENT_CAP: usize = 500;

/// What happened with a single post. Skips are ordinary outcomes, not
/// errors; only driver-level surprises bubble up as `Err`.
#[derive(Debug)]
pub enum PostOutcome {
    Commented { reply: String },
    LikedOnly,
    Skipped(SkipReason),
}

#[derive(Debug)]
pub enum SkipReason {
    NoReply,
    EditorNotFound(String),
    SubmitNotFound(String),
    Navigation(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoReply => write!(f, "no usable reply from Gemini"),
            SkipReason::EditorNotFound(e) => write!(f, "comment editor not found: {}", e),
            SkipReason::SubmitNotFound(e) => write!(f, "submit button not found: {}", e),
            SkipReason::Navigation(e) => write!(f, "navigation failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostAction {
    CommentOnly,
    LikeOnly,
    Both,
}

impl PostAction {
    fn includes_comment(self) -> bool {
        matches!(self, PostAction::CommentOnly | PostAction::Both)
    }

    fn includes_like(self) -> bool {
        matches!(self, PostAction::LikeOnly | PostAction::Both)
    }
}

/// Weighted pick: comment-only 0.5, like-only 0.3, both 0.2.
fn action_for_roll(roll: f64) -> PostAction {
    if roll < 0.5 {
        PostAction::CommentOnly
    } else if roll < 0.8 {
        PostAction::LikeOnly
    } else {
        PostAction::Both
    }
}

fn pick_action(rng: &mut impl Rng) -> PostAction {
    action_for_roll(rng.gen::<f64>())
}

/// Sampled posts never exceed what the listing actually offers.
fn sample_size(requested: usize, available: usize) -> usize {
    requested.min(available)
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", FORUM_URL, href)
    } else {
        format!("{}/{}", FORUM_URL, href)
    }
}

pub struct NodeSeekBot {
    browser: Browser,
    gemini: GeminiClient,
    config: Config,
    verbose: bool,
    comment_count: u32,
    liked: bool,
}

impl NodeSeekBot {
    pub fn new(browser: Browser, gemini: GeminiClient, config: Config, verbose: bool) -> Self {
        Self {
            browser,
            gemini,
            config,
            verbose,
            comment_count: 0,
            liked: false,
        }
    }

    pub fn comments_posted(&self) -> u32 {
        self.comment_count
    }

    /// Browses a random sample of front-page posts and comments on
    /// them, up to a randomly chosen daily ceiling.
    pub async fn comment_pass(&mut self) -> Result<()> {
        println!("\n[BROWSE] Opening the front page");
        self.browser.goto(FORUM_URL).await?;

        let posts = self
            .browser
            .wait_all_css(".post-list-item", LISTING_TIMEOUT)
            .await
            .context("Post list did not load")?;
        println!("[BROWSE] Found {} posts", posts.len());

        let mut urls = Vec::new();
        for post in &posts {
            // pinned posts are announcements, not worth replying to
            if post.find(By::Css(".pined")).await.is_ok() {
                continue;
            }
            if let Ok(link) = post.find(By::Css(".post-title a")).await {
                if let Ok(Some(href)) = link.attr("href").await {
                    urls.push(absolute_url(&href));
                }
            }
        }

        let mut rng = rand::thread_rng();
        let quota = sample_size(rng.gen_range(SAMPLE_MIN..=SAMPLE_MAX), urls.len());
        urls.shuffle(&mut rng);
        urls.truncate(quota);

        let ceiling = rng.gen_range(CEILING_MIN..=CEILING_MAX);
        if self.verbose {
            println!(
                "[BROWSE] Visiting {} posts, daily comment ceiling {}",
                urls.len(),
                ceiling
            );
        }

        for (i, url) in urls.iter().enumerate() {
            if self.comment_count >= ceiling {
                println!("[LIMIT] Daily comment ceiling reached, stopping");
                break;
            }

            println!("\n[POST] ({}/{}) {}", i + 1, urls.len(), url);
            match self.process_post(url).await {
                Ok(PostOutcome::Commented { reply }) => {
                    self.comment_count += 1;
                    self.append_log(&format!("Commented on {} with '{}'", url, reply))?;
                    println!("[SUCCESS] Comment posted ({} this run)", self.comment_count);
                }
                Ok(PostOutcome::LikedOnly) => {
                    println!("[POST] Like only, no comment");
                }
                Ok(PostOutcome::Skipped(reason)) => {
                    self.append_log(&format!("Skipped comment on {} ({})", url, reason))?;
                    println!("[SKIP] {}", reason);
                }
                Err(e) => {
                    println!("[ERROR] Post failed: {:#}", e);
                }
            }

            let wait = rng.gen_range(POST_SLEEP_SECS.0..=POST_SLEEP_SECS.1);
            println!("[WAIT] Sleeping {} seconds before the next post", wait);
            sleep(Duration::from_secs(wait)).await;
        }

        println!(
            "\n[BROWSE] Comment pass finished, {} comments posted",
            self.comment_count
        );
        Ok(())
    }

    async fn process_post(&mut self, url: &str) -> Result<PostOutcome> {
        if let Err(e) = self.browser.goto(url).await {
            return Ok(PostOutcome::Skipped(SkipReason::Navigation(e.to_string())));
        }

        // simulate reading before doing anything
        self.browser.scroll_by(500).await;
        let pause = {
            let mut rng = rand::thread_rng();
            rng.gen_range(2000..5000)
        };
        sleep(Duration::from_millis(pause)).await;

        let (title, content) = self.extract_post().await;
        println!("[POST] \"{}\"", title);

        let reply = match self.gemini.generate_reply(&title, &content).await {
            Some(reply) => reply,
            None => return Ok(PostOutcome::Skipped(SkipReason::NoReply)),
        };

        let action = {
            let mut rng = rand::thread_rng();
            pick_action(&mut rng)
        };
        if self.verbose {
            println!("[POST] Action: {:?}", action);
        }

        if action.includes_like() {
            self.try_like().await;
        }
        if !action.includes_comment() {
            return Ok(PostOutcome::LikedOnly);
        }

        self.submit_comment(&reply).await
    }

    /// Title and first 500 chars of the body, with placeholders when
    /// the page does not render in time.
    async fn extract_post(&self) -> (String, String) {
        let title = match self
            .browser
            .wait_css(".post-title", POST_ELEMENT_TIMEOUT)
            .await
        {
            Ok(element) => element
                .text()
                .await
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|_| "未知标题".to_string()),
            Err(e) => {
                println!("[POST] Title not found: {:#}", e);
                "未知标题".to_string()
            }
        };

        let content = match self
            .browser
            .wait_css(".post-content", POST_ELEMENT_TIMEOUT)
            .await
        {
            Ok(element) => element
                .text()
                .await
                .map(|t| t.trim().chars().take(POST_CONTENT_CAP).collect())
                .unwrap_or_else(|_| "未知内容".to_string()),
            Err(e) => {
                println!("[POST] Content not found: {:#}", e);
                "未知内容".to_string()
            }
        };

        (title, content)
    }

    async fn submit_comment(&self, reply: &str) -> Result<PostOutcome> {
        let editor = match self.browser.wait_css(".CodeMirror", EDITOR_TIMEOUT).await {
            Ok(editor) => editor,
            Err(e) => {
                return Ok(PostOutcome::Skipped(SkipReason::EditorNotFound(format!(
                    "{:#}",
                    e
                ))))
            }
        };

        self.browser.human_type(&editor, reply).await?;
        sleep(Duration::from_secs(2)).await;

        let submit = match self
            .browser
            .wait_xpath(
                "//button[contains(@class, 'submit') and contains(@class, 'btn') and contains(text(), '发布评论')]",
                EDITOR_TIMEOUT,
            )
            .await
        {
            Ok(button) => button,
            Err(e) => {
                return Ok(PostOutcome::Skipped(SkipReason::SubmitNotFound(format!(
                    "{:#}",
                    e
                ))))
            }
        };

        self.browser.scroll_into_view(&submit).await?;
        sleep(Duration::from_millis(500)).await;
        submit.click().await?;

        println!("[POST] Commented: {}", reply);
        Ok(PostOutcome::Commented {
            reply: reply.to_string(),
        })
    }

    /// The "加鸡腿" like. At most one per run; every failure mode is
    /// swallowed here since liking is opportunistic.
    async fn try_like(&mut self) {
        if self.liked {
            if self.verbose {
                println!("[LIKE] Already liked a post this run, skipping");
            }
            return;
        }
        match self.click_chicken_leg().await {
            Ok(true) => {
                self.liked = true;
                println!("[LIKE] 加鸡腿 succeeded");
            }
            Ok(false) => println!("[LIKE] Post too old to like"),
            Err(e) => println!("[LIKE] Failed: {:#}", e),
        }
    }

    /// Returns Ok(false) when the post is over seven days old and the
    /// site refuses the like.
    async fn click_chicken_leg(&self) -> Result<bool> {
        let button = self
            .browser
            .wait_xpath(
                "//div[@class='nsk-post']//div[@title='加鸡腿'][1]",
                DIALOG_TIMEOUT,
            )
            .await?;
        self.browser.scroll_into_view(&button).await?;
        sleep(Duration::from_millis(500)).await;
        button.click().await?;

        self.browser.wait_css(".msc-confirm", DIALOG_TIMEOUT).await?;

        let too_old = self
            .browser
            .find_now(By::XPath(
                "//h3[contains(text(), 'This comment was created 7 days ago')]",
            ))
            .await
            .is_some();

        let ok_button = self
            .browser
            .wait_css(".msc-confirm .msc-ok", DIALOG_TIMEOUT)
            .await?;
        ok_button.click().await?;
        sleep(Duration::from_secs(1)).await;

        Ok(!too_old)
    }

    /// The once-daily check-in. Never fails the run: the usual cause of
    /// an error here is having checked in already.
    pub async fn check_in(&self) {
        println!("\n[CHECKIN] Looking for the check-in icon");
        if let Err(e) = self.click_sign_icon().await {
            println!("[CHECKIN] Failed (already checked in or UI changed): {:#}", e);
            if let Ok(url) = self.browser.current_url().await {
                println!("[CHECKIN] Current URL: {}", url);
            }
            let snippet = self.browser.page_source_snippet(500).await;
            if !snippet.is_empty() {
                println!("[CHECKIN] Page source: {}...", snippet);
            }
            let _ = self.browser.save_screenshot("checkin_failed.png").await;
        }
    }

    async fn click_sign_icon(&self) -> Result<()> {
        let icon = self
            .browser
            .wait_xpath("//span[@title='签到']", SIGN_ICON_TIMEOUT)
            .await
            .context("Check-in icon not found")?;

        self.browser.scroll_into_view(&icon).await?;
        sleep(Duration::from_millis(500)).await;
        self.browser.click_with_js_fallback(&icon).await?;
        println!("[CHECKIN] Icon clicked, waiting for the reward page");
        sleep(Duration::from_secs(5)).await;

        if self.verbose {
            if let Ok(url) = self.browser.current_url().await {
                println!("[CHECKIN] Now at: {}", url);
            }
        }

        let label = if self.config.random_reward {
            "试试手气"
        } else {
            "鸡腿 x 5"
        };
        let xpath = format!("//button[contains(text(), '{}')]", label);
        match self.browser.wait_xpath(&xpath, REWARD_TIMEOUT).await {
            Ok(button) => {
                button.click().await?;
                println!("[CHECKIN] Claimed reward: {}", label);
            }
            Err(_) => {
                println!("[CHECKIN] Reward button not found, probably already checked in today");
            }
        }
        Ok(())
    }

    fn append_log(&self, entry: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE)
            .with_context(|| format!("Failed to open {}", LOG_FILE))?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{} | {}", timestamp, entry)?;

        if self.verbose {
            println!("[LOG] Saved to {}", LOG_FILE);
        }
        Ok(())
    }

    pub async fn quit(self) -> Result<()> {
        self.browser.quit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_size_bounded_by_available() {
        assert_eq!(sample_size(25, 10), 10);
        assert_eq!(sample_size(20, 100), 20);
        assert_eq!(sample_size(22, 0), 0);
        assert_eq!(sample_size(25, 25), 25);
    }

    #[test]
    fn test_sample_quota_within_configured_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let quota = sample_size(rng.gen_range(SAMPLE_MIN..=SAMPLE_MAX), 1000);
            assert!(quota >= SAMPLE_MIN && quota <= SAMPLE_MAX);
        }
    }

    #[test]
    fn test_daily_ceiling_within_configured_bound() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let ceiling = rng.gen_range(CEILING_MIN..=CEILING_MAX);
            assert!((CEILING_MIN..=CEILING_MAX).contains(&ceiling));
        }
    }

    #[test]
    fn test_action_weights() {
        assert_eq!(action_for_roll(0.0), PostAction::CommentOnly);
        assert_eq!(action_for_roll(0.49), PostAction::CommentOnly);
        assert_eq!(action_for_roll(0.5), PostAction::LikeOnly);
        assert_eq!(action_for_roll(0.79), PostAction::LikeOnly);
        assert_eq!(action_for_roll(0.8), PostAction::Both);
        assert_eq!(action_for_roll(0.99), PostAction::Both);
    }

    #[test]
    fn test_action_flags() {
        assert!(PostAction::CommentOnly.includes_comment());
        assert!(!PostAction::CommentOnly.includes_like());
        assert!(!PostAction::LikeOnly.includes_comment());
        assert!(PostAction::LikeOnly.includes_like());
        assert!(PostAction::Both.includes_comment());
        assert!(PostAction::Both.includes_like());
    }

    #[test]
    fn test_pick_action_always_valid() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let action = pick_action(&mut rng);
            assert!(action.includes_comment() || action.includes_like());
        }
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("/post-12345-1"),
            "https://www.nodeseek.com/post-12345-1"
        );
        assert_eq!(
            absolute_url("post-12345-1"),
            "https://www.nodeseek.com/post-12345-1"
        );
        assert_eq!(
            absolute_url("https://www.nodeseek.com/post-1-1"),
            "https://www.nodeseek.com/post-1-1"
        );
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::NoReply.to_string(),
            "no usable reply from Gemini"
        );
        assert!(SkipReason::Navigation("timeout".into())
            .to_string()
            .contains("timeout"));
    }
}

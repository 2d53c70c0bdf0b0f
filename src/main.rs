// Requires ChromeDriver and a NodeSeek session cookie.
// Daily routine: inject cookies, comment on a sample of posts with
// Gemini-generated replies, claim the check-in reward, quit.

use std::process;

use anyhow::Result;
use clap::Parser;

mod bot;
mod browser;
mod config;
mod gemini;

use bot::NodeSeekBot;
use browser::Browser;
use config::Config;
use gemini::GeminiClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "NodeSeek daily check-in and comment bot", long_about = None)]
struct Args {
    /// ChromeDriver endpoint
    #[arg(short, long, default_value = "http://localhost:9515")]
    webdriver_url: String,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("{}", "=".repeat(64));
    println!("   NodeSeek Daily Bot");
    println!("{}", "=".repeat(64));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            process::exit(1);
        }
    };

    println!(
        "\nGemini API key: {}",
        if config.gemini_api_key.is_some() { "set" } else { "not set" }
    );
    println!("Headless: {}", config.headless);
    println!("Random reward: {}\n", config.random_reward);

    let gemini = GeminiClient::new(config.gemini_api_key.clone(), args.verbose)?;

    let browser = match Browser::launch(&args.webdriver_url, config.headless, args.verbose).await {
        Ok(browser) => browser,
        Err(e) => {
            eprintln!("[ERROR] Browser init failed: {:#}", e);
            process::exit(1);
        }
    };

    let setup = browser.open_forum_with_cookies(&config.cookie).await;
    match setup {
        Ok(logged_in) => {
            if !logged_in {
                println!("[WARNING] Login check failed, the cookie may be stale. Continuing anyway");
            }
        }
        Err(e) => {
            eprintln!("[ERROR] Session setup failed: {:#}", e);
            let _ = browser.quit().await;
            process::exit(1);
        }
    }

    let mut bot = NodeSeekBot::new(browser, gemini, config, args.verbose);

    if let Err(e) = bot.comment_pass().await {
        println!("[ERROR] Comment pass failed: {:#}", e);
    }
    bot.check_in().await;

    println!(
        "\n[DONE] {} comments posted this run, closing browser",
        bot.comments_posted()
    );
    bot.quit().await?;
    Ok(())
}

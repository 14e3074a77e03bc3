use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use probex::{Client, Headers, Response, Settings};
use serde::Serialize;
use tracing::Level;

#[derive(Parser)]
#[command(name = "probex")]
#[command(about = "Asynchronous HTTP request engine for network measurements")]
#[command(version)]
struct Cli {
    /// URL to request
    #[arg(value_name = "URL")]
    url: String,

    /// HTTP method to use
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request headers (format: "Name: Value")
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    body: Option<String>,

    /// Maximum redirects to follow
    #[arg(short = 'r', long, default_value = "16")]
    max_redirects: u32,

    /// Timeout in seconds for each request stage
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Explicit SOCKS5 proxy as host:port
    #[arg(long)]
    socks5_proxy: Option<String>,

    /// Local Tor SOCKS port for onion targets
    #[arg(long)]
    tor_socks_port: Option<u16>,

    /// CA bundle for TLS verification
    #[arg(long)]
    ca_bundle: Option<String>,

    /// Skip body accumulation
    #[arg(long)]
    ignore_body: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    json: bool,

    /// Increase log verbosity
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct HeaderEntry<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Report<'a> {
    status_code: u16,
    response_line: &'a str,
    headers: Vec<HeaderEntry<'a>>,
    body: String,
    redirects: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let mut settings = Settings::new()
        .set("http/url", cli.url.as_str())
        .set("http/method", cli.method.as_str())
        .set("http/max_redirects", i64::from(cli.max_redirects));
    if let Some(timeout) = cli.timeout {
        settings.insert("net/timeout", timeout);
    }
    if let Some(proxy) = &cli.socks5_proxy {
        settings.insert("net/socks5_proxy", proxy.as_str());
    }
    if let Some(port) = cli.tor_socks_port {
        settings.insert("net/tor_socks_port", port);
    }
    if let Some(bundle) = &cli.ca_bundle {
        settings.insert("net/ca_bundle_path", bundle.as_str());
    }
    if cli.ignore_body {
        settings.insert("http/ignore_body", true);
    }

    let mut headers = Headers::new();
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid header: {header}"))?;
        headers.append(name.trim(), value.trim());
    }
    let body = cli.body.clone().unwrap_or_default();

    let response = match Client::new().request(&settings, &headers, body.as_bytes()).await {
        Ok(response) => response,
        Err(failure) => {
            eprintln!("{} {}", "error:".red().bold(), failure.error);
            std::process::exit(1);
        }
    };

    if cli.json {
        print_json(&response)?;
    } else {
        print_text(&response);
    }
    Ok(())
}

fn print_json(response: &Response) -> Result<()> {
    let report = Report {
        status_code: response.status_code,
        response_line: &response.response_line,
        headers: response
            .headers
            .iter()
            .map(|(name, value)| HeaderEntry { name, value })
            .collect(),
        body: response.text(),
        redirects: response.history().len(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_text(response: &Response) {
    let status = response.status_code.to_string();
    let status = match response.status_code {
        200..=299 => status.green(),
        300..=399 => status.yellow(),
        _ => status.red(),
    };
    println!("{} {}", status.bold(), response.response_line);
    for (name, value) in response.headers.iter() {
        println!("{}: {}", name.cyan(), value);
    }
    println!();
    println!("{}", response.text());
}

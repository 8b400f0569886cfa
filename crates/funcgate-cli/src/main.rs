//! # funcgate CLI entry point
//!
//! Main binary for the funcgate invocation gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Start a gateway
//! funcgate serve -b 0.0.0.0:8080
//!
//! # Start with tighter limits and no outbound network access
//! funcgate serve -b 0.0.0.0:8080 --cpu-hard-ms 500 --disable-net
//!
//! # Invoke a function (outputs raw JSON)
//! funcgate invoke http://127.0.0.1:8080 double -s script.js -a '{"x": 5}'
//! ```

use anyhow::Result;
use argh::FromArgs;
use std::net::SocketAddr;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// funcgate - HTTP invocation gateway for sandboxed user scripts
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Invoke(InvokeArgs),
}

/// Arguments for starting a gateway.
///
/// The gateway snapshots the process environment once at startup and
/// forwards it into every sandbox context; export variables before starting
/// it, not per request.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the invocation gateway
struct ServeArgs {
    /// address to bind the gateway's HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// base directory combined with the function identity to key pooled
    /// contexts
    #[argh(option, long = "base-dir", default = "\"services\".into()")]
    base_dir: String,

    /// memory limit per context in MiB
    #[argh(option, long = "memory-limit-mb", default = "128")]
    memory_limit_mb: u64,

    /// wall-clock lifetime per context in milliseconds, counted from
    /// creation
    #[argh(option, long = "wall-clock-ms", default = "60000")]
    wall_clock_timeout_ms: u64,

    /// accumulated CPU time after which a context is retired gracefully, in
    /// milliseconds
    #[argh(option, long = "cpu-soft-ms", default = "1000")]
    cpu_time_soft_limit_ms: u64,

    /// accumulated CPU time at which in-flight work is terminated, in
    /// milliseconds
    #[argh(option, long = "cpu-hard-ms", default = "2000")]
    cpu_time_hard_limit_ms: u64,

    /// maximum number of live contexts in the pool
    #[argh(option, long = "max-workers", default = "64")]
    max_workers: usize,

    /// disable the per-identity module source cache
    #[argh(switch, long = "no-module-cache")]
    no_module_cache: bool,

    /// do not install the outbound network module into sandboxes
    #[argh(switch, long = "disable-net")]
    disable_net: bool,
}

/// Arguments for invoking a function once.
///
/// Outputs the raw JSON response to stdout, suitable for piping to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
/// invoke a function on a running gateway
struct InvokeArgs {
    /// address of the gateway, including the http:// prefix
    #[argh(positional)]
    gateway_address: String,

    /// function identity to invoke
    #[argh(positional)]
    function: String,

    /// path to the script file whose contents become the function body
    #[argh(option, short = 's', long = "script")]
    script: String,

    /// JSON object with arguments for the script's `main(args)`
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep invoke output clean for unix tool usage (piping to jq, etc.).
    if !matches!(cli.command, Commands::Invoke(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Invoke(args) => run_invoke(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let environment: Vec<(String, String)> = std::env::vars().collect();

    let mut config = funcgate_server::GatewayConfig::new()
        .with_base_dir(&args.base_dir)
        .with_environment(environment)
        .with_limits(
            args.memory_limit_mb,
            args.wall_clock_timeout_ms,
            args.cpu_time_soft_limit_ms,
            args.cpu_time_hard_limit_ms,
        );
    config.max_workers = args.max_workers;
    config.module_cache_enabled = !args.no_module_cache;
    config.net_access_disabled = args.disable_net;

    tracing::info!(
        "Starting gateway: base dir {}, cpu limits {}ms/{}ms, wall clock {}ms",
        args.base_dir,
        args.cpu_time_soft_limit_ms,
        args.cpu_time_hard_limit_ms,
        args.wall_clock_timeout_ms
    );

    let gateway = funcgate_server::Gateway::new(config)?;
    let server = funcgate_server::HttpServer::new(gateway);

    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;
    server.run(addr).await?;

    Ok(())
}

/// Executes the `invoke` subcommand: reads the script file, posts one
/// `{script, args}` body and prints the raw JSON response.
async fn run_invoke(args: InvokeArgs) -> Result<()> {
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;

    if !args.gateway_address.starts_with("http://") && !args.gateway_address.starts_with("https://")
    {
        anyhow::bail!(
            "Invalid gateway address: '{}' must start with http:// or https://",
            args.gateway_address
        );
    }

    let script = std::fs::read_to_string(&args.script)
        .map_err(|e| anyhow::anyhow!("Failed to read script {}: {}", args.script, e))?;

    let args_value: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let body = serde_json::json!({ "script": script, "args": args_value });

    let uri: hyper::Uri = format!(
        "{}/{}",
        args.gateway_address.trim_end_matches('/'),
        args.function
    )
    .parse()?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build_http::<Full<Bytes>>();

    let request = hyper::Request::builder()
        .method(hyper::Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&body)?)))?;

    let response = client.request(request).await?;
    let bytes = response.into_body().collect().await?.to_bytes();

    // Output raw JSON to stdout.
    println!("{}", String::from_utf8_lossy(&bytes));

    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_defaults() {
        let cli: Cli = Cli::from_args(&["funcgate"], &["serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, "0.0.0.0:8080");
                assert_eq!(args.base_dir, "services");
                assert_eq!(args.memory_limit_mb, 128);
                assert_eq!(args.cpu_time_soft_limit_ms, 1000);
                assert_eq!(args.cpu_time_hard_limit_ms, 2000);
                assert_eq!(args.max_workers, 64);
                assert!(!args.no_module_cache);
                assert!(!args.disable_net);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn parse_serve_with_limits() {
        let cli: Cli = Cli::from_args(
            &["funcgate"],
            &[
                "serve",
                "-b",
                "127.0.0.1:9090",
                "--cpu-hard-ms",
                "500",
                "--disable-net",
            ],
        )
        .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, "127.0.0.1:9090");
                assert_eq!(args.cpu_time_hard_limit_ms, 500);
                assert!(args.disable_net);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn parse_invoke() {
        let cli: Cli = Cli::from_args(
            &["funcgate"],
            &[
                "invoke",
                "http://127.0.0.1:8080",
                "double",
                "-s",
                "script.js",
                "-a",
                "{\"x\":5}",
            ],
        )
        .unwrap();
        match cli.command {
            Commands::Invoke(args) => {
                assert_eq!(args.gateway_address, "http://127.0.0.1:8080");
                assert_eq!(args.function, "double");
                assert_eq!(args.script, "script.js");
                assert_eq!(args.args, "{\"x\":5}");
            }
            _ => panic!("Expected Invoke command"),
        }
    }

    #[test]
    fn parse_invoke_default_args() {
        let cli: Cli = Cli::from_args(
            &["funcgate"],
            &["invoke", "http://127.0.0.1:8080", "double", "-s", "f.js"],
        )
        .unwrap();
        match cli.command {
            Commands::Invoke(args) => assert_eq!(args.args, "{}"),
            _ => panic!("Expected Invoke command"),
        }
    }
}

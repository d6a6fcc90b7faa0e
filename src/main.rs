//! The fetchgrid service binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fetchgrid::cluster::{ClusterContext, DEFAULT_REPLICAS};
use fetchgrid::config::Config;
use fetchgrid::peers::heartbeat;
use fetchgrid::server::{build_state, router};

/// Per-request deadline for origin and inter-peer HTTP calls.
const ORIGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// EC2 instance metadata endpoint for `--bind ec2`.
const EC2_LOCAL_IPV4: &str = "http://169.254.169.254/latest/meta-data/local-ipv4";

#[derive(Parser, Debug)]
#[command(name = "fetchgrid", version, about = "Distributed content-caching HTTP fetch service")]
struct Args {
    /// Config file to use.
    #[arg(long, default_value = "config.yml")]
    config: String,

    /// Address to bind; the special value "ec2" resolves the instance's
    /// local IPv4 from the metadata endpoint and also binds loopback.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port serving both the front API and the inter-peer API.
    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Additionally listen on loopback.
    #[arg(long)]
    listenlocal: bool,

    /// Master node as host:port. Defaults to this node being its own master.
    #[arg(long)]
    master: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fetchgrid=info")),
        )
        .init();

    let args = Args::parse();

    let http = reqwest::Client::builder()
        .timeout(ORIGIN_TIMEOUT)
        .connect_timeout(ORIGIN_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    let (bind_ip, bind_loopback) = if args.bind == "ec2" {
        let ip = http
            .get(EC2_LOCAL_IPV4)
            .send()
            .await
            .context("querying EC2 metadata")?
            .text()
            .await
            .context("reading EC2 metadata")?;
        (ip.trim().to_string(), true)
    } else {
        (args.bind.clone(), false)
    };
    let me = format!("{bind_ip}:{}", args.port);
    let master = args
        .master
        .as_ref()
        .map_or_else(|| format!("http://{me}"), |m| format!("http://{m}"));

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) if args.master.is_some() => {
            warn!(%err, "local config unavailable, bootstrapping from master");
            Config::from_master(&master, &http).await?
        }
        Err(err) => return Err(err),
    };

    let cluster = Arc::new(ClusterContext::new(
        format!("http://{me}"),
        DEFAULT_REPLICAS,
        http.clone(),
    ));
    let state = build_state(config, Arc::clone(&cluster), http.clone());
    let app = router(state);

    tokio::spawn(heartbeat(master.clone(), me.clone(), cluster, http));

    if args.listenlocal || bind_loopback {
        let local = format!("127.0.0.1:{}", args.port);
        if local != me {
            let listener = TcpListener::bind(&local)
                .await
                .with_context(|| format!("binding {local}"))?;
            let app = app.clone();
            info!(addr = %local, "listening (loopback)");
            tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    warn!(%err, "loopback listener stopped");
                }
            });
        }
    }

    let listener = TcpListener::bind(&me)
        .await
        .with_context(|| format!("binding {me}"))?;
    info!(addr = %me, master = %master, "listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

use anyhow::{Context, Result, bail};
use reverse_socks5::server::{Credentials, Mode, Server, ServerContext};
use reverse_socks5::{net, stats};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroize;

struct Config {
    listen_ip: String,
    port: u16,
    user: Option<String>,
    pass: Option<String>,
    bind_addr: Option<IpAddr>,
    whitelist: Vec<IpAddr>,
    auth_once: bool,
    quiet: bool,
    connect_host: Option<String>,
    relay_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            port: 1080,
            user: None,
            pass: None,
            bind_addr: None,
            whitelist: Vec::new(),
            auth_once: false,
            quiet: false,
            connect_host: None,
            relay_port: None,
        }
    }
}

fn print_usage() {
    println!("Usage: reverse-socks5 [OPTIONS]");
    println!("Options:");
    println!("  -i <ip>      listen address (default: 0.0.0.0)");
    println!("  -p <port>    listen port, or outbound port with -c (default: 1080)");
    println!("  -u <user>    username for password authentication");
    println!("  -P <pass>    password for password authentication");
    println!("  -b <ip>      source address for outbound connections");
    println!("  -w <ip,...>  client IPs granted passwordless access");
    println!("  -1           grant an IP passwordless access after one successful login");
    println!("  -q           silence logging");
    println!("  -c <host>    connector mode: dial out to <host>:<port> instead of listening");
    println!("  -C <port>    relay-pair mode: accept clients on <port> and pair each with");
    println!("               the next back-connection accepted on the listen port");
    println!("  -h           show this help message");
}

fn parse_args() -> Result<Option<Config>> {
    let mut config = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-i" => {
                config.listen_ip = args.next().context("expected listen address after -i")?;
            }
            "-p" => {
                let port = args.next().context("expected port after -p")?;
                config.port = port.parse().with_context(|| format!("bad port: {port}"))?;
            }
            "-u" => {
                config.user = Some(args.next().context("expected username after -u")?);
            }
            "-P" => {
                config.pass = Some(args.next().context("expected password after -P")?);
            }
            "-b" => {
                let ip = args.next().context("expected bind address after -b")?;
                config.bind_addr =
                    Some(ip.parse().with_context(|| format!("bad bind address: {ip}"))?);
            }
            "-w" => {
                let list = args.next().context("expected address list after -w")?;
                for ip in list.split(',') {
                    config.whitelist.push(
                        ip.parse()
                            .with_context(|| format!("bad whitelist address: {ip}"))?,
                    );
                }
            }
            "-1" => config.auth_once = true,
            "-q" => config.quiet = true,
            "-c" => {
                config.connect_host = Some(args.next().context("expected host after -c")?);
            }
            "-C" => {
                let port = args.next().context("expected port after -C")?;
                config.relay_port =
                    Some(port.parse().with_context(|| format!("bad port: {port}"))?);
            }
            "-h" => {
                print_usage();
                return Ok(None);
            }
            other => bail!("unknown argument: {other} (try -h)"),
        }
    }

    if config.user.is_some() != config.pass.is_some() {
        bail!("-u and -P must be given together");
    }
    if (config.auth_once || !config.whitelist.is_empty()) && config.user.is_none() {
        bail!("-1 and -w require credentials (-u/-P)");
    }
    if config.connect_host.is_some() && config.relay_port.is_some() {
        bail!("-c and -C are mutually exclusive (they are the two ends of a tunnel)");
    }

    Ok(Some(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(config) = parse_args()? else {
        return Ok(());
    };

    let filter = if config.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let credentials = match (config.user, config.pass) {
        (Some(mut user), Some(mut pass)) => {
            let credentials = Credentials::new(user.as_bytes(), pass.as_bytes());
            // Wipe the argv-derived strings once the copy is made.
            user.zeroize();
            pass.zeroize();
            Some(credentials)
        }
        _ => None,
    };

    let ctx = Arc::new(ServerContext {
        credentials,
        auth_once: config.auth_once,
        bind_addr: config.bind_addr,
        registry: reverse_socks5::auth::AuthRegistry::with_whitelist(config.whitelist),
        counters: stats::ByteCounters::default(),
    });

    tokio::spawn(stats::report(Arc::clone(&ctx)));

    let mode = if let Some(host) = config.connect_host {
        info!("connector mode: dialing {host}:{}", config.port);
        Mode::Connector {
            host,
            port: config.port,
        }
    } else if let Some(relay_port) = config.relay_port {
        let listener = net::listener_open(&config.listen_ip, config.port)
            .await
            .with_context(|| format!("listen on {}:{}", config.listen_ip, config.port))?;
        let relay = net::listener_open(&config.listen_ip, relay_port)
            .await
            .with_context(|| format!("listen on {}:{relay_port}", config.listen_ip))?;
        info!(
            "relay-pair mode: back-connections on {}:{}, clients on {}:{relay_port}",
            config.listen_ip, config.port, config.listen_ip
        );
        Mode::RelayPair {
            listener,
            relay: Arc::new(relay),
        }
    } else {
        let listener = net::listener_open(&config.listen_ip, config.port)
            .await
            .with_context(|| format!("listen on {}:{}", config.listen_ip, config.port))?;
        info!("listening on {}:{}", config.listen_ip, config.port);
        Mode::Listen(listener)
    };

    Server::new(ctx, mode).run().await?;
    Ok(())
}

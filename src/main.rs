use anyhow::Context;
use clap::Parser;
use hostgate::common::TlsConfig;
use hostgate::config::{self, MimeTable, RedirectConfig, RedirectEntry, Settings};
use hostgate::forwarder::ProxyForwarder;
use hostgate::headers::ForbiddenHeaderSet;
use hostgate::logging::{self, LogFormat};
use hostgate::resolver::OverrideResolver;
use hostgate::router::{LocalNames, Router};
use hostgate::static_files::StaticFileHandler;
use hostgate::DualListener;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[clap(
    version,
    about = "Host-based HTTP/HTTPS reverse proxy resolving upstreams through a fixed DNS server"
)]
struct Args {
    #[clap(long, value_name = "FILE", default_value = config::DEFAULT_CONFIG_FILE, help = "Redirect configuration file")]
    config: PathBuf,

    #[clap(long, value_name = "FILE", default_value = config::DEFAULT_MIMES_FILE, help = "Extension to MIME type table")]
    mimes: PathBuf,

    #[clap(long, value_name = "DIR", default_value = config::DEFAULT_STATIC_ROOT, help = "Directory served for local host names")]
    static_root: PathBuf,

    #[clap(long, value_name = "ADDR", default_value = "0.0.0.0:80", help = "Plain HTTP listen address")]
    http_listen: SocketAddr,

    #[clap(long, value_name = "ADDR", default_value = "0.0.0.0:443", help = "HTTPS listen address")]
    https_listen: SocketAddr,

    #[clap(long, value_name = "FILE", default_value = config::DEFAULT_CERTIFICATE, help = "Certificate file path for HTTPS")]
    certificate: PathBuf,

    #[clap(long, value_name = "FILE", default_value = config::DEFAULT_PRIVATE_KEY, help = "Private key file path for HTTPS")]
    private_key: PathBuf,

    #[clap(long, value_name = "ADDR", default_value = config::DEFAULT_DNS_SERVER, help = "DNS server used for every upstream lookup")]
    dns_server: SocketAddr,

    #[clap(long, value_name = "LEVEL", default_value = "info", value_parser = parse_level, help = "Log level: trace, debug, info, warn, error")]
    log_level: String,

    #[clap(long, value_name = "FORMAT", default_value = "text", help = "Log format: text or json")]
    log_format: LogFormat,

    #[clap(long, value_name = "FILE", help = "Write a sample configuration file and exit")]
    generate_config: Option<PathBuf>,
}

fn parse_level(s: &str) -> Result<String, String> {
    logging::validate_level(s).map(|_| s.to_lowercase())
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            static_root: self.static_root.clone(),
            http_listen: self.http_listen,
            https_listen: self.https_listen,
            certificate: self.certificate.clone(),
            private_key: self.private_key.clone(),
            dns_server: self.dns_server,
            ..Settings::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level, args.log_format).context("Failed to initialize logging")?;

    if let Some(path) = &args.generate_config {
        generate_sample_config(path)?;
        println!("Sample configuration file generated: {}", path.display());
        return Ok(());
    }

    let settings = args.settings();
    let redirects = RedirectConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let mimes = MimeTable::from_file(&args.mimes)
        .with_context(|| format!("Failed to load {}", args.mimes.display()))?;
    if mimes.is_empty() {
        warn!("{} has no entries, static files are served without Content-Type", args.mimes.display());
    }
    let tls_config = TlsConfig::create_config(&settings.private_key, &settings.certificate)
        .context("Failed to load TLS certificate")?;

    let hostname = hostname::get()
        .context("Failed to read hostname")?
        .to_string_lossy()
        .into_owned();
    info!(
        "Hostname {}: {} redirects, {} mime types, DNS server {}",
        hostname,
        redirects.redirects.len(),
        mimes.len(),
        settings.dns_server
    );

    let resolver = OverrideResolver::udp(settings.dns_server, settings.dns_timeout);
    let forwarder = ProxyForwarder::new(resolver, &settings, ForbiddenHeaderSet::default())
        .with_clear_site_data(redirects.clear_site_data);
    let router = Router::new(
        LocalNames::from_hostname(&hostname),
        redirects,
        StaticFileHandler::new(settings.static_root.clone(), mimes),
        forwarder,
    );

    let listener = DualListener::bind(Arc::new(router), settings.http_listen, settings.https_listen, tls_config)
        .await
        .context("Failed to bind listeners")?;
    listener.run().await.context("Listener failed")?;
    Ok(())
}

fn generate_sample_config(path: &Path) -> anyhow::Result<()> {
    let mut sample = RedirectConfig::default();
    sample.insert("example.com", RedirectEntry::new("https"));
    sample.insert(
        "private.example.com",
        RedirectEntry::new("http").with_auth("username", "password"),
    );
    sample
        .to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

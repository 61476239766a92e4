//! `vm-feature-manager` binary: load configuration, wire the mutator, serve.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vmfm_core::{CliOverrides, Mutator, MutatorSettings, WebhookConfig};
use vmfm_directives::{SecretLookup, StaticSecretLookup};
use vmfm_features::FeatureSet;
use vmfm_webhook::{bind, load_server_config, router, serve, shutdown_signal, telemetry, AppState, KubeSecretLookup, Transport};

fn cli() -> Command {
    Command::new("vm-feature-manager")
        .version(vmfm_webhook::VERSION)
        .about("Mutating admission webhook for KubeVirt VirtualMachines")
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a YAML configuration file"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_parser(value_parser!(u16))
                .help("Listen port (default 8443)"),
        )
        .arg(
            Arg::new("cert-dir")
                .long("cert-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding tls.crt and tls.key"),
        )
        .arg(
            Arg::new("error-handling")
                .long("error-handling")
                .help("reject, allow-and-log or strip-label"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("trace, debug, info, warn or error"),
        )
        .arg(
            Arg::new("config-source")
                .long("config-source")
                .help("Primary directive namespace: annotations or labels"),
        )
        .arg(
            Arg::new("insecure-http")
                .long("insecure-http")
                .action(ArgAction::SetTrue)
                .help("Serve plain HTTP instead of TLS (local testing only)"),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let overrides = CliOverrides {
        port: matches.get_one::<u16>("port").copied(),
        cert_dir: matches.get_one::<PathBuf>("cert-dir").cloned(),
        error_handling: matches.get_one::<String>("error-handling").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        config_source: matches.get_one::<String>("config-source").cloned(),
    };
    let config = WebhookConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path), &overrides)
        .context("failed to load configuration")?;

    telemetry::init(&config.log_level, config.log_format);
    // Another crate in the graph may have installed a provider already.
    rustls::crypto::ring::default_provider().install_default().ok();

    info!(
        version = %config.webhook_version,
        port = config.port,
        error_handling = %config.error_handling,
        config_source = %config.config_source,
        "starting VM feature manager"
    );

    let features = Arc::new(FeatureSet::from_config(&config.features, config.config_source));
    info!(features = ?features.names(), "rules registered");

    let lookup: Arc<dyn SecretLookup> = match KubeSecretLookup::in_cluster(config.lookup_timeout()) {
        Ok(lookup) => Arc::new(lookup),
        Err(err) => {
            warn!(error = %err, "no cluster access; secret-backed user data will be treated as missing");
            Arc::new(StaticSecretLookup::new())
        }
    };

    let mutator = Mutator::new(features, lookup, MutatorSettings::from(&config));
    let app = router(AppState::new(Arc::new(mutator)));

    let transport = if matches.get_flag("insecure-http") {
        Transport::Insecure
    } else {
        let tls = load_server_config(&config.cert_path(), &config.key_path()).context("failed to load TLS certificate")?;
        Transport::Tls(tls)
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = bind(addr).await?;
    info!(%addr, ?transport, "listening");

    serve(listener, app, transport, shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

//! `mailsend` - deliver one message over implicit TLS or STARTTLS.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use mailsend_smtp::{Config, Message, PemFiles, available_cipher_suites, send_mail};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const OPTIONS: &str = "\
options (key=value):
    server_name=%s       default: localhost
    server_port=%d       default: 465 (mode=0) or 587 (mode=1)
    debug_level=%d       default: 0 (0..=65535)
    authentication=%d    default: 0 (1 enables AUTH LOGIN)
    mode=%d              default: 0 (0 = implicit TLS, 1 = STARTTLS)
    user_name=%s         required when authentication=1
    user_pwd=%s          required when authentication=1
    mail_from=%s         required
    mail_to=%s           required
    ca_file=%s           default: built-in web PKI roots
    crt_file=%s          client certificate (PEM)
    key_file=%s          client key (PEM)
    force_ciphersuite=%s default: all (see --list-ciphersuites)
    verify=%s            default: optional (optional | required)
    ehlo_name=%s         default: system hostname
    subject=%s           default: mailsend test mail
    body_file=%s         default: built-in test body
    connect_timeout=%d   seconds, default: none
    io_timeout=%d        seconds, default: none";

/// Deliver one message to an SMTP server over TLS.
#[derive(Parser, Debug)]
#[command(name = "mailsend", version, after_help = OPTIONS)]
struct Cli {
    /// Print the cipher suites accepted by force_ciphersuite and exit
    #[arg(long)]
    list_ciphersuites: bool,

    /// Options as key=value pairs
    #[arg(value_name = "KEY=VALUE")]
    options: Vec<String>,
}

/// Maps `debug_level` to a filter; `RUST_LOG` takes precedence.
fn env_filter(debug_level: u16) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = match debug_level {
            0 => "info",
            1..=2 => "mailsend=debug,mailsend_smtp=debug,info",
            _ => "trace",
        };
        EnvFilter::new(directives)
    })
}

fn print_cipher_suites() {
    println!("available ciphersuites:");
    for suite in available_cipher_suites() {
        println!("    {suite}");
    }
}

async fn run(config: &Config) -> Result<()> {
    let message = Message::compose(config).context("composing the message")?;
    let credentials = PemFiles::from_config(config);
    let delivery = send_mail(config, &credentials, &message)
        .await
        .with_context(|| format!("delivery to {}:{}", config.server_name, config.server_port))?;

    info!(
        "Delivered via {} ({}), certificate: {}",
        delivery.cipher_suite,
        delivery.protocol.as_deref().unwrap_or("unknown protocol"),
        delivery.verification
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.list_ciphersuites {
        print_cipher_suites();
        return ExitCode::SUCCESS;
    }

    let config = match Config::from_options(&cli.options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}\n\n{OPTIONS}\n");
            print_cipher_suites();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(env_filter(config.debug_level))
        .with(tracing_subscriber::fmt::layer().with_target(config.debug_level > 0))
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start the runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

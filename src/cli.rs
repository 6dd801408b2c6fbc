use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_AUTH_COOKIE_NAME: &str = "padel_session";

pub(crate) enum RunOutcome {
    Serve {
        addr: SocketAddr,
        config: Box<padel_notify::config::AppConfig>,
        log_filter: String,
    },
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }
    if let Some(Command::AuthKey) = cli.command {
        let code = run_auth_key();
        return RunOutcome::Exit(code);
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    RunOutcome::Serve {
        addr: cli.bind,
        config: Box::new(config),
        log_filter: cli.log_filter,
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "padel-notify",
    version,
    about = "Real-time and Web Push notifications for the padel club"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "PADEL_NOTIFY_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "PADEL_NOTIFY_APP_NAME", default_value = "PadelClub")]
    app_name: String,
    /// TOML file holding push subscriptions; kept in memory when omitted.
    #[arg(long, env = "PADEL_NOTIFY_SUBSCRIPTIONS_FILE")]
    subscriptions_file: Option<PathBuf>,
    #[arg(long, env = "PADEL_NOTIFY_REPLAY_CAPACITY", default_value_t = padel_notify::notify::DEFAULT_REPLAY_CAPACITY)]
    replay_capacity: usize,
    #[arg(long, env = "PADEL_NOTIFY_STREAM_BUFFER", default_value_t = padel_notify::notify::DEFAULT_STREAM_BUFFER)]
    stream_buffer: usize,
    #[arg(long, env = "PADEL_NOTIFY_PUSH_TIMEOUT_SECS", default_value_t = 10)]
    push_timeout_secs: u64,
    #[arg(long, env = "PADEL_NOTIFY_PUSH_TTL", default_value_t = 86_400)]
    push_ttl: u32,
    #[arg(long, env = "PADEL_NOTIFY_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "PADEL_NOTIFY_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "PADEL_NOTIFY_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "PADEL_NOTIFY_AUTH_KEY")]
    auth_key: Option<String>,
    #[arg(long, env = "PADEL_NOTIFY_AUTH_COOKIE_NAME")]
    auth_cookie_name: Option<String>,
    #[arg(long, env = "PADEL_NOTIFY_LOG", default_value = "info")]
    log_filter: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a VAPID key pair for Web Push.
    Init(InitArgs),
    /// Generate a key for verifying session tokens.
    AuthKey,
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match padel_notify::VapidCredentials::generate() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:admin@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("PADEL_NOTIFY_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("PADEL_NOTIFY_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("PADEL_NOTIFY_VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace PADEL_NOTIFY_VAPID_SUBJECT with a contact URI you control.");
    }
    0
}

fn run_auth_key() -> i32 {
    let secret = match padel_notify::auth::generate_auth_key() {
        Ok(secret) => secret,
        Err(err) => {
            eprintln!("failed to generate auth key: {err}");
            return 1;
        }
    };
    println!("{secret}");
    0
}

fn build_config(cli: &Cli) -> Result<padel_notify::config::AppConfig, String> {
    if cli.replay_capacity == 0 {
        return Err("replay capacity must be greater than 0".to_string());
    }
    if cli.stream_buffer == 0 {
        return Err("stream buffer must be greater than 0".to_string());
    }
    if cli.push_timeout_secs == 0 {
        return Err("push timeout must be greater than 0".to_string());
    }
    let app_name = cli.app_name.trim();
    if app_name.is_empty() {
        return Err("app name cannot be empty".to_string());
    }

    Ok(padel_notify::config::AppConfig {
        app_name: app_name.to_string(),
        subscriptions_path: cli.subscriptions_file.clone(),
        replay_capacity: cli.replay_capacity,
        stream_buffer: cli.stream_buffer,
        push_timeout: Duration::from_secs(cli.push_timeout_secs),
        push_ttl: cli.push_ttl,
        vapid_private_key: cli.vapid_private_key.clone(),
        vapid_public_key: cli.vapid_public_key.clone(),
        vapid_subject: cli.vapid_subject.clone(),
        auth: resolve_auth_config(cli)?,
    })
}

fn resolve_auth_config(cli: &Cli) -> Result<Option<padel_notify::config::AuthConfig>, String> {
    let has_any = cli.auth_key.is_some() || cli.auth_cookie_name.is_some();

    if !has_any {
        return Ok(None);
    }

    let auth_key = cli
        .auth_key
        .as_ref()
        .ok_or("auth is configured but --auth-key is missing")?
        .trim();
    if auth_key.is_empty() {
        return Err("auth key cannot be empty".to_string());
    }

    if let Some(name) = cli.auth_cookie_name.as_deref()
        && name.trim().is_empty()
    {
        return Err("auth cookie name cannot be empty".to_string());
    }

    let cookie_name = cli
        .auth_cookie_name
        .as_deref()
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_AUTH_COOKIE_NAME.to_string());

    Ok(Some(padel_notify::config::AuthConfig {
        key: auth_key.to_string(),
        cookie_name,
    }))
}

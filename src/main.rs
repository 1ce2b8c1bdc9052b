//! CrimeWatch client
//!
//! Command-line entry point for the CrimeWatch client.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use crimewatch_client::{
    auth_form::{registration::AlternateEmails, AuthForm, AuthSuccess},
    capture::CaptureState,
    models::Alert,
    session::{GuardOutcome, CHECKING_MESSAGE},
    theme::Theme,
    AppConfig, AppState,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crimewatch", version, about = "CrimeWatch monitoring client")]
struct Cli {
    /// API base URL (overrides CRIMEWATCH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Client state directory (overrides CRIMEWATCH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session token
    Signin {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        full_name: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Clear the stored session
    Logout,
    /// Verify the stored session against the server
    Status,
    /// Run the dashboard capture loop
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Capture interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Camera device (overrides CRIMEWATCH_CAMERA_DEVICE)
        #[arg(long)]
        device: Option<String>,
    },
    /// List recent alerts
    Alerts {
        /// Include non-danger entries
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Download an alert snapshot
    Snapshot {
        filename: String,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Show or change the theme (light, dark, toggle)
    Theme { value: Option<String> },
    /// Register alternate e-mail addresses for emergency alerts
    RegisterEmails {
        primary: String,
        secondary: Option<String>,
    },
    /// Check that the API is reachable
    Ping,
}

fn read_password(given: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_alert(alert: &Alert) {
    let status = alert.danger_status.as_deref().unwrap_or("unknown");
    let status = if alert.is_danger() {
        status.red().bold()
    } else {
        status.normal()
    };
    println!("{}  {}", alert.timestamp.dimmed(), status);
    if let Some(details) = &alert.details {
        println!("    {}", details);
    }
    if let Some(location) = &alert.location {
        println!("    location: {}", location);
    }
    if let Some(url) = &alert.snapshot_url {
        println!("    snapshot: {}", url);
    }
}

fn redirected(route: &str) {
    eprintln!("{} session is not valid, sign in first ({})", "✗".red(), route);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crimewatch_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::default();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Command::Watch {
        interval_ms,
        device,
        ..
    } = &cli.command
    {
        if let Some(ms) = interval_ms {
            config.capture_interval = Duration::from_millis(*ms);
        }
        if let Some(device) = device {
            config.camera_device = device.clone();
        }
    }

    let state = AppState::new(config).context("failed to initialize client")?;
    tracing::debug!(api_url = %state.config.api_url, "Client initialized");

    match cli.command {
        Command::Signin { username, password } => {
            let password = read_password(password)?;
            let mut form = AuthForm::sign_in(username, password);
            match form.submit(&state.api, &state.session).await {
                Ok(_) => println!("{} signed in", "✓".green()),
                Err(_) => {
                    eprintln!("{} {}", "✗".red(), form.error().unwrap_or_default());
                    std::process::exit(1);
                }
            }
        }
        Command::Signup {
            full_name,
            username,
            email,
            password,
        } => {
            let password = read_password(password)?;
            let mut form = AuthForm::sign_up(full_name, username, email, password);
            match form.submit(&state.api, &state.session).await {
                Ok(AuthSuccess::SignedUp { username, .. }) => {
                    println!("{} account {} created, now sign in", "✓".green(), username.bold());
                }
                Ok(AuthSuccess::SignedIn { .. }) => {}
                Err(_) => {
                    eprintln!("{} {}", "✗".red(), form.error().unwrap_or_default());
                    std::process::exit(1);
                }
            }
        }
        Command::Logout => {
            state.session.logout()?;
            println!("{} signed out", "✓".green());
        }
        Command::Status => {
            eprintln!("{}", CHECKING_MESSAGE.dimmed());
            let outcome = state
                .guard
                .render(|user| async move {
                    println!(
                        "{} signed in as {} <{}>",
                        "✓".green(),
                        user.username.as_deref().unwrap_or("-").bold(),
                        user.email.as_deref().unwrap_or("-")
                    );
                })
                .await;
            if let GuardOutcome::Redirected(route) = outcome {
                redirected(&route);
                std::process::exit(1);
            }
        }
        Command::Watch { duration_secs, .. } => {
            eprintln!("{}", CHECKING_MESSAGE.dimmed());
            let watch_state = state.clone();
            let outcome = state
                .guard
                .render(|user| async move { run_watch(watch_state, user.username, duration_secs).await })
                .await;
            match outcome {
                GuardOutcome::Rendered(result) => result?,
                GuardOutcome::Redirected(route) => {
                    redirected(&route);
                    std::process::exit(1);
                }
            }
        }
        Command::Alerts { all, limit } => {
            let feed = match limit {
                Some(limit) => Arc::new(crimewatch_client::alert_feed::AlertFeed::with_limit(
                    state.api.clone(),
                    limit,
                )),
                None => state.alerts.clone(),
            };
            feed.refresh().await.context("failed to fetch alerts")?;
            let alerts = if all {
                feed.all().await
            } else {
                feed.danger_alerts().await
            };
            if alerts.is_empty() {
                println!("No alerts");
            }
            for alert in &alerts {
                print_alert(alert);
            }
        }
        Command::Snapshot { filename, out } => {
            let bytes = state
                .api
                .fetch_snapshot(&filename)
                .await
                .with_context(|| format!("failed to fetch snapshot {}", filename))?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("{} {} bytes -> {}", "✓".green(), bytes.len(), out.display());
        }
        Command::Theme { value } => {
            let theme = match value.as_deref() {
                None => state.theme.current(),
                Some("toggle") => state.theme.toggle()?,
                Some(other) => {
                    let theme: Theme = other.parse()?;
                    state.theme.set(theme)?;
                    theme
                }
            };
            println!("{} (toggle: {})", theme, theme.toggle_label());
        }
        Command::RegisterEmails { primary, secondary } => {
            let mut emails = AlternateEmails::new(primary, secondary);
            emails.submit()?;
            println!("{} alternate emails registered", "✓".green());
        }
        Command::Ping => {
            if state.api.health_check().await? {
                println!("{} {} is up", "✓".green(), state.api.base_url());
            } else {
                eprintln!("{} {} did not answer", "✗".red(), state.api.base_url());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Dashboard view: capture until the duration elapses or Ctrl-C
async fn run_watch(
    state: AppState,
    username: Option<String>,
    duration_secs: Option<u64>,
) -> anyhow::Result<()> {
    println!(
        "{} watching as {} (camera {}, every {} ms)",
        "●".green(),
        username.as_deref().unwrap_or("-").bold(),
        state.config.camera_id,
        state.config.capture_interval.as_millis()
    );

    let capture = state.capture_loop(Arc::new(|alert: Alert| print_alert(&alert)));
    capture.start(state.config.capture_interval).await;

    let until = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    // start() has already published Acquiring, so Idle here means the
    // period ended on its own (acquisition failure)
    tokio::select! {
        _ = until => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
        }
        _ = capture.wait_for_state(CaptureState::Idle) => {}
    }

    capture.stop().await;

    let stats = capture.stats();
    println!(
        "{} stopped: {} frames sent, {} failed, {} alerts",
        "■".yellow(),
        stats.submissions,
        stats.failures,
        stats.alerts
    );
    if stats.acquisitions > 0 && stats.ticks == 0 {
        anyhow::bail!("could not access webcam {}", state.config.camera_device);
    }
    Ok(())
}

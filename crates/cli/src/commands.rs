use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dialoguer::{Confirm, Input, Password};
use tvision_api::Identity;
use tvision_api_client::ApiClient;
use tvision_core::{DeleteOutcome, Rejection, SyncController, Transition};
use tvision_local_store::FileStore;
use tvision_runtime_config::{ClientConfig, state_path};

use crate::clipboard::SystemClipboard;
use crate::render::{self, Palette};

/// Everything a command needs: resolved config, controller and styling.
pub struct App {
    pub config: ClientConfig,
    pub ctl: SyncController<ApiClient>,
    pub palette: Palette,
}

impl App {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = ApiClient::new(
            &config.server.url,
            Duration::from_secs(config.server.timeout_secs),
        )
        .context("Failed to build HTTP client")?;
        let state = state_path(&config).context("Could not determine state file location")?;
        tracing::debug!(state = %state.display(), server = %config.server.url, "client ready");
        let ctl = SyncController::new(client, Arc::new(FileStore::open(state)));
        let palette = Palette::for_theme(ctl.theme(config.ui.default_theme));
        Ok(Self {
            config,
            ctl,
            palette,
        })
    }

    fn require_identity(&self) -> Result<Identity> {
        self.ctl
            .restore_identity()
            .context("Not logged in. Run `tvision login` first.")
    }

    /// Timeline position to print new messages from.
    pub fn mark(&self) -> (Option<String>, usize) {
        self.ctl.with_state(|s| {
            (
                s.timeline().session().map(str::to_string),
                s.timeline().len(),
            )
        })
    }

    /// Print what changed since `mark`: appended messages, or the whole
    /// timeline if the session switched. Generated images are written to
    /// the working directory.
    pub fn print_since(&self, mark: &(Option<String>, usize)) -> Result<()> {
        let state = self.ctl.snapshot();
        let timeline = state.timeline();
        let from = if timeline.session().map(str::to_string) == mark.0 {
            mark.1.min(timeline.len())
        } else {
            0
        };
        let fresh = &timeline.messages()[from..];
        render::print_messages(fresh, &self.palette);
        let cwd = std::env::current_dir().context("read current directory")?;
        for path in render::save_images(fresh, &cwd, &self.config.ui.download_name)
            .context("Failed to save image")?
        {
            println!("Saved image to {}", path.display());
        }
        self.flush_notices();
        Ok(())
    }

    pub fn flush_notices(&self) {
        render::print_notices(self.ctl.take_notices(), &self.palette);
    }

    pub fn print_timeline(&self) {
        let state = self.ctl.snapshot();
        match state.timeline().session() {
            Some(id) => println!("Session {id}"),
            None => println!("No active session"),
        }
        render::print_messages(state.timeline().messages(), &self.palette);
        self.flush_notices();
    }
}

/// Turn a rejected transition into a command error.
pub fn check(transition: Transition) -> Result<()> {
    match transition {
        Transition::Rejected(Rejection::InvalidFile(reason)) => bail!("{reason}"),
        Transition::Rejected(r) => bail!("Not done: {r}"),
        _ => Ok(()),
    }
}

fn prompt_credentials(
    username: Option<String>,
    password: Option<String>,
    confirm: bool,
) -> Result<(String, String)> {
    let username = match username {
        Some(u) => u,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .context("read username")?,
    };
    let password = match password {
        Some(p) => p,
        None => {
            let mut prompt = Password::new().with_prompt("Password");
            if confirm {
                prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
            }
            prompt.interact().context("read password")?
        }
    };
    Ok((username, password))
}

pub async fn login(app: &App, username: Option<String>, password: Option<String>) -> Result<()> {
    let (username, password) = prompt_credentials(username, password, false)?;
    let identity = app.ctl.login(&username, &password).await?;
    println!("Logged in as {}", identity.username);
    app.print_timeline();
    Ok(())
}

pub async fn register(app: &App, username: Option<String>, password: Option<String>) -> Result<()> {
    let (username, password) = prompt_credentials(username, password, true)?;
    let identity = app.ctl.register(&username, &password).await?;
    println!("Registered and logged in as {}", identity.username);
    app.print_timeline();
    Ok(())
}

pub fn logout(app: &App) -> Result<()> {
    match app.ctl.restore_identity() {
        Some(identity) => {
            app.ctl.logout();
            println!("Logged out {}", identity.username);
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

pub fn whoami(app: &App) -> Result<()> {
    match app.ctl.restore_identity() {
        Some(identity) => println!("[{}] {} (id {})", identity.initial(), identity.username, identity.id),
        None => println!("Not logged in"),
    }
    Ok(())
}

pub async fn status(app: &App) -> Result<()> {
    let health = app
        .ctl
        .backend()
        .health()
        .await
        .with_context(|| format!("Backend unreachable at {}", app.config.server.url))?;
    println!("Gateway: {} ({})", health.gateway, app.config.server.url);
    for (name, service) in &health.services {
        let mark = if service.is_healthy() { "ok" } else { "down" };
        match &service.error {
            Some(err) => println!("  {name:<12} {mark}  {err}"),
            None => println!("  {name:<12} {mark}"),
        }
    }
    Ok(())
}

pub async fn history(app: &App) -> Result<()> {
    app.require_identity()?;
    if !app.ctl.refresh_history().await {
        app.flush_notices();
        bail!("Could not load chat history");
    }
    let active = app.ctl.session_store().active_session();
    let lines = app
        .ctl
        .with_state(|s| render::format_history(s.history(), active.as_deref()));
    if lines.is_empty() {
        println!("No chats yet");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

pub async fn new_chat(app: &App) -> Result<()> {
    app.ctl.restore_identity();
    app.ctl.start_new_chat().await;
    app.print_timeline();
    if app.ctl.with_state(|s| s.active_session().is_none()) {
        bail!("Could not start a chat session");
    }
    Ok(())
}

pub async fn open(app: &App, session_id: &str) -> Result<()> {
    app.ctl.restore_identity();
    app.ctl.load_session(session_id).await;
    if app.ctl.with_state(|s| s.timeline().session() != Some(session_id)) {
        app.flush_notices();
        bail!("Could not open session {session_id}");
    }
    app.print_timeline();
    Ok(())
}

pub async fn show(app: &App) -> Result<()> {
    app.ctl.restore().await;
    app.print_timeline();
    Ok(())
}

pub async fn delete(app: &App, session_id: &str, yes: bool) -> Result<()> {
    app.ctl.restore_identity();
    let ask = |prompt: &str| {
        yes || Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    };
    let mark = app.mark();
    match app.ctl.delete_session(session_id, &ask).await {
        DeleteOutcome::Cancelled => println!("Cancelled"),
        DeleteOutcome::Failed => {
            app.flush_notices();
            bail!("Could not delete session {session_id}");
        }
        DeleteOutcome::Deleted { was_active } => {
            println!("Deleted {session_id}");
            if was_active {
                app.print_since(&mark)?;
            }
        }
    }
    Ok(())
}

pub async fn share(app: &App, session_id: Option<String>, print: bool) -> Result<()> {
    app.ctl.restore_identity();
    let Some(session_id) = session_id.or_else(|| app.ctl.session_store().active_session()) else {
        bail!("No session to share. Pass a session id.");
    };
    let text = app.ctl.share_session(&session_id, &SystemClipboard).await;
    app.flush_notices();
    match text {
        Some(text) if print => println!("{text}"),
        Some(_) => {}
        None => bail!("Could not share session {session_id}"),
    }
    Ok(())
}

pub async fn send(app: &App, text: &str) -> Result<()> {
    app.ctl.restore().await;
    let mark = app.mark();
    check(app.ctl.send_message(text).await)?;
    app.print_since(&mark)
}

pub async fn upload(app: &App, file: &Path) -> Result<()> {
    app.ctl.restore().await;
    let mark = app.mark();
    let transition = app.ctl.upload_file(file).await;
    app.flush_notices();
    check(transition)?;
    app.print_since(&mark)
}

pub fn theme(app: &App, toggle: bool) -> Result<()> {
    let default = app.config.ui.default_theme;
    let theme = if toggle {
        app.ctl.toggle_theme(default)
    } else {
        app.ctl.theme(default)
    };
    println!("Theme: {theme}");
    Ok(())
}

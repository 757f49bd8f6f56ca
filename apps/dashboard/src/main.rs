use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ApiClient, ClientError, EditCredentials, EditSessionController, FileSessionStore,
    ServerEditGate, SessionContext,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod present;
mod prompt;
mod shell;

use config::load_settings;
use present::{print_form, print_save_outcome, print_view};
use prompt::Prompter;

#[derive(Parser, Debug)]
#[command(name = "rentdesk", about = "Look up and edit rental site records")]
struct Cli {
    /// Settings file, `dashboard.toml` when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and persist the session.
    Login {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Display one site.
    Show { site_id: String },
    /// Apply `field=value` edits to one site and save them.
    Edit {
        site_id: String,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
        #[arg(long)]
        edit_user: Option<String>,
        #[arg(long)]
        edit_password: Option<String>,
    },
    /// Interactive session (default).
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref());
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    if let Some(path) = cli.session_file {
        settings.session_file = path;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let session = SessionContext::open(FileSessionStore::new(&settings.session_file));
    let api = Arc::new(
        ApiClient::new(&settings.api_base_url, session)
            .with_context(|| format!("invalid api url {}", settings.api_base_url))?,
    );
    let gate = Arc::new(ServerEditGate::new(api.clone()));
    let controller = EditSessionController::new(api.clone(), gate);
    info!(api = %api.base_url(), session_file = %settings.session_file.display(), "dashboard ready");

    let mut prompter = Prompter::stdin();
    let result = match cli.command.unwrap_or(Command::Shell) {
        Command::Login { username, password } => {
            let username = prompter.ask_if_missing(username, "username").await?;
            let password = prompter.ask_if_missing(password, "password").await?;
            api.login(username.trim(), &password)
                .await
                .map(|user| println!("signed in as {}", user.username))
        }
        Command::Logout => {
            api.logout();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            match api.session().user() {
                Some(user) => println!(
                    "{} ({})",
                    user.username,
                    user.role.as_deref().unwrap_or("no role")
                ),
                None => println!("not signed in"),
            }
            Ok(())
        }
        Command::Show { site_id } => controller.search(&site_id).await.map(|view| print_view(&view)),
        Command::Edit {
            site_id,
            set,
            edit_user,
            edit_password,
        } => {
            let edits = parse_assignments(&set)?;
            edit_once(
                &controller,
                &mut prompter,
                &site_id,
                &edits,
                edit_user,
                edit_password,
            )
            .await?
        }
        Command::Shell => {
            let events = api.session().subscribe();
            return shell::run(controller, &mut prompter, events).await;
        }
    };

    if let Err(err) = result {
        if err.requires_login() {
            bail!("{err}; run `rentdesk login` first");
        }
        return Err(err.into());
    }
    Ok(())
}

fn parse_assignments(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| match item.split_once('=') {
            Some((field, value)) => Ok((field.trim().to_string(), value.to_string())),
            None => bail!("expected FIELD=VALUE, got `{item}`"),
        })
        .collect()
}

async fn edit_once(
    controller: &Arc<EditSessionController>,
    prompter: &mut Prompter,
    site_id: &str,
    edits: &[(String, String)],
    edit_user: Option<String>,
    edit_password: Option<String>,
) -> Result<Result<(), ClientError>> {
    if let Err(err) = controller.search(site_id).await {
        return Ok(Err(err));
    }
    let username = prompter.ask_if_missing(edit_user, "edit username").await?;
    let password = prompter.ask_if_missing(edit_password, "edit password").await?;
    if let Err(err) = controller
        .unlock_editing(&EditCredentials::new(username, password))
        .await
    {
        return Ok(Err(err));
    }

    let outcome = async {
        controller.enter_edit().await?;
        for (field, value) in edits {
            controller.set_field(field, value).await?;
        }
        if let Some(form) = controller.form().await {
            print_form(&form);
        }
        controller.save().await
    }
    .await;
    Ok(outcome.map(|outcome| print_save_outcome(&outcome)))
}

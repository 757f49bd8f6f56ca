use std::sync::Arc;

use anyhow::Result;
use client_core::{
    AuthError, ClientError, EditCredentials, EditSessionController, SessionEvent,
};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::debug;

use crate::{
    present::{print_form, print_save_outcome, print_view},
    prompt::Prompter,
};

const HELP: &str = "\
commands:
  search <site-id>        look a site up and display it
  view                    show the displayed site again
  edit                    switch the displayed site into edit mode
  set <field> [value...]  change one input while editing
  form                    show the edit form
  save                    send changed fields to the server
  cancel                  leave edit mode and reload the site
  login | logout | whoami
  help | quit";

enum Input {
    Line(Option<String>),
    Session(Result<SessionEvent, RecvError>),
}

/// Runs the interactive loop until `quit` or end of input. `events` must be
/// subscribed to the controller's session.
pub async fn run(
    controller: Arc<EditSessionController>,
    prompter: &mut Prompter,
    mut events: Receiver<SessionEvent>,
) -> Result<()> {
    println!("{HELP}");
    if !controller.api().session().is_authenticated() {
        redirect_to_login(&controller, prompter, "Please log in.").await?;
    }

    loop {
        prompter.prompt("rentdesk> ").await?;

        // Session events first: an expiry raised by the previous command
        // must be handled before any typed-ahead line runs.
        let input = tokio::select! {
            biased;
            event = events.recv() => Input::Session(event),
            line = prompter.next_line() => Input::Line(line?),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                if !dispatch(&controller, prompter, line.trim()).await? {
                    break;
                }
            }
            Input::Session(Ok(SessionEvent::Expired))
                if controller.api().session().is_authenticated() =>
            {
                debug!("expiry already resolved by a later login");
            }
            Input::Session(Ok(SessionEvent::Expired)) => {
                println!();
                redirect_to_login(
                    &controller,
                    prompter,
                    "Your session has expired. Please log in again.",
                )
                .await?;
            }
            Input::Session(Ok(event)) => debug!(?event, "session event"),
            Input::Session(Err(RecvError::Lagged(skipped))) => {
                debug!(skipped, "session events lagged")
            }
            Input::Session(Err(RecvError::Closed)) => break,
        }
    }
    Ok(())
}

/// Runs one shell command; `false` ends the loop.
async fn dispatch(
    controller: &Arc<EditSessionController>,
    prompter: &mut Prompter,
    line: &str,
) -> Result<bool> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let result = match command {
        "" => Ok(()),
        "help" => {
            println!("{HELP}");
            Ok(())
        }
        "quit" | "exit" => return Ok(false),
        "search" | "show" => controller.search(rest).await.map(|view| print_view(&view)),
        "view" => {
            match controller.displayed().await {
                Some(view) => print_view(&view),
                None => println!("no site displayed"),
            }
            Ok(())
        }
        "edit" => enter_edit(controller, prompter).await?,
        "set" => {
            let (field, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            controller.set_field(field, value).await
        }
        "form" => {
            match controller.form().await {
                Some(form) => print_form(&form),
                None => println!("not editing"),
            }
            Ok(())
        }
        "save" => controller
            .save()
            .await
            .map(|outcome| print_save_outcome(&outcome)),
        "cancel" => controller.cancel().await.map(|view| match view {
            Some(view) => print_view(&view),
            None => println!("not editing"),
        }),
        "login" => {
            login(controller, prompter).await?;
            Ok(())
        }
        "logout" => {
            controller.api().logout();
            controller.reset().await;
            println!("signed out");
            Ok(())
        }
        "whoami" => {
            match controller.api().session().user() {
                Some(user) => println!("{}", user.username),
                None => println!("not signed in"),
            }
            Ok(())
        }
        other => {
            println!("unknown command: {other} (try `help`)");
            Ok(())
        }
    };

    if let Err(err) = result {
        report(controller, prompter, err).await?;
    }
    Ok(true)
}

async fn enter_edit(
    controller: &Arc<EditSessionController>,
    prompter: &mut Prompter,
) -> Result<Result<(), ClientError>> {
    if controller.displayed().await.is_none() {
        return Ok(Err(client_core::ValidationError::NoRecordSelected.into()));
    }
    if !controller.is_edit_unlocked().await {
        let username = prompter.ask("edit username").await?;
        let password = prompter.ask("edit password").await?;
        if let Err(err) = controller
            .unlock_editing(&EditCredentials::new(username, password))
            .await
        {
            return Ok(Err(err));
        }
    }
    Ok(controller.enter_edit().await.map(|form| print_form(&form)))
}

async fn report(
    controller: &Arc<EditSessionController>,
    prompter: &mut Prompter,
    err: ClientError,
) -> Result<()> {
    match err.auth() {
        // The expiry event drives the redirect, once for all failed calls.
        Some(AuthError::SessionExpired) => Ok(()),
        Some(AuthError::NotAuthenticated) => {
            redirect_to_login(controller, prompter, "Please log in.").await
        }
        None => {
            println!("error: {err}");
            Ok(())
        }
    }
}

async fn redirect_to_login(
    controller: &Arc<EditSessionController>,
    prompter: &mut Prompter,
    reason: &str,
) -> Result<()> {
    controller.reset().await;
    println!("{reason}");
    login(controller, prompter).await
}

async fn login(controller: &Arc<EditSessionController>, prompter: &mut Prompter) -> Result<()> {
    let username = prompter.ask("username").await?;
    if username.trim().is_empty() {
        println!("login skipped; use `login` when ready");
        return Ok(());
    }
    let password = prompter.ask("password").await?;
    match controller.api().login(username.trim(), &password).await {
        Ok(user) => {
            controller.reset().await;
            println!("signed in as {}", user.username);
        }
        Err(err) => println!("{err}"),
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;

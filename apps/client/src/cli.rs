//! Command line interface
//!
//! `login` stores credentials, `logout` removes them and `subscribe` relays
//! webhook deliveries to a local service until the connection ends.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use hookrelay_common::{
    RelayError, ValidationError,
    constants::{
        DEFAULT_TUNNEL_ADDRESS, FORWARD_TIMEOUT_SECS, LOCAL_DIAL_TIMEOUT_SECS, TUNNEL_ADDRESS_ENV,
    },
    validation::{dial_target, local_base, validate_local_address, validate_project_id},
};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{
    config::SessionConfig,
    console::Console,
    credentials::{
        CredentialSource, Credentials, EnvCredentials, FileCredentials, FlagCredentials,
        credential_file_path, remove_credential_file, resolve_credentials, write_credential_file,
    },
    session::Session,
};

const EXIT_COMMAND: &str = "exit";

/// CLI arguments for the relay client
#[derive(Parser, Debug)]
#[command(name = "hookrelay")]
#[command(about = "Receive webhook requests on localhost through a relay tunnel", long_about = None)]
#[command(version)]
pub struct Args {
    /// Colorize output when stdout is a terminal
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    pub colors: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authenticate and store credentials in the credential file
    Login(LoginArgs),
    /// Remove the credential file
    Logout(LogoutArgs),
    /// Relay webhook requests to a local service
    Subscribe(SubscribeArgs),
}

/// Where credentials and the relay server come from
#[derive(clap::Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Project ID (pro-<number>)
    #[arg(long)]
    pub project_id: Option<String>,

    /// CLI secret for the project
    #[arg(long)]
    pub cli_secret: Option<String>,

    /// WebSocket endpoint of the relay server
    #[arg(long, env = TUNNEL_ADDRESS_ENV, default_value = DEFAULT_TUNNEL_ADDRESS)]
    pub tunnel_address: String,

    /// Credential file (defaults to $HOME/.hookrelay)
    #[arg(long)]
    pub credential_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LoginArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LogoutArgs {
    /// Remove the credential file without asking
    #[arg(short, long)]
    pub force: bool,

    /// Credential file (defaults to $HOME/.hookrelay)
    #[arg(long)]
    pub credential_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SubscribeArgs {
    /// Local service to forward requests to (e.g., http://localhost:8000)
    pub local_address: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Timeout in seconds when calling the local service
    #[arg(long, default_value_t = FORWARD_TIMEOUT_SECS)]
    pub request_timeout: u64,
}

impl From<&CredentialArgs> for FlagCredentials {
    fn from(args: &CredentialArgs) -> Self {
        FlagCredentials::new(args.project_id.clone(), args.cli_secret.clone())
    }
}

pub async fn run(args: Args) -> Result<()> {
    let console = Console::new(args.colors);
    let mut input = io::BufReader::new(io::stdin());
    let mut output = io::stdout();

    match &args.command {
        Command::Login(login_args) => login(login_args, console, &mut input, &mut output).await,
        Command::Logout(logout_args) => logout(logout_args, console, &mut input, &mut output),
        Command::Subscribe(subscribe_args) => subscribe(subscribe_args, console, &mut output).await,
    }
}

pub async fn subscribe(args: &SubscribeArgs, console: Console, out: &mut impl Write) -> Result<()> {
    let local_url = validate_local_address(&args.local_address)?;
    check_reachable(&local_url).await?;

    let credentials = match resolve(&args.credentials) {
        Ok(credentials) => credentials,
        Err(e) if e.is_missing_credential() => {
            return Err(e).context(
                "No credentials found, run `hookrelay login` or pass --project-id and --cli-secret",
            );
        }
        Err(e) => return Err(e).context("Failed to read credentials"),
    };
    validate_project_id(&credentials.project_id)?;

    let session = Session::new(
        SessionConfig::from_args(args),
        console,
        CancellationToken::new(),
    )?;

    write!(
        out,
        "Subscribing to tunnel server ({}) to get webhook requests for {} ... ",
        args.credentials.tunnel_address,
        console.bold(&args.local_address)
    )?;
    out.flush()?;

    match session
        .connect(&credentials.project_id, &credentials.cli_secret)
        .await
    {
        Ok(()) => writeln!(out, "{}", console.bold(&console.green("success!")))?,
        Err(e) if e.is_auth_rejection() => {
            writeln!(out, "{}", console.bold(&console.red(&rejection_label(&e))))?;
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to connect to tunnel server"),
    }

    match session.start(&local_base(&local_url)).await {
        Ok(()) => Ok(()),
        Err(RelayError::ConnectionClosed) => {
            writeln!(out, "{}", RelayError::ConnectionClosed)?;
            Ok(())
        }
        Err(e) => Err(e).context("Relay session ended with an error"),
    }
}

pub async fn login(
    args: &LoginArgs,
    console: Console,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let creds = &args.credentials;

    let project_id = match creds.project_id.as_deref().filter(|id| !id.is_empty()) {
        Some(project_id) => {
            validate_project_id(project_id)?;
            project_id.to_string()
        }
        None => match prompt(
            "Please give us your project ID",
            "project ID",
            validate_project_id,
            console,
            input,
            out,
        )? {
            Some(project_id) => project_id,
            None => return Ok(()),
        },
    };

    let cli_secret = match creds.cli_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(cli_secret) => cli_secret.to_string(),
        None => match prompt(
            "Please give us your CLI secret",
            "CLI secret",
            |_| Ok(()),
            console,
            input,
            out,
        )? {
            Some(cli_secret) => cli_secret,
            None => return Ok(()),
        },
    };

    let config = SessionConfig::new(creds.tunnel_address.clone()).with_signal_handling(false);
    let session = Session::new(config, console, CancellationToken::new())?;

    write!(
        out,
        "Authenticating to tunnel server ({}) ... ",
        creds.tunnel_address
    )?;
    out.flush()?;

    match session.connect(&project_id, &cli_secret).await {
        Ok(()) => writeln!(out, "{}", console.green("success!"))?,
        Err(e) if e.is_auth_rejection() => {
            writeln!(out, "{}", console.red(&rejection_label(&e)))?;
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to connect to tunnel server"),
    }

    let saved = credential_file_path(creds.credential_file.as_deref()).and_then(|path| {
        write_credential_file(&path, &Credentials::new(project_id, cli_secret))?;
        Ok(path)
    });
    let stopped = session.stop().await;

    let path = saved.context("Failed to write credential file")?;
    stopped.context("Failed to close connection")?;

    writeln!(
        out,
        "{}",
        console.green(&format!(
            "Successfully logged in by writing the credential file '{}' (use logout command to remove)!",
            path.display()
        ))
    )?;
    Ok(())
}

pub fn logout(
    args: &LogoutArgs,
    console: Console,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !args.force && !confirm_logout(console, input, out)? {
        return Ok(());
    }

    let path = credential_file_path(args.credential_file.as_deref())?;

    if remove_credential_file(&path)? {
        writeln!(
            out,
            "{}",
            console.green(&format!(
                "Successfully logged out by deleting the credential file '{}'!",
                path.display()
            ))
        )?;
    } else {
        writeln!(
            out,
            "Credential file '{}' does not exist, doing nothing",
            path.display()
        )?;
    }
    Ok(())
}

/// Flags, then environment, then the credential file
fn resolve(args: &CredentialArgs) -> hookrelay_common::Result<Credentials> {
    let flags = FlagCredentials::from(args);
    let env = EnvCredentials::default();
    let file = credential_file_path(args.credential_file.as_deref())
        .map(FileCredentials::new)
        .ok();

    let mut sources: Vec<&dyn CredentialSource> = Vec::with_capacity(3);
    sources.push(&flags);
    sources.push(&env);
    if let Some(file) = &file {
        sources.push(file);
    }

    resolve_credentials(&sources)
}

async fn check_reachable(url: &Url) -> std::result::Result<(), ValidationError> {
    let target = dial_target(url);
    debug!("Checking that {} is reachable", target);

    match timeout(
        Duration::from_secs(LOCAL_DIAL_TIMEOUT_SECS),
        TcpStream::connect(&target),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            debug!("Failed to connect to {}: {}", target, e);
            Err(ValidationError::Unreachable(target))
        }
        Err(_) => Err(ValidationError::Unreachable(target)),
    }
}

fn rejection_label(err: &RelayError) -> String {
    let reason = match err {
        RelayError::Unauthorized => "invalid credentials",
        RelayError::SessionConflict => "another client is already connected",
        _ => "internal server error",
    };
    format!("failed ({})!", reason)
}

/// Ask until a usable value is given; `None` means the user typed exit
fn prompt(
    question: &str,
    label: &str,
    validate: fn(&str) -> std::result::Result<(), ValidationError>,
    console: Console,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<Option<String>> {
    loop {
        write!(out, "{}: ", question)?;
        out.flush()?;

        let Some(answer) = read_answer(input)? else {
            return Ok(None);
        };

        if answer.is_empty() {
            writeln!(
                out,
                "{}",
                console.red(&format!("Empty {} (type exit to exit)", label))
            )?;
            continue;
        }

        if answer == EXIT_COMMAND {
            return Ok(None);
        }

        if let Err(e) = validate(&answer) {
            writeln!(out, "{}", console.red(&format!("{} (type exit to exit)", e)))?;
            continue;
        }

        return Ok(Some(answer));
    }
}

fn confirm_logout(console: Console, input: &mut impl BufRead, out: &mut impl Write) -> Result<bool> {
    loop {
        write!(
            out,
            "Are you sure you want to log out (remove credentials file)? [yes/no/exit]: "
        )?;
        out.flush()?;

        let Some(answer) = read_answer(input)? else {
            return Ok(false);
        };

        match answer.as_str() {
            "yes" => return Ok(true),
            "no" | EXIT_COMMAND => return Ok(false),
            "" => writeln!(out, "{}", console.red("Empty choice (type exit to exit)"))?,
            _ => writeln!(
                out,
                "{}",
                console.red("Invalid input, only yes, no or exit are allowed")
            )?,
        }
    }
}

/// One trimmed line of input; `None` at end of input
fn read_answer(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

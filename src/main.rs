use anyhow::{anyhow, bail, Context};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use tokio::net::lookup_host;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tftp::{Cli, Client, Command, Config, Credentials, Server, ServerArgs, TransferArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let config = args.config();

    match args.command {
        Command::Server(server) => serve(server, config).await,
        Command::Get(transfer) => {
            let client = connect(&transfer, config).await?;
            let report = client.download(&transfer.filename).await?;
            println!(
                "File downloaded successfully: {} ({} bytes)",
                transfer.filename, report.bytes
            );
            Ok(())
        }
        Command::Put(transfer) => {
            let client = connect(&transfer, config).await?;
            let report = client.upload(&transfer.filename).await?;
            println!(
                "File uploaded successfully: {} ({} bytes)",
                transfer.filename, report.bytes
            );
            Ok(())
        }
    }
}

async fn serve(args: ServerArgs, config: Config) -> anyhow::Result<()> {
    let credentials = match Credentials::load(&args.credentials) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("failed to load credentials from {}: {e}", args.credentials.display());
            Credentials::new()
        }
    };

    let server = Server::bind(
        (args.ip, args.port),
        &args.directory,
        credentials,
        config.clone(),
    )
    .await?;
    info!(
        "TFTP server listen on {}, workdir: {}, timeout: {} ms, retry: {}, strict ack: {}",
        server.local_addr()?,
        args.directory.display(),
        config.timeout.as_millis(),
        config.max_retries,
        config.strict_ack
    );
    server.run().await?;
    Ok(())
}

// Resolves the server, authenticates, and hands back a ready client.
async fn connect(args: &TransferArgs, config: Config) -> anyhow::Result<Client> {
    let server: SocketAddr = lookup_host((args.server.as_str(), args.port))
        .await
        .with_context(|| format!("resolve {}", args.server))?
        .next()
        .ok_or(anyhow!("no address for {}", args.server))?;
    let client = Client::bind(server, &args.directory, config).await?;

    let username = match &args.user {
        Some(user) => user.clone(),
        None => ask("Enter username: ").await?,
    };
    let password = match &args.password {
        Some(password) => password.clone(),
        None => ask("Enter password: ").await?,
    };

    if !client.authenticate(&username, &password).await? {
        bail!("Authentication failed");
    }
    Ok(client)
}

// stdin blocks, so it runs off the async workers.
async fn ask(label: &'static str) -> anyhow::Result<String> {
    let line = task::spawn_blocking(move || prompt(io::stdin().lock(), io::stdout(), label));
    Ok(line.await??)
}

fn prompt(mut input: impl BufRead, mut output: impl Write, label: &str) -> io::Result<String> {
    write!(output, "{label}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

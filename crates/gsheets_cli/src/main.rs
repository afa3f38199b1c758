mod commands;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gsheets_adapter::{AdapterOptions, GSheetsAdapter};
use gsheets_error::{DbError, Result, ResultExt};
use gsheets_http::native::ReqwestHttpClient;

use crate::commands::{FilterArgs, append, delete, describe, scan};

#[derive(Parser)]
#[clap(name = "gsheets")]
struct Arguments {
    #[clap(flatten)]
    auth: AuthArgs,
    /// Log format, 'human' or 'json'.
    #[clap(long, default_value = "human")]
    log_format: String,
    /// Log level used when RUST_LOG isn't set.
    #[clap(long, default_value = "warn")]
    log_level: tracing::Level,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Args)]
struct AuthArgs {
    /// OAuth access token.
    #[clap(long, env = "GSHEETS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    /// Path to a service account key file.
    #[clap(long, env = "GSHEETS_SERVICE_ACCOUNT_FILE")]
    service_account_file: Option<PathBuf>,
    /// User to impersonate with the service account.
    #[clap(long, env = "GSHEETS_SUBJECT")]
    subject: Option<String>,
}

impl AuthArgs {
    fn into_options(self) -> AdapterOptions {
        AdapterOptions {
            access_token: self.access_token,
            service_account_file: self.service_account_file,
            service_account_info: None,
            subject: self.subject,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the columns of a sheet.
    Describe { url: String },
    /// Print matching rows as json lines.
    Scan {
        url: String,
        #[clap(flatten)]
        filters: FilterArgs,
        /// Column to order by, may be repeated.
        #[clap(long)]
        order: Vec<String>,
        /// Order descending.
        #[clap(long)]
        desc: bool,
        #[clap(long)]
        limit: Option<u64>,
        #[clap(long)]
        offset: Option<u64>,
    },
    /// Append a row.
    Append {
        url: String,
        /// Column value as 'column=value', may be repeated.
        #[clap(long = "set", required = true)]
        values: Vec<String>,
    },
    /// Delete matching rows.
    Delete {
        url: String,
        #[clap(flatten)]
        filters: FilterArgs,
    },
}

impl Command {
    fn url(&self) -> &str {
        match self {
            Command::Describe { url }
            | Command::Scan { url, .. }
            | Command::Append { url, .. }
            | Command::Delete { url, .. } => url,
        }
    }
}

fn main() {
    let args = Arguments::parse();
    let format = logutil::LogFormat::from_name(&args.log_format).unwrap_or_default();
    logutil::configure_global_logger(args.log_level, format, io::stderr);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gsheets")
        .build()
        .context("Failed to build tokio runtime")
        .and_then(|runtime| runtime.block_on(inner(args)));

    if let Err(err) = result {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

async fn inner(args: Arguments) -> Result<()> {
    let url = args.command.url().to_string();
    if !gsheets_adapter::supports(&url) {
        return Err(DbError::new("Not a spreadsheet url").with_field("url", url));
    }

    let mut adapter =
        GSheetsAdapter::try_new(ReqwestHttpClient::default(), &url, args.auth.into_options())
            .await?;
    let mut stdout = BufWriter::new(io::stdout());

    match args.command {
        Command::Describe { .. } => describe(&adapter, &mut stdout)?,
        Command::Scan {
            filters,
            order,
            desc,
            limit,
            offset,
            ..
        } => {
            let request = filters.scan_request(&adapter, &order, desc, limit, offset)?;
            scan(&mut adapter, request, &mut stdout).await?
        }
        Command::Append { values, .. } => append(&mut adapter, &values, &mut stdout).await?,
        Command::Delete { filters, .. } => {
            let request = filters.scan_request(&adapter, &[], false, None, None)?;
            delete(&mut adapter, request, &mut stdout).await?
        }
    }

    stdout.flush()?;
    Ok(())
}

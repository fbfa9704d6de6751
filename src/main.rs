use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use jmbo_neo::api::{NeoApi, NeoClient};
use jmbo_neo::auth::{AuthOutcome, NeoBackend, PasswordEncoder, PlainEncoder, Sha256Encoder};
use jmbo_neo::config::{NeoConfig, DEFAULT_CONFIG_PATH};
use jmbo_neo::constants::DOB_FORMAT;
use jmbo_neo::export::{dataloadtool_export, select_members};
use jmbo_neo::member::{Member, Snapshot};
use jmbo_neo::storage::InMemoryProfileStore;
use jmbo_neo::wrapper::ConsumerWrapper;
use jmbo_neo::{logging, metrics, xml};

#[derive(Parser)]
#[command(name = "jmbo_neo")]
#[command(about = "Neo/CIDB consumer tools for member data")]
#[command(version)]
struct Cli {
    /// Path to the Neo settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serve Prometheus metrics on this address, e.g. 127.0.0.1:9464
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export members as XML for the CIDB Data Load Tool
    Export(ExportArgs),
    #[command(flatten)]
    Remote(RemoteCommand),
}

/// Commands that talk to Neo.
#[derive(Subcommand)]
enum RemoteCommand {
    /// Fetch a consumer and print its member fields as JSON
    Consumer {
        consumer_id: String,
    },
    /// Check a login against Neo (password is read from NEO_LOGIN_PASSWORD)
    Authenticate {
        #[arg(long)]
        username: String,
        /// Send the password as is instead of its SHA-256 digest
        #[arg(long)]
        plain: bool,
    },
    /// Look up country details
    Country {
        #[arg(long, conflicts_with = "ip", required_unless_present = "ip")]
        code: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Check whether a date of birth passes the age gate
    AgeCheck {
        /// Date of birth as YYYY-MM-DD
        #[arg(long)]
        dob: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        gateway: String,
        #[arg(long)]
        language: Option<String>,
    },
}

#[derive(Args)]
struct ExportArgs {
    /// JSON file holding an array of members
    #[arg(long)]
    members: PathBuf,
    /// Output file (default: standard output)
    #[arg(short, long)]
    file: Option<PathBuf>,
    #[arg(short, long)]
    pretty_print: bool,
    /// Export all members, including those already linked to a consumer
    #[arg(short, long)]
    all: bool,
}

fn run_export(config: &NeoConfig, args: ExportArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.members)
        .with_context(|| format!("reading members from {}", args.members.display()))?;
    let members: Vec<Member> = serde_json::from_str(&raw).context("parsing members JSON")?;
    let selected = select_members(&members, args.all);
    info!("Exporting {} of {} members", selected.len(), members.len());

    let context = config.consumer_context();
    let count = match args.file {
        Some(path) => {
            let out = BufWriter::new(File::create(&path).with_context(|| format!("creating {}", path.display()))?);
            dataloadtool_export(out, selected, &context, args.pretty_print)?
        }
        None => {
            let stdout = io::stdout();
            dataloadtool_export(stdout.lock(), selected, &context, args.pretty_print)?
        }
    };
    eprintln!("Exported {} members", count);
    Ok(())
}

fn print_xml(node: &xml::XmlNode) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    xml::write_document(node, &mut out, true)?;
    out.flush()?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = NeoConfig::load_from(&cli.config)?;
    match cli.command {
        Commands::Export(args) => run_export(&config, args),
        Commands::Remote(command) => run_remote(&config, command).await,
    }
}

async fn run_remote(config: &NeoConfig, command: RemoteCommand) -> Result<()> {
    let client = Arc::new(NeoClient::new(config.clone())?);
    match command {
        RemoteCommand::Consumer { consumer_id } => {
            let consumer = client.get_consumer(&consumer_id, None).await?;
            let wrapper = ConsumerWrapper::with_consumer(consumer, config.consumer_context());
            let snapshot = Snapshot::from_wrapper(&wrapper)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        RemoteCommand::Authenticate { username, plain } => {
            let password = std::env::var("NEO_LOGIN_PASSWORD")
                .context("NEO_LOGIN_PASSWORD must hold the password to check")?;
            let encoder: Box<dyn PasswordEncoder> = if plain {
                Box::new(PlainEncoder)
            } else {
                Box::new(Sha256Encoder)
            };
            let backend = NeoBackend::with_encoder(
                client.clone(),
                Arc::new(InMemoryProfileStore::new()),
                config.consumer_context(),
                encoder,
            );
            match backend.authenticate(&username, &password).await? {
                AuthOutcome::Rejected => bail!("Neo rejected the login for {}", username),
                AuthOutcome::Linked(member_id) => println!("linked to member {}", member_id),
                AuthOutcome::Unlinked { consumer_id, member } => {
                    println!("consumer {}", consumer_id);
                    println!("{}", serde_json::to_string_pretty(&member)?);
                }
            }
        }
        RemoteCommand::Country { code, ip } => {
            let node = client.get_country(code.as_deref(), ip.as_deref()).await?;
            print_xml(&node)?;
        }
        RemoteCommand::AgeCheck {
            dob,
            country,
            gateway,
            language,
        } => {
            let dob = NaiveDate::parse_from_str(&dob, DOB_FORMAT)
                .with_context(|| format!("invalid date of birth '{}', expected YYYY-MM-DD", dob))?;
            let node = client
                .do_age_check(dob, &country, &gateway, language.as_deref())
                .await?;
            print_xml(&node)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    if let Some(addr) = &cli.metrics_addr {
        metrics::init_metrics(addr);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_is_handled_locally() {
        let cli = Cli::try_parse_from(["jmbo_neo", "export", "--members", "members.json", "-p"]).unwrap();
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.members, PathBuf::from("members.json"));
                assert!(args.pretty_print);
                assert!(!args.all);
            }
            Commands::Remote(_) => panic!("export should not need Neo"),
        }
    }

    #[test]
    fn test_remote_commands_keep_their_names() {
        let cli = Cli::try_parse_from(["jmbo_neo", "country", "--ip", "10.0.0.1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Remote(RemoteCommand::Country { code: None, ip: Some(_) })
        ));

        let cli = Cli::try_parse_from([
            "jmbo_neo", "age-check", "--dob", "1990-04-01", "--country", "ZA", "--gateway", "gw1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Remote(RemoteCommand::AgeCheck { .. })));

        assert!(Cli::try_parse_from(["jmbo_neo", "country"]).is_err());
    }
}

//! Command-line interface for the bulk download client.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sat_cfdi::flatten;

use crate::client::DescargaClient;
use crate::config::{validate_date, validate_rfc, ClientConfig};
use crate::credential::Credential;
use crate::error::{DescargaError, Result};
use crate::lifecycle::{DocumentKind, RequestParams, Verification};
use crate::package::{process_package, DirectoryExtractor, PackageReport};

/// SAT Descarga Masiva - Bulk download of CFDI from the SAT web service.
#[derive(Parser)]
#[command(name = "sat-descarga")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// e.firma files and the requester RFC.
#[derive(Args)]
pub struct CredentialArgs {
    /// Certificate file (.cer, DER or PEM)
    #[arg(long)]
    pub cert: PathBuf,

    /// Private key file (.key, DER or PEM)
    #[arg(long)]
    pub key: PathBuf,

    /// Private key passphrase
    #[arg(long, env = "SAT_KEY_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Requester RFC
    #[arg(long)]
    pub rfc: String,
}

impl std::fmt::Debug for CredentialArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArgs")
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("password", &"<redacted>")
            .field("rfc", &self.rfc)
            .finish()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the e.firma can open a session.
    Authenticate {
        #[command(flatten)]
        credential: CredentialArgs,
    },

    /// Submit a download request and print its id.
    Request {
        #[command(flatten)]
        credential: CredentialArgs,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// What to download: cfdi or metadata
        #[arg(long, default_value = "cfdi")]
        kind: DocumentKind,

        /// Only documents issued by this RFC
        #[arg(long)]
        issuer: Option<String>,

        /// Only documents received by this RFC
        #[arg(long)]
        receiver: Option<String>,
    },

    /// Check the status of a download request.
    Verify {
        #[command(flatten)]
        credential: CredentialArgs,

        /// Request id (IdSolicitud)
        request_id: String,

        /// Keep polling until the request finishes
        #[arg(long)]
        wait: bool,

        /// Seconds between polls with --wait
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },

    /// Download a package as a zip file.
    Download {
        #[command(flatten)]
        credential: CredentialArgs,

        /// Package id (from verify)
        package_id: String,

        /// Output directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify the CFDI XML files of an extracted package.
    Parse {
        /// Directory with the extracted XML files
        dir: PathBuf,

        /// RFC the documents are classified for
        #[arg(long)]
        rfc: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

/// Output format of the `parse` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Nested records as YAML
    Yaml,
    /// Nested records as a JSON array
    Json,
    /// One flat JSON object per line, with the spreadsheet column names
    Flat,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Authenticate { credential } => authenticate_command(&credential),
        Commands::Request {
            credential,
            start,
            end,
            kind,
            issuer,
            receiver,
        } => request_command(
            &credential,
            &start,
            &end,
            kind,
            issuer.as_deref(),
            receiver.as_deref(),
        ),
        Commands::Verify {
            credential,
            request_id,
            wait,
            interval,
        } => verify_command(&credential, &request_id, wait, Duration::from_secs(interval)),
        Commands::Download {
            credential,
            package_id,
            output,
        } => download_command(&credential, &package_id, output.as_deref()),
        Commands::Parse { dir, rfc, format } => parse_command(&dir, &rfc, format),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run `step` under a spinner, clearing it whatever the outcome.
fn with_spinner<T>(message: &str, step: impl FnOnce() -> Result<T>) -> Result<T> {
    let pb = spinner(message);
    let result = step();
    pb.finish_and_clear();
    result
}

fn open_client(args: &CredentialArgs) -> Result<DescargaClient> {
    let credential =
        Credential::from_files(&args.cert, &args.key, args.password.clone(), &*args.rfc)?;
    DescargaClient::new(credential, ClientConfig::from_env()?)
}

fn authenticate_command(args: &CredentialArgs) -> Result<()> {
    let client = open_client(args)?;
    with_spinner("Authenticating...", || client.authenticate())?;

    println!(
        "{} session opened for {}",
        style("Authenticated:").green().bold(),
        style(client.rfc()).cyan()
    );
    Ok(())
}

fn request_command(
    args: &CredentialArgs,
    start: &str,
    end: &str,
    kind: DocumentKind,
    issuer: Option<&str>,
    receiver: Option<&str>,
) -> Result<()> {
    let mut params = RequestParams::new(validate_date(start)?, validate_date(end)?, kind);
    if let Some(issuer) = issuer {
        params = params.with_issuer(issuer.trim().to_uppercase());
    }
    if let Some(receiver) = receiver {
        params = params.with_receiver(receiver.trim().to_uppercase());
    }
    params.validate()?;

    let client = open_client(args)?;
    println!(
        "{} {} from {} to {}",
        style("Requesting").bold(),
        style(kind.as_str()).cyan(),
        style(start).green(),
        style(end).green()
    );

    let id = with_spinner("Submitting request...", || client.create_request(&params))?;
    println!("{} {}", style("Request id:").green().bold(), id);
    Ok(())
}

fn print_verification(verification: &Verification) {
    println!(
        "  Status: {} ({})",
        style(verification.status.label()).cyan(),
        verification.status_code
    );
    if !verification.message.is_empty() {
        println!("  Message: {}", verification.message);
    }
    println!("  CFDIs: {}", verification.cfdi_count);
    for id in &verification.package_ids {
        println!("  Package: {}", style(id).green());
    }
}

fn verify_command(
    args: &CredentialArgs,
    request_id: &str,
    wait: bool,
    interval: Duration,
) -> Result<()> {
    let client = open_client(args)?;

    let mut polls = 0u32;
    let verification = loop {
        polls += 1;
        let verification = with_spinner("Checking request status...", || {
            client.verify_request(request_id)
        })?;
        if !wait || verification.status.is_terminal() {
            break verification;
        }

        let pb = spinner(&format!(
            "{} after {polls} poll(s), next check in {}s",
            verification.status.label(),
            interval.as_secs()
        ));
        std::thread::sleep(interval);
        pb.finish_and_clear();
    };

    println!("{} {}", style("Request").bold(), style(request_id).cyan());
    print_verification(&verification);
    Ok(())
}

/// File name for a downloaded package, refusing ids that could escape the
/// output directory.
fn package_file_name(package_id: &str) -> Result<String> {
    let id = package_id.trim();
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(DescargaError::Config(format!(
            "Invalid package id: '{package_id}'"
        )));
    }
    Ok(format!("{id}.zip"))
}

fn download_command(
    args: &CredentialArgs,
    package_id: &str,
    output: Option<&Path>,
) -> Result<()> {
    let file_name = package_file_name(package_id)?;
    let output_dir = output.unwrap_or_else(|| Path::new("."));
    if !output_dir.is_dir() {
        return Err(DescargaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Output directory does not exist: {}", output_dir.display()),
        )));
    }

    let client = open_client(args)?;
    let package = with_spinner("Downloading package...", || {
        client.download_package(package_id)
    })?;

    let path = output_dir.join(file_name);
    std::fs::write(&path, &package)?;

    println!(
        "{} {} ({} bytes)",
        style("Saved to:").green().bold(),
        path.display(),
        package.len()
    );
    Ok(())
}

fn parse_command(dir: &Path, rfc: &str, format: OutputFormat) -> Result<()> {
    let rfc = rfc.trim().to_uppercase();
    validate_rfc(&rfc)?;

    let extractor = DirectoryExtractor::new(dir);
    let report = process_package(&extractor, &[], &rfc)?;
    for warning in &report.warnings {
        eprintln!("{} {warning}", style("Skipped:").yellow());
    }

    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &report, format)
}

/// Write parsed records in the chosen format.
pub fn write_report(
    out: &mut impl Write,
    report: &PackageReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Yaml => {
            out.write_all(serde_yaml_ng::to_string(&report.records)?.as_bytes())?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report.records)?;
            writeln!(out)?;
        }
        OutputFormat::Flat => {
            for record in &report.records {
                serde_json::to_writer(&mut *out, &flatten(record))?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{process_entries, ArchiveEntry};

    const INCOME: &str = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0" Folio="77" Fecha="2024-01-15T10:00:00" SubTotal="100" Total="116" TipoDeComprobante="I">
        <cfdi:Emisor Rfc="GOGR810728TV5" Nombre="YO" RegimenFiscal="612"/>
        <cfdi:Receptor Rfc="XAXX010101000" Nombre="PUBLICO" RegimenFiscalReceptor="616" UsoCFDI="S01"/>
    </cfdi:Comprobante>"#;

    fn report() -> PackageReport {
        process_entries(&[ArchiveEntry::new("a.xml", INCOME)], "GOGR810728TV5")
    }

    #[test]
    fn test_cli_parse_request() {
        let cli = Cli::parse_from([
            "sat-descarga",
            "request",
            "--cert",
            "a.cer",
            "--key",
            "a.key",
            "--password",
            "secret",
            "--rfc",
            "GOGR810728TV5",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--kind",
            "metadata",
        ]);

        let Commands::Request {
            credential,
            kind,
            issuer,
            ..
        } = cli.command
        else {
            panic!("expected request command");
        };
        assert_eq!(credential.rfc, "GOGR810728TV5");
        assert_eq!(kind, DocumentKind::Metadata);
        assert!(issuer.is_none());
    }

    #[test]
    fn test_cli_parse_verify_wait() {
        let cli = Cli::parse_from([
            "sat-descarga",
            "verify",
            "--cert",
            "a.cer",
            "--key",
            "a.key",
            "--password",
            "secret",
            "--rfc",
            "GOGR810728TV5",
            "req-1",
            "--wait",
        ]);

        let Commands::Verify {
            request_id,
            wait,
            interval,
            ..
        } = cli.command
        else {
            panic!("expected verify command");
        };
        assert_eq!(request_id, "req-1");
        assert!(wait);
        assert_eq!(interval, 60);
    }

    #[test]
    fn test_cli_parse_defaults_to_yaml() {
        let cli = Cli::parse_from(["sat-descarga", "parse", "out/", "--rfc", "GOGR810728TV5"]);
        let Commands::Parse { format, .. } = cli.command else {
            panic!("expected parse command");
        };
        assert_eq!(format, OutputFormat::Yaml);
    }

    #[test]
    fn test_write_flat_report() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), OutputFormat::Flat).unwrap();
        let line = String::from_utf8(out).unwrap();

        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["TIPO_DOCUMENTO"], "Ingreso");
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_write_yaml_report() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), OutputFormat::Yaml).unwrap();
        let yaml = String::from_utf8(out).unwrap();
        assert!(yaml.contains("role: Ingreso"));
        assert!(yaml.starts_with("- version:"));
        assert!(yaml.contains("rfc: GOGR810728TV5"));
    }

    #[test]
    fn test_credential_args_debug_hides_password() {
        let cli = Cli::parse_from([
            "sat-descarga",
            "authenticate",
            "--cert",
            "a.cer",
            "--key",
            "a.key",
            "--password",
            "hunter2-secret",
            "--rfc",
            "GOGR810728TV5",
        ]);
        let Commands::Authenticate { credential } = cli.command else {
            panic!("expected authenticate command");
        };

        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2-secret"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("GOGR810728TV5"));
    }

    #[test]
    fn test_package_file_name() {
        assert_eq!(
            package_file_name("4E80345D-917F-40BB-A98F-4A73939343C5_01").unwrap(),
            "4E80345D-917F-40BB-A98F-4A73939343C5_01.zip"
        );
    }

    #[test]
    fn test_package_file_name_rejects_path_components() {
        for id in ["", "  ", "../etc/passwd", "a/b", "a\\b", "..", "x..y"] {
            assert!(
                matches!(package_file_name(id), Err(DescargaError::Config(_))),
                "accepted {id:?}"
            );
        }
    }
}

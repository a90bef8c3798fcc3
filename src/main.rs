use clap::{Parser, Subcommand};
use env_logger::Env;
use formsheet::downloader::{self, Download};
use formsheet::{
    ArtifactPayload, FormDefinition, JsonMetadataStore, MaterializerConfig, Owner,
    SheetMaterializer, SubmissionRecord,
};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Export form submissions as versioned spreadsheets
#[derive(Parser)]
#[command(name = "formsheet", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Materialize the next version from a request file
    Export {
        /// JSON file with `form`, `submissions` and `owner`
        #[arg(long)]
        request: PathBuf,
        /// Where to write the workbook in buffer mode
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List an owner's artifacts, newest first
    List {
        #[arg(long)]
        owner: u64,
    },
    /// Fetch an artifact; buffer-mode artifacts need the original request
    Download {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete an artifact and its file
    Delete {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        owner: u64,
    },
}

#[derive(Deserialize)]
struct ExportRequest {
    form: FormDefinition,
    submissions: Vec<SubmissionRecord>,
    owner: Owner,
}

fn read_request(path: &Path) -> Result<ExportRequest, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn export(
    materializer: &SheetMaterializer,
    request: &ExportRequest,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match materializer
        .materialize(&request.form, &request.submissions, &request.owner)
        .await
    {
        Ok(result) => result,
        Err(e) if e.is_no_data() => {
            println!("Nothing to export: no submissions were selected.");
            return Ok(());
        }
        Err(e) => return Err(format!("Export failed: {}", e).into()),
    };

    if let ArtifactPayload::Buffer(bytes) = &result.payload {
        let target = out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&result.metadata.file_name));
        fs::write(&target, bytes)?;
        info!("buffer written to {}", target.display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "artifact": result.metadata,
            "isNewVersion": result.is_new_version,
            "previousVersion": result.previous_version,
            "newEntriesCount": result.new_entries_count,
            "totalEntriesCount": result.total_entries_count,
        }))?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let config = MaterializerConfig::from_env()?;
    let store = Arc::new(JsonMetadataStore::open(&config.database_path)?);
    let materializer = SheetMaterializer::new(config, store.clone());

    match cli.command {
        Command::Export { request, out } => {
            let request = read_request(&request)?;
            export(&materializer, &request, out.as_deref()).await?;
        }
        Command::List { owner } => {
            let records = downloader::list_artifacts(&*store, owner)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Download {
            id,
            owner,
            request,
            out,
        } => match downloader::resolve_download(&*store, id, owner)? {
            Download::File { path, file_name } => {
                let target = out.unwrap_or_else(|| PathBuf::from(&file_name));
                fs::copy(&path, &target)?;
                println!("{}", target.display());
            }
            Download::Rerender { form_id, version } => {
                let Some(request) = request else {
                    return Err(format!(
                        "artifact {} (form {}, v{}) was kept in memory only; pass --request to export it again",
                        id, form_id, version
                    )
                    .into());
                };
                let request = read_request(&request)?;
                export(&materializer, &request, out.as_deref()).await?;
            }
        },
        Command::Delete { id, owner } => {
            let removed = downloader::delete_artifact(&*store, id, owner)?;
            println!("Deleted {} (v{})", removed.file_name, removed.version);
        }
    }

    Ok(())
}

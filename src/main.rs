use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rexec_lite::auth::AuthToken;
use rexec_lite::config::{ClientConfig, ServerConfig};
use rexec_lite::rpc::{JobResult, RpcClient, RpcServer};
use rexec_lite::scheduler::CommandResult;
use rexec_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "rexec-lite")]
#[command(version)]
#[command(about = "Remote command execution and file transfer over authenticated RPC")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start an RPC server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// File transfer commands
    File {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: FileCommands,
    },

    /// Check that the server is reachable and accepts the token
    Ping {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// YAML file with an `rpc_server` section; flags override it
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    address: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, env = "REXEC_PORT")]
    port: Option<u16>,

    /// Maximum number of commands executing at once
    #[arg(long, env = "REXEC_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Maximum file size in bytes for uploads and downloads
    #[arg(long, env = "REXEC_MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

    /// Directory used as the file-transfer sandbox
    #[arg(long, env = "REXEC_TRANSFER_DIR")]
    transfer_dir: Option<PathBuf>,

    /// Shared secret; a random one is generated when omitted
    #[arg(long, env = "REXEC_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

// =============================================================================
// Client Arguments (shared by job, file and ping commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server URL
    #[arg(
        long,
        short = 'a',
        env = "REXEC_SERVER_URL",
        default_value = "http://127.0.0.1:8000"
    )]
    addr: String,

    /// Shared secret printed by the server at startup
    #[arg(long, short = 't', env = "REXEC_TOKEN", hide_env_values = true)]
    token: String,

    /// Seconds to wait for a job before giving up
    #[arg(long, default_value = "30")]
    timeout: f64,

    /// Seconds between status polls
    #[arg(long, default_value = "0.5")]
    poll_interval: f64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a command and print its job ID
    Submit {
        /// The command to execute (e.g., "echo hello")
        command: String,
    },
    /// Fetch the result of a job (a finished result can be fetched once)
    Result {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Wait for a job to finish and print its result
    Wait {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Submit a command and wait for its result
    Run {
        /// The command to execute (e.g., "echo hello")
        command: String,
    },
    /// Check whether a job is still queued or running
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// List running and finished jobs
    List,
}

// =============================================================================
// File Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum FileCommands {
    /// Upload a local file
    Upload {
        /// Local file to send
        path: PathBuf,

        /// Name on the server (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,

        /// Fail instead of replacing an existing file
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Download a file from the server
    Download {
        /// Name on the server
        name: String,

        /// Local destination (defaults to the remote name)
        #[arg(long, short = 'd')]
        dest: Option<PathBuf>,
    },
    /// List files on the server
    List,
    /// Delete one file on the server
    Delete {
        name: String,
    },
    /// Delete every file on the server
    DeleteAll,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: String,
}

#[derive(Serialize)]
struct JobStatusOutput {
    job_id: String,
    running: bool,
}

#[derive(Serialize)]
struct PingOutput {
    server_url: String,
    reachable: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn seconds(value: f64, flag: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("invalid --{}: {}", flag, e).into())
}

fn create_client(args: &ClientArgs) -> Result<RpcClient, Box<dyn std::error::Error>> {
    let config = ClientConfig::new(args.addr.clone(), AuthToken::new(args.token.clone()))
        .with_timeout(seconds(args.timeout, "timeout")?)
        .with_poll_interval(seconds(args.poll_interval, "poll-interval")?);
    Ok(RpcClient::new(config)?)
}

fn parse_command(command: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    match shlex::split(command) {
        Some(args) if !args.is_empty() => Ok(args),
        _ => Err(format!("cannot parse command: {:?}", command).into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_indented(label: &str, text: Option<&str>) {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        println!("{}:", label);
        for line in text.lines() {
            println!("  {}", line);
        }
    }
}

fn print_command_result(result: &CommandResult) {
    match result.exit_code {
        Some(code) => println!("Exit Code: {}", code),
        None => println!("Exit Code: -"),
    }
    print_indented("Stdout", result.stdout.as_deref());
    print_indented("Stderr", result.stderr.as_deref());
    print_indented("Error", result.error.as_deref());
}

fn print_job_result(
    result: &JobResult,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output_format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Table => {
            println!("Job ID: {}", result.job_id());
            match result {
                JobResult::Running { .. } => println!("Status: RUNNING"),
                JobResult::Done { result, .. } => {
                    println!("Status: DONE");
                    print_command_result(result);
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Server Implementation
// =============================================================================

fn build_server_config(args: ServerArgs) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(address) = args.address {
        config.listen_addr.set_ip(address);
    }
    if let Some(port) = args.port {
        config.listen_addr.set_port(port);
    }
    if let Some(max_workers) = args.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(max_file_size) = args.max_file_size {
        config.max_file_size = max_file_size;
    }
    if let Some(dir) = args.transfer_dir {
        config.transfer_dir = dir;
    }
    if let Some(token) = args.token {
        config.token = AuthToken::new(token);
    }
    config.validate()?;
    Ok(config)
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_server_config(args)?;

    if config.token.is_generated() {
        // Callers need this value to authenticate.
        tracing::info!(token = config.token.expose(), "Authentication token");
    }

    let server = RpcServer::new(&config)?;
    let shutdown = install_shutdown_handler();
    server.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_command(
    client: &RpcClient,
    command: JobCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        JobCommands::Submit { command } => {
            let job_id = client.submit_command(&parse_command(&command)?).await?;
            match output_format {
                OutputFormat::Json => print_json(&JobSubmitOutput { job_id })?,
                OutputFormat::Table => {
                    println!("Job submitted successfully!");
                    println!("Job ID: {}", job_id);
                }
            }
        }
        JobCommands::Result { job_id } => {
            let result = client.get_result(&job_id).await?;
            print_job_result(&result, output_format)?;
        }
        JobCommands::Wait { job_id } => {
            let result = client.wait_for_result(&job_id, None).await?;
            print_job_result(&result, output_format)?;
        }
        JobCommands::Run { command } => {
            let result = client.run_command(&parse_command(&command)?, None).await?;
            print_job_result(&result, output_format)?;
        }
        JobCommands::Status { job_id } => {
            let running = client.is_running(&job_id).await?;
            match output_format {
                OutputFormat::Json => print_json(&JobStatusOutput { job_id, running })?,
                OutputFormat::Table => {
                    let status = if running { "RUNNING" } else { "NOT RUNNING" };
                    println!("Job ID: {}", job_id);
                    println!("Status: {}", status);
                }
            }
        }
        JobCommands::List => {
            let jobs = client.list_jobs().await?;
            match output_format {
                OutputFormat::Json => print_json(&jobs)?,
                OutputFormat::Table => {
                    if jobs.running.is_empty() && jobs.finished.is_empty() {
                        println!("No jobs found.");
                    } else {
                        println!("{:<38} STATUS", "JOB ID");
                        println!("{}", "-".repeat(50));
                        for job_id in &jobs.running {
                            println!("{:<38} RUNNING", job_id);
                        }
                        for job_id in &jobs.finished {
                            println!("{:<38} FINISHED", job_id);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_file_command(
    client: &RpcClient,
    command: FileCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        FileCommands::Upload {
            path,
            name,
            no_overwrite,
        } => {
            let receipt = client
                .upload_file(&path, name.as_deref(), !no_overwrite)
                .await?;
            match output_format {
                OutputFormat::Json => print_json(&receipt)?,
                OutputFormat::Table => {
                    let verb = if receipt.overwritten { "Replaced" } else { "Uploaded" };
                    println!("{} {} ({} bytes)", verb, receipt.filename, receipt.size);
                }
            }
        }
        FileCommands::Download { name, dest } => {
            let path = client.download_file(&name, dest.as_deref()).await?;
            match output_format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "filename": name,
                    "path": path,
                }))?,
                OutputFormat::Table => println!("Downloaded {} to {}", name, path.display()),
            }
        }
        FileCommands::List => {
            let files = client.list_files().await?;
            match output_format {
                OutputFormat::Json => print_json(&files)?,
                OutputFormat::Table => {
                    if files.is_empty() {
                        println!("No files found.");
                    } else {
                        println!("{:<40} {:>12} MODIFIED", "NAME", "SIZE");
                        println!("{}", "-".repeat(78));
                        for file in &files {
                            println!(
                                "{:<40} {:>12} {}",
                                file.name,
                                file.size,
                                file.modified.format("%Y-%m-%d %H:%M:%S")
                            );
                        }
                        println!();
                        println!("{} file(s)", files.len());
                    }
                }
            }
        }
        FileCommands::Delete { name } => {
            let receipt = client.delete_file(&name).await?;
            match output_format {
                OutputFormat::Json => print_json(&receipt)?,
                OutputFormat::Table => println!("Deleted {}", receipt.filename),
            }
        }
        FileCommands::DeleteAll => {
            let receipt = client.delete_all_files().await?;
            match output_format {
                OutputFormat::Json => print_json(&receipt)?,
                OutputFormat::Table => {
                    println!("Deleted {} file(s)", receipt.deleted_count);
                    for name in &receipt.deleted_files {
                        println!("  {}", name);
                    }
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let rpc_client = create_client(&client)?;
            handle_job_command(&rpc_client, command, &client.output).await?;
        }
        Commands::File { client, command } => {
            let rpc_client = create_client(&client)?;
            handle_file_command(&rpc_client, command, &client.output).await?;
        }
        Commands::Ping { client } => {
            let rpc_client = create_client(&client)?;
            let reachable = rpc_client.ping().await;
            match client.output {
                OutputFormat::Json => print_json(&PingOutput {
                    server_url: client.addr.clone(),
                    reachable,
                })?,
                OutputFormat::Table => {
                    if reachable {
                        println!("Server at {} is reachable", client.addr);
                    } else {
                        println!("Server at {} is NOT reachable", client.addr);
                    }
                }
            }
            if !reachable {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

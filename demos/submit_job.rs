use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rexec_lite::auth::AuthToken;
use rexec_lite::config::ClientConfig;
use rexec_lite::exec::{stdout_parser, Command, CommandLine, RemoteExecutor};
use rexec_lite::rpc::RpcClient;

#[derive(Parser, Debug)]
#[command(name = "submit-job")]
#[command(about = "Run a command on a rexec-lite server and print its stdout")]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    addr: String,

    /// Shared secret printed by the server at startup
    #[arg(long, env = "REXEC_TOKEN")]
    token: String,

    /// Seconds to wait before giving up
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Poll with the cheap status probe instead of fetching status each time
    #[arg(long)]
    quiet: bool,

    /// The command to execute
    #[arg(short, long)]
    cmd: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let client = RpcClient::new(ClientConfig::new(args.addr, AuthToken::new(args.token)))?;
    if !client.ping().await {
        return Err("server unreachable or token rejected".into());
    }

    let executor = RemoteExecutor::new(Arc::new(client))
        .with_timeout(Duration::from_secs(args.timeout))
        .with_monitor(!args.quiet);

    let cancel = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let line: CommandLine = args.cmd.parse()?;
    let mut command = Command::with_parser(line, stdout_parser);
    let stdout = command.execute_async(&executor).await?;
    println!("{}", stdout);

    Ok(())
}

//! Interactive quill client.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use quill::{Client, ClientConfig};

mod repl;

#[derive(Parser)]
#[command(version, about = "quill interactive client")]
struct Args {
    /// Coordinator address.
    coordinator_ip: IpAddr,
    coordinator_port: u16,

    /// Username to register as; prompted for when omitted.
    #[arg(short, long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let username = match args.username {
        Some(username) => username,
        None => match prompt_username() {
            Some(username) => username,
            None => {
                eprintln!("a username is required");
                return ExitCode::FAILURE;
            }
        },
    };

    if let Err(e) = ctrlc::set_handler(|| {
        println!();
        std::process::exit(0);
    }) {
        log::warn!("cannot install interrupt handler: {e}");
    }

    let coordinator = SocketAddr::new(args.coordinator_ip, args.coordinator_port);
    let client = match Client::connect(ClientConfig::new(coordinator, &username)).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("{}", client.welcome());

    match repl::run(client).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn prompt_username() -> Option<String> {
    print!("username: ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    let username = line.trim().to_string();
    if username.is_empty() { None } else { Some(username) }
}

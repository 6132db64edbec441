//! relay-ctl — command-line front end for the StreamChat relay.

use anyhow::{Context, Result};
use relay_core::config::RelayConfig;

mod cmd;

use cmd::chat::ChatInput;

fn print_usage() {
    println!("Usage: relay-ctl <command>");
    println!();
    println!("Commands:");
    println!("  checksum <token> [--at <rfc3339>]        Resolve the checksum for a token");
    println!("  client-key <token>                       Print the x-client-key for a token");
    println!("  frame <model> <text>                     Show the wire frame for one message");
    println!("  chat <token> <model> <text>              Send one user message");
    println!("  chat <token> --file <request.json>       Send a request read from JSON");
    println!();
    println!("Options:");
    println!("  --checksum <value>   Use this checksum instead of resolving one (chat)");
    println!();
    println!("Configuration is read from $RELAY_CONFIG or ~/.config/relay/config.toml.");
}

/// Pull `--name <value>` out of `args`.
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    match args.iter().position(|a| a == name) {
        Some(i) => {
            let value = args
                .get(i + 1)
                .cloned()
                .with_context(|| format!("{name} requires a value"))?;
            args.drain(i..=i + 1);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = RelayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RelayConfig::default()
    });

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let at = take_option(&mut args, "--at")?;
    let file = take_option(&mut args, "--file")?;
    let checksum = take_option(&mut args, "--checksum")?;
    let remaining: Vec<&str> = args.iter().map(String::as_str).collect();

    match (remaining.as_slice(), file.as_deref()) {
        (["checksum", token], _) => cmd::checksum::cmd_checksum(&config, token, at.as_deref()).await,
        (["client-key", token], _) => {
            cmd::checksum::cmd_client_key(token);
            Ok(())
        }
        (["frame", model, text], _) => cmd::frame::cmd_frame(model, text),
        (["chat", token], Some(path)) => {
            cmd::chat::cmd_chat(&config, token, ChatInput::File(path), checksum.as_deref()).await
        }
        (["chat", token, model, text], None) => {
            let input = ChatInput::Inline { model, text };
            cmd::chat::cmd_chat(&config, token, input, checksum.as_deref()).await
        }
        ([] | ["help"] | ["--help"] | ["-h"], _) => {
            print_usage();
            Ok(())
        }
        (other, _) => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

//! Send a chat request and stream the raw response to stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use relay_core::config::RelayConfig;
use relay_core::{ChatRequest, ChatTurn, SystemClock};
use relay_services::{CallContext, ChecksumCache, ChecksumResolver, RequestDispatcher, Unmetered};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Where the chat request comes from.
pub enum ChatInput<'a> {
    File(&'a str),
    Inline { model: &'a str, text: &'a str },
}

pub async fn cmd_chat(
    config: &RelayConfig,
    token: &str,
    input: ChatInput<'_>,
    checksum: Option<&str>,
) -> Result<()> {
    let request = match input {
        ChatInput::File(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str::<ChatRequest>(&text)
                .with_context(|| format!("failed to parse chat request in {path}"))?
        }
        ChatInput::Inline { model, text } => ChatRequest::new(model, vec![ChatTurn::user(text)]),
    };

    let clock = Arc::new(SystemClock);
    let cache = Arc::new(ChecksumCache::new(clock.clone()));
    let resolver = ChecksumResolver::from_config(config, cache, clock)
        .context("failed to build checksum resolver")?;
    let dispatcher = RequestDispatcher::new(config, resolver, Arc::new(Unmetered))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut ctx = CallContext::new(token).with_cancel(cancel.clone());
    if let Some(checksum) = checksum {
        ctx = ctx.with_checksum(checksum);
    }

    let response = dispatcher.dispatch(&request, &ctx).await?;
    tracing::info!(status = %response.status(), "streaming response");

    let mut body = response.bytes_stream();
    let mut stdout = tokio::io::stdout();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("interrupted"),
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(chunk) => stdout.write_all(&chunk.context("response stream failed")?).await?,
            None => break,
        }
    }
    stdout.flush().await?;
    Ok(())
}

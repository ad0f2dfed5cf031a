//! `wastewise ask`: one-shot turn.
//!
//! Boots the runtime in-process, sends a single message and prints the
//! reply.  Useful for scripting and for checking backend credentials.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use ww_domain::config::Config;

use crate::bootstrap;
use crate::runtime::AskRequest;

pub async fn ask(
    config: Arc<Config>,
    message: String,
    session: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    // Ctrl+C abandons the backend call instead of killing the process mid-write.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let reply = state
        .turns
        .handle(AskRequest::new(session, message), cancel)
        .await
        .context("ask failed")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.reply);
    }
    Ok(())
}

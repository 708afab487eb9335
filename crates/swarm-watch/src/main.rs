mod logging;
mod render;
mod settings;
mod submit;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use settings::ChannelFlags;
use std::future::Future;
use submit::{ContactInfo, SubmissionRequest};
use swarm_channel::{ChannelClient, ConnectionState, Transport};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "swarm-watch", about = "Follow live agent-swarm state for a project")]
struct Cli {
    #[arg(long, global = true, default_value = "")]
    log_dir: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a project and print every state change.
    Watch {
        project_id: String,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Submit a new project, then optionally watch it.
    Submit {
        #[arg(long)]
        description: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        zip_code: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long = "attachment")]
        attachments: Vec<String>,
        #[arg(long, default_value = "")]
        api_url: String,
        #[arg(long, default_value_t = false)]
        watch: bool,
        #[command(flatten)]
        channel: ChannelArgs,
    },
}

#[derive(Args, Debug)]
struct ChannelArgs {
    #[arg(long, default_value = "")]
    channel_url: String,
    #[arg(long)]
    max_frame_bytes: Option<usize>,
    #[arg(long, default_value_t = false)]
    reconnect: bool,
    #[arg(long, default_value_t = 0)]
    reconnect_max_secs: u64,
}

impl ChannelArgs {
    fn flags(&self) -> ChannelFlags {
        ChannelFlags {
            url: self.channel_url.clone(),
            max_frame_bytes: self.max_frame_bytes,
            reconnect: self.reconnect,
            reconnect_max_secs: self.reconnect_max_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_dir = settings::resolve_log_dir(&cli.log_dir);
    let log_guard = logging::init_logging(&log_dir, &settings::resolve_log_level());
    if let Some(path) = log_guard.as_ref().and_then(|guard| guard.path()) {
        info!(event = "log_file", path = %path.display());
    }

    match cli.command {
        Command::Watch {
            project_id,
            channel,
        } => watch_project(&project_id, &channel).await,
        Command::Submit {
            description,
            email,
            first_name,
            last_name,
            zip_code,
            city,
            state,
            phone,
            attachments,
            api_url,
            watch,
            channel,
        } => {
            let api_url = settings::resolve_api_url(&api_url)?;
            let contact = ContactInfo {
                email,
                first_name,
                last_name,
                zip_code,
                city,
                state,
                phone,
            };
            let request = SubmissionRequest::new(contact, &description, attachments)?;
            let (project_id, response) = submit::submit_project(&api_url, &request).await?;
            println!("{project_id}");
            if !response.message.is_empty() {
                eprintln!("{}", response.message);
            }
            if watch {
                watch_project(project_id.as_str(), &channel).await?;
            }
            Ok(())
        }
    }
}

async fn watch_project(project_id: &str, args: &ChannelArgs) -> Result<()> {
    let config = settings::channel_config(&args.flags())?;
    let mut client = ChannelClient::new(config);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    follow_project(&mut client, project_id, shutdown).await
}

/// Prints every state change until `shutdown` resolves or, without a
/// reconnect policy, the connection drops.
async fn follow_project<T: Transport>(
    client: &mut ChannelClient<T>,
    project_id: &str,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let reconnects = client.config().reconnect().is_some();
    let mut rx = client.watch();
    let Some(handle) = client.subscribe(project_id) else {
        bail!("project id must not be empty");
    };
    info!(event = "watch_start", project_id = %handle.project_id());

    tokio::pin!(shutdown);
    let outcome = loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = rx.borrow_and_update().clone();
                println!("{}", render::render_state(&state));
                if state.connection != ConnectionState::Disconnected || reconnects {
                    continue;
                }
                if state.connected_once {
                    break Ok(());
                }
                break Err(anyhow::anyhow!(
                    "could not connect to {}",
                    client.config().endpoint_for(handle.project_id())
                ));
            }
            _ = &mut shutdown => {
                warn!(event = "watch_interrupted", project_id = %handle.project_id());
                break Ok(());
            }
        }
    };
    client.unsubscribe(&handle);
    outcome
}

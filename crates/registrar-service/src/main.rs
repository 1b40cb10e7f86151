//! Main entry point for the registrar service.
//!
//! `serve` runs the registrar engine and its HTTP API. `submit` and `watch`
//! act as a requester: they submit a registration form, then follow the
//! latest order until an administrator decides it. With `--server` they go
//! through a running registrar's API; without it they work directly on the
//! configured stores.

use clap::{Parser, Subcommand};
use registrar_config::Config;
use registrar_core::handlers::{ArtifactFile, SubmissionForm};
use registrar_core::sync::{ApprovalSynchronizer, SyncOutcome};
use registrar_core::RequesterSession;
use registrar_types::{EntryRoute, SyncSignal, MSG_APPROVED};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod apis;
mod factory_registry;
mod gateway;
mod server;

use factory_registry::{build_identity_from_config, build_registrar_from_config};
use gateway::HttpGateway;

/// Command-line arguments for the registrar service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, global = true, default_value = "config/registrar.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, global = true, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the registrar engine and, if enabled, its HTTP API
	Serve,
	/// Submit a registration form to a running registrar
	Submit {
		/// Base URL of the registrar API; the configured stores are used
		/// directly if omitted
		#[arg(long)]
		server: Option<String>,
		#[arg(long)]
		university: u64,
		#[arg(long)]
		department: u64,
		/// Full name as it should appear on the registration
		#[arg(long)]
		name: String,
		/// Handle the order is filed under and remembered as
		#[arg(long)]
		handle: String,
		/// Payment screenshot
		#[arg(long)]
		artifact: Option<PathBuf>,
	},
	/// Follow the latest order until it is approved or rejected
	Watch {
		/// Base URL of the registrar API; the configured stores are used
		/// directly if omitted
		#[arg(long)]
		server: Option<String>,
		/// Handle to watch; defaults to the remembered one
		#[arg(long)]
		handle: Option<String>,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args.config.to_string_lossy().into_owned();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.registrar.id);

	match args.command {
		Command::Serve => serve(config).await,
		Command::Submit {
			server,
			university,
			department,
			name,
			handle,
			artifact,
		} => {
			let session = requester_session(&config, server.as_deref())?;
			let artifact = match artifact {
				Some(path) => Some(read_artifact(path).await?),
				None => None,
			};
			let form = SubmissionForm {
				university_id: Some(university),
				department_id: Some(department),
				full_name: name,
				requester_handle: handle,
				auth_identity: None,
				artifact,
			};

			match session.submit(form).await {
				Ok(receipt) => {
					println!("Submitted order {}", receipt.order_id);
					if let Some(url) = receipt.preview_url {
						println!("Preview: {}", url);
					}
					Ok(())
				},
				Err(e) => {
					println!("{}", e.user_message());
					Err(e.into())
				},
			}
		},
		Command::Watch { server, handle } => {
			let session = requester_session(&config, server.as_deref())?;
			if let Some(handle) = handle {
				session.resolver().remember(&handle).await?;
			}
			watch(session).await
		},
	}
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
	tracing::info!("Started registrar");

	let engine = Arc::new(build_registrar_from_config(config.clone())?);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = Arc::clone(&engine);

			tokio::select! {
				result = engine.run() => {
					tracing::info!("Registrar finished");
					result?;
				}
				result = server::start_server(api_config, api_engine) => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting registrar without API");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped registrar");
	Ok(())
}

/// A requester session against the server at `server`, or in-process over
/// the configured stores.
fn requester_session(
	config: &Config,
	server: Option<&str>,
) -> Result<RequesterSession, Box<dyn std::error::Error>> {
	match server {
		Some(server) => remote_session(config, server),
		None => {
			tracing::debug!("No server given, using the configured stores");
			Ok(build_registrar_from_config(config.clone())?.session())
		},
	}
}

/// A requester session whose orders live on the server at `server`.
fn remote_session(
	config: &Config,
	server: &str,
) -> Result<RequesterSession, Box<dyn std::error::Error>> {
	let identity = build_identity_from_config(config)?;
	let gateway = Arc::new(HttpGateway::new(
		server,
		Duration::from_secs(config.sync.request_timeout_seconds),
	)?);
	let synchronizer = Arc::new(ApprovalSynchronizer::from_config(
		gateway.clone(),
		&config.sync,
	));
	Ok(RequesterSession::new(identity.resolver, gateway, synchronizer))
}

async fn read_artifact(path: PathBuf) -> Result<ArtifactFile, Box<dyn std::error::Error>> {
	let bytes = tokio::fs::read(&path).await?;
	let file_name = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	Ok(ArtifactFile { file_name, bytes })
}

async fn watch(session: RequesterSession) -> Result<(), Box<dyn std::error::Error>> {
	if let EntryRoute::Resources { grant } = session.entry_route().await {
		println!("{}", MSG_APPROVED);
		println!("Resources: {}", grant.resource_path());
		return Ok(());
	}

	let cancel = CancellationToken::new();
	let Some((handle, mut signals)) = session.watch(cancel.clone()).await else {
		println!("No registration found. Submit one first.");
		return Ok(());
	};

	loop {
		tokio::select! {
			signal = signals.recv() => match signal {
				Some(signal) => print_signal(&signal),
				None => break,
			},
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Received shutdown signal");
				cancel.cancel();
			}
		}
	}

	match handle.join().await {
		SyncOutcome::Approved { grant, .. } => println!("Resources: {}", grant.resource_path()),
		SyncOutcome::Rejected { .. } | SyncOutcome::Cancelled | SyncOutcome::NoIdentity => {},
	}
	Ok(())
}

fn print_signal(signal: &SyncSignal) {
	match signal {
		SyncSignal::AwaitingReview {
			preview_url: Some(url),
			..
		} => println!("{} (evidence: {})", signal.message(), url),
		SyncSignal::Degraded { reason } => {
			tracing::warn!(reason = %reason, "Poll failed, retrying");
			println!("{}", signal.message());
		},
		_ => println!("{}", signal.message()),
	}
}

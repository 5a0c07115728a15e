// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use gitbridge_scm::{InstallationId, ProviderKind, ProviderRegistry, ScmClient, ScmConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Talk to GitHub, GitLab and Bitbucket installations through one interface.
#[derive(Parser, Debug)]
#[command(name = "gitbridge", about = "Source-control hosting bridge", version)]
struct Args {
	/// TOML configuration file. Falls back to GITBRIDGE_* environment variables.
	#[arg(long, short, env = "GITBRIDGE_CONFIG")]
	config: Option<PathBuf>,

	/// Installation to act for.
	#[arg(long, short, env = "GITBRIDGE_INSTALLATION")]
	installation: String,

	/// Backend to use. Defaults to the installation's configured provider.
	#[arg(long, short, env = "GITBRIDGE_PROVIDER")]
	provider: Option<ProviderKind>,

	#[arg(long, value_enum, default_value_t = LogFormat::Compact, env = "GITBRIDGE_LOG_FORMAT")]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show the account or organization behind the installation
	Org,
	/// List repositories visible to the installation
	Repos {
		#[arg(long, default_value_t = 1)]
		page: u32,
		#[arg(long, default_value_t = 30)]
		page_size: u32,
	},
	/// Show one repository
	Repo {
		/// Repository as owner/name
		full_name: String,
	},
	/// Fetch a file's decoded contents
	File {
		full_name: String,
		path: String,
		/// Branch, tag or commit. Defaults to the default branch.
		#[arg(long = "ref")]
		git_ref: Option<String>,
	},
	/// Open a pull (merge) request
	Pr {
		full_name: String,
		#[arg(long)]
		source: String,
		#[arg(long)]
		target: String,
		#[arg(long)]
		title: String,
		#[arg(long, default_value = "")]
		body: String,
	},
	/// Print the URL a user follows to install or authorize the app
	InstallUrl {
		#[arg(long, default_value = "")]
		state: String,
	},
	/// Disconnect the installation
	Disconnect,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
	Compact,
	Json,
}

fn init_tracing(format: LogFormat) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "gitbridge=info".into());
	let registry = tracing_subscriber::registry().with(filter);

	// Logs go to stderr so stdout stays parseable JSON.
	match format {
		LogFormat::Compact => registry
			.with(
				tracing_subscriber::fmt::layer()
					.compact()
					.with_writer(std::io::stderr),
			)
			.init(),
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init(),
	}
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ScmConfig> {
	match path {
		Some(path) => ScmConfig::from_toml_file(path)
			.with_context(|| format!("loading {}", path.display())),
		None => ScmConfig::from_env().context("loading configuration from environment"),
	}
}

fn resolve_client(args: &Args, config: &ScmConfig) -> anyhow::Result<ScmClient> {
	let installation = InstallationId::new(args.installation.trim());
	let provider = match args.provider {
		Some(kind) => kind,
		None => config
			.installation(&installation)
			.map(|i| i.provider)
			.ok_or_else(|| {
				anyhow!("installation {installation} is not configured; pass --provider")
			})?,
	};

	let registry = ProviderRegistry::from_config(config)?;
	Ok(registry.get_provider(provider, installation)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_tracing(args.log_format);

	let config = load_config(args.config.as_ref())?;
	let client = resolve_client(&args, &config)?;
	tracing::debug!(provider = %client.kind(), installation = %client.installation(), "client ready");

	match &args.command {
		Command::Org => print_json(&client.get_organization().await?)?,
		Command::Repos { page, page_size } => {
			print_json(&client.list_repositories(*page, *page_size).await?)?
		}
		Command::Repo { full_name } => print_json(&client.get_repository(full_name).await?)?,
		Command::File {
			full_name,
			path,
			git_ref,
		} => print_json(
			&client
				.get_file(full_name, path, git_ref.as_deref())
				.await?,
		)?,
		Command::Pr {
			full_name,
			source,
			target,
			title,
			body,
		} => print_json(
			&client
				.create_pull_request(full_name, source, target, title, body)
				.await?,
		)?,
		Command::InstallUrl { state } => println!("{}", client.installation_url(state)),
		Command::Disconnect => client.disconnect().await?,
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_consistent() {
		Args::command().debug_assert();
	}

	#[test]
	fn provider_flag_parses_case_insensitively() {
		let args = Args::try_parse_from([
			"gitbridge",
			"--installation",
			"42",
			"--provider",
			"GitLab",
			"repos",
			"--page-size",
			"50",
		])
		.unwrap();
		assert_eq!(args.provider, Some(ProviderKind::GitLab));
		assert!(matches!(
			args.command,
			Command::Repos {
				page: 1,
				page_size: 50
			}
		));
	}

	#[test]
	fn unknown_provider_flag_is_rejected() {
		assert!(Args::try_parse_from([
			"gitbridge",
			"--installation",
			"42",
			"--provider",
			"perforce",
			"org",
		])
		.is_err());
	}

	#[test]
	fn unconfigured_installation_needs_provider_flag() {
		let args = Args::try_parse_from(["gitbridge", "--installation", "42", "org"]).unwrap();
		let err = resolve_client(&args, &ScmConfig::default()).unwrap_err();
		assert!(err.to_string().contains("--provider"));
	}
}

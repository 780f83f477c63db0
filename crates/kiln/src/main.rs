//! kiln CLI - asset build, watch and live reload for static sites.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Asset build, watch and live reload for static sites")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to kiln.toml, relative to the project root
    #[arg(short, long, default_value = "kiln.toml", global = true)]
    config: PathBuf,

    /// Project root
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, prefix, purge and minify stylesheets
    Style,

    /// Check and minify scripts
    Script,

    /// Optimize images
    Image,

    /// Copy fonts
    Font,

    /// Copy HTML
    Markup,

    /// Remove the image output directory
    CleanImages,

    /// Build every asset class
    Build,

    /// Serve the build output and rebuild on change
    Watch {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Copy the build output to the publish directory
    Publish,

    /// Write a default kiln.toml and source layout
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

impl Commands {
    /// Task graph name of the command.
    fn task_name(&self) -> &'static str {
        match self {
            Self::Style => kiln_pipeline::STYLE,
            Self::Script => kiln_pipeline::SCRIPT,
            Self::Image => kiln_pipeline::IMAGE,
            Self::Font => kiln_pipeline::FONT,
            Self::Markup => kiln_pipeline::MARKUP,
            Self::CleanImages => "clean-images",
            Self::Build => "build",
            Self::Watch { .. } => "watch",
            Self::Publish => "publish",
            Self::Init { .. } => "init",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    if let Commands::Init { yes } = cli.command {
        return commands::init::run(&cli.root, yes);
    }

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Project root {} not found", cli.root.display()))?;
    let mut settings = config::load(&root, &root.join(&cli.config))?;

    if let Commands::Watch { port, no_open } = &cli.command {
        if let Some(port) = port {
            settings.server.port = *port;
        }
        if *no_open {
            settings.server.open = false;
        }
    }

    commands::run::run(settings, cli.command.task_name()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_task_command_resolves() {
        for name in kiln_server::TASK_NAMES {
            let cli = Cli::try_parse_from(["kiln", name]).unwrap();
            assert_eq!(cli.command.task_name(), *name);
        }
    }

    #[test]
    fn parses_watch_options() {
        let cli = Cli::try_parse_from(["kiln", "watch", "--port", "8080", "--no-open", "-v"])
            .unwrap();

        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Watch {
                port: Some(8080),
                no_open: true
            }
        ));
    }
}

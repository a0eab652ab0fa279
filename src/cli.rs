//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Kiln - incremental static-asset build pipeline
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit progress as NDJSON (for CI)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build all configured modules incrementally
    Build {
        /// Path to the build configuration file
        #[arg(short, long, default_value = "kiln.toml")]
        config: PathBuf,

        /// Produce release artifacts (minified, packed, compressed)
        #[arg(long)]
        release: bool,

        /// Build only the named modules (required modules are always built)
        #[arg(short, long, value_delimiter = ',')]
        modules: Option<Vec<String>>,

        /// Rebuild only the module owning this source file (on-change mode)
        #[arg(long, conflicts_with = "modules")]
        file: Option<PathBuf>,

        /// Hot-reload notification port; a successful build pings 127.0.0.1:<port>
        #[arg(long)]
        port: Option<u16>,
    },

    /// Watch for source changes and rebuild continuously
    Watch {
        /// Path to the build configuration file
        #[arg(short, long, default_value = "kiln.toml")]
        config: PathBuf,

        /// Debounce window in milliseconds
        #[arg(long, default_value_t = crate::watch::DEBOUNCE_MS)]
        debounce: u64,

        /// Hot-reload notification port; rebuilds ping 127.0.0.1:<port>
        #[arg(long)]
        port: Option<u16>,
    },

    /// Remove the output directory and the build cache
    Clean {
        /// Path to the build configuration file
        #[arg(short, long, default_value = "kiln.toml")]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_build_defaults() {
        let cli = Cli::try_parse_from(["kiln", "build"]).unwrap();
        assert!(!cli.json);
        if let Commands::Build {
            config,
            release,
            modules,
            file,
            port,
        } = cli.command
        {
            assert_eq!(config, PathBuf::from("kiln.toml"));
            assert!(!release);
            assert_eq!(modules, None);
            assert_eq!(file, None);
            assert_eq!(port, None);
        } else {
            panic!("Expected Build command");
        }
    }

    #[test]
    fn test_cli_parse_build_modules_list() {
        let cli = Cli::try_parse_from(["kiln", "build", "--modules", "Shell,Auth"]).unwrap();
        if let Commands::Build { modules, .. } = cli.command {
            assert_eq!(
                modules,
                Some(vec!["Shell".to_string(), "Auth".to_string()])
            );
        } else {
            panic!("Expected Build command");
        }
    }

    #[test]
    fn test_cli_parse_watch_debounce() {
        let cli = Cli::try_parse_from(["kiln", "watch", "--debounce", "500"]).unwrap();
        if let Commands::Watch { debounce, .. } = cli.command {
            assert_eq!(debounce, 500);
        } else {
            panic!("Expected Watch command");
        }
    }

    #[test]
    fn test_cli_parse_build_file_conflicts_with_modules() {
        let cli =
            Cli::try_parse_from(["kiln", "build", "--file", "client/Shell/a.js"]).unwrap();
        if let Commands::Build { file, .. } = cli.command {
            assert_eq!(file, Some(PathBuf::from("client/Shell/a.js")));
        } else {
            panic!("Expected Build command");
        }
        assert!(Cli::try_parse_from([
            "kiln", "build", "--file", "a.js", "--modules", "Shell"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_parse_watch_port() {
        let cli = Cli::try_parse_from(["kiln", "watch", "--port", "35729"]).unwrap();
        if let Commands::Watch { port, .. } = cli.command {
            assert_eq!(port, Some(35729));
        } else {
            panic!("Expected Watch command");
        }
    }

    #[test]
    fn test_cli_parse_global_json() {
        let cli = Cli::try_parse_from(["kiln", "build", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["kiln"]).is_err());
    }
}

//! The vellum-function-runner executable
//!
//! Runs a composition function once, the way a composition engine would, and
//! prints its response. Useful when developing a function.

use std::path::PathBuf;
use std::process::exit;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{
    filter::LevelFilter, fmt::Layer as FmtLayer, layer::SubscriberExt as _, Layer as _, Registry,
};
use vellum_function_runner::{load_desired, load_request, FunctionClient, FunctionConfig};

fn main() {
    let args = Args::parse();
    if let Err(e) = set_up_logging(args.verbose) {
        eprintln!("Error: {:?}", e);
        exit(1);
    }
    match run_args(args) {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            exit(1);
        }
    }
}

/// Log to stderr, so the response on stdout stays machine-readable.
fn set_up_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let fmt_layer = FmtLayer::new()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))
        .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))
}

/// Exit code when the function reported a fatal result.
const EXIT_FATAL: i32 = 2;

fn run_args(args: Args) -> Result<i32> {
    match &args.command {
        Commands::Run {
            function_exe,
            function_arg,
            request_json,
            desired_json,
            tag,
        } => {
            let request = match (request_json, desired_json) {
                (Some(path), _) => load_request(path)?,
                (None, Some(path)) => load_desired(path, tag.clone())?,
                // clap enforces one of the two
                (None, None) => anyhow::bail!("either --request-json or --desired-json is required"),
            };

            let client = FunctionClient::new(FunctionConfig {
                function_executable: function_exe.clone(),
                function_args: function_arg.clone(),
            });
            let response = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(client.run(&request))?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            if response.is_fatal() {
                Ok(EXIT_FATAL)
            } else {
                Ok(0)
            }
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(0)
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(0)
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "vellum-function-runner",
                &mut std::io::stdout(),
            );
            Ok(0)
        }
    }
}

/// Run a composition function once and print its response
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one request to a function and print the response
    ///
    /// Exits with status 2 when the response carries a fatal result.
    Run {
        /// The executable that implements the function
        #[arg(long)]
        function_exe: String,

        /// An argument to pass to the function executable
        #[arg(long)]
        function_arg: Vec<String>,

        /// A JSON file holding the whole request
        #[arg(long, required_unless_present = "desired_json", conflicts_with = "desired_json")]
        request_json: Option<PathBuf>,

        /// A JSON file holding an object of resource name to desired resource document
        #[arg(long)]
        desired_json: Option<PathBuf>,

        /// The request tag, when building the request from --desired-json
        #[arg(long, requires = "desired_json")]
        tag: Option<String>,
    },

    /// Generate markdown documentation for vellum-function-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for vellum-function-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for vellum-function-runner
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn verbose_is_global() {
        let args = Args::try_parse_from([
            "r",
            "run",
            "--function-exe",
            "f",
            "--desired-json",
            "b.json",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
    }

    #[test]
    fn needs_one_input() {
        assert!(Args::try_parse_from(["r", "run", "--function-exe", "f"]).is_err());
        assert!(Args::try_parse_from([
            "r",
            "run",
            "--function-exe",
            "f",
            "--request-json",
            "a.json",
            "--desired-json",
            "b.json"
        ])
        .is_err());
        assert!(Args::try_parse_from([
            "r",
            "run",
            "--function-exe",
            "f",
            "--desired-json",
            "b.json",
            "--tag",
            "t"
        ])
        .is_ok());
    }
}

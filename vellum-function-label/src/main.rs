use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use vellum_function::framework::run_main;

mod function;
mod logging;

use function::LabelFunction;

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        None | Some(Commands::Serve) => {
            logging::set_up(&logging::Options {
                verbose: args.options.verbose,
                color: args.options.color,
            })?;
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(run_main(LabelFunction::default()));
            Ok(())
        }
        Some(Commands::GenerateMan) => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Some(Commands::GenerateMarkdown) => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Some(Commands::GenerateCompletion { shell }) => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "vellum-function-label",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// Composition function that labels every desired composed resource
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    /// Log at trace level, including span enter and exit events
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Use ANSI colors in log output
    #[arg(long, global = true, default_value = "false")]
    color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve requests on stdin/stdout until stdin is closed (the default)
    Serve,

    /// Generate markdown documentation
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}

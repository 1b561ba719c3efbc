mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_COMPILE_ERROR, EXIT_FAILURE, EXIT_STACK_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cumulus",
    version,
    about = "Compile declarative application stacks into provisioning templates"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter Stackfile.toml into the current directory.
    New {
        /// Stack name.
        name: String,
        /// Built-in starter stack (minimal, web, logging).
        #[arg(long)]
        template: Option<String>,
        /// Overwrite an existing Stackfile.toml.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Parse and normalize a Stackfile without compiling it.
    Validate {
        /// Path to the Stackfile.
        #[arg(default_value = "Stackfile.toml")]
        stackfile: PathBuf,
    },
    /// Bake a machine image for every role and write the images lock.
    Bake {
        /// Path to the Stackfile.
        #[arg(default_value = "Stackfile.toml")]
        stackfile: PathBuf,
        /// Images lock to write (default: images.lock next to the Stackfile).
        #[arg(long)]
        images: Option<PathBuf>,
    },
    /// Compile a Stackfile into a provisioning template.
    Compile {
        /// Path to the Stackfile.
        #[arg(default_value = "Stackfile.toml")]
        stackfile: PathBuf,
        /// Images lock to apply (default: images.lock next to the Stackfile, if present).
        #[arg(long)]
        images: Option<PathBuf>,
        /// Inventory snapshot for external references (overrides config file).
        #[arg(long)]
        inventory: Option<PathBuf>,
        /// Write the template here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CUMULUS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::New {
            name,
            template,
            force,
        } => commands::new::run(&name, template.as_deref(), force, json_output),
        Commands::Validate { stackfile } => commands::validate::run(&stackfile, json_output),
        Commands::Bake { stackfile, images } => {
            commands::bake::run(&stackfile, images.as_deref(), json_output)
        }
        Commands::Compile {
            stackfile,
            images,
            inventory,
            out,
        } => commands::compile::run(
            &stackfile,
            images.as_deref(),
            inventory.as_deref(),
            out.as_deref(),
            json_output,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("stack error:") {
                EXIT_STACK_ERROR
            } else if msg.starts_with("compile error:") {
                EXIT_COMPILE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

//! pyrunner CLI - run and grade Python submissions

use clap::{Parser, Subcommand};
use pyrunner_checker::{loader, Verdict};
use pyrunner_core::{config::default_socket_path, Client, ExecutionResult, SandboxConfig, SandboxExecutor};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pyrunner")]
#[command(author, version, about = "Sandboxed execution and static grading of Python submissions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute Python code via the daemon
    Exec {
        /// Code to execute (or - for stdin)
        code: String,

        /// Socket path (defaults to PYRUNNER_SOCKET env var or /run/pyrunner/pyrunner.sock)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Get daemon status
    Status {
        /// Socket path (defaults to PYRUNNER_SOCKET env var or /run/pyrunner/pyrunner.sock)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Ping the daemon
    Ping {
        /// Socket path (defaults to PYRUNNER_SOCKET env var or /run/pyrunner/pyrunner.sock)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Run code directly (without daemon), configured from RUNNER__* variables
    Run {
        /// Code to execute (or - for stdin)
        code: String,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Memory limit in MB
        #[arg(short, long)]
        memory: Option<u64>,
    },

    /// Run a submission and grade it against a task's rules
    Check {
        /// Submission file (or - for stdin)
        file: String,

        /// Rule document (YAML or JSON)
        #[arg(long, conflicts_with_all = ["module", "task"], required_unless_present_all = ["module", "task"])]
        rules: Option<PathBuf>,

        /// Module number of the task
        #[arg(long, requires = "task")]
        module: Option<String>,

        /// Task number within the module
        #[arg(long, requires = "module")]
        task: Option<String>,

        /// Root of the exercises tree
        #[arg(long, default_value = "exercises")]
        exercises: PathBuf,

        /// Run without the daemon
        #[arg(long)]
        direct: bool,

        /// Socket path (defaults to PYRUNNER_SOCKET env var or /run/pyrunner/pyrunner.sock)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pyrunner=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Exec { code, socket } => {
            let code = read_source(&code, true)?;
            let socket = socket.unwrap_or_else(default_socket_path);
            let result = Client::connect(&socket).await?.execute(code).await?;
            print_result(&result)?;
            Ok(exit_code(&result))
        }

        Commands::Status { socket } => {
            let socket = socket.unwrap_or_else(default_socket_path);
            let status = Client::connect(&socket).await?.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Ping { socket } => {
            let socket = socket.unwrap_or_else(default_socket_path);
            Client::connect(&socket).await?.ping().await?;
            println!("pong");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run {
            code,
            timeout,
            memory,
        } => {
            let code = read_source(&code, true)?;
            let result = run_direct(&code, timeout, memory).await?;
            print_result(&result)?;
            Ok(exit_code(&result))
        }

        Commands::Check {
            file,
            rules,
            module,
            task,
            exercises,
            direct,
            socket,
        } => {
            let rules = match (rules, module, task) {
                (Some(path), _, _) => loader::load_file(&path)?,
                (None, Some(module), Some(task)) => loader::load_task(&exercises, &module, &task)?,
                _ => return Err("either --rules or --module and --task is required".into()),
            };
            let code = read_source(&file, false)?;

            let result = if direct {
                run_direct(&code, None, None).await?
            } else {
                let socket = socket.unwrap_or_else(default_socket_path);
                Client::connect(&socket).await?.execute(code.clone()).await?
            };

            // a crashing or timed out submission is reported, not graded
            if result.timed_out || result.has_stderr() {
                eprintln!("{}", result.stderr.trim_end());
                return Ok(ExitCode::FAILURE);
            }

            let verdict = pyrunner_checker::evaluate(&code, &result.stdout, &rules);
            match &verdict {
                Verdict::Pass => println!("pass"),
                Verdict::Failure(message) => println!("fail: {message}"),
                Verdict::ParseError(err) => println!("{err}"),
            }
            Ok(if verdict.is_pass() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// `-` reads stdin. Otherwise `arg` is the code itself when `inline`, or a
/// file to read.
fn read_source(arg: &str, inline: bool) -> std::io::Result<String> {
    if arg == "-" {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        Ok(code)
    } else if inline {
        Ok(arg.to_owned())
    } else {
        std::fs::read_to_string(Path::new(arg))
    }
}

async fn run_direct(
    code: &str,
    timeout: Option<u64>,
    memory: Option<u64>,
) -> Result<ExecutionResult, Box<dyn std::error::Error>> {
    let mut config = SandboxConfig::from_env()?;
    if let Some(secs) = timeout {
        config.timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(mb) = memory {
        config.memory_limit = mb * 1024 * 1024;
    }

    let executor = SandboxExecutor::new(config)?;
    Ok(executor.execute(code).await?)
}

fn print_result(result: &ExecutionResult) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn exit_code(result: &ExecutionResult) -> ExitCode {
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parses(args: &[&str]) -> bool {
        Cli::try_parse_from(std::iter::once("pyrunner").chain(args.iter().copied())).is_ok()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn check_needs_rules_or_a_task() {
        assert!(!parses(&["check", "main.py"]));
        assert!(!parses(&["check", "main.py", "--module", "1"]));
        assert!(!parses(&["check", "main.py", "--rules", "r.yaml", "--module", "1", "--task", "2"]));
        assert!(parses(&["check", "main.py", "--module", "1", "--task", "2", "--direct"]));
        assert!(parses(&["check", "-", "--rules", "r.yaml"]));
    }

    #[test]
    fn inline_code_is_taken_verbatim() {
        assert_eq!(read_source("print(1)", true).unwrap(), "print(1)");
    }

    #[test]
    fn submission_file_is_read() {
        let file = scratch_file("x = 1\n");
        assert_eq!(read_source(file.to_str().unwrap(), false).unwrap(), "x = 1\n");
        std::fs::remove_file(file).unwrap();
    }

    fn scratch_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pyrunner-cli-{}.py", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }
}

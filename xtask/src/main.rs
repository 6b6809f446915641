use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for hoard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc, smoke
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Boot the CLI twice against a scratch store
    Smoke,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_doc()?;
            run_smoke()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Doc => run_doc()?,
        Commands::Build => run_build()?,
        Commands::Smoke => run_smoke()?,
    }

    Ok(())
}

fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {label}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {label} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("fmt --check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "clippy",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )
}

fn run_tests() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn run_doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn run_build() -> Result<()> {
    cargo("build", &["build", "--workspace"])
}

/// First boot must create the store; the second must load it back unchanged.
fn run_smoke() -> Result<()> {
    let dir = tempfile::tempdir()?;
    boot_cli(dir.path())?;
    boot_cli(dir.path())?;
    if !dir.path().join("identity.json").exists() {
        anyhow::bail!("smoke: identity was not persisted");
    }
    println!("==> Smoke OK");
    Ok(())
}

fn boot_cli(data_dir: &Path) -> Result<()> {
    let data_dir = data_dir.to_string_lossy();
    cargo(
        "run hoard boot",
        &[
            "run",
            "-q",
            "-p",
            "hoard-cli",
            "--",
            "--data-dir",
            &data_dir,
            "boot",
        ],
    )
}

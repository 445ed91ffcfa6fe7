//! Build automation tasks for the dbc workspace.
//!
//! Run with `cargo xtask <command>`.
//!
//! ## Available Commands
//!
//! - `ci`: Run all CI checks (format, lint, test, doc)
//! - `fmt`: Check/apply code formatting
//! - `clippy`: Run clippy lints
//! - `test`: Run all tests
//! - `doc`: Generate documentation
//! - `clean`: Clean build artifacts
//! - `postgres`: Start a local PostgreSQL container for integration tests
//! - `dist`: Package publishable crates

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Crates published to crates.io, in dependency order.
const PUBLISHED_CRATES: [&str; 2] = ["dbc-pool", "dbc"];

/// Connection string matching the container started by `cargo xtask postgres`.
const LOCAL_CONNECTION_STRING: &str =
    "host=127.0.0.1 port=5432 user=postgres password=postgres dbname=postgres";

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for dbc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test, doc)
    Ci,
    /// Run cargo fmt (--check by default, --fix to apply)
    Fmt {
        /// Apply formatting fixes
        #[arg(long)]
        fix: bool,
    },
    /// Run clippy with all features
    Clippy {
        /// Apply clippy suggestions
        #[arg(long)]
        fix: bool,
    },
    /// Run all tests
    Test {
        /// Test a specific package
        #[arg(short, long)]
        package: Option<String>,
        /// Also run tests that need PostgreSQL or Docker
        #[arg(long)]
        integration: bool,
    },
    /// Generate documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Clean build artifacts
    Clean,
    /// Start a local PostgreSQL container (requires Docker)
    Postgres {
        /// Image tag
        #[arg(long, default_value = "16-alpine")]
        tag: String,
        /// Stop and remove the container instead
        #[arg(long)]
        stop: bool,
    },
    /// Package publishable crates
    Dist {
        /// Skip running tests before packaging
        #[arg(long)]
        no_test: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to workspace root
    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh, false)?;
            clippy(&sh, false)?;
            test(&sh, None, false)?;
            doc(&sh, false)?;
            println!("\n✅ All CI checks passed!");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy { fix } => clippy(&sh, fix)?,
        Command::Test {
            package,
            integration,
        } => test(&sh, package.as_deref(), integration)?,
        Command::Doc { open } => doc(&sh, open)?,
        Command::Clean => clean(&sh)?,
        Command::Postgres { tag, stop } => postgres(&sh, &tag, stop)?,
        Command::Dist { no_test } => dist(&sh, no_test)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying formatting...");
        cmd!(sh, "cargo fmt --all").run()?;
        println!("✅ Formatting applied.");
    } else {
        println!("Checking formatting...");
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("✅ Formatting check passed.");
    }
    Ok(())
}

fn clippy(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying clippy suggestions...");
        cmd!(
            sh,
            "cargo clippy --all-features --all-targets --fix --allow-dirty"
        )
        .run()?;
        println!("✅ Clippy suggestions applied.");
    } else {
        println!("Running clippy...");
        cmd!(
            sh,
            "cargo clippy --all-features --all-targets -- -D warnings"
        )
        .run()?;
        println!("✅ Clippy check passed.");
    }
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>, integration: bool) -> Result<()> {
    println!("Running tests...");

    let mut args = vec!["test"];

    if let Some(pkg) = package {
        args.push("-p");
        args.push(pkg);
    } else {
        args.push("--workspace");
    }

    args.push("--all-features");

    if integration {
        if std::env::var_os("dbc_string").is_none() {
            println!("dbc_string is not set; using {LOCAL_CONNECTION_STRING}");
            sh.set_var("dbc_string", LOCAL_CONNECTION_STRING);
        }
        args.extend(["--", "--include-ignored"]);
    }

    cmd!(sh, "cargo {args...}").run()?;
    println!("✅ All tests passed.");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("Generating documentation...");
    // Broken intra-doc links fail the build, as missing docs do under clippy.
    let _flags = sh.push_env("RUSTDOCFLAGS", "-D warnings");
    let open = open.then_some("--open");
    cmd!(sh, "cargo doc --workspace --exclude xtask --all-features --no-deps {open...}").run()?;
    println!("✅ Documentation generated.");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ Clean complete.");
    Ok(())
}

fn postgres(sh: &Shell, tag: &str, stop: bool) -> Result<()> {
    let name = "dbc-postgres";

    if stop {
        println!("Stopping PostgreSQL container...");
        cmd!(sh, "docker rm -f {name}").run()?;
        println!("✅ Container removed.");
        return Ok(());
    }

    println!("Starting PostgreSQL {tag}...");
    let image = format!("postgres:{tag}");
    cmd!(
        sh,
        "docker run -d --name {name} -p 5432:5432 -e POSTGRES_PASSWORD=postgres {image}"
    )
    .run()?;
    println!("✅ PostgreSQL is starting.");
    println!("\nRun the integration tests with:");
    println!("  dbc_string='{LOCAL_CONNECTION_STRING}' cargo xtask test --integration");
    Ok(())
}

fn dist(sh: &Shell, no_test: bool) -> Result<()> {
    println!("Packaging crates...");

    if !no_test {
        println!("Running tests before packaging...");
        test(sh, None, false)?;
    }

    for crate_name in PUBLISHED_CRATES {
        cmd!(sh, "cargo package -p {crate_name} --allow-dirty").run()?;
    }

    println!("✅ Distribution artifacts built.");
    println!("   Packages: target/package/");

    Ok(())
}

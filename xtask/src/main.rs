use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_PACKAGE: &str = "cfn_resource_lambda";
const WORKSPACE_CRATES: [&str; 2] = ["cfn_resource_core", LAMBDA_PACKAGE];

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the CloudFormation custom resource workspace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a custom resource binary and zip it as a `provided` runtime artifact
    Package {
        /// Binary target of the lambda crate to package
        #[arg(long, default_value = "sum_resource")]
        bin: String,
        /// Compilation target triple
        #[arg(long, env = "CFN_LAMBDA_TARGET", default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory that receives `<bin>.zip`
        #[arg(long, default_value = "dist")]
        out_dir: PathBuf,
    },
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::All)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// rustfmt and clippy
    Lint,
    /// Unit and integration tests
    Test,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) -> Result<(), String> {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| format!("failed to execute cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!(
            "cargo {} exited with {}",
            args.first().copied().unwrap_or_default(),
            status.code().map_or("a signal".to_string(), |code| code.to_string())
        ))
    }
}

fn package(bin: &str, target: &str, profile: BuildProfile, out_dir: &Path) -> Result<(), String> {
    ensure_target_installed(target)?;

    step(&format!("Build {bin} for {target}"));
    let mut args = vec!["build", "-p", LAMBDA_PACKAGE, "--bin", bin, "--target", target];
    if let BuildProfile::Release = profile {
        args.push("--release");
    }
    run_cargo(&args)?;

    step("Zip bootstrap artifact");
    let binary_path = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(bin);
    fs::create_dir_all(out_dir)
        .map_err(|error| format!("failed to create {}: {error}", out_dir.display()))?;
    let zip_path = out_dir.join(format!("{bin}.zip"));
    write_bootstrap_zip(&binary_path, &zip_path)?;

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
    Ok(())
}

fn ensure_target_installed(target: &str) -> Result<(), String> {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(_) | Err(_) => {
            eprintln!("warning: could not list installed rust targets; skipping preflight");
            return Ok(());
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if installed.lines().any(|line| line.trim() == target) {
        Ok(())
    } else {
        Err(format!(
            "rust target `{target}` is not installed; run `rustup target add {target}`"
        ))
    }
}

/// The `provided.al2023` runtime executes a file named `bootstrap` at the
/// root of the archive.
fn write_bootstrap_zip(binary_path: &Path, zip_path: &Path) -> Result<(), String> {
    let binary = fs::read(binary_path)
        .map_err(|error| format!("failed to read {}: {error}", binary_path.display()))?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("failed to create {}: {error}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .map_err(|error| format!("failed to start bootstrap entry: {error}"))?;
    zip.write_all(&binary)
        .map_err(|error| format!("failed to write bootstrap entry: {error}"))?;
    zip.finish()
        .map_err(|error| format!("failed to finish {}: {error}", zip_path.display()))?;
    Ok(())
}

fn ci_lint() -> Result<(), String> {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"])?;

    step("Clippy");
    run_cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn ci_test() -> Result<(), String> {
    for package in WORKSPACE_CRATES {
        step(&format!("Test {package}"));
        run_cargo(&["test", "-p", package])?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Package {
            bin,
            target,
            profile,
            out_dir,
        } => package(&bin, &target, profile, &out_dir),
        Commands::Ci { job } => match job {
            CiJob::Lint => ci_lint(),
            CiJob::Test => ci_test(),
            CiJob::All => ci_lint().and_then(|()| ci_test()),
        },
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        exit(1);
    }
}

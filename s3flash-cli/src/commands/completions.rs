//! Shell completion generation and installation.

use {
    crate::{Cli, CliError},
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    directories::BaseDirs,
    std::{
        env, fs, io,
        path::{Path, PathBuf},
    },
};

const BIN: &str = "s3flash";

fn render(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let shell = shell.or_else(detect_shell_type).ok_or_else(|| {
        CliError::Usage(format!(
            "Specify a shell type, e.g.: {BIN} completions bash (or use --install)"
        ))
    })?;
    render(shell, &mut io::stdout());
    Ok(())
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var_os("PSModulePath").is_some() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Map a shell binary path to its `Shell`.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where each shell picks up per-user completion scripts.
fn completion_install_path(dirs: &BaseDirs, shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs
            .data_local_dir()
            .join("bash-completion")
            .join("completions")
            .join(BIN),
        Shell::Zsh => dirs.home_dir().join(".zfunc").join(format!("_{BIN}")),
        Shell::Fish => dirs
            .config_dir()
            .join("fish")
            .join("completions")
            .join(format!("{BIN}.fish")),
        Shell::PowerShell => dirs
            .config_dir()
            .join("powershell")
            .join("completions")
            .join(format!("{BIN}.ps1")),
        Shell::Elvish => dirs
            .config_dir()
            .join("elvish")
            .join("lib")
            .join(format!("{BIN}.elv")),
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

fn activation_hint(shell: Shell, path: &Path) -> Option<String> {
    match shell {
        Shell::Bash => Some(format!("source {}", path.display())),
        Shell::Zsh => Some("fpath=(~/.zfunc $fpath); autoload -Uz compinit && compinit".into()),
        Shell::PowerShell => Some(format!("Import-Module {}", path.display())),
        _ => None,
    }
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = shell_arg.or_else(detect_shell_type).ok_or_else(|| {
        CliError::Usage(format!(
            "Could not detect your shell. Please specify it explicitly: {BIN} completions --install bash"
        ))
    })?;

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = completion_install_path(&dirs, shell)?;

    let mut buf = Vec::new();
    render(shell, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(shell).cyan(),
        style(path.display()).yellow()
    );
    match activation_hint(shell, &path) {
        Some(hint) => eprintln!("To activate now: {}", style(hint).cyan()),
        None => eprintln!("Completions load automatically in new sessions."),
    }

    Ok(())
}

//! How the MCP server runtime is launched: program, arguments, environment and
//! log file.

use crate::Result;
use crate::error::StartError;
use crate::settings::Settings;
use crate::supervisor::StartOptions;
use chrono::{Local, NaiveDate};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const LOG_DIR: &str = "logs";
pub const SRC_DIR: &str = "src";

/// Overrides for the QueryGrid Manager connection, passed to the server through its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryGridOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_ssl: Option<bool>,
}

impl QueryGridOverrides {
    fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![];
        if let Some(host) = &self.host {
            env.push(("QG_MANAGER_HOST".to_string(), host.clone()));
        }
        if let Some(port) = self.port {
            env.push(("QG_MANAGER_PORT".to_string(), port.to_string()));
        }
        if let Some(username) = &self.username {
            env.push(("QG_MANAGER_USERNAME".to_string(), username.clone()));
        }
        if let Some(password) = &self.password {
            env.push(("QG_MANAGER_PASSWORD".to_string(), password.clone()));
        }
        if let Some(verify) = self.verify_ssl {
            env.push(("QG_MANAGER_VERIFY_SSL".to_string(), verify.to_string()));
        }
        env
    }
}

/// Fully resolved invocation of the server runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: PathBuf,
}

impl RuntimeCommand {
    pub fn build(
        settings: &Settings,
        project_dir: &Path,
        opts: &StartOptions,
        log_file: &Path,
    ) -> Result<Self> {
        let mut words = if settings.supervisor.runtime_command.is_empty() {
            default_runtime_command(project_dir)
        } else {
            settings.supervisor.runtime_command.clone()
        };
        if words.is_empty() || words[0].trim().is_empty() {
            return Err(StartError::EmptyRuntimeCommand.into());
        }
        let program = words.remove(0);
        let src_dir = project_dir.join(SRC_DIR);

        let mut args = words;
        args.push(settings.supervisor.app_signature.clone());
        args.extend([
            "--host".to_string(),
            opts.host.clone(),
            "--port".to_string(),
            opts.port.to_string(),
            "--log-level".to_string(),
            opts.log_level.runtime_arg(),
        ]);
        if opts.reload {
            args.extend([
                "--reload".to_string(),
                "--reload-dir".to_string(),
                src_dir.to_string_lossy().to_string(),
            ]);
        }

        let mut env = vec![
            (
                "QG_MCP_SERVER_LOG_FILE".to_string(),
                log_file.to_string_lossy().to_string(),
            ),
            ("QG_MCP_SERVER_LOG_LEVEL".to_string(), opts.log_level.to_string()),
            ("PYTHONPATH".to_string(), python_path(project_dir, &src_dir)),
        ];
        env.extend(opts.querygrid.env());

        Ok(Self {
            program,
            args,
            env,
            dir: project_dir.to_path_buf(),
        })
    }

    pub fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.dir);
        cmd
    }

    pub fn tokio_command(&self) -> tokio::process::Command {
        tokio::process::Command::from(self.std_command())
    }

    pub fn display(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(self.args.iter()))
    }
}

/// The project's virtualenv interpreter if there is one, otherwise whatever python is on PATH.
fn default_runtime_command(project_dir: &Path) -> Vec<String> {
    let venv = if cfg!(windows) {
        project_dir.join(".venv").join("Scripts").join("python.exe")
    } else {
        project_dir.join(".venv").join("bin").join("python")
    };
    let python = if venv.exists() {
        venv.to_string_lossy().to_string()
    } else if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    };
    vec![python, "-m".to_string(), "uvicorn".to_string()]
}

fn python_path(project_dir: &Path, src_dir: &Path) -> String {
    std::env::join_paths([project_dir.as_os_str(), src_dir.as_os_str()])
        .unwrap_or_else(|_| OsString::from(project_dir.as_os_str()))
        .to_string_lossy()
        .to_string()
}

/// `<log_dir>/qg_server_YYYYMMDD.log`, one file per day.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("qg_server_{}.log", date.format("%Y%m%d"))
}

/// Resolves today's log file, creating the log directory.
pub fn prepare_log_file(project_dir: &Path, log_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match log_dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => crate::env::CWD.join(dir),
        None => project_dir.join(LOG_DIR),
    };
    xx::file::mkdirp(&log_dir)?;
    Ok(log_dir.join(log_file_name(Local::now().date_naive())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;
    use tempfile::TempDir;

    fn opts() -> StartOptions {
        StartOptions {
            host: "0.0.0.0".to_string(),
            port: 8003,
            log_level: LogLevel::Debug,
            ..Default::default()
        }
    }

    #[test]
    fn test_log_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(log_file_name(date), "qg_server_20260309.log");
    }

    #[test]
    fn test_prepare_log_file_creates_dir() {
        let dir = TempDir::new().unwrap();
        let log_file = prepare_log_file(dir.path(), None).unwrap();

        assert_eq!(log_file.parent().unwrap(), dir.path().join("logs"));
        assert!(dir.path().join("logs").is_dir());
        let name = log_file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("qg_server_") && name.ends_with(".log"));

        let custom = dir.path().join("var").join("log");
        let log_file = prepare_log_file(dir.path(), Some(&custom)).unwrap();
        assert_eq!(log_file.parent().unwrap(), custom);
        assert!(custom.is_dir());
    }

    #[test]
    fn test_build_background_command() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.supervisor.runtime_command = vec!["python3".into(), "-m".into(), "uvicorn".into()];
        let log_file = dir.path().join("logs").join("qg_server_20260101.log");

        let cmd = RuntimeCommand::build(&settings, dir.path(), &opts(), &log_file).unwrap();

        assert_eq!(cmd.program, "python3");
        assert_eq!(
            cmd.args,
            vec![
                "-m",
                "uvicorn",
                "src.server:app",
                "--host",
                "0.0.0.0",
                "--port",
                "8003",
                "--log-level",
                "debug"
            ]
        );
        assert_eq!(cmd.dir, dir.path());
        let env: std::collections::HashMap<_, _> = cmd.env.iter().cloned().collect();
        assert_eq!(
            env.get("QG_MCP_SERVER_LOG_FILE").map(String::as_str),
            Some(log_file.to_string_lossy().as_ref())
        );
        assert_eq!(env.get("QG_MCP_SERVER_LOG_LEVEL").map(String::as_str), Some("DEBUG"));
        assert!(env["PYTHONPATH"].contains(&dir.path().join("src").to_string_lossy().to_string()));
        assert!(!env.contains_key("QG_MANAGER_HOST"));
    }

    #[test]
    fn test_reload_adds_watch_dir() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default();
        let opts = StartOptions {
            foreground: true,
            reload: true,
            ..opts()
        };

        let cmd = RuntimeCommand::build(&settings, dir.path(), &opts, Path::new("x.log")).unwrap();

        let tail: Vec<&str> = cmd.args.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail[0], "--reload");
        assert_eq!(tail[1], "--reload-dir");
        assert_eq!(PathBuf::from(tail[2]), dir.path().join("src"));
    }

    #[test]
    fn test_querygrid_overrides_env() {
        let dir = TempDir::new().unwrap();
        let opts = StartOptions {
            querygrid: QueryGridOverrides {
                host: Some("qgm.example.com".to_string()),
                port: Some(9443),
                username: Some("admin".to_string()),
                password: None,
                verify_ssl: Some(false),
            },
            ..opts()
        };

        let cmd =
            RuntimeCommand::build(&Settings::default(), dir.path(), &opts, Path::new("x.log")).unwrap();

        let env: std::collections::HashMap<_, _> = cmd.env.iter().cloned().collect();
        assert_eq!(env["QG_MANAGER_HOST"], "qgm.example.com");
        assert_eq!(env["QG_MANAGER_PORT"], "9443");
        assert_eq!(env["QG_MANAGER_USERNAME"], "admin");
        assert_eq!(env["QG_MANAGER_VERIFY_SSL"], "false");
        assert!(!env.contains_key("QG_MANAGER_PASSWORD"));
    }

    #[test]
    fn test_default_runtime_prefers_venv() {
        let dir = TempDir::new().unwrap();
        let cmd = default_runtime_command(dir.path());
        assert_eq!(&cmd[1..], ["-m", "uvicorn"]);

        let venv_python = if cfg!(windows) {
            dir.path().join(".venv").join("Scripts").join("python.exe")
        } else {
            dir.path().join(".venv").join("bin").join("python")
        };
        std::fs::create_dir_all(venv_python.parent().unwrap()).unwrap();
        std::fs::write(&venv_python, "").unwrap();
        assert_eq!(default_runtime_command(dir.path())[0], venv_python.to_string_lossy());
    }

    #[test]
    fn test_empty_runtime_command_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.supervisor.runtime_command = vec!["".to_string()];

        let err = RuntimeCommand::build(&settings, dir.path(), &opts(), Path::new("x.log")).unwrap_err();
        assert!(err.to_string().contains("runtime command is empty"));
    }
}

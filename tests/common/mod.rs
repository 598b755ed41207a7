#![allow(dead_code)]

use qgmcp_cli::procs::{self, ProcessBackend};
use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Stands in for the Python runtime: a shell that keeps one child alive and
/// carries the app signature and listener flags in its command line.
pub const FAKE_RUNTIME: &str = "sh -c 'sleep 60 & wait' sh";

/// Helper struct for E2E test environment
pub struct TestEnv {
    temp_dir: TempDir,
    qgmcp_bin: PathBuf,
    signature: String,
}

impl TestEnv {
    /// Create a new test environment with an isolated project directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("project").join("src")).unwrap();

        // tests run in parallel; a signature per env keeps the pattern search
        // fallback from finding another test's server
        let suffix = temp_dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .trim_start_matches('.')
            .to_string();
        let signature = format!("qgmcp_e2e_{suffix}:app");

        Self {
            temp_dir,
            qgmcp_bin: PathBuf::from(env!("CARGO_BIN_EXE_qgmcp")),
            signature,
        }
    }

    /// Get the project directory path
    pub fn project_dir(&self) -> PathBuf {
        self.temp_dir.path().join("project")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.project_dir().join("run").join("server.pid")
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// PID recorded in run/server.pid
    pub fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn write_pid(&self, pid: u32) {
        fs::create_dir_all(self.pid_file().parent().unwrap()).unwrap();
        fs::write(self.pid_file(), pid.to_string()).unwrap();
    }

    /// Create config.yaml in the project directory
    pub fn create_config(&self, content: &str) -> PathBuf {
        let path = self.project_dir().join("config.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    /// Run a qgmcp command and return the output
    pub fn run_command(&self, args: &[&str]) -> Output {
        self.run_command_with_env(args, &[])
    }

    /// Run a qgmcp command with additional environment variables
    pub fn run_command_with_env(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
        let mut cmd = self.command(args);
        for (key, val) in extra_env {
            cmd.env(key, val);
        }

        let output = cmd.output().expect("Failed to execute qgmcp command");
        println!("$ qgmcp {}", args.join(" "));
        println!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        println!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        output
    }

    /// Run a qgmcp command in the background, for commands that stay attached
    pub fn run_background(&self, args: &[&str]) -> Child {
        println!("$ qgmcp {} &", args.join(" "));
        self.command(args)
            .spawn()
            .expect("Failed to spawn qgmcp command")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.qgmcp_bin);
        cmd.args(args)
            .current_dir(self.project_dir())
            .env("QGMCP_PROJECT_DIR", self.project_dir())
            .env("QGMCP_LOG", "debug")
            .env("QGMCP_RUNTIME_COMMAND", FAKE_RUNTIME)
            .env("QGMCP_APP_SIGNATURE", &self.signature)
            .env("QGMCP_STOP_GRACE_PERIOD", "200ms")
            .env_remove("QG_MCP_SERVER_HOST")
            .env_remove("QG_MCP_SERVER_PORT")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Spawn a process that looks like a running server to the pattern search
    pub fn spawn_fake_server(&self) -> Child {
        Command::new("sh")
            .args(["-c", "sleep 60 & wait", "sh", &self.signature])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn fake server")
    }

    /// Wait for a specific duration
    pub fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

pub fn is_alive(pid: u32) -> bool {
    procs::platform_backend().is_alive(pid)
}

/// Polls until `pid` is gone, for at most `timeout`
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    !is_alive(pid)
}

/// Polls until `pid` has at least one child process and returns them
pub fn wait_for_children(pid: u32, timeout: Duration) -> Vec<u32> {
    let backend = procs::platform_backend();
    let deadline = Instant::now() + timeout;
    loop {
        let children = backend.list_children(pid);
        if !children.is_empty() || Instant::now() >= deadline {
            return children;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// A port nothing is listening on right now
pub fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

//! Command execution abstraction for testability
//!
//! The dump, restore, SMB and hook code never spawn processes directly; they go
//! through a `CommandExecutor` so tests can substitute `mock::MockExecutor`.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command and return stdout as string
    async fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<String>;

    /// Run a command, appending its stdout to `output_path`
    async fn run_command_to_file(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// Run a command feeding `input_path` to its stdin
    async fn run_command_with_input(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        input_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<Output>;

    /// Run a hook script with `sh`
    async fn run_script(
        &self,
        script: &Path,
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealExecutor {
    async fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<String> {
        super::command::run_command_stdout(program, args, env, timeout).await
    }

    async fn run_command_to_file(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        super::command::run_command_to_file(program, args, env, output_path, timeout).await
    }

    async fn run_command_with_input(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        input_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_command_with_input(program, args, env, input_path, timeout).await
    }

    async fn run_script(
        &self,
        script: &Path,
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_script(script, env, timeout).await
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
        /// Contents of the stdin file, for `run_command_with_input`
        pub input: Option<Vec<u8>>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses: program name -> response
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program (or script file name)
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.call_count(program) > 0
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn record_call(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
            input: Option<Vec<u8>>,
        ) {
            self.calls.lock().unwrap().push(CommandCall {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: env
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                input,
            });
        }

        fn get_response(&self, program: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }

        fn execute_response(&self, program: &str) -> Result<String> {
            match self.get_response(program) {
                MockResponse::Success { stdout } => Ok(stdout),
                MockResponse::Failure { stderr, exit_code } => {
                    anyhow::bail!("{} failed with exit code {:?}: {}", program, Some(exit_code), stderr)
                }
                MockResponse::Timeout => {
                    anyhow::bail!("{} timed out", program)
                }
            }
        }

        fn output(stdout: String) -> Output {
            Output {
                status: std::process::ExitStatus::default(),
                stdout: stdout.into_bytes(),
                stderr: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run_command_stdout(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
            _timeout: Option<Duration>,
        ) -> Result<String> {
            self.record_call(program, args, env, None);
            self.execute_response(program)
        }

        async fn run_command_to_file(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
            output_path: &Path,
            _timeout: Option<Duration>,
        ) -> Result<()> {
            use std::io::Write;

            self.record_call(program, args, env, None);
            let stdout = self.execute_response(program)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(output_path)?;
            file.write_all(stdout.as_bytes())?;
            Ok(())
        }

        async fn run_command_with_input(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
            input_path: &Path,
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            let input = std::fs::read(input_path)?;
            self.record_call(program, args, env, Some(input));
            self.execute_response(program).map(Self::output)
        }

        async fn run_script(
            &self,
            script: &Path,
            env: &[(&str, &str)],
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            // Scripts are keyed by file name so tests can fail a single hook
            let name = script
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let path = script.to_string_lossy().to_string();
            self.record_call(&name, &[path.as_str()], env, None);
            self.execute_response(&name).map(Self::output)
        }
    }
}

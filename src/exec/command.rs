use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RexecError};
use crate::exec::{AsyncExecutor, Executor};
use crate::scheduler::CommandResult;

/// A program and its arguments. No shell is involved unless the line was
/// built with [`CommandLine::shell`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sh -c <script>`, for pipes and redirections.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").with_arg("-c").with_arg(script)
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments, as sent over the wire.
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl TryFrom<Vec<String>> for CommandLine {
    type Error = RexecError;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        match argv.next() {
            Some(program) if !program.trim().is_empty() => Ok(Self {
                program,
                args: argv.collect(),
            }),
            _ => Err(RexecError::Parse("command line is empty".to_string())),
        }
    }
}

impl FromStr for CommandLine {
    type Err = RexecError;

    /// Split with POSIX shell quoting rules.
    fn from_str(s: &str) -> Result<Self> {
        let argv = shlex::split(s)
            .ok_or_else(|| RexecError::Parse(format!("unbalanced quotes in {:?}", s)))?;
        Self::try_from(argv)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv = self.to_argv();
        match shlex::try_join(argv.iter().map(String::as_str)) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => f.write_str(&argv.join(" ")),
        }
    }
}

type Parser<T> = Arc<dyn Fn(&CommandResult) -> Result<T> + Send + Sync>;

/// A command line paired with a parser for its output.
///
/// The most recent parsed output is kept and can be read back with
/// [`Command::result`].
pub struct Command<T = CommandResult> {
    line: CommandLine,
    parser: Parser<T>,
    output: Option<CommandResult>,
    result: Option<T>,
}

impl Command<CommandResult> {
    /// A command whose parsed output is the raw [`CommandResult`].
    pub fn new(line: CommandLine) -> Self {
        Self::with_parser(line, |output: &CommandResult| Ok(output.clone()))
    }
}

impl<T> Command<T> {
    pub fn with_parser<F>(line: CommandLine, parser: F) -> Self
    where
        F: Fn(&CommandResult) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            line,
            parser: Arc::new(parser),
            output: None,
            result: None,
        }
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    /// Raw output of the last execution.
    pub fn output(&self) -> Option<&CommandResult> {
        self.output.as_ref()
    }

    /// Parsed output of the last successful execution.
    pub fn result(&self) -> Result<&T> {
        self.result.as_ref().ok_or(RexecError::NotExecuted)
    }

    pub fn execute<E>(&mut self, executor: &E) -> Result<&T>
    where
        E: Executor + ?Sized,
    {
        let output = executor.run(&self.line)?;
        self.record(output)
    }

    pub async fn execute_async<E>(&mut self, executor: &E) -> Result<&T>
    where
        E: AsyncExecutor + ?Sized,
    {
        let output = executor.run_async(&self.line).await?;
        self.record(output)
    }

    fn record(&mut self, output: CommandResult) -> Result<&T> {
        self.result = None;
        let parsed = (self.parser)(&output);
        self.output = Some(output);
        Ok(self.result.insert(parsed?))
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.line)
            .field("output", &self.output)
            .field("executed", &self.result.is_some())
            .finish()
    }
}

/// Parser that fails on a non-zero exit and returns stdout with trailing
/// whitespace removed.
pub fn stdout_parser(output: &CommandResult) -> Result<String> {
    let output = output.clone().check()?;
    Ok(output.stdout.unwrap_or_default().trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_command_lines() {
        let line: CommandLine = r#"grep -n "hello world" 'a b.txt'"#.parse().unwrap();
        assert_eq!(line.program(), "grep");
        assert_eq!(line.args(), ["-n", "hello world", "a b.txt"]);
    }

    #[test]
    fn rejects_empty_and_unbalanced_lines() {
        assert!(matches!("".parse::<CommandLine>(), Err(RexecError::Parse(_))));
        assert!(matches!(
            "echo 'oops".parse::<CommandLine>(),
            Err(RexecError::Parse(_))
        ));
    }

    #[test]
    fn shell_wraps_script() {
        let line = CommandLine::shell("echo a | tr a b");
        assert_eq!(line.to_argv(), ["sh", "-c", "echo a | tr a b"]);
    }

    #[test]
    fn display_quotes_arguments() {
        let line = CommandLine::new("echo").with_arg("hello world");
        let reparsed: CommandLine = line.to_string().parse().unwrap();
        assert_eq!(reparsed, line);
    }

    #[test]
    fn result_before_execution_is_an_error() {
        let command = Command::new(CommandLine::new("true"));
        assert!(matches!(command.result(), Err(RexecError::NotExecuted)));
        assert!(command.output().is_none());
    }

    #[test]
    fn stdout_parser_checks_exit_code() {
        let ok = CommandResult::completed("42\n".into(), String::new(), 0);
        assert_eq!(stdout_parser(&ok).unwrap(), "42");

        let failed = CommandResult::completed(String::new(), "boom".into(), 2);
        assert!(matches!(
            stdout_parser(&failed),
            Err(RexecError::NonZeroExit {
                exit_code: Some(2),
                ..
            })
        ));
    }
}

#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// A scratch directory unique to one test.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shell-cli-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn shell(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shell"));
    cmd.args(args)
        .current_dir(dir)
        .env("SHELL_CONFIG_DIR", dir.join("config"))
        .env("SHELL_LOG_DIR", dir.join("logs"))
        .env("SHELL_COLOR", "never")
        // Keep the shell off the test runner's terminal.
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn run_with(dir: &Path, args: &[&str], input: &str) -> Output {
    let mut child = shell(dir, args).spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn run(dir: &Path, input: &str) -> Output {
    run_with(dir, &["-q"], input)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_and_or_short_circuit() {
    let dir = scratch("and-or");
    let output = run(
        &dir,
        "true && echo hi\nfalse && echo skipped\nfalse && echo no || echo fallback\ntrue || echo never\n",
    );
    assert!(output.status.success());
    assert_eq!(stdout(&output), "hi\nfallback\n");
}

#[test]
fn test_sequence_and_pipeline() {
    let dir = scratch("pipeline");
    let output = run(&dir, "echo one; echo two\nprintf 'a\\nb\\nc\\n' | grep -v b | wc -l\n");
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().map(str::trim).collect();
    assert_eq!(lines, ["one", "two", "2"]);
}

#[test]
fn test_pipeline_status_is_last_stage() {
    let dir = scratch("pipe-status");
    let output = run(&dir, "false | true && echo last-wins\ntrue | false || echo failed\n");
    assert_eq!(stdout(&output), "last-wins\nfailed\n");
}

#[test]
fn test_cd_persists_across_lines() {
    let dir = scratch("cd");
    fs::create_dir_all(dir.join("sub")).unwrap();
    let output = run(&dir, "cd sub\npwd\n");
    let printed = PathBuf::from(stdout(&output).trim());
    assert_eq!(
        printed.canonicalize().unwrap(),
        dir.join("sub").canonicalize().unwrap()
    );
}

#[test]
fn test_cd_failure_keeps_directory() {
    let dir = scratch("cd-fail");
    let output = run(&dir, "cd no-such-dir || echo cd-failed\npwd\n");
    let out = stdout(&output);
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("cd-failed"));
    let printed = PathBuf::from(lines.next().unwrap());
    assert_eq!(printed.canonicalize().unwrap(), dir.canonicalize().unwrap());
    assert!(stderr(&output).contains("cd: no-such-dir"));
}

#[test]
fn test_redirections() {
    let dir = scratch("redirect");
    let output = run(
        &dir,
        "echo first > out.txt\n\
         echo second >> out.txt\n\
         cat < out.txt > copy.txt\n\
         ls no-such-file 2> err.txt\n\
         ls no-such-file > both.txt 2>&1\n",
    );
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.join("out.txt")).unwrap(), "first\nsecond\n");
    assert_eq!(fs::read_to_string(dir.join("copy.txt")).unwrap(), "first\nsecond\n");
    assert!(fs::read_to_string(dir.join("err.txt")).unwrap().contains("no-such-file"));
    assert!(fs::read_to_string(dir.join("both.txt")).unwrap().contains("no-such-file"));
    assert_eq!(stdout(&output), "");
}

#[test]
fn test_failed_redirection_skips_command() {
    let dir = scratch("redirect-fail");
    let output = run(&dir, "cat < missing.txt || echo status-nonzero\n");
    assert_eq!(stdout(&output), "status-nonzero\n");
    assert!(stderr(&output).contains("missing.txt"));
}

#[test]
fn test_command_not_found() {
    let dir = scratch("not-found");
    let output = run(&dir, "definitely-not-a-command-xyz || echo missing\n");
    assert_eq!(stdout(&output), "missing\n");
    assert!(stderr(&output).contains("definitely-not-a-command-xyz"));
}

#[test]
fn test_syntax_error_discards_line() {
    let dir = scratch("syntax");
    let output = run(&dir, "echo ran > ran.txt |\necho next\n");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "next\n");
    assert!(stderr(&output).contains("syntax error"));
    assert!(!dir.join("ran.txt").exists());
}

#[test]
fn test_quotes_escapes_and_comments() {
    let dir = scratch("quoting");
    let output = run(
        &dir,
        "echo 'a  b' \"c;d\" e\\ f # trailing comment\n# whole line\necho 'x|y'\n",
    );
    assert_eq!(stdout(&output), "a  b c;d e f\nx|y\n");
}

#[test]
fn test_background_does_not_block() {
    let dir = scratch("background");
    let start = Instant::now();
    let output = run(&dir, "sleep 5 > /dev/null 2> /dev/null &\necho after\n");
    assert_eq!(stdout(&output), "after\n");
    assert!(start.elapsed() < Duration::from_secs(4));
}

/// Waits up to five seconds for `path` to hold some content.
fn wait_for_file(path: &Path) -> String {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match fs::read_to_string(path) {
            Ok(text) if !text.is_empty() => return text,
            _ if Instant::now() >= deadline => panic!("{} never appeared", path.display()),
            _ => std::thread::sleep(Duration::from_millis(20)),
        }
    }
}

#[test]
fn test_background_chain_runs() {
    let dir = scratch("background-chain");
    let output = run(&dir, "true && echo bg > bg.txt &\n");
    assert!(output.status.success());
    assert_eq!(wait_for_file(&dir.join("bg.txt")), "bg\n");
}

#[test]
fn test_stopped_pipeline_becomes_job() {
    let dir = scratch("stopped");
    let output = run(&dir, "sh -c 'kill -STOP $$' || echo stopped\necho after\n");
    assert_eq!(stdout(&output), "stopped\nafter\n");
}

#[test]
fn test_interactive_job_notices() {
    let dir = scratch("notices");
    let output = run_with(&dir, &[], "true &\nsleep 0.3\necho x\n");
    let out = stdout(&output);

    let start = out.find("$ [1] ").unwrap() + "$ [1] ".len();
    let pid: String = out[start..].chars().take_while(char::is_ascii_digit).collect();
    assert!(!pid.is_empty(), "no job pid in {:?}", out);
    assert!(
        out.contains(&format!("[1]+ {} done true\n", pid)),
        "no completion notice in {:?}",
        out
    );
    assert!(out.contains("$ x\n"));
}

#[test]
fn test_prompt_is_printed_without_quiet() {
    let dir = scratch("prompt");
    let mut child = shell(&dir, &[]).spawn().unwrap();
    let pid = child.id();
    child.stdin.take().unwrap().write_all(b"echo hi\n").unwrap();
    let output = child.wait_with_output().unwrap();
    let prompt = format!("shell[{}]$ ", pid);
    let out = stdout(&output);
    assert!(out.starts_with(&prompt), "unexpected output {:?}", out);
    assert!(out.contains("hi\n"));
}

#[test]
fn test_script_file() {
    let dir = scratch("script");
    fs::write(dir.join("run.sh"), "echo from-script\nfalse || echo recovered\n").unwrap();
    let output = run_with(&dir, &["run.sh"], "");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "from-script\nrecovered\n");
}

#[test]
fn test_missing_script_fails() {
    let dir = scratch("missing-script");
    let output = run_with(&dir, &["nope.sh"], "");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("nope.sh"));
}

#[test]
fn test_log_file_is_written() {
    let dir = scratch("logs");
    run(&dir, "true\n");
    let logs: Vec<_> = fs::read_dir(dir.join("logs")).unwrap().collect();
    assert_eq!(logs.len(), 1);
}

/// Foreground commands that touch the terminal must never stop, which needs
/// the shell to run on a real one. `script` provides the pty.
#[test]
fn test_foreground_commands_own_the_terminal() {
    if Command::new("script").arg("-V").output().is_err() {
        eprintln!("script(1) not available, skipping");
        return;
    }
    let dir = scratch("pty");
    let mut lines = "stty sane && echo ok\n".repeat(60);
    lines.push_str("sh -c 'kill -STOP $$' || echo stopped\necho after\n");
    fs::write(dir.join("tty.sh"), lines).unwrap();

    let command = format!("{} -q tty.sh", env!("CARGO_BIN_EXE_shell"));
    let mut child = Command::new("script")
        .args(["-qec", &command, "/dev/null"])
        .current_dir(&dir)
        .env("SHELL_CONFIG_DIR", dir.join("config"))
        .env("SHELL_LOG_DIR", dir.join("logs"))
        .env("SHELL_COLOR", "never")
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // Keep stdin open until the session ends.
    let stdin = child.stdin.take();
    let mut out = String::new();
    child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
    drop(stdin);
    child.wait().unwrap();

    let out = out.replace("\r\n", "\n");
    assert_eq!(out.lines().filter(|line| *line == "ok").count(), 60, "{:?}", out);
    assert!(out.contains("stopped\nafter\n"), "{:?}", out);
}

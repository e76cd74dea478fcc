//! Developer workbench: spawn a plugin, play host, poke it by hand.
//!
//! `voltd-plugin-dev drive ./my-plugin` completes the handshake with a
//! capability set assembled from the command line, then drops into a REPL
//! where every line becomes a dispatch. `probe` stops after printing the
//! announced manifest.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use serde_json::{json, Value};
use voltd_wire::{
    CapabilitySet, CapabilityValue, Manifest, HANDSHAKE_METHOD, HOOK_PREFIX, PING_METHOD,
    PROTOCOL_VERSION,
};

#[derive(Parser)]
#[command(
    name = "voltd-plugin-dev",
    about = "Developer workbench for voltd plugins",
    version
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args)]
pub struct SessionArgs {
    /// Plugin executable, followed by its own arguments.
    #[arg(required = true, trailing_var_arg = true, value_name = "PLUGIN_CMD")]
    pub plugin: Vec<String>,

    /// Grant a capability as NAME=VALUE. The value is parsed as JSON,
    /// bare text otherwise. Repeatable; overrides --caps-file entries.
    #[arg(long = "cap", value_name = "NAME=VALUE")]
    pub caps: Vec<String>,

    /// Read the base capability set from a JSON object file.
    #[arg(long, value_name = "FILE")]
    pub caps_file: Option<String>,

    /// Milliseconds to wait for the handshake and for each reply.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Spawn a plugin, complete its handshake, and call it interactively.
    Drive {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Spawn a plugin, print its announced manifest as JSON, and exit.
    Probe {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   voltd-plugin-dev completions bash > ~/.local/share/bash-completion/completions/voltd-plugin-dev
    ///   voltd-plugin-dev completions zsh > ~/.zfunc/_voltd-plugin-dev
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

/// Run the parsed command line.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Drive { session } => {
            let capabilities = assemble_capabilities(&session.caps, session.caps_file.as_deref())?;
            let timeout = Duration::from_millis(session.timeout_ms);
            drive(&session.plugin, capabilities, timeout)
        }
        Commands::Probe { session } => {
            let capabilities = assemble_capabilities(&session.caps, session.caps_file.as_deref())?;
            let timeout = Duration::from_millis(session.timeout_ms);
            probe(&session.plugin, capabilities, timeout)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "voltd-plugin-dev", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ─────────────────────── host session ───────────────────────

/// A spawned plugin with the host side of its link.
struct HostSession {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
    next_id: i64,
}

impl HostSession {
    fn spawn(argv: &[String]) -> anyhow::Result<Self> {
        let (program, args) = argv.split_first().context("plugin command is empty")?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn '{program}'"))?;
        let stdin = child.stdin.take().context("plugin stdin unavailable")?;
        let stdout = child.stdout.take().context("plugin stdout unavailable")?;

        // Reader thread so replies can be awaited with a timeout.
        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(text) => {
                        if !text.trim().is_empty() && tx.send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            lines,
            next_id: 1,
        })
    }

    /// Answer the plugin's handshake request with `capabilities` and
    /// return the params it announced.
    fn handshake(
        &mut self,
        capabilities: &CapabilitySet,
        timeout: Duration,
    ) -> anyhow::Result<Value> {
        let line = self
            .lines
            .recv_timeout(timeout)
            .context("timed out waiting for the plugin's handshake request")?;
        let request: Value = serde_json::from_str(&line)?;
        anyhow::ensure!(
            request["method"] == HANDSHAKE_METHOD,
            "expected {HANDSHAKE_METHOD}, plugin sent {}",
            request["method"]
        );

        let reply = json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": { "protocol": PROTOCOL_VERSION, "capabilities": capabilities }
        });
        self.send_line(&reply.to_string())?;
        Ok(request["params"].clone())
    }

    fn call(&mut self, method: &str, params: Value, timeout: Duration) -> anyhow::Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.send_line(&request.to_string())?;
        let line = self
            .lines
            .recv_timeout(timeout)
            .context("timed out waiting for a reply")?;
        Ok(serde_json::from_str(&line)?)
    }

    fn send_line(&mut self, text: &str) -> anyhow::Result<()> {
        self.stdin.write_all(text.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Close the plugin's stdin and wait for it to exit.
    fn shutdown(self) -> anyhow::Result<()> {
        let Self {
            mut child,
            stdin,
            lines,
            ..
        } = self;
        drop(stdin);
        drop(lines);

        for _ in 0..50 {
            if let Some(status) = child.try_wait()? {
                tracing::debug!("Plugin exited with {status}");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        tracing::warn!("Plugin ignored EOF for 5s, killing it");
        child.kill()?;
        child.wait()?;
        Ok(())
    }
}

fn probe(argv: &[String], capabilities: CapabilitySet, timeout: Duration) -> anyhow::Result<()> {
    let mut session = HostSession::spawn(argv)?;
    let params = session.handshake(&capabilities, timeout)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    session.shutdown()
}

fn drive(argv: &[String], capabilities: CapabilitySet, timeout: Duration) -> anyhow::Result<()> {
    let mut session = HostSession::spawn(argv)?;
    let params = session.handshake(&capabilities, timeout)?;
    let manifest: Manifest = serde_json::from_value(params["manifest"].clone())
        .context("plugin announced a malformed manifest")?;

    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1m{} v{}\x1b[0m connected, {} declarations, {} capabilities granted",
        params["plugin"]["name"].as_str().unwrap_or("plugin"),
        params["plugin"]["version"].as_str().unwrap_or("?"),
        manifest.len(),
        capabilities.len()
    );
    eprintln!();
    eprintln!("    Call with \x1b[36mmethod [params-json]\x1b[0m, browse commands with \x1b[36m/\x1b[0m, quit with \x1b[90m/exit\x1b[0m.");
    eprintln!();

    repl(&mut session, &manifest, &capabilities, timeout)?;
    session.shutdown()
}

// ─────────────────────── REPL ───────────────────────

const COMMANDS: &[(&str, &str)] = &[
    ("/manifest", "Show the manifest announced at handshake"),
    ("/caps", "Show the granted capability set"),
    ("/raw", "Send one raw JSON line to the plugin"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the workbench"),
];

/// REPL helper completing commands and the plugin's own wire methods.
struct WorkbenchHelper {
    wire_methods: Vec<String>,
}

impl WorkbenchHelper {
    fn new(manifest: &Manifest) -> Self {
        let mut wire_methods: Vec<String> =
            manifest.methods.iter().map(|m| m.name.clone()).collect();
        wire_methods.extend(
            manifest
                .hooks
                .iter()
                .map(|h| format!("{HOOK_PREFIX}{}", h.name)),
        );
        wire_methods.push(PING_METHOD.to_string());
        wire_methods.sort();
        Self { wire_methods }
    }
}

impl Completer for WorkbenchHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];
        if input.contains(' ') {
            return Ok((pos, Vec::new()));
        }

        let mut matches: Vec<Pair> = COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(input))
            .map(|(cmd, desc)| Pair {
                display: format!("{cmd:<12} {desc}"),
                replacement: format!("{cmd} "),
            })
            .collect();
        matches.extend(
            self.wire_methods
                .iter()
                .filter(|m| m.starts_with(input))
                .map(|m| Pair {
                    display: m.clone(),
                    replacement: format!("{m} "),
                }),
        );
        Ok((0, matches))
    }
}

impl Hinter for WorkbenchHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() || line.contains(' ') {
            return None;
        }
        for (cmd, _) in COMMANDS {
            if cmd.starts_with(line) && *cmd != line {
                return Some(cmd[line.len()..].to_string());
            }
        }
        self.wire_methods
            .iter()
            .find(|m| m.starts_with(line) && m.as_str() != line)
            .map(|m| m[line.len()..].to_string())
    }
}

impl Highlighter for WorkbenchHelper {}
impl Validator for WorkbenchHelper {}
impl Helper for WorkbenchHelper {}

fn repl(
    session: &mut HostSession,
    manifest: &Manifest,
    capabilities: &CapabilitySet,
    timeout: Duration,
) -> anyhow::Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<WorkbenchHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(WorkbenchHelper::new(manifest)));

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".voltd_plugin_dev_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mvolt>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(input) = line.strip_prefix('/') {
                    let mut parts = input.splitn(2, ' ');
                    let cmd = parts.next().unwrap_or("");
                    let args = parts.next().unwrap_or("").trim();
                    match cmd {
                        "exit" | "quit" => break,
                        "help" | "h" | "?" | "" => cmd_help(),
                        "manifest" => cmd_manifest(manifest),
                        "caps" => cmd_caps(capabilities),
                        "raw" => cmd_raw(session, args, timeout),
                        _ => {
                            eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                        }
                    }
                    continue;
                }

                let mut parts = line.splitn(2, ' ');
                let method = parts.next().unwrap_or("");
                let raw_params = parts.next().unwrap_or("").trim();
                let params = if raw_params.is_empty() {
                    json!({})
                } else {
                    match serde_json::from_str(raw_params) {
                        Ok(value) => value,
                        Err(e) => {
                            eprintln!("  Params are not valid JSON: {e}");
                            continue;
                        }
                    }
                };

                match session.call(method, params, timeout) {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => eprintln!("  Call failed: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);
    Ok(())
}

fn print_reply(reply: &Value) {
    if let Some(error) = reply.get("error") {
        let kind = error["data"]["kind"].as_str().unwrap_or("error");
        let message = error["message"].as_str().unwrap_or("unknown error");
        eprintln!("  \x1b[31merror\x1b[0m [\x1b[33m{kind}\x1b[0m] {message}");
        if let Some(cause) = error["data"]["cause"].as_str() {
            eprintln!("    cause: {cause}");
        }
        return;
    }
    match serde_json::to_string_pretty(&reply["result"]) {
        Ok(text) => {
            for row in text.lines() {
                eprintln!("  {row}");
            }
        }
        Err(_) => eprintln!("  {reply}"),
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<12} {desc}");
    }
    eprintln!();
    eprintln!("  Anything else is sent as: method [params-json]");
    eprintln!();
}

fn cmd_manifest(manifest: &Manifest) {
    eprintln!();
    eprintln!("  {} methods:", manifest.methods.len());
    for entry in &manifest.methods {
        let requires = if entry.requires.is_empty() {
            String::new()
        } else {
            format!(" \x1b[33m(requires {})\x1b[0m", entry.requires.join(", "))
        };
        eprintln!(
            "    {:<24} {}{requires}",
            entry.name,
            entry.description.as_deref().unwrap_or("")
        );
    }
    eprintln!("  {} hooks:", manifest.hooks.len());
    for entry in &manifest.hooks {
        let requires = if entry.requires.is_empty() {
            String::new()
        } else {
            format!(" \x1b[33m(requires {})\x1b[0m", entry.requires.join(", "))
        };
        eprintln!("    {HOOK_PREFIX}{}{requires}", entry.name);
    }
    eprintln!();
}

fn cmd_caps(capabilities: &CapabilitySet) {
    eprintln!();
    if capabilities.is_empty() {
        eprintln!("  No capabilities granted.");
    } else {
        for (name, value) in capabilities.iter() {
            eprintln!("    {name} = {value}");
        }
    }
    eprintln!();
}

fn cmd_raw(session: &mut HostSession, args: &str, timeout: Duration) {
    if args.is_empty() {
        eprintln!("  Usage: /raw <json-line>");
        return;
    }
    if let Err(e) = session.send_line(args) {
        eprintln!("  Send failed: {e}");
        return;
    }
    match session.lines.recv_timeout(timeout) {
        Ok(line) => match serde_json::from_str::<Value>(&line) {
            Ok(reply) => print_reply(&reply),
            Err(_) => eprintln!("  {line}"),
        },
        Err(_) => eprintln!("  No reply within {}ms.", timeout.as_millis()),
    }
}

// ─────────────────────── capability assembly ───────────────────────

/// Build the capability set to grant: file first, then NAME=VALUE grants.
pub fn assemble_capabilities(
    specs: &[String],
    file: Option<&str>,
) -> anyhow::Result<CapabilitySet> {
    let mut set = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read capability file '{path}'"))?;
            serde_json::from_str(&text)
                .with_context(|| format!("'{path}' is not a JSON capability object"))?
        }
        None => CapabilitySet::new(),
    };
    for spec in specs {
        let (name, value) = parse_cap_spec(spec)?;
        set.insert(name, value);
    }
    Ok(set)
}

fn parse_cap_spec(spec: &str) -> anyhow::Result<(String, CapabilityValue)> {
    let (name, raw) = spec
        .split_once('=')
        .with_context(|| format!("expected NAME=VALUE, got '{spec}'"))?;
    anyhow::ensure!(!name.is_empty(), "capability name is empty in '{spec}'");
    Ok((name.to_string(), parse_cap_value(raw)))
}

fn parse_cap_value(raw: &str) -> CapabilityValue {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Bool(flag)) => CapabilityValue::Flag(flag),
        Ok(Value::Number(n)) if n.is_i64() => CapabilityValue::Number(n.as_i64().unwrap_or(0)),
        Ok(Value::String(text)) => CapabilityValue::Text(text),
        _ => CapabilityValue::Text(raw.to_string()),
    }
}

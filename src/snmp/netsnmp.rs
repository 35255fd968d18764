//! SNMP transport backed by the net-snmp command line tools.
//!
//! GET and WALK run `snmpget` / `snmpwalk` once per call with numeric output
//! (`-On -Oe -Ot`) and parse the `OID = TYPE: value` lines. Traps are
//! received by a foreground `snmptrapd` that prints one record per
//! notification, closed by a marker line.
//!
//! USM passphrases never appear on a command line. Each GET/WALK gets a
//! private directory holding an `snmp.conf` with the passphrases, found by
//! the tool through `SNMPCONFPATH`; snmptrapd reads its users from a private
//! temporary file. Both are removed when the exchange ends.
//!
//! net-snmp prints string values in double quotes with `"` and `\` escaped,
//! so tabs and line breaks only delimit records outside quotes.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time;

use crate::lifecycle::ShutdownSignal;
use crate::snmp::security::{SecurityLevel, SecurityParams};
use crate::snmp::transport::{SnmpError, SnmpSession, SnmpTransport, Trap, TrapTransport};
use crate::snmp::value::{SnmpValue, VarBind};

/// Output format handed to snmptrapd: transport address, the tab-separated
/// variable bindings, then a line holding only [`TRAP_END`].
const TRAP_FORMAT: &str = "%b\t%v\n.\n";
const TRAP_END: &str = ".";

/// Longest trap record kept; anything larger is dropped whole.
const MAX_TRAP_RECORD: usize = 64 * 1024;

/// File name the tools look for in each `SNMPCONFPATH` directory.
const CLIENT_CONF: &str = "snmp.conf";

/// Extra time allowed on top of the agent timeout for process start-up.
const PROCESS_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct NetSnmp {
    get_program: String,
    walk_program: String,
    trapd_program: String,
    walk_deadline: Duration,
}

impl Default for NetSnmp {
    fn default() -> Self {
        Self {
            get_program: "snmpget".to_string(),
            walk_program: "snmpwalk".to_string(),
            trapd_program: "snmptrapd".to_string(),
            walk_deadline: Duration::from_secs(120),
        }
    }
}

impl NetSnmp {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(
        &self,
        program: &str,
        session: &SnmpSession,
        extra: Vec<String>,
        operation: &'static str,
        deadline: Duration,
    ) -> Result<String, SnmpError> {
        let credentials = credentials_dir(&session.security)?;

        let mut command = Command::new(program);
        command
            .args(session_args(session))
            .arg(session.address())
            .args(&extra)
            .env("SNMPCONFPATH", credentials.path())
            .env("SNMP_PERSISTENT_DIR", credentials.path())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match time::timeout(deadline, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(SnmpError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(SnmpError::Timeout {
                    operation,
                    target: session.target.clone(),
                    timeout: deadline,
                })
            }
        };

        if !output.status.success() {
            return Err(SnmpError::Command {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SnmpTransport for NetSnmp {
    async fn get(&self, session: &SnmpSession, oids: &[String]) -> Result<Vec<VarBind>, SnmpError> {
        let stdout = self
            .run(&self.get_program, session, oids.to_vec(), "get", get_deadline(session))
            .await?;
        Ok(parse_output(&stdout))
    }

    async fn walk(&self, session: &SnmpSession, root_oid: &str) -> Result<Vec<VarBind>, SnmpError> {
        let stdout = self
            .run(&self.walk_program, session, vec![root_oid.to_string()], "walk", self.walk_deadline)
            .await?;
        Ok(parse_output(&stdout))
    }
}

#[async_trait]
impl TrapTransport for NetSnmp {
    async fn listen(
        &self,
        bind: &str,
        engine_id: &str,
        security: &SecurityParams,
        traps: mpsc::Sender<Trap>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), SnmpError> {
        // Removed on drop, including when the spawn below fails.
        let conf = trapd_conf_file(engine_id, security)?;

        let mut child = Command::new(&self.trapd_program)
            .args(["-f", "-Lo", "-n", "-On", "-Oe", "-Ot", "-C", "-c"])
            .arg(conf.path())
            .args(["-F", TRAP_FORMAT])
            .arg(format!("udp:{}", bind))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SnmpError::Spawn {
                program: self.trapd_program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SnmpError::Listener("snmptrapd stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut reader = TrapReader::default();

        tracing::info!(bind = %bind, level = security.level().as_str(), "SNMP trap listener started");

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some(record) = reader.push_line(&line) else {
                            continue;
                        };
                        match parse_trap_record(&record) {
                            Some(trap) => {
                                if traps.send(trap).await.is_err() {
                                    return Ok(());
                                }
                            }
                            None => tracing::debug!(record = %record, "Ignoring snmptrapd output"),
                        }
                    }
                    Ok(None) => {
                        let status = child.wait().await;
                        return Err(SnmpError::Listener(format!("snmptrapd exited: {:?}", status)));
                    }
                    Err(e) => return Err(SnmpError::Listener(e.to_string())),
                },
                _ = shutdown.recv() => {
                    let _ = child.kill().await;
                    return Ok(());
                }
            }
        }
    }
}

/// Overall bound for one GET: every retry may use the full agent timeout.
fn get_deadline(session: &SnmpSession) -> Duration {
    session
        .timeout
        .saturating_mul(session.retries.saturating_add(1))
        .saturating_add(PROCESS_SLACK)
}

/// Protocol and user selection. Passphrases come from [`client_conf`].
fn session_args(session: &SnmpSession) -> Vec<String> {
    let security = &session.security;
    let level = security.level();
    let mut args = vec![
        "-v3".to_string(),
        "-l".to_string(),
        level.as_str().to_string(),
        "-u".to_string(),
        security.username.clone(),
    ];

    if let Some(auth) = security.auth_protocol.netsnmp_name() {
        args.extend(["-a".to_string(), auth.to_string()]);
    }
    if level == SecurityLevel::AuthPriv {
        if let Some(privacy) = security.priv_protocol.netsnmp_name() {
            args.extend(["-x".to_string(), privacy.to_string()]);
        }
    }

    args.extend([
        "-t".to_string(),
        session.timeout.as_secs().max(1).to_string(),
        "-r".to_string(),
        session.retries.to_string(),
        "-On".to_string(),
        "-Oe".to_string(),
        "-Ot".to_string(),
    ]);
    args
}

/// `snmp.conf` carrying the passphrases for one exchange.
fn client_conf(security: &SecurityParams) -> Result<String, SnmpError> {
    let level = security.level();
    let mut conf = String::new();

    if level != SecurityLevel::NoAuthNoPriv {
        conf.push_str(&format!("defAuthPassphrase {}\n", conf_word(&security.auth_passphrase)?));
    }
    if level == SecurityLevel::AuthPriv {
        conf.push_str(&format!("defPrivPassphrase {}\n", conf_word(&security.priv_passphrase)?));
    }
    Ok(conf)
}

fn credentials_dir(security: &SecurityParams) -> Result<TempDir, SnmpError> {
    let contents = client_conf(security)?;
    let dir = tempfile::Builder::new()
        .prefix("ingest-gateway-snmp-")
        .tempdir()
        .map_err(|e| SnmpError::Credentials(e.to_string()))?;
    write_private(&dir.path().join(CLIENT_CONF), &contents).map_err(|e| SnmpError::Credentials(e.to_string()))?;
    Ok(dir)
}

/// Create `path` exclusively with owner-only permissions.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())
}

fn trapd_conf_file(engine_id: &str, security: &SecurityParams) -> Result<NamedTempFile, SnmpError> {
    let contents = trapd_config(engine_id, security)?;
    let mut file = tempfile::Builder::new()
        .prefix("ingest-gateway-snmptrapd-")
        .suffix(".conf")
        .tempfile()
        .map_err(|e| SnmpError::Credentials(e.to_string()))?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| SnmpError::Credentials(e.to_string()))?;
    Ok(file)
}

/// snmptrapd configuration accepting notifications for one USM user.
pub fn trapd_config(engine_id: &str, security: &SecurityParams) -> Result<String, SnmpError> {
    let mut user = String::from("createUser");
    if !engine_id.is_empty() {
        user.push_str(&format!(" -e {}", conf_word(engine_id)?));
    }
    user.push_str(&format!(" {}", conf_word(&security.username)?));

    if let Some(auth) = security.auth_protocol.netsnmp_name() {
        user.push_str(&format!(" {} {}", auth, conf_word(&security.auth_passphrase)?));
        if let Some(privacy) = security.priv_protocol.netsnmp_name() {
            user.push_str(&format!(" {} {}", privacy, conf_word(&security.priv_passphrase)?));
        }
    }

    Ok(format!("{}\ndisableAuthorization yes\n", user))
}

/// Quote a value for a net-snmp configuration line. Line breaks would start
/// a new directive, so they are refused.
fn conf_word(value: &str) -> Result<String, SnmpError> {
    if value.contains(['\n', '\r', '\0']) {
        return Err(SnmpError::Credentials(
            "configuration values must not contain line breaks".to_string(),
        ));
    }
    Ok(format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
}

/// Whether scanned text sits inside a quoted value.
#[derive(Debug, Default, Clone, Copy)]
struct Quoting {
    open: bool,
    escaped: bool,
}

impl Quoting {
    /// Advance over `c`. Returns true when `c` lies outside any quotes.
    fn step(&mut self, c: char) -> bool {
        if self.open {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.open = false;
            }
            false
        } else if c == '"' {
            self.open = true;
            false
        } else {
            true
        }
    }

    fn scan(&mut self, text: &str) {
        for c in text.chars() {
            self.step(c);
        }
    }
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut quoting = Quoting::default();
    let mut fields = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if quoting.step(c) && c == separator {
            fields.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    fields.push(&text[start..]);
    fields
}

/// Reassembles snmptrapd output lines into complete trap records.
#[derive(Debug, Default)]
pub struct TrapReader {
    pending: String,
    quoting: Quoting,
    started: bool,
    oversized: bool,
}

impl TrapReader {
    /// Feed one output line. Returns the finished record once the end
    /// marker arrives outside any quoted value.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if !self.quoting.open && line == TRAP_END {
            let record = std::mem::take(&mut self.pending);
            let oversized = self.oversized;
            *self = Self::default();
            return (!oversized && !record.is_empty()).then_some(record);
        }

        if self.started {
            self.quoting.step('\n');
        }
        self.quoting.scan(line);

        if !self.oversized {
            if self.pending.len() + line.len() + 1 > MAX_TRAP_RECORD {
                tracing::warn!(limit = MAX_TRAP_RECORD, "Dropping oversized SNMP trap");
                self.oversized = true;
                self.pending.clear();
            } else {
                if self.started {
                    self.pending.push('\n');
                }
                self.pending.push_str(line);
            }
        }
        self.started = true;
        None
    }
}

fn is_varbind_start(line: &str) -> bool {
    match line.split_once(" = ") {
        Some((oid, _)) => !oid.is_empty() && oid.chars().all(|c| c.is_ascii_digit() || c == '.'),
        None => false,
    }
}

/// Parse snmpget/snmpwalk output. Lines inside a quoted value, or that do
/// not start a binding, continue the previous value.
pub fn parse_output(stdout: &str) -> Vec<VarBind> {
    let mut records: Vec<String> = Vec::new();
    let mut quoting = Quoting::default();

    for line in stdout.lines() {
        if !quoting.open && is_varbind_start(line) {
            records.push(line.to_string());
        } else if let Some(last) = records.last_mut() {
            quoting.step('\n');
            last.push('\n');
            last.push_str(line);
        } else {
            continue;
        }
        quoting.scan(line);
    }

    records.iter().filter_map(|record| parse_varbind(record)).collect()
}

/// Parse one `OID = TYPE: value` record. End-of-view markers yield `None`.
pub fn parse_varbind(record: &str) -> Option<VarBind> {
    let (oid, rest) = record.split_once(" = ")?;
    let value = parse_value(rest)?;
    Some(VarBind::new(oid.trim(), value))
}

fn parse_value(rest: &str) -> Option<SnmpValue> {
    let rest = rest.trim_end();

    let Some((kind, text)) = rest.split_once(": ") else {
        return untyped_value(rest);
    };
    let text = text.trim();

    let value = match kind {
        "STRING" => SnmpValue::OctetString(unquote(text).into_bytes()),
        "Hex-STRING" => match parse_hex(text) {
            Some(bytes) => SnmpValue::OctetString(bytes),
            None => other(kind, text),
        },
        "INTEGER" => parse_number(text).map(SnmpValue::Integer).unwrap_or_else(|| other(kind, text)),
        "Counter32" => parse_number(text).map(SnmpValue::Counter32).unwrap_or_else(|| other(kind, text)),
        "Gauge32" | "Unsigned32" => parse_number(text).map(SnmpValue::Gauge32).unwrap_or_else(|| other(kind, text)),
        "Counter64" => parse_number(text).map(SnmpValue::Counter64).unwrap_or_else(|| other(kind, text)),
        "Timeticks" => parse_number(text).map(SnmpValue::TimeTicks).unwrap_or_else(|| other(kind, text)),
        "IpAddress" => text
            .parse::<Ipv4Addr>()
            .map(SnmpValue::IpAddress)
            .unwrap_or_else(|_| other(kind, text)),
        "OID" => SnmpValue::ObjectIdentifier(text.to_string()),
        _ => other(kind, text),
    };
    Some(value)
}

fn untyped_value(text: &str) -> Option<SnmpValue> {
    if text.starts_with("No more variables") {
        return None;
    }
    let value = if text == "NULL" {
        SnmpValue::Null
    } else if text == "\"\"" {
        SnmpValue::OctetString(Vec::new())
    } else if text.starts_with("No Such Object") {
        other("NoSuchObject", text)
    } else if text.starts_with("No Such Instance") {
        other("NoSuchInstance", text)
    } else {
        other("Unknown", text)
    };
    Some(value)
}

fn other(type_name: &str, text: &str) -> SnmpValue {
    SnmpValue::Other {
        type_name: type_name.to_string(),
        text: text.to_string(),
    }
}

/// Accepts `42`, `up(1)` and `(12345) 0:02:03.45`.
fn parse_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    if let Ok(n) = text.parse() {
        return Some(n);
    }
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    text[open + 1..close].parse().ok()
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    text.split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16).ok())
        .collect()
}

fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .map(|t| t.strip_suffix('"').unwrap_or(t))
        .unwrap_or(text);
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Parse one record printed with [`TRAP_FORMAT`].
pub fn parse_trap_record(record: &str) -> Option<Trap> {
    let mut fields = split_unquoted(record, '\t').into_iter();
    let source = parse_transport_address(fields.next()?)?;
    let varbinds = fields.filter_map(parse_varbind).collect();
    Some(Trap { source, varbinds })
}

/// `UDP: [10.0.0.5]:50123->[0.0.0.0]:162` becomes `10.0.0.5:50123`.
fn parse_transport_address(text: &str) -> Option<String> {
    let (protocol, rest) = text.split_once(": [")?;
    if !matches!(protocol, "UDP" | "TCP" | "UDP/IPv6" | "TCP/IPv6") {
        return None;
    }
    let close = rest.find(']')?;
    let ip = &rest[..close];
    let port: String = rest[close + 1..]
        .strip_prefix(':')
        .map(|rest| rest.chars().take_while(|c| c.is_ascii_digit()).collect())
        .unwrap_or_default();

    if port.is_empty() {
        Some(ip.to_string())
    } else {
        Some(format!("{}:{}", ip, port))
    }
}

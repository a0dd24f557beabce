//! Ingestion client.
//!
//! Drives one external graph-engine process per call:
//! `Uninitialized → Handshaking → Ready → Transferring → {Completed | Failed}`.
//! A completed client can transfer again; a failed one must handshake again.

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{IngestError, IngestResult};
use super::frame::FrameWriter;
use super::protocol::{
    find_reply, group_relationships, parse_query_table, parse_reply, plan_bulk, plan_stream,
    HandshakeAck, IngestStats, QueryRow, ResultReply,
};
use crate::graph::AnalysisData;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// `Auto` picks `File` below this many entities.
pub const FILE_MODE_LIMIT: usize = 1_000;
/// `Auto` picks `Stream` below this many entities, `Bulk` at or above.
pub const STREAM_MODE_LIMIT: usize = 50_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    File,
    Stream,
    Bulk,
    #[default]
    Auto,
}

impl IngestMode {
    /// Concrete mode for a payload of `entity_count` entities.
    pub fn resolve(self, entity_count: usize) -> IngestMode {
        match self {
            IngestMode::Auto if entity_count < FILE_MODE_LIMIT => IngestMode::File,
            IngestMode::Auto if entity_count < STREAM_MODE_LIMIT => IngestMode::Stream,
            IngestMode::Auto => IngestMode::Bulk,
            mode => mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::File => "file",
            IngestMode::Stream => "stream",
            IngestMode::Bulk => "bulk",
            IngestMode::Auto => "auto",
        }
    }
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(IngestMode::File),
            "stream" => Ok(IngestMode::Stream),
            "bulk" => Ok(IngestMode::Bulk),
            "auto" => Ok(IngestMode::Auto),
            other => Err(format!("unknown ingest mode `{other}` (expected auto, file, stream or bulk)")),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Handshaking,
    Ready,
    Transferring,
    Completed,
    Failed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Uninitialized => "uninitialized",
            ClientState::Handshaking => "handshaking",
            ClientState::Ready => "ready",
            ClientState::Transferring => "transferring",
            ClientState::Completed => "completed",
            ClientState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Engine executable.
    pub binary: PathBuf,
    /// Arguments placed before the engine command (e.g. a script path for
    /// an interpreter).
    pub args: Vec<OsString>,
    pub db_path: PathBuf,
    pub batch_size: usize,
    pub cancel: Option<CancellationToken>,
}

impl IngestSettings {
    pub fn new(binary: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            db_path: db_path.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

pub struct IngestClient {
    settings: IngestSettings,
    state: ClientState,
    engine_version: Option<String>,
}

impl IngestClient {
    pub fn new(settings: IngestSettings) -> Self {
        Self {
            settings,
            state: ClientState::Uninitialized,
            engine_version: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Version reported by the last successful handshake.
    pub fn engine_version(&self) -> Option<&str> {
        self.engine_version.as_deref()
    }

    /// Handshake with the engine. Must succeed before any transfer.
    pub async fn initialize(&mut self) -> IngestResult<HandshakeAck> {
        if matches!(self.state, ClientState::Handshaking | ClientState::Transferring) {
            return Err(self.invalid_state("idle"));
        }
        self.state = ClientState::Handshaking;
        match self.handshake().await {
            Ok(ack) => {
                info!(
                    binary = %self.settings.binary.display(),
                    version = ack.version.as_deref().unwrap_or("unknown"),
                    "graph engine ready"
                );
                self.engine_version = ack.version.clone();
                self.state = ClientState::Ready;
                Ok(ack)
            }
            Err(e) => {
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> IngestResult<HandshakeAck> {
        let output = self.run_command(&[OsStr::new("handshake")]).await?;
        output.check_exit()?;
        let value = find_reply(&output.stdout, "ack").ok_or(IngestError::NotReady)?;
        let ack: HandshakeAck = serde_json::from_value(value)?;
        if !ack.ready {
            return Err(IngestError::NotReady);
        }
        Ok(ack)
    }

    /// Transfer `data` using `mode` (`Auto` chooses by payload size).
    pub async fn ingest(&mut self, data: &AnalysisData, mode: IngestMode) -> IngestResult<IngestStats> {
        let mode = mode.resolve(data.entities.len());
        self.begin_transfer()?;
        info!(
            mode = %mode,
            entities = data.entities.len(),
            relationships = data.relationships.len(),
            db = %self.settings.db_path.display(),
            "starting ingestion"
        );
        let result = match mode {
            IngestMode::File => self.transfer_file(data).await,
            IngestMode::Stream => self.transfer_stream(data).await,
            IngestMode::Bulk | IngestMode::Auto => self.transfer_bulk(data).await,
        };
        self.finish_transfer(result)
    }

    pub async fn ingest_file(&mut self, data: &AnalysisData) -> IngestResult<IngestStats> {
        self.ingest(data, IngestMode::File).await
    }

    pub async fn ingest_stream(&mut self, data: &AnalysisData) -> IngestResult<IngestStats> {
        self.ingest(data, IngestMode::Stream).await
    }

    pub async fn ingest_bulk(&mut self, data: &AnalysisData) -> IngestResult<IngestStats> {
        self.ingest(data, IngestMode::Bulk).await
    }

    /// Run a query and parse the engine's table output.
    pub async fn query(&mut self, cypher: &str) -> IngestResult<Vec<QueryRow>> {
        if !matches!(self.state, ClientState::Ready | ClientState::Completed) {
            return Err(self.invalid_state("ready"));
        }
        let db = self.settings.db_path.clone();
        let output = self
            .run_command(&[OsStr::new("query"), OsStr::new(cypher), db.as_os_str()])
            .await?;
        output.check_exit()?;
        if let Some(reply) = find_reply(&output.stdout, "result") {
            let reply: ResultReply = serde_json::from_value(reply)?;
            if !reply.success {
                return Err(IngestError::Remote {
                    errors: reply.errors,
                });
            }
        }
        let rows = parse_query_table(&output.stdout);
        debug!(rows = rows.len(), "query complete");
        Ok(rows)
    }

    fn invalid_state(&self, expected: &'static str) -> IngestError {
        IngestError::InvalidState {
            expected,
            found: self.state.to_string(),
        }
    }

    fn begin_transfer(&mut self) -> IngestResult<()> {
        if !matches!(self.state, ClientState::Ready | ClientState::Completed) {
            return Err(self.invalid_state("ready"));
        }
        self.state = ClientState::Transferring;
        Ok(())
    }

    fn finish_transfer(&mut self, result: IngestResult<IngestStats>) -> IngestResult<IngestStats> {
        match &result {
            Ok(stats) => {
                self.state = ClientState::Completed;
                info!(
                    entities = stats.entities,
                    relationships = stats.relationships,
                    duration_ms = stats.duration,
                    "ingestion complete"
                );
            }
            Err(e) => {
                self.state = ClientState::Failed;
                warn!(error = %e, "ingestion failed");
            }
        }
        result
    }

    fn command(&self, args: &[&OsStr]) -> Command {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(&self.settings.args)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, mut cmd: Command) -> IngestResult<EngineProcess> {
        let child = cmd.spawn().map_err(|source| IngestError::Spawn {
            binary: self.settings.binary.display().to_string(),
            source,
        })?;
        Ok(EngineProcess::new(child))
    }

    /// Run a command with no stdin and collect its output.
    async fn run_command(&self, args: &[&OsStr]) -> IngestResult<EngineOutput> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::null());
        let mut process = self.spawn(cmd)?;
        let token = self.settings.cancel.clone();
        let waited = until_cancelled(token.as_ref(), process.wait()).await;
        let Some(output) = waited else {
            process.kill().await;
            return Err(IngestError::Cancelled);
        };
        output
    }

    async fn transfer_file(&self, data: &AnalysisData) -> IngestResult<IngestStats> {
        let mut payload = tempfile::Builder::new()
            .prefix("graphloom-")
            .suffix(".json")
            .tempfile()?;
        {
            let mut writer = BufWriter::new(payload.as_file_mut());
            serde_json::to_writer(&mut writer, data)?;
            writer.flush()?;
        }
        let path = payload.into_temp_path();
        debug!(payload = %path.display(), "wrote ingestion payload");

        let db = self.settings.db_path.clone();
        let result = self
            .run_command(&[OsStr::new("ingest"), path.as_os_str(), db.as_os_str()])
            .await
            .and_then(|output| {
                output.check_exit()?;
                parse_reply::<ResultReply>(&output.stdout, "result")?.into_stats()
            });

        if let Err(e) = path.close() {
            warn!(error = %e, "failed to remove ingestion payload");
        }
        result
    }

    async fn transfer_stream(&self, data: &AnalysisData) -> IngestResult<IngestStats> {
        let groups = group_relationships(&data.relationships);
        let plan = plan_stream(&data.entities, &groups, self.settings.batch_size);
        let frames = plan.iter().map(|envelope| envelope.encode());
        self.transfer_piped("ingest-stream", frames).await
    }

    async fn transfer_bulk(&self, data: &AnalysisData) -> IngestResult<IngestStats> {
        let groups = group_relationships(&data.relationships);
        let plan = plan_bulk(&data.entities, &groups, self.settings.batch_size);
        let frames = plan.iter().map(|frame| frame.encode());
        self.transfer_piped("ingest-bulk", frames).await
    }

    /// Spawn `<command> <db>` with piped stdin and feed it `frames`.
    async fn transfer_piped<I>(&self, command: &str, frames: I) -> IngestResult<IngestStats>
    where
        I: Iterator<Item = IngestResult<Vec<u8>>>,
    {
        let db = self.settings.db_path.clone();
        let mut cmd = self.command(&[OsStr::new(command), db.as_os_str()]);
        cmd.stdin(Stdio::piped());
        let mut process = self.spawn(cmd)?;
        let stdin = process.take_stdin()?;
        let token = self.settings.cancel.clone();

        let Some(written) = until_cancelled(token.as_ref(), write_frames(stdin, frames)).await else {
            process.kill().await;
            return Err(IngestError::Cancelled);
        };
        let waited = until_cancelled(token.as_ref(), process.wait()).await;
        let Some(output) = waited else {
            process.kill().await;
            return Err(IngestError::Cancelled);
        };
        let output = output?;
        output.check_exit()?;
        // Exit was clean, so a write error is the more specific failure.
        written?;
        parse_reply::<ResultReply>(&output.stdout, "result")?.into_stats()
    }
}

async fn write_frames<I>(stdin: ChildStdin, frames: I) -> IngestResult<()>
where
    I: Iterator<Item = IngestResult<Vec<u8>>>,
{
    let mut writer = FrameWriter::new(stdin);
    for frame in frames {
        writer.send(&frame?).await?;
    }
    let stats = writer.close().await?;
    debug!(
        frames = stats.frames,
        bytes = stats.bytes,
        stalls = stats.stalls,
        "finished writing engine input"
    );
    Ok(())
}

/// `None` when `token` fires before `fut` completes.
async fn until_cancelled<F: Future>(token: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match token {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = fut => Some(output),
        },
        None => Some(fut.await),
    }
}

struct EngineOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl EngineOutput {
    fn check_exit(&self) -> IngestResult<()> {
        if self.status.success() {
            Ok(())
        } else {
            Err(IngestError::NonZeroExit {
                code: self.status.code(),
                stderr: self.stderr.clone(),
            })
        }
    }
}

/// A running engine whose stdout and stderr are drained concurrently from
/// the moment it starts, so a full pipe can never block it.
struct EngineProcess {
    child: Child,
    stdout: Option<JoinHandle<std::io::Result<String>>>,
    stderr: Option<JoinHandle<std::io::Result<String>>>,
}

impl EngineProcess {
    fn new(mut child: Child) -> Self {
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        Self {
            child,
            stdout,
            stderr,
        }
    }

    fn take_stdin(&mut self) -> IngestResult<ChildStdin> {
        self.child.stdin.take().ok_or_else(|| {
            IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "graph engine stdin is not piped",
            ))
        })
    }

    async fn wait(&mut self) -> IngestResult<EngineOutput> {
        let status = self.child.wait().await?;
        let stdout = collect(self.stdout.take()).await?;
        let stderr = collect(self.stderr.take()).await?;
        debug!(status = %status, stdout_bytes = stdout.len(), stderr_bytes = stderr.len(), "graph engine exited");
        Ok(EngineOutput {
            status,
            stdout,
            stderr,
        })
    }

    async fn kill(&mut self) {
        warn!("cancelling ingestion, killing graph engine");
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill graph engine");
        }
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<std::io::Result<String>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

async fn collect(handle: Option<JoinHandle<std::io::Result<String>>>) -> IngestResult<String> {
    match handle {
        Some(handle) => Ok(handle.await.map_err(std::io::Error::other)??),
        None => Ok(String::new()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::graph::{Confidence, GraphEntity, GraphId, GraphKind, GraphRelationship, RelationshipType};
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};

    const ACK: &str = r#"echo 'engine v0.3 booting'; echo '{"type":"ack","ready":true,"version":"0.3.0"}'"#;
    const OK: &str = r#"echo 'loading...'; echo '{"type":"result","success":true,"stats":{"entities":3,"relationships":1,"duration":7}}'"#;

    /// Fake engine: a `/bin/sh` script with one `case` arm per command.
    fn engine(dir: &Path, arms: &[(&str, &str)]) -> IngestSettings {
        let mut script = String::from("case \"$1\" in\n");
        for (command, body) in arms {
            script.push_str(&format!("  {command}) {body} ;;\n"));
        }
        script.push_str("  *) echo \"unknown command $1\" >&2; exit 64 ;;\nesac\n");
        let path = dir.join("engine.sh");
        fs::write(&path, script).unwrap();
        IngestSettings::new("/bin/sh", dir.join("graph.db")).with_args([path])
    }

    fn sample(n: usize) -> AnalysisData {
        let entities: Vec<_> = (0..n)
            .map(|i| GraphEntity::new(GraphId::synthetic(format!("e{i}")), GraphKind::Function, format!("f{i}")))
            .collect();
        let relationships = vec![GraphRelationship::new(
            GraphId::synthetic("e0"),
            GraphId::synthetic("e1"),
            RelationshipType::Calls,
            "direct call",
            Confidence::High,
        )];
        AnalysisData {
            entities,
            relationships,
        }
    }

    async fn ready_client(settings: IngestSettings) -> IngestClient {
        let mut client = IngestClient::new(settings);
        client.initialize().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_handshake_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = IngestClient::new(engine(dir.path(), &[("handshake", ACK)]));
        assert_eq!(client.state(), ClientState::Uninitialized);
        let ack = client.initialize().await.unwrap();
        assert!(ack.ready);
        assert_eq!(client.engine_version(), Some("0.3.0"));
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[tokio::test]
    async fn test_handshake_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let settings = engine(
            dir.path(),
            &[("handshake", r#"echo '{"type":"ack","ready":false,"version":"0.3.0"}'"#)],
        );
        let mut client = IngestClient::new(settings);
        let err = client.initialize().await.unwrap_err();
        assert!(matches!(err, IngestError::NotReady));
        assert!(err.to_string().contains("not ready"));
        assert_eq!(client.state(), ClientState::Failed);

        let err = client.ingest(&sample(1), IngestMode::File).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_handshake_wrong_type_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let settings = engine(
            dir.path(),
            &[("handshake", r#"echo '{"type":"hello","ready":true}'"#)],
        );
        let err = IngestClient::new(settings).initialize().await.unwrap_err();
        assert!(matches!(err, IngestError::NotReady));
    }

    #[tokio::test]
    async fn test_transfer_requires_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = IngestClient::new(engine(dir.path(), &[("handshake", ACK)]));
        let err = client.ingest_stream(&sample(1)).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidState { .. }));
        assert_eq!(client.state(), ClientState::Uninitialized);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = IngestSettings::new(dir.path().join("no-such-engine"), dir.path().join("db"));
        let err = IngestClient::new(settings).initialize().await.unwrap_err();
        assert!(matches!(err, IngestError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_file_mode_cleans_up_payload() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen");
        let ingest = format!(
            "cp \"$2\" '{}'; echo \"$2\" >> '{}'; {OK}",
            dir.path().join("payload.json").display(),
            seen.display()
        );
        let mut client = ready_client(engine(dir.path(), &[("handshake", ACK), ("ingest", &ingest)])).await;

        let data = sample(3);
        let stats = client.ingest_file(&data).await.unwrap();
        assert_eq!(stats.entities, 3);
        assert_eq!(client.state(), ClientState::Completed);

        let payload: AnalysisData =
            serde_json::from_str(&fs::read_to_string(dir.path().join("payload.json")).unwrap()).unwrap();
        assert_eq!(payload, data);
        let temp_path = fs::read_to_string(&seen).unwrap();
        assert!(!Path::new(temp_path.trim()).exists());

        // Completed clients may transfer again.
        client.ingest(&data, IngestMode::Auto).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_mode_cleans_up_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen");
        let ingest = format!(
            "echo \"$2\" > '{}'; echo 'constraint violation' >&2; exit 3",
            seen.display()
        );
        let mut client = ready_client(engine(dir.path(), &[("handshake", ACK), ("ingest", &ingest)])).await;

        let err = client.ingest_file(&sample(2)).await.unwrap_err();
        match err {
            IngestError::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("constraint violation"));
            }
            other => panic!("expected non-zero exit, got {other:?}"),
        }
        assert_eq!(client.state(), ClientState::Failed);
        let temp_path = fs::read_to_string(&seen).unwrap();
        assert!(!Path::new(temp_path.trim()).exists());
    }

    #[tokio::test]
    async fn test_protocol_parse_failure_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = ready_client(engine(
            dir.path(),
            &[("handshake", ACK), ("ingest", "echo 'done, probably'")],
        ))
        .await;
        match client.ingest_file(&sample(1)).await.unwrap_err() {
            IngestError::ProtocolParse { expected, raw } => {
                assert_eq!(expected, "result");
                assert!(raw.contains("done, probably"));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = ready_client(engine(
            dir.path(),
            &[
                ("handshake", ACK),
                ("ingest", r#"echo '{"type":"result","success":false,"errors":["schema mismatch"]}'"#),
            ],
        ))
        .await;
        match client.ingest_file(&sample(1)).await.unwrap_err() {
            IngestError::Remote { errors } => assert_eq!(errors, vec!["schema mismatch"]),
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_mode_batches() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("stdin.ndjson");
        let ingest = format!("cat > '{}'; {OK}", capture.display());
        let settings = engine(dir.path(), &[("handshake", ACK), ("ingest-stream", &ingest)]);
        let mut client = ready_client(settings).await;

        client.ingest_stream(&sample(1200)).await.unwrap();

        let received = fs::read_to_string(&capture).unwrap();
        let frames: Vec<Value> = received
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let types: Vec<_> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["entities", "entities", "entities", "relationships", "complete"]);
        let sizes: Vec<_> = frames[..3]
            .iter()
            .map(|f| f["data"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![500, 500, 200]);
        assert_eq!(frames[3]["relationshipType"], "CALLS");
    }

    #[tokio::test]
    async fn test_bulk_mode_csv() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("stdin.csv");
        let ingest = format!("cat > '{}'; {OK}", capture.display());
        let settings = engine(dir.path(), &[("handshake", ACK), ("ingest-bulk", &ingest)]);
        let mut client = ready_client(settings).await;

        let mut data = sample(2);
        data.entities[0].text = "foo,\"bar\"".into();
        client.ingest_bulk(&data).await.unwrap();

        let received = fs::read_to_string(&capture).unwrap();
        let lines: Vec<_> = received.lines().collect();
        assert_eq!(lines[0], "ENTITIES_START");
        assert!(lines[2].contains("\"foo,\"\"bar\"\"\""));
        assert_eq!(lines[4], "RELATIONSHIPS_CALLS_START");
        assert_eq!(lines.last(), Some(&"COMPLETE"));
    }

    #[tokio::test]
    async fn test_stream_mode_engine_crash() {
        let dir = tempfile::tempdir().unwrap();
        let settings = engine(
            dir.path(),
            &[("handshake", ACK), ("ingest-stream", "echo 'out of memory' >&2; exit 137")],
        );
        let mut client = ready_client(settings.with_batch_size(10)).await;
        match client.ingest_stream(&sample(5000)).await.unwrap_err() {
            IngestError::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(137));
                assert!(stderr.contains("out of memory"));
            }
            other => panic!("expected non-zero exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let settings = engine(dir.path(), &[("handshake", ACK), ("ingest", "exec sleep 30")])
            .with_cancellation(token.clone());
        let mut client = ready_client(settings).await;

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let started = Instant::now();
        let err = client.ingest_file(&sample(1)).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, IngestError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn test_stream_cancellation_while_engine_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let settings = engine(dir.path(), &[("handshake", ACK), ("ingest-stream", "exec sleep 30")])
            .with_cancellation(token.clone());
        let mut client = ready_client(settings).await;

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });
        let started = Instant::now();
        // Far more than a pipe buffer, so the first batch write parks.
        let err = client.ingest_stream(&sample(20_000)).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, IngestError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn test_output_drained_while_input_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("stdin.ndjson");
        // 128 KiB on each output pipe before the engine reads a byte.
        let ingest = format!(
            "head -c 131072 /dev/zero | tr '\\0' x; echo; \
             head -c 131072 /dev/zero | tr '\\0' y >&2; \
             cat > '{}'; {OK}",
            capture.display()
        );
        let settings = engine(dir.path(), &[("handshake", ACK), ("ingest-stream", &ingest)]);
        let mut client = ready_client(settings).await;

        let stats = tokio::time::timeout(Duration::from_secs(30), client.ingest_stream(&sample(5000)))
            .await
            .expect("transfer deadlocked")
            .unwrap();
        assert_eq!(stats.entities, 3);
        assert_eq!(client.state(), ClientState::Completed);

        let received = fs::read_to_string(&capture).unwrap();
        assert_eq!(received.lines().count(), 12);
        assert_eq!(received.lines().last(), Some(r#"{"type":"complete"}"#));
    }

    #[tokio::test]
    async fn test_query_table() {
        let dir = tempfile::tempdir().unwrap();
        let query = r#"echo "running: $2"; echo '| name | calls |'; echo '|------|-------|'; echo '| foo  | 3     |'"#;
        let mut client = ready_client(engine(dir.path(), &[("handshake", ACK), ("query", query)])).await;
        let rows = client.query("MATCH (n) RETURN n.name AS name").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "foo");
        assert_eq!(rows[0]["calls"], 3);
    }

    #[test]
    fn test_auto_mode_thresholds() {
        assert_eq!(IngestMode::Auto.resolve(0), IngestMode::File);
        assert_eq!(IngestMode::Auto.resolve(999), IngestMode::File);
        assert_eq!(IngestMode::Auto.resolve(1_000), IngestMode::Stream);
        assert_eq!(IngestMode::Auto.resolve(49_999), IngestMode::Stream);
        assert_eq!(IngestMode::Auto.resolve(50_000), IngestMode::Bulk);
        assert_eq!(IngestMode::Bulk.resolve(1), IngestMode::Bulk);
        assert_eq!("STREAM".parse::<IngestMode>().unwrap(), IngestMode::Stream);
        assert!("tcp".parse::<IngestMode>().is_err());
    }
}

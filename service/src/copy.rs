use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use domain::error::{Error, Result};
use domain::model::entity::{Copy, CopyState, CopyStatus};
use domain::model::vo::{CopyMode, CopyRequest};
use domain::service::{FileAccess, WriteMode};
use infrastructure::sync::Latch;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Serialized transfer engine for one file-access root.
///
/// All asynchronous requests funnel through a single worker task in strict
/// FIFO order; at most one copy makes progress at any instant. Callers poll
/// progress through [`CopyEngine::status`] and cancel cooperatively through
/// [`CopyEngine::cancel`].
pub struct CopyEngine {
    access: Arc<dyn FileAccess>,
    block_size: usize,
    state: Arc<Mutex<EngineState>>,
    tx: flume::Sender<String>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct EngineState {
    pending: HashMap<String, Arc<CopyEntry>>,
    running: Option<Arc<CopyEntry>>,
    finished: HashMap<String, Arc<CopyEntry>>,
}

struct CopyEntry {
    copy: Copy,
    request: CopyRequest,
    bytes_to_copy: AtomicU64,
    bytes_copied: AtomicU64,
    cancel: CancellationToken,
    done: Latch,
    error: Mutex<Option<Error>>,
}

impl CopyEntry {
    fn new(id: String, request: CopyRequest) -> Arc<Self> {
        Arc::new(Self {
            copy: Copy::new(id),
            request,
            bytes_to_copy: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            done: Latch::default(),
            error: Mutex::new(None),
        })
    }

    fn snapshot(&self, state: CopyState) -> CopyStatus {
        CopyStatus {
            copy: self.copy.clone(),
            state,
            bytes_to_copy: self.bytes_to_copy.load(Ordering::Acquire),
            bytes_copied: self.bytes_copied.load(Ordering::Acquire),
            error: self.error.lock().unwrap().clone(),
        }
    }

    fn finish(&self, result: Result<()>) {
        *self.error.lock().unwrap() = result.err();
        self.done.release();
    }
}

impl CopyEngine {
    pub fn new(access: Arc<dyn FileAccess>, block_size: usize) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();
        let state = Arc::new(Mutex::new(EngineState::default()));
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_worker(
            rx,
            state.clone(),
            access.clone(),
            block_size,
            shutdown.clone(),
        ));

        Arc::new(Self {
            access,
            block_size,
            state,
            tx,
            next_id: AtomicU64::new(1),
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Root of the file access this engine serializes transfers for.
    pub fn root(&self) -> &str {
        self.access.root()
    }

    /// Unique id within this engine instance.
    pub fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }

    /// Accepts one transfer request.
    ///
    /// Asynchronous requests join the FIFO queue and return immediately;
    /// synchronous requests run on the calling task and block until done.
    /// Either way the outcome is reported through [`CopyEngine::status`].
    pub async fn copy(&self, request: CopyRequest) -> Result<Copy> {
        if self.shutdown.is_cancelled() {
            return Err(Error::NotConnected("copy engine is closed".to_owned()));
        }

        let id = self.next_id("COPY-");
        let entry = CopyEntry::new(id.clone(), request);
        let copy = entry.copy.clone();

        if entry.request.asynchronous {
            self.state.lock().unwrap().pending.insert(id.clone(), entry);
            // A close racing this insert may already have drained the queue,
            // in which case the worker will never see the entry. Re-check the
            // token after inserting and settle the entry here.
            if self.tx.send(id.clone()).is_err() || self.shutdown.is_cancelled() {
                let mut state = self.state.lock().unwrap();
                if let Some(entry) = state.pending.remove(&id) {
                    entry.finish(Err(Error::Killed("copy".to_owned())));
                    state.finished.insert(id, entry);
                }
                return Err(Error::NotConnected("copy engine is closed".to_owned()));
            }
            return Ok(copy);
        }

        tracing::debug!(copy = %id, "running synchronous transfer");
        let result = execute(&*self.access, &entry, self.block_size, &self.shutdown).await;
        entry.finish(result);
        self.state.lock().unwrap().finished.insert(id, entry);
        Ok(copy)
    }

    /// Status snapshot for one copy.
    ///
    /// Querying a finished copy reaps its record: a second query for the same
    /// id fails with `NoSuchCopy`. Records of copies that are never queried
    /// are retained for the engine's lifetime.
    pub fn status(&self, copy: &Copy) -> Result<CopyStatus> {
        let mut state = self.state.lock().unwrap();

        if let Some(entry) = state.pending.get(&copy.id) {
            return Ok(entry.snapshot(CopyState::Pending));
        }
        if let Some(entry) = state.running.as_ref().filter(|e| e.copy.id == copy.id) {
            return Ok(entry.snapshot(CopyState::Running));
        }
        if let Some(entry) = state.finished.remove(&copy.id) {
            return Ok(entry.snapshot(CopyState::Done));
        }

        Err(Error::NoSuchCopy(copy.id.clone()))
    }

    /// Cancels a copy.
    ///
    /// A pending copy is removed from the queue without ever starting. For a
    /// running copy this blocks until the worker has observed the flag and
    /// finalized the transfer, so the returned status is always settled.
    pub async fn cancel(&self, copy: &Copy) -> Result<CopyStatus> {
        let running = {
            let mut state = self.state.lock().unwrap();

            if let Some(entry) = state.pending.remove(&copy.id) {
                tracing::debug!(copy = %copy.id, "cancelled pending transfer");
                entry.finish(Err(Error::Killed("copy".to_owned())));
                let status = entry.snapshot(CopyState::Done);
                state.finished.insert(copy.id.clone(), entry);
                return Ok(status);
            }

            match state.running.as_ref().filter(|e| e.copy.id == copy.id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry.clone()
                }
                None => {
                    return match state.finished.get(&copy.id) {
                        Some(entry) => Ok(entry.snapshot(CopyState::Done)),
                        None => Err(Error::NoSuchCopy(copy.id.clone())),
                    };
                }
            }
        };

        tracing::debug!(copy = %copy.id, "waiting for running transfer to stop");
        running.done.wait().await;
        Ok(running.snapshot(CopyState::Done))
    }

    /// Stops the worker. The in-flight copy, if any, is finalized as killed;
    /// copies still pending are failed without starting.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

async fn run_worker(
    rx: flume::Receiver<String>,
    state: Arc<Mutex<EngineState>>,
    access: Arc<dyn FileAccess>,
    block_size: usize,
    shutdown: CancellationToken,
) {
    loop {
        let id = tokio::select! {
            msg = rx.recv_async() => match msg {
                Ok(id) => id,
                Err(_) => break,
            },
            _ = shutdown.cancelled() => break,
        };

        // Cancelled while pending: already moved to finished.
        let Some(entry) = ({
            let mut state = state.lock().unwrap();
            let entry = state.pending.remove(&id);
            state.running = entry.clone();
            entry
        }) else {
            continue;
        };

        tracing::debug!(copy = %id, "starting transfer");
        let result = execute(&*access, &entry, block_size, &shutdown).await;
        if let Err(e) = &result {
            tracing::warn!(copy = %id, "transfer failed: {e}");
        }

        let mut state = state.lock().unwrap();
        state.running = None;
        entry.finish(result);
        state.finished.insert(id, entry);
    }

    // Engine shut down: fail whatever never got to run.
    let mut state = state.lock().unwrap();
    if let Some(entry) = state.running.take() {
        entry.finish(Err(Error::Killed("copy".to_owned())));
        state.finished.insert(entry.copy.id.clone(), entry);
    }
    let pending: Vec<_> = state.pending.drain().collect();
    for (id, entry) in pending {
        entry.finish(Err(Error::Killed("copy".to_owned())));
        state.finished.insert(id, entry);
    }
}

fn check_cancelled(entry: &CopyEntry, shutdown: &CancellationToken) -> Result<()> {
    if entry.cancel.is_cancelled() || shutdown.is_cancelled() {
        Err(Error::Killed("copy".to_owned()))
    } else {
        Ok(())
    }
}

async fn execute(
    access: &dyn FileAccess,
    entry: &CopyEntry,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    check_cancelled(entry, shutdown)?;

    let source = access.resolve(&entry.request.source);
    let target = access.resolve(&entry.request.target);

    match entry.request.mode {
        CopyMode::Create | CopyMode::Replace | CopyMode::Ignore => {
            copy_fresh(access, entry, &source, &target, block_size, shutdown).await
        }
        CopyMode::Append => copy_append(access, entry, &source, &target, block_size, shutdown).await,
        CopyMode::Resume => copy_resume(access, entry, &source, &target, block_size, shutdown).await,
    }
}

async fn copy_fresh(
    access: &dyn FileAccess,
    entry: &CopyEntry,
    source: &Path,
    target: &Path,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    let attrs = source_attributes(access, source).await?;
    if attrs.is_directory {
        return Err(Error::NoSuchPath(format!(
            "{} is a directory",
            source.display()
        )));
    }

    if source == target {
        return Ok(());
    }

    if access.exists(target).await? {
        match entry.request.mode {
            CopyMode::Ignore => return Ok(()),
            CopyMode::Replace => {}
            _ => return Err(Error::PathAlreadyExists(display(target))),
        }
    }

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !access.exists(parent).await? {
            return Err(Error::NoSuchPath(display(parent)));
        }
    }

    entry.bytes_to_copy.store(attrs.size, Ordering::Release);
    let reader = access.open_read(source, 0).await?;
    let writer = access.open_write(target, WriteMode::Truncate).await?;
    stream(entry, reader, writer, block_size, shutdown).await
}

async fn copy_append(
    access: &dyn FileAccess,
    entry: &CopyEntry,
    source: &Path,
    target: &Path,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    let attrs = source_attributes(access, source).await?;
    if attrs.is_directory {
        return Err(Error::IllegalSourcePath(format!(
            "{} is a directory",
            source.display()
        )));
    }

    if source == target {
        return Err(Error::IllegalTargetPath(format!(
            "cannot append {} to itself",
            target.display()
        )));
    }

    if !access.exists(target).await? {
        return Err(Error::NoSuchPath(display(target)));
    }
    if access.attributes(target).await?.is_directory {
        return Err(Error::IllegalTargetPath(format!(
            "{} is a directory",
            target.display()
        )));
    }

    entry.bytes_to_copy.store(attrs.size, Ordering::Release);
    let reader = access.open_read(source, 0).await?;
    let writer = access.open_write(target, WriteMode::Append).await?;
    stream(entry, reader, writer, block_size, shutdown).await
}

async fn copy_resume(
    access: &dyn FileAccess,
    entry: &CopyEntry,
    source: &Path,
    target: &Path,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    let src_attrs = source_attributes(access, source).await?;
    if src_attrs.is_directory || src_attrs.is_symlink {
        return Err(Error::IllegalSourcePath(format!(
            "cannot resume from a directory or link: {}",
            source.display()
        )));
    }

    if source == target {
        return Ok(());
    }

    if !access.exists(target).await? {
        return Err(Error::NoSuchPath(display(target)));
    }
    let dst_attrs = access.attributes(target).await?;
    if dst_attrs.is_directory || dst_attrs.is_symlink {
        return Err(Error::IllegalTargetPath(format!(
            "cannot resume onto a directory or link: {}",
            target.display()
        )));
    }

    // A target longer than the source cannot be a prefix of it.
    if dst_attrs.size > src_attrs.size {
        return Err(Error::InvalidResumeTarget(format!(
            "{} is larger than {}",
            target.display(),
            source.display()
        )));
    }

    if entry.request.verify {
        verify_prefix(access, entry, source, target, dst_attrs.size, block_size, shutdown).await?;
    }

    if dst_attrs.size == src_attrs.size {
        return Ok(());
    }

    entry
        .bytes_to_copy
        .store(src_attrs.size - dst_attrs.size, Ordering::Release);
    let reader = access.open_read(source, dst_attrs.size).await?;
    let writer = access.open_write(target, WriteMode::Append).await?;
    stream(entry, reader, writer, block_size, shutdown).await
}

/// Byte-compares the target's full content against the head of the source.
async fn verify_prefix(
    access: &dyn FileAccess,
    entry: &CopyEntry,
    source: &Path,
    target: &Path,
    prefix_len: u64,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut src = access.open_read(source, 0).await?;
    let mut dst = access.open_read(target, 0).await?;

    let mut src_buf = vec![0u8; block_size];
    let mut dst_buf = vec![0u8; block_size];
    let mut remaining = prefix_len;

    while remaining > 0 {
        check_cancelled(entry, shutdown)?;

        let want = remaining.min(block_size as u64) as usize;
        src.read_exact(&mut src_buf[..want]).await.map_err(|_| {
            Error::InvalidResumeTarget(format!("{} ends before {}", source.display(), target.display()))
        })?;
        dst.read_exact(&mut dst_buf[..want]).await?;

        if src_buf[..want] != dst_buf[..want] {
            return Err(Error::InvalidResumeTarget(format!(
                "{} is not a prefix of {}",
                target.display(),
                source.display()
            )));
        }

        remaining -= want as u64;
    }

    Ok(())
}

async fn stream(
    entry: &CopyEntry,
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    mut writer: Box<dyn tokio::io::AsyncWrite + Send + Unpin>,
    block_size: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; block_size];

    loop {
        check_cancelled(entry, shutdown)?;

        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        entry.bytes_copied.fetch_add(n as u64, Ordering::AcqRel);
    }

    writer.shutdown().await?;
    Ok(())
}

async fn source_attributes(
    access: &dyn FileAccess,
    source: &Path,
) -> Result<domain::service::FileAttributes> {
    if !access.exists(source).await? {
        return Err(Error::NoSuchPath(display(source)));
    }
    access.attributes(source).await
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use domain::service::FileAttributes;
    use tokio::io::AsyncWrite;

    use super::*;

    /// In-memory file tree; enough of `FileAccess` to drive the engine.
    #[derive(Default)]
    struct MemAccess {
        files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
        dirs: Mutex<HashSet<PathBuf>>,
        slow_reads: bool,
    }

    impl MemAccess {
        fn with_file(self, path: &str, content: &[u8]) -> Self {
            self.files.lock().unwrap().insert(PathBuf::from(path), content.to_vec());
            self
        }

        /// Trickle reads a few bytes at a time so a transfer stays observable
        /// in `Running` long enough to race status and cancel calls against.
        fn with_slow_reads(mut self) -> Self {
            self.slow_reads = true;
            self
        }

        fn with_dir(self, path: &str) -> Self {
            self.dirs.lock().unwrap().insert(PathBuf::from(path));
            self
        }

        fn content(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(&PathBuf::from(path)).cloned()
        }
    }

    struct SlowReader {
        data: Vec<u8>,
        pos: usize,
        sleep: Option<Pin<Box<tokio::time::Sleep>>>,
    }

    impl AsyncRead for SlowReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if let Some(sleep) = self.sleep.as_mut() {
                match sleep.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(()) => self.sleep = None,
                }
            }
            if self.pos >= self.data.len() {
                return Poll::Ready(Ok(()));
            }
            let n = buf.remaining().min(self.data.len() - self.pos).min(4);
            let pos = self.pos;
            buf.put_slice(&self.data[pos..pos + n]);
            self.pos += n;
            self.sleep = Some(Box::pin(tokio::time::sleep(Duration::from_millis(10))));
            Poll::Ready(Ok(()))
        }
    }

    struct MemWriter {
        files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
        path: PathBuf,
    }

    impl AsyncWrite for MemWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let mut files = self.files.lock().unwrap();
            files.entry(self.path.clone()).or_default().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait::async_trait]
    impl FileAccess for MemAccess {
        fn root(&self) -> &str {
            "mem://"
        }

        fn resolve(&self, path: &Path) -> PathBuf {
            path.to_path_buf()
        }

        async fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path)
                || self.dirs.lock().unwrap().contains(path)
                || path == Path::new("/"))
        }

        async fn attributes(&self, path: &Path) -> Result<FileAttributes> {
            if self.dirs.lock().unwrap().contains(path) || path == Path::new("/") {
                return Ok(FileAttributes {
                    is_directory: true,
                    is_symlink: false,
                    size: 0,
                });
            }
            match self.files.lock().unwrap().get(path) {
                Some(data) => Ok(FileAttributes {
                    is_directory: false,
                    is_symlink: false,
                    size: data.len() as u64,
                }),
                None => Err(Error::NoSuchPath(path.display().to_string())),
            }
        }

        async fn open_read(
            &self,
            path: &Path,
            offset: u64,
        ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
            let data = self
                .files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::NoSuchPath(path.display().to_string()))?;
            let data = data[offset as usize..].to_vec();
            if self.slow_reads {
                return Ok(Box::new(SlowReader {
                    data,
                    pos: 0,
                    sleep: None,
                }));
            }
            Ok(Box::new(Cursor::new(data)))
        }

        async fn open_write(
            &self,
            path: &Path,
            mode: WriteMode,
        ) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
            let mut files = self.files.lock().unwrap();
            match mode {
                WriteMode::Truncate => {
                    files.insert(path.to_path_buf(), Vec::new());
                }
                WriteMode::CreateNew => {
                    if files.contains_key(path) {
                        return Err(Error::PathAlreadyExists(path.display().to_string()));
                    }
                    files.insert(path.to_path_buf(), Vec::new());
                }
                WriteMode::Append => {
                    if !files.contains_key(path) {
                        return Err(Error::NoSuchPath(path.display().to_string()));
                    }
                }
            }
            Ok(Box::new(MemWriter {
                files: self.files.clone(),
                path: path.to_path_buf(),
            }))
        }
    }

    fn engine(access: MemAccess) -> (Arc<CopyEngine>, Arc<MemAccess>) {
        let access = Arc::new(access);
        (CopyEngine::new(access.clone(), 8), access)
    }

    fn request(source: &str, target: &str, mode: CopyMode) -> CopyRequest {
        CopyRequest::builder().source(source).target(target).mode(mode).build()
    }

    async fn run(engine: &CopyEngine, request: CopyRequest) -> CopyStatus {
        let copy = engine.copy(request).await.unwrap();
        engine.status(&copy).unwrap()
    }

    #[tokio::test]
    async fn create_copies_bytes_and_reports_progress() {
        let (engine, access) = engine(MemAccess::default().with_file("/src", b"hello world"));

        let status = run(&engine, request("/src", "/dst", CopyMode::Create)).await;
        assert!(status.is_done());
        assert!(!status.has_error());
        assert_eq!(status.bytes_to_copy, 11);
        assert_eq!(status.bytes_copied, 11);
        assert_eq!(access.content("/dst").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn create_fails_on_existing_target() {
        let (engine, _) = engine(
            MemAccess::default().with_file("/src", b"new").with_file("/dst", b"old"),
        );

        let status = run(&engine, request("/src", "/dst", CopyMode::Create)).await;
        assert!(matches!(status.error, Some(Error::PathAlreadyExists(_))));
    }

    #[tokio::test]
    async fn create_fails_on_missing_source_or_parent() {
        let (engine, _) = engine(MemAccess::default().with_file("/src", b"x"));

        let status = run(&engine, request("/missing", "/dst", CopyMode::Create)).await;
        assert!(matches!(status.error, Some(Error::NoSuchPath(_))));

        let status = run(&engine, request("/src", "/nodir/dst", CopyMode::Create)).await;
        assert!(matches!(status.error, Some(Error::NoSuchPath(_))));
    }

    #[tokio::test]
    async fn directory_source_is_rejected() {
        let (engine, _) = engine(MemAccess::default().with_dir("/srcdir"));

        let status = run(&engine, request("/srcdir", "/dst", CopyMode::Create)).await;
        assert!(matches!(status.error, Some(Error::NoSuchPath(_))));
    }

    #[tokio::test]
    async fn replace_truncates_existing_target() {
        let (engine, access) = engine(
            MemAccess::default()
                .with_file("/src", b"short")
                .with_file("/dst", b"something much longer"),
        );

        let status = run(&engine, request("/src", "/dst", CopyMode::Replace)).await;
        assert!(!status.has_error());
        assert_eq!(access.content("/dst").unwrap(), b"short");
    }

    #[tokio::test]
    async fn ignore_is_idempotent_on_existing_target() {
        let (engine, access) = engine(
            MemAccess::default().with_file("/src", b"new").with_file("/dst", b"old"),
        );

        for _ in 0..2 {
            let status = run(&engine, request("/src", "/dst", CopyMode::Ignore)).await;
            assert!(!status.has_error());
            assert_eq!(access.content("/dst").unwrap(), b"old");
        }
    }

    #[tokio::test]
    async fn self_copy_is_a_noop() {
        let (engine, access) = engine(MemAccess::default().with_file("/src", b"data"));

        let status = run(&engine, request("/src", "/src", CopyMode::Create)).await;
        assert!(!status.has_error());
        assert_eq!(status.bytes_copied, 0);
        assert_eq!(access.content("/src").unwrap(), b"data");
    }

    #[tokio::test]
    async fn append_adds_source_to_target() {
        let (engine, access) = engine(
            MemAccess::default().with_file("/src", b" world").with_file("/dst", b"hello"),
        );

        let status = run(&engine, request("/src", "/dst", CopyMode::Append)).await;
        assert!(!status.has_error());
        assert_eq!(access.content("/dst").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn append_rejects_self_and_missing_target() {
        let (engine, _) = engine(MemAccess::default().with_file("/src", b"x"));

        let status = run(&engine, request("/src", "/src", CopyMode::Append)).await;
        assert!(matches!(status.error, Some(Error::IllegalTargetPath(_))));

        let status = run(&engine, request("/src", "/dst", CopyMode::Append)).await;
        assert!(matches!(status.error, Some(Error::NoSuchPath(_))));
    }

    #[tokio::test]
    async fn resume_completes_a_partial_copy() {
        let (engine, access) = engine(
            MemAccess::default()
                .with_file("/src", b"0123456789abcdef0123456789")
                .with_file("/dst", b"0123456789abc"),
        );

        let status = run(
            &engine,
            CopyRequest::builder()
                .source("/src")
                .target("/dst")
                .mode(CopyMode::Resume)
                .verify(true)
                .build(),
        )
        .await;
        assert!(!status.has_error());
        assert_eq!(status.bytes_to_copy, 13);
        assert_eq!(access.content("/dst").unwrap(), b"0123456789abcdef0123456789");
    }

    #[tokio::test]
    async fn resume_with_diverging_prefix_fails_and_leaves_target() {
        let (engine, access) = engine(
            MemAccess::default()
                .with_file("/src", b"0123456789abcdef")
                .with_file("/dst", b"0123456789XXX"),
        );

        let status = run(
            &engine,
            CopyRequest::builder()
                .source("/src")
                .target("/dst")
                .mode(CopyMode::Resume)
                .verify(true)
                .build(),
        )
        .await;
        assert!(matches!(status.error, Some(Error::InvalidResumeTarget(_))));
        assert_eq!(access.content("/dst").unwrap(), b"0123456789XXX");
    }

    #[tokio::test]
    async fn resume_rejects_oversized_target() {
        let (engine, _) = engine(
            MemAccess::default().with_file("/src", b"abc").with_file("/dst", b"abcdef"),
        );

        let status = run(&engine, request("/src", "/dst", CopyMode::Resume)).await;
        assert!(matches!(status.error, Some(Error::InvalidResumeTarget(_))));
    }

    #[tokio::test]
    async fn resume_of_complete_target_is_a_noop() {
        let (engine, access) = engine(
            MemAccess::default().with_file("/src", b"abcdef").with_file("/dst", b"abcdef"),
        );

        let status = run(
            &engine,
            CopyRequest::builder()
                .source("/src")
                .target("/dst")
                .mode(CopyMode::Resume)
                .verify(true)
                .build(),
        )
        .await;
        assert!(!status.has_error());
        assert_eq!(status.bytes_copied, 0);
        assert_eq!(access.content("/dst").unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn async_copies_run_in_submission_order() {
        let (engine, access) = engine(
            MemAccess::default().with_file("/a", b"first").with_file("/b", b"second"),
        );

        let c1 = engine
            .copy(
                CopyRequest::builder()
                    .source("/a")
                    .target("/out")
                    .mode(CopyMode::Create)
                    .asynchronous(true)
                    .build(),
            )
            .await
            .unwrap();
        let c2 = engine
            .copy(
                CopyRequest::builder()
                    .source("/b")
                    .target("/out")
                    .mode(CopyMode::Append)
                    .asynchronous(true)
                    .build(),
            )
            .await
            .unwrap();

        for copy in [&c1, &c2] {
            for _ in 0..200 {
                match engine.status(copy) {
                    Ok(status) if status.is_done() => break,
                    Ok(_) => tokio::time::sleep(Duration::from_millis(5)).await,
                    Err(_) => break,
                }
            }
        }

        // Append after create proves the FIFO order held.
        assert_eq!(access.content("/out").unwrap(), b"firstsecond");
    }

    #[tokio::test]
    async fn cancelling_a_running_copy_settles_it_as_killed() {
        let (engine, access) = engine(
            MemAccess::default().with_file("/src", &[7u8; 256]).with_slow_reads(),
        );

        let copy = engine
            .copy(
                CopyRequest::builder()
                    .source("/src")
                    .target("/dst")
                    .mode(CopyMode::Create)
                    .asynchronous(true)
                    .build(),
            )
            .await
            .unwrap();

        for _ in 0..200 {
            let status = engine.status(&copy).unwrap();
            if status.state == CopyState::Running && status.bytes_copied > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = engine.cancel(&copy).await.unwrap();
        assert_eq!(status.state, CopyState::Done);
        assert!(matches!(status.error, Some(Error::Killed(_))));
        assert!(status.bytes_copied < 256);

        // Settled means settled: the target must not grow after cancel returns.
        let size = access.content("/dst").map(|data| data.len()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(access.content("/dst").map(|data| data.len()).unwrap_or(0), size);
    }

    #[tokio::test]
    async fn status_reaps_finished_copies() {
        let (engine, _) = engine(MemAccess::default().with_file("/src", b"x"));

        let copy = engine.copy(request("/src", "/dst", CopyMode::Create)).await.unwrap();
        assert!(engine.status(&copy).is_ok());
        assert!(matches!(engine.status(&copy), Err(Error::NoSuchCopy(_))));
    }

    #[tokio::test]
    async fn unknown_copy_id_is_an_error() {
        let (engine, _) = engine(MemAccess::default());

        let ghost = Copy::new("COPY-999");
        assert!(matches!(engine.status(&ghost), Err(Error::NoSuchCopy(_))));
        assert!(matches!(
            engine.cancel(&ghost).await,
            Err(Error::NoSuchCopy(_))
        ));
    }

    #[tokio::test]
    async fn next_id_is_unique_and_prefixed() {
        let (engine, _) = engine(MemAccess::default());

        let a = engine.next_id("COPY-");
        let b = engine.next_id("COPY-");
        assert!(a.starts_with("COPY-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn copy_after_close_is_rejected() {
        let (engine, access) = engine(MemAccess::default().with_file("/src", b"x"));

        engine.close().await;
        assert!(engine
            .copy(request("/src", "/dst", CopyMode::Create))
            .await
            .is_err());
        assert!(access.content("/dst").is_none());
    }

    #[tokio::test]
    async fn close_settles_every_queued_copy() {
        let access = MemAccess::default()
            .with_file("/src", &[7u8; 256])
            .with_slow_reads();
        let (engine, _) = engine(access);

        let mut copies = Vec::new();
        for i in 0..3 {
            let mut req = request("/src", &format!("/dst{i}"), CopyMode::Create);
            req.asynchronous = true;
            copies.push(engine.copy(req).await.unwrap());
        }

        engine.close().await;

        // Nothing may stay pending: every accepted copy ends Done, the ones
        // that never ran (or were cut short) carrying the kill.
        for copy in &copies {
            let status = engine.status(copy).unwrap();
            assert_eq!(status.state, CopyState::Done);
            assert!(matches!(status.error, Some(Error::Killed(_))));
        }
    }
}

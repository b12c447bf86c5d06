//! tracing subscriber setup and scoped per-thread log redirection.
//!
//! The fmt layer writes through `RoutingMakeWriter`: events go to the file installed by the
//! emitting thread's `LogRedirect`, or to stderr when none is installed. Redirection is
//! thread-scoped, so fleet workers never see each other's sinks.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

thread_local! {
    static SINK: RefCell<Option<Sink>> = const { RefCell::new(None) };
}

#[derive(Clone)]
struct Sink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

fn filter_directive(verbose: bool) -> String {
    ["FLEET_CODER_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string())
}

/// Install the global subscriber once. Later calls are no-ops.
pub fn telemetry_init(verbose: bool) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::new(filter_directive(verbose));
        let res = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(RoutingMakeWriter)
            .with_ansi(false)
            .with_target(true)
            .try_init();
        if res.is_err() {
            eprintln!("fleet-coder: telemetry init skipped (global subscriber already set)");
        }
    });
}

/// `MakeWriter` that consults the calling thread's redirect.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingMakeWriter;

pub enum RoutedWriter {
    File(Arc<Mutex<File>>),
    Stderr(io::Stderr),
}

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RoutedWriter::File(f) => match f.lock() {
                Ok(mut g) => g.write(buf),
                Err(poisoned) => poisoned.into_inner().write(buf),
            },
            RoutedWriter::Stderr(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RoutedWriter::File(f) => match f.lock() {
                Ok(mut g) => g.flush(),
                Err(poisoned) => poisoned.into_inner().flush(),
            },
            RoutedWriter::Stderr(e) => e.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for RoutingMakeWriter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SINK.with(|s| match s.borrow().as_ref() {
            Some(sink) => RoutedWriter::File(sink.file.clone()),
            None => RoutedWriter::Stderr(io::stderr()),
        })
    }
}

/// Routes this thread's tracing output to a file until dropped, then restores the
/// previous destination. Not `Send`: the guard must be dropped on the thread that made it.
pub struct LogRedirect {
    previous: Option<Sink>,
    _thread_bound: PhantomData<*const ()>,
}

impl LogRedirect {
    pub fn to_file(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let sink = Sink {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        };
        let previous = SINK.with(|s| s.borrow_mut().replace(sink));
        Ok(Self {
            previous,
            _thread_bound: PhantomData,
        })
    }
}

impl Drop for LogRedirect {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SINK.with(|s| {
            if let Some(cur) = s.borrow().as_ref() {
                if let Ok(mut f) = cur.file.lock() {
                    let _ = f.flush();
                }
            }
            *s.borrow_mut() = previous;
        });
    }
}

/// Path of the file this thread currently logs to, if redirected.
pub fn current_log_path() -> Option<PathBuf> {
    SINK.with(|s| s.borrow().as_ref().map(|sink| sink.path.clone()))
}

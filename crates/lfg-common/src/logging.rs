use std::any::Any;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `LFG_LOG_DIR`: also write daily-rotated files here.
    pub dir: Option<PathBuf>,
    /// Directive used when `RUST_LOG` is unset (`LFG_LOG_LEVEL`, default `info`).
    pub default_directive: String,
    /// `LFG_LOG_INCLUDE_BACKTRACE`: also run the default panic hook.
    pub include_backtrace: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            default_directive: "info".into(),
            include_backtrace: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            dir: lookup("LFG_LOG_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            default_directive: lookup("LFG_LOG_LEVEL")
                .filter(|level| !level.trim().is_empty())
                .unwrap_or(defaults.default_directive),
            include_backtrace: lookup("LFG_LOG_INCLUDE_BACKTRACE")
                .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true")),
        }
    }
}

/// Install the subscriber and the panic hook. Repeated calls are no-ops.
///
/// Events always go to stdout; with a log dir they are also written to a
/// daily-rotated `<app>.log` there.
pub fn init_logging(app_name: &'static str, config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let (file_layer, dir_error) = match config.dir.as_deref().map(|dir| file_writer(app_name, dir)) {
        Some(Ok(writer)) => (Some(fmt::layer().with_ansi(false).with_writer(writer)), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    if let (Some(err), Some(dir)) = (dir_error, config.dir.as_ref()) {
        tracing::warn!(error = %err, dir = %dir.display(), "cannot create log dir; logging to stdout only");
    }

    install_panic_hook(app_name, config.include_backtrace);
}

fn file_writer(app_name: &'static str, dir: &Path) -> io::Result<NonBlocking> {
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}

/// Route panics through `tracing` so they land in the same sink as other logs.
pub fn install_panic_hook(app_name: &'static str, include_backtrace: bool) {
    PANIC_HOOK.get_or_init(|| {
        let default_hook = panic::take_hook();

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

            tracing::error!(
                application = app_name,
                thread = thread.name().unwrap_or("unnamed"),
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %panic_message(info.payload()),
                "panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

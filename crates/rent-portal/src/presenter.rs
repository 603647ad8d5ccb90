//! # Terminal Presenter
//!
//! Renders payment transitions and portal messages as status lines, and
//! tracks whether the pay control should accept input.

use rent_client::PaymentObserver;
use rent_core::{PaymentState, StatusUpdate};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Where to send the user next (login page, payment history, ...)
pub trait Navigator: Send + Sync {
    fn redirect(&self, target: &str);
}

/// Navigator for the terminal: announces the target and logs it
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, target: &str) {
        info!(target = %target, "Redirecting");
        println!("-> {}", target);
    }
}

/// Observer that writes status lines to a terminal or buffer
pub struct TerminalPresenter {
    out: Mutex<Box<dyn Write + Send>>,
    submit_enabled: AtomicBool,
}

impl TerminalPresenter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            submit_enabled: AtomicBool::new(true),
        }
    }

    pub fn stdout() -> Arc<Self> {
        Arc::new(Self::new(Box::new(std::io::stdout())))
    }

    /// Whether the pay control is currently enabled
    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled.load(Ordering::SeqCst)
    }

    pub fn show_success(&self, message: &str) {
        self.line(&format!("OK: {}", message));
    }

    pub fn show_error(&self, message: &str) {
        self.line(&format!("Error: {}", message));
    }

    pub fn show_info(&self, message: &str) {
        self.line(message);
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        // Output errors are ignored.
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }
}

impl PaymentObserver for TerminalPresenter {
    fn on_transition(&self, update: &StatusUpdate) {
        self.submit_enabled
            .store(update.state.accepts_submit(), Ordering::SeqCst);

        let stamp = update.at.format("%H:%M:%S");
        let text = match update.state {
            PaymentState::Idle => return,
            PaymentState::Completed => format!("[{}] ✅ {}", stamp, update.message()),
            PaymentState::Failed => format!("[{}] ❌ {}", stamp, update.message()),
            PaymentState::TimedOut => format!("[{}] ⚠️ {}", stamp, update.message()),
            PaymentState::Submitting | PaymentState::AwaitingConfirmation => {
                format!("[{}] {}", stamp, update.message())
            }
        };
        self.line(&text);
    }
}

/// In-memory writer for inspecting presenter output
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

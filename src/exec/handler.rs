// src/exec/handler.rs

//! Callbacks a caller binds to one `execute` call.

use super::process::ProcessResult;

/// Receives the output and completion of one managed process.
///
/// All methods run on the process's background runner task, in order:
/// `on_start` (only if the OS process started), then `on_line` for every
/// relayed line, then `on_complete` exactly once.
pub trait ExecutionHandler: Send + 'static {
    fn on_start(&mut self, _pid: Option<u32>) {}

    fn on_line(&mut self, line: &str);

    fn on_complete(&mut self, result: &ProcessResult);
}

/// Discards everything; useful when the caller only awaits the handle.
impl ExecutionHandler for () {
    fn on_line(&mut self, _line: &str) {}

    fn on_complete(&mut self, _result: &ProcessResult) {}
}

impl<H: ExecutionHandler + ?Sized> ExecutionHandler for Box<H> {
    fn on_start(&mut self, pid: Option<u32>) {
        (**self).on_start(pid)
    }

    fn on_line(&mut self, line: &str) {
        (**self).on_line(line)
    }

    fn on_complete(&mut self, result: &ProcessResult) {
        (**self).on_complete(result)
    }
}

/// Closure-backed handler built by [`callbacks`].
pub struct FnHandler<L, C> {
    on_line: L,
    on_complete: Option<C>,
}

/// Build a handler from an output-line closure and a completion closure.
pub fn callbacks<L, C>(on_line: L, on_complete: C) -> FnHandler<L, C>
where
    L: FnMut(&str) + Send + 'static,
    C: FnOnce(&ProcessResult) + Send + 'static,
{
    FnHandler {
        on_line,
        on_complete: Some(on_complete),
    }
}

impl<L, C> ExecutionHandler for FnHandler<L, C>
where
    L: FnMut(&str) + Send + 'static,
    C: FnOnce(&ProcessResult) + Send + 'static,
{
    fn on_line(&mut self, line: &str) {
        (self.on_line)(line)
    }

    fn on_complete(&mut self, result: &ProcessResult) {
        if let Some(f) = self.on_complete.take() {
            f(result);
        }
    }
}

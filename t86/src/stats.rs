/// Optional statistics-logging collaborator (spec §9's "global mutable state"
/// re-expression): instead of a process-wide logger, the CPU takes one of
/// these by value at `start()` and drives it directly.
pub trait StatsSink {
    fn on_tick(&mut self, pc: i64);
    fn on_halt(&mut self, ticks: u64);
    fn on_fault(&mut self, message: &str);
}

/// Does nothing; the default when no `--stats` sink is wired in.
#[derive(Default)]
pub struct NullStatsSink;

impl StatsSink for NullStatsSink {
    fn on_tick(&mut self, _pc: i64) {}
    fn on_halt(&mut self, _ticks: u64) {}
    fn on_fault(&mut self, _message: &str) {}
}

/// Emits one `tracing` event per tick/halt/fault, at `trace`/`info`/`error`
/// level respectively.
#[derive(Default)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn on_tick(&mut self, pc: i64) {
        tracing::trace!(pc, "tick");
    }

    fn on_halt(&mut self, ticks: u64) {
        tracing::info!(ticks, "halted");
    }

    fn on_fault(&mut self, message: &str) {
        tracing::error!(message, "runtime fault");
    }
}

//! The response cache: sequence -> result, sequence -> completion, low-water-mark GC (§4.3).

use crate::session::Completion;
use crate::session::Session;
use crate::CommandResult;
use crate::Context;
use crate::EventPayload;

impl<P, R, C> Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    /// Store a command's result under `sequence` so a retried submission can return the same
    /// answer without re-executing the side effect. `completion` is the future the original
    /// submitter waits on; completing it is the caller's responsibility, not this method's — the
    /// session only holds onto it until it is GC'd by [`Session::clear_responses`].
    #[tracing::instrument(level = "trace", skip(self, result, completion))]
    pub fn register_response(&mut self, sequence: u64, result: R, completion: Option<Completion>) {
        self.responses.insert(sequence, result);
        if let Some(completion) = completion {
            self.futures.insert(sequence, completion);
        }
        self.report_metrics();
    }

    /// Look up a cached response, if still retained.
    pub fn response(&self, sequence: u64) -> Option<&R> {
        self.responses.get(&sequence)
    }

    /// Discard every cached response and completion with sequence in `(command_low_water_mark, s]`
    /// and raise `command_low_water_mark` to `s`. Monotone: a call with `s` at or below the
    /// current low-water-mark is a no-op (§4.3, §8).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn clear_responses(&mut self, s: u64) {
        if s <= self.command_low_water_mark {
            return;
        }
        let mut i = self.command_low_water_mark + 1;
        while i <= s {
            self.responses.remove(&i);
            self.futures.remove(&i);
            i += 1;
        }
        self.command_low_water_mark = s;
        self.report_metrics();
    }
}

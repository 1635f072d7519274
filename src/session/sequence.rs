//! Sequencing of command submissions and the sequence/index advancer (§4.1, §4.2).

use crate::error::SessionError;
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
    /// Park a submission callback under `sequence`. Submissions must be run in strictly
    /// increasing sequence order with no gaps; the callback runs once [`Session::set_request_sequence`]
    /// reaches `sequence` (§4.1).
    ///
    /// Rejected (§7) once the session has closed or expired: nothing will ever drain a callback
    /// registered on a session that has stopped advancing.
    #[tracing::instrument(level = "trace", skip(self, callback))]
    pub fn register_request(
        &mut self,
        sequence: u64,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<(), SessionError> {
        self.ensure_accepting_work()?;
        self.commands.insert(sequence, Box::new(callback));
        Ok(())
    }

    /// Record that requests up to `sequence` have been accepted. If this raises
    /// `request_sequence`, the single callback keyed by the *old* `request_sequence + 1` (the
    /// sequence this call was the one to finally unblock) is taken and run if present — at most
    /// one step per call, since running that callback is expected to itself advance
    /// `request_sequence` further or register a later callback (§4.1).
    ///
    /// The next-expected key is computed before `request_sequence` is overwritten: that is what
    /// lets a callback which itself calls back into `set_request_sequence` see the sequence it
    /// unblocks land on the correct next slot, rather than one past it.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn set_request_sequence(&mut self, sequence: u64) {
        if sequence <= self.request_sequence {
            return;
        }
        let next_expected = self.request_sequence + 1;
        self.request_sequence = sequence;
        self.report_metrics();

        if let Some(callback) = self.commands.remove(&next_expected) {
            callback();
        }
    }

    /// Register a query to run once `command_sequence` first reaches `sequence`.
    ///
    /// Rejects (§8) if `sequence` has already been passed: the caller must treat this as "run
    /// immediately, out of band" rather than queueing it, since it will never be drained.
    /// Also rejected (§7) once the session has closed or expired.
    #[tracing::instrument(level = "trace", skip(self, callback))]
    pub fn register_sequence_query(
        &mut self,
        sequence: u64,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<(), SessionError> {
        self.ensure_accepting_work()?;
        if sequence <= self.command_sequence {
            return Err(SessionError::SequenceAlreadyPassed {
                requested: sequence,
                current: self.command_sequence,
            });
        }
        let mut list = self.query_pool.take();
        if let Some(existing) = self.sequence_queries.remove(&sequence) {
            list = existing;
        }
        list.push(Box::new(callback));
        self.sequence_queries.insert(sequence, list);
        Ok(())
    }

    /// Register a query to run once the command at log index `index` has been applied.
    ///
    /// Also rejected (§7) once the session has closed or expired.
    #[tracing::instrument(level = "trace", skip(self, callback))]
    pub fn register_index_query(
        &mut self,
        index: u64,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<(), SessionError> {
        self.ensure_accepting_work()?;
        if index <= self.last_applied {
            return Err(SessionError::IndexAlreadyPassed {
                requested: index,
                current: self.last_applied,
            });
        }
        let mut list = self.query_pool.take();
        if let Some(existing) = self.index_queries.remove(&index) {
            list = existing;
        }
        list.push(Box::new(callback));
        self.index_queries.insert(index, list);
        Ok(())
    }

    /// Advance `command_sequence` through `sequence`, draining `sequence_queries` one step at a
    /// time — `command_sequence` is updated *before* the queries for that step run, so a query
    /// re-registering itself for the current step sees the post-advance value (§4.2).
    ///
    /// After the walk, if `sequence` is ahead of `request_sequence`, catches `request_sequence`
    /// up to it: draining any registered `commands` callback at each intervening step if any
    /// commands are registered at all, else jumping directly. This resolves the open question in
    /// the source about the catch-up loop's intent (see DESIGN.md).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn set_command_sequence(&mut self, sequence: u64) {
        let mut step = self.command_sequence + 1;
        while step <= sequence {
            self.command_sequence = step;
            if let Some(mut list) = self.sequence_queries.remove(&step) {
                for callback in list.drain(..) {
                    callback();
                }
                self.query_pool.recycle(list);
            }
            step += 1;
        }
        self.report_metrics();

        if sequence > self.request_sequence {
            if !self.commands.is_empty() {
                let mut i = self.request_sequence + 1;
                while i <= sequence {
                    self.request_sequence = i;
                    if let Some(callback) = self.commands.remove(&i) {
                        callback();
                    }
                    i += 1;
                }
            } else {
                self.request_sequence = sequence;
            }
            self.report_metrics();
        }
    }

    /// Advance `last_applied` through `index`, draining `index_queries` one step at a time,
    /// identically to [`Session::set_command_sequence`]'s sequence-query draining (§4.2).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn set_last_applied(&mut self, index: u64) {
        let mut step = self.last_applied + 1;
        while step <= index {
            self.last_applied = step;
            if let Some(mut list) = self.index_queries.remove(&step) {
                for callback in list.drain(..) {
                    callback();
                }
                self.query_pool.recycle(list);
            }
            step += 1;
        }
        self.report_metrics();
    }
}

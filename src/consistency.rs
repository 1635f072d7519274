//! Consistency levels a command's event delivery can be tied to.

use serde::Deserialize;
use serde::Serialize;

/// The consistency level of the command currently being applied, as reported by [`crate::Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// Event batches must be delivered before the command's reply reaches the client.
    Linearizable,
    /// Event batches ride the existing connection and may lag the reply.
    Sequential,
}

impl Consistency {
    /// True for [`Consistency::Linearizable`].
    pub fn is_linearizable(&self) -> bool {
        matches!(self, Self::Linearizable)
    }

    /// True for [`Consistency::Sequential`].
    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Sequential)
    }
}

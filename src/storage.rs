//! The storage collaborator: a narrow trait the scheduler calls once per communication point per
//! enabled channel-store kind. Serialization format is entirely the collaborator's concern.

use crate::error::Result;
use crate::value::{ChannelId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    In,
    Out,
    Local,
    RealTimeFactor,
}

/// Receives one row per `(kind, component)` per communication point. `finished` is called exactly
/// once, whether the run reached `end`, was cancelled, or aborted on error, so the collaborator
/// can flush and close out whatever it is writing.
pub trait StorageSink {
    fn store(
        &mut self,
        kind: StoreKind,
        component_index: usize,
        time: f64,
        values: &[(ChannelId, Value)],
    ) -> Result<()>;

    fn finished(&mut self) -> Result<()>;
}

/// An in-memory sink used by tests and by callers that want to inspect a run's output directly
/// rather than have it serialized to disk.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub rows: Vec<(StoreKind, usize, f64, Vec<(ChannelId, Value)>)>,
    pub finished: bool,
}

impl StorageSink for RecordingSink {
    fn store(
        &mut self,
        kind: StoreKind,
        component_index: usize,
        time: f64,
        values: &[(ChannelId, Value)],
    ) -> Result<()> {
        self.rows.push((kind, component_index, time, values.to_vec()));
        Ok(())
    }

    fn finished(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_captures_rows_and_finish() {
        let mut sink = RecordingSink::default();
        sink.store(StoreKind::Out, 0, 0.1, &[(ChannelId(0), Value::Real(1.0))])
            .unwrap();
        sink.finished().unwrap();
        assert_eq!(sink.rows.len(), 1);
        assert!(sink.finished);
    }
}

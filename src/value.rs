//! The value bus: typed channels, connections between them, and the transform/clamp/NaN-check
//! pipeline a value passes through on its way from a source to a sink.

use std::collections::HashMap;

use crate::config::NanCheckPolicy;
use crate::error::{Error, Result};

/// The closed set of scalar types a channel may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Real,
    Integer,
    Boolean,
    String,
    Binary,
}

/// A single scalar value, tagged by [`ValueKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    String(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Real(_) => ValueKind::Real,
            Value::Integer(_) => ValueKind::Integer,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }
}

/// Affine transform and clamp bounds applied to a Real sink on publish. Non-Real channels ignore
/// this entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTransform {
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RealTransform {
    fn apply(&self, x: f64) -> f64 {
        let y = self.scale.unwrap_or(1.0) * x + self.offset.unwrap_or(0.0);
        match (self.min, self.max) {
            (Some(min), Some(max)) => y.clamp(min, max),
            (Some(min), None) => y.max(min),
            (None, Some(max)) => y.min(max),
            (None, None) => y,
        }
    }
}

/// A unique handle identifying one channel on the bus. Opaque outside this module beyond
/// equality/hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub usize);

/// A single typed value-slot, owned by the bus.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub kind: ValueKind,
    pub discrete: bool,
    pub defined_during_init: bool,
    pub default: Option<Value>,
    pub initial: Option<Value>,
    value: Option<Value>,
    connected: bool,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            discrete: false,
            defined_during_init: true,
            default: None,
            initial: None,
            value: None,
            connected: false,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

/// Typed channels plus the connections between them, with the transform/clamp/NaN-check pipeline
/// applied on publish.
#[derive(Debug, Default)]
pub struct ValueBus {
    channels: Vec<Channel>,
    /// sink -> (source, transform)
    sources: HashMap<ChannelId, (ChannelId, RealTransform)>,
    nan_check: NanCheckPolicy,
    nan_messages_emitted: usize,
    nan_message_budget: usize,
}

impl ValueBus {
    pub fn new(nan_check: NanCheckPolicy, nan_message_budget: usize) -> Self {
        Self {
            channels: Vec::new(),
            sources: HashMap::new(),
            nan_check,
            nan_messages_emitted: 0,
            nan_message_budget,
        }
    }

    pub fn add_channel(&mut self, channel: Channel) -> ChannelId {
        let id = ChannelId(self.channels.len());
        self.channels.push(channel);
        id
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.0]
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Directed source -> sink connection. Fails if the types disagree or the sink already has a
    /// source.
    pub fn connect(
        &mut self,
        source: ChannelId,
        sink: ChannelId,
        transform: RealTransform,
    ) -> Result<()> {
        let source_kind = self.channels[source.0].kind;
        let sink_kind = self.channels[sink.0].kind;
        if source_kind != sink_kind {
            return Err(Error::TypeMismatch {
                source: self.channels[source.0].name.clone(),
                sink: self.channels[sink.0].name.clone(),
            });
        }
        if let Some((existing, _)) = self.sources.get(&sink) {
            return Err(Error::MultipleSources {
                sink: self.channels[sink.0].name.clone(),
                existing: self.channels[existing.0].name.clone(),
                new: self.channels[source.0].name.clone(),
            });
        }
        self.sources.insert(sink, (source, transform));
        self.channels[sink.0].connected = true;
        self.channels[source.0].connected = true;
        Ok(())
    }

    pub fn source_of(&self, sink: ChannelId) -> Option<ChannelId> {
        self.sources.get(&sink).map(|(src, _)| *src)
    }

    /// Iterate all sink->source edges, in no particular order.
    pub fn connections(&self) -> impl Iterator<Item = (ChannelId, ChannelId)> + '_ {
        self.sources.iter().map(|(sink, (src, _))| (*src, *sink))
    }

    pub fn sample(&self, id: ChannelId) -> Option<&Value> {
        self.channels[id.0].value()
    }

    /// Propagate every connected sink from its current source value. Called once per
    /// communication point before components are stepped.
    pub fn propagate(&mut self, time: f64) -> Result<()> {
        let edges: Vec<(ChannelId, ChannelId, RealTransform)> = self
            .sources
            .iter()
            .map(|(sink, (src, t))| (*sink, *src, *t))
            .collect();
        for (sink, src, transform) in edges {
            let raw = self.channels[src.0].value.clone();
            if let Some(v) = raw {
                self.publish(sink, v, transform, time)?;
            }
        }
        Ok(())
    }

    /// Write `raw_value` into `sink`, applying the affine transform (Real only) then the
    /// configured NaN-check policy. On failure the previous value is retained.
    pub fn publish(
        &mut self,
        sink: ChannelId,
        raw_value: Value,
        transform: RealTransform,
        time: f64,
    ) -> Result<()> {
        let transformed = match raw_value {
            Value::Real(x) => Value::Real(transform.apply(x)),
            other => other,
        };

        if let Value::Real(x) = &transformed {
            let should_check = match self.nan_check {
                NanCheckPolicy::Off => false,
                NanCheckPolicy::All => true,
                NanCheckPolicy::ConnectedOnly => self.channels[sink.0].connected,
            };
            if should_check && !x.is_finite() {
                if self.nan_messages_emitted < self.nan_message_budget {
                    log::error!(
                        "non-finite value on channel '{}' at t={}",
                        self.channels[sink.0].name,
                        time
                    );
                    self.nan_messages_emitted += 1;
                }
                return Err(Error::NonFinite {
                    channel: self.channels[sink.0].name.clone(),
                    time,
                });
            }
        }

        self.channels[sink.0].value = Some(transformed);
        Ok(())
    }

    /// Directly set a channel's value without going through a connection (used for parameters,
    /// initial values, and component-supplied outputs).
    pub fn set(&mut self, id: ChannelId, value: Value) {
        self.channels[id.0].value = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> ValueBus {
        ValueBus::new(NanCheckPolicy::All, 10)
    }

    #[test]
    fn connect_rejects_type_mismatch() {
        let mut bus = bus();
        let a = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let b = bus.add_channel(Channel::new("b.in", ValueKind::Integer));
        let err = bus.connect(a, b, RealTransform::default()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn connect_rejects_multiple_sources() {
        let mut bus = bus();
        let a = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let b = bus.add_channel(Channel::new("b.out", ValueKind::Real));
        let sink = bus.add_channel(Channel::new("c.in", ValueKind::Real));
        bus.connect(a, sink, RealTransform::default()).unwrap();
        let err = bus
            .connect(b, sink, RealTransform::default())
            .unwrap_err();
        assert!(matches!(err, Error::MultipleSources { .. }));
    }

    #[test]
    fn publish_applies_scale_offset_then_clamp() {
        let mut bus = bus();
        let sink = bus.add_channel(Channel::new("c.in", ValueKind::Real));
        let transform = RealTransform {
            scale: Some(2.0),
            offset: Some(1.0),
            min: Some(0.0),
            max: Some(4.0),
        };
        bus.publish(sink, Value::Real(10.0), transform, 0.0)
            .unwrap();
        assert_eq!(bus.sample(sink), Some(&Value::Real(4.0)));
    }

    #[test]
    fn publish_rejects_non_finite_under_all_policy() {
        let mut bus = bus();
        let sink = bus.add_channel(Channel::new("c.in", ValueKind::Real));
        let err = bus
            .publish(sink, Value::Real(f64::NAN), RealTransform::default(), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::NonFinite { .. }));
        assert_eq!(bus.sample(sink), None);
    }

    #[test]
    fn propagate_carries_source_to_sink() {
        let mut bus = bus();
        let src = bus.add_channel(Channel::new("a.out", ValueKind::Real));
        let sink = bus.add_channel(Channel::new("b.in", ValueKind::Real));
        bus.connect(src, sink, RealTransform::default()).unwrap();
        bus.set(src, Value::Real(3.5));
        bus.propagate(0.0).unwrap();
        assert_eq!(bus.sample(sink), Some(&Value::Real(3.5)));
    }
}

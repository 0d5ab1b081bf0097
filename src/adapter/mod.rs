//! Component adapters: version-agnostic [`crate::component::ForeignAdapter`] implementations over
//! raw FMI 1.0 / 2.0 instances.

#[cfg(feature = "fmi1")]
pub mod ffi1;
#[cfg(feature = "fmi2")]
pub mod ffi2;

#[cfg(feature = "fmi1")]
mod fmi1;
#[cfg(feature = "fmi2")]
mod fmi2;

#[cfg(feature = "fmi1")]
pub use fmi1::Fmi1Adapter;
#[cfg(feature = "fmi2")]
pub use fmi2::Fmi2Adapter;

/// A named scalar variable's value-reference and declared channel type, as read from the
/// component's parsed model description. The adapter uses this to marshal [`crate::value::Value`]s
/// to and from the foreign ABI's typed setters/getters.
#[derive(Debug, Clone)]
pub struct VariableRef {
    pub value_reference: u32,
    pub kind: crate::value::ValueKind,
    /// FMI 1.0 "negated alias" variables invert sign on both set and get; always `false` for
    /// FMI 2.0 channels.
    pub negated: bool,
}

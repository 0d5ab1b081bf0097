//! [`crate::component::ForeignAdapter`] implementation over an FMI 1.0 Co-Simulation slave.
//!
//! FMI 1.0 has no separate enter/exit-initialization-mode pair; `initialize_slave` performs the
//! initial computation in one call, so [`Fmi1Adapter::enter_initialization`] does the whole job
//! and [`Fmi1Adapter::exit_initialization`] is a no-op.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;

use cosim_schema::fmi1::{Causality, Fmi1ModelDescription};

use super::ffi1::{self, Fmi1Binding};
use super::VariableRef;
use crate::component::{ForeignAdapter, GetKind, SetKind, StepResult};
use crate::error::{Error, ForeignStatus, Result};
use crate::package::ExtractedPackage;
use crate::port::{Direction, Port, PortMode};
use crate::value::{Channel, ChannelId, Value, ValueBus, ValueKind};

pub struct Fmi1Adapter {
    binding: Fmi1Binding,
    component: ffi1::fmi1Component,
    /// Kept alive for the component's lifetime: the shared library is loaded from inside this
    /// directory.
    _package: ExtractedPackage,
    channel_refs: HashMap<ChannelId, VariableRef>,
}

// SAFETY: see Fmi2Adapter's identical justification.
unsafe impl Send for Fmi1Adapter {}

impl Fmi1Adapter {
    /// Extract `package_path`, parse its `modelDescription.xml`, load its shared library, and
    /// instantiate the Co-Simulation slave it describes. Returns the adapter and one [`Port`] per
    /// declared variable, in declaration order, with `channel` already allocated on `bus`.
    ///
    /// FMI 1.0's schema has no `ModelStructure`/`InitialUnknowns` element, so the returned adapter
    /// always reports [`ForeignAdapter::initial_dependencies`] as `None`: every initial-unknown is
    /// genuinely undeclared, not merely omitted.
    pub fn setup(
        instance_name: &str,
        package_path: impl AsRef<Path>,
        extraction_root: &Path,
        auto_created: bool,
        bus: &mut ValueBus,
        visible: bool,
        logging_on: bool,
    ) -> Result<(Self, Vec<Port>)> {
        let package =
            ExtractedPackage::extract(package_path, instance_name, extraction_root, auto_created)?;
        let xml = package.read_model_description()?;
        let description: Fmi1ModelDescription = cosim_schema::deserialize(&xml)?;

        // SAFETY: the packaging layout guarantees the library under `binaries/<platform>/`
        // implements the FMI 1.0 Co-Simulation ABI for the GUID declared alongside it.
        let binding = unsafe { Fmi1Binding::new(package.shared_lib_path(&description.model_identifier)?)? };

        let mut channel_refs = HashMap::with_capacity(description.num_variables());
        let mut ports = Vec::with_capacity(description.num_variables());
        for var in description.get_model_variables() {
            let kind = match &var.elem {
                cosim_schema::fmi1::ScalarVariableElement::Real(_) => ValueKind::Real,
                cosim_schema::fmi1::ScalarVariableElement::Integer(_) => ValueKind::Integer,
                cosim_schema::fmi1::ScalarVariableElement::Boolean(_) => ValueKind::Boolean,
                cosim_schema::fmi1::ScalarVariableElement::String => ValueKind::String,
                cosim_schema::fmi1::ScalarVariableElement::Enumeration => ValueKind::Integer,
            };
            let direction = match var.causality {
                Causality::Input => Direction::In,
                Causality::Output => Direction::Out,
                Causality::Internal | Causality::None => Direction::Local,
            };
            let mut channel = Channel::new(var.name.clone(), kind);
            channel.discrete = matches!(var.variability, cosim_schema::fmi1::Variability::Discrete);
            let id = bus.add_channel(channel);
            channel_refs.insert(
                id,
                VariableRef {
                    value_reference: var.value_reference,
                    kind,
                    negated: var.is_negated_alias(),
                },
            );
            ports.push(Port::scalar(var.name.clone(), direction, PortMode::Required, id));
        }

        let fmu_location = package.resource_location();
        // SAFETY: `binding` was just loaded from this package's own shared library, which the
        // packaging layout guarantees implements the FMI 1.0 Co-Simulation ABI for `guid`.
        let adapter = unsafe {
            Self::instantiate(
                binding,
                instance_name,
                &description.guid,
                &fmu_location,
                visible,
                logging_on,
                package,
                channel_refs,
            )?
        };
        Ok((adapter, ports))
    }

    /// # Safety
    /// `binding` must have been loaded from a library implementing the FMI 1.0 Co-Simulation ABI
    /// for the GUID being passed.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn instantiate(
        binding: Fmi1Binding,
        instance_name: &str,
        guid: &str,
        fmu_location: &str,
        visible: bool,
        logging_on: bool,
        package: ExtractedPackage,
        channel_refs: HashMap<ChannelId, VariableRef>,
    ) -> Result<Self> {
        let c_name = CString::new(instance_name).expect("instance name must not contain NUL");
        let c_guid = CString::new(guid).expect("guid must not contain NUL");
        let c_location = CString::new(fmu_location).expect("fmu location must not contain NUL");
        let c_mime = CString::new("application/x-fmu-sharedlibrary").unwrap();

        let component = (binding.instantiate_slave)(
            c_name.as_ptr(),
            c_guid.as_ptr(),
            c_location.as_ptr(),
            c_mime.as_ptr(),
            0.0,
            visible as ffi1::fmi1Boolean,
            0,
            ffi1::default_callbacks(),
            logging_on as ffi1::fmi1Boolean,
        );
        if component.is_null() {
            return Err(Error::ConfigInvalid(format!(
                "fmiInstantiateSlave returned NULL for '{instance_name}'"
            )));
        }
        log::trace!("instantiated FMI1.0 CS component '{instance_name}' ({component:?})");

        Ok(Self {
            binding,
            component,
            _package: package,
            channel_refs,
        })
    }

    fn status_result(&self, status: ffi1::fmi1Status, phase: &str) -> Result<StepResult> {
        match status {
            ffi1::fmi1Status_fmi1OK => Ok(StepResult::Ok),
            ffi1::fmi1Status_fmi1Warning => Ok(StepResult::Warning),
            // FMI 1.0 has no terminated-status query: any discard not explained by the instance
            // itself is treated as unrecoverable.
            ffi1::fmi1Status_fmi1Discard => Err(Error::ForeignFailure {
                component: String::new(),
                phase: phase.to_string(),
                status: ForeignStatus::SpuriousDiscard,
            }),
            ffi1::fmi1Status_fmi1Error => Err(Error::ForeignFailure {
                component: String::new(),
                phase: phase.to_string(),
                status: ForeignStatus::Error,
            }),
            ffi1::fmi1Status_fmi1Fatal => Err(Error::ForeignFailure {
                component: String::new(),
                phase: phase.to_string(),
                status: ForeignStatus::Fatal,
            }),
            other => unreachable!("invalid fmi1Status {other}"),
        }
    }

    fn var_ref(&self, id: ChannelId) -> Result<&VariableRef> {
        self.channel_refs.get(&id).ok_or_else(|| Error::UnknownVariable {
            component: String::new(),
            name: format!("channel #{}", id.0),
        })
    }
}

impl ForeignAdapter for Fmi1Adapter {
    fn set_values(&mut self, _kind: SetKind, channels: &[(ChannelId, Value)]) -> Result<()> {
        for (id, value) in channels {
            let vref = self.var_ref(*id)?;
            let sign = if vref.negated { -1.0 } else { 1.0 };
            let status = unsafe {
                match (value, vref.kind) {
                    (Value::Real(v), ValueKind::Real) => {
                        let v = v * sign;
                        (self.binding.set_real)(self.component, &vref.value_reference, 1, &v)
                    }
                    (Value::Integer(v), ValueKind::Integer) => {
                        let v = if vref.negated { -v } else { *v };
                        (self.binding.set_integer)(self.component, &vref.value_reference, 1, &v)
                    }
                    (Value::Boolean(v), ValueKind::Boolean) => {
                        let raw = *v as ffi1::fmi1Boolean;
                        (self.binding.set_boolean)(self.component, &vref.value_reference, 1, &raw)
                    }
                    (Value::String(v), ValueKind::String) => {
                        let c = CString::new(v.as_str()).expect("string value must not contain NUL");
                        let ptr = c.as_ptr();
                        (self.binding.set_string)(self.component, &vref.value_reference, 1, &ptr)
                    }
                    _ => {
                        return Err(Error::TypeMismatch {
                            source: format!("{:?}", value.kind()),
                            sink: format!("{:?}", vref.kind),
                        })
                    }
                }
            };
            self.status_result(status, "set_values")?;
        }
        Ok(())
    }

    fn get_values(&mut self, _kind: GetKind, channels: &[ChannelId]) -> Result<Vec<(ChannelId, Value)>> {
        let mut out = Vec::with_capacity(channels.len());
        for &id in channels {
            let vref = self.var_ref(id)?.clone();
            let sign = if vref.negated { -1.0 } else { 1.0 };
            let value = unsafe {
                match vref.kind {
                    ValueKind::Real => {
                        let mut v: ffi1::fmi1Real = 0.0;
                        let status =
                            (self.binding.get_real)(self.component, &vref.value_reference, 1, &mut v);
                        self.status_result(status, "get_values")?;
                        Value::Real(v * sign)
                    }
                    ValueKind::Integer => {
                        let mut v: ffi1::fmi1Integer = 0;
                        let status = (self.binding.get_integer)(
                            self.component,
                            &vref.value_reference,
                            1,
                            &mut v,
                        );
                        self.status_result(status, "get_values")?;
                        Value::Integer(if vref.negated { -v } else { v })
                    }
                    ValueKind::Boolean => {
                        let mut v: ffi1::fmi1Boolean = 0;
                        let status = (self.binding.get_boolean)(
                            self.component,
                            &vref.value_reference,
                            1,
                            &mut v,
                        );
                        self.status_result(status, "get_values")?;
                        Value::Boolean(v != 0)
                    }
                    ValueKind::String => {
                        let mut ptr: ffi1::fmi1String = std::ptr::null();
                        let status = (self.binding.get_string)(
                            self.component,
                            &vref.value_reference,
                            1,
                            &mut ptr,
                        );
                        self.status_result(status, "get_values")?;
                        let s = if ptr.is_null() {
                            String::new()
                        } else {
                            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
                        };
                        Value::String(s)
                    }
                    ValueKind::Binary => {
                        return Err(Error::UnknownVariable {
                            component: String::new(),
                            name: "FMI 1.0 has no binary variable type".into(),
                        })
                    }
                }
            };
            out.push((id, value));
        }
        Ok(out)
    }

    fn enter_initialization(
        &mut self,
        start_time: f64,
        _tolerance: Option<f64>,
        stop_time: Option<f64>,
    ) -> Result<()> {
        let status = unsafe {
            (self.binding.initialize_slave)(
                self.component,
                start_time,
                stop_time.is_some() as ffi1::fmi1Boolean,
                stop_time.unwrap_or(0.0),
            )
        };
        self.status_result(status, "initialize_slave")?;
        Ok(())
    }

    fn exit_initialization(&mut self) -> Result<()> {
        Ok(())
    }

    fn step(&mut self, t: f64, dt: f64) -> Result<StepResult> {
        let status = unsafe { (self.binding.do_step)(self.component, t, dt, 1) };
        self.status_result(status, "do_step")
    }

    fn initial_dependencies(&self) -> Option<&[(ChannelId, Vec<ChannelId>)]> {
        // FMI 1.0's schema has no `ModelStructure`/`InitialUnknowns` element: every instance's
        // initial-unknown structure is genuinely undeclared, triggering the dense fallback.
        None
    }

    fn terminate(&mut self) -> Result<()> {
        let status = unsafe { (self.binding.terminate_slave)(self.component) };
        self.status_result(status, "terminate_slave")?;
        Ok(())
    }

    fn free(&mut self) -> Result<()> {
        unsafe { (self.binding.free_slave_instance)(self.component) };
        Ok(())
    }
}

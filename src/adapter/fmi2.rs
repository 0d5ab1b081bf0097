//! [`crate::component::ForeignAdapter`] implementation over an FMI 2.0 Co-Simulation instance.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;

use cosim_schema::fmi2::{Causality, Fmi2ModelDescription, Initial, ScalarVariableElement, Variability};

use super::ffi2::{self, Fmi2Binding};
use super::VariableRef;
use crate::component::{ForeignAdapter, GetKind, SetKind, StepResult};
use crate::error::{Error, ForeignStatus, Result};
use crate::package::ExtractedPackage;
use crate::port::{Direction, Port, PortMode};
use crate::value::{Channel, ChannelId, Value, ValueBus, ValueKind};

pub struct Fmi2Adapter {
    binding: Fmi2Binding,
    component: ffi2::fmi2Component,
    /// Kept alive for the component's lifetime: the foreign side holds a pointer to it via
    /// `functions.component_environment` / the logger callback's environment argument.
    _callbacks: Box<ffi2::fmi2CallbackFunctions>,
    /// Kept alive for the component's lifetime: the shared library is loaded from inside this
    /// directory, and the model description may still be read from it for diagnostics.
    _package: ExtractedPackage,
    channel_refs: HashMap<ChannelId, VariableRef>,
    initial_dependencies: Option<Vec<(ChannelId, Vec<ChannelId>)>>,
}

// SAFETY: the engine never calls into the same `Fmi2Adapter` from more than one thread
// concurrently (see the concurrency model's shared-resource policy); the raw pointers inside are
// otherwise inert data as far as the type system is concerned.
unsafe impl Send for Fmi2Adapter {}

impl Fmi2Adapter {
    /// Extract `package_path`, parse its `modelDescription.xml`, load its shared library, and
    /// instantiate the Co-Simulation slave it describes. Returns the adapter and one [`Port`] per
    /// declared variable, in declaration order, with `channel` already allocated on `bus`.
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
        let description: Fmi2ModelDescription = cosim_schema::deserialize(&xml)?;
        let co_simulation = description.co_simulation.as_ref().ok_or_else(|| {
            Error::ConfigInvalid(format!(
                "'{instance_name}': modelDescription.xml has no CoSimulation element"
            ))
        })?;

        // SAFETY: the packaging layout guarantees the library under `binaries/<platform>/`
        // implements the FMI 2.0 ABI for the GUID declared alongside it.
        let binding = unsafe { Fmi2Binding::new(package.shared_lib_path(&co_simulation.model_identifier)?)? };

        let mut channel_refs = HashMap::with_capacity(description.num_variables());
        let mut ports = Vec::with_capacity(description.num_variables());
        let mut channel_by_index = Vec::with_capacity(description.num_variables());
        for var in description.get_model_variables() {
            let kind = match &var.elem {
                ScalarVariableElement::Real(_) => ValueKind::Real,
                ScalarVariableElement::Integer(_) => ValueKind::Integer,
                ScalarVariableElement::Boolean(_) => ValueKind::Boolean,
                ScalarVariableElement::String => ValueKind::String,
                ScalarVariableElement::Enumeration => ValueKind::Integer,
            };
            let direction = match var.causality {
                Causality::Input => Direction::In,
                Causality::Output => Direction::Out,
                _ => Direction::Local,
            };
            let mut channel = Channel::new(var.name.clone(), kind);
            channel.discrete = matches!(var.variability, Some(Variability::Discrete));
            let id = bus.add_channel(channel);
            channel_by_index.push(id);
            channel_refs.insert(
                id,
                VariableRef { value_reference: var.value_reference, kind, negated: false },
            );
            ports.push(Port::scalar(var.name.clone(), direction, PortMode::Required, id));
        }

        let in_channels: Vec<ChannelId> = description
            .get_model_variables()
            .enumerate()
            .filter(|(_, v)| v.causality == Causality::Input)
            .map(|(i, _)| channel_by_index[i])
            .collect();

        let unknowns = &description.model_structure.initial_unknowns.unknowns;
        let initial_dependencies = if unknowns.is_empty() {
            None
        } else {
            Some(
                unknowns
                    .iter()
                    .map(|unknown| {
                        let idx = unknown.index as usize - 1;
                        let out_channel = channel_by_index[idx];
                        let declared_exact =
                            description.model_variables.variables[idx].initial == Some(Initial::Exact);
                        let ins = if !unknown.dependencies.is_empty() {
                            unknown
                                .dependencies
                                .iter()
                                .map(|&dep_idx| channel_by_index[dep_idx as usize - 1])
                                .collect()
                        } else if declared_exact {
                            // An exact value is fixed before initialization begins; omitting
                            // `dependencies` here means "depends on nothing", not "depends on all".
                            Vec::new()
                        } else {
                            in_channels.clone()
                        };
                        (out_channel, ins)
                    })
                    .collect(),
            )
        };

        let resource_location = package.resource_location();
        // SAFETY: `binding` was just loaded from this package's own shared library, which the
        // packaging layout guarantees implements the FMI 2.0 Co-Simulation ABI for `guid`.
        let adapter = unsafe {
            Self::instantiate(
                binding,
                instance_name,
                &description.guid,
                &resource_location,
                visible,
                logging_on,
                package,
                channel_refs,
                initial_dependencies,
            )?
        };
        Ok((adapter, ports))
    }

    /// Instantiate a CoSimulation component from an already-loaded binding.
    ///
    /// # Safety
    /// `binding` must have been loaded from a library that genuinely implements the FMI 2.0
    /// Co-Simulation ABI for the GUID being passed.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn instantiate(
        binding: Fmi2Binding,
        instance_name: &str,
        guid: &str,
        resource_location: &str,
        visible: bool,
        logging_on: bool,
        package: ExtractedPackage,
        channel_refs: HashMap<ChannelId, VariableRef>,
        initial_dependencies: Option<Vec<(ChannelId, Vec<ChannelId>)>>,
    ) -> Result<Self> {
        let callbacks = Box::new(ffi2::default_callbacks());
        let c_name = CString::new(instance_name).expect("instance name must not contain NUL");
        let c_guid = CString::new(guid).expect("guid must not contain NUL");
        let c_resource = CString::new(resource_location).expect("resource location must not contain NUL");

        let component = (binding.instantiate)(
            c_name.as_ptr(),
            ffi2::fmi2Type_fmi2CoSimulation,
            c_guid.as_ptr(),
            c_resource.as_ptr(),
            &*callbacks as *const _,
            visible as ffi2::fmi2Boolean,
            logging_on as ffi2::fmi2Boolean,
        );
        if component.is_null() {
            return Err(Error::ConfigInvalid(format!(
                "fmi2Instantiate returned NULL for '{instance_name}'"
            )));
        }
        log::trace!("instantiated FMI2.0 CS component '{instance_name}' ({component:?})");

        Ok(Self {
            binding,
            component,
            _callbacks: callbacks,
            _package: package,
            channel_refs,
            initial_dependencies,
        })
    }

    fn status_result(&self, status: ffi2::fmi2Status, phase: &str) -> Result<StepResult> {
        match status {
            ffi2::fmi2Status_fmi2OK => Ok(StepResult::Ok),
            ffi2::fmi2Status_fmi2Warning => Ok(StepResult::Warning),
            ffi2::fmi2Status_fmi2Discard => self.check_spurious_discard(phase),
            ffi2::fmi2Status_fmi2Error => Err(self.failure(ForeignStatus::Error, phase)),
            ffi2::fmi2Status_fmi2Fatal => Err(self.failure(ForeignStatus::Fatal, phase)),
            other => unreachable!("invalid fmi2Status {other}"),
        }
    }

    fn check_spurious_discard(&self, phase: &str) -> Result<StepResult> {
        let mut terminated: ffi2::fmi2Boolean = 0;
        let status = (self.binding.get_boolean_status)(
            self.component,
            ffi2::fmi2StatusKind_fmi2Terminated,
            &mut terminated,
        );
        if status == ffi2::fmi2Status_fmi2OK && terminated != 0 {
            Ok(StepResult::Finished)
        } else {
            Err(self.failure(ForeignStatus::SpuriousDiscard, phase))
        }
    }

    fn failure(&self, status: ForeignStatus, phase: &str) -> Error {
        Error::ForeignFailure {
            component: String::new(),
            phase: phase.to_string(),
            status,
        }
    }

    fn var_ref(&self, id: ChannelId) -> Result<&VariableRef> {
        self.channel_refs.get(&id).ok_or_else(|| {
            Error::UnknownVariable {
                component: String::new(),
                name: format!("channel #{}", id.0),
            }
        })
    }
}

impl ForeignAdapter for Fmi2Adapter {
    fn set_values(
        &mut self,
        _kind: SetKind,
        channels: &[(ChannelId, Value)],
    ) -> Result<()> {
        for (id, value) in channels {
            let vref = self.var_ref(*id)?;
            let status = unsafe {
                match (value, vref.kind) {
                    (Value::Real(v), ValueKind::Real) => {
                        (self.binding.set_real)(self.component, &vref.value_reference, 1, v)
                    }
                    (Value::Integer(v), ValueKind::Integer) => {
                        (self.binding.set_integer)(self.component, &vref.value_reference, 1, v)
                    }
                    (Value::Boolean(v), ValueKind::Boolean) => {
                        let raw = *v as ffi2::fmi2Boolean;
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

    fn get_values(
        &mut self,
        _kind: GetKind,
        channels: &[ChannelId],
    ) -> Result<Vec<(ChannelId, Value)>> {
        let mut out = Vec::with_capacity(channels.len());
        for &id in channels {
            let vref = self.var_ref(id)?.clone();
            let value = unsafe {
                match vref.kind {
                    ValueKind::Real => {
                        let mut v: ffi2::fmi2Real = 0.0;
                        let status =
                            (self.binding.get_real)(self.component, &vref.value_reference, 1, &mut v);
                        self.status_result(status, "get_values")?;
                        Value::Real(v)
                    }
                    ValueKind::Integer => {
                        let mut v: ffi2::fmi2Integer = 0;
                        let status = (self.binding.get_integer)(
                            self.component,
                            &vref.value_reference,
                            1,
                            &mut v,
                        );
                        self.status_result(status, "get_values")?;
                        Value::Integer(v)
                    }
                    ValueKind::Boolean => {
                        let mut v: ffi2::fmi2Boolean = 0;
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
                        let mut ptr: ffi2::fmi2String = std::ptr::null();
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
                            std::ffi::CStr::from_ptr(ptr)
                                .to_string_lossy()
                                .into_owned()
                        };
                        Value::String(s)
                    }
                    ValueKind::Binary => {
                        return Err(Error::UnknownVariable {
                            component: String::new(),
                            name: "binary variables are not supported over the scalar FMI2 API".into(),
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
        tolerance: Option<f64>,
        stop_time: Option<f64>,
    ) -> Result<()> {
        let status = unsafe {
            (self.binding.setup_experiment)(
                self.component,
                tolerance.is_some() as ffi2::fmi2Boolean,
                tolerance.unwrap_or(0.0),
                start_time,
                stop_time.is_some() as ffi2::fmi2Boolean,
                stop_time.unwrap_or(0.0),
            )
        };
        self.status_result(status, "setup_experiment")?;
        let status = unsafe { (self.binding.enter_initialization_mode)(self.component) };
        self.status_result(status, "enter_initialization_mode")?;
        Ok(())
    }

    fn exit_initialization(&mut self) -> Result<()> {
        let status = unsafe { (self.binding.exit_initialization_mode)(self.component) };
        self.status_result(status, "exit_initialization_mode")?;
        Ok(())
    }

    fn step(&mut self, t: f64, dt: f64) -> Result<StepResult> {
        let status = unsafe { (self.binding.do_step)(self.component, t, dt, 1) };
        self.status_result(status, "do_step")
    }

    fn initial_dependencies(&self) -> Option<&[(ChannelId, Vec<ChannelId>)]> {
        self.initial_dependencies.as_deref()
    }

    fn terminate(&mut self) -> Result<()> {
        let status = unsafe { (self.binding.terminate)(self.component) };
        self.status_result(status, "terminate")?;
        Ok(())
    }

    fn free(&mut self) -> Result<()> {
        unsafe { (self.binding.free_instance)(self.component) };
        Ok(())
    }
}

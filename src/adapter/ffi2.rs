//! Raw FMI 2.0 C ABI surface, loaded by hand via `libloading` rather than generated bindings —
//! only the handful of entry points a Co-Simulation slave actually exposes are resolved, so a
//! full bindgen pass over the standard's headers is more machinery than this surface needs.
#![allow(non_camel_case_types, non_upper_case_globals)]

use std::os::raw::{c_char, c_double, c_int, c_void};

pub type fmi2Component = *mut c_void;
pub type fmi2ComponentEnvironment = *mut c_void;
pub type fmi2FMUstate = *mut c_void;
pub type fmi2Boolean = c_int;
pub type fmi2Real = c_double;
pub type fmi2Integer = c_int;
pub type fmi2String = *const c_char;
pub type fmi2Byte = u8;
pub type fmi2Status = c_int;
pub type fmi2ValueReference = u32;
pub type fmi2Type = c_int;

pub const fmi2Status_fmi2OK: fmi2Status = 0;
pub const fmi2Status_fmi2Warning: fmi2Status = 1;
pub const fmi2Status_fmi2Discard: fmi2Status = 2;
pub const fmi2Status_fmi2Error: fmi2Status = 3;
pub const fmi2Status_fmi2Fatal: fmi2Status = 4;
pub const fmi2Status_fmi2Pending: fmi2Status = 5;

pub const fmi2Type_fmi2CoSimulation: fmi2Type = 1;

pub const fmi2StatusKind_fmi2Terminated: c_int = 3;

pub type fmi2CallbackLogger = extern "C" fn(
    component_environment: fmi2ComponentEnvironment,
    instance_name: fmi2String,
    status: fmi2Status,
    category: fmi2String,
    message: fmi2String,
);
pub type fmi2CallbackAllocateMemory = extern "C" fn(n_obj: usize, size: usize) -> *mut c_void;
pub type fmi2CallbackFreeMemory = extern "C" fn(obj: *mut c_void);
pub type fmi2StepFinished =
    Option<extern "C" fn(component_environment: fmi2ComponentEnvironment, status: fmi2Status)>;

#[repr(C)]
pub struct fmi2CallbackFunctions {
    pub logger: fmi2CallbackLogger,
    pub allocate_memory: fmi2CallbackAllocateMemory,
    pub free_memory: fmi2CallbackFreeMemory,
    pub step_finished: fmi2StepFinished,
    pub component_environment: fmi2ComponentEnvironment,
}

/// Function pointers resolved from the shared library. Only the subset a Co-Simulation master
/// actually calls.
pub struct Fmi2Binding {
    pub instantiate: libloading::Symbol<'static,
        unsafe extern "C" fn(
            instance_name: fmi2String,
            fmu_type: fmi2Type,
            guid: fmi2String,
            resource_location: fmi2String,
            functions: *const fmi2CallbackFunctions,
            visible: fmi2Boolean,
            logging_on: fmi2Boolean,
        ) -> fmi2Component,
    >,
    pub setup_experiment: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            tolerance_defined: fmi2Boolean,
            tolerance: fmi2Real,
            start_time: fmi2Real,
            stop_time_defined: fmi2Boolean,
            stop_time: fmi2Real,
        ) -> fmi2Status,
    >,
    pub enter_initialization_mode:
        libloading::Symbol<'static, unsafe extern "C" fn(c: fmi2Component) -> fmi2Status>,
    pub exit_initialization_mode:
        libloading::Symbol<'static, unsafe extern "C" fn(c: fmi2Component) -> fmi2Status>,
    pub terminate: libloading::Symbol<'static, unsafe extern "C" fn(c: fmi2Component) -> fmi2Status>,
    pub free_instance: libloading::Symbol<'static, unsafe extern "C" fn(c: fmi2Component)>,
    pub set_real: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *const fmi2Real,
        ) -> fmi2Status,
    >,
    pub get_real: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *mut fmi2Real,
        ) -> fmi2Status,
    >,
    pub set_integer: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *const fmi2Integer,
        ) -> fmi2Status,
    >,
    pub get_integer: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *mut fmi2Integer,
        ) -> fmi2Status,
    >,
    pub set_boolean: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *const fmi2Boolean,
        ) -> fmi2Status,
    >,
    pub get_boolean: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *mut fmi2Boolean,
        ) -> fmi2Status,
    >,
    pub set_string: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *const fmi2String,
        ) -> fmi2Status,
    >,
    pub get_string: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            vr: *const fmi2ValueReference,
            n: usize,
            values: *mut fmi2String,
        ) -> fmi2Status,
    >,
    pub do_step: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            current_communication_point: fmi2Real,
            communication_step_size: fmi2Real,
            new_step: fmi2Boolean,
        ) -> fmi2Status,
    >,
    pub get_boolean_status: libloading::Symbol<'static, 
        unsafe extern "C" fn(
            c: fmi2Component,
            kind: c_int,
            value: *mut fmi2Boolean,
        ) -> fmi2Status,
    >,
    /// Kept last so it is dropped last: every `Symbol` above borrows from the library it loaded.
    _lib: libloading::Library,
}

impl Fmi2Binding {
    /// Load every required entry point from the shared library at `path`. All `fmi2*` symbols
    /// are required; a missing one fails the whole load rather than deferring the error to first
    /// use.
    ///
    /// # Safety
    /// The caller must ensure `path` names a library implementing the FMI 2.0 ABI; an
    /// incompatible library produces undefined behaviour when its functions are called.
    pub unsafe fn new(path: impl AsRef<std::path::Path>) -> Result<Self, libloading::Error> {
        let lib = libloading::Library::new(path.as_ref())?;
        // SAFETY: each resolved symbol borrows from `lib`; lifetime-extending it to `'static` is
        // sound here because `lib` is stored alongside the symbols in `Self` and outlives them —
        // dropping `Self` drops `_lib` last, unloading the library only once nothing refers to it.
        macro_rules! sym {
            ($name:literal) => {
                std::mem::transmute(lib.get($name)?)
            };
        }
        Ok(Self {
            instantiate: sym!(b"fmi2Instantiate\0"),
            setup_experiment: sym!(b"fmi2SetupExperiment\0"),
            enter_initialization_mode: sym!(b"fmi2EnterInitializationMode\0"),
            exit_initialization_mode: sym!(b"fmi2ExitInitializationMode\0"),
            terminate: sym!(b"fmi2Terminate\0"),
            free_instance: sym!(b"fmi2FreeInstance\0"),
            set_real: sym!(b"fmi2SetReal\0"),
            get_real: sym!(b"fmi2GetReal\0"),
            set_integer: sym!(b"fmi2SetInteger\0"),
            get_integer: sym!(b"fmi2GetInteger\0"),
            set_boolean: sym!(b"fmi2SetBoolean\0"),
            get_boolean: sym!(b"fmi2GetBoolean\0"),
            set_string: sym!(b"fmi2SetString\0"),
            get_string: sym!(b"fmi2GetString\0"),
            do_step: sym!(b"fmi2DoStep\0"),
            get_boolean_status: sym!(b"fmi2GetBooleanStatus\0"),
            _lib: lib,
        })
    }
}

extern "C" fn default_logger(
    _component_environment: fmi2ComponentEnvironment,
    instance_name: fmi2String,
    status: fmi2Status,
    _category: fmi2String,
    message: fmi2String,
) {
    let name = unsafe { std::ffi::CStr::from_ptr(instance_name) }
        .to_str()
        .unwrap_or("<invalid utf-8>");
    let msg = unsafe { std::ffi::CStr::from_ptr(message) }
        .to_str()
        .unwrap_or("<invalid utf-8>");
    let level = match status {
        fmi2Status_fmi2OK => log::Level::Debug,
        fmi2Status_fmi2Warning => log::Level::Warn,
        fmi2Status_fmi2Error | fmi2Status_fmi2Fatal => log::Level::Error,
        _ => log::Level::Trace,
    };
    log::log!(target: "fmi2", level, "[{name}] {msg}");
}

extern "C" fn default_allocate(n_obj: usize, size: usize) -> *mut c_void {
    // SAFETY: mirrors the C standard library's `calloc`, which every FMI callback-functions
    // struct is documented to accept here.
    unsafe { libc::calloc(n_obj, size) }
}

extern "C" fn default_free(obj: *mut c_void) {
    // SAFETY: only ever called by the foreign instance on memory it obtained from
    // `default_allocate` above.
    unsafe { libc::free(obj) }
}

pub fn default_callbacks() -> fmi2CallbackFunctions {
    fmi2CallbackFunctions {
        logger: default_logger,
        allocate_memory: default_allocate,
        free_memory: default_free,
        step_finished: None,
        component_environment: std::ptr::null_mut(),
    }
}

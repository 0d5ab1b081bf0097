//! Raw FMI 1.0 C ABI surface (Co-Simulation slave), hand-loaded via `libloading` — see
//! [`super::ffi2`] for why this is hand-written rather than bindgen-generated.
#![allow(non_camel_case_types, non_upper_case_globals)]

use std::os::raw::{c_char, c_double, c_int, c_void};

pub type fmi1Component = *mut c_void;
pub type fmi1Boolean = c_char;
pub type fmi1Real = c_double;
pub type fmi1Integer = c_int;
pub type fmi1String = *const c_char;
pub type fmi1Status = c_int;
pub type fmi1ValueReference = u32;

pub const fmi1Status_fmi1OK: fmi1Status = 0;
pub const fmi1Status_fmi1Warning: fmi1Status = 1;
pub const fmi1Status_fmi1Discard: fmi1Status = 2;
pub const fmi1Status_fmi1Error: fmi1Status = 3;
pub const fmi1Status_fmi1Fatal: fmi1Status = 4;
pub const fmi1Status_fmi1Pending: fmi1Status = 5;

pub type fmi1CallbackLogger = extern "C" fn(
    component: fmi1Component,
    instance_name: fmi1String,
    status: fmi1Status,
    category: fmi1String,
    message: fmi1String,
);
pub type fmi1CallbackAllocateMemory = extern "C" fn(n_obj: usize, size: usize) -> *mut c_void;
pub type fmi1CallbackFreeMemory = extern "C" fn(obj: *mut c_void);
pub type fmi1StepFinished = Option<extern "C" fn(component: fmi1Component, status: fmi1Status)>;

#[repr(C)]
pub struct fmi1CallbackFunctions {
    pub logger: fmi1CallbackLogger,
    pub allocate_memory: fmi1CallbackAllocateMemory,
    pub free_memory: fmi1CallbackFreeMemory,
    pub step_finished: fmi1StepFinished,
}

/// Function pointers resolved from an FMI 1.0 Co-Simulation slave's shared library.
pub struct Fmi1Binding {
    pub instantiate_slave: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            instance_name: fmi1String,
            guid: fmi1String,
            fmu_location: fmi1String,
            mime_type: fmi1String,
            timeout: fmi1Real,
            visible: fmi1Boolean,
            interactive: fmi1Boolean,
            functions: fmi1CallbackFunctions,
            logging_on: fmi1Boolean,
        ) -> fmi1Component,
    >,
    pub initialize_slave: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            t_start: fmi1Real,
            stop_time_defined: fmi1Boolean,
            t_stop: fmi1Real,
        ) -> fmi1Status,
    >,
    pub terminate_slave:
        libloading::Symbol<'static, unsafe extern "C" fn(c: fmi1Component) -> fmi1Status>,
    pub free_slave_instance: libloading::Symbol<'static, unsafe extern "C" fn(c: fmi1Component)>,
    pub set_real: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *const fmi1Real,
        ) -> fmi1Status,
    >,
    pub get_real: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *mut fmi1Real,
        ) -> fmi1Status,
    >,
    pub set_integer: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *const fmi1Integer,
        ) -> fmi1Status,
    >,
    pub get_integer: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *mut fmi1Integer,
        ) -> fmi1Status,
    >,
    pub set_boolean: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *const fmi1Boolean,
        ) -> fmi1Status,
    >,
    pub get_boolean: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *mut fmi1Boolean,
        ) -> fmi1Status,
    >,
    pub set_string: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *const fmi1String,
        ) -> fmi1Status,
    >,
    pub get_string: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            vr: *const fmi1ValueReference,
            n: usize,
            values: *mut fmi1String,
        ) -> fmi1Status,
    >,
    pub do_step: libloading::Symbol<
        'static,
        unsafe extern "C" fn(
            c: fmi1Component,
            current_communication_point: fmi1Real,
            communication_step_size: fmi1Real,
            new_step: fmi1Boolean,
        ) -> fmi1Status,
    >,
    /// Kept last so it is dropped last: every `Symbol` above borrows from the library it loaded.
    _lib: libloading::Library,
}

impl Fmi1Binding {
    /// # Safety
    /// The caller must ensure `path` names a library implementing the FMI 1.0 Co-Simulation ABI.
    pub unsafe fn new(path: impl AsRef<std::path::Path>) -> Result<Self, libloading::Error> {
        let lib = libloading::Library::new(path.as_ref())?;
        macro_rules! sym {
            ($name:literal) => {
                std::mem::transmute(lib.get($name)?)
            };
        }
        Ok(Self {
            instantiate_slave: sym!(b"fmiInstantiateSlave\0"),
            initialize_slave: sym!(b"fmiInitializeSlave\0"),
            terminate_slave: sym!(b"fmiTerminateSlave\0"),
            free_slave_instance: sym!(b"fmiFreeSlaveInstance\0"),
            set_real: sym!(b"fmiSetReal\0"),
            get_real: sym!(b"fmiGetReal\0"),
            set_integer: sym!(b"fmiSetInteger\0"),
            get_integer: sym!(b"fmiGetInteger\0"),
            set_boolean: sym!(b"fmiSetBoolean\0"),
            get_boolean: sym!(b"fmiGetBoolean\0"),
            set_string: sym!(b"fmiSetString\0"),
            get_string: sym!(b"fmiGetString\0"),
            do_step: sym!(b"fmiDoStep\0"),
            _lib: lib,
        })
    }
}

extern "C" fn default_logger(
    _component: fmi1Component,
    instance_name: fmi1String,
    status: fmi1Status,
    _category: fmi1String,
    message: fmi1String,
) {
    let name = unsafe { std::ffi::CStr::from_ptr(instance_name) }
        .to_str()
        .unwrap_or("<invalid utf-8>");
    let msg = unsafe { std::ffi::CStr::from_ptr(message) }
        .to_str()
        .unwrap_or("<invalid utf-8>");
    let level = match status {
        fmi1Status_fmi1OK => log::Level::Debug,
        fmi1Status_fmi1Warning => log::Level::Warn,
        fmi1Status_fmi1Error | fmi1Status_fmi1Fatal => log::Level::Error,
        _ => log::Level::Trace,
    };
    log::log!(target: "fmi1", level, "[{name}] {msg}");
}

extern "C" fn default_allocate(n_obj: usize, size: usize) -> *mut c_void {
    // SAFETY: mirrors `calloc`, which every FMI 1.0 callback-functions struct expects here.
    unsafe { libc::calloc(n_obj, size) }
}

extern "C" fn default_free(obj: *mut c_void) {
    // SAFETY: only ever called by the foreign instance on memory it obtained above.
    unsafe { libc::free(obj) }
}

pub fn default_callbacks() -> fmi1CallbackFunctions {
    fmi1CallbackFunctions {
        logger: default_logger,
        allocate_memory: default_allocate,
        free_memory: default_free,
        step_finished: None,
    }
}

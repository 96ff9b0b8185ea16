use std::ffi::{c_char, CStr};
use std::ptr;
use std::time::Duration;

use tracing::warn;

use crate::arm::ArmSystem;
use crate::error::ArmError;
use crate::hardware::{HardwareInfo, SystemInterface};

//nul-terminated copy of arm::PLUGIN_NAME
static PLUGIN_NAME_C: &[u8] = b"simple_arm_phoenix/ArmSystem\0";

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmStatus{
    Ok = 0,
    NullPointer = -1,
    InvalidArgument = -2,
    NotActive = -3,
    DeviceLocked = -4,
    DeviceError = -5,
    WriteFailed = -6,
    InvalidTransition = -7,
}

impl From<&ArmError> for ArmStatus{
    fn from(err: &ArmError) -> Self{
        match err{
            ArmError::NotActive | ArmError::NotInitialized => ArmStatus::NotActive,
            ArmError::DeviceLocked{ .. } => ArmStatus::DeviceLocked,
            ArmError::Open{ .. } | ArmError::Termios{ .. } | ArmError::Enumerate(_) => ArmStatus::DeviceError,
            ArmError::ShortWrite{ .. } | ArmError::Write(_) => ArmStatus::WriteFailed,
            ArmError::InvalidTransition{ .. } => ArmStatus::InvalidTransition,
            ArmError::BaseInit(_)
            | ArmError::InvalidParameter{ .. }
            | ArmError::Description(_)
            | ArmError::RegistryOverflow{ .. }
            | ArmError::TooManyJoints{ .. } => ArmStatus::InvalidArgument,
        }
    }
}

fn status(result: crate::error::Result<()>) -> i32{
    match result{
        Ok(()) => ArmStatus::Ok as i32,
        Err(e) => ArmStatus::from(&e) as i32,
    }
}

fn seconds(value: f64) -> Duration{
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

pub struct ArmHandle{
    inner: ArmSystem,
}

#[no_mangle]
pub extern "C" fn arm_plugin_name() -> *const c_char{
    PLUGIN_NAME_C.as_ptr() as *const c_char
}

/// Initialize an adapter from a TOML robot description. Returns null on failure.
#[no_mangle]
pub unsafe extern "C" fn arm_system_from_toml(description: *const c_char) -> *mut ArmHandle{
    if description.is_null(){
        return ptr::null_mut();
    }

    let text = match unsafe{ CStr::from_ptr(description) }.to_str(){
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    match HardwareInfo::from_toml_str(text).and_then(ArmSystem::from_info){
        Ok(inner) => Box::into_raw(Box::new(ArmHandle{ inner })),
        Err(e) =>{
            warn!(error = %e, "arm_system_from_toml failed");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_free(handle: *mut ArmHandle){
    if !handle.is_null(){
        unsafe{ drop(Box::from_raw(handle)); }
    }
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_activate(handle: *mut ArmHandle) -> i32{
    let Some(h) = (unsafe{ handle.as_mut() }) else{
        return ArmStatus::NullPointer as i32;
    };
    let previous = h.inner.lifecycle_state();
    status(h.inner.on_activate(previous))
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_deactivate(handle: *mut ArmHandle) -> i32{
    let Some(h) = (unsafe{ handle.as_mut() }) else{
        return ArmStatus::NullPointer as i32;
    };
    let previous = h.inner.lifecycle_state();
    status(h.inner.on_deactivate(previous))
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_shutdown(handle: *mut ArmHandle) -> i32{
    let Some(h) = (unsafe{ handle.as_mut() }) else{
        return ArmStatus::NullPointer as i32;
    };
    let previous = h.inner.lifecycle_state();
    status(h.inner.on_shutdown(previous))
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_read(handle: *mut ArmHandle, time_s: f64, period_s: f64) -> i32{
    let Some(h) = (unsafe{ handle.as_mut() }) else{
        return ArmStatus::NullPointer as i32;
    };
    status(h.inner.read(seconds(time_s), seconds(period_s)))
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_write(handle: *mut ArmHandle, time_s: f64, period_s: f64) -> i32{
    let Some(h) = (unsafe{ handle.as_mut() }) else{
        return ArmStatus::NullPointer as i32;
    };
    status(h.inner.write(seconds(time_s), seconds(period_s)))
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_joint_count(handle: *const ArmHandle) -> usize{
    match unsafe{ handle.as_ref() }{
        Some(h) => h.inner.joint_count(),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_set_command(handle: *mut ArmHandle, index: usize, value: f64) -> i32{
    let Some(h) = (unsafe{ handle.as_ref() }) else{
        return ArmStatus::NullPointer as i32;
    };
    if h.inner.set_command(index, value){
        ArmStatus::Ok as i32
    }else{
        ArmStatus::InvalidArgument as i32
    }
}

#[no_mangle]
pub unsafe extern "C" fn arm_system_get_state(handle: *const ArmHandle, index: usize, out_value: *mut f64) -> i32{
    if out_value.is_null(){
        return ArmStatus::NullPointer as i32;
    }
    let Some(h) = (unsafe{ handle.as_ref() }) else{
        return ArmStatus::NullPointer as i32;
    };

    match h.inner.state(index){
        Some(value) =>{
            unsafe{ *out_value = value; }
            ArmStatus::Ok as i32
        }
        None => ArmStatus::InvalidArgument as i32,
    }
}

//! Game controller entry points
//!
//! The global input context is bound to the thread that created it, so it is
//! handed out as a raw pointer rather than a handle and every call on it must
//! come from that thread.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

use super::{copy_str, guard, FfiError, FfiResult};
use crate::surface::controller::{Controller, GlobalInputContext, JoystickSource};

/// Controller poller owned by the host
pub type vkp_global_input = GlobalInputContext;

/// Callback receiving one controller's state; arrays are valid only during the call
pub type vkp_controller_state_fn = Option<
    unsafe extern "C" fn(
        user_data: *mut c_void,
        id: u8,
        buttons: *const bool,
        button_count: u32,
        axes: *const f32,
        axis_count: u32,
        hats: *const u8,
        hat_count: u32,
    ),
>;

unsafe fn input<'a, S: JoystickSource>(ptr: *mut GlobalInputContext<S>) -> FfiResult<&'a mut GlobalInputContext<S>> {
    ptr.as_mut().ok_or(FfiError::NullPointer("global input"))
}

unsafe fn controller<'a, S: JoystickSource + 'a>(
    ptr: *mut GlobalInputContext<S>,
    index: u32,
) -> FfiResult<&'a Controller> {
    input(ptr)?
        .controllers()
        .get(index as usize)
        .ok_or(FfiError::UnknownValue {
            kind: "controller",
            value: index,
        })
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

unsafe fn update<S: JoystickSource>(ptr: *mut GlobalInputContext<S>) -> FfiResult<u32> {
    let input = input(ptr)?;
    input.update();
    Ok(count(input.controllers().len()))
}

unsafe fn controller_guid<S: JoystickSource>(
    ptr: *mut GlobalInputContext<S>,
    index: u32,
    buffer: *mut c_char,
    capacity: usize,
) -> FfiResult<usize> {
    Ok(copy_str(controller(ptr, index)?.guid(), buffer, capacity))
}

unsafe fn controller_state<S: JoystickSource>(
    ptr: *mut GlobalInputContext<S>,
    index: u32,
    callback: vkp_controller_state_fn,
    user_data: *mut c_void,
) -> FfiResult<bool> {
    let callback = callback.ok_or(FfiError::NullPointer("callback"))?;
    let controller = controller(ptr, index)?;
    let hats: Vec<u8> = controller.hats().iter().map(|hat| hat.bits()).collect();
    callback(
        user_data,
        controller.id(),
        controller.buttons().as_ptr(),
        count(controller.buttons().len()),
        controller.axes().as_ptr(),
        count(controller.axes().len()),
        hats.as_ptr(),
        count(hats.len()),
    );
    Ok(true)
}

/// Create a controller poller on the calling thread; null on failure
#[no_mangle]
pub extern "C" fn vkp_global_input_create() -> *mut vkp_global_input {
    guard("vkp_global_input_create", std::ptr::null_mut(), || {
        Ok::<_, FfiError>(Box::into_raw(Box::new(GlobalInputContext::new()?)))
    })
}

/// Destroy a poller from [`vkp_global_input_create`]; null is ignored
///
/// # Safety
/// `ptr` must be null or a live poller created on this thread.
#[no_mangle]
pub unsafe extern "C" fn vkp_global_input_destroy(ptr: *mut vkp_global_input) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

/// Poll every joystick; returns the number of connected controllers
///
/// Controller indices used by the other calls refer to this poll.
///
/// # Safety
/// `ptr` must be a live poller created on this thread.
#[no_mangle]
pub unsafe extern "C" fn vkp_global_input_update(ptr: *mut vkp_global_input) -> u32 {
    guard("vkp_global_input_update", 0, || update(ptr))
}

/// Copy the GUID of controller `index` into `buffer`; returns its full length
///
/// # Safety
/// `ptr` must be a live poller created on this thread and `buffer` null or
/// writable for `capacity` bytes.
#[no_mangle]
pub unsafe extern "C" fn vkp_global_input_get_controller_guid(
    ptr: *mut vkp_global_input,
    index: u32,
    buffer: *mut c_char,
    capacity: usize,
) -> usize {
    guard("vkp_global_input_get_controller_guid", 0, || {
        controller_guid(ptr, index, buffer, capacity)
    })
}

/// Pass the buttons, axes and hats of controller `index` to `callback`
///
/// # Safety
/// `ptr` must be a live poller created on this thread.
#[no_mangle]
pub unsafe extern "C" fn vkp_global_input_get_controller_state(
    ptr: *mut vkp_global_input,
    index: u32,
    callback: vkp_controller_state_fn,
    user_data: *mut c_void,
) -> bool {
    guard("vkp_global_input_get_controller_state", false, || {
        controller_state(ptr, index, callback, user_data)
    })
}

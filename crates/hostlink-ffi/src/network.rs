//! Network instance entry points.

use std::ffi::c_char;
use std::time::Duration;

use hostlink::engine::NetworkParams;
use hostlink::handle::NetworkId;

use crate::buffer::ByteSlice;
use crate::buffer::OwnedBuffer;
use crate::run;
use crate::run_into;

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// Creates network storage under `storage_dir`.
///
/// # Safety
///
/// Every slice must be valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_new_network(
    ndf_json: ByteSlice,
    storage_dir: ByteSlice,
    password: ByteSlice,
    registration_code: ByteSlice,
) -> *mut c_char {
    let params = unsafe {
        NetworkParams {
            ndf_json: ndf_json.to_string_lossy(),
            storage_dir: storage_dir.to_string_lossy(),
            password: password.to_vec(),
            registration_code: registration_code.to_string_lossy(),
        }
    };
    run(|bridge| bridge.new_network(&params))
}

/// Loads network storage and writes the new network handle to `out`.
///
/// # Safety
///
/// Every slice must be valid for the duration of the call, and `out` valid
/// for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_load_network(
    storage_dir: ByteSlice,
    password: ByteSlice,
    params_json: ByteSlice,
    out: *mut i32,
) -> *mut c_char {
    unsafe {
        run_into(out, |bridge| {
            let storage_dir = storage_dir.to_string_lossy();
            bridge
                .load_network(&storage_dir, password.as_bytes(), params_json.as_bytes())
                .map(|id| id.0)
        })
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_close_network(network: i32) -> *mut c_char {
    run(|bridge| bridge.close_network(NetworkId(network)))
}

/// Writes the engine's own id for the instance to `out`.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_network_engine_id(network: i32, out: *mut i32) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.network_engine_id(NetworkId(network))) }
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_reception_id(network: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.reception_id(NetworkId(network))) }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_start_network_follower(network: i32, timeout_ms: i64) -> *mut c_char {
    run(|bridge| bridge.start_network_follower(NetworkId(network), millis(timeout_ms)))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_stop_network_follower(network: i32) -> *mut c_char {
    run(|bridge| bridge.stop_network_follower(NetworkId(network)))
}

/// Blocks until the network is healthy or `timeout_ms` passes.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_wait_for_network(network: i32, timeout_ms: i64, out: *mut bool) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.wait_for_network(NetworkId(network), millis(timeout_ms))) }
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_ready_to_send(network: i32, out: *mut bool) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.ready_to_send(NetworkId(network))) }
}

/// Reads `key` from the network's encrypted key-value store.
///
/// # Safety
///
/// `key` must be valid for the duration of the call, and `out` valid for a
/// write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_ekv_get(network: i32, key: ByteSlice, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe {
        run_into(out, |bridge| {
            let key = key.to_string_lossy();
            bridge.ekv_get(NetworkId(network), &key)
        })
    }
}

/// # Safety
///
/// Both slices must be valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_ekv_set(network: i32, key: ByteSlice, value: ByteSlice) -> *mut c_char {
    let (key, value) = unsafe { (key.to_string_lossy(), value.as_bytes()) };
    run(|bridge| bridge.ekv_set(NetworkId(network), &key, value))
}

/// Generates a reception identity and writes it to `out`. Nothing is stored.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_make_reception_identity(network: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.make_reception_identity(NetworkId(network))) }
}

/// # Safety
///
/// Both slices must be valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_store_reception_identity(
    network: i32,
    key: ByteSlice,
    identity: ByteSlice,
) -> *mut c_char {
    let (key, identity) = unsafe { (key.to_string_lossy(), identity.as_bytes()) };
    run(|bridge| bridge.store_reception_identity(NetworkId(network), &key, identity))
}

/// # Safety
///
/// `key` must be valid for the duration of the call, and `out` valid for a
/// write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_load_reception_identity(
    network: i32,
    key: ByteSlice,
    out: *mut OwnedBuffer,
) -> *mut c_char {
    unsafe {
        run_into(out, |bridge| {
            let key = key.to_string_lossy();
            bridge.load_reception_identity(NetworkId(network), &key)
        })
    }
}

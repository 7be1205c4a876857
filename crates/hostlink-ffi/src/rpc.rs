//! RPC entry points: requests, response collection and servers.
//!
//! `obj` arguments are opaque host pointers. The bridge never dereferences
//! them; it hands them back to the `rpc_response`, `rpc_error` and
//! `rpc_server_request` slots.

use std::ffi::c_char;
use std::ffi::c_void;

use hostlink::handle::CallbackToken;
use hostlink::handle::NetworkId;
use hostlink::handle::ResponseId;
use hostlink::handle::ServerId;

use crate::buffer::ByteSlice;
use crate::buffer::OwnedBuffer;
use crate::run;
use crate::run_into;

fn token(obj: *mut c_void) -> CallbackToken {
    CallbackToken(obj as usize)
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_generate_reception_id(network: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.generate_reception_id(NetworkId(network))) }
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_generate_random_key(network: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.generate_random_key(NetworkId(network))) }
}

/// # Safety
///
/// `private_key` must be valid for the duration of the call, and `out` valid
/// for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_derive_public_key(private_key: ByteSlice, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.derive_public_key(private_key.as_bytes())) }
}

/// Sends a request and writes its response handle to `out` straight away.
/// Collect the reply with `hostlink_rpc_await` or `hostlink_rpc_push`.
///
/// # Safety
///
/// Every slice must be valid for the duration of the call, and `out` valid
/// for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_rpc_send(
    network: i32,
    recipient: ByteSlice,
    pubkey: ByteSlice,
    request: ByteSlice,
    out: *mut i32,
) -> *mut c_char {
    unsafe {
        run_into(out, |bridge| {
            bridge
                .rpc_send(NetworkId(network), recipient.as_bytes(), pubkey.as_bytes(), request.as_bytes())
                .map(|id| id.0)
        })
    }
}

/// Blocks until the response is known and writes the reply to `out`. A
/// failed response writes an empty buffer; its error text is delivered only
/// through `hostlink_rpc_push`.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_rpc_await(response: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.await_response(ResponseId(response))) }
}

/// Delivers the response to the `rpc_response` or `rpc_error` slot with
/// `obj` once it is known. Unknown handles are reported through `rpc_error`
/// too.
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_rpc_push(response: i32, obj: *mut c_void) -> *mut c_char {
    let token = token(obj);
    run(|bridge| bridge.push_on_ready(ResponseId(response), token))
}

/// Forgets a response handle.
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_rpc_release(response: i32) -> *mut c_char {
    run(|bridge| bridge.release_response(ResponseId(response)))
}

/// Creates a stopped RPC server and writes its handle to `out`. Requests are
/// passed to the `rpc_server_request` slot with `obj`.
///
/// # Safety
///
/// Every slice must be valid for the duration of the call, and `out` valid
/// for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_new_rpc_server(
    network: i32,
    obj: *mut c_void,
    reception_id: ByteSlice,
    private_key: ByteSlice,
    out: *mut i32,
) -> *mut c_char {
    let token = token(obj);
    unsafe {
        run_into(out, |bridge| {
            bridge
                .new_rpc_server(NetworkId(network), token, reception_id.as_bytes(), private_key.as_bytes())
                .map(|id| id.0)
        })
    }
}

/// Reloads the stored RPC server of `network`.
///
/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_load_rpc_server(network: i32, obj: *mut c_void, out: *mut i32) -> *mut c_char {
    let token = token(obj);
    unsafe {
        run_into(out, |bridge| {
            bridge.load_rpc_server(NetworkId(network), token).map(|id| id.0)
        })
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_rpc_server_start(server: i32) -> *mut c_char {
    run(|bridge| bridge.start_server(ServerId(server)))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_rpc_server_stop(server: i32) -> *mut c_char {
    run(|bridge| bridge.stop_server(ServerId(server)))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_rpc_server_close(server: i32) -> *mut c_char {
    run(|bridge| bridge.close_rpc_server(ServerId(server)))
}

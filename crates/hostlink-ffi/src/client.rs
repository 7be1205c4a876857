//! Message client entry points.
//!
//! Inbound traffic for every client arrives through the router installed with
//! `hostlink_set_router`, tagged with the client handle returned here.

use std::ffi::c_char;

use hostlink::event::Body;
use hostlink::event::OutgoingMessage;
use hostlink::handle::ClientId;
use hostlink::handle::NetworkId;

use crate::buffer::ByteSlice;
use crate::buffer::OwnedBuffer;
use crate::run;
use crate::run_into;

/// Addressing and send options shared by every send variant.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct SendOptions {
    pub partner_key: ByteSlice,
    pub dm_token: i32,
    pub lease_ms: i64,
    pub params_json: ByteSlice,
}

impl SendOptions {
    /// # Safety
    ///
    /// Both slices must be valid for the duration of the call.
    unsafe fn message(&self, body: Body) -> OutgoingMessage {
        unsafe {
            OutgoingMessage::new(self.partner_key.to_vec(), self.dm_token, body)
                .lease_ms(self.lease_ms)
                .params_json(self.params_json.to_vec())
        }
    }
}

/// # Safety
///
/// `options` must point to a valid `SendOptions` whose slices are valid for
/// the duration of the call, and `out` must be valid for a write.
unsafe fn send(client: i32, options: *const SendOptions, body: Body, out: *mut OwnedBuffer) -> *mut c_char {
    if options.is_null() {
        return crate::error_message("null send options");
    }
    let message = unsafe { (*options).message(body) };
    unsafe { run_into(out, |bridge| bridge.send(ClientId(client), &message)) }
}

/// Creates a message client on `network` and writes its handle to `out`.
///
/// # Safety
///
/// Every slice must be valid for the duration of the call, and `out` valid
/// for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_new_client(
    network: i32,
    identity: ByteSlice,
    passphrase: ByteSlice,
    out: *mut i32,
) -> *mut c_char {
    unsafe {
        run_into(out, |bridge| {
            let passphrase = passphrase.to_string_lossy();
            bridge
                .new_client(NetworkId(network), identity.as_bytes(), &passphrase)
                .map(|id| id.0)
        })
    }
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_client_token(client: i32, out: *mut i32) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.client_token(ClientId(client))) }
}

/// # Safety
///
/// `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_client_public_key(client: i32, out: *mut OwnedBuffer) -> *mut c_char {
    unsafe { run_into(out, |bridge| bridge.client_public_key(ClientId(client))) }
}

/// Sends an uninterpreted payload. The send report goes to `out`.
///
/// # Safety
///
/// See `hostlink_send_text`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_send(
    client: i32,
    options: *const SendOptions,
    message_type: i64,
    payload: ByteSlice,
    out: *mut OwnedBuffer,
) -> *mut c_char {
    let body = Body::Raw {
        message_type,
        payload: unsafe { payload.to_vec() },
    };
    unsafe { send(client, options, body, out) }
}

/// Sends a text message. The send report goes to `out`.
///
/// # Safety
///
/// `options` must point to a valid `SendOptions`, every slice must be valid
/// for the duration of the call, and `out` must be valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_send_text(
    client: i32,
    options: *const SendOptions,
    text: ByteSlice,
    out: *mut OwnedBuffer,
) -> *mut c_char {
    let body = Body::Text(unsafe { text.to_string_lossy() });
    unsafe { send(client, options, body, out) }
}

/// Sends a text reply to the message `reply_to`.
///
/// # Safety
///
/// See `hostlink_send_text`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_send_reply(
    client: i32,
    options: *const SendOptions,
    text: ByteSlice,
    reply_to: ByteSlice,
    out: *mut OwnedBuffer,
) -> *mut c_char {
    let body = unsafe {
        Body::Reply {
            text: text.to_string_lossy(),
            reply_to: reply_to.to_vec(),
        }
    };
    unsafe { send(client, options, body, out) }
}

/// Reacts to the message `react_to`.
///
/// # Safety
///
/// See `hostlink_send_text`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_send_reaction(
    client: i32,
    options: *const SendOptions,
    reaction: ByteSlice,
    react_to: ByteSlice,
    out: *mut OwnedBuffer,
) -> *mut c_char {
    let body = unsafe {
        Body::Reaction {
            reaction: reaction.to_string_lossy(),
            react_to: react_to.to_vec(),
        }
    };
    unsafe { send(client, options, body, out) }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlink_close_client(client: i32) -> *mut c_char {
    run(|bridge| bridge.close_client(ClientId(client)))
}

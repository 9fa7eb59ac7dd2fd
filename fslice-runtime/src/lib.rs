//! The FSlice taint runtime: the `extern "C"` entry points an instrumented
//! program links against, backed by one process-wide [`Runtime`] behind a
//! `Mutex`.
//!
//! Concurrent use of the instrumented program is out of scope — the lock
//! exists only so this crate doesn't have to choose between `unsafe`
//! mutable statics and a thread-safety story nothing here needs; it is
//! uncontended by construction.

mod emitter;
mod errno;
mod object_hash;
mod runtime;
mod taint;

pub use runtime::Runtime;
pub use taint::Taint;

use std::ffi::{c_char, c_int, c_void, CStr};
use std::io::Write;
use std::sync::{Mutex, MutexGuard, OnceLock};

static RUNTIME: OnceLock<Mutex<Runtime>> = OnceLock::new();

fn runtime() -> MutexGuard<'static, Runtime> {
    RUNTIME.get_or_init(|| {
        log::debug!("initializing fslice runtime");
        Mutex::new(Runtime::new())
    })
    .lock()
    .expect("fslice runtime mutex poisoned by a panicking entry point")
}

/// Redirect the trace sink (default: standard error), e.g. to a file or an
/// in-memory buffer under test.
pub fn set_sink(sink: Box<dyn Write + Send>) {
    runtime().set_sink(sink);
}

macro_rules! load_store {
    ($load:ident, $store:ident, $size:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $load(addr: u64) -> Taint {
            runtime().load(addr, $size)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn $store(addr: u64, taint: Taint) {
            runtime().store(addr, $size, taint)
        }
    };
}

load_store!(__fslice_load1, __fslice_store1, 1);
load_store!(__fslice_load2, __fslice_store2, 2);
load_store!(__fslice_load4, __fslice_store4, 4);
load_store!(__fslice_load8, __fslice_store8, 8);
load_store!(__fslice_load16, __fslice_store16, 16);
load_store!(__fslice_load32, __fslice_store32, 32);
load_store!(__fslice_load64, __fslice_store64, 64);

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_load_arg(i: u64) -> Taint {
    runtime().load_arg(i)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_store_arg(i: u64, taint: Taint) {
    runtime().store_arg(i, taint)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_load_ret() -> Taint {
    runtime().load_ret()
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_store_ret(taint: Taint) {
    runtime().store_ret(taint)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_value(v: u64) -> Taint {
    runtime().value(v)
}

/// # Safety
/// `op` must be a valid, NUL-terminated C string for the duration of the
/// call, as the rewriter's `__fslice_op2` call sites guarantee by always
/// passing a reference to an interned, static operator name.
#[unsafe(no_mangle)]
pub extern "C" fn __fslice_op2(op: *const c_char, t1: Taint, t2: Taint) -> Taint {
    let op = unsafe { CStr::from_ptr(op) }.to_string_lossy();
    runtime().op2(&op, t1, t2)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_memset(dst: *mut c_void, val: c_int, size: u64) -> *mut c_void {
    runtime().memset(dst as u64, size);
    unsafe { libc::memset(dst, val, size as usize) }
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_memmove(dst: *mut c_void, src: *const c_void, size: u64) -> *mut c_void {
    runtime().memmove(dst as u64, src as u64, size);
    unsafe { libc::memmove(dst, src, size as usize) }
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_memcpy(dst: *mut c_void, src: *const c_void, size: u64) -> *mut c_void {
    __fslice_memmove(dst, src, size)
}

/// # Safety
/// `src` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub extern "C" fn __fslice_strcpy(dst: *mut c_char, src: *const c_char) -> *mut c_char {
    let len = unsafe { CStr::from_ptr(src) }.to_bytes().len() as u64 + 1;
    __fslice_memmove(dst as *mut c_void, src as *const c_void, len) as *mut c_char
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_bzero(dst: *mut c_void, size: u64) {
    runtime().bzero(dst as u64, size);
    unsafe { libc::memset(dst, 0, size as usize) };
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_malloc(size: u64) -> *mut c_void {
    let ptr = unsafe { libc::calloc(1, size as usize) };
    runtime().malloc(ptr as u64, size);
    ptr
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_calloc(num: u64, size: u64) -> *mut c_void {
    let ptr = unsafe { libc::calloc(num as usize, size as usize) };
    runtime().calloc(ptr as u64, num, size);
    ptr
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_read_block(addr: u64, size: u64, nr: u64) {
    runtime().read_block(addr, size, nr)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_write_block(addr: u64, size: u64, nr: u64) {
    runtime().write_block(addr, size, nr)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_name(addr: u64, len: u64) {
    runtime().name(addr, len)
}

#[unsafe(no_mangle)]
pub extern "C" fn __fslice_data(addr: u64, len: u64) {
    runtime().data(addr, len)
}

//! libc lookups: host name, user and group databases

use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;

const LOOKUP_BUF: usize = 16 * 1024;

/// Host name as reported by gethostname(2)
pub fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is writable for buf.len() bytes
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec())
        .ok()
        .filter(|name| !name.is_empty())
}

/// User name for a uid
pub fn user_name(uid: u32) -> Option<String> {
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all out-pointers reference live, correctly sized storage
    unsafe {
        let rc = libc::getpwuid_r(uid, pwd.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &mut result);
        if rc != 0 || result.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*result).pw_name).to_string_lossy().into_owned())
    }
}

/// Group name for a gid
pub fn group_name(gid: u32) -> Option<String> {
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF];
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: all out-pointers reference live, correctly sized storage
    unsafe {
        let rc = libc::getgrgid_r(gid, grp.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &mut result);
        if rc != 0 || result.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*result).gr_name).to_string_lossy().into_owned())
    }
}

/// uid for a user name
pub fn user_id(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all out-pointers reference live, correctly sized storage
    unsafe {
        let rc = libc::getpwnam_r(
            c_name.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        Some((*result).pw_uid)
    }
}

/// gid for a group name
pub fn group_id(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF];
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: all out-pointers reference live, correctly sized storage
    unsafe {
        let rc = libc::getgrnam_r(
            c_name.as_ptr(),
            grp.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        Some((*result).gr_gid)
    }
}

/// Resolve an owner given as a name or a numeric id
pub fn resolve_user(owner: &str) -> Option<u32> {
    user_id(owner).or_else(|| owner.parse().ok())
}

/// Resolve a group given as a name or a numeric id
pub fn resolve_group(group: &str) -> Option<u32> {
    group_id(group).or_else(|| group.parse().ok())
}

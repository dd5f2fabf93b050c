//! Raw socket setup.
//!
//! Grounded in the teacher's `src/syscalls.rs`, but the socket model is
//! different: spec.md §3/§5 calls for ONE listening socket owned by the
//! supervisor and shared (as a raw fd) across every worker's Accept task,
//! rather than a `SO_REUSEPORT` socket per worker. `SO_REUSEADDR` only —
//! there is exactly one bind, so port reuse across processes isn't the
//! concern `SO_REUSEPORT` solves here.

use std::io;
use std::mem;
use std::net::SocketAddr;

use libc::{c_int, c_void, socklen_t};

use crate::error::CoreResult;

/// An open listening socket, owned by the supervisor for the lifetime of the
/// server. `Clone` just copies the fd number — every worker's Accept task
/// submits against the same kernel socket (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct ListenSocket(pub c_int);

impl ListenSocket {
    pub fn raw_fd(self) -> c_int {
        self.0
    }
}

impl Drop for ListenSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// Bind and listen on `addr`. The returned socket is non-blocking only in
/// the sense that no flag is required for io_uring accept — the ring itself
/// delivers completions rather than EWOULDBLOCK.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> CoreResult<ListenSocket> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    unsafe {
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let one: c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const c_void,
            mem::size_of_val(&one) as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        if let Err(err) = bind_addr(fd, &addr) {
            libc::close(fd);
            return Err(err.into());
        }

        if libc::listen(fd, backlog) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        Ok(ListenSocket(fd))
    }
}

fn bind_addr(fd: c_int, addr: &SocketAddr) -> io::Result<()> {
    unsafe {
        match addr {
            SocketAddr::V4(a) => {
                let sin = libc::sockaddr_in {
                    sin_family: libc::AF_INET as libc::sa_family_t,
                    sin_port: a.port().to_be(),
                    sin_addr: libc::in_addr {
                        s_addr: u32::from_ne_bytes(a.ip().octets()),
                    },
                    sin_zero: [0; 8],
                };
                if libc::bind(
                    fd,
                    &sin as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&sin) as socklen_t,
                ) < 0
                {
                    return Err(io::Error::last_os_error());
                }
            }
            SocketAddr::V6(a) => {
                let sin6 = libc::sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as libc::sa_family_t,
                    sin6_port: a.port().to_be(),
                    sin6_flowinfo: a.flowinfo(),
                    sin6_addr: libc::in6_addr {
                        s6_addr: a.ip().octets(),
                    },
                    sin6_scope_id: a.scope_id(),
                };
                if libc::bind(
                    fd,
                    &sin6 as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&sin6) as socklen_t,
                ) < 0
                {
                    return Err(io::Error::last_os_error());
                }
            }
        }
        Ok(())
    }
}

/// Ignore `SIGPIPE` so a write to a peer that has reset the connection
/// surfaces as `EPIPE` on the syscall return rather than killing the
/// process (spec.md §6, Start).
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

pub fn close_fd(fd: c_int) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_listener_on_ephemeral_port_succeeds() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sock = bind_listener(addr, 128).expect("bind should succeed");
        assert!(sock.raw_fd() >= 0);
    }

    #[test]
    fn double_bind_same_fixed_port_fails_without_reuseaddr_timeout() {
        // Binding the same ephemeral wildcard twice must not collide: each
        // call to `bind_listener(":0")` gets a fresh port from the kernel.
        let a = bind_listener("127.0.0.1:0".parse().unwrap(), 128).unwrap();
        let b = bind_listener("127.0.0.1:0".parse().unwrap(), 128).unwrap();
        assert_ne!(a.raw_fd(), b.raw_fd());
    }
}

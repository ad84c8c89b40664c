//! Thin wrappers over the libc socket calls.
//!
//! Everything here returns `io::Error`; the public socket types map those
//! into the crate's error enum with the context they know about.

use libc::{
    AF_INET, AF_INET6, POLLIN, POLLOUT, c_int, c_void, in_addr, in6_addr, sa_family_t, sockaddr,
    sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t,
};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: c_int = 0;

fn cvt(ret: c_int) -> io::Result<c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

// Retries a call interrupted by a signal.
fn retry<F>(mut call: F) -> io::Result<usize>
where
    F: FnMut() -> isize,
{
    loop {
        let ret = call();
        if ret >= 0 {
            return Ok(ret as usize);
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Converts a socket address to its C representation.
pub(crate) fn to_raw(address: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let length = match address {
        SocketAddr::V4(v4) => {
            let raw = unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in) };
            raw.sin_family = AF_INET as sa_family_t;
            raw.sin_port = v4.port().to_be();
            raw.sin_addr = in_addr {
                s_addr: u32::from(*v4.ip()).to_be(),
            };
            #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
            {
                raw.sin_len = mem::size_of::<sockaddr_in>() as u8;
            }
            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let raw =
                unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in6) };
            raw.sin6_family = AF_INET6 as sa_family_t;
            raw.sin6_port = v6.port().to_be();
            raw.sin6_flowinfo = v6.flowinfo();
            raw.sin6_addr = in6_addr {
                s6_addr: v6.ip().octets(),
            };
            raw.sin6_scope_id = v6.scope_id();
            #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
            {
                raw.sin6_len = mem::size_of::<sockaddr_in6>() as u8;
            }
            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, length as socklen_t)
}

/// Converts a C socket address back, rejecting families other than IPv4/IPv6.
pub(crate) fn from_raw(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let raw = unsafe { &*(storage as *const sockaddr_storage as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr));
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(raw.sin_port))))
        }
        AF_INET6 => {
            let raw = unsafe { &*(storage as *const sockaddr_storage as *const sockaddr_in6) };
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(raw.sin6_addr.s6_addr),
                u16::from_be(raw.sin6_port),
                raw.sin6_flowinfo,
                raw.sin6_scope_id,
            )))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported address family {family}"),
        )),
    }
}

fn family_of(address: &SocketAddr) -> c_int {
    match address {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// An owned socket file descriptor, closed exactly once on drop.
#[derive(Debug)]
pub(crate) struct FileDescriptor(c_int);

impl FileDescriptor {
    /// Opens a socket of `kind` (`SOCK_STREAM` / `SOCK_DGRAM`) for the
    /// family of `address`.
    pub(crate) fn socket_for(address: &SocketAddr, kind: c_int) -> io::Result<Self> {
        let fd = Self(cvt(unsafe { libc::socket(family_of(address), kind, 0) })?);

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        fd.set_option(libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1)?;

        Ok(fd)
    }

    pub(crate) fn set_option(&self, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
        cvt(unsafe {
            libc::setsockopt(
                self.0,
                level,
                name,
                &value as *const c_int as *const c_void,
                mem::size_of::<c_int>() as socklen_t,
            )
        })
        .map(drop)
    }

    pub(crate) fn bind(&self, address: &SocketAddr) -> io::Result<()> {
        let (storage, length) = to_raw(address);
        cvt(unsafe {
            libc::bind(
                self.0,
                &storage as *const sockaddr_storage as *const sockaddr,
                length,
            )
        })
        .map(drop)
    }

    pub(crate) fn connect(&self, address: &SocketAddr) -> io::Result<()> {
        let (storage, length) = to_raw(address);
        let ret = unsafe {
            libc::connect(
                self.0,
                &storage as *const sockaddr_storage as *const sockaddr,
                length,
            )
        };
        match cvt(ret) {
            // The handshake carries on in the kernel; calling connect again
            // would fail with EALREADY or EISCONN.
            Err(error) if error.kind() == io::ErrorKind::Interrupted => self.finish_connect(),
            other => other.map(drop),
        }
    }

    /// Waits for a connect already in progress and reports how it ended.
    fn finish_connect(&self) -> io::Result<()> {
        self.poll_writable()?;
        match self.take_error()? {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Reads and clears the pending `SO_ERROR`.
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        let mut value: c_int = 0;
        let mut length = mem::size_of::<c_int>() as socklen_t;
        cvt(unsafe {
            libc::getsockopt(
                self.0,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut value as *mut c_int as *mut c_void,
                &mut length,
            )
        })?;

        Ok((value != 0).then(|| io::Error::from_raw_os_error(value)))
    }

    pub(crate) fn listen(&self, backlog: c_int) -> io::Result<()> {
        cvt(unsafe { libc::listen(self.0, backlog) }).map(drop)
    }

    pub(crate) fn accept(&self) -> io::Result<Self> {
        loop {
            let fd = unsafe { libc::accept(self.0, std::ptr::null_mut(), std::ptr::null_mut()) };
            match cvt(fd) {
                Ok(fd) => {
                    let accepted = Self(fd);
                    #[cfg(any(target_os = "macos", target_os = "ios"))]
                    accepted.set_option(libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1)?;
                    return Ok(accepted);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    pub(crate) fn send(&self, buf: &[u8]) -> io::Result<usize> {
        retry(|| unsafe {
            libc::send(self.0, buf.as_ptr() as *const c_void, buf.len(), SEND_FLAGS)
        })
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        retry(|| unsafe { libc::recv(self.0, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) })
    }

    pub(crate) fn send_to(&self, buf: &[u8], address: &SocketAddr) -> io::Result<usize> {
        let (storage, length) = to_raw(address);
        retry(|| unsafe {
            libc::sendto(
                self.0,
                buf.as_ptr() as *const c_void,
                buf.len(),
                SEND_FLAGS,
                &storage as *const sockaddr_storage as *const sockaddr,
                length,
            )
        })
    }

    pub(crate) fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        let n = retry(|| unsafe {
            libc::recvfrom(
                self.0,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                0,
                &mut storage as *mut sockaddr_storage as *mut sockaddr,
                &mut length,
            )
        })?;

        Ok((n, from_raw(&storage)?))
    }

    pub(crate) fn shutdown(&self, how: c_int) -> io::Result<()> {
        cvt(unsafe { libc::shutdown(self.0, how) }).map(drop)
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.address_with(|fd, raw, length| unsafe { libc::getsockname(fd, raw, length) })
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.address_with(|fd, raw, length| unsafe { libc::getpeername(fd, raw, length) })
    }

    fn address_with<F>(&self, call: F) -> io::Result<SocketAddr>
    where
        F: FnOnce(c_int, *mut sockaddr, *mut socklen_t) -> c_int,
    {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        cvt(call(
            self.0,
            &mut storage as *mut sockaddr_storage as *mut sockaddr,
            &mut length,
        ))?;

        from_raw(&storage)
    }

    /// Waits until the descriptor is readable (for a listener: a connection
    /// is pending). Returns `false` on timeout.
    // Blocks until the socket is writable or has failed.
    fn poll_writable(&self) -> io::Result<()> {
        let mut pollfd = libc::pollfd {
            fd: self.0,
            events: POLLOUT,
            revents: 0,
        };

        loop {
            let ret = unsafe { libc::poll(&mut pollfd, 1, -1) };
            match cvt(ret) {
                Ok(_) => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    pub(crate) fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.0,
            events: POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(c_int::MAX as u128) as c_int;

        loop {
            let ret = unsafe { libc::poll(&mut pollfd, 1, millis) };
            match cvt(ret) {
                Ok(ready) => return Ok(ready > 0),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }
}

impl Drop for FileDescriptor {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    // Starts a non-blocking connect, leaving the socket in the same state an
    // interrupted blocking connect leaves it in.
    fn start_connect(address: &SocketAddr) -> (FileDescriptor, io::Result<()>) {
        let fd = FileDescriptor::socket_for(address, libc::SOCK_STREAM).expect("socket");
        unsafe {
            let flags = libc::fcntl(fd.0, libc::F_GETFL);
            libc::fcntl(fd.0, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }

        let (storage, length) = to_raw(address);
        let ret = unsafe {
            libc::connect(
                fd.0,
                &storage as *const sockaddr_storage as *const sockaddr,
                length,
            )
        };
        let started = match cvt(ret) {
            Err(error) if error.raw_os_error() == Some(libc::EINPROGRESS) => fd.finish_connect(),
            other => other.map(drop),
        };
        (fd, started)
    }

    #[test]
    fn finish_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("address");

        let (fd, connected) = start_connect(&address);

        connected.expect("connect");
        assert!(fd.take_error().expect("SO_ERROR").is_none());
        listener.accept().expect("accept");
    }

    #[test]
    fn finish_connect_reports_refusal() {
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("address")
        };

        let (_fd, connected) = start_connect(&address);

        let error = connected.expect_err("nobody listens");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);
    }
}

use crate::config::SocketMode;
use crate::error::{IoError, IoOperation, IoResult};
use crate::net::socket::Socket;
use crate::net::Family;
use pingmux_packet::fmt_payload;
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use tracing::instrument;

/// A non-blocking ICMP socket.
pub(crate) struct SocketImpl {
    inner: socket2::Socket,
}

impl SocketImpl {
    fn new(domain: Domain, ty: Type, protocol: Protocol) -> IoResult<Self> {
        let inner = socket2::Socket::new(domain, ty, Some(protocol))
            .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?;
        inner
            .set_nonblocking(true)
            .map_err(|err| IoError::Other(err, IoOperation::SetNonBlocking))?;
        Ok(Self { inner })
    }
}

impl Socket for SocketImpl {
    #[instrument(level = "trace")]
    fn new_icmp_ipv4(mode: SocketMode) -> IoResult<Self> {
        match mode {
            SocketMode::Raw => Self::new(Domain::IPV4, Type::RAW, Protocol::ICMPV4),
            SocketMode::Dgram => Self::new(Domain::IPV4, Type::DGRAM, Protocol::ICMPV4),
        }
    }

    #[instrument(level = "trace")]
    fn new_icmp_ipv6(mode: SocketMode) -> IoResult<Self> {
        match mode {
            SocketMode::Raw => Self::new(Domain::IPV6, Type::RAW, Protocol::ICMPV6),
            SocketMode::Dgram => Self::new(Domain::IPV6, Type::DGRAM, Protocol::ICMPV6),
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn bind(&self, address: SocketAddr) -> IoResult<()> {
        self.inner
            .bind(&SockAddr::from(address))
            .map_err(|err| IoError::Bind(err, address))
    }

    #[instrument(skip(self), level = "trace")]
    fn set_ttl(&self, ttl: u8) -> IoResult<()> {
        self.inner
            .set_ttl_v4(u32::from(ttl))
            .map_err(|err| IoError::Other(err, IoOperation::SetTtl))
    }

    #[instrument(skip(self), level = "trace")]
    fn set_tos(&self, tos: u8) -> IoResult<()> {
        self.inner
            .set_tos_v4(u32::from(tos))
            .map_err(|err| IoError::Other(err, IoOperation::SetTos))
    }

    #[instrument(skip(self), level = "trace")]
    fn set_unicast_hops_v6(&self, hops: u8) -> IoResult<()> {
        self.inner
            .set_unicast_hops_v6(u32::from(hops))
            .map_err(|err| IoError::Other(err, IoOperation::SetUnicastHopsV6))
    }

    #[instrument(skip(self), level = "trace")]
    fn set_tclass_v6(&self, tclass: u8) -> IoResult<()> {
        self.inner
            .set_tclass_v6(u32::from(tclass))
            .map_err(|err| IoError::Other(err, IoOperation::SetTclassV6))
    }

    #[instrument(skip(self), level = "trace")]
    fn set_checksum_offset_v6(&self, offset: u32) -> IoResult<()> {
        // Linux checksums ICMPv6 raw sockets unconditionally and rejects the
        // option on them with EINVAL.
        match checksum_offset(&self.inner, offset) {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(nix::libc::EINVAL) => Ok(()),
            Err(err) => Err(IoError::Other(err, IoOperation::SetChecksumV6)),
        }
    }

    #[cfg(target_os = "linux")]
    #[instrument(skip(self, identifiers), level = "trace")]
    fn attach_echo_filter(&self, family: Family, identifiers: &[u16]) -> IoResult<()> {
        self.inner
            .attach_filter(&crate::net::filter::echo_reply_program(family, identifiers))
            .map_err(|err| IoError::Other(err, IoOperation::AttachFilter))
    }

    #[cfg(not(target_os = "linux"))]
    fn attach_echo_filter(&self, _family: Family, _identifiers: &[u16]) -> IoResult<()> {
        Ok(())
    }

    #[instrument(skip(self, buf), level = "trace")]
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> IoResult<usize> {
        tracing::trace!(buf = fmt_payload(buf), ?addr);
        self.inner
            .send_to(buf, &SockAddr::from(addr))
            .map_err(|err| IoError::SendTo(err, addr))
    }

    #[instrument(skip(self, buf), level = "trace")]
    fn recv_from(&self, buf: &mut [u8]) -> IoResult<(usize, Option<SocketAddr>)> {
        let (bytes_read, addr) = self
            .inner
            .recv_from_into_buf(buf)
            .map_err(|err| IoError::Other(err, IoOperation::RecvFrom))?;
        tracing::trace!(buf = fmt_payload(&buf[..bytes_read]), bytes_read, ?addr);
        Ok((bytes_read, addr))
    }
}

impl AsRawFd for SocketImpl {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// Set `IPV6_CHECKSUM`, which `socket2` does not expose.
fn checksum_offset(socket: &socket2::Socket, offset: u32) -> io::Result<()> {
    #![allow(unsafe_code)]
    use nix::libc;
    #[cfg(target_os = "linux")]
    const IPV6_CHECKSUM: libc::c_int = 7;
    #[cfg(not(target_os = "linux"))]
    const IPV6_CHECKSUM: libc::c_int = 26;
    let offset = offset as libc::c_int;
    // Safety: the option value is a plain int read by the kernel before the
    // call returns.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            IPV6_CHECKSUM,
            std::ptr::addr_of!(offset).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// An extension trait to allow `recv_from` method which writes to a `&mut [u8]`.
///
/// This is required for `socket2::Socket` which [does not currently provide] this method.
///
/// [does not currently provide]: https://github.com/rust-lang/socket2/issues/223
trait RecvFrom {
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)>;
}

impl RecvFrom for socket2::Socket {
    // Safety: the `recv` implementation promises not to write uninitialised
    // bytes to the `buf`fer, so this casting is safe.
    #![allow(unsafe_code)]
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        let buf =
            unsafe { &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [std::mem::MaybeUninit<u8>]) };
        self.recv_from(buf)
            .map(|(size, addr)| (size, addr.as_socket()))
    }
}
